//! Aggregation of several document providers into one read-only source.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::document::Document;
use crate::error::XmlfigError;
use crate::provider::{DocumentProvider, IDENTIFIER_SEPARATOR};

/// Read-only provider over other providers, composites included.
///
/// Documents are concatenated in child order, so sections from later children
/// take precedence.
#[derive(Debug, Default, Clone)]
pub struct CompositeProvider {
    children: Vec<Arc<dyn DocumentProvider>>,
}

impl CompositeProvider {
    pub fn new(children: Vec<Arc<dyn DocumentProvider>>) -> Self {
        Self { children }
    }

    pub fn push(&mut self, child: Arc<dyn DocumentProvider>) -> &mut Self {
        self.children.push(child);
        self
    }

    pub fn children(&self) -> &[Arc<dyn DocumentProvider>] {
        &self.children
    }

    fn not_supported(&self, operation: &'static str) -> XmlfigError {
        XmlfigError::NotSupported {
            provider: "composite provider".into(),
            operation,
        }
    }
}

impl fmt::Display for CompositeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.children.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

impl DocumentProvider for CompositeProvider {
    fn initialize(&self) -> Result<(), XmlfigError> {
        for child in &self.children {
            child.initialize()?;
        }
        Ok(())
    }

    fn load(&self) -> Result<Vec<Document>, XmlfigError> {
        let mut documents = Vec::new();
        for child in &self.children {
            documents.extend(child.load()?);
        }
        debug!(
            children = self.children.len(),
            documents = documents.len(),
            "loaded composite"
        );
        Ok(documents)
    }

    fn save(&self, _document: &Document) -> Result<(), XmlfigError> {
        Err(self.not_supported("save"))
    }

    fn delete(&self) -> Result<(), XmlfigError> {
        Err(self.not_supported("delete"))
    }

    fn can_delete(&self) -> bool {
        false
    }

    fn is_read_only(&self) -> bool {
        true
    }

    /// True if any child changed. Every child is asked exactly once.
    fn modified_since_load(&self) -> bool {
        self.children
            .iter()
            .map(|child| child.modified_since_load())
            .fold(false, |any, changed| any || changed)
    }

    fn source_identifier(&self) -> String {
        self.children
            .iter()
            .map(|child| child.source_identifier())
            .collect::<Vec<_>>()
            .join(IDENTIFIER_SEPARATOR)
    }
}
