//! Storage abstraction for configuration documents.
//!
//! A [`DocumentProvider`] yields the ordered documents a section is read from
//! and accepts the document it is saved to. Concrete providers:
//!
//! - [`MemoryProvider`]: a literal XML string, read-only.
//! - [`FileProvider`](crate::file::FileProvider) and its
//!   [`DefaultFileProvider`](crate::file::DefaultFileProvider) /
//!   [`UserProfileProvider`](crate::file::UserProfileProvider) specializations.
//! - [`MultiFileProvider`](crate::file::MultiFileProvider): several files, read-only.
//! - [`CompositeProvider`](crate::composite::CompositeProvider): other providers, read-only.
//!
//! `source_identifier` names the underlying storage and is what recent-source
//! lists de-duplicate on.

use std::fmt;
use std::path::Path;

use tracing::debug;
use uuid::Uuid;

use crate::document::Document;
use crate::error::XmlfigError;

/// Separator between constituent identifiers of multi-source providers.
pub const IDENTIFIER_SEPARATOR: &str = ";";

pub trait DocumentProvider: Send + Sync + fmt::Debug + fmt::Display {
    /// Prepare the provider before first use. Idempotent.
    fn initialize(&self) -> Result<(), XmlfigError> {
        Ok(())
    }

    /// Documents in precedence order: later documents win.
    fn load(&self) -> Result<Vec<Document>, XmlfigError>;

    fn save(&self, document: &Document) -> Result<(), XmlfigError>;

    fn delete(&self) -> Result<(), XmlfigError>;

    fn can_delete(&self) -> bool;

    fn is_read_only(&self) -> bool;

    /// Whether the storage changed since the last `load` or `save` through
    /// this provider instance.
    fn modified_since_load(&self) -> bool;

    fn source_identifier(&self) -> String;

    /// The single file behind this provider, when there is one.
    fn file_path(&self) -> Option<&Path> {
        None
    }
}

/// Read-only provider over a literal XML string.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    xml: Option<String>,
    id: Uuid,
}

impl MemoryProvider {
    pub fn new(xml: impl Into<String>) -> Self {
        Self {
            xml: Some(xml.into()),
            id: Uuid::new_v4(),
        }
    }

    /// A provider yielding a single empty default document.
    pub fn empty() -> Self {
        Self {
            xml: None,
            id: Uuid::new_v4(),
        }
    }

    fn not_supported(&self, operation: &'static str) -> XmlfigError {
        XmlfigError::NotSupported {
            provider: self.to_string(),
            operation,
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for MemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in-memory configuration")
    }
}

impl DocumentProvider for MemoryProvider {
    fn load(&self) -> Result<Vec<Document>, XmlfigError> {
        let document = match &self.xml {
            Some(xml) => Document::parse(xml)?,
            None => Document::default(),
        };
        debug!(source = %self.source_identifier(), "loaded in-memory document");
        Ok(vec![document])
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

    fn modified_since_load(&self) -> bool {
        false
    }

    fn source_identifier(&self) -> String {
        format!("memory:{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn empty_provider_yields_default_document() {
        let docs = MemoryProvider::empty().load().unwrap();
        assert_eq!(docs, vec![Document::default()]);
    }

    #[test]
    fn literal_xml_is_parsed() {
        let provider =
            MemoryProvider::new("<configuration><Server><Host>h</Host></Server></configuration>");
        let docs = provider.load().unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].section("Server").is_some());
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = MemoryProvider::new("<configuration>").load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDocument);
    }

    #[test]
    fn memory_is_read_only() {
        let provider = MemoryProvider::empty();
        assert!(provider.is_read_only());
        assert!(!provider.can_delete());
        assert!(!provider.modified_since_load());
        let err = provider.save(&Document::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
        let err = provider.delete().unwrap_err();
        assert!(err.to_string().contains("delete"));
    }

    #[test]
    fn identifiers_are_distinct_per_instance() {
        let a = MemoryProvider::new("<configuration/>");
        let b = MemoryProvider::new("<configuration/>");
        assert_ne!(a.source_identifier(), b.source_identifier());
        assert_eq!(a.source_identifier(), a.clone().source_identifier());
    }
}
