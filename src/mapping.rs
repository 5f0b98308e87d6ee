//! Mapping engine entry points.
//!
//! The engine is stateless: every call builds its own [`MappingState`], walks
//! the section with a [`SectionReader`] or [`SectionWriter`], and returns
//! either the result with its non-fatal errors ([`Mapped`]) or the aggregate
//! [`XmlfigError::Mapping`] when something structural failed.
//!
//! Owned Rust values cannot contain reference cycles, so a self-referencing
//! config graph can only appear as an arbitrarily deep document. Nesting is
//! therefore bounded by [`MAX_DEPTH`]; going past it is a fatal
//! `InvalidConfigType`.

use tracing::debug;

use crate::crypto::CryptoProvider;
use crate::document::{Document, Element, ROOT_ELEMENT};
use crate::error::{ConfigError, ErrorCode, Mapped, XmlfigError};
use crate::reader::SectionReader;
use crate::registry::TypeRegistry;
use crate::section::ConfigSection;
use crate::writer::SectionWriter;

/// Maximum section nesting depth for a single read or write.
pub const MAX_DEPTH: usize = 64;

static NO_TYPES: TypeRegistry = TypeRegistry::new();

/// Everything a read or write consults besides the data itself.
#[derive(Clone, Copy)]
pub struct MappingContext<'a> {
    pub crypto: Option<&'a dyn CryptoProvider>,
    pub types: &'a TypeRegistry,
    /// Treat every leaf as encrypted, regardless of its descriptor.
    pub encrypt_all: bool,
}

impl Default for MappingContext<'_> {
    fn default() -> Self {
        Self {
            crypto: None,
            types: &NO_TYPES,
            encrypt_all: false,
        }
    }
}

impl<'a> MappingContext<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self {
            types,
            ..Self::default()
        }
    }

    pub fn with_crypto(mut self, crypto: &'a dyn CryptoProvider) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn with_optional_crypto(mut self, crypto: Option<&'a dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn encrypt_all(mut self, all: bool) -> Self {
        self.encrypt_all = all;
        self
    }
}

/// Errors accumulated by one read or write.
#[derive(Debug, Default)]
pub struct MappingState {
    pub(crate) errors: Vec<ConfigError>,
    pub(crate) fatal: Option<ConfigError>,
}

impl MappingState {
    /// Record a fatal error. Only the first one sticks.
    pub(crate) fn fail(&mut self, error: ConfigError) {
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    /// Merge a custom handler's diagnostics.
    pub(crate) fn absorb(&mut self, path: &str, diagnostics: Option<Vec<ConfigError>>) {
        match diagnostics {
            Some(list) => self.errors.extend(list),
            None => debug!(section = %path, "handler returned no diagnostics"),
        }
    }

    fn finish<T>(self, value: T) -> Result<Mapped<T>, XmlfigError> {
        match self.fatal {
            Some(failure) => Err(XmlfigError::mapping(failure, self.errors)),
            None => Ok(Mapped {
                value,
                errors: self.errors,
            }),
        }
    }
}

/// Read `element` as a `T`.
pub fn read_section<T: ConfigSection>(
    element: &Element,
    ctx: &MappingContext<'_>,
) -> Result<Mapped<T>, XmlfigError> {
    let mut state = MappingState::default();
    let mut value = T::default();
    SectionReader::new(element, ctx, &mut state).read_nested(element, &mut value);
    state.finish(value)
}

/// Write `value` as an element called `name`.
pub fn write_section<T: ConfigSection>(
    name: &str,
    value: &T,
    ctx: &MappingContext<'_>,
) -> Result<Mapped<Element>, XmlfigError> {
    let mut state = MappingState::default();
    let mut scratch = Element::new(name);
    let element = SectionWriter::new(&mut scratch, ctx, &mut state).write_nested(name, value);
    match element {
        Some(element) => state.finish(element),
        None => state.finish(scratch),
    }
}

fn check_roots(documents: &[Document]) -> Result<(), XmlfigError> {
    match documents.iter().find(|d| !d.has_valid_root()) {
        Some(bad) => Err(XmlfigError::mapping(
            ConfigError::new(
                ErrorCode::InvalidDocument,
                format!(
                    "root element is <{}>, expected <{ROOT_ELEMENT}>",
                    bad.root.name
                ),
            ),
            Vec::new(),
        )),
        None => Ok(()),
    }
}

/// The element for section `name` in a document sequence. Later documents
/// take precedence over earlier ones.
pub fn find_section<'d>(
    documents: &'d [Document],
    name: &str,
) -> Result<Option<&'d Element>, XmlfigError> {
    check_roots(documents)?;
    Ok(documents.iter().rev().find_map(|d| d.section(name)))
}

/// Locate and read the `T` section of a document sequence. A missing section
/// is fatal.
pub fn load_section<T: ConfigSection>(
    documents: &[Document],
    ctx: &MappingContext<'_>,
) -> Result<Mapped<T>, XmlfigError> {
    match find_section(documents, T::NAME)? {
        Some(element) => read_section(element, ctx),
        None => Err(XmlfigError::mapping(
            ConfigError::new(
                ErrorCode::InvalidDocument,
                format!("section <{}> not found", T::NAME),
            ),
            Vec::new(),
        )),
    }
}

/// Write `value` into `document` under `T::NAME`, replacing any previous
/// element of that name.
pub fn store_section<T: ConfigSection>(
    document: &mut Document,
    value: &T,
    ctx: &MappingContext<'_>,
) -> Result<Vec<ConfigError>, XmlfigError> {
    check_roots(std::slice::from_ref(document))?;
    let mapped = write_section(T::NAME, value, ctx)?;
    document.set_section(mapped.value);
    Ok(mapped.errors)
}
