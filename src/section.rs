//! Section and setting metadata.
//!
//! A config-bearing type implements [`ConfigSection`]. Its settings are listed
//! once, in declaration order, inside the [`config_settings!`](crate::config_settings)
//! macro, which expands to the reader, writer and descriptor table for the
//! type:
//!
//! ```ignore
//! #[derive(Debug, Clone, Default)]
//! struct Server {
//!     host: String,
//!     port: u16,
//!     password: String,
//!     database: Database,
//! }
//!
//! impl ConfigSection for Server {
//!     const NAME: &'static str = "Server";
//!
//!     config_settings! {
//!         host: value(SettingDescriptor::new("Host").default("localhost")),
//!         port: value(SettingDescriptor::new("Port").default("8080")),
//!         password: value(SettingDescriptor::new("Password").encrypted()),
//!         database: section,
//!     }
//! }
//! ```
//!
//! Setting kinds:
//!
//! - `value`: a [`ScalarValue`](crate::scalar::ScalarValue) leaf.
//! - `list`: a `Vec` of scalars, stored as `<Item>` children.
//! - `section`: a nested concrete section, populated in place.
//! - `sections`: a `Vec` of nested sections.
//! - `polymorphic`: an `Option<Box<dyn DynSection>>` whose concrete type is
//!   persisted in a [`TYPE_ATTRIBUTE`] and resolved through the
//!   [`TypeRegistry`](crate::registry::TypeRegistry).
//!
//! A kind without a descriptor uses the field name as the XML name.

use std::any::Any;
use std::fmt;

use crate::document::Element;
use crate::error::ConfigError;
use crate::mapping::MappingContext;
use crate::reader::SectionReader;
use crate::writer::SectionWriter;

/// Attribute carrying the concrete type of a polymorphic member.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Element name of one entry in a scalar list.
pub const ITEM_ELEMENT: &str = "Item";

/// Metadata for one mapped member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDescriptor {
    /// Logical XML name.
    pub name: &'static str,
    /// Text parsed into the member when the document has no node for it.
    pub default: Option<&'static str>,
    pub encrypt: bool,
    pub description: Option<&'static str>,
    /// Store as an attribute of the section element instead of a child element.
    pub attribute: bool,
}

impl SettingDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            default: None,
            encrypt: false,
            description: None,
            attribute: false,
        }
    }

    pub const fn default(mut self, text: &'static str) -> Self {
        self.default = Some(text);
        self
    }

    pub const fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub const fn description(mut self, text: &'static str) -> Self {
        self.description = Some(text);
        self
    }

    pub const fn attribute(mut self) -> Self {
        self.attribute = true;
        self
    }
}

/// A config-bearing type.
///
/// The trait bound is the section descriptor: only implementors can be the
/// target of a load or save.
pub trait ConfigSection: Any + Send + Sync + fmt::Debug + Default + Clone {
    /// Element name of the section when stored at the top level, and the
    /// stable identity written for polymorphic members.
    const NAME: &'static str;

    /// Whether the section may appear nested inside another section.
    const NESTABLE: bool = true;

    /// A custom handler replacing the default read/write algorithm.
    fn handler() -> Option<Box<dyn SectionHandler<Self>>> {
        None
    }

    fn read_settings(&mut self, reader: &mut SectionReader<'_>);

    fn write_settings(&self, writer: &mut SectionWriter<'_>);

    /// Descriptor table, in declaration order.
    fn settings() -> Vec<SettingDescriptor>;
}

/// Object-safe view of a [`ConfigSection`], used for polymorphic members.
///
/// Blanket-implemented for every section type.
pub trait DynSection: Any + Send + Sync + fmt::Debug {
    fn section_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn clone_box(&self) -> Box<dyn DynSection>;

    #[doc(hidden)]
    fn read_element(&mut self, reader: &mut SectionReader<'_>, element: &Element);

    #[doc(hidden)]
    fn write_element(&self, writer: &mut SectionWriter<'_>, name: &str) -> Option<Element>;
}

impl<T: ConfigSection> DynSection for T {
    fn section_name(&self) -> &'static str {
        T::NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn DynSection> {
        Box::new(self.clone())
    }

    fn read_element(&mut self, reader: &mut SectionReader<'_>, element: &Element) {
        reader.read_nested(element, self);
    }

    fn write_element(&self, writer: &mut SectionWriter<'_>, name: &str) -> Option<Element> {
        writer.write_nested(name, self)
    }
}

impl dyn DynSection {
    pub fn downcast_ref<T: DynSection>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: DynSection>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

impl Clone for Box<dyn DynSection> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Outcome of a custom handler call.
///
/// `diagnostics: None` means the handler discarded its error list; the engine
/// treats that as "no diagnostics available", not as "no errors".
#[derive(Debug)]
pub struct Handled<T> {
    pub value: Result<T, ConfigError>,
    pub diagnostics: Option<Vec<ConfigError>>,
}

impl<T> Handled<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value: Ok(value),
            diagnostics: Some(Vec::new()),
        }
    }

    pub fn fail(error: ConfigError) -> Self {
        Self {
            value: Err(error),
            diagnostics: Some(Vec::new()),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<ConfigError>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn without_diagnostics(mut self) -> Self {
        self.diagnostics = None;
        self
    }
}

/// A user-supplied override of the default read/write algorithm for one
/// section type.
pub trait SectionHandler<T>: Send + Sync {
    fn read_section(&self, element: &Element, ctx: &MappingContext<'_>) -> Handled<T>;

    fn write_section(&self, name: &str, value: &T, ctx: &MappingContext<'_>) -> Handled<Element>;
}

/// Expand a setting list into `read_settings`, `write_settings` and
/// `settings` for a [`ConfigSection`] impl. See the [module docs](crate::section).
#[macro_export]
macro_rules! config_settings {
    ($($field:ident : $kind:ident $(($desc:expr))?),* $(,)?) => {
        fn read_settings(&mut self, reader: &mut $crate::reader::SectionReader<'_>) {
            $( reader.$kind(&mut self.$field, $crate::__setting_descriptor!($field $(, $desc)?)); )*
        }

        fn write_settings(&self, writer: &mut $crate::writer::SectionWriter<'_>) {
            $( writer.$kind(&self.$field, $crate::__setting_descriptor!($field $(, $desc)?)); )*
        }

        fn settings() -> Vec<$crate::section::SettingDescriptor> {
            vec![$( $crate::__setting_descriptor!($field $(, $desc)?) ),*]
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __setting_descriptor {
    ($field:ident) => {
        $crate::section::SettingDescriptor::new(stringify!($field))
    };
    ($field:ident, $desc:expr) => {
        $desc
    };
}
