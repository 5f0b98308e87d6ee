//! Document-to-object half of the mapping engine.
//!
//! A [`SectionReader`] walks one section element. Each setting kind method
//! looks up its node, converts it, and writes the result into the member.
//! Leaf failures are recorded as non-fatal errors and leave the member at its
//! default; structural failures are recorded as the fatal error of the read,
//! after which every further call is a no-op.

use tracing::debug;

use crate::crypto::Envelope;
use crate::document::Element;
use crate::error::{ConfigError, ErrorCode};
use crate::mapping::{MAX_DEPTH, MappingContext, MappingState};
use crate::scalar::ScalarValue;
use crate::section::{ConfigSection, DynSection, ITEM_ELEMENT, SettingDescriptor, TYPE_ATTRIBUTE};

pub struct SectionReader<'a> {
    element: &'a Element,
    ctx: &'a MappingContext<'a>,
    state: &'a mut MappingState,
    depth: usize,
    path: String,
}

impl<'a> SectionReader<'a> {
    pub(crate) fn new(
        element: &'a Element,
        ctx: &'a MappingContext<'a>,
        state: &'a mut MappingState,
    ) -> Self {
        Self {
            element,
            ctx,
            state,
            depth: 0,
            path: String::new(),
        }
    }

    /// The element being read.
    pub fn element(&self) -> &Element {
        self.element
    }

    pub fn context(&self) -> &MappingContext<'a> {
        self.ctx
    }

    /// Record a non-fatal error against this read.
    pub fn error(&mut self, error: ConfigError) {
        self.state.errors.push(error);
    }

    /// Record the fatal error of this read.
    pub fn fail(&mut self, error: ConfigError) {
        self.state.fail(error);
    }

    fn failed(&self) -> bool {
        self.state.fatal.is_some()
    }

    fn member_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }

    fn encrypts(&self, desc: &SettingDescriptor) -> bool {
        desc.encrypt || self.ctx.encrypt_all
    }

    /// Raw text of the node for `desc`, preferring its declared form.
    fn raw_text(&self, desc: &SettingDescriptor) -> Option<String> {
        let from_child = || {
            self.element
                .child(desc.name)
                .map(|c| c.text().unwrap_or_default().to_string())
        };
        let from_attribute = || self.element.attribute(desc.name).map(str::to_string);
        if desc.attribute {
            from_attribute().or_else(from_child)
        } else {
            from_child().or_else(from_attribute)
        }
    }

    /// Decrypt `text` for an encrypted member. Text the crypto provider does
    /// not recognize as ciphertext passes through as plaintext.
    fn decrypt(&mut self, path: &str, text: String) -> Option<String> {
        let Some(crypto) = self.ctx.crypto else {
            self.fail(ConfigError::invalid_type(format!(
                "{path} is encrypted but no crypto provider is configured"
            )));
            return None;
        };
        match crypto.open(&text) {
            Envelope::Opened(plain) => Some(plain),
            Envelope::NotEncrypted => {
                debug!(setting = %path, "encrypted setting stored as plaintext, passing through");
                Some(text)
            }
            Envelope::Corrupt => {
                self.error(ConfigError::new(
                    ErrorCode::CryptographyProviderCreationFailed,
                    format!("{path} could not be decrypted"),
                ));
                None
            }
        }
    }

    fn apply_default<T: ScalarValue>(&mut self, path: &str, field: &mut T, desc: &SettingDescriptor) {
        match desc.default {
            Some(text) => match T::from_text(text) {
                Ok(v) => *field = v,
                Err(reason) => self.error(ConfigError::conversion(format!(
                    "default for {path}: {reason}"
                ))),
            },
            None => {
                if let Some(v) = T::absent() {
                    *field = v;
                }
            }
        }
    }

    /// Scalar leaf.
    pub fn value<T: ScalarValue>(&mut self, field: &mut T, desc: SettingDescriptor) {
        if self.failed() {
            return;
        }
        let path = self.member_path(desc.name);
        let Some(mut text) = self.raw_text(&desc) else {
            self.apply_default(&path, field, &desc);
            return;
        };
        if self.encrypts(&desc) {
            match self.decrypt(&path, text) {
                Some(plain) => text = plain,
                None => {
                    self.apply_default(&path, field, &desc);
                    return;
                }
            }
        }
        match T::from_text(&text) {
            Ok(v) => *field = v,
            Err(reason) => {
                self.error(ConfigError::conversion(format!("{path}: {reason}")));
                self.apply_default(&path, field, &desc);
            }
        }
    }

    /// Sequence of scalars. An existing sequence is cleared and refilled in
    /// place; a missing node leaves it untouched.
    pub fn list<T: ScalarValue>(&mut self, field: &mut Vec<T>, desc: SettingDescriptor) {
        if self.failed() {
            return;
        }
        let path = self.member_path(desc.name);
        let Some(container) = self.element.child(desc.name) else {
            return;
        };
        field.clear();
        for (idx, item) in container.children_named(ITEM_ELEMENT).enumerate() {
            let mut text = item.text().unwrap_or_default().to_string();
            if self.encrypts(&desc) {
                match self.decrypt(&path, text) {
                    Some(plain) => text = plain,
                    None => continue,
                }
            }
            match T::from_text(&text) {
                Ok(v) => field.push(v),
                Err(reason) => {
                    self.error(ConfigError::conversion(format!("{path}[{idx}]: {reason}")))
                }
            }
        }
    }

    /// Nested concrete section, populated in place. A missing node reads as
    /// an empty element so the nested defaults still apply.
    pub fn section<T: ConfigSection>(&mut self, field: &mut T, desc: SettingDescriptor) {
        if self.failed() {
            return;
        }
        if !T::NESTABLE {
            self.fail(ConfigError::invalid_type(format!(
                "{} cannot be nested as {}",
                T::NAME,
                self.member_path(desc.name)
            )));
            return;
        }
        let Some(child) = self.element.child(desc.name) else {
            // Still apply the nested section's own defaults.
            self.read_nested(&Element::new(desc.name), field);
            return;
        };
        if desc.encrypt {
            if let Some(inner) = self.unseal(&desc, child) {
                self.read_nested(&inner, field);
            }
        } else {
            self.read_nested(child, field);
        }
    }

    /// Sequence of nested sections, one child element per entry. Encrypted
    /// entries are sealed one by one; an entry that cannot be decrypted is
    /// reported and skipped.
    pub fn sections<T: ConfigSection>(&mut self, field: &mut Vec<T>, desc: SettingDescriptor) {
        if self.failed() {
            return;
        }
        let Some(container) = self.element.child(desc.name) else {
            return;
        };
        field.clear();
        for child in &container.children {
            let mut item = T::default();
            if desc.encrypt {
                match self.unseal(&desc, child) {
                    Some(inner) => self.read_nested(&inner, &mut item),
                    None if self.failed() => return,
                    None => continue,
                }
            } else {
                self.read_nested(child, &mut item);
            }
            if self.failed() {
                return;
            }
            field.push(item);
        }
    }

    /// Member declared as any section type. The concrete type comes from the
    /// node's type attribute; a missing or unknown type is fatal.
    pub fn polymorphic(&mut self, field: &mut Option<Box<dyn DynSection>>, desc: SettingDescriptor) {
        if self.failed() {
            return;
        }
        let path = self.member_path(desc.name);
        let Some(child) = self.element.child(desc.name) else {
            return;
        };
        let Some(type_name) = child.attribute(TYPE_ATTRIBUTE) else {
            self.fail(ConfigError::invalid_type(format!(
                "{path} has no '{TYPE_ATTRIBUTE}' attribute naming its concrete type"
            )));
            return;
        };
        let Some(mut instance) = self.ctx.types.create_section(type_name) else {
            self.fail(ConfigError::invalid_type(format!(
                "{path} names unregistered section type '{type_name}'"
            )));
            return;
        };
        if desc.encrypt {
            let Some(inner) = self.unseal(&desc, child) else {
                return;
            };
            instance.read_element(self, &inner);
        } else {
            instance.read_element(self, child);
        }
        if !self.failed() {
            *field = Some(instance);
        }
    }

    /// Recover the plain element of an encrypted section node.
    fn unseal(&mut self, desc: &SettingDescriptor, element: &Element) -> Option<Element> {
        let path = self.member_path(desc.name);
        let text = element.text().map(str::trim).unwrap_or_default();
        if !element.children.is_empty() || text.is_empty() {
            debug!(setting = %path, "encrypted section stored as plain XML");
            return Some(element.clone());
        }
        let plain = self.decrypt(&path, text.to_string())?;
        match Element::parse(&plain) {
            Ok(mut inner) => {
                inner.name = element.name.clone();
                Some(inner)
            }
            Err(e) => {
                self.fail(ConfigError::new(
                    ErrorCode::InvalidDocument,
                    format!("{path}: decrypted section is not XML: {e}"),
                ));
                None
            }
        }
    }

    /// Read `element` into `target`, through the section's custom handler
    /// when it has one.
    pub(crate) fn read_nested<T: ConfigSection>(&mut self, element: &Element, target: &mut T) {
        if self.failed() {
            return;
        }
        let path = self.member_path(&element.name);
        if self.depth >= MAX_DEPTH {
            self.fail(ConfigError::invalid_type(format!(
                "{path} exceeds the maximum section depth of {MAX_DEPTH}"
            )));
            return;
        }

        if let Some(handler) = T::handler() {
            let handled = handler.read_section(element, self.ctx);
            self.state.absorb(&path, handled.diagnostics);
            match handled.value {
                Ok(value) => *target = value,
                Err(e) => self.fail(e),
            }
            return;
        }

        let mut child = SectionReader {
            element,
            ctx: self.ctx,
            state: &mut *self.state,
            depth: self.depth + 1,
            path,
        };
        target.read_settings(&mut child);
    }
}
