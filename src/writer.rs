//! Object-to-document half of the mapping engine. Mirrors [`reader`](crate::reader).

use crate::document::Element;
use crate::error::ConfigError;
use crate::mapping::{MAX_DEPTH, MappingContext, MappingState};
use crate::scalar::ScalarValue;
use crate::section::{ConfigSection, DynSection, ITEM_ELEMENT, SettingDescriptor, TYPE_ATTRIBUTE};

pub struct SectionWriter<'a> {
    element: &'a mut Element,
    ctx: &'a MappingContext<'a>,
    state: &'a mut MappingState,
    depth: usize,
    path: String,
}

impl<'a> SectionWriter<'a> {
    pub(crate) fn new(
        element: &'a mut Element,
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

    /// The element being built.
    pub fn element(&mut self) -> &mut Element {
        &mut *self.element
    }

    pub fn context(&self) -> &MappingContext<'a> {
        self.ctx
    }

    pub fn error(&mut self, error: ConfigError) {
        self.state.errors.push(error);
    }

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

    fn encrypt(&mut self, path: &str, text: &str) -> Option<String> {
        match self.ctx.crypto {
            Some(crypto) => Some(crypto.encrypt(text)),
            None => {
                self.fail(ConfigError::invalid_type(format!(
                    "{path} is encrypted but no crypto provider is configured"
                )));
                None
            }
        }
    }

    /// Scalar leaf. Null values are not written.
    pub fn value<T: ScalarValue>(&mut self, field: &T, desc: SettingDescriptor) {
        if self.failed() || field.is_null() {
            return;
        }
        let mut text = field.to_text();
        if self.encrypts(&desc) {
            let path = self.member_path(desc.name);
            match self.encrypt(&path, &text) {
                Some(cipher) => text = cipher,
                None => return,
            }
        }
        if desc.attribute {
            self.element.set_attribute(desc.name, text);
        } else {
            self.element.push_child(Element::with_text(desc.name, text));
        }
    }

    /// Sequence of scalars as `<Item>` children.
    pub fn list<T: ScalarValue>(&mut self, field: &[T], desc: SettingDescriptor) {
        if self.failed() {
            return;
        }
        let path = self.member_path(desc.name);
        let mut container = Element::new(desc.name);
        for item in field.iter().filter(|v| !v.is_null()) {
            let mut text = item.to_text();
            if self.encrypts(&desc) {
                match self.encrypt(&path, &text) {
                    Some(cipher) => text = cipher,
                    None => return,
                }
            }
            container.push_child(Element::with_text(ITEM_ELEMENT, text));
        }
        self.element.push_child(container);
    }

    pub fn section<T: ConfigSection>(&mut self, field: &T, desc: SettingDescriptor) {
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
        let Some(mut child) = self.write_nested(desc.name, field) else {
            return;
        };
        if desc.encrypt {
            match self.seal(&desc, child) {
                Some(sealed) => child = sealed,
                None => return,
            }
        }
        self.element.push_child(child);
    }

    pub fn sections<T: ConfigSection>(&mut self, field: &[T], desc: SettingDescriptor) {
        if self.failed() {
            return;
        }
        let mut container = Element::new(desc.name);
        for item in field {
            let Some(mut child) = self.write_nested(T::NAME, item) else {
                return;
            };
            if desc.encrypt {
                match self.seal(&desc, child) {
                    Some(sealed) => child = sealed,
                    None => return,
                }
            }
            container.push_child(child);
        }
        self.element.push_child(container);
    }

    /// Member declared as any section type; always written with a type
    /// attribute so a later read can resolve it.
    pub fn polymorphic(&mut self, field: &Option<Box<dyn DynSection>>, desc: SettingDescriptor) {
        if self.failed() {
            return;
        }
        let Some(instance) = field else {
            return;
        };
        let Some(mut child) = instance.write_element(self, desc.name) else {
            return;
        };
        if child.attribute(TYPE_ATTRIBUTE).is_some() {
            self.fail(ConfigError::invalid_type(format!(
                "{} declares a '{TYPE_ATTRIBUTE}' attribute, which is reserved for polymorphic {}",
                instance.section_name(),
                self.member_path(desc.name)
            )));
            return;
        }
        if desc.encrypt {
            match self.seal(&desc, child) {
                Some(sealed) => child = sealed,
                None => return,
            }
        }
        child.set_attribute(TYPE_ATTRIBUTE, instance.section_name());
        self.element.push_child(child);
    }

    /// Replace a section element's content with its encrypted serialization.
    fn seal(&mut self, desc: &SettingDescriptor, element: Element) -> Option<Element> {
        let path = self.member_path(desc.name);
        let plain = match element.to_xml_string() {
            Ok(xml) => xml,
            Err(e) => {
                self.fail(ConfigError::invalid_type(format!("{path}: {e}")));
                return None;
            }
        };
        let cipher = self.encrypt(&path, &plain)?;
        Some(Element::with_text(element.name, cipher))
    }

    /// Build the element for `value`, through the section's custom handler
    /// when it has one.
    pub(crate) fn write_nested<T: ConfigSection>(&mut self, name: &str, value: &T) -> Option<Element> {
        if self.failed() {
            return None;
        }
        let path = self.member_path(name);
        if self.depth >= MAX_DEPTH {
            self.fail(ConfigError::invalid_type(format!(
                "{path} exceeds the maximum section depth of {MAX_DEPTH}"
            )));
            return None;
        }

        if let Some(handler) = T::handler() {
            let handled = handler.write_section(name, value, self.ctx);
            self.state.absorb(&path, handled.diagnostics);
            return match handled.value {
                Ok(mut element) => {
                    element.name = name.to_string();
                    Some(element)
                }
                Err(e) => {
                    self.fail(e);
                    None
                }
            };
        }

        let mut element = Element::new(name);
        let mut child = SectionWriter {
            element: &mut element,
            ctx: self.ctx,
            state: &mut *self.state,
            depth: self.depth + 1,
            path,
        };
        value.write_settings(&mut child);
        if self.failed() { None } else { Some(element) }
    }
}
