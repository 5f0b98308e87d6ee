//! Closed registration table for types resolved by name at read time.
//!
//! Polymorphic section members persist the stable [`ConfigSection::NAME`] of
//! their concrete type, and the crypto section persists the name of a crypto
//! provider. Both are looked up here; nothing is discovered implicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::crypto::CryptoProvider;
use crate::section::{ConfigSection, DynSection};

type SectionFactory = fn() -> Box<dyn DynSection>;
type CryptoFactory = Arc<dyn Fn() -> Arc<dyn CryptoProvider> + Send + Sync>;

#[derive(Default)]
pub struct TypeRegistry {
    sections: BTreeMap<String, SectionFactory>,
    crypto: BTreeMap<String, CryptoFactory>,
}

impl TypeRegistry {
    pub const fn new() -> Self {
        Self {
            sections: BTreeMap::new(),
            crypto: BTreeMap::new(),
        }
    }

    /// Make `T` resolvable for polymorphic members under `T::NAME`.
    pub fn register_section<T: ConfigSection>(&mut self) -> &mut Self {
        fn create<T: ConfigSection>() -> Box<dyn DynSection> {
            Box::new(T::default())
        }
        self.sections.insert(T::NAME.to_string(), create::<T>);
        self
    }

    /// Make a crypto provider constructible by name. Key material stays inside
    /// the factory and is never persisted.
    pub fn register_crypto<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn CryptoProvider> + Send + Sync + 'static,
    {
        self.crypto.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn create_section(&self, name: &str) -> Option<Box<dyn DynSection>> {
        self.sections.get(name).map(|create| create())
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn create_crypto(&self, name: &str) -> Option<Arc<dyn CryptoProvider>> {
        self.crypto.get(name).map(|create| create())
    }

    pub fn has_crypto(&self, name: &str) -> bool {
        self.crypto.contains_key(name)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .field("crypto", &self.crypto.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::FixedKeyProvider;
    use crate::fixtures::test::{FileBackend, NetworkBackend};

    #[test]
    fn sections_resolve_by_name() {
        let mut types = TypeRegistry::new();
        types
            .register_section::<FileBackend>()
            .register_section::<NetworkBackend>();

        let created = types.create_section("NetworkBackend").unwrap();
        assert!(created.downcast_ref::<NetworkBackend>().is_some());
        assert!(types.has_section("FileBackend"));
        assert!(types.create_section("Nope").is_none());
    }

    #[test]
    fn crypto_factories_build_fresh_providers() {
        let mut types = TypeRegistry::new();
        types.register_crypto("Fixed", || {
            Arc::new(FixedKeyProvider::new([7; 32], [8; 32])) as Arc<dyn CryptoProvider>
        });
        assert!(types.has_crypto("Fixed"));
        assert!(!types.has_crypto("Other"));

        let a = types.create_crypto("Fixed").unwrap();
        let b = types.create_crypto("Fixed").unwrap();
        assert!(b.is_encrypted(&a.encrypt("shared keys")));
    }

    #[test]
    fn debug_lists_names_only() {
        let mut types = TypeRegistry::new();
        types.register_section::<FileBackend>();
        let out = format!("{types:?}");
        assert!(out.contains("FileBackend"));
    }
}
