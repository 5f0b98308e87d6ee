use std::any::Any;
use std::sync::Arc;

use crate::crypto::CryptoProvider;
use crate::master::{ConfigMaster, MasterInner};
use crate::providers::{ProviderRegistry, TypeKey};
use crate::registry::TypeRegistry;
use crate::section::ConfigSection;

/// Builder for a [`ConfigMaster`].
///
/// Everything is optional:
///
/// - **Providers**: [`providers()`](Self::providers): where each type is loaded
///   from. Defaults to an empty registry, which falls back to the built-in
///   default file next to the executable.
/// - **Types**: [`types()`](Self::types): concrete types for polymorphic members
///   and crypto providers by name.
/// - **Crypto**: [`crypto()`](Self::crypto): the provider used for
///   encrypt-flagged settings.
#[derive(Default)]
pub struct ConfigMasterBuilder {
    providers: Option<Arc<ProviderRegistry>>,
    types: Option<Arc<TypeRegistry>>,
    crypto: Option<Arc<dyn CryptoProvider>>,
    encrypt_all: bool,
    instances: Vec<(TypeKey, Arc<dyn Any + Send + Sync>)>,
}

impl ConfigMasterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a provider registry. The master subscribes to its change
    /// notifications to evict stale instances, and unsubscribes when dropped.
    pub fn providers(mut self, providers: Arc<ProviderRegistry>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn types(mut self, types: impl Into<Arc<TypeRegistry>>) -> Self {
        self.types = Some(types.into());
        self
    }

    pub fn crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Encrypt every leaf setting, not only the flagged ones (default: `false`).
    pub fn encrypt_all(mut self, all: bool) -> Self {
        self.encrypt_all = all;
        self
    }

    /// Pre-install a cached instance, as [`ConfigMaster::map_instance`] would.
    pub fn instance<T: ConfigSection>(mut self, instance: T) -> Self {
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(instance);
        self.instances.push((TypeKey::of::<T>(), instance));
        self
    }

    pub fn build(self) -> ConfigMaster {
        let providers = self.providers.unwrap_or_default();
        let inner = Arc::new(MasterInner::new(
            providers.clone(),
            self.types.unwrap_or_default(),
            self.crypto,
            self.encrypt_all,
        ));
        for (key, instance) in self.instances {
            inner.install(key, instance);
        }

        let weak = Arc::downgrade(&inner);
        inner.subscribed(providers.on_type_changed(move |key| {
            if let Some(inner) = weak.upgrade() {
                inner.evict(key);
            }
        }));
        let weak = Arc::downgrade(&inner);
        inner.subscribed(providers.on_default_changed(move || {
            if let Some(inner) = weak.upgrade() {
                inner.evict_unmapped();
            }
        }));

        ConfigMaster { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{ServerSection, fixture_types, test_crypto};
    use crate::provider::MemoryProvider;

    #[test]
    fn defaults_build_an_empty_master() {
        let master = ConfigMaster::builder().build();
        assert!(!master.is_cached::<ServerSection>());
        assert!(!master.types().has_section("FileBackend"));
    }

    #[test]
    fn preinstalled_instances_are_served() {
        let master = ConfigMaster::builder()
            .instance(ServerSection {
                host: "preset".into(),
                ..ServerSection::default()
            })
            .build();
        assert_eq!(master.get_settings::<ServerSection>().unwrap().host, "preset");
    }

    #[test]
    fn types_and_crypto_reach_the_mapping_context() {
        let providers = Arc::new(ProviderRegistry::new());
        let master = ConfigMaster::builder()
            .providers(providers.clone())
            .types(fixture_types())
            .crypto(Arc::new(test_crypto()))
            .encrypt_all(true)
            .build();
        assert!(master.types().has_section("FileBackend"));
        assert!(Arc::ptr_eq(master.providers(), &providers));

        // With encrypt_all, saving through a read-only provider still maps
        // first and only then fails on save.
        providers.map_default_provider(Arc::new(MemoryProvider::empty()));
        let err = master.save_settings(&ServerSection::default()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::NotSupported);
    }

    #[test]
    fn dropped_master_does_not_break_registry_notifications() {
        let providers = Arc::new(ProviderRegistry::new());
        drop(ConfigMaster::builder().providers(providers.clone()).build());
        providers.map_default_provider(Arc::new(MemoryProvider::empty()));
        providers.unmap::<ServerSection>();
        assert_eq!(providers.listener_count(), 0);
    }

    #[test]
    fn masters_unsubscribe_from_a_shared_registry_when_dropped() {
        let providers = Arc::new(ProviderRegistry::new());
        let kept = ConfigMaster::builder().providers(providers.clone()).build();
        assert_eq!(providers.listener_count(), 2);

        for _ in 0..100 {
            let master = ConfigMaster::builder().providers(providers.clone()).build();
            let clone = master.clone();
            drop(master);
            assert_eq!(providers.listener_count(), 4);
            drop(clone);
        }
        assert_eq!(providers.listener_count(), 2);

        // The surviving master still reacts to remapping.
        kept.map_instance(Some(Arc::new(ServerSection {
            host: "cached".into(),
            ..ServerSection::default()
        })));
        assert!(kept.is_cached::<ServerSection>());
        providers
            .map::<ServerSection>()
            .to(Arc::new(MemoryProvider::empty()));
        assert!(!kept.is_cached::<ServerSection>());

        drop(kept);
        assert_eq!(providers.listener_count(), 0);
    }
}
