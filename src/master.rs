//! Per-type cache of loaded config sections.
//!
//! A [`ConfigMaster`] owns one slot per config type. The first
//! [`get_settings`](ConfigMaster::get_settings) for a type resolves its
//! provider through the [`ProviderRegistry`], loads the documents, maps the
//! section and caches the result; later calls return the same `Arc`.
//!
//! Construction runs under the type's slot lock, so concurrent first access
//! produces exactly one instance. Different types load independently.
//!
//! The master listens to its provider registry: remapping a type evicts that
//! type's cached instance, and changing the default provider evicts every
//! instance whose type has no mapping of its own. Those subscriptions are
//! removed when the last clone of the master is dropped.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::builder::ConfigMasterBuilder;
use crate::crypto::CryptoProvider;
use crate::document::{Document, Element};
use crate::error::{ConfigError, XmlfigError};
use crate::mapping::{MappingContext, find_section, read_section, store_section};
use crate::provider::DocumentProvider;
use crate::providers::{ListenerId, ProviderRegistry, TypeKey};
use crate::registry::TypeRegistry;
use crate::section::ConfigSection;

type Instance = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct SlotState {
    instance: Option<Instance>,
    /// Non-fatal errors from the load that produced `instance`.
    errors: Vec<ConfigError>,
    /// Provider `instance` was loaded from.
    source: Option<Arc<dyn DocumentProvider>>,
}

impl SlotState {
    fn clear(&mut self) {
        *self = SlotState::default();
    }
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
}

pub(crate) struct MasterInner {
    pub(crate) providers: Arc<ProviderRegistry>,
    pub(crate) types: Arc<TypeRegistry>,
    pub(crate) crypto: Option<Arc<dyn CryptoProvider>>,
    pub(crate) encrypt_all: bool,
    slots: Mutex<HashMap<TypeKey, Arc<Slot>>>,
    /// Registry listeners to remove on drop.
    subscriptions: Mutex<Vec<ListenerId>>,
}

impl MasterInner {
    pub(crate) fn new(
        providers: Arc<ProviderRegistry>,
        types: Arc<TypeRegistry>,
        crypto: Option<Arc<dyn CryptoProvider>>,
        encrypt_all: bool,
    ) -> Self {
        Self {
            providers,
            types,
            crypto,
            encrypt_all,
            slots: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribed(&self, id: ListenerId) {
        self.subscriptions.lock().push(id);
    }

    fn slot(&self, key: TypeKey) -> Arc<Slot> {
        self.slots.lock().entry(key).or_default().clone()
    }

    pub(crate) fn install(&self, key: TypeKey, instance: Instance) {
        let slot = self.slot(key);
        let mut state = slot.state.lock();
        state.clear();
        state.instance = Some(instance);
    }

    pub(crate) fn evict(&self, key: TypeKey) {
        let slot = self.slots.lock().get(&key).cloned();
        if let Some(slot) = slot {
            slot.state.lock().clear();
            debug!(section = key.name, "evicted cached settings");
        }
    }

    pub(crate) fn evict_unmapped(&self) {
        let slots: Vec<(TypeKey, Arc<Slot>)> = self
            .slots
            .lock()
            .iter()
            .map(|(k, s)| (*k, s.clone()))
            .collect();
        for (key, slot) in slots {
            if !self.providers.is_mapped(key) {
                slot.state.lock().clear();
                debug!(section = key.name, "evicted cached settings after default change");
            }
        }
    }

    fn context(&self) -> MappingContext<'_> {
        MappingContext::new(&self.types)
            .with_optional_crypto(self.crypto.as_deref())
            .encrypt_all(self.encrypt_all)
    }
}

impl Drop for MasterInner {
    fn drop(&mut self) {
        for id in self.subscriptions.get_mut().drain(..) {
            self.providers.remove_listener(id);
        }
    }
}

/// Owned, injectable registry of loaded config sections.
///
/// Cloning is cheap and shares the cache.
#[derive(Clone)]
pub struct ConfigMaster {
    pub(crate) inner: Arc<MasterInner>,
}

impl ConfigMaster {
    pub fn builder() -> ConfigMasterBuilder {
        ConfigMasterBuilder::new()
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.inner.providers
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.inner.types
    }

    /// The cached `T`, loading it on first access.
    ///
    /// A section missing from otherwise well-formed documents is built from
    /// its declared defaults. Non-fatal mapping errors are logged and kept for
    /// [`last_errors`](Self::last_errors).
    pub fn get_settings<T: ConfigSection>(&self) -> Result<Arc<T>, XmlfigError> {
        let key = TypeKey::of::<T>();
        let slot = self.inner.slot(key);
        let mut state = slot.state.lock();

        if let Some(instance) = state.instance.as_ref()
            && let Ok(typed) = instance.clone().downcast::<T>()
        {
            return Ok(typed);
        }

        let provider = self.inner.providers.provider_for::<T>()?;
        provider.initialize()?;
        let documents = provider.load()?;
        let ctx = self.inner.context();
        let mapped = match find_section(&documents, T::NAME)? {
            Some(element) => read_section::<T>(element, &ctx)?,
            None => {
                debug!(section = T::NAME, source = %provider, "section not present, using defaults");
                read_section::<T>(&Element::new(T::NAME), &ctx)?
            }
        };
        for error in &mapped.errors {
            warn!(section = T::NAME, code = %error.code, "{}", error.message);
        }

        let typed = Arc::new(mapped.value);
        state.instance = Some(typed.clone());
        state.errors = mapped.errors;
        state.source = Some(provider);
        info!(section = T::NAME, "settings loaded");
        Ok(typed)
    }

    /// Force the cached `T` to `instance`, bypassing load, or evict it with
    /// `None` so the next access loads a fresh one.
    pub fn map_instance<T: ConfigSection>(&self, instance: Option<Arc<T>>) {
        let key = TypeKey::of::<T>();
        match instance {
            Some(instance) => {
                self.inner.install(key, instance);
                debug!(section = T::NAME, "instance mapped");
            }
            None => self.inner.evict(key),
        }
    }

    pub fn is_cached<T: ConfigSection>(&self) -> bool {
        let slot = self.inner.slot(TypeKey::of::<T>());
        slot.state.lock().instance.is_some()
    }

    /// Non-fatal errors from the load that produced the cached `T`.
    pub fn last_errors<T: ConfigSection>(&self) -> Vec<ConfigError> {
        let slot = self.inner.slot(TypeKey::of::<T>());
        slot.state.lock().errors.clone()
    }

    /// Write `value` through `T`'s provider and make it the cached instance.
    ///
    /// Other sections already stored in the target document are preserved.
    pub fn save_settings<T: ConfigSection>(&self, value: &T) -> Result<Vec<ConfigError>, XmlfigError> {
        let provider = self.inner.providers.provider_for::<T>()?;
        provider.initialize()?;
        let mut document = provider.load()?.pop().unwrap_or_else(Document::default);
        let errors = store_section(&mut document, value, &self.inner.context())?;
        provider.save(&document)?;

        let slot = self.inner.slot(TypeKey::of::<T>());
        let mut state = slot.state.lock();
        state.instance = Some(Arc::new(value.clone()));
        state.errors = errors.clone();
        state.source = Some(provider);
        info!(section = T::NAME, "settings saved");
        Ok(errors)
    }

    /// Drop the cached `T` and load it again.
    pub fn reload<T: ConfigSection>(&self) -> Result<Arc<T>, XmlfigError> {
        self.inner.evict(TypeKey::of::<T>());
        self.get_settings::<T>()
    }

    /// Delete `T`'s backing storage and evict the cached instance.
    pub fn delete_settings<T: ConfigSection>(&self) -> Result<(), XmlfigError> {
        let provider = self.inner.providers.provider_for::<T>()?;
        provider.delete()?;
        self.inner.evict(TypeKey::of::<T>());
        info!(section = T::NAME, source = %provider, "settings deleted");
        Ok(())
    }

    /// Whether the storage the cached `T` came from changed since it was
    /// loaded. False when nothing is cached.
    pub fn is_stale<T: ConfigSection>(&self) -> bool {
        let slot = self.inner.slot(TypeKey::of::<T>());
        let source = slot.state.lock().source.clone();
        source.is_some_and(|p| p.modified_since_load())
    }
}

impl std::fmt::Debug for ConfigMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMaster")
            .field("providers", &self.inner.providers)
            .field("types", &self.inner.types)
            .field("cached", &self.inner.slots.lock().len())
            .finish()
    }
}
