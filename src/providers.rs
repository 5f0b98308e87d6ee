//! Which document provider each config type is loaded from.
//!
//! Lookup order for a type: its own mapping, then the default mapping, then
//! the built-in [`DefaultFileProvider`]. Mappings hold either a shared
//! instance or a factory called on every resolution.
//!
//! Every mutating call notifies exactly one listener channel:
//! type-specific mutations call the [`on_type_changed`](ProviderRegistry::on_type_changed)
//! listeners with the affected [`TypeKey`]; default mutations call the
//! [`on_default_changed`](ProviderRegistry::on_default_changed) listeners.
//! Listeners run after the registry lock is released, so they may query the
//! registry. Each subscription returns a [`ListenerId`] that
//! [`remove_listener`](ProviderRegistry::remove_listener) takes back.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::error::XmlfigError;
use crate::file::DefaultFileProvider;
use crate::provider::DocumentProvider;
use crate::section::ConfigSection;

/// Runtime identity of a config type.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn DocumentProvider> + Send + Sync>;

type TypeListener = Arc<dyn Fn(TypeKey) + Send + Sync>;
type DefaultListener = Arc<dyn Fn() + Send + Sync>;

/// Handle for one registered change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A mapped provider: one shared instance, or a factory.
#[derive(Clone)]
pub enum ProviderBinding {
    Instance(Arc<dyn DocumentProvider>),
    Factory(ProviderFactory),
}

impl ProviderBinding {
    pub fn resolve(&self) -> Arc<dyn DocumentProvider> {
        match self {
            ProviderBinding::Instance(provider) => provider.clone(),
            ProviderBinding::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for ProviderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderBinding::Instance(p) => f.debug_tuple("Instance").field(p).finish(),
            ProviderBinding::Factory(_) => f.write_str("Factory"),
        }
    }
}

#[derive(Default)]
struct Mappings {
    types: HashMap<TypeKey, ProviderBinding>,
    default: Option<ProviderBinding>,
}

#[derive(Default)]
pub struct ProviderRegistry {
    mappings: RwLock<Mappings>,
    builtin: Mutex<Option<Arc<dyn DocumentProvider>>>,
    next_listener: AtomicU64,
    type_listeners: RwLock<Vec<(ListenerId, TypeListener)>>,
    default_listeners: RwLock<Vec<(ListenerId, DefaultListener)>>,
}

/// Returned by [`ProviderRegistry::map`]; installs the mapping for `T`.
#[must_use = "a binder does nothing until `.to(..)` or `.to_factory(..)` is called"]
pub struct ProviderBinder<'r, T> {
    registry: &'r ProviderRegistry,
    _type: PhantomData<fn() -> T>,
}

impl<T: ConfigSection> ProviderBinder<'_, T> {
    pub fn to(self, provider: Arc<dyn DocumentProvider>) {
        self.registry
            .bind(TypeKey::of::<T>(), ProviderBinding::Instance(provider));
    }

    pub fn to_factory<F>(self, factory: F)
    where
        F: Fn() -> Arc<dyn DocumentProvider> + Send + Sync + 'static,
    {
        self.registry
            .bind(TypeKey::of::<T>(), ProviderBinding::Factory(Arc::new(factory)));
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map<T: ConfigSection>(&self) -> ProviderBinder<'_, T> {
        ProviderBinder {
            registry: self,
            _type: PhantomData,
        }
    }

    fn bind(&self, key: TypeKey, binding: ProviderBinding) {
        self.mappings.write().types.insert(key, binding);
        info!(section = key.name, "provider mapped");
        self.notify_type(key);
    }

    pub fn unmap<T: ConfigSection>(&self) {
        let key = TypeKey::of::<T>();
        let removed = self.mappings.write().types.remove(&key).is_some();
        info!(section = key.name, removed, "provider unmapped");
        self.notify_type(key);
    }

    pub fn has_mapping<T: ConfigSection>(&self) -> bool {
        self.is_mapped(TypeKey::of::<T>())
    }

    pub fn is_mapped(&self, key: TypeKey) -> bool {
        self.mappings.read().types.contains_key(&key)
    }

    /// The provider mapped specifically for `T`, if any.
    pub fn resolve_provider<T: ConfigSection>(&self) -> Option<Arc<dyn DocumentProvider>> {
        let binding = self.mappings.read().types.get(&TypeKey::of::<T>()).cloned();
        binding.map(|b| b.resolve())
    }

    /// The provider `T` is loaded from, after falling back through the
    /// default mapping and the built-in default file.
    pub fn provider_for<T: ConfigSection>(&self) -> Result<Arc<dyn DocumentProvider>, XmlfigError> {
        match self.resolve_provider::<T>() {
            Some(provider) => Ok(provider),
            None => self.default_provider(),
        }
    }

    pub fn map_default_provider(&self, provider: Arc<dyn DocumentProvider>) {
        self.set_default(Some(ProviderBinding::Instance(provider)));
    }

    pub fn map_default_factory<F>(&self, factory: F)
    where
        F: Fn() -> Arc<dyn DocumentProvider> + Send + Sync + 'static,
    {
        self.set_default(Some(ProviderBinding::Factory(Arc::new(factory))));
    }

    pub fn unmap_default_provider(&self) {
        self.set_default(None);
    }

    fn set_default(&self, binding: Option<ProviderBinding>) {
        let mapped = binding.is_some();
        self.mappings.write().default = binding;
        info!(mapped, "default provider changed");
        self.notify_default();
    }

    /// The configured default provider, or the built-in default file.
    pub fn default_provider(&self) -> Result<Arc<dyn DocumentProvider>, XmlfigError> {
        let binding = self.mappings.read().default.clone();
        if let Some(binding) = binding {
            return Ok(binding.resolve());
        }
        let mut builtin = self.builtin.lock();
        if let Some(provider) = builtin.as_ref() {
            return Ok(provider.clone());
        }
        let provider: Arc<dyn DocumentProvider> = Arc::new(DefaultFileProvider::new()?);
        *builtin = Some(provider.clone());
        Ok(provider)
    }

    pub fn on_type_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(TypeKey) + Send + Sync + 'static,
    {
        let id = self.next_listener_id();
        self.type_listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn on_default_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_listener_id();
        self.default_listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribe a listener from whichever channel it was registered on.
    /// Returns false for an unknown or already removed id.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut types = self.type_listeners.write();
        if let Some(pos) = types.iter().position(|(l, _)| *l == id) {
            types.remove(pos);
            return true;
        }
        drop(types);
        let mut defaults = self.default_listeners.write();
        match defaults.iter().position(|(l, _)| *l == id) {
            Some(pos) => {
                defaults.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Listeners currently registered on both channels.
    pub fn listener_count(&self) -> usize {
        self.type_listeners.read().len() + self.default_listeners.read().len()
    }

    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    fn notify_type(&self, key: TypeKey) {
        let listeners: Vec<TypeListener> =
            self.type_listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(key);
        }
    }

    fn notify_default(&self) {
        let listeners: Vec<DefaultListener> =
            self.default_listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener();
        }
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mappings = self.mappings.read();
        let names: Vec<&str> = mappings.types.keys().map(|k| k.name).collect();
        f.debug_struct("ProviderRegistry")
            .field("types", &names)
            .field("default", &mappings.default)
            .finish_non_exhaustive()
    }
}
