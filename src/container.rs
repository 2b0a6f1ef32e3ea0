//! Binding storage and the singleton cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::binding::Binding;
use crate::descriptors::BindingDescriptor;
use crate::error::{DiError, DiResult};
use crate::key::BindingKey;
use crate::registration::Instance;
use crate::scope::Scope;

/// Bindings keyed by (type, qualifier) plus the singleton cache.
///
/// Once [`lock`](Container::lock)ed, the binding set is frozen; the
/// singleton cache keeps filling.
///
/// Each singleton key owns a cell that is initialized at most once.
/// Threads missing the same key concurrently wait for the one that
/// constructs it. Construction of different keys runs in parallel.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Binding, BindingKey, Container, DiError, Scope};
/// use std::sync::Arc;
///
/// let container = Container::new();
/// container.bind(BindingKey::of("LogInterface"), Binding::to_class("Log")).unwrap();
///
/// let key = BindingKey::of("LogInterface");
/// let a = container.get(&key, Scope::Singleton, || Ok(Arc::new(1u8))).unwrap();
/// let b = container.get(&key, Scope::Singleton, || Ok(Arc::new(2u8))).unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// container.lock();
/// assert!(matches!(
///     container.bind(BindingKey::of("Db"), Binding::to_class("Db")),
///     Err(DiError::ContainerLocked(_))
/// ));
/// ```
#[derive(Default)]
pub struct Container {
    bindings: RwLock<BTreeMap<BindingKey, Binding>>,
    singletons: Mutex<HashMap<BindingKey, Arc<OnceCell<Instance>>>>,
    creation_order: Mutex<Vec<BindingKey>>,
    origins: Mutex<HashMap<BindingKey, Binding>>,
    locked: Arc<AtomicBool>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a binding.
    pub fn bind(&self, key: BindingKey, binding: Binding) -> DiResult<()> {
        if self.is_locked() {
            return Err(DiError::ContainerLocked(key.to_string()));
        }
        debug!(key = %key, target = ?binding.target, scope = ?binding.scope, "binding registered");
        self.bindings.write().insert(key, binding);
        Ok(())
    }

    /// Adds several bindings, all or none.
    pub fn bind_all(&self, bindings: impl IntoIterator<Item = (BindingKey, Binding)>) -> DiResult<()> {
        let bindings: Vec<_> = bindings.into_iter().collect();
        if self.is_locked() {
            let first = bindings.first().map(|(k, _)| k.to_string()).unwrap_or_default();
            return Err(DiError::ContainerLocked(first));
        }
        for (key, binding) in bindings {
            self.bind(key, binding)?;
        }
        Ok(())
    }

    pub fn binding(&self, key: &BindingKey) -> Option<Binding> {
        self.bindings.read().get(key).cloned()
    }

    pub fn bindings(&self) -> Vec<(BindingKey, Binding)> {
        self.bindings
            .read()
            .iter()
            .map(|(k, b)| (k.clone(), b.clone()))
            .collect()
    }

    pub fn descriptors(&self) -> Vec<BindingDescriptor> {
        self.bindings
            .read()
            .iter()
            .map(|(k, b)| BindingDescriptor::new(k, b))
            .collect()
    }

    /// Freezes the binding set.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Flag flipped by [`lock`](Self::lock), for a [`Config`](crate::Config) to share.
    pub(crate) fn lock_flag(&self) -> Arc<AtomicBool> {
        self.locked.clone()
    }

    /// Returns the cached singleton for `key` or builds one; prototypes always build.
    pub fn get<F>(&self, key: &BindingKey, scope: Scope, construct: F) -> DiResult<Instance>
    where
        F: FnOnce() -> DiResult<Instance>,
    {
        self.get_or_create(key, scope, construct).map(|(instance, _)| instance)
    }

    /// Like [`get`](Self::get); the flag is true when this call cached a new singleton.
    pub(crate) fn get_or_create<F>(&self, key: &BindingKey, scope: Scope, construct: F) -> DiResult<(Instance, bool)>
    where
        F: FnOnce() -> DiResult<Instance>,
    {
        if scope == Scope::Prototype {
            return construct().map(|instance| (instance, false));
        }
        // The map lock is released before construction, which recurses.
        let cell = self.singletons.lock().entry(key.clone()).or_default().clone();
        if let Some(cached) = cell.get() {
            return Ok((cached.clone(), false));
        }

        let mut created = false;
        let instance = cell
            .get_or_try_init(|| {
                created = true;
                construct()
            })?
            .clone();
        if created {
            self.creation_order.lock().push(key.clone());
        }
        Ok((instance, created))
    }

    pub fn cached(&self, key: &BindingKey) -> Option<Instance> {
        self.singletons.lock().get(key).and_then(|cell| cell.get().cloned())
    }

    /// Keys of cached singletons in creation order.
    pub fn singleton_keys(&self) -> Vec<BindingKey> {
        self.creation_order.lock().clone()
    }

    /// Records the binding a singleton was resolved through.
    pub(crate) fn record_origin(&self, key: &BindingKey, binding: &Binding) {
        self.origins.lock().insert(key.clone(), binding.clone());
    }

    /// Cached singletons in creation order with the binding each was built
    /// from; explicit bindings fill in for keys with no recorded origin.
    pub(crate) fn singleton_bindings(&self) -> Vec<(BindingKey, Binding)> {
        let origins = self.origins.lock();
        self.creation_order
            .lock()
            .iter()
            .filter_map(|key| {
                let binding = origins.get(key).cloned().or_else(|| self.binding(key))?;
                Some((key.clone(), binding))
            })
            .collect()
    }

    /// Drops every cached singleton.
    pub(crate) fn clear_singletons(&self) {
        self.singletons.lock().clear();
        self.creation_order.lock().clear();
        self.origins.lock().clear();
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.bindings.read().len())
            .field("singletons", &self.creation_order.lock().len())
            .field("locked", &self.is_locked())
            .finish()
    }
}
