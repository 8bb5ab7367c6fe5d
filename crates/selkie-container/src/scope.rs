//! Hierarchical service scope.
//!
//! A scope is a typed and named key/value registry with a parent link.
//! Lookups walk the chain from the local scope upward, so an agent resolves
//! its host's services without copies. Registration is always local.

use crate::error::{ContainerError, ContainerResult};
use crate::hook::ServiceHook;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Longest parent chain a scope may be linked into.
const SCOPE_CHAIN_DEPTH_MAX: usize = 64;

type AnyValue = Arc<dyn Any + Send + Sync>;

/// Typed + named service registry with a parent link.
pub struct ServiceScope {
    parent: RwLock<Option<Arc<ServiceScope>>>,
    typed: RwLock<HashMap<TypeId, AnyValue>>,
    named: RwLock<HashMap<String, AnyValue>>,
    hooks: Mutex<Vec<Arc<dyn ServiceHook>>>,
}

impl ServiceScope {
    /// Fresh scope with no parent.
    pub fn new() -> Self {
        Self {
            parent: RwLock::new(None),
            typed: RwLock::new(HashMap::new()),
            named: RwLock::new(HashMap::new()),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Fresh scope already linked under `parent`.
    pub fn with_parent(parent: Arc<ServiceScope>) -> Self {
        let scope = Self::new();
        *scope.parent.write().unwrap() = Some(parent);
        scope
    }

    // =========================================================================
    // Parent link
    // =========================================================================

    /// Link this scope under `parent`. Replaces any existing link.
    ///
    /// Fails if `parent`'s chain already contains this scope (a cycle would
    /// turn every lookup into an infinite walk).
    pub fn set_parent(&self, parent: Arc<ServiceScope>) -> ContainerResult<()> {
        let mut cursor = Some(parent.clone());
        let mut depth = 0;
        while let Some(scope) = cursor {
            if std::ptr::eq(Arc::as_ptr(&scope), self as *const _) {
                return Err(ContainerError::ParentCycle);
            }
            depth += 1;
            if depth > SCOPE_CHAIN_DEPTH_MAX {
                return Err(ContainerError::ParentCycle);
            }
            cursor = scope.parent();
        }
        *self.parent.write().unwrap() = Some(parent);
        debug!(depth, "scope linked under parent");
        Ok(())
    }

    /// Drop the parent link, if any.
    pub fn clear_parent(&self) {
        *self.parent.write().unwrap() = None;
    }

    pub fn parent(&self) -> Option<Arc<ServiceScope>> {
        self.parent.read().unwrap().clone()
    }

    // =========================================================================
    // Typed registration
    // =========================================================================

    /// Register a value under its type. Replaces a previous value of the
    /// same type in this scope; parent entries are shadowed, not touched.
    pub fn put<T: Any + Send + Sync>(&self, value: T) {
        self.typed
            .write()
            .unwrap()
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Typed lookup walking the parent chain.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        if let Some(value) = self.typed.read().unwrap().get(&TypeId::of::<T>()) {
            return value.clone().downcast::<T>().ok();
        }
        let mut cursor = self.parent();
        while let Some(scope) = cursor {
            if let Some(value) = scope.typed.read().unwrap().get(&TypeId::of::<T>()) {
                return value.clone().downcast::<T>().ok();
            }
            cursor = scope.parent();
        }
        None
    }

    /// Like [`ServiceScope::get`] but clones the value out and fails with the
    /// type name when absent. Convenient for `Arc<dyn Trait>` services.
    pub fn resolve<T: Any + Send + Sync + Clone>(&self) -> ContainerResult<T> {
        self.get::<T>()
            .map(|value| (*value).clone())
            .ok_or_else(|| ContainerError::service_not_found(type_name::<T>()))
    }

    // =========================================================================
    // Named registration
    // =========================================================================

    /// Register a value under an explicit key in this scope.
    pub fn put_named<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.named
            .write()
            .unwrap()
            .insert(key.into(), Arc::new(value));
    }

    /// Remove a named entry from this scope only. Parents are untouched.
    pub fn remove_named(&self, key: &str) -> bool {
        self.named.write().unwrap().remove(key).is_some()
    }

    /// Named lookup walking the parent chain.
    pub fn get_named<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        if let Some(value) = self.named.read().unwrap().get(key) {
            return value.clone().downcast::<T>().ok();
        }
        let mut cursor = self.parent();
        while let Some(scope) = cursor {
            if let Some(value) = scope.named.read().unwrap().get(key) {
                return value.clone().downcast::<T>().ok();
            }
            cursor = scope.parent();
        }
        None
    }

    // =========================================================================
    // Hooked services
    // =========================================================================

    /// Register a service that participates in deployment. The value is
    /// retrievable via [`ServiceScope::get`] like any typed entry, and its
    /// hook runs when the owning agent is deployed.
    pub fn install<T>(&self, service: Arc<T>)
    where
        T: ServiceHook + Any + Send + Sync,
    {
        self.typed
            .write()
            .unwrap()
            .insert(TypeId::of::<T>(), service.clone() as AnyValue);
        let hook = service as Arc<dyn ServiceHook>;
        debug!(service = hook.name(), "hooked service installed");
        self.hooks.lock().unwrap().push(hook);
    }

    /// Snapshot of the installed hooks, in installation order.
    pub fn hooks(&self) -> Vec<Arc<dyn ServiceHook>> {
        self.hooks.lock().unwrap().clone()
    }

    /// Number of typed entries in this scope only.
    pub fn len(&self) -> usize {
        self.typed.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.typed.read().unwrap().is_empty() && self.named.read().unwrap().is_empty()
    }
}

impl Default for ServiceScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceScope")
            .field("typed", &self.typed.read().unwrap().len())
            .field("named", &self.named.read().unwrap().len())
            .field("hooks", &self.hooks.lock().unwrap().len())
            .field("has_parent", &self.parent.read().unwrap().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContainerResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_typed_put_get() {
        let scope = ServiceScope::new();
        scope.put(41u64);
        assert_eq!(*scope.get::<u64>().unwrap(), 41);
        assert!(scope.get::<u32>().is_none());
    }

    #[test]
    fn test_lookup_walks_parent_chain() {
        let grandparent = Arc::new(ServiceScope::new());
        grandparent.put("from the top".to_string());

        let parent = Arc::new(ServiceScope::with_parent(grandparent));
        let child = ServiceScope::with_parent(parent);

        assert_eq!(*child.get::<String>().unwrap(), "from the top");
    }

    #[test]
    fn test_local_entry_shadows_parent() {
        let parent = Arc::new(ServiceScope::new());
        parent.put(1u8);
        let child = ServiceScope::with_parent(parent.clone());
        child.put(2u8);

        assert_eq!(*child.get::<u8>().unwrap(), 2);
        assert_eq!(*parent.get::<u8>().unwrap(), 1);
    }

    #[test]
    fn test_named_lookup() {
        let parent = Arc::new(ServiceScope::new());
        parent.put_named("greeting", "hello".to_string());
        let child = ServiceScope::with_parent(parent);

        assert_eq!(*child.get_named::<String>("greeting").unwrap(), "hello");
        assert!(child.get_named::<String>("absent").is_none());
        // Wrong type under a present key.
        assert!(child.get_named::<u32>("greeting").is_none());
    }

    #[test]
    fn test_resolve_reports_type_name() {
        let scope = ServiceScope::new();
        let err = scope.resolve::<String>().unwrap_err();
        assert!(err.to_string().contains("String"));
    }

    #[test]
    fn test_parent_cycle_rejected() {
        let a = Arc::new(ServiceScope::new());
        let b = Arc::new(ServiceScope::with_parent(a.clone()));
        // Linking a under b would close a -> b -> a.
        assert!(matches!(
            a.set_parent(b),
            Err(ContainerError::ParentCycle)
        ));
    }

    #[test]
    fn test_clear_parent_unlinks() {
        let parent = Arc::new(ServiceScope::new());
        parent.put(9i32);
        let child = ServiceScope::with_parent(parent);
        assert!(child.get::<i32>().is_some());

        child.clear_parent();
        assert!(child.get::<i32>().is_none());
    }

    struct Seen {
        count: AtomicUsize,
    }

    #[async_trait]
    impl ServiceHook for Seen {
        fn name(&self) -> &str {
            "seen"
        }

        async fn on_deploy(&self, _scope: &Arc<ServiceScope>) -> ContainerResult<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_install_registers_value_and_hook() {
        let scope = Arc::new(ServiceScope::new());
        scope.install(Arc::new(Seen {
            count: AtomicUsize::new(0),
        }));

        let hooks = scope.hooks();
        assert_eq!(hooks.len(), 1);
        hooks[0].on_deploy(&scope).await.unwrap();

        let service = scope.get::<Seen>().unwrap();
        assert_eq!(service.count.load(Ordering::SeqCst), 1);
    }
}
