use std::any::Any;
use std::sync::Arc;

/// A published interface. Concrete interface types are downcast out of this
/// with [`ApiRegistry::first_as`]; identity (for `remove`/`replace`/`subscribe`)
/// is the allocation, not the name.
pub type ApiHandle = Arc<dyn Any + Send + Sync>;

/// Called when the interface an entry holds is swapped by `replace`. Receives
/// the replacement handle. Subscriptions are single-shot: the list is cleared
/// after every swap.
pub type SwapCallback = Box<dyn FnMut(&ApiHandle) + Send>;

struct ApiEntry {
    name: String,
    interface: ApiHandle,
    subscribers: Vec<SwapCallback>,
}

/// Registry of named interfaces. Multiple entries may share a name; `first`
/// returns the earliest registered one and `next` continues the iteration.
#[derive(Default)]
pub struct ApiRegistry {
    entries: Vec<ApiEntry>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Duplicate names are allowed.
    pub fn add(&mut self, name: impl Into<String>, interface: ApiHandle) {
        let name = name.into();
        tracing::debug!("registering api: {name}");
        self.entries.push(ApiEntry {
            name,
            interface,
            subscribers: Vec::new(),
        });
    }

    /// First interface registered under `name`.
    pub fn first(&self, name: &str) -> Option<ApiHandle> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.interface.clone())
    }

    /// First interface registered under `name`, downcast to `T`.
    pub fn first_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .iter()
            .filter(|e| e.name == name)
            .find_map(|e| e.interface.clone().downcast::<T>().ok())
    }

    /// Next interface sharing `prev`'s name, in registration order.
    pub fn next(&self, prev: &ApiHandle) -> Option<ApiHandle> {
        let pos = self.position(prev)?;
        let name = &self.entries[pos].name;
        self.entries[pos + 1..]
            .iter()
            .find(|e| &e.name == name)
            .map(|e| e.interface.clone())
    }

    /// Unlinks the entry holding `interface` and drops its subscriber list.
    pub fn remove(&mut self, interface: &ApiHandle) {
        if let Some(pos) = self.position(interface) {
            self.entries.swap_remove(pos);
        }
    }

    /// Substitutes `new` into the entry holding `old`, then fires every
    /// subscriber in insertion order and clears the list.
    pub fn replace(&mut self, old: &ApiHandle, new: ApiHandle) {
        if let Some(pos) = self.position(old) {
            let entry = &mut self.entries[pos];
            entry.interface = new;
            let mut subscribers = std::mem::take(&mut entry.subscribers);
            let replacement = entry.interface.clone();
            for callback in &mut subscribers {
                callback(&replacement);
            }
        }
    }

    /// Registers `callback` to fire the next time the entry holding
    /// `interface` is swapped.
    pub fn subscribe(
        &mut self,
        interface: &ApiHandle,
        callback: impl FnMut(&ApiHandle) + Send + 'static,
    ) {
        if let Some(pos) = self.position(interface) {
            self.entries[pos].subscribers.push(Box::new(callback));
        }
    }

    /// Number of entries registered under `name`.
    pub fn count(&self, name: &str) -> usize {
        self.entries.iter().filter(|e| e.name == name).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, interface: &ApiHandle) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| Arc::ptr_eq(&e.interface, interface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CounterApi {
        hits: AtomicU32,
    }

    fn handle(hits: u32) -> ApiHandle {
        Arc::new(CounterApi {
            hits: AtomicU32::new(hits),
        })
    }

    #[test]
    fn duplicate_names_iterate_in_order() {
        let mut registry = ApiRegistry::new();
        let a = handle(1);
        let b = handle(2);
        registry.add("draw", a.clone());
        registry.add("stats", handle(9));
        registry.add("draw", b.clone());

        let first = registry.first("draw").unwrap();
        assert!(Arc::ptr_eq(&first, &a));
        let second = registry.next(&first).unwrap();
        assert!(Arc::ptr_eq(&second, &b));
        assert!(registry.next(&second).is_none());
        assert_eq!(registry.count("draw"), 2);
    }

    #[test]
    fn first_as_downcasts() {
        let mut registry = ApiRegistry::new();
        registry.add("counter", handle(7));
        let api = registry.first_as::<CounterApi>("counter").unwrap();
        assert_eq!(api.hits.load(Ordering::SeqCst), 7);
        assert!(registry.first_as::<CounterApi>("missing").is_none());
    }

    #[test]
    fn replace_fires_subscribers_once() {
        let mut registry = ApiRegistry::new();
        let old = handle(0);
        registry.add("counter", old.clone());

        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        registry.subscribe(&old, move |new| {
            let api = new.clone().downcast::<CounterApi>().unwrap();
            assert_eq!(api.hits.load(Ordering::SeqCst), 42);
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        let new = handle(42);
        registry.replace(&old, new.clone());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // single-shot: a second swap does not refire
        registry.replace(&new, handle(43));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_unlinks_by_identity() {
        let mut registry = ApiRegistry::new();
        let a = handle(1);
        let b = handle(1);
        registry.add("counter", a.clone());
        registry.add("counter", b.clone());
        registry.remove(&a);
        assert_eq!(registry.count("counter"), 1);
        let rest = registry.first("counter").unwrap();
        assert!(Arc::ptr_eq(&rest, &b));
    }
}
