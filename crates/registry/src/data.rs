use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-wide `name -> value` store. This is the survivable side of a hot
/// reload: anything a module wants to keep across a swap goes here rather
/// than in module statics.
///
/// `set_data` is first-write-wins, matching how modules publish their
/// contexts exactly once on initial load and find them again on reload.
#[derive(Default)]
pub struct DataRegistry {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl DataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `data` under `name`. A name that is already present keeps
    /// its original value.
    pub fn set_data(&mut self, name: impl Into<String>, data: Arc<dyn Any + Send + Sync>) {
        let name = name.into();
        if self.entries.contains_key(&name) {
            tracing::debug!("data registry: '{name}' already set, keeping original");
            return;
        }
        self.entries.insert(name, data);
    }

    pub fn get_data(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.entries.get(name).cloned()
    }

    /// Typed lookup.
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name)?.clone().downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_wins() {
        let mut data = DataRegistry::new();
        data.set_data("frame_count", Arc::new(7u64));
        data.set_data("frame_count", Arc::new(9u64));
        assert_eq!(*data.get_as::<u64>("frame_count").unwrap(), 7);
    }

    #[test]
    fn missing_and_mistyped_reads_are_none() {
        let mut data = DataRegistry::new();
        data.set_data("frame_count", Arc::new(7u64));
        assert!(data.get_data("unmapped").is_none());
        assert!(data.get_as::<String>("frame_count").is_none());
    }
}
