use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use framemux_frame::StreamId;

use crate::stream::StreamCore;
use crate::sync::lock;

/// Identifier to stream mapping for one mux.
///
/// Critical sections are plain map operations; no stream lock is ever taken
/// while the registry lock is held.
#[derive(Default)]
pub(crate) struct Registry {
    streams: Mutex<HashMap<StreamId, Arc<StreamCore>>>,
}

impl Registry {
    /// Return the stream for `id`, creating it if absent.
    ///
    /// The flag is true when this call created the stream.
    pub(crate) fn get_or_create(&self, id: StreamId) -> (Arc<StreamCore>, bool) {
        let mut streams = lock(&self.streams);
        if let Some(core) = streams.get(&id) {
            return (Arc::clone(core), false);
        }
        let core = Arc::new(StreamCore::new(id));
        streams.insert(id, Arc::clone(&core));
        (core, true)
    }

    /// Return the stream for `id` without creating one.
    pub(crate) fn lookup(&self, id: StreamId) -> Option<Arc<StreamCore>> {
        lock(&self.streams).get(&id).cloned()
    }

    /// Copy out every registered stream so callers can lock them one by one.
    pub(crate) fn snapshot(&self) -> Vec<Arc<StreamCore>> {
        lock(&self.streams).values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.streams).len()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn get_or_create_returns_same_instance() {
        let registry = Registry::default();

        let (first, created) = registry.get_or_create(5);
        assert!(created);
        let (second, created) = registry.get_or_create(5);
        assert!(!created);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_does_not_create() {
        let registry = Registry::default();
        assert!(registry.lookup(9).is_none());
        assert_eq!(registry.len(), 0);

        registry.get_or_create(9);
        assert_eq!(registry.lookup(9).map(|core| core.id()), Some(9));
    }

    #[test]
    fn concurrent_creation_yields_one_stream() {
        let registry = Arc::new(Registry::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get_or_create(42))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|(_, created)| *created).count();
        assert_eq!(created, 1);
        assert!(results
            .windows(2)
            .all(|pair| Arc::ptr_eq(&pair[0].0, &pair[1].0)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_lists_all() {
        let registry = Registry::default();
        for id in [1, 2, 3] {
            registry.get_or_create(id);
        }
        let mut ids: Vec<_> = registry.snapshot().iter().map(|core| core.id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
