//! Object arena.
//!
//! Objects are stored by value in a growable vector and addressed by
//! [`ObjectRef`] handles. Freed slots are recycled through a free list;
//! every free bumps the slot's generation so old handles stop resolving.

use crate::{Object, ObjectRef};

/// Counters observable by tests and the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Objects ever allocated.
    pub allocated: usize,
    /// Objects freed, by the barrier, a pool release or a collection.
    pub freed: usize,
    /// Promotions to `Shared`.
    pub promoted: usize,
    pub collections: usize,
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    object: Option<Object>,
}

#[derive(Debug, Default)]
pub struct Heap {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
    stats: HeapStats,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: Object) -> ObjectRef {
        self.insert_with(|_| object)
    }

    /// Inserts the object built by `init`, which receives the handle the
    /// object will live at. Needed for self-describing objects.
    pub fn insert_with(
        &mut self,
        init: impl FnOnce(ObjectRef) -> Object,
    ) -> ObjectRef {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    object: None,
                });
                (self.entries.len() - 1) as u32
            }
        };
        let entry = &mut self.entries[index as usize];
        let handle = ObjectRef::new(index, entry.generation);
        entry.object = Some(init(handle));
        self.live += 1;
        self.stats.allocated += 1;
        handle
    }

    #[inline]
    pub fn get(&self, handle: ObjectRef) -> Option<&Object> {
        self.entries
            .get(handle.index())
            .filter(|entry| entry.generation == handle.generation())
            .and_then(|entry| entry.object.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, handle: ObjectRef) -> Option<&mut Object> {
        self.entries
            .get_mut(handle.index())
            .filter(|entry| entry.generation == handle.generation())
            .and_then(|entry| entry.object.as_mut())
    }

    #[inline]
    pub fn is_live(&self, handle: ObjectRef) -> bool {
        self.get(handle).is_some()
    }

    /// Frees the slot behind `handle` and returns its object.
    pub fn remove(&mut self, handle: ObjectRef) -> Option<Object> {
        let entry = self.entries.get_mut(handle.index())?;
        if entry.generation != handle.generation() {
            return None;
        }
        let object = entry.object.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index() as u32);
        self.live -= 1;
        self.stats.freed += 1;
        Some(object)
    }

    /// Number of live objects.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Handles of all live objects in index order.
    pub fn handles(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry
                .object
                .as_ref()
                .map(|_| ObjectRef::new(index as u32, entry.generation))
        })
    }

    #[inline]
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    pub(crate) fn note_promotion(&mut self) {
        self.stats.promoted += 1;
    }

    pub(crate) fn note_collection(&mut self) {
        self.stats.collections += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Data, Ownership};

    fn object(class: ObjectRef) -> Object {
        Object::new(class, 0, Data::None, 0, Ownership::Single)
    }

    #[test]
    fn stale_handles_do_not_resolve() {
        let mut heap = Heap::new();
        let class = ObjectRef::new(0, 0);
        let first = heap.insert(object(class));
        assert!(heap.is_live(first));
        assert!(heap.remove(first).is_some());
        assert!(!heap.is_live(first));
        assert!(heap.remove(first).is_none());

        let second = heap.insert(object(class));
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(heap.get(first).is_none());
        assert!(heap.get(second).is_some());
    }

    #[test]
    fn self_referential_insert() {
        let mut heap = Heap::new();
        let handle = heap.insert_with(object);
        assert_eq!(heap.get(handle).unwrap().class(), handle);
    }

    #[test]
    fn counters() {
        let mut heap = Heap::new();
        let class = ObjectRef::new(0, 0);
        let handles: Vec<_> = (0..4).map(|_| heap.insert(object(class))).collect();
        heap.remove(handles[1]);
        heap.remove(handles[2]);
        assert_eq!(heap.len(), 2);
        let stats = heap.stats();
        assert_eq!(stats.allocated, 4);
        assert_eq!(stats.freed, 2);
        assert_eq!(heap.handles().collect::<Vec<_>>(), vec![
            handles[0], handles[3]
        ]);
    }
}
