//! Mark-sweep reclamation of unreachable objects.
//!
//! Pools and the write barrier free everything whose lifetime is known
//! statically; what remains are `Shared` objects (and whatever they own)
//! that nothing refers to anymore. [`Runtime::collect`] finds those by
//! tracing from the roots.

use log::debug;

use crate::{ObjectRef, Runtime};

/// Extra roots held outside the runtime, e.g. an embedding's value stack.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(ObjectRef));
}

struct NoRoots;

impl RootProvider for NoRoots {
    fn visit_roots(&mut self, _visitor: &mut dyn FnMut(ObjectRef)) {}
}

impl Runtime {
    /// Frees every object unreachable from the runtime's roots. Returns
    /// the number of objects freed.
    pub fn collect(&mut self) -> usize {
        self.collect_with(&mut NoRoots)
    }

    /// Like [`Runtime::collect`], with the roots of `extra` added.
    ///
    /// Roots: pinned objects, the special objects, explicit roots, every
    /// object still owned by a scope pool and `extra`.
    pub fn collect_with(&mut self, extra: &mut dyn RootProvider) -> usize {
        let mut gray: Vec<ObjectRef> = self
            .heap
            .handles()
            .filter(|&h| self.heap.get(h).is_some_and(|o| o.header.is_pinned()))
            .collect();
        gray.extend(self.specials.objects());
        gray.extend(self.roots.iter().copied());
        gray.extend(self.pools.scope_objects());
        extra.visit_roots(&mut |root| gray.push(root));

        // Mark
        while let Some(next) = gray.pop() {
            let Some(object) = self.heap.get_mut(next) else {
                continue;
            };
            if object.header.is_marked() {
                continue;
            }
            object.header.mark();
            object.for_each_ref(|child| gray.push(child));
        }

        // Sweep
        let handles: Vec<ObjectRef> = self.heap.handles().collect();
        let mut freed = 0;
        for handle in handles {
            let Some(object) = self.heap.get_mut(handle) else {
                continue;
            };
            if object.header.is_marked() || object.header.is_pinned() {
                object.header.unmark();
                continue;
            }
            self.heap.remove(handle);
            freed += 1;
        }
        let heap = &self.heap;
        self.pools.gc_pool_mut().retain(|o| heap.is_live(o));
        self.heap.note_collection();

        debug!(
            "collect: freed {freed}, {} live, {} collections",
            self.heap.len(),
            self.heap.stats().collections
        );
        freed
    }
}
