//! Scope-based allocation pools.
//!
//! A [`PoolStack`] holds the collector pool (`PoolId::GC`, lives as long as
//! the runtime) and a stack of [`ScopePool`]s, one per open lexical scope.
//! Each scope extends its capacity with additional fixed-size
//! [`AllocationPool`] blocks instead of chaining pool nodes.

use log::debug;

use crate::{
    ObjectRef, Ownership, PoolId, Runtime, RuntimeError, RuntimeResult,
};

/// Default number of entries per pool block.
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// Fixed-capacity block of object references.
///
/// Invariants:
/// - every index below `ptr` is occupied (`ptr` is the first free index);
/// - `watermark` is one past the highest occupied index, so
///   `ptr <= watermark`;
/// - `count` is the number of occupied entries below `watermark`.
#[derive(Debug, Clone)]
pub struct AllocationPool {
    items: Box<[Option<ObjectRef>]>,
    count: usize,
    ptr: usize,
    watermark: usize,
}

impl AllocationPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: vec![None; capacity].into_boxed_slice(),
            count: 0,
            ptr: 0,
            watermark: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn ptr(&self) -> usize {
        self.ptr
    }

    #[inline]
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.ptr >= self.items.len()
    }

    /// Stores `object` at the first free index. Returns `false` when the
    /// block is full.
    pub fn insert(&mut self, object: ObjectRef) -> bool {
        if self.is_full() {
            return false;
        }
        self.items[self.ptr] = Some(object);
        self.count += 1;
        self.ptr += 1;
        self.watermark = self.watermark.max(self.ptr);
        while self.ptr < self.items.len() && self.items[self.ptr].is_some() {
            self.ptr += 1;
        }
        true
    }

    /// Clears the entry holding `object`. Returns `false` if it is not in
    /// this block.
    pub fn remove(&mut self, object: ObjectRef) -> bool {
        // Removal is mostly LIFO: the entry just below the free cursor is
        // the likeliest candidate.
        let hint = self
            .ptr
            .checked_sub(1)
            .filter(|&i| self.items[i] == Some(object));
        let index = match hint {
            Some(index) => index,
            None => match self.items[..self.watermark]
                .iter()
                .position(|item| *item == Some(object))
            {
                Some(index) => index,
                None => return false,
            },
        };

        self.items[index] = None;
        self.count -= 1;
        self.ptr = self.ptr.min(index);
        while self.watermark > 0 && self.items[self.watermark - 1].is_none() {
            self.watermark -= 1;
        }
        true
    }

    pub fn contains(&self, object: ObjectRef) -> bool {
        self.items[..self.watermark].contains(&Some(object))
    }

    pub fn objects(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.items[..self.watermark].iter().flatten().copied()
    }

    /// Keeps only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(ObjectRef) -> bool) {
        for item in &mut self.items[..self.watermark] {
            if item.is_some_and(|object| !keep(object)) {
                *item = None;
                self.count -= 1;
            }
        }
        self.ptr = self.items.iter().position(Option::is_none).unwrap_or(
            self.items.len(),
        );
        while self.watermark > 0 && self.items[self.watermark - 1].is_none() {
            self.watermark -= 1;
        }
    }
}

/// The pool of one lexical scope: a growable list of blocks.
#[derive(Debug, Clone)]
pub struct ScopePool {
    id: PoolId,
    block_capacity: usize,
    blocks: Vec<AllocationPool>,
}

impl ScopePool {
    pub fn new(id: PoolId, block_capacity: usize) -> Self {
        Self {
            id,
            block_capacity,
            blocks: vec![AllocationPool::new(block_capacity)],
        }
    }

    #[inline]
    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn blocks(&self) -> &[AllocationPool] {
        &self.blocks
    }

    /// Live entries across all blocks.
    pub fn count(&self) -> usize {
        self.blocks.iter().map(AllocationPool::count).sum()
    }

    pub fn insert(&mut self, object: ObjectRef) {
        if let Some(block) = self.blocks.iter_mut().rev().find(|b| !b.is_full())
        {
            block.insert(object);
            return;
        }
        let mut block = AllocationPool::new(self.block_capacity);
        block.insert(object);
        self.blocks.push(block);
    }

    pub fn remove(&mut self, object: ObjectRef) -> bool {
        self.blocks
            .iter_mut()
            .rev()
            .any(|block| block.remove(object))
    }

    pub fn contains(&self, object: ObjectRef) -> bool {
        self.blocks.iter().any(|block| block.contains(object))
    }

    pub fn objects(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.blocks.iter().flat_map(AllocationPool::objects)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(ObjectRef) -> bool) {
        for block in &mut self.blocks {
            block.retain(&mut keep);
        }
    }
}

/// The collector pool plus the stack of open scopes.
#[derive(Debug)]
pub struct PoolStack {
    gc: ScopePool,
    scopes: Vec<ScopePool>,
    next_id: u32,
    block_capacity: usize,
}

impl PoolStack {
    pub fn new(block_capacity: usize) -> Self {
        Self {
            gc: ScopePool::new(PoolId::GC, block_capacity),
            scopes: Vec::new(),
            next_id: 1,
            block_capacity,
        }
    }

    pub fn push(&mut self) -> PoolId {
        let id = PoolId::from_raw(self.next_id);
        self.next_id += 1;
        self.scopes.push(ScopePool::new(id, self.block_capacity));
        id
    }

    /// Innermost open scope, or the collector pool when none is open.
    pub fn current(&self) -> PoolId {
        self.scopes.last().map_or(PoolId::GC, ScopePool::id)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn get(&self, id: PoolId) -> Option<&ScopePool> {
        if id.is_gc() {
            return Some(&self.gc);
        }
        self.scopes.iter().rev().find(|scope| scope.id() == id)
    }

    pub fn get_mut(&mut self, id: PoolId) -> Option<&mut ScopePool> {
        if id.is_gc() {
            return Some(&mut self.gc);
        }
        self.scopes.iter_mut().rev().find(|scope| scope.id() == id)
    }

    pub fn gc_pool(&self) -> &ScopePool {
        &self.gc
    }

    pub(crate) fn gc_pool_mut(&mut self) -> &mut ScopePool {
        &mut self.gc
    }

    /// Pops `id` and every scope opened after it, innermost first.
    pub fn pop(&mut self, id: PoolId) -> RuntimeResult<Vec<ScopePool>> {
        if id.is_gc() {
            return Err(RuntimeError::ReleaseGcPool);
        }
        let position = self
            .scopes
            .iter()
            .position(|scope| scope.id() == id)
            .ok_or(RuntimeError::UnknownPool(id))?;
        let mut popped = self.scopes.split_off(position);
        popped.reverse();
        Ok(popped)
    }

    /// Ids of the open scopes, outermost first.
    pub fn scope_ids(&self) -> impl Iterator<Item = PoolId> + '_ {
        self.scopes.iter().map(ScopePool::id)
    }

    /// Every object held by an open scope.
    pub fn scope_objects(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.scopes.iter().flat_map(ScopePool::objects)
    }
}

// ── Runtime pool operations ───────────────────────────────────────────

impl Runtime {
    /// Opens a new scope pool nested in the current one.
    pub fn new_pool(&mut self) -> PoolId {
        let id = self.pools.push();
        debug!("push {id:?} (depth {})", self.pools.depth());
        id
    }

    #[inline]
    pub fn current_pool(&self) -> PoolId {
        self.pools.current()
    }

    pub fn pool(&self, id: PoolId) -> RuntimeResult<&ScopePool> {
        self.pools.get(id).ok_or(RuntimeError::UnknownPool(id))
    }

    /// Registers `object` with `pool` and updates its ownership: `Shared`
    /// for the collector pool, `Pool(pool)` otherwise.
    pub fn add_to_pool(
        &mut self,
        object: ObjectRef,
        pool: PoolId,
    ) -> RuntimeResult<()> {
        let scope = self
            .pools
            .get_mut(pool)
            .ok_or(RuntimeError::UnknownPool(pool))?;
        scope.insert(object);
        let ownership = if pool.is_gc() {
            Ownership::Shared
        } else {
            Ownership::Pool(pool)
        };
        self.object_mut(object)?.header.set_ownership(ownership);
        Ok(())
    }

    /// Unregisters `object` from `pool`. A missing entry means the
    /// ownership bookkeeping is broken and is reported as fatal.
    pub fn remove_from_pool(
        &mut self,
        object: ObjectRef,
        pool: PoolId,
    ) -> RuntimeResult<()> {
        let scope = self
            .pools
            .get_mut(pool)
            .ok_or(RuntimeError::UnknownPool(pool))?;
        if scope.remove(object) {
            Ok(())
        } else {
            Err(RuntimeError::PoolCorruption { pool, object })
        }
    }

    /// Closes `pool` and frees every object it still owns. Scopes opened
    /// after `pool` and not yet released are released first. Returns the
    /// number of objects freed.
    pub fn release_pool(&mut self, pool: PoolId) -> RuntimeResult<usize> {
        let popped = self.pools.pop(pool)?;
        if popped.len() > 1 {
            self.warning(format!(
                "{pool:?} released with {} open inner scope(s)",
                popped.len() - 1
            ));
        }

        let before = self.heap.stats().freed;
        for scope in popped {
            for object in scope.objects() {
                self.free_object(object)?;
            }
            debug!(
                "release {:?} (depth {})",
                scope.id(),
                self.pools.depth()
            );
        }
        Ok(self.heap.stats().freed - before)
    }
}
