use std::rc::Rc;

use ahash::AHashMap;
use log::{trace, warn};

use crate::{
    Behavior, ClassRef, DEFAULT_POOL_CAPACITY, Heap, HeapStats, Object,
    ObjectRef, Ownership, PoolId, PoolStack, RuntimeError, RuntimeResult,
    SpecialObjects, SpecialSymbols, SymbolId, SymbolTable,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeCreateInfo {
    /// Entries per pool block.
    pub pool_capacity: Option<usize>,
    /// Bindings per environment.
    pub environment_capacity: Option<usize>,
    /// Live objects allowed before allocation fails.
    pub object_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub pool_capacity: usize,
    pub environment_capacity: usize,
    pub object_limit: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            environment_capacity: 1024,
            object_limit: 1 << 20,
        }
    }
}

impl RuntimeSettings {
    pub fn from_info(info: RuntimeCreateInfo) -> Self {
        let mut settings = Self::default();
        info.pool_capacity
            .inspect(|&val| settings.pool_capacity = val);
        info.environment_capacity
            .inspect(|&val| settings.environment_capacity = val);
        info.object_limit.inspect(|&val| settings.object_limit = val);
        settings
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.pool_capacity == 0 {
            return Err("pool_capacity must be > 0");
        }
        if self.environment_capacity == 0 {
            return Err("environment_capacity must be > 0");
        }
        // The bootstrap alone allocates a few dozen objects.
        if self.object_limit < 128 {
            return Err("object_limit must be at least 128");
        }
        Ok(())
    }
}

/// One independent object/class runtime.
///
/// Owns the arena, the symbol table, the pool stack, the class registry and
/// the special objects. Everything is reached through `&mut Runtime`; there
/// is no global state.
pub struct Runtime {
    pub(crate) heap: Heap,
    pub symbols: SymbolTable,
    /// Symbols the runtime itself refers to.
    pub sym: SpecialSymbols,
    pub specials: SpecialObjects,
    pub(crate) pools: PoolStack,
    pub(crate) classes: Vec<ClassRef>,
    pub(crate) roots: Vec<ObjectRef>,
    /// Symbol objects handed out by [`Runtime::install`].
    pub(crate) symbol_objects: AHashMap<SymbolId, ObjectRef>,
    warnings: Vec<String>,
    settings: RuntimeSettings,
}

impl Runtime {
    pub fn new(info: RuntimeCreateInfo) -> RuntimeResult<Self> {
        let settings = RuntimeSettings::from_info(info);
        settings.validate().map_err(RuntimeError::InvalidSettings)?;

        let mut symbols = SymbolTable::new();
        let sym = SpecialSymbols::new(&mut symbols);
        let mut runtime = Self {
            heap: Heap::new(),
            symbols,
            sym,
            specials: SpecialObjects::placeholder(),
            pools: PoolStack::new(settings.pool_capacity),
            classes: Vec::new(),
            roots: Vec::new(),
            symbol_objects: AHashMap::new(),
            warnings: Vec::new(),
            settings,
        };
        runtime.bootstrap()?;
        Ok(runtime)
    }

    #[inline]
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn intern(&mut self, name: &str) -> SymbolId {
        self.symbols.intern(name)
    }

    // ── Object access ─────────────────────────────────────────────────

    pub fn object(&self, object: ObjectRef) -> RuntimeResult<&Object> {
        self.heap
            .get(object)
            .ok_or(RuntimeError::DanglingReference(object))
    }

    pub(crate) fn object_mut(
        &mut self,
        object: ObjectRef,
    ) -> RuntimeResult<&mut Object> {
        self.heap
            .get_mut(object)
            .ok_or(RuntimeError::DanglingReference(object))
    }

    #[inline]
    pub fn is_live(&self, object: ObjectRef) -> bool {
        self.heap.is_live(object)
    }

    pub fn ownership(&self, object: ObjectRef) -> RuntimeResult<Ownership> {
        Ok(self.object(object)?.header.ownership())
    }

    pub fn behavior_of(
        &self,
        object: ObjectRef,
    ) -> RuntimeResult<Rc<dyn Behavior>> {
        let class = self.class_of(object)?;
        Ok(self.class_data(class)?.behavior())
    }

    /// Live objects in the arena.
    pub fn live_objects(&self) -> usize {
        self.heap.len()
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Every class created so far, in creation order.
    pub fn classes(&self) -> &[ClassRef] {
        &self.classes
    }

    pub fn is_null(&self, object: ObjectRef) -> bool {
        object == self.specials.null
    }

    // ── Allocation ────────────────────────────────────────────────────

    /// Moves `object` into the arena, owned by the current pool. When the
    /// object limit is reached a collection runs once before giving up.
    pub fn allocate(&mut self, mut object: Object) -> RuntimeResult<ObjectRef> {
        if self.heap.len() >= self.settings.object_limit {
            self.collect();
            if self.heap.len() >= self.settings.object_limit {
                return Err(RuntimeError::OutOfMemory {
                    limit: self.settings.object_limit,
                });
            }
        }

        let pool = self.pools.current();
        let ownership = if pool.is_gc() {
            Ownership::Shared
        } else {
            Ownership::Pool(pool)
        };
        object.header.set_ownership(ownership);
        let class = object.class();
        let (attrs, size, len) = (object.attr_count(), object.size(), object.len);
        let handle = self.heap.insert(object);
        self.pools
            .get_mut(pool)
            .ok_or(RuntimeError::UnknownPool(pool))?
            .insert(handle);
        trace!(
            "+ alloc <{}> {handle:?} [attrs {attrs}, size {size}, len {len}] in {pool:?}",
            self.class_label(class)
        );
        Ok(handle)
    }

    /// Allocates a runtime-lifetime object. Pinned objects are shared,
    /// live in the collector pool and are never freed.
    pub(crate) fn allocate_pinned(
        &mut self,
        object: Object,
    ) -> RuntimeResult<ObjectRef> {
        let handle = self.heap.insert(object);
        self.pin(handle)?;
        Ok(handle)
    }

    pub(crate) fn pin(&mut self, object: ObjectRef) -> RuntimeResult<()> {
        if let Some(pool) = self.ownership(object)?.pool() {
            self.remove_from_pool(object, pool)?;
        }
        if !self.pools.gc_pool().contains(object) {
            self.pools.gc_pool_mut().insert(object);
        }
        self.object_mut(object)?.header = crate::Header::pinned();
        Ok(())
    }

    fn class_label(&self, class: ClassRef) -> String {
        self.class_data(class)
            .map(|c| c.name().to_owned())
            .unwrap_or_else(|_| format!("{class}"))
    }

    // ── Roots ─────────────────────────────────────────────────────────

    /// Keeps `object` alive across collections until [`Runtime::remove_root`].
    pub fn add_root(&mut self, object: ObjectRef) {
        self.roots.push(object);
    }

    pub fn remove_root(&mut self, object: ObjectRef) -> bool {
        match self.roots.iter().rposition(|&r| r == object) {
            Some(index) => {
                self.roots.swap_remove(index);
                true
            }
            None => false,
        }
    }

    // ── Warnings ──────────────────────────────────────────────────────

    /// Reports a recoverable condition. Execution continues.
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    // ── Scoped execution ──────────────────────────────────────────────

    /// Runs `f` inside a fresh pool. The pool is released whether `f`
    /// succeeds or not; a returned object that was still owned by the pool
    /// moves to the enclosing pool instead of being freed. A returned
    /// object owned by a slot becomes shared, since its owner may die with
    /// the pool.
    pub fn scope<F>(&mut self, f: F) -> RuntimeResult<ObjectRef>
    where
        F: FnOnce(&mut Self) -> RuntimeResult<ObjectRef>,
    {
        let pool = self.new_pool();
        let result = f(self);
        let handoff = match result {
            Ok(value) => match self.ownership(value) {
                Ok(Ownership::Pool(owner)) if owner == pool => {
                    self.hand_off(value, pool)
                }
                Ok(Ownership::Single) => self.share(value),
                _ => Ok(()),
            },
            Err(_) => Ok(()),
        };
        let released = self.release_pool(pool);
        handoff?;
        released?;
        result
    }

    /// Moves `value` from `pool` to the pool enclosing it.
    fn hand_off(&mut self, value: ObjectRef, pool: PoolId) -> RuntimeResult<()> {
        let outer = self
            .pools
            .scope_ids()
            .take_while(|&id| id != pool)
            .last()
            .unwrap_or(PoolId::GC);
        self.remove_from_pool(value, pool)?;
        self.add_to_pool(value, outer)?;
        if outer.is_gc() {
            self.heap.note_promotion();
        }
        Ok(())
    }

    pub(crate) fn type_mismatch(
        &self,
        expected: &str,
        found: ObjectRef,
    ) -> RuntimeError {
        RuntimeError::TypeMismatch {
            expected: expected.to_owned(),
            found: self.class_name(found),
        }
    }

    pub(crate) fn no_such_attribute(
        &self,
        class: ClassRef,
        symbol: SymbolId,
    ) -> RuntimeError {
        RuntimeError::NoSuchAttribute {
            class: self.class_label(class),
            attribute: self.symbols.display_name(symbol),
        }
    }
}
