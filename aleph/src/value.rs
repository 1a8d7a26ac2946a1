use std::fmt;

/// Handle to an object in the runtime's arena.
///
/// Encoding:
/// - `index`:      slot in the arena.
/// - `generation`: bumped every time the slot is freed, so a handle that
///   outlived its object never resolves to the slot's next tenant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

/// Classes are objects too; the alias only documents intent.
pub type ClassRef = ObjectRef;

impl ObjectRef {
    #[inline(always)]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline(always)]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref(#{}.{})", self.index, self.generation)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Identity of an allocation pool. Id 0 is the collector pool.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(u32);

impl PoolId {
    pub const GC: Self = Self(0);

    #[inline(always)]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub const fn is_gc(self) -> bool {
        self.0 == Self::GC.0
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_gc() {
            write!(f, "Pool(gc)")
        } else {
            write!(f, "Pool({})", self.0)
        }
    }
}
