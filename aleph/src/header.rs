use bitflags::bitflags;

use crate::PoolId;

/// How many live references an object may have.
///
/// ```text
/// Pool(P) --first slot write--> Single --second slot write--> Shared
///    |
///    +--pool released--> freed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Freshly allocated, held only by scope pool `P`.
    Pool(PoolId),
    /// Referenced by exactly one slot; freed when that slot is overwritten.
    Single,
    /// Possibly referenced from several slots; only the collector frees it.
    Shared,
}

impl Ownership {
    #[inline(always)]
    pub const fn is_shared(self) -> bool {
        matches!(self, Self::Shared)
    }

    #[inline(always)]
    pub const fn pool(self) -> Option<PoolId> {
        match self {
            Self::Pool(pool) => Some(pool),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// Reached during the current collection.
        const MARK = 1 << 0;
        /// Lives as long as the runtime (classes, symbols, null).
        const PINNED = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    ownership: Ownership,
    flags: HeaderFlags,
}

impl Header {
    pub fn new(ownership: Ownership) -> Self {
        Self {
            ownership,
            flags: HeaderFlags::empty(),
        }
    }

    /// Header of a runtime-lifetime object: shared and pinned.
    pub fn pinned() -> Self {
        Self {
            ownership: Ownership::Shared,
            flags: HeaderFlags::PINNED,
        }
    }

    #[inline]
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    #[inline]
    pub fn set_ownership(&mut self, ownership: Ownership) -> &mut Self {
        self.ownership = ownership;
        self
    }

    #[inline]
    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.flags.contains(HeaderFlags::PINNED)
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.flags.contains(HeaderFlags::MARK)
    }

    #[inline]
    pub fn mark(&mut self) -> &mut Self {
        self.flags.insert(HeaderFlags::MARK);
        self
    }

    #[inline]
    pub fn unmark(&mut self) -> &mut Self {
        self.flags.remove(HeaderFlags::MARK);
        self
    }
}
