//! A class-based object runtime: single-inheritance classes with
//! attribute maps, positional multi-argument method dispatch, and memory
//! managed by scope pools plus an ownership write barrier.

mod alloc;
mod barrier;
mod behavior;
mod class;
mod dispatch;
mod environment;
mod error;
pub mod eval;
mod gc;
mod header;
mod heap;
mod lookup;
mod object;
mod pool;
mod runtime;
pub mod special;
mod symbol;
mod value;

pub use self::alloc::NA_INTEGER;
pub use barrier::Slot;
pub use behavior::{Behavior, DefaultBehavior, NoCopyBehavior};
pub use class::{AttrSlot, Class, ClassFlags, INLINE_SUPERCLASSES, SuperClasses};
pub use dispatch::Signature;
pub use environment::Environment;
pub use error::{RuntimeError, RuntimeResult};
pub use gc::RootProvider;
pub use header::{Header, HeaderFlags, Ownership};
pub use heap::{Heap, HeapStats};
pub use lookup::AttrLookup;
pub use object::{Complex, Data, NativeFn, Object};
pub use pool::{AllocationPool, DEFAULT_POOL_CAPACITY, PoolStack, ScopePool};
pub use runtime::{Runtime, RuntimeCreateInfo, RuntimeSettings};
pub use special::{SpecialObjects, SpecialSymbols};
pub use symbol::{SymbolId, SymbolTable};
pub use value::{ClassRef, ObjectRef, PoolId};

#[cfg(test)]
pub(crate) fn create_test_runtime() -> Runtime {
    let _ = env_logger::builder().is_test(true).try_init();
    Runtime::new(RuntimeCreateInfo::default()).expect("bootstrap")
}
