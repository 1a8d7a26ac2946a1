//! Ownership write barrier.
//!
//! [`Runtime::set`] is the only way a reference gets stored into a slot of
//! a live object. It keeps the `Pool -> Single -> Shared` classification
//! of every object in step with the number of slots referring to it, and
//! frees the previous value of a slot when nothing else can refer to it.

use log::{debug, trace};

use crate::{
    ClassRef, Data, ObjectRef, Ownership, PoolId, Runtime, RuntimeError,
    RuntimeResult,
};

/// A reference-holding location inside an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Instance attribute, 1-based. Slot 0 is the class and not writable.
    Attr { object: ObjectRef, index: usize },
    /// Element of a character or list vector.
    Element { object: ObjectRef, index: usize },
    /// Value of an environment binding.
    Binding { env: ObjectRef, index: usize },
    /// Class-level attribute.
    ClassAttr { class: ClassRef, index: usize },
    /// Bound value of a method signature.
    Signature { method: ObjectRef, index: usize },
}

impl Slot {
    pub fn owner(self) -> ObjectRef {
        match self {
            Slot::Attr { object, .. } | Slot::Element { object, .. } => object,
            Slot::Binding { env, .. } => env,
            Slot::ClassAttr { class, .. } => class,
            Slot::Signature { method, .. } => method,
        }
    }
}

impl Runtime {
    /// Current value of `slot`.
    pub fn read(&self, slot: Slot) -> RuntimeResult<Option<ObjectRef>> {
        let owner = self.object(slot.owner())?;
        match (slot, &owner.data) {
            (Slot::Attr { index: 0, .. }, _) => Ok(Some(owner.class())),
            (Slot::Attr { index, .. }, _) => {
                owner.slot(index).ok_or(RuntimeError::IndexOutOfBounds {
                    index,
                    len: owner.attr_count() + 1,
                })
            }
            (Slot::Element { index, .. }, Data::Elements(values)) => values
                .get(index)
                .copied()
                .ok_or(RuntimeError::IndexOutOfBounds {
                    index,
                    len: values.len(),
                }),
            (Slot::Binding { index, .. }, Data::Environment(env)) => env
                .values()
                .get(index)
                .copied()
                .ok_or(RuntimeError::IndexOutOfBounds {
                    index,
                    len: env.len(),
                }),
            (Slot::ClassAttr { index, .. }, Data::Class(class)) => class
                .class_attr(index)
                .ok_or(RuntimeError::IndexOutOfBounds {
                    index,
                    len: class.class_attrs().len(),
                }),
            (Slot::Signature { index, .. }, Data::Method(signatures)) => {
                signatures.get(index).map(|s| s.value).ok_or(
                    RuntimeError::IndexOutOfBounds {
                        index,
                        len: signatures.len(),
                    },
                )
            }
            (Slot::Element { .. }, _) => {
                Err(self.type_mismatch("list", slot.owner()))
            }
            (Slot::Binding { .. }, _) => {
                Err(self.type_mismatch("environment", slot.owner()))
            }
            (Slot::ClassAttr { .. }, _) => {
                Err(self.type_mismatch("class", slot.owner()))
            }
            (Slot::Signature { .. }, _) => {
                Err(self.type_mismatch("method", slot.owner()))
            }
        }
    }

    fn store(
        &mut self,
        slot: Slot,
        value: Option<ObjectRef>,
    ) -> RuntimeResult<()> {
        let owner = self.object_mut(slot.owner())?;
        if let Slot::Attr { index, .. } = slot {
            if owner.store_attr(index, value) {
                return Ok(());
            }
            return Err(RuntimeError::IndexOutOfBounds {
                index,
                len: owner.attr_count() + 1,
            });
        }
        let stored = match (slot, &mut owner.data) {
            (Slot::Element { index, .. }, Data::Elements(values)) => values
                .get_mut(index)
                .map(|entry| *entry = value)
                .is_some(),
            (Slot::Binding { index, .. }, Data::Environment(env)) => {
                env.store_value(index, value)
            }
            (Slot::ClassAttr { index, .. }, Data::Class(class)) => {
                class.store_class_attr(index, value)
            }
            (Slot::Signature { index, .. }, Data::Method(signatures)) => {
                signatures
                    .get_mut(index)
                    .map(|signature| signature.value = value)
                    .is_some()
            }
            _ => false,
        };
        if stored {
            Ok(())
        } else {
            Err(RuntimeError::invalid(format!("cannot store into {slot:?}")))
        }
    }

    /// Stores `value` into `slot`.
    ///
    /// 1. Writing the reference the slot already holds changes nothing.
    /// 2. A `Pool` value leaves its pool and becomes `Single`; a `Single`
    ///    value is now referenced twice and becomes `Shared`.
    /// 3. The slot is written.
    /// 4. The previous value is freed unless it is `Shared`.
    ///
    /// The new value is classified before the old one is freed, so a value
    /// owned by the overwritten object survives being moved out of it.
    pub fn set(
        &mut self,
        slot: Slot,
        value: Option<ObjectRef>,
    ) -> RuntimeResult<()> {
        if let Slot::Attr { index: 0, .. } = slot {
            return Err(RuntimeError::ClassAttributeAssignment);
        }
        let old = self.read(slot)?;
        if old == value {
            return Ok(());
        }

        if let Some(value) = value {
            self.claim(value)?;
        }
        self.store(slot, value)?;
        trace!("set {slot:?} <- {value:?} (was {old:?})");

        match old {
            Some(old) if self.ownership(old)? == Ownership::Single => {
                self.free_object(old)
            }
            _ => Ok(()),
        }
    }

    /// Records one more slot referring to `value`.
    fn claim(&mut self, value: ObjectRef) -> RuntimeResult<()> {
        match self.ownership(value)? {
            Ownership::Pool(pool) => {
                self.remove_from_pool(value, pool)?;
                self.object_mut(value)?
                    .header
                    .set_ownership(Ownership::Single);
                Ok(())
            }
            Ownership::Single => self.promote(value),
            Ownership::Shared => Ok(()),
        }
    }

    /// Marks `value` as possibly aliased, whatever its current state.
    pub(crate) fn share(&mut self, value: ObjectRef) -> RuntimeResult<()> {
        match self.ownership(value)? {
            Ownership::Pool(pool) => {
                self.remove_from_pool(value, pool)?;
                self.promote(value)
            }
            Ownership::Single => self.promote(value),
            Ownership::Shared => Ok(()),
        }
    }

    fn promote(&mut self, value: ObjectRef) -> RuntimeResult<()> {
        self.add_to_pool(value, PoolId::GC)?;
        self.heap.note_promotion();
        debug!("promote {value:?} to shared");
        Ok(())
    }

    /// Frees `object` and every `Single` object it owns, transitively.
    /// Pinned and already freed objects are skipped.
    pub(crate) fn free_object(&mut self, object: ObjectRef) -> RuntimeResult<()> {
        let mut work = vec![object];
        while let Some(next) = work.pop() {
            let Some(current) = self.heap.get(next) else {
                continue;
            };
            if current.header.is_pinned() {
                continue;
            }
            let owned = current.owned_refs();
            self.heap.remove(next);
            trace!("- free {next:?}");
            for child in owned {
                let single = self
                    .heap
                    .get(child)
                    .is_some_and(|o| o.header.ownership() == Ownership::Single);
                if single {
                    work.push(child);
                }
            }
        }
        Ok(())
    }
}
