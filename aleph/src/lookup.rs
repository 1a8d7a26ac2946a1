//! Class hierarchy walks: subtype tests, linearized ancestors and
//! attribute resolution.

use log::trace;

use crate::{
    AttrSlot, ClassRef, ObjectRef, Runtime, RuntimeError, RuntimeResult,
    Slot, SymbolId,
};

/// Where an attribute read on an instance is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrLookup {
    /// Not recognized by the class or any ancestor.
    None,
    /// The class slot.
    Class,
    /// Instance slot `slot` of the receiver.
    Instance { slot: u32 },
    /// Class-level entry `index` of `holder`, which is the receiver's class
    /// or one of its ancestors.
    ClassLevel { holder: ClassRef, index: u32 },
}

impl Runtime {
    /// True when `candidate` is `target` or inherits from it through any
    /// chain of superclass links.
    ///
    /// Depth first: inline superclasses in declared order, then overflow
    /// entries. The hierarchy is acyclic by construction
    /// ([`Runtime::add_superclass`] rejects cycles).
    pub fn is_assignable_class(
        &self,
        candidate: ClassRef,
        target: ClassRef,
    ) -> RuntimeResult<bool> {
        if candidate == target {
            return Ok(true);
        }
        for superclass in self.class_data(candidate)?.superclasses().iter() {
            if self.is_assignable_class(superclass, target)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True when the class of `object` is assignable to `target`.
    pub fn is_assignable(
        &self,
        object: ObjectRef,
        target: ClassRef,
    ) -> RuntimeResult<bool> {
        self.is_assignable_class(self.class_of(object)?, target)
    }

    /// `class` followed by its ancestors in depth-first order, each class
    /// listed once (the method-resolution order).
    pub fn ancestors(&self, class: ClassRef) -> RuntimeResult<Vec<ClassRef>> {
        let mut order = Vec::new();
        let mut stack = vec![class];
        while let Some(current) = stack.pop() {
            if order.contains(&current) {
                continue;
            }
            order.push(current);
            let supers: Vec<ClassRef> =
                self.class_data(current)?.superclasses().iter().collect();
            stack.extend(supers.into_iter().rev());
        }
        Ok(order)
    }

    /// Resolves `symbol` for instances of `class`. Class-level entries are
    /// searched up the hierarchy when the class itself does not map the
    /// symbol.
    pub fn resolve_attr(
        &self,
        class: ClassRef,
        symbol: SymbolId,
    ) -> RuntimeResult<AttrLookup> {
        if symbol == SymbolId::CLASS {
            return Ok(AttrLookup::Class);
        }
        match self.class_data(class)?.attr_slot(symbol) {
            AttrSlot::Instance(slot) => Ok(AttrLookup::Instance { slot }),
            AttrSlot::ClassLevel(index) => Ok(AttrLookup::ClassLevel {
                holder: class,
                index,
            }),
            AttrSlot::Unmapped => self.resolve_inherited(class, symbol),
        }
    }

    fn resolve_inherited(
        &self,
        class: ClassRef,
        symbol: SymbolId,
    ) -> RuntimeResult<AttrLookup> {
        for superclass in self.class_data(class)?.superclasses().iter() {
            if let AttrSlot::ClassLevel(index) =
                self.class_data(superclass)?.attr_slot(symbol)
            {
                return Ok(AttrLookup::ClassLevel {
                    holder: superclass,
                    index,
                });
            }
            let found = self.resolve_inherited(superclass, symbol)?;
            if found != AttrLookup::None {
                return Ok(found);
            }
        }
        Ok(AttrLookup::None)
    }

    /// Reads attribute `symbol` of `object`. `None` is an unset attribute;
    /// an attribute the class does not recognize is an error.
    pub fn get_attr(
        &self,
        object: ObjectRef,
        symbol: SymbolId,
    ) -> RuntimeResult<Option<ObjectRef>> {
        let class = self.class_of(object)?;
        let value = match self.resolve_attr(class, symbol)? {
            AttrLookup::Class => Some(class),
            AttrLookup::Instance { slot } => {
                self.read(Slot::Attr { object, index: slot as usize })?
            }
            AttrLookup::ClassLevel { holder, index } => self.read(
                Slot::ClassAttr {
                    class: holder,
                    index: index as usize,
                },
            )?,
            AttrLookup::None => {
                return Err(self.no_such_attribute(class, symbol));
            }
        };
        trace!("get {object:?}.{} -> {value:?}", self.symbols.display_name(symbol));
        Ok(value)
    }

    /// Writes instance attribute `symbol` of `object` through the write
    /// barrier. The value must be an instance of the attribute's declared
    /// class; null is always accepted.
    pub fn set_attr(
        &mut self,
        object: ObjectRef,
        symbol: SymbolId,
        value: Option<ObjectRef>,
    ) -> RuntimeResult<()> {
        let class = self.class_of(object)?;
        let slot = match self.resolve_attr(class, symbol)? {
            AttrLookup::Class => {
                return Err(RuntimeError::ClassAttributeAssignment);
            }
            AttrLookup::Instance { slot } => slot as usize,
            _ => return Err(self.no_such_attribute(class, symbol)),
        };

        let checked = value
            .filter(|&v| !self.is_null(v))
            .zip(self.class_data(class)?.attr_class(slot));
        if let Some((value, declared)) = checked {
            if !self.is_assignable(value, declared)? {
                return Err(RuntimeError::TypeMismatch {
                    expected: self.class_data(declared)?.name().to_owned(),
                    found: self.class_name(value),
                });
            }
        }
        self.set(Slot::Attr { object, index: slot }, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_test_runtime;

    #[test]
    fn assignability() {
        let mut rt = create_test_runtime();
        let s = rt.specials;
        for &class in rt.classes() {
            assert!(rt.is_assignable_class(class, class).unwrap());
        }
        assert!(rt.is_assignable_class(s.integer_class, s.numeric_class).unwrap());
        assert!(rt.is_assignable_class(s.integer_class, s.vector_class).unwrap());
        assert!(rt.is_assignable_class(s.real_class, s.object_class).unwrap());
        assert!(!rt.is_assignable_class(s.real_class, s.integer_class).unwrap());
        assert!(!rt.is_assignable_class(s.numeric_class, s.real_class).unwrap());
        assert!(!rt.is_assignable_class(s.symbol_class, s.vector_class).unwrap());

        // Extra supertypes count for subtype tests.
        rt.add_superclass(s.symbol_class, s.list_class).unwrap();
        assert!(rt.is_assignable_class(s.symbol_class, s.vector_class).unwrap());
    }

    #[test]
    fn overflow_superclasses_are_searched() {
        let mut rt = create_test_runtime();
        let s = rt.specials;
        let base = rt.subclass(s.object_class, "base", &[], None).unwrap();
        let extras: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| rt.subclass(s.object_class, name, &[], None).unwrap())
            .collect();
        for &extra in &extras {
            rt.add_superclass(base, extra).unwrap();
        }
        let supers = rt.class_data(base).unwrap().superclasses();
        assert_eq!(supers.len(), 5);
        assert!(!supers.overflow().is_empty());
        assert!(rt.is_assignable_class(base, extras[3]).unwrap());
    }

    #[test]
    fn ancestors_are_linearized() {
        let rt = create_test_runtime();
        let s = rt.specials;
        assert_eq!(rt.ancestors(s.integer_class).unwrap(), vec![
            s.integer_class,
            s.numeric_class,
            s.vector_class,
            s.object_class,
        ]);
        assert_eq!(rt.ancestors(s.object_class).unwrap(), vec![s.object_class]);
    }

    #[test]
    fn instance_attributes() {
        let mut rt = create_test_runtime();
        let s = rt.specials;
        let names = rt.sym.names;
        let value = rt.alloc_real_vector(2).unwrap();
        rt.add_root(value);
        let label = rt.mk_string("x").unwrap();

        assert_eq!(rt.get_attr(value, names).unwrap(), None);
        rt.set_attr(value, names, Some(label)).unwrap();
        assert_eq!(rt.get_attr(value, names).unwrap(), Some(label));
        assert_eq!(rt.get_attr(value, SymbolId::CLASS).unwrap(), Some(s.real_class));

        assert_eq!(
            rt.set_attr(value, SymbolId::CLASS, None),
            Err(RuntimeError::ClassAttributeAssignment)
        );
        let dim = rt.intern("dim");
        assert!(matches!(
            rt.get_attr(value, dim),
            Err(RuntimeError::NoSuchAttribute { .. })
        ));
    }

    #[test]
    fn declared_attribute_classes_are_enforced() {
        let mut rt = create_test_runtime();
        let names = rt.sym.names;
        let value = rt.alloc_real_vector(2).unwrap();
        rt.add_root(value);
        let wrong = rt.scalar_integer(1).unwrap();
        assert!(matches!(
            rt.set_attr(value, names, Some(wrong)),
            Err(RuntimeError::TypeMismatch { .. })
        ));
        let null = rt.specials.null;
        rt.set_attr(value, names, Some(null)).unwrap();
    }

    #[test]
    fn class_level_attributes_are_inherited() {
        let mut rt = create_test_runtime();
        let s = rt.specials;
        let units = rt.intern("units");
        let tag = rt.mk_string("m").unwrap();
        rt.define_class_attr(s.numeric_class, units, Some(tag)).unwrap();

        let value = rt.scalar_real(3.0).unwrap();
        assert_eq!(rt.get_attr(value, units).unwrap(), Some(tag));
        assert_eq!(
            rt.resolve_attr(s.real_class, units).unwrap(),
            AttrLookup::ClassLevel {
                holder: s.numeric_class,
                index: 0
            }
        );
        // Not copied into the subclass map.
        assert_eq!(rt.class_attr(s.real_class, units).unwrap(), None);
        assert!(matches!(
            rt.set_attr(value, units, None),
            Err(RuntimeError::NoSuchAttribute { .. })
        ));
    }
}
