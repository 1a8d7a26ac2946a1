//! Positional multi-argument method dispatch.
//!
//! A method is a chain of signatures stored as a class-level attribute
//! under the mangled method name. Each signature names the class its next
//! argument must be assignable to and the value it is bound to; a bound
//! value that is itself a method chain consumes the following argument.

use log::debug;

use crate::{
    ClassRef, Data, Object, ObjectRef, Ownership, Runtime, RuntimeError,
    RuntimeResult, Slot, SymbolId, symbol::method_name,
};

/// One overload: `arg_class` of `None` matches only when no arguments
/// remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub arg_class: Option<ClassRef>,
    pub value: Option<ObjectRef>,
}

impl Runtime {
    /// Symbol under which the chain for method `name` is stored.
    pub fn method_symbol(&mut self, name: &str) -> SymbolId {
        self.symbols.intern(&method_name(name))
    }

    /// Allocates an empty method chain.
    pub fn new_method(&mut self) -> RuntimeResult<ObjectRef> {
        let class = self.specials.method_class;
        let attrs = self.class_data(class)?.instance_attr_count();
        self.allocate(Object::new(
            class,
            attrs,
            Data::Method(Vec::new()),
            0,
            Ownership::Shared,
        ))
    }

    pub fn signatures(&self, method: ObjectRef) -> RuntimeResult<&[Signature]> {
        match &self.object(method)?.data {
            Data::Method(signatures) => Ok(signatures.as_slice()),
            _ => Err(self.type_mismatch("method", method)),
        }
    }

    fn is_method(&self, object: ObjectRef) -> bool {
        self.object(object)
            .is_ok_and(|o| matches!(o.data, Data::Method(_)))
    }

    /// Appends a signature to `method`. The value goes through the write
    /// barrier.
    pub fn add_signature(
        &mut self,
        method: ObjectRef,
        arg_class: Option<ClassRef>,
        value: ObjectRef,
    ) -> RuntimeResult<()> {
        if let Some(class) = arg_class {
            self.class_data(class)?;
        }
        let index = self.signatures(method)?.len();
        let object = self.object_mut(method)?;
        if let Data::Method(signatures) = &mut object.data {
            signatures.push(Signature {
                arg_class,
                value: None,
            });
        }
        object.len = index + 1;
        self.set(Slot::Signature { method, index }, Some(value))
    }

    /// Binds `value` as the implementation of `name` on `class` for
    /// arguments of `arg_classes`, in order. With no argument classes the
    /// overload matches calls without further arguments.
    ///
    /// Returns the class's method chain for `name`.
    pub fn define_method(
        &mut self,
        class: ClassRef,
        name: &str,
        arg_classes: &[ClassRef],
        value: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let symbol = self.method_symbol(name);
        let top = match self.class_attr(class, symbol)? {
            Some(chain) => chain,
            None => {
                let chain = self.new_method()?;
                self.define_class_attr(class, symbol, Some(chain))?;
                chain
            }
        };
        debug!(
            "define method {name}/{} on <{}>",
            arg_classes.len(),
            self.class_data(class)?.name()
        );

        let Some((&last, leading)) = arg_classes.split_last() else {
            self.add_signature(top, None, value)?;
            return Ok(top);
        };
        let mut chain = top;
        for &arg_class in leading {
            let existing = self
                .signatures(chain)?
                .iter()
                .filter(|s| s.arg_class == Some(arg_class))
                .filter_map(|s| s.value)
                .find(|&v| self.is_method(v));
            chain = match existing {
                Some(inner) => inner,
                None => {
                    let inner = self.new_method()?;
                    self.add_signature(chain, Some(arg_class), inner)?;
                    inner
                }
            };
        }
        self.add_signature(chain, Some(last), value)?;
        Ok(top)
    }

    /// Value bound by the first signature of `method`, starting at
    /// `start`, that accepts `args`. No ranking: the first match wins.
    pub fn match_method_arg_classes(
        &self,
        method: ObjectRef,
        start: usize,
        args: &[ObjectRef],
    ) -> RuntimeResult<Option<ObjectRef>> {
        let signatures = self.signatures(method)?;
        for signature in signatures.iter().skip(start) {
            let value = match (args.first(), signature.arg_class) {
                (None, None) => return Ok(signature.value),
                (Some(&arg), Some(class)) if self.is_assignable(arg, class)? => {
                    signature.value
                }
                _ => continue,
            };
            match value {
                Some(inner) if self.is_method(inner) => {
                    if let Some(found) =
                        self.match_method_arg_classes(inner, 0, &args[1..])?
                    {
                        return Ok(Some(found));
                    }
                }
                _ => return Ok(value),
            }
        }
        Ok(None)
    }

    /// Looks for a matching overload of the method stored under `symbol`
    /// on `class`, then on its superclasses depth first.
    pub fn find_method_in_class(
        &self,
        symbol: SymbolId,
        class: ClassRef,
        args: &[ObjectRef],
    ) -> RuntimeResult<Option<ObjectRef>> {
        if let Some(chain) = self.class_attr(class, symbol)? {
            if let Some(value) = self.match_method_arg_classes(chain, 0, args)? {
                return Ok(Some(value));
            }
        }
        for superclass in self.class_data(class)?.superclasses().iter() {
            if let Some(value) =
                self.find_method_in_class(symbol, superclass, args)?
            {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Dispatches method `name` on the class of the first argument and
    /// matches the remaining arguments against its signatures.
    pub fn find_method(
        &mut self,
        name: &str,
        args: &[ObjectRef],
    ) -> RuntimeResult<Option<ObjectRef>> {
        let Some((&receiver, rest)) = args.split_first() else {
            return Ok(None);
        };
        let symbol = self.method_symbol(name);
        let class = self.class_of(receiver)?;
        self.find_method_in_class(symbol, class, rest)
    }

    /// Like [`Runtime::find_method`], but a missing method is an error.
    pub fn require_method(
        &mut self,
        name: &str,
        args: &[ObjectRef],
    ) -> RuntimeResult<ObjectRef> {
        match self.find_method(name, args)? {
            Some(value) => Ok(value),
            None => Err(RuntimeError::NoMethod {
                name: name.to_owned(),
                class: args
                    .first()
                    .map_or_else(|| "<none>".to_owned(), |&a| self.class_name(a)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_test_runtime;

    struct Fixture {
        rt: Runtime,
        k: ClassRef,
        a: ObjectRef,
        b: ObjectRef,
    }

    fn fixture() -> Fixture {
        let mut rt = create_test_runtime();
        let s = rt.specials;
        let k = rt.subclass(s.object_class, "K", &[], None).unwrap();
        let a = rt.mk_string("A").unwrap();
        let b = rt.mk_string("B").unwrap();
        rt.define_method(k, "f", &[s.integer_class], a).unwrap();
        rt.define_method(k, "f", &[s.real_class], b).unwrap();
        Fixture { rt, k, a, b }
    }

    #[test]
    fn overloads_are_selected_by_argument_class() {
        let Fixture { mut rt, k, a, b } = fixture();
        let f = rt.method_symbol("f");
        let int = rt.scalar_integer(1).unwrap();
        let real = rt.scalar_real(1.0).unwrap();
        let text = rt.mk_string("x").unwrap();

        assert_eq!(rt.find_method_in_class(f, k, &[int]).unwrap(), Some(a));
        assert_eq!(rt.find_method_in_class(f, k, &[real]).unwrap(), Some(b));
        assert_eq!(rt.find_method_in_class(f, k, &[text]).unwrap(), None);
        assert_eq!(rt.find_method_in_class(f, k, &[]).unwrap(), None);
    }

    #[test]
    fn dispatch_uses_the_receiver_class() {
        let Fixture { mut rt, k, a, .. } = fixture();
        let receiver = rt.alloc_object(k).unwrap();
        let int = rt.scalar_integer(1).unwrap();
        assert_eq!(rt.find_method("f", &[receiver, int]).unwrap(), Some(a));
        assert_eq!(rt.find_method("f", &[int, receiver]).unwrap(), None);
        assert_eq!(rt.find_method("f", &[]).unwrap(), None);
        assert!(matches!(
            rt.require_method("g", &[receiver]),
            Err(RuntimeError::NoMethod { .. })
        ));
    }

    #[test]
    fn methods_are_inherited_and_shadowed() {
        let Fixture { mut rt, k, a, .. } = fixture();
        let sub = rt.subclass(k, "L", &[], None).unwrap();
        let receiver = rt.alloc_object(sub).unwrap();
        let int = rt.scalar_integer(1).unwrap();
        assert_eq!(rt.find_method("f", &[receiver, int]).unwrap(), Some(a));

        let own = rt.mk_string("own").unwrap();
        let character = rt.specials.character_class;
        rt.define_method(sub, "f", &[character], own).unwrap();
        let text = rt.mk_string("t").unwrap();
        assert_eq!(rt.find_method("f", &[receiver, text]).unwrap(), Some(own));

        // Unmatched on the subclass, found on the parent.
        assert_eq!(rt.find_method("f", &[receiver, int]).unwrap(), Some(a));
    }

    #[test]
    fn superclasses_are_searched_in_declared_order() {
        let mut rt = create_test_runtime();
        let s = rt.specials;
        let d = rt.subclass(s.object_class, "D", &[], None).unwrap();
        let mut parents = Vec::new();
        for name in ["P1", "P2", "P3", "P4"] {
            let parent =
                rt.subclass(s.object_class, name, &[], None).unwrap();
            rt.add_superclass(d, parent).unwrap();
            parents.push(parent);
        }
        let supers = rt.class_data(d).unwrap().superclasses();
        assert_eq!(supers.len(), 5);
        assert_eq!(supers.overflow(), &parents[2..]);

        let on_p2 = rt.mk_string("P2").unwrap();
        let on_p3 = rt.mk_string("P3").unwrap();
        let real_on_p4 = rt.mk_string("P4 real").unwrap();
        rt.define_method(parents[1], "f", &[s.integer_class], on_p2)
            .unwrap();
        rt.define_method(parents[2], "f", &[s.integer_class], on_p3)
            .unwrap();
        rt.define_method(parents[3], "f", &[s.real_class], real_on_p4)
            .unwrap();

        let f = rt.method_symbol("f");
        let int = rt.scalar_integer(1).unwrap();
        let real = rt.scalar_real(1.0).unwrap();
        assert_eq!(rt.find_method_in_class(f, d, &[int]).unwrap(), Some(on_p2));
        assert_eq!(
            rt.find_method_in_class(f, d, &[real]).unwrap(),
            Some(real_on_p4)
        );

        let receiver = rt.alloc_object(d).unwrap();
        assert_eq!(rt.find_method("f", &[receiver, int]).unwrap(), Some(on_p2));
        let text = rt.mk_string("t").unwrap();
        assert_eq!(rt.find_method("f", &[receiver, text]).unwrap(), None);
    }

    #[test]
    fn arity_and_nested_arguments() {
        let Fixture { mut rt, k, a, b } = fixture();
        let s = rt.specials;
        let none = rt.mk_string("none").unwrap();
        let pair = rt.mk_string("pair").unwrap();
        rt.define_method(k, "g", &[], none).unwrap();
        rt.define_method(k, "g", &[s.integer_class, s.real_class], pair)
            .unwrap();
        rt.define_method(k, "g", &[s.integer_class, s.integer_class], a)
            .unwrap();
        rt.define_method(k, "g", &[s.real_class], b).unwrap();

        let g = rt.method_symbol("g");
        let int = rt.scalar_integer(1).unwrap();
        let real = rt.scalar_real(1.0).unwrap();
        assert_eq!(rt.find_method_in_class(g, k, &[]).unwrap(), Some(none));
        assert_eq!(
            rt.find_method_in_class(g, k, &[int, real]).unwrap(),
            Some(pair)
        );
        assert_eq!(rt.find_method_in_class(g, k, &[int, int]).unwrap(), Some(a));
        assert_eq!(rt.find_method_in_class(g, k, &[real]).unwrap(), Some(b));
        assert_eq!(rt.find_method_in_class(g, k, &[int]).unwrap(), None);

        // Both integer overloads share one nested chain.
        let chain = rt.class_attr(k, g).unwrap().unwrap();
        assert_eq!(rt.signatures(chain).unwrap().len(), 3);
    }
}
