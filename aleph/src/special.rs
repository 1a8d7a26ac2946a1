//! Built-in symbols, classes and objects, and the bootstrap that creates
//! them.

use std::rc::Rc;

use log::debug;

use crate::{
    Class, ClassRef, Data, DefaultBehavior, NoCopyBehavior, Object, ObjectRef,
    Ownership, Runtime, RuntimeResult, SymbolId, SymbolTable,
    eval::{
        BuiltinBehavior, GenericBehavior, LanguageBehavior, MethodBehavior,
        SpecialBehavior, SymbolBehavior, assign_special,
    },
};

/// Legacy type tags of the built-in classes.
pub mod type_tag {
    pub const NIL: u8 = 0;
    pub const SYMBOL: u8 = 1;
    pub const PAIRLIST: u8 = 2;
    pub const ENVIRONMENT: u8 = 4;
    pub const LANGUAGE: u8 = 6;
    pub const SPECIAL: u8 = 7;
    pub const BUILTIN: u8 = 8;
    pub const CHARS: u8 = 9;
    pub const LOGICAL: u8 = 10;
    pub const INTEGER: u8 = 13;
    pub const REAL: u8 = 14;
    pub const COMPLEX: u8 = 15;
    pub const STRING: u8 = 16;
    pub const LIST: u8 = 19;
}

/// Attribute names the runtime itself uses.
#[derive(Debug, Clone, Copy)]
pub struct SpecialSymbols {
    pub names: SymbolId,
    pub next: SymbolId,
    pub head: SymbolId,
    pub tag: SymbolId,
    pub parent: SymbolId,
    pub assign: SymbolId,
}

impl SpecialSymbols {
    pub fn new(symbols: &mut SymbolTable) -> Self {
        Self {
            names: symbols.intern("names"),
            next: symbols.intern("next"),
            head: symbols.intern("head"),
            tag: symbols.intern("tag"),
            parent: symbols.intern("parent"),
            assign: symbols.intern("<-"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpecialObjects {
    pub class_class: ClassRef,
    pub object_class: ClassRef,
    pub null_class: ClassRef,
    pub symbol_class: ClassRef,
    /// `characterString`: a single string, not a vector.
    pub char_class: ClassRef,
    pub vector_class: ClassRef,
    pub character_class: ClassRef,
    pub numeric_class: ClassRef,
    pub real_class: ClassRef,
    pub integer_class: ClassRef,
    pub list_class: ClassRef,
    pub logical_class: ClassRef,
    pub complex_class: ClassRef,
    pub pairlist_class: ClassRef,
    pub language_class: ClassRef,
    pub environment_class: ClassRef,
    pub builtin_class: ClassRef,
    pub special_class: ClassRef,
    pub generic_class: ClassRef,
    pub method_class: ClassRef,

    pub null: ObjectRef,
    /// Marks an argument that was not supplied. Distinct from null.
    pub missing_arg: ObjectRef,
    pub na_string: ObjectRef,
    pub global_env: ObjectRef,
}

impl SpecialObjects {
    /// Stand-in used until [`Runtime::bootstrap`] has run. None of these
    /// handles resolve.
    pub(crate) fn placeholder() -> Self {
        let none = ObjectRef::new(u32::MAX, u32::MAX);
        Self {
            class_class: none,
            object_class: none,
            null_class: none,
            symbol_class: none,
            char_class: none,
            vector_class: none,
            character_class: none,
            numeric_class: none,
            real_class: none,
            integer_class: none,
            list_class: none,
            logical_class: none,
            complex_class: none,
            pairlist_class: none,
            language_class: none,
            environment_class: none,
            builtin_class: none,
            special_class: none,
            generic_class: none,
            method_class: none,
            null: none,
            missing_arg: none,
            na_string: none,
            global_env: none,
        }
    }

    /// The special objects that are not classes.
    pub fn objects(&self) -> [ObjectRef; 4] {
        [self.null, self.missing_arg, self.na_string, self.global_env]
    }
}

impl Runtime {
    /// Builds the class hierarchy and the special objects.
    pub(crate) fn bootstrap(&mut self) -> RuntimeResult<()> {
        // The class of classes describes itself.
        let class_class = self.heap.insert_with(|handle| {
            let descriptor = Class::root("class", Rc::new(NoCopyBehavior));
            Object::new(
                handle,
                0,
                Data::Class(Box::new(descriptor)),
                0,
                Ownership::Shared,
            )
        });
        self.pin(class_class)?;
        self.classes.push(class_class);
        self.specials.class_class = class_class;

        let object = self
            .register_class(Class::root("object", Rc::new(DefaultBehavior)))?;
        self.specials.object_class = object;
        self.add_superclass(class_class, object)?;

        let s = self.sym;
        let null_class = self.subclass(object, "null", &[], None)?;
        let symbol_class = self.subclass(object, "symbol", &[], None)?;

        let char_class = self.subclass(object, "characterString", &[], None)?;
        let vector = self.subclass(object, "vector", &[s.names], None)?;
        let character = self.subclass(vector, "character", &[], None)?;
        // `names` could not be typed before `character` existed.
        self.set_attr_class(vector, s.names, character)?;
        self.set_attr_class(character, s.names, character)?;

        let numeric = self.subclass(vector, "numeric", &[], None)?;
        let real = self.subclass(numeric, "real", &[], None)?;
        let integer = self.subclass(numeric, "integer", &[], None)?;
        let list = self.subclass(vector, "list", &[], None)?;
        let logical = self.subclass(vector, "logical", &[], None)?;
        let complex = self.subclass(vector, "complex", &[], None)?;

        let pairlist =
            self.subclass(object, "pairlist", &[s.next, s.head, s.tag], None)?;
        self.set_attr_class(pairlist, s.next, pairlist)?;
        let language = self.subclass(pairlist, "language", &[], None)?;

        let environment =
            self.subclass(object, "environment", &[s.parent], None)?;
        self.set_attr_class(environment, s.parent, environment)?;

        let builtin = self.subclass(object, "builtin", &[], None)?;
        let special = self.subclass(object, "special", &[], None)?;
        let generic = self.subclass(object, "generic", &[], None)?;
        let method = self.subclass(object, "method", &[], None)?;

        self.specials = SpecialObjects {
            null_class,
            symbol_class,
            char_class,
            vector_class: vector,
            character_class: character,
            numeric_class: numeric,
            real_class: real,
            integer_class: integer,
            list_class: list,
            logical_class: logical,
            complex_class: complex,
            pairlist_class: pairlist,
            language_class: language,
            environment_class: environment,
            builtin_class: builtin,
            special_class: special,
            generic_class: generic,
            method_class: method,
            ..self.specials
        };

        self.set_behavior(null_class, Rc::new(NoCopyBehavior))?;
        self.set_behavior(symbol_class, Rc::new(SymbolBehavior))?;
        self.set_behavior(language, Rc::new(LanguageBehavior))?;
        self.set_behavior(builtin, Rc::new(BuiltinBehavior))?;
        self.set_behavior(special, Rc::new(SpecialBehavior))?;
        self.set_behavior(generic, Rc::new(GenericBehavior))?;
        self.set_behavior(method, Rc::new(MethodBehavior))?;

        for (class, tag) in [
            (null_class, type_tag::NIL),
            (symbol_class, type_tag::SYMBOL),
            (char_class, type_tag::CHARS),
            (character, type_tag::STRING),
            (real, type_tag::REAL),
            (integer, type_tag::INTEGER),
            (list, type_tag::LIST),
            (logical, type_tag::LOGICAL),
            (complex, type_tag::COMPLEX),
            (pairlist, type_tag::PAIRLIST),
            (language, type_tag::LANGUAGE),
            (environment, type_tag::ENVIRONMENT),
            (builtin, type_tag::BUILTIN),
            (special, type_tag::SPECIAL),
        ] {
            self.set_type_tag(class, tag)?;
        }

        self.specials.null = self
            .allocate_pinned(Object::new(null_class, 0, Data::None, 0, Ownership::Shared))?;
        self.specials.missing_arg = self.allocate_pinned(Object::new(
            symbol_class,
            0,
            Data::Symbol(SymbolId::NONE),
            0,
            Ownership::Shared,
        ))?;
        let na_string = self.mk_char("NA")?;
        self.pin(na_string)?;
        self.specials.na_string = na_string;

        let global_env = self.new_environment(None)?;
        self.pin(global_env)?;
        self.specials.global_env = global_env;

        let assign = self.new_special(assign_special)?;
        self.assign(global_env, s.assign, assign)?;

        debug!(
            "bootstrap done: {} classes, {} objects",
            self.classes.len(),
            self.heap.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ownership, create_test_runtime};

    #[test]
    fn the_class_of_classes_describes_itself() {
        let rt = create_test_runtime();
        let class = rt.specials.class_class;
        assert_eq!(rt.class_of(class).unwrap(), class);
        assert!(rt.is_class(class));
        assert!(rt.is_class(rt.specials.object_class));
        assert!(
            rt.is_assignable_class(class, rt.specials.object_class)
                .unwrap()
        );
        assert_eq!(rt.class_name(class), "class");
    }

    #[test]
    fn built_in_hierarchy() {
        let rt = create_test_runtime();
        let s = rt.specials;
        let names: Vec<String> = rt
            .classes()
            .iter()
            .map(|&c| rt.class_data(c).unwrap().name().to_owned())
            .collect();
        assert_eq!(names, vec![
            "class",
            "object",
            "null",
            "symbol",
            "characterString",
            "vector",
            "character",
            "numeric",
            "real",
            "integer",
            "list",
            "logical",
            "complex",
            "pairlist",
            "language",
            "environment",
            "builtin",
            "special",
            "generic",
            "method",
        ]);
        assert!(rt.is_assignable_class(s.language_class, s.pairlist_class).unwrap());
        assert!(rt.is_assignable_class(s.list_class, s.vector_class).unwrap());
        assert!(!rt.is_assignable_class(s.char_class, s.vector_class).unwrap());
    }

    #[test]
    fn names_are_typed_as_character() {
        let rt = create_test_runtime();
        let s = rt.specials;
        let names = rt.sym.names;
        // Vector subclasses created after the fix-up inherit the type.
        for class in [s.vector_class, s.character_class, s.real_class] {
            let descriptor = rt.class_data(class).unwrap();
            assert_eq!(descriptor.attr_slot(names), crate::AttrSlot::Instance(1));
            assert_eq!(descriptor.attr_class(1), Some(s.character_class));
        }
    }

    #[test]
    fn type_tags_follow_the_legacy_numbering() {
        let rt = create_test_runtime();
        let s = rt.specials;
        let tag = |class| rt.class_data(class).unwrap().type_tag();
        assert_eq!(tag(s.list_class), type_tag::LIST);
        assert_eq!(tag(s.character_class), type_tag::STRING);
        assert_eq!(tag(s.real_class), type_tag::REAL);
        assert_eq!(tag(s.language_class), type_tag::LANGUAGE);
        assert_eq!(tag(s.vector_class), 0);
    }

    #[test]
    fn special_objects_are_pinned_and_distinct() {
        let rt = create_test_runtime();
        let s = rt.specials;
        assert_ne!(s.null, s.missing_arg);
        for object in s.objects() {
            let header = rt.object(object).unwrap().header;
            assert!(header.is_pinned());
            assert_eq!(header.ownership(), Ownership::Shared);
        }
        assert_eq!(rt.chars(s.na_string).unwrap(), "NA");
        assert!(rt.is_null(s.null));
        assert_eq!(rt.class_of(s.null).unwrap(), s.null_class);
    }

    #[test]
    fn assignment_is_bound_globally() {
        let rt = create_test_runtime();
        let bound = rt.lookup(rt.specials.global_env, rt.sym.assign).unwrap();
        let bound = bound.unwrap();
        assert_eq!(rt.class_of(bound).unwrap(), rt.specials.special_class);
    }
}
