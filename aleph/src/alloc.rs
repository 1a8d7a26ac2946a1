//! Object constructors and typed payload accessors.
//!
//! Everything allocated here lands in the current pool (or the collector
//! pool outside any scope) except symbol objects, which are pinned.

use crate::{
    ClassRef, Complex, Data, NativeFn, Object, ObjectRef, Ownership, Runtime,
    RuntimeError, RuntimeResult, Slot, SymbolId,
};

/// Integer and logical missing value.
pub const NA_INTEGER: i32 = i32::MIN;

macro_rules! payload_accessors {
    ($($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $expected:literal;)*) => {$(
        pub fn $get(&self, object: ObjectRef) -> RuntimeResult<&[$ty]> {
            match self.data(object)? {
                Data::$variant(values) => Ok(values.as_slice()),
                _ => Err(self.type_mismatch($expected, object)),
            }
        }

        pub fn $get_mut(
            &mut self,
            object: ObjectRef,
        ) -> RuntimeResult<&mut [$ty]> {
            if !matches!(self.object(object)?.data, Data::$variant(_)) {
                return Err(self.type_mismatch($expected, object));
            }
            match &mut self.object_mut(object)?.data {
                Data::$variant(values) => Ok(values.as_mut_slice()),
                _ => Err(RuntimeError::DanglingReference(object)),
            }
        }
    )*};
}

impl Runtime {
    // ── Generic allocation ────────────────────────────────────────────

    /// Instance of `class` with every attribute unset and no payload.
    pub fn alloc_object(&mut self, class: ClassRef) -> RuntimeResult<ObjectRef> {
        self.alloc_var_object(class, Data::None, 0)
    }

    /// Instance of `class` carrying `data` as its payload.
    pub fn alloc_var_object(
        &mut self,
        class: ClassRef,
        data: Data,
        len: usize,
    ) -> RuntimeResult<ObjectRef> {
        let attrs = self.class_data(class)?.instance_attr_count();
        self.allocate(Object::new(class, attrs, data, len, Ownership::Shared))
    }

    pub fn alloc_real_vector(&mut self, len: usize) -> RuntimeResult<ObjectRef> {
        let class = self.specials.real_class;
        self.alloc_var_object(class, Data::Real(vec![0.0; len]), len)
    }

    pub fn alloc_int_vector(&mut self, len: usize) -> RuntimeResult<ObjectRef> {
        let class = self.specials.integer_class;
        self.alloc_var_object(class, Data::Integer(vec![0; len]), len)
    }

    pub fn alloc_logical_vector(
        &mut self,
        len: usize,
    ) -> RuntimeResult<ObjectRef> {
        let class = self.specials.logical_class;
        self.alloc_var_object(class, Data::Logical(vec![0; len]), len)
    }

    pub fn alloc_complex_vector(
        &mut self,
        len: usize,
    ) -> RuntimeResult<ObjectRef> {
        let class = self.specials.complex_class;
        let values = vec![Complex::default(); len];
        self.alloc_var_object(class, Data::Complex(values), len)
    }

    /// List of `len` unset elements.
    pub fn alloc_object_vector(
        &mut self,
        len: usize,
    ) -> RuntimeResult<ObjectRef> {
        let class = self.specials.list_class;
        self.alloc_var_object(class, Data::Elements(vec![None; len]), len)
    }

    // ── Scalars and strings ───────────────────────────────────────────

    /// A single character string (not a vector).
    pub fn mk_char(&mut self, text: &str) -> RuntimeResult<ObjectRef> {
        let class = self.specials.char_class;
        self.alloc_var_object(class, Data::Chars(text.to_owned()), text.len())
    }

    /// Character vector holding one string.
    pub fn mk_string(&mut self, text: &str) -> RuntimeResult<ObjectRef> {
        // Built in a scope so the half-built string survives a collection.
        self.scope(|rt| {
            let class = rt.specials.character_class;
            let string =
                rt.alloc_var_object(class, Data::Elements(vec![None]), 1)?;
            let chars = rt.mk_char(text)?;
            rt.set_element(string, 0, Some(chars))?;
            Ok(string)
        })
    }

    pub fn scalar_real(&mut self, value: f64) -> RuntimeResult<ObjectRef> {
        let object = self.alloc_real_vector(1)?;
        self.reals_mut(object)?[0] = value;
        Ok(object)
    }

    pub fn scalar_integer(&mut self, value: i32) -> RuntimeResult<ObjectRef> {
        let object = self.alloc_int_vector(1)?;
        self.integers_mut(object)?[0] = value;
        Ok(object)
    }

    pub fn scalar_logical(&mut self, value: bool) -> RuntimeResult<ObjectRef> {
        let object = self.alloc_logical_vector(1)?;
        self.logicals_mut(object)?[0] = i32::from(value);
        Ok(object)
    }

    // ── Pairlists ─────────────────────────────────────────────────────

    /// One cell of class `class` (a pairlist class) with `head` and `next`.
    pub fn cons_pairs(
        &mut self,
        class: ClassRef,
        head: ObjectRef,
        next: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let cell = self.alloc_object(class)?;
        let (head_sym, next_sym) = (self.sym.head, self.sym.next);
        self.set_attr(cell, head_sym, Some(head))?;
        self.set_attr(cell, next_sym, Some(next))?;
        Ok(cell)
    }

    pub fn cons(
        &mut self,
        head: ObjectRef,
        next: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        self.cons_pairs(self.specials.pairlist_class, head, next)
    }

    /// Like [`Runtime::cons`] but the cell is a language object.
    pub fn lcons(
        &mut self,
        head: ObjectRef,
        next: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        self.cons_pairs(self.specials.language_class, head, next)
    }

    /// Null-terminated pairlist of `items`; the empty list is null.
    pub fn list(&mut self, items: &[ObjectRef]) -> RuntimeResult<ObjectRef> {
        self.scope(|rt| {
            let mut tail = rt.specials.null;
            for &item in items.iter().rev() {
                tail = rt.cons(item, tail)?;
            }
            Ok(tail)
        })
    }

    /// Call expression: `items[0]` applied to the rest.
    pub fn lang(&mut self, items: &[ObjectRef]) -> RuntimeResult<ObjectRef> {
        let Some((&function, args)) = items.split_first() else {
            return Err(RuntimeError::invalid("a call needs a function"));
        };
        self.scope(|rt| {
            let args = rt.list(args)?;
            rt.lcons(function, args)
        })
    }

    /// Heads of the pairlist `list`, in order. An unset head reads as null.
    pub fn list_to_vec(&self, list: ObjectRef) -> RuntimeResult<Vec<ObjectRef>> {
        let pairlist = self.specials.pairlist_class;
        let mut items = Vec::new();
        let mut cell = list;
        while !self.is_null(cell) {
            if !self.is_assignable(cell, pairlist)? {
                return Err(self.type_mismatch("pairlist", cell));
            }
            let head = self.get_attr(cell, self.sym.head)?;
            items.push(head.unwrap_or(self.specials.null));
            match self.get_attr(cell, self.sym.next)? {
                Some(next) => cell = next,
                None => break,
            }
        }
        Ok(items)
    }

    // ── Symbols and callables ─────────────────────────────────────────

    /// The symbol object for `name`. Symbol objects are pinned and unique
    /// per name.
    pub fn install(&mut self, name: &str) -> RuntimeResult<ObjectRef> {
        let id = self.symbols.intern(name);
        if let Some(&object) = self.symbol_objects.get(&id) {
            return Ok(object);
        }
        let class = self.specials.symbol_class;
        let attrs = self.class_data(class)?.instance_attr_count();
        let object = self.allocate_pinned(Object::new(
            class,
            attrs,
            Data::Symbol(id),
            0,
            Ownership::Shared,
        ))?;
        self.symbol_objects.insert(id, object);
        Ok(object)
    }

    /// Symbol id carried by a symbol or generic object.
    pub fn symbol_id(&self, object: ObjectRef) -> RuntimeResult<SymbolId> {
        match self.object(object)?.data {
            Data::Symbol(id) => Ok(id),
            _ => Err(self.type_mismatch("symbol", object)),
        }
    }

    pub fn new_builtin(&mut self, native: NativeFn) -> RuntimeResult<ObjectRef> {
        let class = self.specials.builtin_class;
        self.alloc_var_object(class, Data::Native(native), 0)
    }

    pub fn new_special(&mut self, native: NativeFn) -> RuntimeResult<ObjectRef> {
        let class = self.specials.special_class;
        self.alloc_var_object(class, Data::Native(native), 0)
    }

    /// Generic function dispatching the method `name`.
    pub fn new_generic(&mut self, name: &str) -> RuntimeResult<ObjectRef> {
        let id = self.symbols.intern(name);
        let class = self.specials.generic_class;
        self.alloc_var_object(class, Data::Symbol(id), 0)
    }

    // ── Payload access ────────────────────────────────────────────────

    payload_accessors! {
        reals, reals_mut, Real, f64, "real";
        integers, integers_mut, Integer, i32, "integer";
        logicals, logicals_mut, Logical, i32, "logical";
        complexes, complexes_mut, Complex, Complex, "complex";
    }

    pub fn chars(&self, object: ObjectRef) -> RuntimeResult<&str> {
        match self.data(object)? {
            Data::Chars(chars) => Ok(chars.as_str()),
            _ => Err(self.type_mismatch("characterString", object)),
        }
    }

    pub fn elements(
        &self,
        object: ObjectRef,
    ) -> RuntimeResult<&[Option<ObjectRef>]> {
        match self.data(object)? {
            Data::Elements(values) => Ok(values.as_slice()),
            _ => Err(self.type_mismatch("list", object)),
        }
    }

    pub fn element(
        &self,
        object: ObjectRef,
        index: usize,
    ) -> RuntimeResult<Option<ObjectRef>> {
        self.read(Slot::Element { object, index })
    }

    pub fn set_element(
        &mut self,
        object: ObjectRef,
        index: usize,
        value: Option<ObjectRef>,
    ) -> RuntimeResult<()> {
        self.set(Slot::Element { object, index }, value)
    }

    /// Copies `object` into the current pool. The copy refers to the same
    /// children as `object`, so every one of them becomes shared.
    pub fn shallow_copy(&mut self, object: ObjectRef) -> RuntimeResult<ObjectRef> {
        let duplicate = self.object(object)?.duplicate();
        let children = duplicate.owned_refs();
        let copy = self.allocate(duplicate)?;
        for child in children {
            self.share(child)?;
        }
        Ok(copy)
    }

    /// One-line summary of `object`: class, attribute count, payload size
    /// and length, followed by a short preview of the payload.
    pub fn describe(&self, object: ObjectRef) -> String {
        if self.is_null(object) {
            return "NULL object".to_owned();
        }
        let Ok(target) = self.object(object) else {
            return format!("{object} <dangling>");
        };
        let mut line = format!(
            "{object} class={}, attrs={}, size={}, len={}",
            self.class_name(object),
            target.attr_count(),
            target.size(),
            target.len
        );
        let preview = match &target.data {
            Data::Chars(chars) => Some(format!("{chars:?}")),
            Data::Symbol(id) => Some(format!("`{}`", self.symbols.display_name(*id))),
            Data::Real(values) => Some(preview(values)),
            Data::Integer(values) | Data::Logical(values) => Some(preview(values)),
            Data::Class(class) => Some(format!("<{}>", class.name())),
            _ => None,
        };
        if let Some(preview) = preview {
            line.push_str(" : ");
            line.push_str(&preview);
        }
        line
    }
}

fn preview<T: std::fmt::Debug>(values: &[T]) -> String {
    const SHOWN: usize = 6;
    let head: Vec<String> =
        values.iter().take(SHOWN).map(|v| format!("{v:?}")).collect();
    if values.len() > SHOWN {
        format!("[{}, ...]", head.join(", "))
    } else {
        format!("[{}]", head.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RuntimeCreateInfo, create_test_runtime};

    #[test]
    fn vectors_are_zeroed() {
        let mut rt = create_test_runtime();
        let reals = rt.alloc_real_vector(3).unwrap();
        let ints = rt.alloc_int_vector(2).unwrap();
        let complex = rt.alloc_complex_vector(1).unwrap();
        assert_eq!(rt.reals(reals).unwrap(), &[0.0, 0.0, 0.0]);
        assert_eq!(rt.integers(ints).unwrap(), &[0, 0]);
        assert_eq!(rt.complexes(complex).unwrap(), &[Complex::default()]);
        assert_eq!(rt.length(reals).unwrap(), 3);
        assert_eq!(rt.object(reals).unwrap().size(), 24);
        assert!(matches!(
            rt.integers(reals),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn objects_match_their_class_shape() {
        let mut rt = create_test_runtime();
        let head = rt.scalar_real(1.0).unwrap();
        rt.cons(head, rt.specials.null).unwrap();
        rt.mk_string("s").unwrap();
        rt.new_environment(None).unwrap();
        for handle in rt.heap.handles() {
            let object = rt.object(handle).unwrap();
            let class = rt.class_data(object.class()).unwrap();
            assert_eq!(object.attr_count(), class.instance_attr_count());
            assert_eq!(object.slot(0), Some(Some(object.class())));
        }
    }

    #[test]
    fn scalars() {
        let mut rt = create_test_runtime();
        let t = rt.scalar_logical(true).unwrap();
        let f = rt.scalar_logical(false).unwrap();
        assert_eq!(rt.logicals(t).unwrap(), &[1]);
        assert_eq!(rt.logicals(f).unwrap(), &[0]);
        assert_eq!(rt.class_of(t).unwrap(), rt.specials.logical_class);

        let x = rt.scalar_real(0.5).unwrap();
        assert_eq!(rt.reals(x).unwrap(), &[0.5]);
        let n = rt.scalar_integer(NA_INTEGER).unwrap();
        assert_eq!(rt.integers(n).unwrap(), &[i32::MIN]);
    }

    #[test]
    fn strings_hold_a_single_char_element() {
        let mut rt = create_test_runtime();
        let string = rt.mk_string("foo").unwrap();
        assert_eq!(rt.class_of(string).unwrap(), rt.specials.character_class);
        let chars = rt.element(string, 0).unwrap().unwrap();
        assert_eq!(rt.chars(chars).unwrap(), "foo");
        assert_eq!(rt.class_of(chars).unwrap(), rt.specials.char_class);
        assert_eq!(rt.ownership(chars).unwrap(), Ownership::Single);
        assert!(matches!(
            rt.element(string, 1),
            Err(RuntimeError::IndexOutOfBounds { index: 1, len: 1 })
        ));
    }

    #[test]
    fn strings_survive_a_collection_while_built() {
        let mut rt = Runtime::new(RuntimeCreateInfo {
            object_limit: Some(128),
            ..Default::default()
        })
        .unwrap();
        while rt.live_objects() < 127 {
            rt.alloc_real_vector(1).unwrap();
        }
        assert_eq!(rt.heap_stats().collections, 0);

        // The string fills the heap; its element forces a collection.
        let string = rt.mk_string("kept").unwrap();
        assert_eq!(rt.heap_stats().collections, 1);
        assert!(rt.is_live(string));
        let chars = rt.element(string, 0).unwrap().unwrap();
        assert_eq!(rt.chars(chars).unwrap(), "kept");
    }

    #[test]
    fn lists_and_calls() {
        let mut rt = create_test_runtime();
        let null = rt.specials.null;
        assert_eq!(rt.list(&[]).unwrap(), null);

        let items: Vec<_> =
            (0..3).map(|i| rt.scalar_integer(i).unwrap()).collect();
        let list = rt.list(&items).unwrap();
        assert_eq!(rt.class_of(list).unwrap(), rt.specials.pairlist_class);
        assert_eq!(rt.list_to_vec(list).unwrap(), items);

        let f = rt.install("f").unwrap();
        let call = rt.lang(&[f, items[0]]).unwrap();
        assert_eq!(rt.class_of(call).unwrap(), rt.specials.language_class);
        let head = rt.get_attr(call, rt.sym.head).unwrap();
        assert_eq!(head, Some(f));
        let args = rt.get_attr(call, rt.sym.next).unwrap().unwrap();
        assert_eq!(rt.class_of(args).unwrap(), rt.specials.pairlist_class);
        assert_eq!(rt.list_to_vec(args).unwrap(), vec![items[0]]);

        assert!(rt.lang(&[]).is_err());
        let not_a_list = rt.scalar_real(1.0).unwrap();
        assert!(matches!(
            rt.list_to_vec(not_a_list),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn next_must_be_a_pairlist() {
        let mut rt = create_test_runtime();
        let head = rt.scalar_integer(1).unwrap();
        let next = rt.scalar_integer(2).unwrap();
        assert!(matches!(
            rt.cons(head, next),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn symbols_are_unique_and_pinned() {
        let mut rt = create_test_runtime();
        let a = rt.install("alpha").unwrap();
        let live = rt.live_objects();
        assert_eq!(rt.install("alpha").unwrap(), a);
        assert_eq!(rt.live_objects(), live);
        assert!(rt.object(a).unwrap().header.is_pinned());
        assert_eq!(rt.symbol_id(a).unwrap(), rt.intern("alpha"));

        let value = rt.scalar_real(1.0).unwrap();
        assert!(matches!(
            rt.symbol_id(value),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn shallow_copies_share_children() {
        let mut rt = create_test_runtime();
        let pool = rt.new_pool();
        let list = rt.alloc_object_vector(1).unwrap();
        let child = rt.scalar_real(2.0).unwrap();
        rt.set_element(list, 0, Some(child)).unwrap();
        assert_eq!(rt.ownership(child).unwrap(), Ownership::Single);

        let copy = rt.copy(list).unwrap();
        assert_ne!(copy, list);
        assert_eq!(rt.element(copy, 0).unwrap(), Some(child));
        assert_eq!(rt.ownership(child).unwrap(), Ownership::Shared);
        assert_eq!(rt.ownership(copy).unwrap(), Ownership::Pool(pool));

        // Dropping one referrer must not free the shared child.
        rt.set_element(list, 0, None).unwrap();
        assert!(rt.is_live(child));
        rt.release_pool(pool).unwrap();
    }

    #[test]
    fn describe_summarizes() {
        let mut rt = create_test_runtime();
        assert_eq!(rt.describe(rt.specials.null), "NULL object");
        let value = rt.alloc_real_vector(10).unwrap();
        let line = rt.describe(value);
        assert!(line.contains("class=real"));
        assert!(line.contains("size=80, len=10"));
        assert!(line.ends_with("...]"));
        let chars = rt.mk_char("foo").unwrap();
        assert!(rt.describe(chars).ends_with("\"foo\""));
    }
}
