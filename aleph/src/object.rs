use std::{fmt, mem::size_of};

use crate::{
    Class, ClassRef, Environment, Header, ObjectRef, Ownership, Runtime,
    RuntimeResult, Signature, SymbolId,
};

/// Host function behind a `builtin` or `special` callable:
/// `(runtime, argument list, environment) -> value`.
pub type NativeFn =
    fn(&mut Runtime, ObjectRef, ObjectRef) -> RuntimeResult<ObjectRef>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

/// Trailing data of an object.
pub enum Data {
    None,
    Chars(String),
    Logical(Vec<i32>),
    Integer(Vec<i32>),
    Real(Vec<f64>),
    Complex(Vec<Complex>),
    /// Element references of character and list vectors.
    Elements(Vec<Option<ObjectRef>>),
    Symbol(SymbolId),
    Class(Box<Class>),
    Method(Vec<Signature>),
    Native(NativeFn),
    Environment(Environment),
}

impl Data {
    /// Byte size of the payload, the `size` field of the object layout.
    pub fn byte_size(&self) -> usize {
        match self {
            Data::None => 0,
            Data::Chars(chars) => chars.len() + 1,
            Data::Logical(values) | Data::Integer(values) => {
                values.len() * size_of::<i32>()
            }
            Data::Real(values) => values.len() * size_of::<f64>(),
            Data::Complex(values) => values.len() * size_of::<Complex>(),
            Data::Elements(values) => {
                values.len() * size_of::<Option<ObjectRef>>()
            }
            Data::Symbol(_) => size_of::<SymbolId>(),
            Data::Class(_) => size_of::<Class>(),
            Data::Method(signatures) => {
                signatures.len() * size_of::<Signature>()
            }
            Data::Native(_) => size_of::<NativeFn>(),
            Data::Environment(env) => env.byte_size(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Data::None => "none",
            Data::Chars(_) => "chars",
            Data::Logical(_) => "logical",
            Data::Integer(_) => "integer",
            Data::Real(_) => "real",
            Data::Complex(_) => "complex",
            Data::Elements(_) => "elements",
            Data::Symbol(_) => "symbol",
            Data::Class(_) => "class",
            Data::Method(_) => "method",
            Data::Native(_) => "native",
            Data::Environment(_) => "environment",
        }
    }

    /// Every object reference held by the payload.
    pub fn for_each_ref(&self, mut visit: impl FnMut(ObjectRef)) {
        match self {
            Data::Elements(values) => {
                values.iter().flatten().for_each(|&r| visit(r))
            }
            Data::Class(class) => class.for_each_ref(visit),
            Data::Method(signatures) => {
                for signature in signatures {
                    if let Some(class) = signature.arg_class {
                        visit(class);
                    }
                    if let Some(value) = signature.value {
                        visit(value);
                    }
                }
            }
            Data::Environment(env) => {
                env.values().iter().flatten().for_each(|&r| visit(r))
            }
            _ => {}
        }
    }
}

impl Clone for Data {
    fn clone(&self) -> Self {
        match self {
            Data::None => Data::None,
            Data::Chars(chars) => Data::Chars(chars.clone()),
            Data::Logical(values) => Data::Logical(values.clone()),
            Data::Integer(values) => Data::Integer(values.clone()),
            Data::Real(values) => Data::Real(values.clone()),
            Data::Complex(values) => Data::Complex(values.clone()),
            Data::Elements(values) => Data::Elements(values.clone()),
            Data::Symbol(id) => Data::Symbol(*id),
            Data::Class(class) => Data::Class(class.clone()),
            Data::Method(signatures) => Data::Method(signatures.clone()),
            Data::Native(f) => Data::Native(*f),
            Data::Environment(env) => Data::Environment(env.clone()),
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Data::Chars(chars) => write!(f, "Chars({chars:?})"),
            Data::Real(values) => write!(f, "Real({values:?})"),
            Data::Integer(values) => write!(f, "Integer({values:?})"),
            Data::Logical(values) => write!(f, "Logical({values:?})"),
            Data::Symbol(id) => write!(f, "Symbol({id:?})"),
            other => write!(f, "{}[{}B]", other.kind(), other.byte_size()),
        }
    }
}

/// A runtime value.
///
/// Slot 0 of the attribute array is the object's class and is never
/// empty; slots `1..=attr_count` hold instance attributes.
#[derive(Debug)]
pub struct Object {
    pub header: Header,
    /// Element count for vector objects.
    pub len: usize,
    class: ClassRef,
    attrs: Box<[Option<ObjectRef>]>,
    pub data: Data,
}

impl Object {
    pub fn new(
        class: ClassRef,
        attr_count: usize,
        data: Data,
        len: usize,
        ownership: Ownership,
    ) -> Self {
        Self {
            header: Header::new(ownership),
            len,
            class,
            attrs: vec![None; attr_count].into_boxed_slice(),
            data,
        }
    }

    #[inline(always)]
    pub fn class(&self) -> ClassRef {
        self.class
    }

    #[inline(always)]
    pub fn attr_count(&self) -> usize {
        self.attrs.len()
    }

    /// Byte size of the trailing data.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.byte_size()
    }

    /// Attribute slot `index`; slot 0 is the class.
    pub fn slot(&self, index: usize) -> Option<Option<ObjectRef>> {
        match index {
            0 => Some(Some(self.class)),
            n => self.attrs.get(n - 1).copied(),
        }
    }

    /// Writes an instance attribute without ownership bookkeeping; only
    /// the write barrier calls this.
    pub(crate) fn store_attr(
        &mut self,
        index: usize,
        value: Option<ObjectRef>,
    ) -> bool {
        match index.checked_sub(1).and_then(|i| self.attrs.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn attrs(&self) -> &[Option<ObjectRef>] {
        &self.attrs
    }

    /// Field-by-field copy with a fresh header. References are copied as
    /// is; the caller fixes up their ownership.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            header: Header::new(Ownership::Single),
            len: self.len,
            class: self.class,
            attrs: self.attrs.clone(),
            data: self.data.clone(),
        }
    }

    /// Every object reference held by this object, the class included.
    pub fn for_each_ref(&self, mut visit: impl FnMut(ObjectRef)) {
        visit(self.class);
        self.attrs.iter().flatten().for_each(|&r| visit(r));
        self.data.for_each_ref(visit);
    }

    /// References this object owns, i.e. the ones whose lifetime may end
    /// with it. The class is never owned.
    pub(crate) fn owned_refs(&self) -> Vec<ObjectRef> {
        let mut refs: Vec<ObjectRef> =
            self.attrs.iter().flatten().copied().collect();
        self.data.for_each_ref(|r| refs.push(r));
        refs
    }
}
