use std::{fmt, rc::Rc};

use ahash::AHashMap;

/// Interned attribute/operator name.
///
/// Ids are dense and handed out in interning order, so the same name
/// always maps to the same id for the lifetime of its table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    /// The empty name; means "no symbol" inside attribute maps.
    pub const NONE: Self = Self(0);
    /// Hard-wired to the `class` attribute of every object.
    pub const CLASS: Self = Self(1);

    #[inline(always)]
    pub const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub const fn is_reserved(self) -> bool {
        self.0 <= Self::CLASS.0
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}

/// Append-only name table. Entries are never removed.
#[derive(Debug)]
pub struct SymbolTable {
    names: Vec<Rc<str>>,
    mappings: AHashMap<Rc<str>, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::new(),
            mappings: AHashMap::new(),
        };
        table.intern("");
        table.intern("class");
        table
    }

    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.mappings.get(name) {
            return id;
        }
        let id = SymbolId::from_index(self.names.len());
        let owned: Rc<str> = Rc::from(name);
        self.names.push(owned.clone());
        self.mappings.insert(owned, id);
        log::debug!("new symbol: [{}] {:?}", id.index(), name);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.mappings.get(name).copied()
    }

    pub fn name(&self, id: SymbolId) -> Option<&str> {
        self.names.get(id.index()).map(|name| &**name)
    }

    /// Name for messages; unknown ids render as `#n`.
    pub fn display_name(&self, id: SymbolId) -> String {
        match self.name(id) {
            Some(name) => name.trim_start_matches(METHOD_PREFIX).to_owned(),
            None => format!("#{}", id.index()),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Method chains are stored under a mangled name so they never collide
/// with plain attributes of the same spelling.
pub(crate) const METHOD_PREFIX: char = '\u{1}';

pub(crate) fn method_name(name: &str) -> String {
    let mut mangled = String::with_capacity(name.len() + 1);
    mangled.push(METHOD_PREFIX);
    mangled.push_str(name);
    mangled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids() {
        let table = SymbolTable::new();
        assert_eq!(table.lookup(""), Some(SymbolId::NONE));
        assert_eq!(table.lookup("class"), Some(SymbolId::CLASS));
        assert_eq!(table.len(), 2);
        assert!(SymbolId::CLASS.is_reserved());
    }

    #[test]
    fn interning_is_stable() {
        let mut table = SymbolTable::new();
        let names = table.intern("names");
        let head = table.intern("head");
        assert_eq!(names.index(), 2);
        assert_eq!(head.index(), 3);
        assert_eq!(table.intern("names"), names);
        assert_eq!(table.name(head), Some("head"));
        assert_eq!(table.len(), 4);
        assert!(!names.is_reserved());
    }

    #[test]
    fn method_names_do_not_collide() {
        let mut table = SymbolTable::new();
        let plain = table.intern("length");
        let method = table.intern(&method_name("length"));
        assert_ne!(plain, method);
        assert_eq!(table.display_name(method), "length");
        assert_eq!(table.display_name(SymbolId::from_index(99)), "#99");
    }
}
