use std::{fmt, rc::Rc};

use bitflags::bitflags;

use crate::{
    Behavior, ClassRef, Data, Header, Object, ObjectRef, Runtime,
    RuntimeError, RuntimeResult, Slot, SymbolId, SymbolTable,
};

/// Superclasses stored inline before spilling into the overflow list.
pub const INLINE_SUPERCLASSES: usize = 3;

/// Where an attribute symbol lives for instances of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrSlot {
    /// The class does not recognize the symbol.
    #[default]
    Unmapped,
    /// Instance slot, 1-based (slot 0 is the class).
    Instance(u32),
    /// Index into the class-level attribute array.
    ClassLevel(u32),
}

impl AttrSlot {
    /// Signed encoding: positive instance slot, negative class-level
    /// index, zero unmapped.
    pub const fn encode(self) -> i32 {
        match self {
            AttrSlot::Unmapped => 0,
            AttrSlot::Instance(slot) => slot as i32,
            AttrSlot::ClassLevel(index) => -(index as i32) - 1,
        }
    }

    pub const fn decode(raw: i32) -> Self {
        if raw > 0 {
            AttrSlot::Instance(raw as u32)
        } else if raw < 0 {
            AttrSlot::ClassLevel((-raw - 1) as u32)
        } else {
            AttrSlot::Unmapped
        }
    }
}

bitflags! {
    /// Low seven bits carry the legacy vector-language type tag.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct ClassFlags: u32 {
        const TYPE_MASK = 0x7f;
    }
}

/// Supertype list: a few inline entries, then an overflow vector.
#[derive(Debug, Clone, Default)]
pub struct SuperClasses {
    inline: [Option<ClassRef>; INLINE_SUPERCLASSES],
    overflow: Vec<ClassRef>,
}

impl SuperClasses {
    pub fn len(&self) -> usize {
        self.inline.iter().flatten().count() + self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inline[0].is_none()
    }

    pub fn push(&mut self, class: ClassRef) {
        match self.inline.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(class),
            None => self.overflow.push(class),
        }
    }

    pub fn contains(&self, class: ClassRef) -> bool {
        self.iter().any(|c| c == class)
    }

    /// Inline entries in declared order, then the overflow entries.
    pub fn iter(&self) -> impl Iterator<Item = ClassRef> + '_ {
        self.inline
            .iter()
            .flatten()
            .copied()
            .chain(self.overflow.iter().copied())
    }

    pub fn overflow(&self) -> &[ClassRef] {
        &self.overflow
    }
}

/// Shape and behavior descriptor shared by all instances of a class.
#[derive(Clone)]
pub struct Class {
    name: Rc<str>,
    instance_attrs: usize,
    supers: SuperClasses,
    attr_map: Vec<AttrSlot>,
    /// Declared class of instance slot `n` at index `n - 1`.
    attr_classes: Vec<ClassRef>,
    class_attrs: Vec<Option<ObjectRef>>,
    flags: ClassFlags,
    behavior: Rc<dyn Behavior>,
}

impl Class {
    /// A class with no superclasses and no attributes.
    pub fn root(name: &str, behavior: Rc<dyn Behavior>) -> Self {
        Self {
            name: Rc::from(name),
            instance_attrs: 0,
            supers: SuperClasses::default(),
            attr_map: Vec::new(),
            attr_classes: Vec::new(),
            class_attrs: Vec::new(),
            flags: ClassFlags::empty(),
            behavior,
        }
    }

    /// Builds the descriptor of a direct subclass of `self`.
    ///
    /// Inherited instance slots keep their indices; each new attribute
    /// takes the next free instance slot in the order given. Class-level
    /// entries stay with the parent and are found by walking upwards.
    pub fn derive(
        &self,
        parent: ClassRef,
        name: &str,
        new_attrs: &[SymbolId],
        new_classes: Option<&[ClassRef]>,
        default_class: ClassRef,
        symbols: &SymbolTable,
    ) -> RuntimeResult<Self> {
        match new_classes {
            Some(classes) if classes.len() != new_attrs.len() => {
                return Err(RuntimeError::invalid(format!(
                    "{} attribute classes given for {} attributes",
                    classes.len(),
                    new_attrs.len()
                )));
            }
            _ => {}
        }

        let highest = new_attrs.iter().map(|s| s.index() + 1).max();
        let map_len = highest.unwrap_or(0).max(self.attr_map.len());
        let mut attr_map: Vec<AttrSlot> = self
            .attr_map
            .iter()
            .map(|slot| match slot {
                AttrSlot::Instance(_) => *slot,
                _ => AttrSlot::Unmapped,
            })
            .collect();
        attr_map.resize(map_len, AttrSlot::Unmapped);

        let mut instance_attrs = self.instance_attrs;
        for &symbol in new_attrs {
            if symbol.is_reserved() {
                return Err(RuntimeError::ReservedSymbol(symbol));
            }
            if attr_map[symbol.index()] != AttrSlot::Unmapped {
                return Err(RuntimeError::DuplicateAttribute {
                    class: name.to_owned(),
                    attribute: symbols.display_name(symbol),
                });
            }
            instance_attrs += 1;
            attr_map[symbol.index()] = AttrSlot::Instance(instance_attrs as u32);
        }

        let mut attr_classes = self.attr_classes.clone();
        match new_classes {
            Some(classes) => attr_classes.extend_from_slice(classes),
            None => attr_classes
                .extend(std::iter::repeat_n(default_class, new_attrs.len())),
        }

        let mut supers = SuperClasses::default();
        supers.push(parent);

        Ok(Self {
            name: Rc::from(name),
            instance_attrs,
            supers,
            attr_map,
            attr_classes,
            class_attrs: Vec::new(),
            flags: self.flags,
            behavior: self.behavior.clone(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of instance attribute slots, the class slot excluded.
    #[inline]
    pub fn instance_attr_count(&self) -> usize {
        self.instance_attrs
    }

    #[inline]
    pub fn superclasses(&self) -> &SuperClasses {
        &self.supers
    }

    pub fn attr_slot(&self, symbol: SymbolId) -> AttrSlot {
        self.attr_map
            .get(symbol.index())
            .copied()
            .unwrap_or_default()
    }

    #[inline]
    pub fn attr_map_len(&self) -> usize {
        self.attr_map.len()
    }

    /// Declared class of 1-based instance slot `slot`.
    pub fn attr_class(&self, slot: usize) -> Option<ClassRef> {
        slot.checked_sub(1)
            .and_then(|i| self.attr_classes.get(i))
            .copied()
    }

    pub fn attr_classes(&self) -> &[ClassRef] {
        &self.attr_classes
    }

    pub fn class_attr(&self, index: usize) -> Option<Option<ObjectRef>> {
        self.class_attrs.get(index).copied()
    }

    pub fn class_attrs(&self) -> &[Option<ObjectRef>] {
        &self.class_attrs
    }

    #[inline]
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    #[inline]
    pub fn type_tag(&self) -> u8 {
        (self.flags & ClassFlags::TYPE_MASK).bits() as u8
    }

    #[inline]
    pub fn behavior(&self) -> Rc<dyn Behavior> {
        self.behavior.clone()
    }

    pub(crate) fn supers_mut(&mut self) -> &mut SuperClasses {
        &mut self.supers
    }

    pub(crate) fn set_behavior(&mut self, behavior: Rc<dyn Behavior>) {
        self.behavior = behavior;
    }

    pub(crate) fn set_type_tag(&mut self, tag: u8) {
        let tag = ClassFlags::from_bits_truncate(tag as u32)
            & ClassFlags::TYPE_MASK;
        self.flags = (self.flags - ClassFlags::TYPE_MASK) | tag;
    }

    pub(crate) fn set_attr_class(&mut self, slot: usize, class: ClassRef) {
        if let Some(entry) =
            slot.checked_sub(1).and_then(|i| self.attr_classes.get_mut(i))
        {
            *entry = class;
        }
    }

    /// Maps `symbol` to a new, empty class-level slot.
    pub(crate) fn add_class_attr_slot(&mut self, symbol: SymbolId) -> usize {
        let index = self.class_attrs.len();
        self.class_attrs.push(None);
        if self.attr_map.len() <= symbol.index() {
            self.attr_map.resize(symbol.index() + 1, AttrSlot::Unmapped);
        }
        self.attr_map[symbol.index()] = AttrSlot::ClassLevel(index as u32);
        index
    }

    pub(crate) fn store_class_attr(
        &mut self,
        index: usize,
        value: Option<ObjectRef>,
    ) -> bool {
        match self.class_attrs.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn for_each_ref(&self, mut visit: impl FnMut(ObjectRef)) {
        self.supers.iter().for_each(&mut visit);
        self.attr_classes.iter().for_each(|&c| visit(c));
        self.class_attrs.iter().flatten().for_each(|&r| visit(r));
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("instance_attrs", &self.instance_attrs)
            .field("supers", &self.supers)
            .field("attr_map", &self.attr_map)
            .field("class_attrs", &self.class_attrs.len())
            .field("type_tag", &self.type_tag())
            .field("behavior", &self.behavior.name())
            .finish()
    }
}

// ── Runtime operations on classes ─────────────────────────────────────

impl Runtime {
    pub fn class_data(&self, class: ClassRef) -> RuntimeResult<&Class> {
        match &self.object(class)?.data {
            Data::Class(descriptor) => Ok(descriptor),
            _ => Err(self.type_mismatch("class", class)),
        }
    }

    pub(crate) fn class_data_mut(
        &mut self,
        class: ClassRef,
    ) -> RuntimeResult<&mut Class> {
        let is_class = matches!(self.object(class)?.data, Data::Class(_));
        if !is_class {
            return Err(self.type_mismatch("class", class));
        }
        match &mut self.object_mut(class)?.data {
            Data::Class(descriptor) => Ok(descriptor),
            _ => Err(RuntimeError::DanglingReference(class)),
        }
    }

    pub fn class_of(&self, object: ObjectRef) -> RuntimeResult<ClassRef> {
        Ok(self.object(object)?.class())
    }

    pub fn class_name(&self, object: ObjectRef) -> String {
        self.class_of(object)
            .and_then(|class| self.class_data(class))
            .map(|class| class.name().to_owned())
            .unwrap_or_else(|_| "<dangling>".to_owned())
    }

    pub fn is_class(&self, object: ObjectRef) -> bool {
        self.class_of(object)
            .is_ok_and(|class| class == self.specials.class_class)
    }

    /// Installs a class descriptor as a pinned instance of the class of
    /// classes.
    pub(crate) fn register_class(
        &mut self,
        descriptor: Class,
    ) -> RuntimeResult<ClassRef> {
        let name = descriptor.name.clone();
        let mut object = Object::new(
            self.specials.class_class,
            0,
            Data::Class(Box::new(descriptor)),
            0,
            crate::Ownership::Shared,
        );
        object.header = Header::pinned();
        let class = self.allocate_pinned(object)?;
        self.classes.push(class);
        log::debug!("new class <{name}> {class:?}");
        Ok(class)
    }

    /// Creates a subclass of `parent` adding `new_attrs` as instance
    /// attributes. Without `new_classes` the new attributes accept any
    /// object.
    pub fn subclass(
        &mut self,
        parent: ClassRef,
        name: &str,
        new_attrs: &[SymbolId],
        new_classes: Option<&[ClassRef]>,
    ) -> RuntimeResult<ClassRef> {
        let default_class = self.specials.object_class;
        let descriptor = self.class_data(parent)?.derive(
            parent,
            name,
            new_attrs,
            new_classes,
            default_class,
            &self.symbols,
        )?;
        self.register_class(descriptor)
    }

    /// Records an additional supertype of `class`. Used to break
    /// definition cycles during bootstrap and for subtype relations that
    /// do not affect attribute layout.
    pub fn add_superclass(
        &mut self,
        class: ClassRef,
        superclass: ClassRef,
    ) -> RuntimeResult<()> {
        self.class_data(superclass)?;
        if self.is_assignable_class(superclass, class)? {
            return Err(RuntimeError::CyclicHierarchy {
                class: self.class_data(class)?.name().to_owned(),
                superclass: self.class_data(superclass)?.name().to_owned(),
            });
        }
        let supers = self.class_data_mut(class)?.supers_mut();
        if !supers.contains(superclass) {
            supers.push(superclass);
        }
        Ok(())
    }

    pub fn set_behavior(
        &mut self,
        class: ClassRef,
        behavior: Rc<dyn Behavior>,
    ) -> RuntimeResult<()> {
        self.class_data_mut(class)?.set_behavior(behavior);
        Ok(())
    }

    pub fn set_type_tag(&mut self, class: ClassRef, tag: u8) -> RuntimeResult<()> {
        self.class_data_mut(class)?.set_type_tag(tag);
        Ok(())
    }

    /// Retargets the declared class of the instance attribute `symbol`.
    pub fn set_attr_class(
        &mut self,
        class: ClassRef,
        symbol: SymbolId,
        attr_class: ClassRef,
    ) -> RuntimeResult<()> {
        self.class_data(attr_class)?;
        match self.class_data(class)?.attr_slot(symbol) {
            AttrSlot::Instance(slot) => {
                self.class_data_mut(class)?
                    .set_attr_class(slot as usize, attr_class);
                Ok(())
            }
            _ => Err(self.no_such_attribute(class, symbol)),
        }
    }

    /// Class-level attribute of `class` itself, without walking upwards.
    pub fn class_attr(
        &self,
        class: ClassRef,
        symbol: SymbolId,
    ) -> RuntimeResult<Option<ObjectRef>> {
        let descriptor = self.class_data(class)?;
        Ok(match descriptor.attr_slot(symbol) {
            AttrSlot::ClassLevel(index) => {
                descriptor.class_attr(index as usize).flatten()
            }
            _ => None,
        })
    }

    /// Binds `value` as a class-level attribute shared by all instances.
    pub fn define_class_attr(
        &mut self,
        class: ClassRef,
        symbol: SymbolId,
        value: Option<ObjectRef>,
    ) -> RuntimeResult<()> {
        if symbol.is_reserved() {
            return Err(RuntimeError::ReservedSymbol(symbol));
        }
        let index = match self.class_data(class)?.attr_slot(symbol) {
            AttrSlot::ClassLevel(index) => index as usize,
            AttrSlot::Instance(_) => {
                return Err(RuntimeError::DuplicateAttribute {
                    class: self.class_data(class)?.name().to_owned(),
                    attribute: self.symbols.display_name(symbol),
                });
            }
            AttrSlot::Unmapped => {
                self.class_data_mut(class)?.add_class_attr_slot(symbol)
            }
        };
        self.set(Slot::ClassAttr { class, index }, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefaultBehavior, create_test_runtime};

    #[test]
    fn attr_slot_encoding() {
        for slot in [
            AttrSlot::Unmapped,
            AttrSlot::Instance(1),
            AttrSlot::Instance(7),
            AttrSlot::ClassLevel(0),
            AttrSlot::ClassLevel(4),
        ] {
            assert_eq!(AttrSlot::decode(slot.encode()), slot);
        }
        assert_eq!(AttrSlot::Instance(3).encode(), 3);
        assert_eq!(AttrSlot::ClassLevel(0).encode(), -1);
        assert_eq!(AttrSlot::Unmapped.encode(), 0);
    }

    #[test]
    fn superclasses_spill_into_overflow() {
        let mut supers = SuperClasses::default();
        assert!(supers.is_empty());
        for i in 0..5 {
            supers.push(ObjectRef::new(i, 0));
        }
        assert_eq!(supers.len(), 5);
        assert_eq!(supers.overflow().len(), 2);
        let order: Vec<usize> = supers.iter().map(|c| c.index()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn derive_assigns_next_slots() {
        let mut symbols = SymbolTable::new();
        let a = symbols.intern("a");
        let x = symbols.intern("x");
        let y = symbols.intern("y");
        let parent_ref = ObjectRef::new(10, 0);
        let any = ObjectRef::new(11, 0);

        let root = Class::root("object", Rc::new(DefaultBehavior));
        let parent = root
            .derive(ObjectRef::new(1, 0), "p", &[a], None, any, &symbols)
            .unwrap();
        let child = parent
            .derive(parent_ref, "c", &[y, x], None, any, &symbols)
            .unwrap();

        assert_eq!(child.attr_slot(a), AttrSlot::Instance(1));
        assert_eq!(child.attr_slot(y), AttrSlot::Instance(2));
        assert_eq!(child.attr_slot(x), AttrSlot::Instance(3));
        assert_eq!(child.instance_attr_count(), 3);
        assert_eq!(child.attr_classes(), &[any, any, any]);
        assert_eq!(child.superclasses().iter().collect::<Vec<_>>(), vec![
            parent_ref
        ]);
        assert_eq!(child.attr_map_len(), y.index() + 1);
    }

    #[test]
    fn derive_rejects_reserved_and_duplicates() {
        let mut symbols = SymbolTable::new();
        let a = symbols.intern("a");
        let any = ObjectRef::new(11, 0);
        let root = Class::root("object", Rc::new(DefaultBehavior));
        let parent = root
            .derive(ObjectRef::new(1, 0), "p", &[a], None, any, &symbols)
            .unwrap();

        assert!(matches!(
            parent.derive(any, "c", &[a], None, any, &symbols),
            Err(RuntimeError::DuplicateAttribute { .. })
        ));
        assert!(matches!(
            parent.derive(any, "c", &[SymbolId::CLASS], None, any, &symbols),
            Err(RuntimeError::ReservedSymbol(_))
        ));
        assert!(matches!(
            parent.derive(any, "c", &[], Some(&[any]), any, &symbols),
            Err(RuntimeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn subclass_inherits_slots() {
        let mut rt = create_test_runtime();
        let n = rt.class_data(rt.specials.pairlist_class).unwrap();
        let parent_count = n.instance_attr_count();
        let x = rt.symbols.intern("x");
        let y = rt.symbols.intern("y");
        let pairlist = rt.specials.pairlist_class;
        let child = rt.subclass(pairlist, "point", &[x, y], None).unwrap();

        let parent = rt.class_data(pairlist).unwrap();
        let descriptor = rt.class_data(child).unwrap();
        for symbol in [rt.sym.next, rt.sym.head, rt.sym.tag] {
            assert_eq!(descriptor.attr_slot(symbol), parent.attr_slot(symbol));
        }
        assert_eq!(
            descriptor.attr_slot(x),
            AttrSlot::Instance(parent_count as u32 + 1)
        );
        assert_eq!(
            descriptor.attr_slot(y),
            AttrSlot::Instance(parent_count as u32 + 2)
        );
        assert_eq!(descriptor.type_tag(), parent.type_tag());
        assert!(rt.is_class(child));
    }

    #[test]
    fn add_superclass_rejects_cycles() {
        let mut rt = create_test_runtime();
        let real = rt.specials.real_class;
        let numeric = rt.specials.numeric_class;
        assert!(matches!(
            rt.add_superclass(numeric, real),
            Err(RuntimeError::CyclicHierarchy { .. })
        ));
        let list = rt.specials.list_class;
        rt.add_superclass(real, list).unwrap();
        rt.add_superclass(real, list).unwrap();
        assert_eq!(rt.class_data(real).unwrap().superclasses().len(), 2);
    }

    #[test]
    fn class_level_attributes() {
        let mut rt = create_test_runtime();
        let vector = rt.specials.vector_class;
        let dim = rt.symbols.intern("dim");
        let value = rt.scalar_integer(2).unwrap();
        rt.define_class_attr(vector, dim, Some(value)).unwrap();
        assert_eq!(rt.class_attr(vector, dim).unwrap(), Some(value));
        let names = rt.sym.names;
        assert!(matches!(
            rt.define_class_attr(vector, names, None),
            Err(RuntimeError::DuplicateAttribute { .. })
        ));
    }

    #[test]
    fn type_tags() {
        let mut rt = create_test_runtime();
        let list = rt.specials.list_class;
        rt.set_type_tag(list, 0xff).unwrap();
        assert_eq!(rt.class_data(list).unwrap().type_tag(), 0x7f);
        rt.set_type_tag(list, 19).unwrap();
        assert_eq!(rt.class_data(list).unwrap().type_tag(), 19);
    }
}
