use std::mem::size_of;

use log::trace;

use crate::{
    Data, Object, ObjectRef, Runtime, RuntimeError, RuntimeResult, Slot,
    SymbolId,
};

/// Name/value bindings of one environment, in insertion order.
///
/// The capacity is fixed at creation; a full environment refuses new
/// names instead of growing.
#[derive(Debug, Clone)]
pub struct Environment {
    names: Vec<SymbolId>,
    values: Vec<Option<ObjectRef>>,
    capacity: usize,
}

impl Environment {
    pub fn new(capacity: usize) -> Self {
        Self {
            names: Vec::new(),
            values: Vec::new(),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.names.len() >= self.capacity
    }

    pub fn names(&self) -> &[SymbolId] {
        &self.names
    }

    pub fn values(&self) -> &[Option<ObjectRef>] {
        &self.values
    }

    pub fn position(&self, name: SymbolId) -> Option<usize> {
        self.names.iter().position(|&n| n == name)
    }

    pub fn get(&self, name: SymbolId) -> Option<ObjectRef> {
        self.position(name).and_then(|i| self.values[i])
    }

    pub fn byte_size(&self) -> usize {
        self.names.len()
            * (size_of::<SymbolId>() + size_of::<Option<ObjectRef>>())
    }

    /// Appends an unbound name. `None` when the environment is full.
    pub(crate) fn push_name(&mut self, name: SymbolId) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.names.push(name);
        self.values.push(None);
        Some(self.names.len() - 1)
    }

    pub(crate) fn store_value(
        &mut self,
        index: usize,
        value: Option<ObjectRef>,
    ) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl Runtime {
    /// Allocates an empty environment whose `parent` attribute is
    /// `parent`.
    pub fn new_environment(
        &mut self,
        parent: Option<ObjectRef>,
    ) -> RuntimeResult<ObjectRef> {
        let class = self.specials.environment_class;
        let attrs = self.class_data(class)?.instance_attr_count();
        let capacity = self.settings().environment_capacity;
        let env = self.allocate(Object::new(
            class,
            attrs,
            Data::Environment(Environment::new(capacity)),
            0,
            crate::Ownership::Shared,
        ))?;
        if let Some(parent) = parent {
            let symbol = self.sym.parent;
            self.set_attr(env, symbol, Some(parent))?;
        }
        Ok(env)
    }

    pub fn environment(&self, env: ObjectRef) -> RuntimeResult<&Environment> {
        match &self.object(env)?.data {
            Data::Environment(environment) => Ok(environment),
            _ => Err(self.type_mismatch("environment", env)),
        }
    }

    fn environment_mut(
        &mut self,
        env: ObjectRef,
    ) -> RuntimeResult<&mut Environment> {
        if !matches!(self.object(env)?.data, Data::Environment(_)) {
            return Err(self.type_mismatch("environment", env));
        }
        match &mut self.object_mut(env)?.data {
            Data::Environment(environment) => Ok(environment),
            _ => Err(RuntimeError::DanglingReference(env)),
        }
    }

    /// Binds `name` to `value` in `env`, replacing an existing binding.
    ///
    /// A new name in a full environment is reported as a warning and
    /// dropped; the return value tells whether the binding happened.
    pub fn assign(
        &mut self,
        env: ObjectRef,
        name: SymbolId,
        value: ObjectRef,
    ) -> RuntimeResult<bool> {
        self.object(value)?;
        let index = match self.environment(env)?.position(name) {
            Some(index) => index,
            None => match self.environment_mut(env)?.push_name(name) {
                Some(index) => index,
                None => {
                    let capacity = self.environment(env)?.capacity();
                    let name = self.symbols.display_name(name);
                    self.warning(format!(
                        "environment {env} is full ({capacity} bindings), \
                         '{name}' not assigned"
                    ));
                    return Ok(false);
                }
            },
        };
        trace!("assign {name:?} in {env:?}");
        self.set(Slot::Binding { env, index }, Some(value))?;
        Ok(true)
    }

    /// Binding of `name` in `env` only.
    pub fn lookup_local(
        &self,
        env: ObjectRef,
        name: SymbolId,
    ) -> RuntimeResult<Option<ObjectRef>> {
        Ok(self.environment(env)?.get(name))
    }

    /// Binding of `name` in `env` or the nearest enclosing environment.
    pub fn lookup(
        &self,
        env: ObjectRef,
        name: SymbolId,
    ) -> RuntimeResult<Option<ObjectRef>> {
        let mut current = Some(env);
        while let Some(env) = current {
            if let Some(value) = self.lookup_local(env, name)? {
                return Ok(Some(value));
            }
            current = self.get_attr(env, self.sym.parent)?;
        }
        Ok(None)
    }
}
