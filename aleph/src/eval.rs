//! Evaluation hooks of the built-in callable and expression classes.
//!
//! Each class installs one of these behaviors; [`Runtime::eval`] and
//! [`Runtime::call`] only ever go through the behavior of the object's
//! class, so whether arguments get evaluated is up to the callee.

use log::debug;

use crate::{
    Behavior, Data, NativeFn, ObjectRef, Runtime, RuntimeError,
    RuntimeResult,
};

/// Symbols evaluate to their binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolBehavior;

impl Behavior for SymbolBehavior {
    fn name(&self) -> &'static str {
        "symbol"
    }

    fn copy(
        &self,
        _rt: &mut Runtime,
        object: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        Ok(object)
    }

    fn eval(
        &self,
        rt: &mut Runtime,
        object: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let symbol = rt.symbol_id(object)?;
        match rt.lookup(env, symbol)? {
            Some(value) => Ok(value),
            None => Err(RuntimeError::Undefined {
                name: rt.symbols.display_name(symbol),
            }),
        }
    }
}

/// Compound expressions: evaluate the head, then call it with the
/// unevaluated rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageBehavior;

impl Behavior for LanguageBehavior {
    fn name(&self) -> &'static str {
        "language"
    }

    fn eval(
        &self,
        rt: &mut Runtime,
        object: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let head = rt.get_attr(object, rt.sym.head)?;
        let head = head.unwrap_or(rt.specials.null);
        let function = rt.eval(head, env)?;
        let args = rt.get_attr(object, rt.sym.next)?;
        let args = args.unwrap_or(rt.specials.null);
        rt.call(function, args, env)
    }
}

/// Native functions that see their arguments evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBehavior;

impl Behavior for BuiltinBehavior {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn call(
        &self,
        rt: &mut Runtime,
        function: ObjectRef,
        args: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let native = rt.native_fn(function)?;
        let values = rt.eval_args(args, env)?;
        let evaluated = rt.list(&values)?;
        native(rt, evaluated, env)
    }
}

/// Native functions that receive their arguments unevaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialBehavior;

impl Behavior for SpecialBehavior {
    fn name(&self) -> &'static str {
        "special"
    }

    fn call(
        &self,
        rt: &mut Runtime,
        function: ObjectRef,
        args: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let native = rt.native_fn(function)?;
        native(rt, args, env)
    }
}

/// Generic functions: evaluate the arguments and dispatch on the class of
/// the first one.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericBehavior;

impl Behavior for GenericBehavior {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn call(
        &self,
        rt: &mut Runtime,
        function: ObjectRef,
        args: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let symbol = rt.symbol_id(function)?;
        let name = rt.symbols.display_name(symbol);
        let values = rt.eval_args(args, env)?;
        let method = rt.require_method(&name, &values)?;
        debug!("dispatch {name} -> {method:?}");
        let native = match rt.object(method)?.data {
            Data::Native(native) => native,
            _ => return Ok(method),
        };
        let evaluated = rt.list(&values)?;
        native(rt, evaluated, env)
    }
}

/// Method chains called directly evaluate to themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodBehavior;

impl Behavior for MethodBehavior {
    fn name(&self) -> &'static str {
        "method"
    }

    fn call(
        &self,
        _rt: &mut Runtime,
        function: ObjectRef,
        _args: ObjectRef,
        _env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        Ok(function)
    }
}

/// `name <- value`: binds the evaluated right-hand side in the calling
/// environment and returns it.
pub fn assign_special(
    rt: &mut Runtime,
    args: ObjectRef,
    env: ObjectRef,
) -> RuntimeResult<ObjectRef> {
    let operands = rt.list_to_vec(args)?;
    let [target, value] = operands[..] else {
        return Err(RuntimeError::invalid(format!(
            "'<-' takes 2 arguments, got {}",
            operands.len()
        )));
    };
    let symbol = rt.symbol_id(target)?;
    let value = rt.eval(value, env)?;
    rt.assign(env, symbol, value)?;
    Ok(value)
}

impl Runtime {
    pub fn native_fn(&self, function: ObjectRef) -> RuntimeResult<NativeFn> {
        match self.object(function)?.data {
            Data::Native(native) => Ok(native),
            _ => Err(RuntimeError::NotCallable {
                class: self.class_name(function),
            }),
        }
    }

    /// Evaluates every element of the argument list `args`.
    pub fn eval_args(
        &mut self,
        args: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<Vec<ObjectRef>> {
        let args = self.list_to_vec(args)?;
        args.into_iter().map(|arg| self.eval(arg, env)).collect()
    }

    /// Evaluates one top-level statement in its own pool. Anything the
    /// statement allocated and did not store is freed when it finishes,
    /// whether it succeeded or not.
    pub fn eval_toplevel(
        &mut self,
        expr: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        self.scope(|rt| rt.eval(expr, env))
    }
}
