use crate::{Data, ObjectRef, Runtime, RuntimeError, RuntimeResult};

/// Per-class capability table.
///
/// Every class carries one behavior; subclasses start out sharing their
/// parent's and may install their own with [`Runtime::set_behavior`].
/// Evaluation never looks at the object's payload kind directly: it always
/// goes through the behavior of the object's class.
pub trait Behavior {
    /// Short name used in debug output.
    fn name(&self) -> &'static str;

    /// Shallow duplicate of `object`, allocated in the current pool.
    fn copy(
        &self,
        rt: &mut Runtime,
        object: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        rt.shallow_copy(object)
    }

    /// Borrow of the trailing data.
    fn data<'rt>(
        &self,
        rt: &'rt Runtime,
        object: ObjectRef,
    ) -> RuntimeResult<&'rt Data> {
        Ok(&rt.object(object)?.data)
    }

    fn length(&self, rt: &Runtime, object: ObjectRef) -> RuntimeResult<usize> {
        Ok(rt.object(object)?.len)
    }

    /// Self-evaluating by default.
    fn eval(
        &self,
        _rt: &mut Runtime,
        object: ObjectRef,
        _env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        Ok(object)
    }

    fn call(
        &self,
        rt: &mut Runtime,
        function: ObjectRef,
        _args: ObjectRef,
        _env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        Err(RuntimeError::NotCallable {
            class: rt.class_name(function),
        })
    }
}

/// Plain data objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBehavior;

impl Behavior for DefaultBehavior {
    fn name(&self) -> &'static str {
        "default"
    }
}

/// Identity objects (null, classes, symbols): copying returns the object
/// itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCopyBehavior;

impl Behavior for NoCopyBehavior {
    fn name(&self) -> &'static str {
        "no-copy"
    }

    fn copy(
        &self,
        _rt: &mut Runtime,
        object: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        Ok(object)
    }
}

// ── Runtime entry points ──────────────────────────────────────────────

impl Runtime {
    pub fn copy(&mut self, object: ObjectRef) -> RuntimeResult<ObjectRef> {
        let behavior = self.behavior_of(object)?;
        behavior.copy(self, object)
    }

    pub fn length(&self, object: ObjectRef) -> RuntimeResult<usize> {
        self.behavior_of(object)?.length(self, object)
    }

    pub fn data(&self, object: ObjectRef) -> RuntimeResult<&Data> {
        let behavior = self.behavior_of(object)?;
        behavior.data(self, object)
    }

    pub fn eval(
        &mut self,
        object: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let behavior = self.behavior_of(object)?;
        behavior.eval(self, object, env)
    }

    pub fn call(
        &mut self,
        function: ObjectRef,
        args: ObjectRef,
        env: ObjectRef,
    ) -> RuntimeResult<ObjectRef> {
        let behavior = self.behavior_of(function)?;
        behavior.call(self, function, args, env)
    }
}

#[cfg(test)]
mod tests {
    use crate::{RuntimeError, create_test_runtime};

    #[test]
    fn data_objects_evaluate_to_themselves() {
        let mut rt = create_test_runtime();
        let value = rt.scalar_real(1.5).unwrap();
        let env = rt.specials.global_env;
        assert_eq!(rt.eval(value, env).unwrap(), value);
        assert_eq!(rt.length(value).unwrap(), 1);
    }

    #[test]
    fn copies_are_distinct_except_for_identity_objects() {
        let mut rt = create_test_runtime();
        let value = rt.alloc_real_vector(3).unwrap();
        let copy = rt.copy(value).unwrap();
        assert_ne!(copy, value);
        assert_eq!(rt.reals(copy).unwrap(), rt.reals(value).unwrap());

        let null = rt.specials.null;
        assert_eq!(rt.copy(null).unwrap(), null);
        let real = rt.specials.real_class;
        assert_eq!(rt.copy(real).unwrap(), real);
    }

    #[test]
    fn data_objects_are_not_callable() {
        let mut rt = create_test_runtime();
        let value = rt.scalar_integer(3).unwrap();
        let null = rt.specials.null;
        let env = rt.specials.global_env;
        assert!(matches!(
            rt.call(value, null, env),
            Err(RuntimeError::NotCallable { .. })
        ));
    }
}
