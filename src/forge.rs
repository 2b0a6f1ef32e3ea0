//! Builds one instance of a class from its unified config.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::args::Args;
use crate::argument::Argument;
use crate::definition::{ParamValue, SetterSpec};
use crate::error::{DiError, DiResult};
use crate::injector::Injector;
use crate::internal::ResolutionStack;
use crate::key::BindingKey;
use crate::registration::Instance;

type Object = Box<dyn Any + Send + Sync>;

/// Constructs, setter-injects and initializes instances.
///
/// Every dependency goes back through the injector, so bindings, scopes
/// and the cycle guard apply all the way down.
pub(crate) struct Forge<'a> {
    injector: &'a Injector,
    stack: &'a ResolutionStack,
}

impl<'a> Forge<'a> {
    pub(crate) fn new(injector: &'a Injector, stack: &'a ResolutionStack) -> Self {
        Self { injector, stack }
    }

    pub(crate) fn build(&self, class_name: &str) -> DiResult<Instance> {
        let class = self.injector.registry().get(class_name)?;
        let constructor = match &class.constructor {
            Some(constructor) if !class.is_abstract() => constructor,
            _ => return Err(DiError::NotInstantiable(class_name.to_string())),
        };
        let unified = self.injector.config().fetch(class_name)?;

        let mut args = Args::new();
        for ((name, value), argument) in unified.params().iter().zip(unified.arguments()) {
            let resolved = match value {
                ParamValue::Literal(value) => Some(literal(value)),
                ParamValue::Ref(key) => Some(self.resolve_ref(key, argument)?),
                ParamValue::Default(_) | ParamValue::Unset => self.resolve_argument(argument)?,
            };
            args.push(name.clone(), resolved);
        }
        let mut object = (constructor.body)(&args)?;
        trace!(class = class_name, "constructed");

        let definition = unified.definition();
        for setter in definition.setter_injections().iter().chain(unified.setters()) {
            self.apply_setter(class_name, &mut object, setter)?;
        }
        if let Some(hook) = definition.post_construct() {
            trace!(class = class_name, hook, "post construct");
            self.invoke(class_name, hook, &mut object, &Args::new())?;
        }
        Ok(Arc::from(object))
    }

    /// Resolves an argument by identity, falling back to its type hint,
    /// declared default and nullability. `None` means absent.
    fn resolve_argument(&self, argument: &Argument) -> DiResult<Option<Instance>> {
        let key = argument.key();
        if let Ok(binding) = self.injector.binding_for(&key) {
            return self.injector.resolve_with(&key, binding, self.stack).map(Some);
        }
        if let Some(hint) = argument.hint() {
            let binding = Injector::hint_binding(hint);
            return self.injector.resolve_with(&key, binding, self.stack).map(Some);
        }
        let param = argument.parameter(self.injector.registry())?;
        if let Some(default) = argument.default_value() {
            return Ok(Some(literal(default)));
        }
        if param.is_optional() {
            return Ok(None);
        }
        Err(DiError::Unbound {
            key: argument.index().to_string(),
            context: argument.context().to_string(),
        })
    }

    /// Resolves a key bound explicitly to `argument`. When the key itself
    /// is unbound, the error names the parameter it was bound to.
    fn resolve_ref(&self, key: &BindingKey, argument: &Argument) -> DiResult<Instance> {
        self.injector.resolve(key, self.stack).map_err(|err| match err {
            DiError::Unbound { key: unbound, .. } if unbound == key.to_string() => DiError::Unbound {
                key: unbound,
                context: argument.context_for(key),
            },
            err => err,
        })
    }

    fn apply_setter(&self, class: &str, object: &mut Object, setter: &SetterSpec) -> DiResult<()> {
        let mut args = Args::new();
        for argument in setter.arguments() {
            let resolved = match setter.value(argument.name()) {
                Some(ParamValue::Literal(value)) => Some(literal(value)),
                Some(ParamValue::Ref(key)) => Some(self.resolve_ref(key, argument)?),
                _ => match self.resolve_argument(argument) {
                    Ok(resolved) => resolved,
                    Err(DiError::Unbound { key, .. }) if setter.is_optional() => {
                        trace!(class, setter = setter.method(), %key, "skipping optional setter");
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                },
            };
            args.push(argument.name(), resolved);
        }
        self.invoke(class, setter.method(), object, &args)
    }

    fn invoke(&self, class: &str, method: &str, object: &mut Object, args: &Args) -> DiResult<()> {
        let (declaring, index) = self.injector.registry().find_method(class, method)?;
        let body = declaring.methods[index]
            .body
            .clone()
            .ok_or_else(|| DiError::MethodNotFound {
                class: class.to_string(),
                method: method.to_string(),
            })?;
        body(object.as_mut(), args)
    }
}

fn literal(value: &Value) -> Instance {
    Arc::new(value.clone())
}
