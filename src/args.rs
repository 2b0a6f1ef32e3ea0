//! Resolved arguments handed to constructors and methods.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::aop::Woven;
use crate::error::{DiError, DiResult};
use crate::registration::Instance;

/// Arguments resolved by the forge, in parameter declaration order.
///
/// Constructor and method closures pull their dependencies out by parameter
/// name. Dependencies arrive as shared instances; literal values (bindings
/// to instances and declared defaults) arrive as `serde_json::Value`.
///
/// # Examples
///
/// ```rust
/// use anvil_di::Args;
/// use std::sync::Arc;
///
/// struct Log;
///
/// let mut args = Args::new();
/// args.push("log", Some(Arc::new(Log)));
/// args.push("dsn", Some(Arc::new(serde_json::json!("my dsn"))));
/// args.push("timeout", None);
///
/// assert!(args.get::<Log>("log").is_ok());
/// assert_eq!(args.string("dsn").unwrap(), "my dsn");
/// assert!(args.optional::<Log>("timeout").unwrap().is_none());
/// ```
#[derive(Default, Clone)]
pub struct Args {
    entries: Vec<(String, Option<Instance>)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument; `None` marks an absent optional argument.
    pub fn push(&mut self, name: impl Into<String>, value: Option<Instance>) {
        self.entries.push((name.into(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// True when the argument exists and was resolved.
    pub fn is_present(&self, name: &str) -> bool {
        matches!(self.slot(name), Some(Some(_)))
    }

    /// The type-erased instance bound to `name`.
    pub fn instance(&self, name: &str) -> DiResult<Instance> {
        match self.slot(name) {
            Some(Some(instance)) => Ok(instance.clone()),
            Some(None) => Err(DiError::Unbound {
                key: name.to_string(),
                context: format!("argument '{}' was not resolved", name),
            }),
            None => Err(DiError::Unbound {
                key: name.to_string(),
                context: format!("no argument named '{}'", name),
            }),
        }
    }

    /// The dependency bound to `name`, downcast to `T`.
    ///
    /// A woven proxy is seen through to its target.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> DiResult<Arc<T>> {
        let instance = self.instance(name)?;
        downcast::<T>(instance).ok_or_else(|| DiError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    /// Like [`get`](Self::get) but an absent optional argument yields `None`.
    pub fn optional<T: Any + Send + Sync>(&self, name: &str) -> DiResult<Option<Arc<T>>> {
        match self.slot(name) {
            Some(None) => Ok(None),
            _ => self.get::<T>(name).map(Some),
        }
    }

    /// A literal argument.
    pub fn value(&self, name: &str) -> DiResult<Arc<Value>> {
        self.get::<Value>(name)
    }

    /// A literal string argument.
    pub fn string(&self, name: &str) -> DiResult<String> {
        let value = self.value(name)?;
        value.as_str().map(str::to_string).ok_or_else(|| DiError::TypeMismatch {
            name: name.to_string(),
            expected: "string".to_string(),
        })
    }

    fn slot(&self, name: &str) -> Option<&Option<Instance>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, v)| (name, v.is_some())))
            .finish()
    }
}

/// Downcasts an instance to `T`, looking through a woven proxy.
pub fn downcast<T: Any + Send + Sync>(instance: Instance) -> Option<Arc<T>> {
    match instance.downcast::<T>() {
        Ok(typed) => Some(typed),
        Err(instance) => match instance.downcast_ref::<Woven>() {
            Some(woven) => woven.target().clone().downcast::<T>().ok(),
            None => None,
        },
    }
}
