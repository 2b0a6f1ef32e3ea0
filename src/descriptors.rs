//! Binding descriptors for introspection and diagnostics.

use serde::Serialize;

use crate::binding::{Binding, Target};
use crate::key::BindingKey;
use crate::scope::Scope;

/// Read-only view of one container binding.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Binder, ClassRegistry, Injector, Module, DiResult, Scope};
/// use std::sync::Arc;
///
/// struct AppModule;
/// impl Module for AppModule {
///     fn configure(&self, binder: &mut Binder) -> DiResult<()> {
///         binder.bind("LogInterface").to("Log").in_scope(Scope::Singleton);
///         binder.bind("").annotated_with("dsn").to_instance("sqlite::memory:");
///         Ok(())
///     }
/// }
///
/// let injector = Injector::builder(Arc::new(ClassRegistry::new())).module(&AppModule).build().unwrap();
/// let descriptors = injector.descriptors();
///
/// let log = descriptors.iter().find(|d| d.key.type_name() == "LogInterface").unwrap();
/// assert_eq!(log.target_kind, "class");
/// assert_eq!(log.target.as_deref(), Some("Log"));
/// assert_eq!(log.scope, Some(Scope::Singleton));
///
/// let dsn = descriptors.iter().find(|d| d.key.qualifier() == "dsn").unwrap();
/// assert_eq!(dsn.target_kind, "instance");
/// assert!(dsn.target.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingDescriptor {
    pub key: BindingKey,
    /// `class`, `provider` or `instance`
    pub target_kind: &'static str,
    /// Target class name; `None` for instance bindings
    pub target: Option<String>,
    pub scope: Option<Scope>,
}

impl BindingDescriptor {
    pub(crate) fn new(key: &BindingKey, binding: &Binding) -> Self {
        let (target_kind, target) = match &binding.target {
            Target::Class(class) => ("class", Some(class.clone())),
            Target::Provider(provider) => ("provider", Some(provider.clone())),
            Target::Instance(_) => ("instance", None),
        };
        Self {
            key: key.clone(),
            target_kind,
            target,
            scope: binding.scope,
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.key.is_qualified()
    }
}
