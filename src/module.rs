//! Modules and the binder they configure.

use std::collections::BTreeMap;

use tracing::debug;

use crate::aop::{InterceptorBinding, Matcher};
use crate::binding::Binding;
use crate::definition::ParamValue;
use crate::error::DiResult;
use crate::key::{BindingKey, Name};
use crate::scope::Scope;

/// A unit of binding configuration.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Binder, DiResult, Module, Scope};
///
/// struct LogModule;
///
/// impl Module for LogModule {
///     fn configure(&self, binder: &mut Binder) -> DiResult<()> {
///         binder.bind("LogInterface").to("Log").in_scope(Scope::Singleton);
///         Ok(())
///     }
/// }
///
/// struct AppModule;
///
/// impl Module for AppModule {
///     fn configure(&self, binder: &mut Binder) -> DiResult<()> {
///         binder.bind("LogInterface").to("FileLog");
///         binder.install(&LogModule)?;
///         Ok(())
///     }
/// }
///
/// let mut binder = Binder::new();
/// AppModule.configure(&mut binder).unwrap();
/// // The installing module's binding wins
/// assert_eq!(binder.binding("LogInterface", None).unwrap().target,
///            anvil_di::Target::Class("FileLog".into()));
/// ```
pub trait Module {
    fn configure(&self, binder: &mut Binder) -> DiResult<()>;

    /// Stable name of the module, part of compiled graph cache keys.
    fn identity(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Collects bindings while modules are configured.
#[derive(Debug, Default, Clone)]
pub struct Binder {
    pub(crate) bindings: BTreeMap<BindingKey, Binding>,
    pub(crate) params: BTreeMap<(String, String), ParamValue>,
    pub(crate) setters: Vec<(String, String, BTreeMap<String, ParamValue>)>,
    pub(crate) interceptors: Vec<InterceptorBinding>,
    pub(crate) injections: Vec<String>,
    pub(crate) installed: Vec<String>,
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a binding for `type_name`; use `""` for scalar values.
    pub fn bind(&mut self, type_name: impl Into<String>) -> BindingBuilder<'_> {
        BindingBuilder {
            binder: self,
            key: BindingKey::of(type_name),
        }
    }

    /// Configures `module` into this binder.
    ///
    /// Bindings already present here take precedence over the installed
    /// module's bindings for the same key.
    pub fn install(&mut self, module: &dyn Module) -> DiResult<&mut Self> {
        let identity = module.identity();
        debug!(module = %identity, "installing module");
        let mut nested = Binder::new();
        module.configure(&mut nested)?;

        for (key, binding) in nested.bindings {
            self.bindings.entry(key).or_insert(binding);
        }
        for (slot, value) in nested.params {
            self.params.entry(slot).or_insert(value);
        }
        self.setters.extend(nested.setters);
        self.interceptors.extend(nested.interceptors);
        self.injections.extend(nested.injections);
        self.installed.extend(nested.installed);
        self.installed.push(identity);
        Ok(self)
    }

    /// Binds constructor parameter `param` of `class`.
    pub fn param(&mut self, class: impl Into<String>, param: impl Into<String>, value: ParamValue) -> &mut Self {
        self.params.insert((class.into(), param.into()), value);
        self
    }

    /// Calls `method` on every built `class` with the given parameter values.
    pub fn setter(
        &mut self,
        class: impl Into<String>,
        method: impl Into<String>,
        values: impl IntoIterator<Item = (String, ParamValue)>,
    ) -> &mut Self {
        self.setters
            .push((class.into(), method.into(), values.into_iter().collect()));
        self
    }

    /// Routes matching method calls through the named interceptor classes.
    pub fn bind_interceptor<I, S>(&mut self, class_matcher: Matcher, method_matcher: Matcher, interceptors: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interceptors.push(InterceptorBinding {
            class_matcher,
            method_matcher,
            interceptors: interceptors.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Marks a class to be built when the graph is compiled.
    pub fn request_injection(&mut self, class: impl Into<String>) -> &mut Self {
        self.injections.push(class.into());
        self
    }

    pub fn binding(&self, type_name: &str, qualifier: Option<&str>) -> Option<&Binding> {
        let key = BindingKey::named(type_name, qualifier.unwrap_or(Name::ANY));
        self.bindings.get(&key)
    }

    /// Identities of installed modules, innermost first.
    pub fn installed(&self) -> &[String] {
        &self.installed
    }

    fn put(&mut self, key: BindingKey, binding: Binding) {
        self.bindings.insert(key, binding);
    }
}

/// Binding in progress: `bind(..)[.annotated_with(..)].to*(..)`.
pub struct BindingBuilder<'a> {
    binder: &'a mut Binder,
    key: BindingKey,
}

impl<'a> BindingBuilder<'a> {
    /// Qualifies the binding.
    pub fn annotated_with(self, qualifier: impl Into<String>) -> Self {
        let key = BindingKey::named(self.key.type_name(), qualifier);
        Self { key, ..self }
    }

    pub fn to(self, class: impl Into<String>) -> ScopedBindingBuilder<'a> {
        self.finish(Binding::to_class(class))
    }

    pub fn to_provider(self, provider: impl Into<String>) -> ScopedBindingBuilder<'a> {
        self.finish(Binding::to_provider(provider))
    }

    pub fn to_instance(self, value: impl Into<serde_json::Value>) {
        self.binder.put(self.key, Binding::to_instance(value));
    }

    fn finish(self, binding: Binding) -> ScopedBindingBuilder<'a> {
        self.binder.put(self.key.clone(), binding);
        ScopedBindingBuilder {
            binder: self.binder,
            key: self.key,
        }
    }
}

/// Class or provider binding that may still receive a scope.
pub struct ScopedBindingBuilder<'a> {
    binder: &'a mut Binder,
    key: BindingKey,
}

impl ScopedBindingBuilder<'_> {
    pub fn in_scope(self, scope: Scope) {
        if let Some(binding) = self.binder.bindings.get_mut(&self.key) {
            binding.scope = Some(scope);
        }
    }
}
