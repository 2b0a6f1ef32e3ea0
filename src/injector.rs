//! The injector: binding lookup, scopes, providers and interception.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::annotation::AnnotationScanner;
use crate::aop::{BoundInterceptors, InterceptorBinding, MethodInterceptor, ProxyWeaver, Weaver};
use crate::args::downcast;
use crate::argument::DefaultHint;
use crate::binding::{Binding, Target};
use crate::config::Config;
use crate::container::Container;
use crate::definition::ParamValue;
use crate::descriptors::BindingDescriptor;
use crate::error::{DiError, DiResult};
use crate::forge::Forge;
use crate::internal::{DisposeBag, ResolutionStack};
use crate::key::{BindingKey, Name};
use crate::module::{Binder, Module};
use crate::options::InjectorOptions;
use crate::registration::{ClassRegistry, Instance};

/// Resolves object graphs from module bindings.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Args, Binder, Class, ClassRegistry, DiResult, Injector, Module, Param, Scope};
/// use std::sync::Arc;
///
/// struct Log;
/// struct Db { log: Arc<Log>, dsn: String }
///
/// let mut registry = ClassRegistry::new();
/// registry
///     .register(Class::interface("LogInterface"))
///     .register(Class::new("Log").implements("LogInterface").constructor([], |_| Ok(Log)))
///     .register(Class::new("Db").constructor(
///         [Param::typed("log", "LogInterface"), Param::new("dsn").default_value("sqlite")],
///         |args: &Args| Ok(Db { log: args.get::<Log>("log")?, dsn: args.string("dsn")? }),
///     ));
///
/// struct AppModule;
/// impl Module for AppModule {
///     fn configure(&self, binder: &mut Binder) -> DiResult<()> {
///         binder.bind("LogInterface").to("Log").in_scope(Scope::Singleton);
///         Ok(())
///     }
/// }
///
/// let injector = Injector::builder(Arc::new(registry)).module(&AppModule).build().unwrap();
/// let a = injector.get::<Db>("Db").unwrap();
/// let b = injector.get::<Db>("Db").unwrap();
/// assert!(!Arc::ptr_eq(&a, &b));
/// assert!(Arc::ptr_eq(&a.log, &b.log));
/// assert_eq!(a.dsn, "sqlite");
/// ```
pub struct Injector {
    registry: Arc<ClassRegistry>,
    config: Arc<Config>,
    container: Arc<Container>,
    interceptors: Vec<InterceptorBinding>,
    weaver: Arc<dyn Weaver>,
    options: InjectorOptions,
    module: String,
    injections: Vec<String>,
    destroy: Mutex<DisposeBag>,
}

impl Injector {
    pub fn builder<'m>(registry: Arc<ClassRegistry>) -> InjectorBuilder<'m> {
        InjectorBuilder::new(registry)
    }

    /// Resolves `type_name` under `qualifier` (unqualified when `None`).
    pub fn get_instance(&self, type_name: &str, qualifier: Option<&str>) -> DiResult<Instance> {
        let key = BindingKey::named(type_name, qualifier.unwrap_or(Name::ANY));
        let stack = ResolutionStack::new(self.options.max_depth);
        self.resolve(&key, &stack)
    }

    /// Resolves and downcasts; woven proxies are seen through.
    pub fn get<T: Any + Send + Sync>(&self, type_name: &str) -> DiResult<Arc<T>> {
        self.get_named::<T>(type_name, Name::ANY)
    }

    pub fn get_named<T: Any + Send + Sync>(&self, type_name: &str, qualifier: &str) -> DiResult<Arc<T>> {
        let instance = self.get_instance(type_name, Some(qualifier))?;
        downcast::<T>(instance).ok_or_else(|| DiError::TypeMismatch {
            name: BindingKey::named(type_name, qualifier).to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    /// Builds a concrete class that has no binding of its own.
    pub fn request_injection(&self, class: &str) -> DiResult<Instance> {
        let stack = ResolutionStack::new(self.options.max_depth);
        let _guard = stack.enter(&BindingKey::of(class))?;
        let instance = Forge::new(self, &stack).build(class)?;
        self.weave(class, instance, &stack)
    }

    /// Adds a binding; fails once locked.
    pub fn bind(&self, key: BindingKey, binding: Binding) -> DiResult<()> {
        self.container.bind(key, binding)
    }

    /// Binds a constructor parameter; fails once locked.
    pub fn set_param(&self, class: &str, param: &str, value: ParamValue) -> DiResult<()> {
        self.config.set_param(class, param, value)
    }

    /// Adds an explicit setter call; fails once locked.
    pub fn add_setter(&self, class: &str, method: &str, values: BTreeMap<String, ParamValue>) -> DiResult<()> {
        self.config.add_setter(class, method, values)
    }

    /// Freezes bindings, parameters and setters.
    pub fn lock(&self) {
        debug!(module = %self.module, "container locked");
        self.container.lock();
        self.config.lock();
    }

    pub fn is_locked(&self) -> bool {
        self.container.is_locked()
    }

    /// Runs pre-destroy hooks of cached singletons, newest first, and empties the cache.
    ///
    /// Every hook runs; the first failure is returned.
    pub fn shutdown(&self) -> DiResult<()> {
        let mut bag = std::mem::take(&mut *self.destroy.lock());
        debug!(hooks = bag.len(), "shutting down");
        let failures = bag.run_all_reverse();
        self.container.clear_singletons();
        for (label, err) in &failures {
            warn!(hook = %label, error = %err, "pre-destroy hook failed");
        }
        match failures.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    pub fn descriptors(&self) -> Vec<BindingDescriptor> {
        self.container.descriptors()
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn options(&self) -> &InjectorOptions {
        &self.options
    }

    /// Identity of the configured modules.
    pub fn module_identity(&self) -> &str {
        &self.module
    }

    pub fn interceptor_bindings(&self) -> &[InterceptorBinding] {
        &self.interceptors
    }

    /// Classes requested with [`Binder::request_injection`].
    pub fn injections(&self) -> &[String] {
        &self.injections
    }

    /// Binding for `key`: explicit, else the type's declared default
    /// implementation or provider, else the concrete class itself.
    pub(crate) fn binding_for(&self, key: &BindingKey) -> DiResult<Binding> {
        if let Some(binding) = self.container.binding(key) {
            return Ok(binding);
        }
        if !key.is_scalar() && !key.is_qualified() {
            if let Some(hint) = self.config.builder().hint_for(key.type_name()) {
                return Ok(Self::hint_binding(&hint));
            }
        }
        Err(DiError::Unbound {
            key: key.to_string(),
            context: format!("no binding for '{}' named '{}'", key.type_name(), key.qualifier()),
        })
    }

    pub(crate) fn hint_binding(hint: &DefaultHint) -> Binding {
        match hint {
            DefaultHint::ImplementedBy(class) => Binding::to_class(class.clone()),
            DefaultHint::ProvidedBy(provider) => Binding::to_provider(provider.clone()),
        }
    }

    pub(crate) fn resolve(&self, key: &BindingKey, stack: &ResolutionStack) -> DiResult<Instance> {
        let binding = self.binding_for(key)?;
        self.resolve_with(key, binding, stack)
    }

    pub(crate) fn resolve_with(&self, key: &BindingKey, binding: Binding, stack: &ResolutionStack) -> DiResult<Instance> {
        let _guard = stack.enter(key)?;
        trace!(key = %key, depth = stack.depth(), "resolving");

        let (instance, created) = match &binding.target {
            Target::Instance(value) => return Ok(Arc::new(value.clone())),
            Target::Provider(provider) => {
                let scope = binding.scope.unwrap_or_default();
                self.container.get_or_create(key, scope, || self.provide(provider, stack))?
            }
            Target::Class(class) => {
                let scope = match binding.scope {
                    Some(scope) => scope,
                    None => self.config.fetch(class)?.definition().scope().unwrap_or_default(),
                };
                let (instance, created) = self.container.get_or_create(key, scope, || {
                    let instance = Forge::new(self, stack).build(class)?;
                    self.weave(class, instance, stack)
                })?;
                if created {
                    self.track_destroy(key, class, &instance)?;
                }
                (instance, created)
            }
        };
        if created {
            self.container.record_origin(key, &binding);
        }
        Ok(instance)
    }

    fn provide(&self, provider_class: &str, stack: &ResolutionStack) -> DiResult<Instance> {
        let instance = self.resolve(&BindingKey::of(provider_class), stack)?;
        let cast = self
            .registry
            .get(provider_class)?
            .provider_cast
            .clone()
            .ok_or_else(|| DiError::NotProvider(provider_class.to_string()))?;
        let provider = cast(instance).ok_or_else(|| DiError::NotProvider(provider_class.to_string()))?;
        trace!(provider = provider_class, "calling provider");
        provider.get()
    }

    fn interceptor(&self, class: &str, stack: &ResolutionStack) -> DiResult<Arc<dyn MethodInterceptor>> {
        let instance = self.resolve(&BindingKey::of(class), stack)?;
        let cast = self
            .registry
            .get(class)?
            .interceptor_cast
            .clone()
            .ok_or_else(|| DiError::NotInterceptor(class.to_string()))?;
        cast(instance).ok_or_else(|| DiError::NotInterceptor(class.to_string()))
    }

    /// Hands the instance to the weaver when interceptor bindings match its class.
    fn weave(&self, class: &str, instance: Instance, stack: &ResolutionStack) -> DiResult<Instance> {
        if self.interceptors.is_empty() || self.registry.get(class)?.interceptor_cast.is_some() {
            return Ok(instance);
        }
        let unified = self.config.fetch(class)?;
        let definition = unified.definition();

        let mut bound = Vec::new();
        for binding in &self.interceptors {
            if !binding.class_matcher.matches_class(&self.registry, class, definition) {
                continue;
            }
            let interceptors = binding
                .interceptors
                .iter()
                .map(|name| self.interceptor(name, stack))
                .collect::<DiResult<Vec<_>>>()?;
            bound.push(BoundInterceptors {
                method_matcher: binding.method_matcher.clone(),
                interceptors,
            });
        }
        if bound.is_empty() {
            return Ok(instance);
        }
        debug!(class, bindings = bound.len(), "weaving interceptors");
        self.weaver.weave(class, definition, instance, bound)
    }

    fn track_destroy(&self, key: &BindingKey, class: &str, instance: &Instance) -> DiResult<()> {
        let definition = self.config.fetch(class)?.definition().clone();
        let Some(hook) = definition.pre_destroy() else {
            return Ok(());
        };
        let (declaring, index) = self.registry.find_method(class, hook)?;
        let shared = declaring.methods[index]
            .shared
            .clone()
            .ok_or_else(|| DiError::MethodNotFound {
                class: class.to_string(),
                method: hook.to_string(),
            })?;
        let instance = instance.clone();
        self.destroy
            .lock()
            .push(format!("{}::{} ({})", class, hook, key), Box::new(move || shared(&instance)));
        Ok(())
    }

    /// Assembles an injector around existing parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        registry: Arc<ClassRegistry>,
        config: Arc<Config>,
        container: Arc<Container>,
        interceptors: Vec<InterceptorBinding>,
        weaver: Arc<dyn Weaver>,
        options: InjectorOptions,
        module: String,
        injections: Vec<String>,
    ) -> Self {
        Self {
            registry,
            config,
            container,
            interceptors,
            weaver,
            options,
            module,
            injections,
            destroy: Mutex::new(DisposeBag::default()),
        }
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("module", &self.module)
            .field("container", &self.container)
            .field("config", &self.config)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Configures and builds an [`Injector`].
pub struct InjectorBuilder<'m> {
    registry: Arc<ClassRegistry>,
    scanner: Option<Arc<dyn AnnotationScanner>>,
    weaver: Option<Arc<dyn Weaver>>,
    options: InjectorOptions,
    modules: Vec<&'m dyn Module>,
}

impl<'m> InjectorBuilder<'m> {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            scanner: None,
            weaver: None,
            options: InjectorOptions::default(),
            modules: Vec::new(),
        }
    }

    /// Annotation source; defaults to the registry's own annotations.
    pub fn scanner(mut self, scanner: Arc<dyn AnnotationScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Interception weaver; defaults to [`ProxyWeaver`].
    pub fn weaver(mut self, weaver: Arc<dyn Weaver>) -> Self {
        self.weaver = Some(weaver);
        self
    }

    pub fn options(mut self, options: InjectorOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds a module; later modules override earlier bindings for the same key.
    pub fn module(mut self, module: &'m dyn Module) -> Self {
        self.modules.push(module);
        self
    }

    pub fn build(self) -> DiResult<Injector> {
        let mut binder = Binder::new();
        for module in &self.modules {
            module.configure(&mut binder)?;
        }
        let identity = self
            .modules
            .iter()
            .map(|m| m.identity())
            .collect::<Vec<_>>()
            .join("+");
        let (registry, injector) = self.assemble(identity, binder.interceptors.clone(), binder.injections.clone());
        debug!(
            module = %injector.module,
            bindings = binder.bindings.len(),
            classes = registry.len(),
            "configuring injector"
        );

        injector.container.bind_all(binder.bindings)?;
        for ((class, param), value) in binder.params {
            injector.config.set_param(&class, &param, value)?;
        }
        for (class, method, values) in binder.setters {
            injector.config.add_setter(&class, &method, values)?;
        }
        Ok(injector)
    }

    /// Injector with empty bindings, for rehydrating a compiled graph.
    pub(crate) fn assemble(
        self,
        module: String,
        interceptors: Vec<InterceptorBinding>,
        injections: Vec<String>,
    ) -> (Arc<ClassRegistry>, Injector) {
        let scanner = self
            .scanner
            .unwrap_or_else(|| self.registry.clone() as Arc<dyn AnnotationScanner>);
        let container = Arc::new(Container::new());
        let config = Arc::new(Config::new(self.registry.clone(), scanner).with_lock(container.lock_flag()));
        let weaver = self
            .weaver
            .unwrap_or_else(|| Arc::new(ProxyWeaver) as Arc<dyn Weaver>);
        let injector = Injector::from_parts(
            self.registry.clone(),
            config,
            container,
            interceptors,
            weaver,
            self.options,
            module,
            injections,
        );
        (self.registry, injector)
    }
}

impl std::fmt::Debug for InjectorBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectorBuilder")
            .field("modules", &self.modules.len())
            .field("options", &self.options)
            .finish()
    }
}
