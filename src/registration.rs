//! Class registry: the closed set of types the engine can reason about.
//!
//! Rust has no runtime reflection, so every class the engine may construct
//! is described up front: its place in the hierarchy, its constructor and
//! method parameters, and closures that build the instance and invoke its
//! methods. Annotations attached here are served back through
//! [`AnnotationScanner`].

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::{AnnotationScanner, AnnotationValue};
use crate::aop::MethodInterceptor;
use crate::args::Args;
use crate::error::{DiError, DiResult};
use crate::provider::Provider;

/// Type-erased shared instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Builds an instance from resolved constructor arguments
pub(crate) type ConstructorFn =
    Arc<dyn Fn(&Args) -> DiResult<Box<dyn Any + Send + Sync>> + Send + Sync>;
/// Invokes a method on an instance under construction
pub(crate) type MethodFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), &Args) -> DiResult<()> + Send + Sync>;
/// Invokes a method on a shared instance (pre-destroy hooks)
pub(crate) type SharedMethodFn = Arc<dyn Fn(&Instance) -> DiResult<()> + Send + Sync>;
pub(crate) type ProviderCast = Arc<dyn Fn(Instance) -> Option<Arc<dyn Provider>> + Send + Sync>;
pub(crate) type InterceptorCast =
    Arc<dyn Fn(Instance) -> Option<Arc<dyn MethodInterceptor>> + Send + Sync>;

/// Method name under which constructor annotations are recorded
pub const CONSTRUCTOR: &str = "new";

/// A declared constructor or method parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    name: String,
    type_name: Option<String>,
    default: Option<Value>,
    optional: bool,
}

impl Param {
    /// Untyped (scalar) parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            default: None,
            optional: false,
        }
    }

    /// Parameter whose declared type is a registered class or interface.
    pub fn typed(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let mut param = Self::new(name);
        param.type_name = Some(type_name.into());
        param
    }

    /// Declares a default value; the parameter becomes optional.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.optional = true;
        self
    }

    /// Declares the parameter nullable: unresolved means absent.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

pub(crate) struct Constructor {
    pub(crate) params: Vec<Arc<Param>>,
    pub(crate) body: ConstructorFn,
}

pub(crate) struct Method {
    pub(crate) name: String,
    pub(crate) params: Vec<Arc<Param>>,
    pub(crate) body: Option<MethodFn>,
    pub(crate) shared: Option<SharedMethodFn>,
}

/// Description of one class.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Class, Param, AnnotationValue};
///
/// struct Db { dsn: String, ready: bool }
///
/// let db = Class::new("Db")
///     .implements("DbInterface")
///     .constructor([Param::new("dsn")], |args| {
///         Ok(Db { dsn: args.string("dsn")?, ready: false })
///     })
///     .method("init", [], |db: &mut Db, _| {
///         db.ready = true;
///         Ok(())
///     })
///     .annotate_method("init", AnnotationValue::new("PostConstruct"));
///
/// assert_eq!(db.name(), "Db");
/// assert_eq!(db.constructor_params().len(), 1);
/// ```
pub struct Class {
    name: String,
    parent: Option<String>,
    interfaces: Vec<String>,
    is_abstract: bool,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) methods: Vec<Method>,
    class_annotations: Vec<AnnotationValue>,
    method_annotations: BTreeMap<String, Vec<AnnotationValue>>,
    pub(crate) provider_cast: Option<ProviderCast>,
    pub(crate) interceptor_cast: Option<InterceptorCast>,
}

impl Class {
    /// A concrete class.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            interfaces: Vec::new(),
            is_abstract: false,
            constructor: None,
            methods: Vec::new(),
            class_annotations: Vec::new(),
            method_annotations: BTreeMap::new(),
            provider_cast: None,
            interceptor_cast: None,
        }
    }

    /// An interface: abstract, never instantiated directly.
    pub fn interface(name: impl Into<String>) -> Self {
        let mut class = Self::new(name);
        class.is_abstract = true;
        class
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Declares the constructor.
    pub fn constructor<T, F>(mut self, params: impl IntoIterator<Item = Param>, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Args) -> DiResult<T> + Send + Sync + 'static,
    {
        let body: ConstructorFn = Arc::new(move |args: &Args| {
            f(args).map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)
        });
        self.constructor = Some(Constructor {
            params: params.into_iter().map(Arc::new).collect(),
            body,
        });
        self
    }

    /// Declares a parameterless constructor backed by `Default`.
    pub fn default_constructor<T>(self) -> Self
    where
        T: Any + Send + Sync + Default,
    {
        self.constructor(Vec::new(), |_| Ok(T::default()))
    }

    /// Declares a method invoked with mutable access during construction
    /// (setters, post-construct hooks).
    pub fn method<T, F>(mut self, name: impl Into<String>, params: impl IntoIterator<Item = Param>, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut T, &Args) -> DiResult<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let class = self.name.clone();
        let method = name.clone();
        let body: MethodFn = Arc::new(move |target: &mut (dyn Any + Send + Sync), args: &Args| {
            let typed = target.downcast_mut::<T>().ok_or_else(|| DiError::TypeMismatch {
                name: format!("{}::{}", class, method),
                expected: std::any::type_name::<T>().to_string(),
            })?;
            f(typed, args)
        });
        self.upsert_method(name, params.into_iter().map(Arc::new).collect(), Some(body), None);
        self
    }

    /// Declares a method invoked on the shared instance after construction
    /// (pre-destroy hooks).
    pub fn shared_method<T, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> DiResult<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let class = self.name.clone();
        let method = name.clone();
        let shared: SharedMethodFn = Arc::new(move |instance: &Instance| {
            let typed = crate::args::downcast::<T>(instance.clone()).ok_or_else(|| DiError::TypeMismatch {
                name: format!("{}::{}", class, method),
                expected: std::any::type_name::<T>().to_string(),
            })?;
            f(&typed)
        });
        self.upsert_method(name, Vec::new(), None, Some(shared));
        self
    }

    /// Attaches a class-level annotation.
    pub fn annotate(mut self, annotation: AnnotationValue) -> Self {
        self.class_annotations.push(annotation);
        self
    }

    /// Attaches an annotation to a method; use [`CONSTRUCTOR`] for the constructor.
    pub fn annotate_method(mut self, method: impl Into<String>, annotation: AnnotationValue) -> Self {
        self.method_annotations.entry(method.into()).or_default().push(annotation);
        self
    }

    /// Registers the class as a provider so provider bindings can target it.
    pub fn provider<T: Provider + 'static>(mut self) -> Self {
        self.provider_cast = Some(Arc::new(|instance: Instance| {
            crate::args::downcast::<T>(instance).map(|p| p as Arc<dyn Provider>)
        }));
        self
    }

    /// Registers the class as a method interceptor.
    pub fn interceptor<T: MethodInterceptor + 'static>(mut self) -> Self {
        self.interceptor_cast = Some(Arc::new(|instance: Instance| {
            crate::args::downcast::<T>(instance).map(|i| i as Arc<dyn MethodInterceptor>)
        }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Concrete and constructible.
    pub fn is_instantiable(&self) -> bool {
        !self.is_abstract && self.constructor.is_some()
    }

    /// Constructor parameters, empty without a declared constructor.
    pub fn constructor_params(&self) -> Vec<Arc<Param>> {
        self.constructor.as_ref().map(|c| c.params.clone()).unwrap_or_default()
    }

    /// Names of methods declared on this class (not ancestors), constructor first.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.methods.len() + 1);
        if self.constructor.is_some() {
            names.push(CONSTRUCTOR);
        }
        names.extend(self.methods.iter().map(|m| m.name.as_str()));
        names
    }

    pub(crate) fn method_params(&self, method: &str) -> Option<Vec<Arc<Param>>> {
        if method == CONSTRUCTOR {
            return self.constructor.as_ref().map(|c| c.params.clone());
        }
        self.methods.iter().find(|m| m.name == method).map(|m| m.params.clone())
    }

    fn upsert_method(
        &mut self,
        name: String,
        params: Vec<Arc<Param>>,
        body: Option<MethodFn>,
        shared: Option<SharedMethodFn>,
    ) {
        match self.methods.iter_mut().find(|m| m.name == name) {
            Some(existing) => {
                if body.is_some() {
                    existing.params = params;
                    existing.body = body;
                }
                if shared.is_some() {
                    existing.shared = shared;
                }
            }
            None => self.methods.push(Method { name, params, body, shared }),
        }
    }
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("interfaces", &self.interfaces)
            .field("is_abstract", &self.is_abstract)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Registry of all known classes, keyed by name.
///
/// Registering a class twice replaces the earlier description.
#[derive(Default)]
pub struct ClassRegistry {
    classes: HashMap<String, Arc<Class>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: Class) -> &mut Self {
        self.classes.insert(class.name.clone(), Arc::new(class));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> DiResult<Arc<Class>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| DiError::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The class followed by its ancestors, nearest first.
    pub fn lineage(&self, name: &str) -> DiResult<Vec<Arc<Class>>> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(class_name) = current {
            let class = self.get(&class_name)?;
            if chain.iter().any(|c: &Arc<Class>| c.name == class.name) {
                return Err(DiError::Circular(
                    chain.iter().map(|c| c.name.clone()).chain([class.name.clone()]).collect(),
                ));
            }
            current = class.parent.clone();
            chain.push(class);
        }
        Ok(chain)
    }

    /// True when `name` is `ancestor`, extends it, or implements it (transitively).
    pub fn is_subclass_of(&self, name: &str, ancestor: &str) -> bool {
        if name == ancestor {
            return true;
        }
        let Some(class) = self.classes.get(name) else {
            return false;
        };
        class.parent.as_deref().is_some_and(|p| self.is_subclass_of(p, ancestor))
            || class.interfaces.iter().any(|i| self.is_subclass_of(i, ancestor))
    }

    /// Nearest declaration of `method` walking up from `class`.
    pub(crate) fn find_method(&self, class: &str, method: &str) -> DiResult<(Arc<Class>, usize)> {
        for declaring in self.lineage(class)? {
            if let Some(index) = declaring.methods.iter().position(|m| m.name == method) {
                return Ok((declaring, index));
            }
        }
        Err(DiError::MethodNotFound {
            class: class.to_string(),
            method: method.to_string(),
        })
    }

    /// Parameters of `method` as declared on `class` or its nearest ancestor.
    pub(crate) fn method_params(&self, class: &str, method: &str) -> DiResult<Vec<Arc<Param>>> {
        if method == CONSTRUCTOR {
            return Ok(self.get(class)?.constructor_params());
        }
        let (declaring, index) = self.find_method(class, method)?;
        Ok(declaring.methods[index].params.clone())
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.classes.keys().collect();
        names.sort();
        f.debug_struct("ClassRegistry").field("classes", &names).finish()
    }
}

impl AnnotationScanner for ClassRegistry {
    fn class_annotations(&self, type_name: &str) -> Vec<AnnotationValue> {
        self.classes
            .get(type_name)
            .map(|c| c.class_annotations.clone())
            .unwrap_or_default()
    }

    fn method_annotations(&self, type_name: &str, method: &str) -> Vec<AnnotationValue> {
        self.classes
            .get(type_name)
            .and_then(|c| c.method_annotations.get(method).cloned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Engine;

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry
            .register(Class::interface("Vehicle"))
            .register(Class::new("Car").implements("Vehicle").default_constructor::<Engine>()
                .method("start", [], |_: &mut Engine, _| Ok(())))
            .register(Class::new("SportsCar").extends("Car").default_constructor::<Engine>());
        registry
    }

    #[test]
    fn test_lineage_and_subclass() {
        let registry = registry();
        let lineage: Vec<_> = registry.lineage("SportsCar").unwrap().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(lineage, vec!["SportsCar", "Car"]);
        assert!(registry.is_subclass_of("SportsCar", "Vehicle"));
        assert!(!registry.is_subclass_of("Car", "SportsCar"));
        assert!(matches!(registry.lineage("Nope"), Err(DiError::NotFound(_))));
    }

    #[test]
    fn test_method_lookup_walks_ancestors() {
        let registry = registry();
        let (declaring, _) = registry.find_method("SportsCar", "start").unwrap();
        assert_eq!(declaring.name(), "Car");
        assert!(matches!(
            registry.find_method("SportsCar", "stop"),
            Err(DiError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn test_interface_is_not_instantiable() {
        let registry = registry();
        assert!(!registry.get("Vehicle").unwrap().is_instantiable());
        assert!(registry.get("Car").unwrap().is_instantiable());
        assert_eq!(registry.get("Car").unwrap().method_names(), vec![CONSTRUCTOR, "start"]);
    }

    #[test]
    fn test_param_builders() {
        let p = Param::typed("log", "LogInterface").default_value("x");
        assert_eq!(p.type_name(), Some("LogInterface"));
        assert!(p.is_optional());
        assert_eq!(p.default(), Some(&Value::from("x")));
        assert!(Param::new("n").optional().default().is_none());
    }
}
