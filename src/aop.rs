//! Method interception seam.
//!
//! Weaving proper (generating proxies that route calls through interceptors)
//! belongs to a [`Weaver`]. The engine only collects interceptor bindings at
//! module configuration time, resolves the interceptor instances, and hands
//! the constructed object to the weaver. [`ProxyWeaver`] is the reference
//! weaver: it wraps the target in a [`Woven`] proxy whose
//! [`invoke`](Woven::invoke) runs the matching interceptor chain.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::Definition;
use crate::error::DiResult;
use crate::registration::{ClassRegistry, Instance};

/// Selects classes or methods for interception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Matcher {
    /// Matches everything
    Any,
    /// Classes that are, extend, or implement the named class
    SubclassesOf(String),
    /// Exact class or method name
    Named(String),
    /// Method names with the given prefix
    StartsWith(String),
    /// Classes or methods carrying the named user annotation
    AnnotatedWith(String),
}

impl Matcher {
    pub fn any() -> Self {
        Matcher::Any
    }

    pub fn subclasses_of(class: impl Into<String>) -> Self {
        Matcher::SubclassesOf(class.into())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Matcher::Named(name.into())
    }

    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Matcher::StartsWith(prefix.into())
    }

    pub fn annotated_with(annotation: impl Into<String>) -> Self {
        Matcher::AnnotatedWith(annotation.into())
    }

    /// Class-level match.
    pub fn matches_class(&self, registry: &ClassRegistry, class: &str, definition: &Definition) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::SubclassesOf(ancestor) => registry.is_subclass_of(class, ancestor),
            Matcher::Named(name) => name == class,
            Matcher::StartsWith(prefix) => class.starts_with(prefix.as_str()),
            Matcher::AnnotatedWith(annotation) => definition.has_class_annotation(annotation),
        }
    }

    /// Method-level match; `annotations` are the user annotation names on the method.
    pub fn matches_method(&self, method: &str, annotations: &[String]) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::SubclassesOf(_) => false,
            Matcher::Named(name) => name == method,
            Matcher::StartsWith(prefix) => method.starts_with(prefix.as_str()),
            Matcher::AnnotatedWith(annotation) => annotations.iter().any(|a| a == annotation),
        }
    }
}

/// Interceptors bound to a (class matcher, method matcher) pair.
///
/// Interceptors are named by class and built through the injector, so the
/// binding is plain data and survives compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptorBinding {
    pub class_matcher: Matcher,
    pub method_matcher: Matcher,
    pub interceptors: Vec<String>,
}

/// Around advice.
pub trait MethodInterceptor: Send + Sync {
    /// Runs the advice; call [`MethodInvocation::proceed`] to continue the chain.
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> DiResult<Value>;
}

/// Resolved interceptors for one method matcher, as handed to a [`Weaver`].
#[derive(Clone)]
pub struct BoundInterceptors {
    pub method_matcher: Matcher,
    pub interceptors: Vec<Arc<dyn MethodInterceptor>>,
}

impl std::fmt::Debug for BoundInterceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundInterceptors")
            .field("method_matcher", &self.method_matcher)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Target call at the end of an interceptor chain
pub type MethodCall<'a> = &'a dyn Fn(&Instance, &[Value]) -> DiResult<Value>;

/// One intercepted call travelling down the interceptor chain.
pub struct MethodInvocation<'a> {
    class: &'a str,
    method: &'a str,
    arguments: Vec<Value>,
    target: &'a Instance,
    chain: &'a [Arc<dyn MethodInterceptor>],
    call: MethodCall<'a>,
}

impl<'a> MethodInvocation<'a> {
    pub fn class(&self) -> &str {
        self.class
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn target(&self) -> &Instance {
        self.target
    }

    /// Runs the next interceptor, or the target method at the end of the chain.
    pub fn proceed(&self) -> DiResult<Value> {
        self.proceed_with(self.arguments.clone())
    }

    /// Like [`proceed`](Self::proceed) with replaced arguments.
    pub fn proceed_with(&self, arguments: Vec<Value>) -> DiResult<Value> {
        match self.chain.split_first() {
            Some((next, rest)) => next.invoke(&MethodInvocation {
                class: self.class,
                method: self.method,
                arguments,
                target: self.target,
                chain: rest,
                call: self.call,
            }),
            None => (self.call)(self.target, &arguments),
        }
    }
}

/// Turns a constructed instance into its intercepted form.
pub trait Weaver: Send + Sync {
    fn weave(
        &self,
        class: &str,
        definition: &Definition,
        instance: Instance,
        bound: Vec<BoundInterceptors>,
    ) -> DiResult<Instance>;
}

/// Weaver producing [`Woven`] proxies.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProxyWeaver;

impl Weaver for ProxyWeaver {
    fn weave(
        &self,
        class: &str,
        definition: &Definition,
        instance: Instance,
        bound: Vec<BoundInterceptors>,
    ) -> DiResult<Instance> {
        Ok(Arc::new(Woven {
            class: class.to_string(),
            target: instance,
            bound,
            method_annotations: definition.method_annotation_names(),
        }))
    }
}

/// Proxy around an intercepted instance.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{BoundInterceptors, Definition, DiResult, Matcher, MethodInterceptor,
///     MethodInvocation, ProxyWeaver, Weaver, Woven};
/// use serde_json::{json, Value};
/// use std::sync::Arc;
///
/// struct Prefix;
/// impl MethodInterceptor for Prefix {
///     fn invoke(&self, invocation: &MethodInvocation<'_>) -> DiResult<Value> {
///         let inner = invocation.proceed()?;
///         Ok(json!(format!("aop-{}", inner.as_str().unwrap_or_default())))
///     }
/// }
///
/// struct Echo;
/// let bound = vec![BoundInterceptors { method_matcher: Matcher::any(), interceptors: vec![Arc::new(Prefix)] }];
/// let proxy = ProxyWeaver.weave("Echo", &Definition::default(), Arc::new(Echo), bound).unwrap();
/// let woven = proxy.downcast_ref::<Woven>().unwrap();
///
/// let out = woven.invoke("echo", vec![json!("b")], &|_, args| Ok(args[0].clone())).unwrap();
/// assert_eq!(out, json!("aop-b"));
/// ```
pub struct Woven {
    class: String,
    target: Instance,
    bound: Vec<BoundInterceptors>,
    method_annotations: std::collections::BTreeMap<String, Vec<String>>,
}

impl Woven {
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The unwoven instance.
    pub fn target(&self) -> &Instance {
        &self.target
    }

    /// Interceptors that apply to `method`, in binding order.
    pub fn interceptors_for(&self, method: &str) -> Vec<Arc<dyn MethodInterceptor>> {
        let empty = Vec::new();
        let annotations = self.method_annotations.get(method).unwrap_or(&empty);
        self.bound
            .iter()
            .filter(|b| b.method_matcher.matches_method(method, annotations))
            .flat_map(|b| b.interceptors.iter().cloned())
            .collect()
    }

    /// Calls `method` through its interceptor chain; `call` performs the real call.
    pub fn invoke(&self, method: &str, arguments: Vec<Value>, call: MethodCall<'_>) -> DiResult<Value> {
        let chain = self.interceptors_for(method);
        let invocation = MethodInvocation {
            class: &self.class,
            method,
            arguments,
            target: &self.target,
            chain: &chain,
            call,
        };
        invocation.proceed()
    }
}

impl std::fmt::Debug for Woven {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Woven")
            .field("class", &self.class)
            .field("bound", &self.bound)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Record(Arc<Mutex<Vec<String>>>, &'static str);

    impl MethodInterceptor for Record {
        fn invoke(&self, invocation: &MethodInvocation<'_>) -> DiResult<Value> {
            self.0.lock().unwrap().push(format!("{}:{}", self.1, invocation.method()));
            invocation.proceed()
        }
    }

    #[test]
    fn test_chain_runs_in_binding_order_and_filters_methods() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bound = vec![
            BoundInterceptors {
                method_matcher: Matcher::starts_with("get"),
                interceptors: vec![Arc::new(Record(log.clone(), "first"))],
            },
            BoundInterceptors {
                method_matcher: Matcher::any(),
                interceptors: vec![Arc::new(Record(log.clone(), "second"))],
            },
        ];
        let woven = Woven {
            class: "Svc".into(),
            target: Arc::new(()),
            bound,
            method_annotations: Default::default(),
        };

        let result = woven.invoke("get_name", vec![], &|_, _| Ok(json!(1))).unwrap();
        assert_eq!(result, json!(1));
        woven.invoke("set_name", vec![], &|_, _| Ok(Value::Null)).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:get_name", "second:get_name", "second:set_name"]
        );
    }

    #[test]
    fn test_method_matcher_by_annotation() {
        let m = Matcher::annotated_with("Transactional");
        assert!(m.matches_method("save", &["Transactional".to_string()]));
        assert!(!m.matches_method("load", &[]));
        assert!(!Matcher::subclasses_of("X").matches_method("x", &[]));
    }
}
