//! Error types for the dependency injection engine.

use thiserror::Error;

/// Dependency injection errors
///
/// Every failure is deterministic for a given binding table: configuration
/// errors reproduce until the module is fixed, so nothing here is retried.
///
/// # Examples
///
/// ```rust
/// use anvil_di::DiError;
///
/// let unbound = DiError::Unbound {
///     key: "LogInterface-*".to_string(),
///     context: "dependency 'LogInterface' with name '*' used in Diary::new ($log)".to_string(),
/// };
/// assert!(unbound.to_string().contains("Diary::new"));
///
/// let circular = DiError::Circular(vec!["A-*".into(), "B-*".into(), "A-*".into()]);
/// assert_eq!(circular.to_string(), "Circular dependency: A-* -> B-* -> A-*");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiError {
    /// No binding and no default exists for a required argument
    #[error("Unbound {key}: {context}")]
    Unbound { key: String, context: String },
    /// A binding mutation was attempted after the container was locked
    #[error("Container is locked, cannot bind {0}")]
    ContainerLocked(String),
    /// A lifecycle annotation appears more than once in one class hierarchy
    #[error("@{annotation} declared more than once in {class}")]
    MultipleAnnotationNotAllowed { annotation: String, class: String },
    /// A qualifier annotation value could not be parsed
    #[error("Invalid @Named value '{0}'")]
    Named(String),
    /// Circular dependency detected (includes path)
    #[error("Circular dependency: {}", .0.join(" -> "))]
    Circular(Vec<String>),
    /// Maximum recursion depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),
    /// Class is not present in the registry
    #[error("Class not found: {0}")]
    NotFound(String),
    /// Abstract class or interface reached the forge without a binding
    #[error("Class {0} is abstract and cannot be instantiated")]
    NotInstantiable(String),
    /// Method is not declared on the class or any ancestor
    #[error("Method {class}::{method} not found")]
    MethodNotFound { class: String, method: String },
    /// Downcast to the requested Rust type failed
    #[error("Type mismatch for {name}: expected {expected}")]
    TypeMismatch { name: String, expected: String },
    /// A provider binding targets a class that is not registered as a provider
    #[error("Class {0} is not a provider")]
    NotProvider(String),
    /// An interceptor binding targets a class that is not registered as an interceptor
    #[error("Class {0} is not a method interceptor")]
    NotInterceptor(String),
    /// Compiled graph could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(String),
    /// Cache store failure
    #[error("Cache store failed: {0}")]
    Cache(String),
    /// Error raised by user module configuration or user code
    #[error("Module error: {0}")]
    Module(String),
}

impl From<serde_json::Error> for DiError {
    fn from(err: serde_json::Error) -> Self {
        DiError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DiError {
    fn from(err: std::io::Error) -> Self {
        DiError::Cache(err.to_string())
    }
}

/// Result type for DI operations
pub type DiResult<T> = Result<T, DiError>;
