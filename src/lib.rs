//! # anvil-di
//!
//! Binding-driven dependency injection with inheritance-aware configuration
//! and ahead-of-time compiled object graphs.
//!
//! ## Features
//!
//! - **Bindings by type and qualifier**: classes, providers and literal values
//! - **Inheritance-aware unification**: parameter bindings, setters and lifecycle
//!   hooks flow down class hierarchies
//! - **Annotation driven**: setter injection, qualifiers, post-construct and
//!   pre-destroy hooks, class scopes and default implementations
//! - **Scopes**: singleton and prototype
//! - **Circular dependency detection** with the full key path
//! - **Interception** through a pluggable weaver
//! - **Compiled graphs**: serialize a resolved graph and reload it without
//!   running modules or scanning annotations
//!
//! ## Quick Start
//!
//! Classes are registered once in a [`ClassRegistry`]; modules bind abstract
//! types to them.
//!
//! ```rust
//! use anvil_di::{AnnotationValue, Args, Binder, Class, ClassRegistry, DiResult, Injector,
//!     Module, Param, Scope, CONSTRUCTOR};
//! use std::sync::Arc;
//!
//! struct Log;
//! struct Db { dsn: String, log: Option<Arc<Log>> }
//!
//! let mut registry = ClassRegistry::new();
//! registry
//!     .register(Class::interface("LogInterface"))
//!     .register(Class::new("Log").implements("LogInterface").constructor([], |_| Ok(Log)))
//!     .register(
//!         Class::new("Db")
//!             .constructor([Param::new("dsn")], |args: &Args| Ok(Db { dsn: args.string("dsn")?, log: None }))
//!             .annotate_method(CONSTRUCTOR, AnnotationValue::with_value("Named", "dsn"))
//!             .method("set_log", [Param::typed("log", "LogInterface")], |db: &mut Db, args| {
//!                 db.log = Some(args.get::<Log>("log")?);
//!                 Ok(())
//!             })
//!             .annotate_method("set_log", AnnotationValue::new("Inject")),
//!     );
//!
//! struct DbModule;
//! impl Module for DbModule {
//!     fn configure(&self, binder: &mut Binder) -> DiResult<()> {
//!         binder.bind("").annotated_with("dsn").to_instance("my dsn");
//!         binder.bind("LogInterface").to("Log").in_scope(Scope::Singleton);
//!         Ok(())
//!     }
//! }
//!
//! let injector = Injector::builder(Arc::new(registry)).module(&DbModule).build().unwrap();
//! let db = injector.get::<Db>("Db").unwrap();
//! assert_eq!(db.dsn, "my dsn");
//! assert!(db.log.is_some());
//! ```
//!
//! ## Scopes
//!
//! - **Singleton**: built once per binding key and shared
//! - **Prototype**: built on every resolution (the default)
//!
//! A binding's explicit scope wins over the target class's `Scope` annotation.
//!
//! ## Compiled graphs
//!
//! [`DiCompiler::create`] compiles a module once and stores the result in a
//! [`CacheStore`]; later calls with the same key load the graph instead of
//! calling the module factory.

pub mod annotation;
pub mod aop;
pub mod argument;
pub mod args;
pub mod binding;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod container;
pub mod definition;
pub mod descriptors;
pub mod error;
pub mod injector;
pub mod key;
pub mod module;
pub mod options;
pub mod prewarm;
pub mod provider;
pub mod registration;
pub mod scope;

mod forge;
mod internal;

// Re-exports
pub use annotation::{
    AnnotationScanner, AnnotationValue, Qualifier, IMPLEMENTED_BY, INJECT, NAMED, POST_CONSTRUCT,
    PRE_DESTROY, PROVIDED_BY, SCOPE,
};
pub use aop::{
    BoundInterceptors, InterceptorBinding, Matcher, MethodInterceptor, MethodInvocation, ProxyWeaver, Weaver, Woven,
};
pub use argument::{Argument, DefaultHint, ParamRef};
pub use args::{downcast, Args};
pub use binding::{Binding, Target};
pub use cache::{CacheStore, FileCache, MemoryCache};
pub use compiler::{CompileEnv, CompiledGraph, DiCompiler, GraphMeta, FORMAT_VERSION};
pub use config::{Config, ConfigSnapshot, UnifiedConfig, GLOBAL};
pub use container::Container;
pub use definition::{AnnotationSite, Definition, DefinitionBuilder, ParamValue, SetterSpec};
pub use descriptors::BindingDescriptor;
pub use error::{DiError, DiResult};
pub use injector::{Injector, InjectorBuilder};
pub use key::{BindingKey, Name};
pub use module::{Binder, BindingBuilder, Module, ScopedBindingBuilder};
pub use options::{InjectorOptions, MAX_DEPTH};
pub use prewarm::PrewarmSet;
pub use provider::Provider;
pub use registration::{Class, ClassRegistry, Instance, Param, CONSTRUCTOR};
pub use scope::Scope;
