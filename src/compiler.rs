//! Ahead-of-time compilation and cached object graphs.
//!
//! [`DiCompiler::compile`] resolves a root type once against a locked
//! injector, which fills every memo the graph needs (unified configs,
//! definitions, type hints) and instantiates its singletons. The resulting
//! [`CompiledGraph`] serializes to JSON; loading it back gives an injector
//! that resolves the compiled types without running any module or scanning
//! annotations again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::annotation::AnnotationScanner;
use crate::aop::{InterceptorBinding, Weaver};
use crate::binding::Binding;
use crate::cache::CacheStore;
use crate::config::ConfigSnapshot;
use crate::error::{DiError, DiResult};
use crate::injector::{Injector, InjectorBuilder};
use crate::key::BindingKey;
use crate::module::Module;
use crate::options::InjectorOptions;
use crate::prewarm::PrewarmSet;
use crate::registration::ClassRegistry;

/// Version of the serialized graph layout
pub const FORMAT_VERSION: u32 = 2;

/// Where and when a graph was compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMeta {
    pub format: u32,
    pub module: String,
    pub roots: Vec<String>,
    pub compiled_at: DateTime<Utc>,
}

/// Serializable snapshot of a compiled injector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledGraph {
    pub meta: GraphMeta,
    pub bindings: Vec<(BindingKey, Binding)>,
    pub config: ConfigSnapshot,
    pub interceptors: Vec<InterceptorBinding>,
    pub injections: Vec<String>,
    /// Singletons alive at compile time, in creation order, with the
    /// binding each was resolved through
    pub singletons: Vec<(BindingKey, Binding)>,
}

impl CompiledGraph {
    pub fn to_bytes(&self) -> DiResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> DiResult<Self> {
        let graph: CompiledGraph = serde_json::from_slice(bytes)?;
        if graph.meta.format != FORMAT_VERSION {
            return Err(DiError::Serialization(format!(
                "unsupported graph format {} (expected {})",
                graph.meta.format, FORMAT_VERSION
            )));
        }
        Ok(graph)
    }

    /// Rebuilds a locked injector from the snapshot.
    ///
    /// Recorded singletons are rebuilt eagerly when the options ask for it.
    pub fn into_injector(self, env: &CompileEnv) -> DiResult<Injector> {
        let (_, injector) = env
            .builder()
            .assemble(self.meta.module, self.interceptors, self.injections);
        injector.container().bind_all(self.bindings)?;
        injector.config().restore(self.config);
        injector.lock();

        if env.options.prewarm_singletons && !self.singletons.is_empty() {
            injector.prewarm(&self.singletons.into_iter().collect::<PrewarmSet>())?;
        }
        Ok(injector)
    }
}

/// Runtime pieces a graph is compiled against and loaded into.
///
/// The registry holds code, so it is supplied by the program on every run
/// rather than stored in the graph.
#[derive(Clone)]
pub struct CompileEnv {
    registry: Arc<ClassRegistry>,
    scanner: Option<Arc<dyn AnnotationScanner>>,
    weaver: Option<Arc<dyn Weaver>>,
    options: InjectorOptions,
    roots: Vec<String>,
}

impl CompileEnv {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            scanner: None,
            weaver: None,
            options: InjectorOptions::default(),
            roots: Vec::new(),
        }
    }

    pub fn scanner(mut self, scanner: Arc<dyn AnnotationScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn weaver(mut self, weaver: Arc<dyn Weaver>) -> Self {
        self.weaver = Some(weaver);
        self
    }

    pub fn options(mut self, options: InjectorOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds a root type. Without roots every explicit binding is compiled.
    pub fn root(mut self, type_name: impl Into<String>) -> Self {
        self.roots.push(type_name.into());
        self
    }

    pub(crate) fn builder<'m>(&self) -> InjectorBuilder<'m> {
        let mut builder = Injector::builder(self.registry.clone()).options(self.options.clone());
        if let Some(scanner) = &self.scanner {
            builder = builder.scanner(scanner.clone());
        }
        if let Some(weaver) = &self.weaver {
            builder = builder.weaver(weaver.clone());
        }
        builder
    }
}

impl std::fmt::Debug for CompileEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileEnv")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("roots", &self.roots)
            .finish()
    }
}

/// Compiles injectors into reusable graphs.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Binder, Class, ClassRegistry, CompileEnv, DiCompiler, DiResult, MemoryCache, Module};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Log;
///
/// struct AppModule;
/// impl Module for AppModule {
///     fn configure(&self, binder: &mut Binder) -> DiResult<()> {
///         binder.bind("LogInterface").to("Log");
///         Ok(())
///     }
/// }
///
/// let mut registry = ClassRegistry::new();
/// registry
///     .register(Class::interface("LogInterface"))
///     .register(Class::new("Log").implements("LogInterface").default_constructor::<Log>());
/// let env = CompileEnv::new(Arc::new(registry)).root("LogInterface");
///
/// let cache = MemoryCache::new();
/// let mut runs = 0;
/// for _ in 0..2 {
///     let injector = DiCompiler::create(|| { runs += 1; AppModule }, &cache, "app", &env).unwrap();
///     assert!(injector.get::<Log>("LogInterface").is_ok());
/// }
/// assert_eq!(runs, 1);
/// ```
pub struct DiCompiler {
    injector: Injector,
    roots: Mutex<Vec<String>>,
}

impl DiCompiler {
    pub fn new(injector: Injector) -> Self {
        Self {
            injector,
            roots: Mutex::new(Vec::new()),
        }
    }

    /// Locks the injector and resolves the graph of `root`.
    pub fn compile(&self, root: &str) -> DiResult<CompiledGraph> {
        let span = info_span!("compile", root);
        let _entered = span.enter();
        debug!(module = %self.injector.module_identity(), "compiling");

        self.injector.lock();
        for class in self.injector.injections() {
            self.injector.request_injection(class)?;
        }
        self.injector.get_instance(root, None)?;
        self.roots.lock().push(root.to_string());

        let graph = self.snapshot();
        debug!(
            bindings = graph.bindings.len(),
            classes = graph.config.unified.len(),
            singletons = graph.singletons.len(),
            "compiled"
        );
        Ok(graph)
    }

    /// Compiles every explicitly bound key.
    pub fn compile_all(&self) -> DiResult<CompiledGraph> {
        let span = info_span!("compile", root = "*");
        let _entered = span.enter();
        self.injector.lock();
        for class in self.injector.injections() {
            self.injector.request_injection(class)?;
        }
        for descriptor in self.injector.descriptors() {
            let key = descriptor.key;
            let qualifier = key.is_qualified().then(|| key.qualifier());
            self.injector.get_instance(key.type_name(), qualifier)?;
            self.roots.lock().push(key.to_string());
        }
        Ok(self.snapshot())
    }

    /// Snapshot of everything resolved so far.
    pub fn snapshot(&self) -> CompiledGraph {
        CompiledGraph {
            meta: GraphMeta {
                format: FORMAT_VERSION,
                module: self.injector.module_identity().to_string(),
                roots: self.roots.lock().clone(),
                compiled_at: Utc::now(),
            },
            bindings: self.injector.container().bindings(),
            config: self.injector.config().snapshot(),
            interceptors: self.injector.interceptor_bindings().to_vec(),
            injections: self.injector.injections().to_vec(),
            singletons: self.injector.container().singleton_bindings(),
        }
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub fn into_injector(self) -> Injector {
        self.injector
    }

    /// Cache key of module type `M` under `key`.
    pub fn cache_key<M: Module>(options: &InjectorOptions, key: &str) -> String {
        format!("{}:{}:{}", options.cache_namespace, key, std::any::type_name::<M>())
    }

    /// Returns the cached graph for `key`, or compiles and stores it.
    ///
    /// On a hit the module factory is not called. The graph is compiled for
    /// the environment's roots, or every explicit binding without roots.
    pub fn create<M, F>(module_factory: F, cache: &dyn CacheStore, key: &str, env: &CompileEnv) -> DiResult<Injector>
    where
        M: Module,
        F: FnOnce() -> M,
    {
        let cache_key = Self::cache_key::<M>(&env.options, key);
        if let Some(bytes) = cache.get(&cache_key)? {
            debug!(key = %cache_key, bytes = bytes.len(), "compiled graph cache hit");
            return CompiledGraph::from_bytes(&bytes)?.into_injector(env);
        }
        debug!(key = %cache_key, "compiled graph cache miss");

        let module = module_factory();
        let injector = env.builder().module(&module).build()?;
        let compiler = DiCompiler::new(injector);
        let graph = if env.roots.is_empty() {
            compiler.compile_all()?
        } else {
            let mut graph = None;
            for root in &env.roots {
                graph = Some(compiler.compile(root)?);
            }
            graph.unwrap_or_else(|| compiler.snapshot())
        };
        cache.set(&cache_key, &graph.to_bytes()?)?;
        Ok(compiler.into_injector())
    }
}

impl std::fmt::Debug for DiCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiCompiler")
            .field("injector", &self.injector)
            .field("roots", &self.roots.lock())
            .finish()
    }
}
