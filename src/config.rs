//! Binding table and per-class unification.
//!
//! [`Config`] holds what modules bind explicitly for classes (constructor
//! parameter values and setter calls) and merges it with what each class
//! inherits from its parent and declares through annotations. The merged
//! result, a [`UnifiedConfig`], is computed once per class and memoized.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::annotation::AnnotationScanner;
use crate::argument::{Argument, DefaultHint, ParamRef};
use crate::definition::{Definition, DefinitionBuilder, ParamValue, SetterSpec};
use crate::error::{DiError, DiResult};
use crate::key::Name;
use crate::registration::{ClassRegistry, CONSTRUCTOR};

/// Class name under which bindings for every class are stored
pub const GLOBAL: &str = "*";

/// Everything needed to build one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedConfig {
    params: Vec<(String, ParamValue)>,
    arguments: Vec<Argument>,
    setters: Vec<SetterSpec>,
    definition: Definition,
}

impl UnifiedConfig {
    /// Constructor parameter values in declaration order.
    pub fn params(&self) -> &[(String, ParamValue)] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Constructor arguments, parallel to [`params`](Self::params).
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Explicitly bound setters, inherited ones first.
    pub fn setters(&self) -> &[SetterSpec] {
        &self.setters
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }
}

/// Serializable state of a [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub params: BTreeMap<String, BTreeMap<String, ParamValue>>,
    pub setters: BTreeMap<String, Vec<SetterSpec>>,
    pub unified: BTreeMap<String, UnifiedConfig>,
    pub hints: BTreeMap<String, Option<DefaultHint>>,
}

/// The binding table.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Class, ClassRegistry, Config, Param, ParamValue};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Conn;
///
/// let mut registry = ClassRegistry::new();
/// registry
///     .register(Class::new("Base").constructor([Param::new("dsn"), Param::new("retries").default_value(3)], |_| Ok(Conn)))
///     .register(Class::new("Child").extends("Base").constructor([Param::new("dsn"), Param::new("retries").default_value(5)], |_| Ok(Conn)));
/// let registry = Arc::new(registry);
///
/// let config = Config::new(registry.clone(), registry);
/// config.set_param("Base", "dsn", ParamValue::literal("sqlite")).unwrap();
///
/// let child = config.fetch("Child").unwrap();
/// assert_eq!(child.param("dsn"), Some(&ParamValue::literal("sqlite")));
/// assert_eq!(child.param("retries"), Some(&ParamValue::Default(5.into())));
///
/// config.lock();
/// assert!(config.set_param("Child", "dsn", ParamValue::literal("mysql")).is_err());
/// assert!(!config.has_param("Child", "dsn"));
/// ```
pub struct Config {
    registry: Arc<ClassRegistry>,
    builder: DefinitionBuilder,
    params: RwLock<BTreeMap<String, BTreeMap<String, ParamValue>>>,
    setters: RwLock<BTreeMap<String, Vec<SetterSpec>>>,
    unified: RwLock<HashMap<String, Arc<UnifiedConfig>>>,
    locked: Arc<AtomicBool>,
}

impl Config {
    pub fn new(registry: Arc<ClassRegistry>, scanner: Arc<dyn AnnotationScanner>) -> Self {
        Self {
            builder: DefinitionBuilder::new(registry.clone(), scanner),
            registry,
            params: RwLock::new(BTreeMap::new()),
            setters: RwLock::new(BTreeMap::new()),
            unified: RwLock::new(HashMap::new()),
            locked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares the lock flag of a container, so locking either freezes both.
    pub(crate) fn with_lock(mut self, locked: Arc<AtomicBool>) -> Self {
        self.locked = locked;
        self
    }

    /// Freezes parameters and setters; memoization keeps working.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn builder(&self) -> &DefinitionBuilder {
        &self.builder
    }

    /// Binds a constructor parameter of `class` ([`GLOBAL`] for every root class).
    pub fn set_param(&self, class: &str, param: &str, value: ParamValue) -> DiResult<()> {
        if self.is_locked() {
            return Err(DiError::ContainerLocked(format!("{}::${}", class, param)));
        }
        self.params
            .write()
            .entry(class.to_string())
            .or_default()
            .insert(param.to_string(), value);
        self.unified.write().clear();
        Ok(())
    }

    /// True when `param` of `class` is bound explicitly.
    pub fn has_param(&self, class: &str, param: &str) -> bool {
        self.params
            .read()
            .get(class)
            .is_some_and(|params| params.contains_key(param))
    }

    /// Adds an explicit setter call; the method may be declared on an ancestor.
    pub fn add_setter(&self, class: &str, method: &str, values: BTreeMap<String, ParamValue>) -> DiResult<()> {
        if self.is_locked() {
            return Err(DiError::ContainerLocked(format!("{}::{}", class, method)));
        }
        let arguments = self
            .registry
            .method_params(class, method)?
            .iter()
            .map(|param| {
                let hint = param.type_name().and_then(|t| self.builder.hint_for(t));
                Argument::new(ParamRef::new(class, method, param.name()), param, Name::ANY, hint)
            })
            .collect();
        let spec = SetterSpec::new(method, arguments).with_values(values);
        self.setters.write().entry(class.to_string()).or_default().push(spec);
        self.unified.write().clear();
        Ok(())
    }

    /// Unified parameter values, setters and definition of `class`.
    ///
    /// A parameter takes the class's own explicit value, else the nearest
    /// ancestor's explicit value, else the class's own declared default.
    /// Declared defaults never flow down: a parameter the class declares
    /// without a default stays unset even when an ancestor declares one.
    pub fn fetch(&self, class: &str) -> DiResult<Arc<UnifiedConfig>> {
        self.fetch_in(class, &mut Vec::new())
    }

    /// Merged definition of `class`.
    pub fn definition(&self, class: &str) -> DiResult<Definition> {
        Ok(self.fetch(class)?.definition.clone())
    }

    /// Clears explicit bindings and every memoized result; fails once locked.
    pub fn reset(&self) -> DiResult<()> {
        if self.is_locked() {
            return Err(DiError::ContainerLocked("*".to_string()));
        }
        self.params.write().clear();
        self.setters.write().clear();
        self.unified.write().clear();
        self.builder.reset();
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            params: self.params.read().clone(),
            setters: self.setters.read().clone(),
            unified: self
                .unified
                .read()
                .iter()
                .map(|(class, unified)| (class.clone(), unified.as_ref().clone()))
                .collect(),
            hints: self.builder.hints_snapshot(),
        }
    }

    pub(crate) fn restore(&self, snapshot: ConfigSnapshot) {
        *self.params.write() = snapshot.params;
        *self.setters.write() = snapshot.setters;
        *self.unified.write() = snapshot
            .unified
            .into_iter()
            .map(|(class, unified)| (class, Arc::new(unified)))
            .collect();
        self.builder.restore_hints(snapshot.hints);
    }

    fn fetch_in(&self, class: &str, visiting: &mut Vec<String>) -> DiResult<Arc<UnifiedConfig>> {
        if let Some(unified) = self.unified.read().get(class) {
            return Ok(unified.clone());
        }
        let unified = Arc::new(self.unify(class, visiting)?);
        self.unified.write().insert(class.to_string(), unified.clone());
        Ok(unified)
    }

    fn unify(&self, class_name: &str, visiting: &mut Vec<String>) -> DiResult<UnifiedConfig> {
        if visiting.iter().any(|c| c == class_name) {
            visiting.push(class_name.to_string());
            return Err(DiError::Circular(visiting.clone()));
        }
        visiting.push(class_name.to_string());
        trace!(class = class_name, "unifying class config");

        let class = self.registry.get(class_name)?;
        let (inherited_params, inherited_setters, inherited_definition) = match class.parent() {
            Some(parent) => {
                let parent = self.fetch_in(parent, visiting)?;
                let params: BTreeMap<String, ParamValue> = parent.params.iter().cloned().collect();
                (params, parent.setters.clone(), parent.definition.clone())
            }
            None => (
                self.params.read().get(GLOBAL).cloned().unwrap_or_default(),
                self.setters.read().get(GLOBAL).cloned().unwrap_or_default(),
                Definition::default(),
            ),
        };

        let definition = self.builder.build(class_name)?.merge_over(&inherited_definition, class_name)?;

        let explicit = self.params.read().get(class_name).cloned().unwrap_or_default();
        let mut params = Vec::new();
        let mut arguments = Vec::new();
        for param in class.constructor_params() {
            let name = param.name();
            let value = explicit
                .get(name)
                .cloned()
                .or_else(|| inherited_params.get(name).filter(|v| v.is_explicit()).cloned())
                .or_else(|| param.default().cloned().map(ParamValue::Default))
                .unwrap_or(ParamValue::Unset);
            let qualifier = definition.constructor_qualifier(name).unwrap_or(Name::ANY);
            let hint = param.type_name().and_then(|t| self.builder.hint_for(t));
            arguments.push(Argument::new(
                ParamRef::new(class_name, CONSTRUCTOR, name),
                &param,
                qualifier,
                hint,
            ));
            params.push((name.to_string(), value));
        }

        let mut setters = inherited_setters;
        setters.extend(self.setters.read().get(class_name).cloned().unwrap_or_default());

        visiting.pop();
        Ok(UnifiedConfig {
            params,
            arguments,
            setters,
            definition,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("params", &self.params.read().len())
            .field("setters", &self.setters.read().len())
            .field("unified", &self.unified.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationValue, POST_CONSTRUCT};
    use crate::registration::{Class, Param};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Stub;

    struct CountingScanner {
        registry: Arc<ClassRegistry>,
        class_scans: AtomicUsize,
    }

    impl AnnotationScanner for CountingScanner {
        fn class_annotations(&self, type_name: &str) -> Vec<AnnotationValue> {
            self.class_scans.fetch_add(1, Ordering::SeqCst);
            self.registry.class_annotations(type_name)
        }

        fn method_annotations(&self, type_name: &str, method: &str) -> Vec<AnnotationValue> {
            self.registry.method_annotations(type_name, method)
        }
    }

    fn registry() -> Arc<ClassRegistry> {
        let mut registry = ClassRegistry::new();
        registry
            .register(
                Class::new("Base")
                    .constructor([Param::new("a"), Param::new("b").default_value(1)], |_| Ok(Stub))
                    .method("set_x", [Param::new("x")], |_: &mut Stub, _| Ok(()))
                    .method("init", [], |_: &mut Stub, _| Ok(()))
                    .annotate_method("init", AnnotationValue::new(POST_CONSTRUCT)),
            )
            .register(
                Class::new("Child")
                    .extends("Base")
                    .constructor([Param::new("a"), Param::new("b").default_value(2), Param::new("c")], |_| Ok(Stub)),
            )
            .register(
                Class::new("Bad")
                    .extends("Base")
                    .default_constructor::<Stub>()
                    .method("setup", [], |_: &mut Stub, _| Ok(()))
                    .annotate_method("setup", AnnotationValue::new(POST_CONSTRUCT)),
            )
            .register(
                Class::new("Bare")
                    .extends("Base")
                    .constructor([Param::new("a"), Param::new("b")], |_| Ok(Stub)),
            )
            .register(Class::interface("Iface"));
        Arc::new(registry)
    }

    fn config() -> Config {
        let registry = registry();
        Config::new(registry.clone(), registry)
    }

    #[test]
    fn test_precedence_explicit_parent_default_unset() {
        let config = config();
        config.set_param("Base", "a", ParamValue::literal("base-a")).unwrap();
        config.set_param("Child", "c", ParamValue::reference("Iface")).unwrap();

        let child = config.fetch("Child").unwrap();
        assert_eq!(child.param("a"), Some(&ParamValue::literal("base-a")));
        assert_eq!(child.param("b"), Some(&ParamValue::Default(2.into())));
        assert_eq!(child.param("c"), Some(&ParamValue::reference("Iface")));

        let base = config.fetch("Base").unwrap();
        assert_eq!(base.param("b"), Some(&ParamValue::Default(1.into())));
        assert_eq!(child.definition().post_construct(), Some("init"));
    }

    #[test]
    fn test_parent_declared_default_not_inherited() {
        let config = config();
        config.set_param("Base", "a", ParamValue::literal("base-a")).unwrap();
        let bare = config.fetch("Bare").unwrap();
        assert_eq!(bare.param("a"), Some(&ParamValue::literal("base-a")));
        assert_eq!(bare.param("b"), Some(&ParamValue::Unset));
    }

    #[test]
    fn test_explicit_override_wins_over_parent() {
        let config = config();
        config.set_param("Base", "a", ParamValue::literal("base")).unwrap();
        config.set_param("Child", "a", ParamValue::literal("child")).unwrap();
        assert_eq!(config.fetch("Child").unwrap().param("a"), Some(&ParamValue::literal("child")));
        assert_eq!(config.fetch("Base").unwrap().param("a"), Some(&ParamValue::literal("base")));
    }

    #[test]
    fn test_global_params_apply_to_roots() {
        let config = config();
        config.set_param(GLOBAL, "a", ParamValue::literal("global")).unwrap();
        assert_eq!(config.fetch("Child").unwrap().param("a"), Some(&ParamValue::literal("global")));
        assert!(config.fetch("Iface").unwrap().params().is_empty());
    }

    #[test]
    fn test_setters_accumulate_down_the_hierarchy() {
        let config = config();
        config.add_setter("Base", "set_x", BTreeMap::from([("x".to_string(), ParamValue::literal(1))])).unwrap();
        config.add_setter("Child", "set_x", BTreeMap::from([("x".to_string(), ParamValue::literal(2))])).unwrap();
        let setters = config.fetch("Child").unwrap().setters().to_vec();
        assert_eq!(setters.len(), 2);
        assert_eq!(setters[1].value("x"), Some(&ParamValue::literal(2)));
        assert!(config.add_setter("Child", "missing", BTreeMap::new()).is_err());
    }

    #[test]
    fn test_duplicate_post_construct_in_chain() {
        let err = config().fetch("Bad").unwrap_err();
        assert_eq!(
            err,
            DiError::MultipleAnnotationNotAllowed {
                annotation: POST_CONSTRUCT.to_string(),
                class: "Bad".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_class() {
        assert_eq!(config().fetch("Nope").unwrap_err(), DiError::NotFound("Nope".into()));
    }

    #[test]
    fn test_memoized_and_reset() {
        let registry = registry();
        let scanner = Arc::new(CountingScanner {
            registry: registry.clone(),
            class_scans: AtomicUsize::new(0),
        });
        let config = Config::new(registry, scanner.clone());
        let first = config.fetch("Child").unwrap();
        let second = config.fetch("Child").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        config.fetch("Base").unwrap();
        assert_eq!(scanner.class_scans.load(Ordering::SeqCst), 2);

        config.reset().unwrap();
        config.fetch("Child").unwrap();
        assert_eq!(scanner.class_scans.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_snapshot_restores_memo() {
        let config = config();
        config.set_param("Base", "a", ParamValue::literal("x")).unwrap();
        let unified = config.fetch("Child").unwrap();

        let json = serde_json::to_string(&config.snapshot()).unwrap();
        let restored = Config::new(registry(), registry());
        restored.restore(serde_json::from_str(&json).unwrap());
        assert_eq!(*restored.fetch("Child").unwrap(), *unified);
    }
}
