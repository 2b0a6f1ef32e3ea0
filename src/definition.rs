//! Per-class metadata derived from annotations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::annotation::{
    AnnotationScanner, AnnotationValue, Qualifier, IMPLEMENTED_BY, INJECT, NAMED, POST_CONSTRUCT,
    PRE_DESTROY, PROVIDED_BY, SCOPE,
};
use crate::argument::{Argument, DefaultHint, ParamRef};
use crate::error::{DiError, DiResult};
use crate::key::Name;
use crate::registration::{ClassRegistry, CONSTRUCTOR};
use crate::scope::Scope;

/// Where a user annotation was found; `method` is `None` at class level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSite {
    pub method: Option<String>,
    pub annotation: AnnotationValue,
}

/// A setter to call after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetterSpec {
    method: String,
    arguments: Vec<Argument>,
    qualifiers: BTreeMap<String, String>,
    optional: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, ParamValue>,
}

impl SetterSpec {
    pub(crate) fn new(method: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            method: method.into(),
            arguments,
            qualifiers: BTreeMap::new(),
            optional: false,
            values: BTreeMap::new(),
        }
    }

    pub(crate) fn with_qualifiers(mut self, qualifiers: BTreeMap<String, String>) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    pub(crate) fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub(crate) fn with_values(mut self, values: BTreeMap<String, ParamValue>) -> Self {
        self.values = values;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Qualifiers declared with `Named`, by parameter name.
    pub fn qualifiers(&self) -> &BTreeMap<String, String> {
        &self.qualifiers
    }

    /// Unresolvable arguments skip the setter instead of failing.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Explicit value for a parameter, set by an explicit setter binding.
    pub fn value(&self, param: &str) -> Option<&ParamValue> {
        self.values.get(param)
    }
}

/// Unified value of one constructor parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    /// Explicitly bound literal
    Literal(Value),
    /// Explicitly bound dependency
    Ref(crate::key::BindingKey),
    /// Declared default value
    Default(Value),
    /// Nothing known; resolved by argument identity
    Unset,
}

impl ParamValue {
    /// Reference to an unqualified binding of `type_name`.
    pub fn reference(type_name: impl Into<String>) -> Self {
        ParamValue::Ref(crate::key::BindingKey::of(type_name))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        ParamValue::Literal(value.into())
    }

    /// Literals and references; these are inherited by subclasses.
    pub fn is_explicit(&self) -> bool {
        matches!(self, ParamValue::Literal(_) | ParamValue::Ref(_))
    }
}

/// Lifecycle hooks, setter injections and user annotations of a class.
///
/// A class's own definition only covers what it declares; [`merge_over`]
/// folds in the parent's definition.
///
/// [`merge_over`]: Definition::merge_over
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    post_construct: Option<String>,
    pre_destroy: Option<String>,
    setter_injections: Vec<SetterSpec>,
    user_annotations: BTreeMap<String, Vec<AnnotationSite>>,
    scope: Option<Scope>,
    constructor_qualifiers: BTreeMap<String, String>,
}

impl Definition {
    pub fn post_construct(&self) -> Option<&str> {
        self.post_construct.as_deref()
    }

    pub fn pre_destroy(&self) -> Option<&str> {
        self.pre_destroy.as_deref()
    }

    pub fn setter_injections(&self) -> &[SetterSpec] {
        &self.setter_injections
    }

    pub fn user_annotations(&self) -> &BTreeMap<String, Vec<AnnotationSite>> {
        &self.user_annotations
    }

    /// Scope declared with the `Scope` class annotation.
    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }

    pub fn constructor_qualifier(&self, param: &str) -> Option<&str> {
        self.constructor_qualifiers.get(param).map(String::as_str)
    }

    pub fn has_class_annotation(&self, name: &str) -> bool {
        self.user_annotations
            .get(name)
            .is_some_and(|sites| sites.iter().any(|s| s.method.is_none()))
    }

    /// User annotation names grouped by the method carrying them.
    pub fn method_annotation_names(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_method: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, sites) in &self.user_annotations {
            for method in sites.iter().filter_map(|s| s.method.as_ref()) {
                by_method.entry(method.clone()).or_default().push(name.clone());
            }
        }
        by_method
    }

    /// Merges `self` (the subclass) over `parent`.
    ///
    /// The subclass wins everywhere except lifecycle hooks: a hook declared by
    /// both is [`DiError::MultipleAnnotationNotAllowed`]. Parent setters the
    /// subclass redeclares are replaced by the subclass's version.
    pub fn merge_over(&self, parent: &Definition, class: &str) -> DiResult<Definition> {
        let post_construct = merge_hook(&self.post_construct, &parent.post_construct, POST_CONSTRUCT, class)?;
        let pre_destroy = merge_hook(&self.pre_destroy, &parent.pre_destroy, PRE_DESTROY, class)?;

        let mut setter_injections: Vec<SetterSpec> = parent
            .setter_injections
            .iter()
            .filter(|inherited| self.setter_injections.iter().all(|own| own.method != inherited.method))
            .cloned()
            .collect();
        setter_injections.extend(self.setter_injections.iter().cloned());

        let mut user_annotations = parent.user_annotations.clone();
        user_annotations.extend(self.user_annotations.clone());

        let mut constructor_qualifiers = parent.constructor_qualifiers.clone();
        constructor_qualifiers.extend(self.constructor_qualifiers.clone());

        Ok(Definition {
            post_construct,
            pre_destroy,
            setter_injections,
            user_annotations,
            scope: self.scope.or(parent.scope),
            constructor_qualifiers,
        })
    }
}

fn merge_hook(
    own: &Option<String>,
    inherited: &Option<String>,
    annotation: &str,
    class: &str,
) -> DiResult<Option<String>> {
    match (own, inherited) {
        (Some(_), Some(_)) => Err(DiError::MultipleAnnotationNotAllowed {
            annotation: annotation.to_string(),
            class: class.to_string(),
        }),
        _ => Ok(own.clone().or_else(|| inherited.clone())),
    }
}

/// Builds a class's own [`Definition`] from its annotations.
///
/// Own definitions, class annotation scans and type hints are each cached,
/// so the scanner sees every class at most once until [`reset`].
///
/// [`reset`]: DefinitionBuilder::reset
pub struct DefinitionBuilder {
    registry: Arc<ClassRegistry>,
    scanner: Arc<dyn AnnotationScanner>,
    definitions: RwLock<HashMap<String, Arc<Definition>>>,
    class_annotations: RwLock<HashMap<String, Arc<Vec<AnnotationValue>>>>,
    hints: RwLock<HashMap<String, Option<DefaultHint>>>,
}

impl DefinitionBuilder {
    pub fn new(registry: Arc<ClassRegistry>, scanner: Arc<dyn AnnotationScanner>) -> Self {
        Self {
            registry,
            scanner,
            definitions: RwLock::new(HashMap::new()),
            class_annotations: RwLock::new(HashMap::new()),
            hints: RwLock::new(HashMap::new()),
        }
    }

    /// The definition of `class` alone, without ancestors.
    pub fn build(&self, class: &str) -> DiResult<Arc<Definition>> {
        if let Some(definition) = self.definitions.read().get(class) {
            return Ok(definition.clone());
        }
        let definition = Arc::new(self.scan(class)?);
        self.definitions
            .write()
            .insert(class.to_string(), definition.clone());
        Ok(definition)
    }

    /// Fallback target for a parameter declared as `type_name`.
    ///
    /// `ImplementedBy` wins over `ProvidedBy`; without either a concrete
    /// registered class binds to itself.
    pub fn hint_for(&self, type_name: &str) -> Option<DefaultHint> {
        if let Some(hint) = self.hints.read().get(type_name) {
            return hint.clone();
        }
        let hint = self.derive_hint(type_name);
        self.hints.write().insert(type_name.to_string(), hint.clone());
        hint
    }

    /// Drops every cached scan, definition and hint.
    pub fn reset(&self) {
        self.definitions.write().clear();
        self.class_annotations.write().clear();
        self.hints.write().clear();
    }

    pub(crate) fn hints_snapshot(&self) -> BTreeMap<String, Option<DefaultHint>> {
        self.hints.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub(crate) fn restore_hints(&self, hints: BTreeMap<String, Option<DefaultHint>>) {
        self.hints.write().extend(hints);
    }

    fn derive_hint(&self, type_name: &str) -> Option<DefaultHint> {
        let class = self.registry.get(type_name).ok()?;
        let annotations = self.class_annotations(type_name);
        let declared = |name: &str| {
            annotations
                .iter()
                .find(|a| a.name() == name)
                .and_then(|a| a.value().map(str::to_string))
        };
        if let Some(implementation) = declared(IMPLEMENTED_BY) {
            return Some(DefaultHint::ImplementedBy(implementation));
        }
        if let Some(provider) = declared(PROVIDED_BY) {
            return Some(DefaultHint::ProvidedBy(provider));
        }
        class
            .is_instantiable()
            .then(|| DefaultHint::ImplementedBy(type_name.to_string()))
    }

    fn class_annotations(&self, class: &str) -> Arc<Vec<AnnotationValue>> {
        if let Some(annotations) = self.class_annotations.read().get(class) {
            return annotations.clone();
        }
        trace!(class, "scanning class annotations");
        let annotations = Arc::new(self.scanner.class_annotations(class));
        self.class_annotations
            .write()
            .insert(class.to_string(), annotations.clone());
        annotations
    }

    fn scan(&self, class_name: &str) -> DiResult<Definition> {
        let class = self.registry.get(class_name)?;
        let mut definition = Definition::default();

        for annotation in self.class_annotations(class_name).iter() {
            match annotation.name() {
                SCOPE => {
                    let value = annotation.value().unwrap_or_default();
                    definition.scope = Some(Scope::parse(value).ok_or_else(|| {
                        DiError::Module(format!("invalid scope '{}' on {}", value, class_name))
                    })?);
                }
                IMPLEMENTED_BY | PROVIDED_BY => {}
                name => definition
                    .user_annotations
                    .entry(name.to_string())
                    .or_default()
                    .push(AnnotationSite {
                        method: None,
                        annotation: annotation.clone(),
                    }),
            }
        }

        for method in class.method_names() {
            trace!(class = class_name, method, "scanning method annotations");
            let annotations = self.scanner.method_annotations(class_name, method);
            let qualifier = annotations
                .iter()
                .find(|a| a.name() == NAMED)
                .map(|a| Qualifier::parse(a.value().unwrap_or_default()))
                .transpose()?;

            if method == CONSTRUCTOR {
                if let Some(qualifier) = &qualifier {
                    for param in class.constructor_params() {
                        if let Some(name) = qualifier.for_param(param.name()) {
                            definition
                                .constructor_qualifiers
                                .insert(param.name().to_string(), name.to_string());
                        }
                    }
                }
            }

            for annotation in &annotations {
                match annotation.name() {
                    POST_CONSTRUCT => set_hook(&mut definition.post_construct, method, POST_CONSTRUCT, class_name)?,
                    PRE_DESTROY => set_hook(&mut definition.pre_destroy, method, PRE_DESTROY, class_name)?,
                    INJECT if method != CONSTRUCTOR => {
                        let setter = self.setter(class_name, method, qualifier.as_ref())?;
                        definition
                            .setter_injections
                            .push(setter.optional(annotation.flag("optional")));
                    }
                    INJECT | NAMED => {}
                    name => definition
                        .user_annotations
                        .entry(name.to_string())
                        .or_default()
                        .push(AnnotationSite {
                            method: Some(method.to_string()),
                            annotation: annotation.clone(),
                        }),
                }
            }
        }
        Ok(definition)
    }

    fn setter(&self, class: &str, method: &str, qualifier: Option<&Qualifier>) -> DiResult<SetterSpec> {
        let mut qualifiers = BTreeMap::new();
        let arguments = self
            .registry
            .method_params(class, method)?
            .iter()
            .map(|param| {
                let name = qualifier
                    .and_then(|q| q.for_param(param.name()))
                    .unwrap_or(Name::ANY);
                if name != Name::ANY {
                    qualifiers.insert(param.name().to_string(), name.to_string());
                }
                let hint = param.type_name().and_then(|t| self.hint_for(t));
                Argument::new(ParamRef::new(class, method, param.name()), param, name, hint)
            })
            .collect();
        Ok(SetterSpec::new(method, arguments).with_qualifiers(qualifiers))
    }
}

fn set_hook(slot: &mut Option<String>, method: &str, annotation: &str, class: &str) -> DiResult<()> {
    if slot.is_some() {
        return Err(DiError::MultipleAnnotationNotAllowed {
            annotation: annotation.to_string(),
            class: class.to_string(),
        });
    }
    *slot = Some(method.to_string());
    Ok(())
}

impl std::fmt::Debug for DefinitionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionBuilder")
            .field("definitions", &self.definitions.read().len())
            .field("hints", &self.hints.read().len())
            .finish()
    }
}
