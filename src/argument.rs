//! Argument identity for injected parameters.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DiError, DiResult};
use crate::key::{BindingKey, Name};
use crate::registration::{ClassRegistry, Param};

/// Fallback target taken from a parameter's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "class", rename_all = "snake_case")]
pub enum DefaultHint {
    /// Resolve to this concrete class
    ImplementedBy(String),
    /// Resolve through this provider class
    ProvidedBy(String),
}

/// Where a parameter is declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRef {
    pub class: String,
    pub method: String,
    pub param: String,
}

impl ParamRef {
    pub fn new(class: impl Into<String>, method: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
            param: param.into(),
        }
    }
}

/// One injectable parameter.
///
/// Identity is the `"<type>-<qualifier>"` index; untyped parameters have the
/// empty type. The registry handle is not serialized: after a compiled graph
/// is loaded it is looked up again on first use.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Argument, Param, ParamRef};
/// use std::sync::Arc;
///
/// let param = Arc::new(Param::typed("log", "LogInterface"));
/// let arg = Argument::new(ParamRef::new("Db", "set_log", "log"), &param, "*", None);
///
/// assert_eq!(arg.index(), "LogInterface-*");
/// assert!(!arg.has_default());
/// assert_eq!(
///     arg.context(),
///     "dependency 'LogInterface' with name '*' used in Db::set_log ($log)"
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    index: String,
    type_name: String,
    qualifier: String,
    has_default: bool,
    default: Option<Value>,
    context: String,
    param_ref: ParamRef,
    hint: Option<DefaultHint>,
    #[serde(skip)]
    handle: OnceCell<Arc<Param>>,
}

impl Argument {
    pub fn new(param_ref: ParamRef, param: &Arc<Param>, qualifier: &str, hint: Option<DefaultHint>) -> Self {
        let qualifier = if qualifier.is_empty() { Name::ANY } else { qualifier };
        let type_name = param.type_name().unwrap_or_default().to_string();
        let context = describe(&type_name, qualifier, &param_ref);
        Self {
            index: format!("{}-{}", type_name, qualifier),
            type_name,
            qualifier: qualifier.to_string(),
            has_default: param.default().is_some() || param.is_optional(),
            default: param.default().cloned(),
            context,
            param_ref,
            hint,
            handle: OnceCell::with_value(param.clone()),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn name(&self) -> &str {
        &self.param_ref.param
    }

    pub fn key(&self) -> BindingKey {
        BindingKey::named(self.type_name.clone(), self.qualifier.clone())
    }

    /// True when the parameter may be left to its default or absent.
    pub fn has_default(&self) -> bool {
        self.has_default
    }

    /// Declared default; `None` for a nullable parameter without one.
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Context for `key` bound explicitly in place of this parameter.
    pub fn context_for(&self, key: &BindingKey) -> String {
        describe(key.type_name(), key.qualifier(), &self.param_ref)
    }

    pub fn param_ref(&self) -> &ParamRef {
        &self.param_ref
    }

    pub fn hint(&self) -> Option<&DefaultHint> {
        self.hint.as_ref()
    }

    /// Registry handle of the declared parameter, looked up on first use.
    pub fn parameter(&self, registry: &ClassRegistry) -> DiResult<Arc<Param>> {
        self.handle
            .get_or_try_init(|| {
                let ParamRef { class, method, param } = &self.param_ref;
                registry
                    .method_params(class, method)?
                    .into_iter()
                    .find(|p| p.name() == param)
                    .ok_or_else(|| DiError::Unbound {
                        key: self.index.clone(),
                        context: format!("parameter ${} no longer declared on {}::{}", param, class, method),
                    })
            })
            .cloned()
    }

    pub(crate) fn is_rehydrated(&self) -> bool {
        self.handle.get().is_some()
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.has_default == other.has_default
            && self.default == other.default
            && self.context == other.context
            && self.param_ref == other.param_ref
            && self.hint == other.hint
    }
}

fn describe(type_name: &str, qualifier: &str, at: &ParamRef) -> String {
    format!(
        "dependency '{}' with name '{}' used in {}::{} (${})",
        type_name, qualifier, at.class, at.method, at.param
    )
}
