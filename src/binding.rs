//! Binding targets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scope::Scope;

/// What satisfies a binding key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum Target {
    /// Build this concrete class
    Class(String),
    /// Build this provider class and call it
    Provider(String),
    /// Return this literal
    Instance(Value),
}

/// A binding: target plus an optional explicit scope.
///
/// Without an explicit scope the target class's `Scope` annotation applies,
/// and failing that the binding is prototype scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

impl Binding {
    pub fn to_class(class: impl Into<String>) -> Self {
        Self {
            target: Target::Class(class.into()),
            scope: None,
        }
    }

    pub fn to_provider(provider: impl Into<String>) -> Self {
        Self {
            target: Target::Provider(provider.into()),
            scope: None,
        }
    }

    pub fn to_instance(value: impl Into<Value>) -> Self {
        Self {
            target: Target::Instance(value.into()),
            scope: None,
        }
    }

    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }
}
