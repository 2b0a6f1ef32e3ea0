//! Binding keys and qualifier names.

use serde::{Deserialize, Serialize};

/// Qualifier constants.
pub struct Name;

impl Name {
    /// Qualifier of an unqualified binding; an unspecified qualifier resolves here too
    pub const ANY: &'static str = "*";
}

/// Key for binding storage and lookup.
///
/// A binding is identified by the abstract type it satisfies and a qualifier
/// name. Scalar dependencies (strings, numbers) use the empty type name and
/// are told apart by qualifier alone.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{BindingKey, Name};
///
/// let log = BindingKey::of("LogInterface");
/// assert_eq!(log.qualifier(), Name::ANY);
/// assert_eq!(log.to_string(), "LogInterface-*");
///
/// let dsn = BindingKey::named("", "dsn");
/// assert!(dsn.is_scalar());
/// assert_eq!(dsn.to_string(), "-dsn");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingKey {
    type_name: String,
    qualifier: String,
}

impl BindingKey {
    /// Key of an unqualified binding for `type_name`.
    pub fn of(type_name: impl Into<String>) -> Self {
        Self::named(type_name, Name::ANY)
    }

    /// Key of a qualified binding. An empty qualifier means [`Name::ANY`].
    pub fn named(type_name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        let qualifier = qualifier.into();
        Self {
            type_name: type_name.into(),
            qualifier: if qualifier.is_empty() { Name::ANY.to_string() } else { qualifier },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// True for dependencies without a declared class type.
    pub fn is_scalar(&self) -> bool {
        self.type_name.is_empty()
    }

    pub fn is_qualified(&self) -> bool {
        self.qualifier != Name::ANY
    }
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.type_name, self.qualifier)
    }
}
