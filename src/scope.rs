//! Instance scope definitions.

use serde::{Deserialize, Serialize};

/// Instance scopes controlling caching behavior
///
/// A binding either shares one instance for the lifetime of the container or
/// builds a fresh instance on every resolution.
///
/// # Examples
///
/// ```rust
/// use anvil_di::Scope;
///
/// assert_eq!(Scope::parse("singleton"), Some(Scope::Singleton));
/// assert_eq!(Scope::parse("Prototype"), Some(Scope::Prototype));
/// assert_eq!(Scope::default(), Scope::Prototype);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Single instance per container, cached until the injector is dropped
    Singleton,
    /// New instance per resolution, never cached
    #[default]
    Prototype,
}

impl Scope {
    /// Parses the value of a `Scope` class annotation (case-insensitive).
    pub fn parse(value: &str) -> Option<Scope> {
        match value.trim().to_ascii_lowercase().as_str() {
            "singleton" => Some(Scope::Singleton),
            "prototype" => Some(Scope::Prototype),
            _ => None,
        }
    }

    /// Lowercase name as written in annotations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Prototype => "prototype",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
