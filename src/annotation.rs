//! Annotation model, the scanner seam, and qualifier parsing.
//!
//! Annotation discovery is an external concern: anything that can report the
//! annotations of a class and of its methods implements [`AnnotationScanner`].
//! The engine only ever sees the uniform [`AnnotationValue`] model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DiError, DiResult};

/// Marks the method invoked after construction and setter injection
pub const POST_CONSTRUCT: &str = "PostConstruct";
/// Marks the method invoked when the injector shuts down
pub const PRE_DESTROY: &str = "PreDestroy";
/// Marks a constructor or setter for injection; `optional = true` skips unresolved setters
pub const INJECT: &str = "Inject";
/// Qualifies the parameters of an injected method
pub const NAMED: &str = "Named";
/// Declares the default scope of a class
pub const SCOPE: &str = "Scope";
/// Declares the default implementation of an interface
pub const IMPLEMENTED_BY: &str = "ImplementedBy";
/// Declares the default provider of an interface
pub const PROVIDED_BY: &str = "ProvidedBy";

/// A single annotation: a name, an optional primary value and named attributes.
///
/// # Examples
///
/// ```rust
/// use anvil_di::AnnotationValue;
///
/// let inject = AnnotationValue::new("Inject").attr("optional", true);
/// assert!(inject.flag("optional"));
///
/// let named = AnnotationValue::with_value("Named", "dsn");
/// assert_eq!(named.value(), Some("dsn"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationValue {
    name: String,
    value: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
}

impl AnnotationValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut annotation = Self::new(name);
        annotation.value = Some(value.into());
        annotation
    }

    /// Adds a named attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Boolean attribute, `false` when absent or not a boolean.
    pub fn flag(&self, key: &str) -> bool {
        self.attributes.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Source of annotation metadata.
///
/// Scanning is assumed to be expensive; the definition builder calls each
/// method at most once per class and memoizes the result.
pub trait AnnotationScanner: Send + Sync {
    /// Annotations declared on the class itself.
    fn class_annotations(&self, type_name: &str) -> Vec<AnnotationValue>;

    /// Annotations declared on one method of the class.
    fn method_annotations(&self, type_name: &str, method: &str) -> Vec<AnnotationValue>;
}

/// Parsed value of a `Named` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Qualifier {
    /// One qualifier applied to every parameter of the method
    Single(String),
    /// Per-parameter qualifiers keyed by parameter name
    PerParam(BTreeMap<String, String>),
}

impl Qualifier {
    /// Qualifier for the named parameter, if this annotation covers it.
    pub fn for_param(&self, param: &str) -> Option<&str> {
        match self {
            Qualifier::Single(name) => Some(name),
            Qualifier::PerParam(map) => map.get(param).map(String::as_str),
        }
    }

    /// Parses a `Named` value.
    ///
    /// A bare identifier (`dsn`) applies to all parameters. Anything else
    /// must be a comma separated `param=qualifier` list; a qualifier may be
    /// double quoted to contain commas or `=` (quotes are stripped, there are
    /// no escape sequences).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use anvil_di::Qualifier;
    ///
    /// assert_eq!(Qualifier::parse("dsn").unwrap(), Qualifier::Single("dsn".into()));
    ///
    /// let per_param = Qualifier::parse("a=1,b=2").unwrap();
    /// assert_eq!(per_param.for_param("a"), Some("1"));
    /// assert_eq!(per_param.for_param("b"), Some("2"));
    ///
    /// assert!(Qualifier::parse("not a name").is_err());
    /// ```
    pub fn parse(input: &str) -> DiResult<Qualifier> {
        let trimmed = input.trim();
        if is_identifier(trimmed) {
            return Ok(Qualifier::Single(trimmed.to_string()));
        }
        let malformed = || DiError::Named(input.to_string());
        if trimmed.is_empty() {
            return Err(malformed());
        }

        let mut pairs = BTreeMap::new();
        let mut rest = trimmed;
        loop {
            let eq = rest.find('=').ok_or_else(malformed)?;
            let key = rest[..eq].trim();
            if !is_identifier(key) {
                return Err(malformed());
            }
            rest = rest[eq + 1..].trim_start();

            let value = if let Some(quoted) = rest.strip_prefix('"') {
                let close = quoted.find('"').ok_or_else(malformed)?;
                let value = &quoted[..close];
                rest = quoted[close + 1..].trim_start();
                if !rest.is_empty() && !rest.starts_with(',') {
                    return Err(malformed());
                }
                value
            } else {
                let end = rest.find(',').unwrap_or(rest.len());
                let value = rest[..end].trim();
                if value.contains('"') {
                    return Err(malformed());
                }
                rest = &rest[end..];
                value
            };
            pairs.insert(key.to_string(), value.to_string());

            match rest.strip_prefix(',') {
                None => break,
                Some(next) => {
                    rest = next.trim_start();
                    if rest.is_empty() {
                        return Err(malformed());
                    }
                }
            }
        }
        Ok(Qualifier::PerParam(pairs))
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_name() {
        assert_eq!(Qualifier::parse(" dsn ").unwrap(), Qualifier::Single("dsn".into()));
        assert_eq!(Qualifier::parse("dsn").unwrap().for_param("anything"), Some("dsn"));
    }

    #[test]
    fn test_pairs_with_spaces_and_quotes() {
        let q = Qualifier::parse(r#"user = "a,b", pass="x=y",db=main"#).unwrap();
        assert_eq!(q.for_param("user"), Some("a,b"));
        assert_eq!(q.for_param("pass"), Some("x=y"));
        assert_eq!(q.for_param("db"), Some("main"));
        assert_eq!(q.for_param("other"), None);
    }

    #[test]
    fn test_malformed_values() {
        for bad in ["", "   ", "has space", "=x", "a=1,", "a=\"open", "a=\"q\"tail", "a=1,b", "a-b=1", "a=x\"y"] {
            assert_eq!(Qualifier::parse(bad), Err(DiError::Named(bad.to_string())), "{bad:?}");
        }
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let q = Qualifier::parse("a=").unwrap();
        assert_eq!(q.for_param("a"), Some(""));
    }
}
