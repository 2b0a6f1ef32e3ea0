//! Provider bindings.

use crate::error::DiResult;
use crate::registration::Instance;

/// Factory object bound with `to_provider`.
///
/// The provider class is itself built by the injector (so it can have
/// dependencies of its own); the injector then calls [`get`](Provider::get)
/// and applies the binding's scope to the result.
///
/// # Examples
///
/// ```rust
/// use anvil_di::{Provider, DiResult, Instance};
/// use std::sync::Arc;
///
/// struct Writer;
/// struct WriterProvider;
///
/// impl Provider for WriterProvider {
///     fn get(&self) -> DiResult<Instance> {
///         Ok(Arc::new(Writer))
///     }
/// }
///
/// assert!(WriterProvider.get().unwrap().downcast::<Writer>().is_ok());
/// ```
pub trait Provider: Send + Sync {
    fn get(&self) -> DiResult<Instance>;
}
