//! Eager construction of singletons.
//!
//! Compiled graphs record which bindings held singletons when they were
//! compiled. Instances themselves cannot be persisted, so a rehydrated
//! injector rebuilds them up front instead of on first use.

use std::collections::BTreeSet;

use tracing::debug;

use crate::binding::Binding;
use crate::error::DiResult;
use crate::injector::Injector;
use crate::internal::ResolutionStack;
use crate::key::BindingKey;

/// Ordered, duplicate-free set of keys to resolve at startup.
///
/// A key may carry the binding it was originally resolved through. Keys
/// reached via a type hint under a qualifier have no explicit binding,
/// so a bare lookup of them would come back unbound.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PrewarmSet {
    entries: Vec<(BindingKey, Option<Binding>)>,
    seen: BTreeSet<BindingKey>,
}

impl PrewarmSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key`; returns false when it was already present.
    pub fn insert(&mut self, key: BindingKey) -> bool {
        self.push(key, None)
    }

    /// Adds `key`, resolved through `binding` rather than a lookup.
    pub fn insert_bound(&mut self, key: BindingKey, binding: Binding) -> bool {
        self.push(key, Some(binding))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    fn push(&mut self, key: BindingKey, binding: Option<Binding>) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.entries.push((key, binding));
        true
    }
}

impl FromIterator<BindingKey> for PrewarmSet {
    fn from_iter<I: IntoIterator<Item = BindingKey>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl FromIterator<(BindingKey, Binding)> for PrewarmSet {
    fn from_iter<I: IntoIterator<Item = (BindingKey, Binding)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (key, binding) in iter {
            set.insert_bound(key, binding);
        }
        set
    }
}

impl Injector {
    /// Resolves every key in the set, in insertion order.
    ///
    /// Returns the number of keys resolved; the first failure aborts.
    pub fn prewarm(&self, set: &PrewarmSet) -> DiResult<usize> {
        for (key, binding) in &set.entries {
            match binding {
                Some(binding) => {
                    let stack = ResolutionStack::new(self.options().max_depth);
                    self.resolve_with(key, binding.clone(), &stack)?;
                }
                None => {
                    let qualifier = key.is_qualified().then(|| key.qualifier());
                    self.get_instance(key.type_name(), qualifier)?;
                }
            }
        }
        debug!(count = set.len(), "prewarmed singletons");
        Ok(set.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_keeps_first_insertion_order() {
        let set: PrewarmSet = [BindingKey::of("B"), BindingKey::of("A"), BindingKey::of("B")]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().map(|k| k.type_name()).collect::<Vec<_>>(), vec!["B", "A"]);
    }

    #[test]
    fn test_first_binding_for_a_key_wins() {
        let mut set = PrewarmSet::new();
        assert!(set.insert_bound(BindingKey::named("Cache", "fast"), Binding::to_class("Cache")));
        assert!(!set.insert(BindingKey::named("Cache", "fast")));
        assert_eq!(set.entries[0].1, Some(Binding::to_class("Cache")));
    }
}
