//! Pre-destroy hooks of cached singletons.

use crate::error::DiResult;

pub(crate) type Hook = Box<dyn FnOnce() -> DiResult<()> + Send>;

/// Destroy hooks with LIFO execution order.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<(String, Hook)>,
}

impl DisposeBag {
    /// Registers a hook; `label` identifies it in failures.
    pub(crate) fn push(&mut self, label: String, hook: Hook) {
        self.hooks.push((label, hook));
    }

    /// Runs every hook, newest first, returning the labelled failures.
    pub(crate) fn run_all_reverse(&mut self) -> Vec<(String, crate::error::DiError)> {
        let mut failures = Vec::new();
        while let Some((label, hook)) = self.hooks.pop() {
            if let Err(err) = hook() {
                failures.push((label, err));
            }
        }
        failures
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiError;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_runs_lifo_and_collects_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        for name in ["first", "second"] {
            let order = order.clone();
            bag.push(name.to_string(), Box::new(move || {
                order.lock().unwrap().push(name);
                if name == "first" {
                    Err(DiError::Module("boom".into()))
                } else {
                    Ok(())
                }
            }));
        }
        assert_eq!(bag.len(), 2);
        let failures = bag.run_all_reverse();
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "first");
        assert_eq!(bag.len(), 0);
    }
}
