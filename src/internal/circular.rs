//! Circular dependency detection.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::key::BindingKey;

/// Keys currently being resolved by one top-level `get_instance` call.
///
/// Each top-level call owns its own stack, so concurrent resolutions on
/// other threads never see each other's frames.
pub(crate) struct ResolutionStack {
    frames: RefCell<SmallVec<[BindingKey; 16]>>,
    max_depth: usize,
}

impl ResolutionStack {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            frames: RefCell::new(SmallVec::new()),
            max_depth,
        }
    }

    /// Pushes `key`, failing if it is already in progress.
    pub(crate) fn enter(&self, key: &BindingKey) -> DiResult<StackGuard<'_>> {
        let mut frames = self.frames.borrow_mut();
        if frames.iter().any(|k| k == key) {
            let path = frames
                .iter()
                .chain(std::iter::once(key))
                .map(ToString::to_string)
                .collect();
            return Err(DiError::Circular(path));
        }
        if frames.len() >= self.max_depth {
            return Err(DiError::DepthExceeded(frames.len()));
        }
        frames.push(key.clone());
        Ok(StackGuard { stack: self })
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Pops its frame when dropped.
pub(crate) struct StackGuard<'a> {
    stack: &'a ResolutionStack,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.stack.frames.borrow_mut().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentry_reports_path() {
        let stack = ResolutionStack::new(8);
        let _a = stack.enter(&BindingKey::of("A")).unwrap();
        let _b = stack.enter(&BindingKey::of("B")).unwrap();
        let err = stack.enter(&BindingKey::of("A")).err().unwrap();
        assert_eq!(err, DiError::Circular(vec!["A-*".into(), "B-*".into(), "A-*".into()]));
    }

    #[test]
    fn test_guard_pops_and_depth_limit() {
        let stack = ResolutionStack::new(1);
        {
            let _a = stack.enter(&BindingKey::of("A")).unwrap();
            assert_eq!(stack.depth(), 1);
            assert!(matches!(stack.enter(&BindingKey::of("B")), Err(DiError::DepthExceeded(1))));
        }
        assert_eq!(stack.depth(), 0);
        assert!(stack.enter(&BindingKey::of("A")).is_ok());
    }
}
