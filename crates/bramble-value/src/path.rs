use std::collections::HashSet;

use crate::error::{ValueError, ValueResult};

/// Identities of the containers currently being encoded, from the root of
/// the value down to the element being visited.
#[derive(Debug, Default)]
pub struct VisitedPath {
    entered: HashSet<usize>,
}

impl VisitedPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with `id` on the path of `context`. Entering a container
    /// that is already on the path means the value contains itself.
    ///
    /// `id` is removed again however `f` returns.
    pub fn scoped<C, T>(
        context: &mut C,
        id: usize,
        f: impl FnOnce(&mut C) -> ValueResult<T>,
    ) -> ValueResult<T>
    where
        C: AsMut<VisitedPath>,
    {
        if !context.as_mut().entered.insert(id) {
            return Err(ValueError::DefinedRecursively);
        }
        let result = f(context);
        context.as_mut().entered.remove(&id);
        result
    }

    pub fn contains(&self, id: usize) -> bool {
        self.entered.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.entered.is_empty()
    }
}

impl AsMut<VisitedPath> for VisitedPath {
    fn as_mut(&mut self) -> &mut VisitedPath {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentering_is_an_error() {
        let mut path = VisitedPath::new();
        let result = VisitedPath::scoped(&mut path, 1, |path| {
            VisitedPath::scoped(path, 1, |_| Ok(()))
        });
        assert!(matches!(result, Err(ValueError::DefinedRecursively)));
        assert!(path.is_empty());
    }

    #[test]
    fn siblings_may_share_identity() {
        let mut path = VisitedPath::new();
        for _ in 0..2 {
            VisitedPath::scoped(&mut path, 7, |path| {
                assert!(path.contains(7));
                Ok(())
            })
            .unwrap();
        }
        assert!(!path.contains(7));
    }

    #[test]
    fn released_on_error() {
        let mut path = VisitedPath::new();
        let result: ValueResult<()> =
            VisitedPath::scoped(&mut path, 3, |_| Err(ValueError::Corrupt("boom".into())));
        assert!(result.is_err());
        assert!(path.is_empty());
    }
}
