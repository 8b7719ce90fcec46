use meridian_core::Operation;

/// A path-scoped custom conflict resolver.
///
/// Receives the incoming operation and the prior operations it conflicts
/// with, and returns the operation whose effect should end up in the store:
/// the incoming operation, one of the conflicting ones, or a synthesized
/// operation on the same path. Returning `Err`, panicking, or returning an
/// operation that cannot be applied makes the engine fall back to
/// last-write-wins.
///
/// Handlers run while the node's state is locked. They must not call back
/// into the node they are registered on.
pub trait ConflictHandler: Send + Sync {
    fn resolve(&self, incoming: &Operation, conflicts: &[Operation]) -> Result<Operation, String>;
}

impl<F> ConflictHandler for F
where
    F: Fn(&Operation, &[Operation]) -> Result<Operation, String> + Send + Sync,
{
    fn resolve(&self, incoming: &Operation, conflicts: &[Operation]) -> Result<Operation, String> {
        self(incoming, conflicts)
    }
}
