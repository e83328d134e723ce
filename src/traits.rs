use crate::error::Result;

/// Operation based replicated data type.
///
/// Replicas converge once they have applied the same set of ops, provided each op is delivered
/// after the ops it causally depends on. Applying an op twice must be a no-op.
pub trait CmRDT {
    /// Op to be applied at every replica
    type Op;

    /// Apply an op to this replica.
    ///
    /// An error means the op is inconsistent with the local state and nothing was changed.
    fn apply(&mut self, op: Self::Op) -> Result<()>;
}
