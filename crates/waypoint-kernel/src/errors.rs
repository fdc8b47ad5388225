use waypoint_store::{LockHeld, PersistenceError};
use waypoint_types::ContractViolation;

/// The error kind table of `spec.md` §7, minus the three kinds
/// ([`AgentOutcome`](waypoint_types::AgentOutcome)'s `TransientErr`,
/// `SystematicErr`, `AmbiguityErr`) that the recovery manager always
/// absorbs locally and never lets escape as a `KernelError`.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Security/destructive/veto, or a systematic error that exhausted
    /// recovery — always surfaces, never retried further.
    #[error("fatal: {0}")]
    Fatal(String),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    LockHeld(#[from] LockHeld),
    #[error("illegal state transition: {0}")]
    IllegalTransition(String),
}

pub type KernelResult<T> = Result<T, KernelError>;
