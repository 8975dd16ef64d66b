use thiserror::Error;

/// Failure of a single dispatched action.
///
/// None of these ever terminate a full run: the interpreter reports the error
/// with the offending index and moves on. They only propagate to the caller
/// on the synchronous single-action test path.
#[derive(Debug, Error)]
pub enum StepError {
    /// The action's kind tag is not in the closed enumeration.
    #[error("unknown action kind '{0}'")]
    UnknownKind(String),

    /// The requested index does not exist in the script.
    #[error("action index {0} is out of script bounds")]
    OutOfBounds(usize),

    /// A background run is active; single-action testing must wait.
    #[error("a run is active; stop it before testing an action")]
    Busy,

    /// A capability provider failed (capture device, matcher, injector).
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}
