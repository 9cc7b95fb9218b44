/// Rebase-Stack Error Types
#[derive(Debug, thiserror::Error)]
pub enum RebaseStackError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Branch management errors
    #[error("Branch error: {0}")]
    Branch(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Precondition failures (no sandbox, terminal state, illegal transition)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Conflict resolution errors
    #[error("Conflict error: {0}")]
    Conflict(String),

    /// Rebase operation errors
    #[error("Rebase error: {0}")]
    Rebase(String),

    /// Validation errors (gate checks, test runner)
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RebaseStackError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RebaseStackError::Config(msg.into())
    }

    pub fn branch<S: Into<String>>(msg: S) -> Self {
        RebaseStackError::Branch(msg.into())
    }

    pub fn precondition<S: Into<String>>(msg: S) -> Self {
        RebaseStackError::Precondition(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        RebaseStackError::Conflict(msg.into())
    }

    pub fn rebase<S: Into<String>>(msg: S) -> Self {
        RebaseStackError::Rebase(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        RebaseStackError::Validation(msg.into())
    }

    pub fn conflict_resolution<S: Into<String>>(file: S, reason: S) -> Self {
        RebaseStackError::Conflict(format!("{}: {}", file.into(), reason.into()))
    }
}

pub type Result<T> = std::result::Result<T, RebaseStackError>;
