use thiserror::Error;

/// Result type local to memtrack-shell.
pub type Result<T> = std::result::Result<T, ShellError>;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Mem(#[from] memtrack_mem::Error),

    #[error("unterminated quote starting at byte {0}")]
    UnterminatedQuote(usize),

    #[error("{0}: Non-existent variable")]
    UnknownVariable(String),

    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("invalid variable name '{0}'")]
    InvalidName(String),

    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),

    #[error("{0}: missing argument")]
    MissingArgument(&'static str),

    #[error("{0}: numeric argument required")]
    NumericArgument(&'static str),

    #[error("corrupt tracked data: {0}")]
    Corrupt(String),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Return value the shell reports for a failed line.
    pub fn exit_code(&self) -> u8 {
        match self {
            ShellError::CommandNotFound(_) | ShellError::UnknownVariable(_) => 255,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for ShellError {
    fn from(e: serde_json::Error) -> Self {
        ShellError::Corrupt(e.to_string())
    }
}
