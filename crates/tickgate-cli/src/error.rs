use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] tickgate_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error("store error: {0}")]
    Store(#[from] tickgate_core::StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Serialization(_) => 4,
            Self::Store(_) => 6,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_and_usage_errors_share_an_exit_code() {
        let validation = CliError::Validation(tickgate_core::ValidationError::EmptySymbol);
        let command = CliError::Command(String::from("unknown provider"));

        assert_eq!(validation.exit_code(), 2);
        assert_eq!(command.exit_code(), 2);
    }

    #[test]
    fn io_failures_are_distinguishable() {
        let error = CliError::Io(std::io::Error::other("disk full"));
        assert_eq!(error.exit_code(), 10);
    }
}
