use thiserror::Error;

/// Errors raised while loading, solving or lumping an interval MDP.
///
/// LP infeasibility is not represented here: an infeasible problem is the
/// normal way the lumper learns that two states can be told apart.
#[derive(Debug, Error)]
pub enum ImdpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid model: {reason}")]
    InvalidModel { reason: String },

    #[error("unsupported objective: {reason}")]
    UnsupportedObjective { reason: String },

    #[error("LP solver failure: {reason}")]
    LpSolver { reason: String },

    #[error("numeric anomaly: {reason}")]
    Numeric { reason: String },
}

impl ImdpError {
    pub fn invalid_model<S: Into<String>>(reason: S) -> Self {
        ImdpError::InvalidModel { reason: reason.into() }
    }

    pub fn unsupported<S: Into<String>>(reason: S) -> Self {
        ImdpError::UnsupportedObjective { reason: reason.into() }
    }

    pub fn numeric<S: Into<String>>(reason: S) -> Self {
        ImdpError::Numeric { reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, ImdpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_failure() {
        let e = ImdpError::invalid_model("state 3 out of range");
        assert_eq!(e.to_string(), "invalid model: state 3 out of range");
        let e = ImdpError::unsupported("lumping with antagonistic intervals");
        assert!(e.to_string().starts_with("unsupported objective"));
    }

    #[test]
    fn io_errors_convert() {
        fn open() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/definitely/not/a/file.json")?)
        }
        match open() {
            Err(ImdpError::Io(_)) => {}
            other => panic!("expected io error, got {:?}", other.map(|_| ())),
        }
    }
}
