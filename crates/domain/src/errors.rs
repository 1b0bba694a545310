use thiserror::Error;

/// A single criterion that did not hold between an expected and a received message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{criterion}: expected {expected}, got {got}")]
pub struct MatchError {
    pub criterion: String,
    pub expected: String,
    pub got: String,
}

impl MatchError {
    pub fn new(
        criterion: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self {
            criterion: criterion.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ScenarioError {
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("line {line}, \"{criterion}\": expected {expected}, got {got}")]
    DataMismatch {
        line: usize,
        criterion: String,
        expected: String,
        got: String,
    },

    #[error("Timeout waiting for answer from {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Mandatory entry at {file}:{line} not fired")]
    MandatoryUnfired { file: String, line: usize },

    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    #[error("{file}: step {step}: wrong NEXT value \"{target}\"")]
    BranchTargetNotFound {
        file: String,
        step: i64,
        target: i64,
    },

    #[error("Assertion '{expression}' failed (actual value {actual})")]
    AssertionFailed { expression: String, actual: i64 },

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("{file} step {step} {source}")]
    StepFailed {
        file: String,
        step: i64,
        #[source]
        source: Box<ScenarioError>,
    },

    #[error("Mock server failure: {0}")]
    Server(String),

    #[error("DNS codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ScenarioError {
    pub fn mismatch(line: usize, err: MatchError) -> Self {
        ScenarioError::DataMismatch {
            line,
            criterion: err.criterion,
            expected: err.expected,
            got: err.got,
        }
    }

    /// The criterion name when this is a data mismatch, possibly wrapped in a step failure.
    pub fn criterion(&self) -> Option<&str> {
        match self {
            ScenarioError::DataMismatch { criterion, .. } => Some(criterion),
            ScenarioError::StepFailed { source, .. } => source.criterion(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ScenarioError {
    fn from(e: std::io::Error) -> Self {
        ScenarioError::Io(e.to_string())
    }
}
