/// Result of one step. The numeric codes are those written to the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    /// Completed, but something needs the operator's attention.
    Warning(String),
    Failure(String),
}

impl StepOutcome {
    pub const SUCCESS: i32 = 0;
    pub const WARNING: i32 = 10;
    pub const FAILURE: i32 = 20;

    pub fn warning(detail: impl Into<String>) -> Self {
        StepOutcome::Warning(detail.into())
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        StepOutcome::Failure(reason.into())
    }

    pub fn code(&self) -> i32 {
        match self {
            StepOutcome::Success => Self::SUCCESS,
            StepOutcome::Warning(_) => Self::WARNING,
            StepOutcome::Failure(_) => Self::FAILURE,
        }
    }

    /// Outcome of a numeric result code; anything unknown is a failure.
    pub fn from_code(code: i32, detail: impl Into<String>) -> Self {
        match code {
            Self::SUCCESS => StepOutcome::Success,
            Self::WARNING => StepOutcome::Warning(detail.into()),
            other => StepOutcome::Failure(format!("result code {other}: {}", detail.into())),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failure(_))
    }

    /// The more severe of two outcomes; the first wins a tie.
    pub fn worst(self, other: StepOutcome) -> StepOutcome {
        if other.code() > self.code() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Success => write!(f, "success"),
            StepOutcome::Warning(detail) => write!(f, "warning: {detail}"),
            StepOutcome::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}
