use std::fmt;

/// Status the engine exits with when the simulation ran but its assertions did not hold.
pub const ASSERTIONS_FAILED_STATUS: i32 = 2;

/// Raw result of a launched engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub status: i32,
    /// Trailing diagnostic output captured from the engine, if any.
    pub cause: Option<String>,
}

impl ExitReport {
    pub fn new(status: i32) -> Self {
        Self { status, cause: None }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Classified outcome of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Success,
    AssertionsFailed,
    Failure { status: i32, cause: Option<String> },
}

impl LaunchOutcome {
    /// Classify a raw exit report.
    pub fn translate(report: ExitReport) -> Self {
        match report.status {
            0 => LaunchOutcome::Success,
            ASSERTIONS_FAILED_STATUS => LaunchOutcome::AssertionsFailed,
            status => LaunchOutcome::Failure {
                status,
                cause: report.cause,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LaunchOutcome::Success)
    }
}

impl fmt::Display for LaunchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchOutcome::Success => f.write_str("success"),
            LaunchOutcome::AssertionsFailed => f.write_str("assertions failed"),
            LaunchOutcome::Failure { status, .. } => write!(f, "failure (status {status})"),
        }
    }
}
