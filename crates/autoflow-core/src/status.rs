use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Outcome of one experiment execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pass,
    Fail,
    /// The executor could not run the experiment (e.g. unreachable hardware).
    Error,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "PASS",
            RunStatus::Fail => "FAIL",
            RunStatus::Error => "ERROR",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether routing treats this outcome as a failure. ERROR routes like FAIL.
    pub fn counts_as_fail(&self) -> bool {
        matches!(self, RunStatus::Fail | RunStatus::Error)
    }

    /// ERROR and CANCELLED carry no verdict about the content under test.
    pub fn is_verdict(&self) -> bool {
        matches!(self, RunStatus::Pass | RunStatus::Fail)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown run status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Ok(RunStatus::Pass),
            "FAIL" => Ok(RunStatus::Fail),
            "ERROR" => Ok(RunStatus::Error),
            "CANCELLED" | "CANCELED" => Ok(RunStatus::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
