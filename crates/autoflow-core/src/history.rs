use crate::RunStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Share of ERROR/CANCELLED entries above which a node is flagged as a hardware problem.
const HARDWARE_FAILURE_RATIO: f64 = 0.40;

/// Statuses recorded for one node across the visits of a single run.
///
/// Append-only while a run is in progress. Routing policies read it; only the
/// runner writes to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeHistory(Vec<RunStatus>);

impl OutcomeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: RunStatus) {
        self.0.push(status);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<RunStatus> {
        self.0.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = RunStatus> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[RunStatus] {
        &self.0
    }

    /// The most recent `n` entries, oldest first.
    pub fn window(&self, n: usize) -> &[RunStatus] {
        let start = self.0.len().saturating_sub(n);
        &self.0[start..]
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.0.iter().filter(|s| **s == status).count()
    }

    /// Entries routing treats as failures (FAIL and ERROR).
    pub fn fail_count(&self) -> usize {
        self.0.iter().filter(|s| s.counts_as_fail()).count()
    }

    pub fn classify(&self) -> ResultClass {
        if self.0.is_empty() {
            return ResultClass::NoData;
        }

        let passes = self.count(RunStatus::Pass);
        let fails = self.count(RunStatus::Fail);
        let valid = passes + fails;
        let hardware = self.0.len() - valid;

        if valid > 0 && hardware as f64 / self.0.len() as f64 > HARDWARE_FAILURE_RATIO {
            return ResultClass::HardwareFailure;
        }
        if valid == 0 {
            return ResultClass::NoValidResults;
        }

        let pass_rate = passes as f64 / valid as f64;
        if pass_rate >= 0.8 {
            ResultClass::Stable
        } else if pass_rate >= 0.5 {
            ResultClass::Flaky
        } else if pass_rate > 0.0 {
            ResultClass::MostlyFailing
        } else {
            ResultClass::SolidRepro
        }
    }
}

impl FromIterator<RunStatus> for OutcomeHistory {
    fn from_iter<I: IntoIterator<Item = RunStatus>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<RunStatus>> for OutcomeHistory {
    fn from(statuses: Vec<RunStatus>) -> Self {
        Self(statuses)
    }
}

/// Summary verdict over a node's whole history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultClass {
    NoData,
    HardwareFailure,
    NoValidResults,
    /// Pass rate of at least 80%.
    Stable,
    /// Pass rate between 50% and 80%.
    Flaky,
    MostlyFailing,
    /// Every valid result failed.
    SolidRepro,
}

impl ResultClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultClass::NoData => "NO_DATA",
            ResultClass::HardwareFailure => "HARDWARE_FAILURE",
            ResultClass::NoValidResults => "NO_VALID_RESULTS",
            ResultClass::Stable => "STABLE",
            ResultClass::Flaky => "FLAKY",
            ResultClass::MostlyFailing => "MOSTLY_FAILING",
            ResultClass::SolidRepro => "SOLID_REPRO",
        }
    }
}

impl fmt::Display for ResultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunStatus::*;

    #[test]
    fn window_keeps_most_recent_entries() {
        let history: OutcomeHistory = vec![Fail, Pass, Pass, Fail].into();
        assert_eq!(history.window(2), &[Pass, Fail]);
        assert_eq!(history.window(10).len(), 4);
        assert!(history.window(0).is_empty());
    }

    #[test]
    fn error_counts_as_fail() {
        let history: OutcomeHistory = vec![Error, Fail, Pass, Cancelled].into();
        assert_eq!(history.fail_count(), 2);
        assert_eq!(history.count(Fail), 1);
    }

    #[test]
    fn classification_follows_pass_rate() {
        assert_eq!(OutcomeHistory::new().classify(), ResultClass::NoData);
        assert_eq!(
            OutcomeHistory::from(vec![Pass; 5]).classify(),
            ResultClass::Stable
        );
        assert_eq!(
            OutcomeHistory::from(vec![Pass, Fail]).classify(),
            ResultClass::Flaky
        );
        assert_eq!(
            OutcomeHistory::from(vec![Pass, Fail, Fail, Fail]).classify(),
            ResultClass::MostlyFailing
        );
        assert_eq!(
            OutcomeHistory::from(vec![Fail, Fail]).classify(),
            ResultClass::SolidRepro
        );
    }

    #[test]
    fn classification_flags_hardware_problems() {
        assert_eq!(
            OutcomeHistory::from(vec![Error, Cancelled, Pass]).classify(),
            ResultClass::HardwareFailure
        );
        assert_eq!(
            OutcomeHistory::from(vec![Error, Error]).classify(),
            ResultClass::NoValidResults
        );
    }
}
