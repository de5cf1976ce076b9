//! Stages of a run and the states a machine moves through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named phases of producing and consuming solver artifacts, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prepare,
    Check,
    Run,
    Results,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Prepare, Stage::Check, Stage::Run, Stage::Results];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::Check => "check",
            Stage::Run => "run",
            Stage::Results => "results",
        }
    }

    /// Machine state while this stage executes.
    pub fn active_state(&self) -> MachineState {
        match self {
            Stage::Prepare => MachineState::Preparing,
            Stage::Check => MachineState::Checking,
            Stage::Run => MachineState::Running,
            Stage::Results => MachineState::ReadingResults,
        }
    }

    /// Machine state once this stage has finished.
    pub fn done_state(&self) -> MachineState {
        match self {
            Stage::Prepare => MachineState::Prepared,
            Stage::Check => MachineState::Checked,
            Stage::Run => MachineState::Ran,
            Stage::Results => MachineState::ResultsRead,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown stage '{s}' (expected prepare, check, run or results)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Done,
    Failed,
    /// Not executed: beyond the target, or after a failure
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Idle,
    Preparing,
    Prepared,
    Checking,
    Checked,
    Running,
    Ran,
    ReadingResults,
    ResultsRead,
    Completed,
    Failed,
}

impl MachineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MachineState::Completed | MachineState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Prepare < Stage::Check);
        assert!(Stage::Run < Stage::Results);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("PREPARE".parse::<Stage>(), Ok(Stage::Prepare));
        assert_eq!("results".parse::<Stage>(), Ok(Stage::Results));
        assert!("solve".parse::<Stage>().is_err());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(MachineState::Completed.is_terminal());
        assert!(MachineState::Failed.is_terminal());
        assert!(!MachineState::Prepared.is_terminal());
        assert_eq!(Stage::Check.done_state(), MachineState::Checked);
    }
}
