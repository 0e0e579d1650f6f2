//! The reconciliation state machine's stages.

use std::fmt;

/// Where a run currently is. `Failed` is reachable from every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum RunStage {
  #[default]
  Idle,
  Sourcing,
  Aggregating,
  Covering,
  Continuity,
  Sweeping,
  Done,
  Failed,
}

impl RunStage {
  /// True once the run has stopped, successfully or not.
  pub fn is_terminal(self) -> bool { matches!(self, Self::Done | Self::Failed) }
}

impl fmt::Display for RunStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Idle => "idle",
      Self::Sourcing => "sourcing",
      Self::Aggregating => "aggregating",
      Self::Covering => "covering",
      Self::Continuity => "continuity",
      Self::Sweeping => "sweeping",
      Self::Done => "done",
      Self::Failed => "failed",
    };
    f.write_str(s)
  }
}
