//! Snapshot policy

use std::str::FromStr;

/// Default number of events between snapshots
pub const DEFAULT_SNAPSHOT_FREQUENCY: i64 = 50;

/// How snapshot writes are scheduled after a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Awaited before the command returns
    Inline,
    /// Spawned onto the runtime; the command returns immediately
    #[default]
    Background,
}

impl FromStr for SnapshotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inline" => Ok(SnapshotMode::Inline),
            "background" => Ok(SnapshotMode::Background),
            other => Err(format!("unknown snapshot mode '{other}'")),
        }
    }
}

/// Snapshot after every `frequency` events since the last snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPolicy {
    pub frequency: i64,
    pub mode: SnapshotMode,
}

impl SnapshotPolicy {
    pub fn new(frequency: i64, mode: SnapshotMode) -> Self {
        Self {
            frequency: frequency.max(1),
            mode,
        }
    }

    pub fn is_due(&self, last_snapshot_version: i64, new_version: i64) -> bool {
        new_version - last_snapshot_version >= self.frequency
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_FREQUENCY, SnapshotMode::default())
    }
}
