//! Player roster loaded from `players-config.json`.
//!
//! Maps device numbers to human-readable player names so the scoreboard can
//! show who is holding which controller. A missing or malformed file falls
//! back to a generated roster covering the full device range.

use crate::infrastructure::bluetooth::protocol::MAX_DEVICE_NUMBER;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(rename = "deviceNumber")]
    pub device_number: u8,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRoster {
    players: Vec<RosterEntry>,
}

impl PlayerRoster {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let roster = serde_json::from_str(&contents)?;
        Ok(roster)
    }

    /// Load from `path`, falling back to the generated default roster.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(roster) => roster,
            Err(e) => {
                warn!("Could not load player roster from {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn name_for(&self, device_number: u8) -> Option<&str> {
        self.players
            .iter()
            .find(|p| p.device_number == device_number)
            .map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.players
    }
}

impl Default for PlayerRoster {
    /// One placeholder entry per supported device number.
    fn default() -> Self {
        Self {
            players: (1..=MAX_DEVICE_NUMBER)
                .map(|n| RosterEntry {
                    device_number: n,
                    name: format!("Player #{}", n),
                })
                .collect(),
        }
    }
}
