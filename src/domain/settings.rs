use crate::domain::models::MovementPolarity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_pong".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Number of player slots the registry creates.
    #[serde(default = "default_player_count")]
    pub player_count: usize,

    /// Per-slot paddle speed multipliers, applied at read time only.
    /// Indexed by slot - 1; slots past the end use the default.
    #[serde(default = "default_multipliers")]
    pub move_multipliers: Vec<i32>,

    #[serde(default = "default_points_to_win")]
    pub points_to_win: u32,

    /// Up/Down sign mapping; deployments disagree, so it is explicit.
    #[serde(default)]
    pub polarity: MovementPolarity,

    /// Bound on the whole connect + subscribe sequence. Without it a
    /// never-resolving connect would leave the slot permanently busy.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Shown while a slot is disconnected. The defaults advertise the
    /// keyboard fallback keys of the original installation.
    #[serde(default = "default_placeholder_names")]
    pub placeholder_names: Vec<String>,

    /// Where to find the device-number-to-name roster.
    #[serde(default = "default_roster_path")]
    pub roster_path: PathBuf,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            player_count: default_player_count(),
            move_multipliers: default_multipliers(),
            points_to_win: default_points_to_win(),
            polarity: MovementPolarity::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            placeholder_names: default_placeholder_names(),
            roster_path: default_roster_path(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_player_count() -> usize {
    2
}
fn default_multipliers() -> Vec<i32> {
    vec![DEFAULT_MULTIPLIER, DEFAULT_MULTIPLIER]
}
fn default_points_to_win() -> u32 {
    10
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_placeholder_names() -> Vec<String> {
    vec!["A=UP, Z=DOWN".to_string(), "P=UP, L=DOWN".to_string()]
}
fn default_roster_path() -> PathBuf {
    PathBuf::from("players-config.json")
}

/// Paddle speed multiplier when no slider value has been stored.
pub const DEFAULT_MULTIPLIER: i32 = 10;

impl Settings {
    /// Multiplier for a 1-based slot, defaulting when unconfigured.
    pub fn multiplier_for(&self, slot: usize) -> i32 {
        slot.checked_sub(1)
            .and_then(|i| self.move_multipliers.get(i))
            .copied()
            .unwrap_or(DEFAULT_MULTIPLIER)
    }

    /// Placeholder display name for a 1-based slot.
    pub fn placeholder_for(&self, slot: usize) -> &str {
        slot.checked_sub(1)
            .and_then(|i| self.placeholder_names.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BlePong");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Persist a slider change for one slot (1-based).
    pub fn update_multiplier(&mut self, slot: usize, multiplier: i32) -> anyhow::Result<()> {
        if slot == 0 {
            anyhow::bail!("slot indices start at 1");
        }
        let multipliers = &mut self.settings.move_multipliers;
        if multipliers.len() < slot {
            multipliers.resize(slot, DEFAULT_MULTIPLIER);
        }
        multipliers[slot - 1] = multiplier;
        self.save()
    }
}
