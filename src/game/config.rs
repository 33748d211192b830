use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Grid sizes the engine is tuned for.
pub const LEGAL_FIELD_SIZES: [i32; 4] = [7, 9, 11, 13];

/// Rule and tuning parameters for one game. The board receives this by
/// value at `new_game`; nothing in the engine reads ambient settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Cells per grid axis, one of 7/9/11/13.
    pub field_size: i32,
    /// Number of ball colors in play, 6 or 7.
    pub colors: u8,
    /// Random cells dropped on the board after each turn, 0..=2.
    #[serde(default)]
    pub extra_moves: u8,
    /// Destroyed balls come back onto free segments.
    #[serde(default)]
    pub reincarnation: bool,
    /// Cells the hazard line sweeps per turn.
    pub hazard_step: f32,
    /// Starting row of the hazard line.
    pub hazard_start: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            field_size: 7,
            colors: 6,
            extra_moves: 1,
            reincarnation: false,
            hazard_step: 0.75,
            hazard_start: 1.1,
        }
    }
}

fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "gridrail")
        .map(|dirs| dirs.config_dir().join("settings.toml"))
}

impl GameConfig {
    /// Clamp every field into its legal range, replacing nonsense with
    /// the nearest legal value.
    pub fn sanitized(mut self) -> Self {
        if !LEGAL_FIELD_SIZES.contains(&self.field_size) {
            self.field_size = 9;
        }
        self.colors = self.colors.clamp(6, 7);
        self.extra_moves = self.extra_moves.min(2);
        if !(self.hazard_step > 0.0 && self.hazard_step < self.field_size as f32) {
            self.hazard_step = 0.75;
        }
        if !(0.0..self.field_size as f32).contains(&self.hazard_start) {
            self.hazard_start = 1.1;
        }
        self
    }

    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    fn load_from(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<GameConfig>(&contents) {
                Ok(config) => config.sanitized(),
                Err(e) => {
                    log::warn!("Failed to parse config: {e}. Using defaults.");
                    Self::default()
                }
            },
            Err(_) => {
                let config = Self::default();
                config.save_to(path);
                config
            }
        }
    }

    pub fn save(&self) {
        let Some(path) = config_path() else {
            log::warn!("Could not determine config directory");
            return;
        };
        self.save_to(&path);
    }

    fn save_to(&self, path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {e}");
                return;
            }
        }
        match toml::to_string_pretty(self) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(path, contents) {
                    log::warn!("Failed to write config: {e}");
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize config: {e}");
            }
        }
    }
}
