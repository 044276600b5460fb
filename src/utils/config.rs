//! Application configuration

use serde::{Deserialize, Serialize};

/// Process-wide settings
///
/// Created with defaults at first run, mutated only through [`Settings::apply`],
/// and read fresh at every admission decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum concurrent downloads (only enforced when `concurrency_mode` is on)
    pub max_concurrent: usize,

    /// Whether the concurrency limit is enforced at all
    pub concurrency_mode: bool,

    /// Cookie data handed to the engine verbatim
    pub cookies: Option<String>,

    /// UI theme preference
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            concurrency_mode: true,
            cookies: None,
            theme: Theme::Dark,
        }
    }
}

impl Settings {
    /// Apply a partial update, clamping `max_concurrent` to a sane minimum.
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(max) = patch.max_concurrent {
            self.max_concurrent = max.max(1);
        }
        if let Some(mode) = patch.concurrency_mode {
            self.concurrency_mode = mode;
        }
        if let Some(cookies) = patch.cookies {
            self.cookies = cookies;
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
    }
}

/// Partial settings update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub max_concurrent: Option<usize>,
    /// `Some(None)` clears the stored cookies.
    pub cookies: Option<Option<String>>,
    pub concurrency_mode: Option<bool>,
    pub theme: Option<Theme>,
}

/// UI theme options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
    System,
}
