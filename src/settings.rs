use crate::error::TrackerError;
use crate::Result;

/// Options bundle name used by the host's settings storage.
pub const SETTINGS_BUNDLE: &str = "tracker-alt";
pub const USE_PLACEMENT_CORRECTION_KEY: &str = "use-placement-correction";
pub const EXTRAPOLATION_TIME_KEY: &str = "extrapolation-time";

pub const USE_PLACEMENT_CORRECTION_ENV: &str = "ALT_USE_PLACEMENT_CORRECTION";
pub const EXTRAPOLATION_TIME_ENV: &str = "ALT_EXTRAPOLATION_TIME";

/// User options, read once when the tracker is created.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    /// Apply the placement stored in Antilatency Service.
    pub use_placement_correction: bool,
    /// Seconds to predict ahead of the latest device sample.
    pub extrapolation_time: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_placement_correction: true,
            extrapolation_time: 0.0,
        }
    }
}

impl Settings {
    /// Defaults overridden by `ALT_USE_PLACEMENT_CORRECTION` and
    /// `ALT_EXTRAPOLATION_TIME`. Unparseable values keep the default.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        let mut settings = Settings {
            use_placement_correction: read_env_bool(
                USE_PLACEMENT_CORRECTION_ENV,
                defaults.use_placement_correction,
            ),
            ..defaults
        };

        if let Ok(value) = std::env::var(EXTRAPOLATION_TIME_ENV) {
            if let Err(e) = settings.set(EXTRAPOLATION_TIME_KEY, &value) {
                log::warn!("Ignoring {}: {}", EXTRAPOLATION_TIME_ENV, e);
            }
        }

        settings
    }

    /// Apply one key/value pair from the host's settings storage.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || TrackerError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            USE_PLACEMENT_CORRECTION_KEY => {
                self.use_placement_correction = parse_bool(value).ok_or_else(invalid)?;
            }
            EXTRAPOLATION_TIME_KEY => {
                let seconds = value.trim().parse::<f64>().map_err(|_| invalid())?;
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(invalid());
                }
                self.extrapolation_time = seconds;
            }
            _ => return Err(invalid()),
        }
        Ok(())
    }

    /// Apply several pairs; stops at the first invalid one.
    pub fn apply<'a, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}
