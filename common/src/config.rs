use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed calibration and timing constants for the control engine.
///
/// These are build-time tunables, not user settings; they are persisted with
/// the rest of the runtime config so a unit can be recalibrated in the field
/// without reflashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// ADC reading at or above which the level probe is an open circuit.
    pub level_open_circuit: u16,
    /// ADC reading at or below which the level probe is shorted.
    pub level_short_circuit: u16,
    /// Guard band applied to both calibration endpoints.
    pub level_threshold: u16,
    /// Grace period the lamp honors presence after the PIR goes inactive.
    pub presence_cooldown_ms: u64,
    /// Single debounce window shared by all four buttons.
    pub button_debounce_ms: u64,
    /// DHT11 sub-cycle within the 100 ms sensor task.
    pub climate_sample_interval_ms: u64,
    /// Fault LED toggle period at the hardware-apply layer.
    pub fault_blink_ms: u64,
    /// Telemetry push period while WiFi is up.
    pub telemetry_interval_ms: u64,
    /// HTTP push retry count and spacing.
    pub push_retry_attempts: u32,
    pub push_retry_delay_ms: u64,
    /// Station join timeout used by the wizard connect step.
    pub wifi_connect_timeout_ms: u64,
    /// Held Up/Down switches from step 1 to `hold_accel_step` after this long.
    pub hold_accel_after_ms: u64,
    pub hold_accel_step: u8,
    /// Shortest password the wizard will hand to the join attempt.
    pub min_password_len: usize,
    /// How long connect/disconnect feedback screens linger before
    /// auto-returning to the wizard menu.
    pub feedback_hold_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            level_open_circuit: 3975,
            level_short_circuit: 124,
            level_threshold: 50,
            presence_cooldown_ms: 5_000,
            button_debounce_ms: 300,
            climate_sample_interval_ms: 2_000,
            fault_blink_ms: 500,
            telemetry_interval_ms: 15_000,
            push_retry_attempts: 3,
            push_retry_delay_ms: 2_000,
            wifi_connect_timeout_ms: 5_000,
            hold_accel_after_ms: 3_000,
            hold_accel_step: 5,
            min_password_len: 8,
            feedback_hold_ms: 4_000,
        }
    }
}

/// The four user-tunable thresholds, editable from the settings menus and
/// synchronized with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub max_level_pct: u8,
    pub min_level_pct: u8,
    pub hot_temp_c: u8,
    pub low_humidity_pct: u8,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            max_level_pct: 90,
            min_level_pct: 20,
            hot_temp_c: 30,
            low_humidity_pct: 15,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown settings key `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for `{key}` (expected 0-100)")]
    InvalidValue { key: String, value: String },
    #[error("min level {min}% must stay below max level {max}%")]
    LevelBandInverted { min: u8, max: u8 },
}

impl PersistedSettings {
    /// Clamps every field into range and repairs an inverted level band.
    /// Invariant after return: all fields <= 100 and min_level_pct < max_level_pct.
    pub fn sanitize(&mut self) {
        self.max_level_pct = self.max_level_pct.clamp(1, 100);
        self.min_level_pct = self.min_level_pct.min(self.max_level_pct - 1);
        self.hot_temp_c = self.hot_temp_c.min(100);
        self.low_humidity_pct = self.low_humidity_pct.min(100);
    }

    /// Applies one backend key/value pair. Returns whether the value changed.
    ///
    /// A pair that would invert the level band is rejected without modifying
    /// the current settings.
    pub fn apply_kv(&mut self, key: &str, value: &str) -> Result<bool, SettingsError> {
        let parsed: u8 = value
            .trim()
            .parse()
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| SettingsError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })?;

        let mut updated = self.clone();
        let field = match key {
            "maxLevel" => &mut updated.max_level_pct,
            "minLevel" => &mut updated.min_level_pct,
            "hotTemperature" => &mut updated.hot_temp_c,
            "lowHumidity" => &mut updated.low_humidity_pct,
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        };
        let changed = *field != parsed;
        *field = parsed;

        if updated.min_level_pct >= updated.max_level_pct {
            return Err(SettingsError::LevelBandInverted {
                min: updated.min_level_pct,
                max: updated.max_level_pct,
            });
        }

        *self = updated;
        Ok(changed)
    }
}

/// WiFi credentials and the backend base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub server_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            server_url: "http://192.168.100.9:3000/".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn has_credentials(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }
}

/// Everything persisted across reboots, loaded and saved as one document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    pub controller: ControllerConfig,
    pub settings: PersistedSettings,
    pub network: NetworkConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sanitize_repairs_inverted_level_band() {
        let mut settings = PersistedSettings {
            max_level_pct: 30,
            min_level_pct: 80,
            ..PersistedSettings::default()
        };
        settings.sanitize();

        assert!(settings.min_level_pct < settings.max_level_pct);
        assert_eq!(settings.max_level_pct, 30);
        assert_eq!(settings.min_level_pct, 29);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut settings = PersistedSettings {
            max_level_pct: 255,
            min_level_pct: 20,
            hot_temp_c: 200,
            low_humidity_pct: 150,
        };
        settings.sanitize();

        assert_eq!(settings.max_level_pct, 100);
        assert_eq!(settings.hot_temp_c, 100);
        assert_eq!(settings.low_humidity_pct, 100);
    }

    #[test]
    fn apply_kv_updates_known_keys() {
        let mut settings = PersistedSettings::default();

        assert_eq!(settings.apply_kv("maxLevel", "85"), Ok(true));
        assert_eq!(settings.apply_kv("minLevel", "25"), Ok(true));
        assert_eq!(settings.apply_kv("hotTemperature", "32"), Ok(true));
        assert_eq!(settings.apply_kv("lowHumidity", "10"), Ok(true));
        assert_eq!(settings.apply_kv("lowHumidity", "10"), Ok(false));

        assert_eq!(
            settings,
            PersistedSettings {
                max_level_pct: 85,
                min_level_pct: 25,
                hot_temp_c: 32,
                low_humidity_pct: 10,
            }
        );
    }

    #[test]
    fn apply_kv_rejects_unknown_key_and_bad_values() {
        let mut settings = PersistedSettings::default();

        assert_eq!(
            settings.apply_kv("frobnicate", "10"),
            Err(SettingsError::UnknownKey("frobnicate".to_string()))
        );
        assert!(matches!(
            settings.apply_kv("maxLevel", "101"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            settings.apply_kv("maxLevel", "not-a-number"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert_eq!(settings, PersistedSettings::default());
    }

    #[test]
    fn apply_kv_rejects_inverted_band_without_side_effects() {
        let mut settings = PersistedSettings::default();

        assert_eq!(
            settings.apply_kv("minLevel", "95"),
            Err(SettingsError::LevelBandInverted { min: 95, max: 90 })
        );
        assert_eq!(settings.min_level_pct, 20);
    }

    #[test]
    fn runtime_config_round_trips_through_json() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.settings, config.settings);
        assert_eq!(restored.network.server_url, config.network.server_url);
    }
}
