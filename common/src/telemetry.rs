//! Payloads exchanged with the backend, and the endpoint paths relative to
//! the configured server URL. The transport itself lives in the controller.

use serde::Serialize;

use crate::{
    config::{PersistedSettings, SettingsError},
    state::SystemState,
};

pub const ENDPOINT_UPDATE_DATA: &str = "updateData";
pub const ENDPOINT_GET_SETTINGS: &str = "getSettings";
pub const ENDPOINT_SAVE_SETTINGS: &str = "saveSettings";

/// Periodic sensor snapshot. The backend stores every field as a string, so
/// values are rendered here rather than typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorReport {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub lvl: String,
    pub tmp: String,
    pub hum: String,
    pub ldr: String,
    pub pir: String,
}

/// Periodic actuator snapshot, pushed alongside the sensor report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActuatorReport {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub lmp: String,
    pub pmp: String,
    pub flt: String,
    pub irr: String,
}

/// Settings document posted when a settings menu is exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsReport {
    pub settings: SettingsValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsValues {
    #[serde(rename = "maxLevel")]
    pub max_level: u8,
    #[serde(rename = "minLevel")]
    pub min_level: u8,
    #[serde(rename = "hotTemperature")]
    pub hot_temperature: u8,
    #[serde(rename = "lowHumidity")]
    pub low_humidity: u8,
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

pub fn sensor_report(state: &SystemState) -> SensorReport {
    SensorReport {
        kind: "sensors",
        lvl: state.level_percent.to_string(),
        tmp: format!("{:.2}", state.temperature),
        hum: format!("{:.2}", state.humidity),
        ldr: flag(state.light_is_dark),
        pir: flag(state.presence_detected),
    }
}

pub fn actuator_report(state: &SystemState) -> ActuatorReport {
    ActuatorReport {
        kind: "actuators",
        lmp: flag(state.lamp_on),
        pmp: flag(state.pump_on),
        flt: flag(state.fault_led_on),
        irr: flag(state.irrigator_on),
    }
}

pub fn settings_report(settings: &PersistedSettings) -> SettingsReport {
    SettingsReport {
        settings: SettingsValues {
            max_level: settings.max_level_pct,
            min_level: settings.min_level_pct,
            hot_temperature: settings.hot_temp_c,
            low_humidity: settings.low_humidity_pct,
        },
    }
}

/// Folds a `getSettings` response into the current settings. Unknown keys
/// and non-numeric values are skipped; a value pair that would invert the
/// level band is dropped with its error. Returns whether anything changed.
pub fn apply_settings_json(
    settings: &mut PersistedSettings,
    body: &str,
) -> Result<bool, SettingsError> {
    let document: serde_json::Value = serde_json::from_str(body).map_err(|_| {
        SettingsError::InvalidValue {
            key: "<body>".to_string(),
            value: body.chars().take(32).collect(),
        }
    })?;

    let mut changed = false;
    for key in ["maxLevel", "minLevel", "hotTemperature", "lowHumidity"] {
        let Some(value) = document.get(key) else {
            continue;
        };
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        changed |= settings.apply_kv(key, &rendered)?;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistedSettings;
    use pretty_assertions::assert_eq;

    fn state() -> SystemState {
        let mut state = SystemState::new(PersistedSettings::default());
        state.level_percent = 48;
        state.temperature = 31.5;
        state.humidity = 12.0;
        state.light_is_dark = true;
        state.presence_detected = false;
        state.lamp_on = true;
        state.pump_on = false;
        state.fault_led_on = false;
        state.irrigator_on = true;
        state
    }

    #[test]
    fn sensor_report_uses_the_backend_key_set() {
        let json = serde_json::to_value(sensor_report(&state())).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "sensors",
                "lvl": "48",
                "tmp": "31.50",
                "hum": "12.00",
                "ldr": "1",
                "pir": "0",
            })
        );
    }

    #[test]
    fn actuator_report_uses_the_backend_key_set() {
        let json = serde_json::to_value(actuator_report(&state())).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "actuators",
                "lmp": "1",
                "pmp": "0",
                "flt": "0",
                "irr": "1",
            })
        );
    }

    #[test]
    fn settings_report_round_trips_the_four_fields() {
        let json = serde_json::to_value(settings_report(&PersistedSettings::default())).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "settings": {
                    "maxLevel": 90,
                    "minLevel": 20,
                    "hotTemperature": 30,
                    "lowHumidity": 15,
                }
            })
        );
    }

    #[test]
    fn settings_pull_accepts_numbers_and_strings() {
        let mut settings = PersistedSettings::default();
        let changed = apply_settings_json(
            &mut settings,
            r#"{"maxLevel": 80, "minLevel": "25", "hotTemperature": 28, "lowHumidity": 18}"#,
        )
        .unwrap();

        assert!(changed);
        assert_eq!(settings.max_level_pct, 80);
        assert_eq!(settings.min_level_pct, 25);
        assert_eq!(settings.hot_temp_c, 28);
        assert_eq!(settings.low_humidity_pct, 18);
    }

    #[test]
    fn settings_pull_ignores_missing_keys() {
        let mut settings = PersistedSettings::default();
        let changed = apply_settings_json(&mut settings, r#"{"hotTemperature": 33}"#).unwrap();

        assert!(changed);
        assert_eq!(settings.hot_temp_c, 33);
        assert_eq!(settings.max_level_pct, 90);
    }

    #[test]
    fn settings_pull_rejects_a_band_inversion() {
        let mut settings = PersistedSettings::default();
        let result = apply_settings_json(&mut settings, r#"{"minLevel": 95}"#);

        assert!(result.is_err());
        assert_eq!(settings.min_level_pct, 20);
    }
}
