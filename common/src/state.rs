use crate::{config::PersistedSettings, types::DisplayScreen};

/// The single shared snapshot of the appliance.
///
/// Constructed once at startup and handed to every task behind one mutex.
/// Ownership of the commanded actuator fields is split by task: only the
/// control task writes `lamp_on` / `pump_on` / `irrigator_on` /
/// `fault_led_on`, only the sensor task writes the sensor fields, only the
/// UI path writes `screen` / `setting_index`, and only the network task
/// writes the WiFi mirror fields. The mutex serializes access; the split
/// keeps writers from fighting over the same field.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemState {
    /// Raw 12-bit ADC reading from the level probe.
    pub level_raw: u16,
    /// Derived fill percentage, always within [0, 100].
    pub level_percent: u16,
    /// Last valid climate readings; invalid samples keep the previous value.
    pub temperature: f64,
    pub humidity: f64,
    pub presence_detected: bool,
    pub light_is_dark: bool,

    /// Commanded actuator states. A separate task pushes these to hardware.
    pub lamp_on: bool,
    pub pump_on: bool,
    pub irrigator_on: bool,
    pub fault_led_on: bool,

    pub screen: DisplayScreen,
    pub setting_index: u8,

    pub wifi_connected: bool,
    pub wifi_ssid: String,

    pub settings: PersistedSettings,
}

impl SystemState {
    pub fn new(settings: PersistedSettings) -> Self {
        Self {
            level_raw: 0,
            level_percent: 0,
            temperature: 0.0,
            humidity: 0.0,
            presence_detected: false,
            light_is_dark: false,
            lamp_on: false,
            pump_on: false,
            irrigator_on: false,
            fault_led_on: false,
            screen: DisplayScreen::LampStatus,
            setting_index: 0,
            wifi_connected: false,
            wifi_ssid: String::new(),
            settings,
        }
    }

    /// Folds in a climate sample. `None` marks an invalid reading (the DHT11
    /// frequently returns garbage); the previous value is kept in that case.
    pub fn update_climate(&mut self, temperature: Option<f64>, humidity: Option<f64>) {
        if let Some(temperature) = temperature {
            self.temperature = temperature;
        }
        if let Some(humidity) = humidity {
            self.humidity = humidity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_climate_samples_keep_previous_values() {
        let mut state = SystemState::new(PersistedSettings::default());
        state.update_climate(Some(24.5), Some(55.0));
        state.update_climate(None, None);

        assert_eq!(state.temperature, 24.5);
        assert_eq!(state.humidity, 55.0);

        state.update_climate(Some(25.0), None);
        assert_eq!(state.temperature, 25.0);
        assert_eq!(state.humidity, 55.0);
    }
}
