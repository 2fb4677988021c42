//! Derives WHAT each screen shows. Rendering the lines (OLED pixels on the
//! device, log frames on the host) is the display collaborator's job.

use crate::{
    config::ControllerConfig,
    state::SystemState,
    types::{DisplayScreen, DEVICE_NAME, DEVICE_SW_VERSION},
    wizard::{WizardMachine, WizardScreen},
};

/// One display row: a fixed label column and a value column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub label: &'static str,
    pub value: String,
}

impl DisplayLine {
    fn new(label: &'static str, value: impl Into<String>) -> Self {
        Self {
            label,
            value: value.into(),
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// Renders the active screen of `state` into rows.
pub fn screen_lines(
    state: &SystemState,
    wizard: &WizardMachine,
    config: &ControllerConfig,
) -> Vec<DisplayLine> {
    match state.screen {
        DisplayScreen::LampStatus => vec![
            DisplayLine::new("Light Sensor:", if state.light_is_dark { "Dark" } else { "Light" }),
            DisplayLine::new("Presence:", if state.presence_detected { "YES" } else { "NO" }),
            DisplayLine::new("Lamp:", on_off(state.lamp_on)),
        ],
        DisplayScreen::LevelStatus => vec![
            DisplayLine::new("Water Level:", level_text(state, config)),
            DisplayLine::new("Pump:", on_off(state.pump_on)),
        ],
        DisplayScreen::ClimateStatus => vec![
            DisplayLine::new("Temperature:", format!("{:.1} C", state.temperature)),
            DisplayLine::new("Humidity:", format!("{:.1} %", state.humidity)),
            DisplayLine::new("Irrigator:", on_off(state.irrigator_on)),
        ],
        DisplayScreen::WifiStatus => vec![
            DisplayLine::new("WiFi:", state.wifi_ssid.clone()),
            DisplayLine::new(
                "Status:",
                if state.wifi_connected {
                    "Connected"
                } else {
                    "Disconnected"
                },
            ),
        ],
        DisplayScreen::DeviceInfo => vec![
            DisplayLine::new("Device:", DEVICE_NAME),
            DisplayLine::new("Version:", DEVICE_SW_VERSION),
        ],
        DisplayScreen::LevelSettings => settings_menu_lines(
            state.setting_index,
            [
                ("Max Level:", format!("{}%", state.settings.max_level_pct)),
                ("Min Level:", format!("{}%", state.settings.min_level_pct)),
            ],
        ),
        DisplayScreen::ClimateSettings => settings_menu_lines(
            state.setting_index,
            [
                ("Hot Temp:", format!("{} C", state.settings.hot_temp_c)),
                ("Low Hum:", format!("{}%", state.settings.low_humidity_pct)),
            ],
        ),
        DisplayScreen::WifiWizard => wizard_lines(wizard),
    }
}

/// The level value column, with the fault states spelled out the way the
/// probe reports them.
fn level_text(state: &SystemState, config: &ControllerConfig) -> String {
    if state.level_raw >= config.level_open_circuit {
        "OPEN".to_string()
    } else if state.level_raw <= config.level_short_circuit + config.level_threshold {
        "SHORT".to_string()
    } else if state.level_raw >= config.level_open_circuit - config.level_threshold {
        "100%".to_string()
    } else {
        format!("{}%", state.level_percent)
    }
}

fn settings_menu_lines(selected: u8, fields: [(&'static str, String); 2]) -> Vec<DisplayLine> {
    fields
        .into_iter()
        .enumerate()
        .map(|(i, (label, value))| {
            let marker = if i == usize::from(selected) { "> " } else { "  " };
            DisplayLine::new(label, format!("{marker}{value}"))
        })
        .collect()
}

fn wizard_lines(wizard: &WizardMachine) -> Vec<DisplayLine> {
    match wizard.screen() {
        WizardScreen::Menu => {
            let items = ["Scan networks", "Disconnect"];
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let marker = if i == wizard.menu_index() { "> " } else { "  " };
                    DisplayLine::new("", format!("{marker}{item}"))
                })
                .collect()
        }
        WizardScreen::ListNetworks => {
            if !wizard.has_scan_results() {
                return vec![DisplayLine::new("WiFi:", "Scanning...")];
            }
            let (window, offset) = wizard.network_window();
            window
                .iter()
                .enumerate()
                .map(|(i, ssid)| {
                    let marker = if i == offset { "> " } else { "  " };
                    DisplayLine::new("", format!("{marker}{ssid}"))
                })
                .collect()
        }
        WizardScreen::SetPassword => vec![
            DisplayLine::new("SSID:", wizard.selected_ssid().to_string()),
            DisplayLine::new("Pass:", wizard.editor().render()),
        ],
        WizardScreen::ConnectFeedback => {
            let status = match wizard.connect_ok() {
                None => "Connecting...",
                Some(true) => "Connected!",
                Some(false) => "Failed! Check password",
            };
            vec![
                DisplayLine::new("SSID:", wizard.selected_ssid().to_string()),
                DisplayLine::new("", status),
            ]
        }
        WizardScreen::Disconnect => vec![DisplayLine::new("WiFi:", "Disconnected")],
    }
}
