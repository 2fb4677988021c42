pub mod config;
pub mod control;
pub mod display;
pub mod menu;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod wizard;

pub use config::{
    ControllerConfig, NetworkConfig, PersistedSettings, RuntimeConfig, SettingsError,
};
pub use control::{
    level_percent, IrrigationControl, LevelControl, LevelDecision, LightingControl,
};
pub use display::{screen_lines, DisplayLine};
pub use menu::{Button, Debouncer, MenuEvent};
pub use state::SystemState;
pub use telemetry::{
    actuator_report, apply_settings_json, sensor_report, settings_report, ENDPOINT_GET_SETTINGS,
    ENDPOINT_SAVE_SETTINGS, ENDPOINT_UPDATE_DATA,
};
pub use types::{DisplayScreen, DEVICE_NAME, DEVICE_SW_VERSION};
pub use wizard::{WizardEffect, WizardMachine, WizardScreen};
