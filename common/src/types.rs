use serde::{Deserialize, Serialize};

pub const DEVICE_NAME: &str = "Garden Controller";
pub const DEVICE_SW_VERSION: &str = "1.0.1";

/// The screen the display task renders.
///
/// The first five variants form the Select-button cycle; the settings menus
/// are entered sideways with Esc. The whole WiFi wizard is one opaque screen
/// from the outer menu's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayScreen {
    LampStatus,
    LevelStatus,
    ClimateStatus,
    WifiStatus,
    DeviceInfo,
    LevelSettings,
    ClimateSettings,
    WifiWizard,
}

impl DisplayScreen {
    /// Next screen in the Select cycle. Settings menus and the wizard do not
    /// participate; Select has menu-local meaning there.
    pub fn cycle_next(self) -> Self {
        match self {
            Self::LampStatus => Self::LevelStatus,
            Self::LevelStatus => Self::ClimateStatus,
            Self::ClimateStatus => Self::WifiStatus,
            Self::WifiStatus => Self::DeviceInfo,
            Self::DeviceInfo => Self::LampStatus,
            other => other,
        }
    }

    pub fn is_settings_menu(self) -> bool {
        matches!(self, Self::LevelSettings | Self::ClimateSettings)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LampStatus => "LAMP_STATUS",
            Self::LevelStatus => "LEVEL_STATUS",
            Self::ClimateStatus => "CLIMATE_STATUS",
            Self::WifiStatus => "WIFI_STATUS",
            Self::DeviceInfo => "DEVICE_INFO",
            Self::LevelSettings => "LEVEL_SETTINGS",
            Self::ClimateSettings => "CLIMATE_SETTINGS",
            Self::WifiWizard => "WIFI_WIZARD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_cycle_wraps_over_the_five_display_screens() {
        let mut screen = DisplayScreen::LampStatus;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(screen);
            screen = screen.cycle_next();
        }

        assert_eq!(screen, DisplayScreen::LampStatus);
        assert_eq!(seen.len(), 5);
        assert!(!seen.contains(&DisplayScreen::LevelSettings));
    }

    #[test]
    fn menus_do_not_participate_in_the_cycle() {
        assert_eq!(
            DisplayScreen::LevelSettings.cycle_next(),
            DisplayScreen::LevelSettings
        );
        assert_eq!(
            DisplayScreen::WifiWizard.cycle_next(),
            DisplayScreen::WifiWizard
        );
    }
}
