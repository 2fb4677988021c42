//! Debounced button handling and the display/settings menu state machine.

use crate::{state::SystemState, types::DisplayScreen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Select,
    Esc,
    Up,
    Down,
}

/// Single timestamp gate shared across all buttons: a press of any button
/// within the window of the last accepted press (of any button) is dropped.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window_ms: u64,
    last_accepted_ms: Option<u64>,
}

impl Debouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_accepted_ms: None,
        }
    }

    pub fn accept(&mut self, now_ms: u64) -> bool {
        match self.last_accepted_ms {
            Some(last_ms) if now_ms.saturating_sub(last_ms) <= self.window_ms => false,
            _ => {
                self.last_accepted_ms = Some(now_ms);
                true
            }
        }
    }
}

/// Edge events the menu reports back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEvent {
    /// A settings menu was exited; the current settings are due for a
    /// backend push. Fires exactly once per exit.
    SettingsCommitted,
    /// The WiFi wizard screen was entered; the wizard machine must be reset
    /// and takes over button routing until it exits.
    WizardOpened,
}

/// Applies one accepted button press to the display/settings menus.
///
/// Buttons arriving while `state.screen` is `WifiWizard` belong to the
/// wizard machine and must not be routed here.
pub fn handle_button(state: &mut SystemState, button: Button) -> Option<MenuEvent> {
    match button {
        Button::Select => handle_select(state),
        Button::Esc => handle_esc(state),
        Button::Up => adjust_selected_setting(state, 1),
        Button::Down => adjust_selected_setting(state, -1),
    }
}

fn handle_select(state: &mut SystemState) -> Option<MenuEvent> {
    if state.screen.is_settings_menu() {
        state.setting_index = (state.setting_index + 1) % SETTINGS_PER_MENU;
    } else {
        state.screen = state.screen.cycle_next();
    }
    None
}

fn handle_esc(state: &mut SystemState) -> Option<MenuEvent> {
    state.setting_index = 0;
    match state.screen {
        DisplayScreen::LevelStatus => {
            state.screen = DisplayScreen::LevelSettings;
            None
        }
        DisplayScreen::ClimateStatus => {
            state.screen = DisplayScreen::ClimateSettings;
            None
        }
        DisplayScreen::WifiStatus => {
            state.screen = DisplayScreen::WifiWizard;
            Some(MenuEvent::WizardOpened)
        }
        DisplayScreen::LevelSettings => {
            state.screen = DisplayScreen::LevelStatus;
            state.settings.sanitize();
            Some(MenuEvent::SettingsCommitted)
        }
        DisplayScreen::ClimateSettings => {
            state.screen = DisplayScreen::ClimateStatus;
            state.settings.sanitize();
            Some(MenuEvent::SettingsCommitted)
        }
        _ => None,
    }
}

const SETTINGS_PER_MENU: u8 = 2;

fn adjust_selected_setting(state: &mut SystemState, delta: i16) -> Option<MenuEvent> {
    let field = match (state.screen, state.setting_index) {
        (DisplayScreen::LevelSettings, 0) => &mut state.settings.max_level_pct,
        (DisplayScreen::LevelSettings, _) => &mut state.settings.min_level_pct,
        (DisplayScreen::ClimateSettings, 0) => &mut state.settings.hot_temp_c,
        (DisplayScreen::ClimateSettings, _) => &mut state.settings.low_humidity_pct,
        _ => return None,
    };
    *field = (i16::from(*field) + delta).clamp(0, 100) as u8;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistedSettings;
    use pretty_assertions::assert_eq;

    fn state() -> SystemState {
        SystemState::new(PersistedSettings::default())
    }

    #[test]
    fn debounce_window_is_shared_across_buttons() {
        let mut debouncer = Debouncer::new(300);

        assert!(debouncer.accept(1_000));
        // A different button 100 ms later is still inside the window.
        assert!(!debouncer.accept(1_100));
        assert!(!debouncer.accept(1_300));
        assert!(debouncer.accept(1_301));
    }

    #[test]
    fn select_cycles_and_wraps_the_display_screens() {
        let mut state = state();
        let expected = [
            DisplayScreen::LevelStatus,
            DisplayScreen::ClimateStatus,
            DisplayScreen::WifiStatus,
            DisplayScreen::DeviceInfo,
            DisplayScreen::LampStatus,
        ];

        for screen in expected {
            handle_button(&mut state, Button::Select);
            assert_eq!(state.screen, screen);
        }
    }

    #[test]
    fn esc_enters_and_leaves_the_level_settings_menu() {
        let mut state = state();
        state.screen = DisplayScreen::LevelStatus;

        assert_eq!(handle_button(&mut state, Button::Esc), None);
        assert_eq!(state.screen, DisplayScreen::LevelSettings);
        assert_eq!(state.setting_index, 0);

        assert_eq!(
            handle_button(&mut state, Button::Esc),
            Some(MenuEvent::SettingsCommitted)
        );
        assert_eq!(state.screen, DisplayScreen::LevelStatus);
    }

    #[test]
    fn esc_returns_to_the_exact_screen_that_opened_the_menu() {
        let mut state = state();
        state.screen = DisplayScreen::ClimateStatus;

        handle_button(&mut state, Button::Esc);
        assert_eq!(state.screen, DisplayScreen::ClimateSettings);

        handle_button(&mut state, Button::Esc);
        assert_eq!(state.screen, DisplayScreen::ClimateStatus);
    }

    #[test]
    fn settings_commit_fires_once_per_exit() {
        let mut state = state();
        state.screen = DisplayScreen::LevelStatus;

        handle_button(&mut state, Button::Esc);
        let events: Vec<_> = [Button::Up, Button::Up, Button::Esc]
            .into_iter()
            .filter_map(|button| handle_button(&mut state, button))
            .collect();

        assert_eq!(events, vec![MenuEvent::SettingsCommitted]);
    }

    #[test]
    fn select_advances_and_wraps_the_setting_field() {
        let mut state = state();
        state.screen = DisplayScreen::LevelSettings;

        handle_button(&mut state, Button::Select);
        assert_eq!(state.setting_index, 1);
        handle_button(&mut state, Button::Select);
        assert_eq!(state.setting_index, 0);
        assert_eq!(state.screen, DisplayScreen::LevelSettings);
    }

    #[test]
    fn up_down_edit_the_selected_field_with_clamping() {
        let mut state = state();
        state.screen = DisplayScreen::ClimateSettings;
        state.setting_index = 1;
        state.settings.low_humidity_pct = 0;

        handle_button(&mut state, Button::Down);
        assert_eq!(state.settings.low_humidity_pct, 0);

        handle_button(&mut state, Button::Up);
        assert_eq!(state.settings.low_humidity_pct, 1);

        state.settings.low_humidity_pct = 100;
        handle_button(&mut state, Button::Up);
        assert_eq!(state.settings.low_humidity_pct, 100);
    }

    #[test]
    fn up_down_do_nothing_outside_a_settings_menu() {
        let mut state = state();
        let before = state.settings.clone();

        handle_button(&mut state, Button::Up);
        handle_button(&mut state, Button::Down);

        assert_eq!(state.settings, before);
        assert_eq!(state.screen, DisplayScreen::LampStatus);
    }

    #[test]
    fn menu_exit_repairs_an_inverted_band_edited_by_hand() {
        let mut state = state();
        state.screen = DisplayScreen::LevelSettings;
        state.settings.max_level_pct = 10;
        state.settings.min_level_pct = 50;

        handle_button(&mut state, Button::Esc);

        assert!(state.settings.min_level_pct < state.settings.max_level_pct);
    }

    #[test]
    fn esc_on_the_wifi_screen_opens_the_wizard() {
        let mut state = state();
        state.screen = DisplayScreen::WifiStatus;

        assert_eq!(
            handle_button(&mut state, Button::Esc),
            Some(MenuEvent::WizardOpened)
        );
        assert_eq!(state.screen, DisplayScreen::WifiWizard);
    }
}
