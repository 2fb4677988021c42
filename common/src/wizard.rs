//! The button-driven WiFi provisioning wizard.
//!
//! The machine never performs network I/O itself: screen transitions emit
//! [`WizardEffect`] values that the controller's network task executes
//! outside the state lock, feeding results back through
//! [`WizardMachine::scan_complete`] / [`WizardMachine::connect_result`].

use crate::{config::ControllerConfig, menu::Button};

pub const PASSWORD_MAX_LEN: usize = 32;

/// Character grid the password editor cycles through.
pub const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 !#$%&*+-./:=?@_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardScreen {
    Menu,
    ListNetworks,
    SetPassword,
    ConnectFeedback,
    Disconnect,
}

/// Network-side work requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardEffect {
    StartScan,
    Connect { ssid: String, password: String },
    Disconnect,
    /// Leave the wizard; the caller restores the previous display screen.
    Exit,
}

#[derive(Debug, Clone, Copy)]
struct HoldState {
    up: bool,
    started_ms: u64,
    last_ms: u64,
}

/// Character-level password entry state. Lives only while the wizard is on
/// the password screen; reset on every entry.
#[derive(Debug, Clone)]
pub struct PasswordEditor {
    buf: Vec<u8>,
    cursor: usize,
    hold: Option<HoldState>,
}

impl PasswordEditor {
    fn new() -> Self {
        Self {
            buf: vec![PASSWORD_ALPHABET[0]],
            cursor: 0,
            hold: None,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    /// Cycles the character under the cursor. Consecutive presses in the
    /// same direction step by `hold_accel_step` once the button has been
    /// held past `hold_accel_after_ms`.
    fn cycle(&mut self, up: bool, now_ms: u64, config: &ControllerConfig) {
        let step = self.step_for(up, now_ms, config);
        let len = PASSWORD_ALPHABET.len();
        let current = PASSWORD_ALPHABET
            .iter()
            .position(|c| *c == self.buf[self.cursor])
            .unwrap_or(0);
        let next = if up {
            (current + step) % len
        } else {
            (current + len - step % len) % len
        };
        self.buf[self.cursor] = PASSWORD_ALPHABET[next];
    }

    fn step_for(&mut self, up: bool, now_ms: u64, config: &ControllerConfig) -> usize {
        // A held button shows up as a stream of accepted presses one
        // debounce window apart; a gap of more than two windows means the
        // button was released in between.
        let continuity_ms = config.button_debounce_ms * 2;
        match self.hold {
            Some(hold) if hold.up == up && now_ms.saturating_sub(hold.last_ms) <= continuity_ms => {
                self.hold = Some(HoldState {
                    up,
                    started_ms: hold.started_ms,
                    last_ms: now_ms,
                });
                if now_ms.saturating_sub(hold.started_ms) >= config.hold_accel_after_ms {
                    usize::from(config.hold_accel_step)
                } else {
                    1
                }
            }
            _ => {
                self.hold = Some(HoldState {
                    up,
                    started_ms: now_ms,
                    last_ms: now_ms,
                });
                1
            }
        }
    }

    /// Confirms the cursor character and moves right, materializing a fresh
    /// cell when the cursor walks off the end of the buffer.
    fn advance(&mut self) {
        if self.cursor + 1 >= PASSWORD_MAX_LEN {
            return;
        }
        self.cursor += 1;
        if self.cursor == self.buf.len() {
            self.buf.push(PASSWORD_ALPHABET[0]);
        }
    }

    /// Moves the cursor left. Returns false when already at column 0, which
    /// is the finalize gesture.
    fn retreat(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// The entered password with trailing spaces trimmed.
    pub fn password(&self) -> String {
        let raw: String = self.buf.iter().map(|c| *c as char).collect();
        raw.trim_end_matches(' ').to_string()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Buffer with the cursor cell bracketed, for the display task.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.buf.len() + 2);
        for (i, c) in self.buf.iter().enumerate() {
            if i == self.cursor {
                out.push('[');
                out.push(*c as char);
                out.push(']');
            } else {
                out.push(*c as char);
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct WizardMachine {
    screen: WizardScreen,
    menu_index: usize,
    scanned: bool,
    networks: Vec<String>,
    network_index: usize,
    selected_ssid: String,
    editor: PasswordEditor,
    connect_ok: Option<bool>,
    screen_since_ms: Option<u64>,
}

const MENU_ITEMS: usize = 2; // Scan networks, Disconnect

impl Default for WizardMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardMachine {
    pub fn new() -> Self {
        Self {
            screen: WizardScreen::Menu,
            menu_index: 0,
            scanned: false,
            networks: Vec::new(),
            network_index: 0,
            selected_ssid: String::new(),
            editor: PasswordEditor::new(),
            connect_ok: None,
            screen_since_ms: None,
        }
    }

    /// Called when the outer menu opens the wizard screen.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn screen(&self) -> WizardScreen {
        self.screen
    }

    pub fn menu_index(&self) -> usize {
        self.menu_index
    }

    pub fn selected_ssid(&self) -> &str {
        &self.selected_ssid
    }

    pub fn editor(&self) -> &PasswordEditor {
        &self.editor
    }

    pub fn connect_ok(&self) -> Option<bool> {
        self.connect_ok
    }

    pub fn has_scan_results(&self) -> bool {
        !self.networks.is_empty()
    }

    /// Up to 3 scan entries windowed around the selection, plus the
    /// selection's offset within the window.
    pub fn network_window(&self) -> (&[String], usize) {
        let len = self.networks.len();
        if len <= 3 {
            return (&self.networks[..], self.network_index);
        }
        let start = self.network_index.saturating_sub(1).min(len - 3);
        (&self.networks[start..start + 3], self.network_index - start)
    }

    /// Applies one accepted button press.
    pub fn handle_button(
        &mut self,
        button: Button,
        now_ms: u64,
        config: &ControllerConfig,
    ) -> Option<WizardEffect> {
        match self.screen {
            WizardScreen::Menu => self.handle_menu_button(button, now_ms),
            WizardScreen::ListNetworks => self.handle_list_button(button),
            WizardScreen::SetPassword => self.handle_password_button(button, now_ms, config),
            WizardScreen::ConnectFeedback => self.handle_feedback_button(button),
            WizardScreen::Disconnect => self.handle_disconnect_button(button),
        }
    }

    /// Drives the scan-on-entry flag and the feedback auto-return timers.
    /// Invoked from the periodic control path.
    pub fn tick(&mut self, now_ms: u64, config: &ControllerConfig) -> Option<WizardEffect> {
        match self.screen {
            WizardScreen::ListNetworks if !self.scanned => {
                self.scanned = true;
                Some(WizardEffect::StartScan)
            }
            WizardScreen::ConnectFeedback | WizardScreen::Disconnect => {
                let expired = self
                    .screen_since_ms
                    .is_some_and(|since| now_ms.saturating_sub(since) >= config.feedback_hold_ms);
                if expired {
                    self.goto_menu();
                }
                None
            }
            _ => None,
        }
    }

    /// Network task reports the scan outcome. Ignored unless the list screen
    /// is still up.
    pub fn scan_complete(&mut self, networks: Vec<String>) {
        if self.screen == WizardScreen::ListNetworks {
            self.networks = networks;
            self.network_index = 0;
        }
    }

    /// Network task reports the join outcome; starts the feedback hold.
    pub fn connect_result(&mut self, ok: bool, now_ms: u64) {
        if self.screen == WizardScreen::ConnectFeedback {
            self.connect_ok = Some(ok);
            self.screen_since_ms = Some(now_ms);
        }
    }

    fn handle_menu_button(&mut self, button: Button, now_ms: u64) -> Option<WizardEffect> {
        match button {
            Button::Up => {
                self.menu_index = self.menu_index.saturating_sub(1);
                None
            }
            Button::Down => {
                self.menu_index = (self.menu_index + 1).min(MENU_ITEMS - 1);
                None
            }
            Button::Select => {
                if self.menu_index == 0 {
                    self.enter_list_networks();
                    None
                } else {
                    self.screen = WizardScreen::Disconnect;
                    self.screen_since_ms = Some(now_ms);
                    Some(WizardEffect::Disconnect)
                }
            }
            Button::Esc => Some(WizardEffect::Exit),
        }
    }

    fn handle_list_button(&mut self, button: Button) -> Option<WizardEffect> {
        match button {
            Button::Up => {
                self.network_index = self.network_index.saturating_sub(1);
                None
            }
            Button::Down => {
                if !self.networks.is_empty() {
                    self.network_index = (self.network_index + 1).min(self.networks.len() - 1);
                }
                None
            }
            Button::Select => {
                if let Some(ssid) = self.networks.get(self.network_index) {
                    self.selected_ssid = ssid.clone();
                    self.editor.reset();
                    self.screen = WizardScreen::SetPassword;
                }
                None
            }
            Button::Esc => {
                self.goto_menu();
                None
            }
        }
    }

    fn handle_password_button(
        &mut self,
        button: Button,
        now_ms: u64,
        config: &ControllerConfig,
    ) -> Option<WizardEffect> {
        match button {
            Button::Up => {
                self.editor.cycle(true, now_ms, config);
                None
            }
            Button::Down => {
                self.editor.cycle(false, now_ms, config);
                None
            }
            Button::Select => {
                self.editor.advance();
                None
            }
            Button::Esc => {
                if self.editor.retreat() {
                    return None;
                }
                // Cursor already at column 0: finalize.
                let password = self.editor.password();
                if password.len() >= config.min_password_len {
                    self.screen = WizardScreen::ConnectFeedback;
                    self.connect_ok = None;
                    self.screen_since_ms = None;
                    Some(WizardEffect::Connect {
                        ssid: self.selected_ssid.clone(),
                        password,
                    })
                } else {
                    self.enter_list_networks();
                    None
                }
            }
        }
    }

    fn handle_feedback_button(&mut self, button: Button) -> Option<WizardEffect> {
        if button == Button::Esc {
            // Retry with the buffer as entered.
            self.screen = WizardScreen::SetPassword;
            self.connect_ok = None;
            self.screen_since_ms = None;
        }
        None
    }

    fn handle_disconnect_button(&mut self, button: Button) -> Option<WizardEffect> {
        if button == Button::Esc {
            self.goto_menu();
        }
        None
    }

    fn enter_list_networks(&mut self) {
        self.screen = WizardScreen::ListNetworks;
        self.scanned = false;
        self.networks.clear();
        self.network_index = 0;
    }

    fn goto_menu(&mut self) {
        self.screen = WizardScreen::Menu;
        self.menu_index = 0;
        self.connect_ok = None;
        self.screen_since_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> ControllerConfig {
        ControllerConfig::default()
    }

    fn wizard_on_list(networks: &[&str]) -> WizardMachine {
        let mut wizard = WizardMachine::new();
        wizard.handle_button(Button::Select, 0, &config());
        assert_eq!(wizard.tick(0, &config()), Some(WizardEffect::StartScan));
        wizard.scan_complete(networks.iter().map(|s| s.to_string()).collect());
        wizard
    }

    /// Types `text` by cycling each character and confirming with Select.
    fn type_password(wizard: &mut WizardMachine, text: &str, mut now_ms: u64) -> u64 {
        let config = config();
        for (i, target) in text.bytes().enumerate() {
            loop {
                let current = wizard.editor().render();
                if current.as_bytes()[wizard.editor().cursor() + 1] == target {
                    break;
                }
                now_ms += 1_000; // slow presses, no acceleration
                wizard.handle_button(Button::Up, now_ms, &config);
            }
            if i + 1 < text.len() {
                now_ms += 1_000;
                wizard.handle_button(Button::Select, now_ms, &config);
            }
        }
        now_ms
    }

    #[test]
    fn scan_runs_once_per_list_entry() {
        let config = config();
        let mut wizard = WizardMachine::new();

        wizard.handle_button(Button::Select, 0, &config);
        assert_eq!(wizard.screen(), WizardScreen::ListNetworks);
        assert_eq!(wizard.tick(0, &config), Some(WizardEffect::StartScan));
        assert_eq!(wizard.tick(100, &config), None);

        // Leaving and re-entering re-arms the flag.
        wizard.handle_button(Button::Esc, 200, &config);
        wizard.handle_button(Button::Select, 600, &config);
        assert_eq!(wizard.tick(600, &config), Some(WizardEffect::StartScan));
    }

    #[test]
    fn esc_on_the_wizard_menu_exits() {
        let config = config();
        let mut wizard = WizardMachine::new();

        assert_eq!(
            wizard.handle_button(Button::Esc, 0, &config),
            Some(WizardEffect::Exit)
        );
    }

    #[test]
    fn menu_selection_is_clamped_to_the_two_items() {
        let config = config();
        let mut wizard = WizardMachine::new();

        wizard.handle_button(Button::Up, 0, &config);
        assert_eq!(wizard.menu_index(), 0);
        wizard.handle_button(Button::Down, 400, &config);
        wizard.handle_button(Button::Down, 800, &config);
        assert_eq!(wizard.menu_index(), 1);
    }

    #[test]
    fn selecting_a_network_opens_a_fresh_password_editor() {
        let mut wizard = wizard_on_list(&["home", "shed", "barn"]);

        wizard.handle_button(Button::Down, 400, &config());
        wizard.handle_button(Button::Select, 800, &config());

        assert_eq!(wizard.screen(), WizardScreen::SetPassword);
        assert_eq!(wizard.selected_ssid(), "shed");
        assert_eq!(wizard.editor().cursor(), 0);
        assert_eq!(wizard.editor().render(), "[a]");
    }

    #[test]
    fn network_window_is_centered_on_the_selection() {
        let mut wizard = wizard_on_list(&["n0", "n1", "n2", "n3", "n4"]);

        let (window, offset) = wizard.network_window();
        assert_eq!(window, ["n0", "n1", "n2"]);
        assert_eq!(offset, 0);

        for _ in 0..3 {
            wizard.handle_button(Button::Down, 0, &config());
        }
        let (window, offset) = wizard.network_window();
        assert_eq!(window, ["n2", "n3", "n4"]);
        assert_eq!(offset, 1);

        wizard.handle_button(Button::Down, 0, &config());
        let (window, offset) = wizard.network_window();
        assert_eq!(window, ["n2", "n3", "n4"]);
        assert_eq!(offset, 2);
    }

    #[test]
    fn short_password_is_discarded_back_to_the_network_list() {
        let mut wizard = wizard_on_list(&["home"]);
        wizard.handle_button(Button::Select, 0, &config());

        let now = type_password(&mut wizard, "abc", 1_000);
        // Walk the cursor home, then finalize.
        assert_eq!(wizard.handle_button(Button::Esc, now + 400, &config()), None);
        assert_eq!(wizard.handle_button(Button::Esc, now + 800, &config()), None);
        let effect = wizard.handle_button(Button::Esc, now + 1_200, &config());

        assert_eq!(effect, None);
        assert_eq!(wizard.screen(), WizardScreen::ListNetworks);
        // Fresh entry triggers a rescan.
        assert_eq!(
            wizard.tick(now + 1_300, &config()),
            Some(WizardEffect::StartScan)
        );
    }

    #[test]
    fn long_password_finalizes_into_a_connect_attempt() {
        let mut wizard = wizard_on_list(&["home"]);
        wizard.handle_button(Button::Select, 0, &config());

        let mut now = type_password(&mut wizard, "sunflower", 1_000);
        for _ in 0..8 {
            now += 400;
            wizard.handle_button(Button::Esc, now, &config());
        }
        now += 400;
        let effect = wizard.handle_button(Button::Esc, now, &config());

        assert_eq!(
            effect,
            Some(WizardEffect::Connect {
                ssid: "home".to_string(),
                password: "sunflower".to_string(),
            })
        );
        assert_eq!(wizard.screen(), WizardScreen::ConnectFeedback);
    }

    #[test]
    fn trailing_spaces_are_trimmed_before_the_length_check() {
        let mut wizard = wizard_on_list(&["home"]);
        wizard.handle_button(Button::Select, 0, &config());

        // "abcdef  " is 8 cells but trims to 6: below the minimum.
        let now = type_password(&mut wizard, "abcdef  ", 1_000);
        assert_eq!(wizard.editor().password(), "abcdef");

        let mut now = now;
        for _ in 0..7 {
            now += 400;
            wizard.handle_button(Button::Esc, now, &config());
        }
        let effect = wizard.handle_button(Button::Esc, now + 400, &config());

        assert_eq!(effect, None);
        assert_eq!(wizard.screen(), WizardScreen::ListNetworks);
    }

    #[test]
    fn connect_feedback_esc_retries_and_timeout_returns_to_menu() {
        let config = config();
        let mut wizard = wizard_on_list(&["home"]);
        wizard.handle_button(Button::Select, 0, &config);
        let now = type_password(&mut wizard, "sunflower", 1_000);
        let mut now = now;
        for _ in 0..9 {
            now += 400;
            wizard.handle_button(Button::Esc, now, &config);
        }
        assert_eq!(wizard.screen(), WizardScreen::ConnectFeedback);

        wizard.connect_result(false, now);
        assert_eq!(wizard.connect_ok(), Some(false));

        // Esc goes back to the editor with the buffer intact.
        wizard.handle_button(Button::Esc, now + 400, &config);
        assert_eq!(wizard.screen(), WizardScreen::SetPassword);
        assert_eq!(wizard.editor().password(), "sunflower");

        // Finalize again, succeed, and let the hold expire.
        for _ in 0..1 {
            wizard.handle_button(Button::Esc, now + 800, &config);
        }
        assert_eq!(wizard.screen(), WizardScreen::ConnectFeedback);
        wizard.connect_result(true, now + 1_000);
        wizard.tick(now + 1_000 + config.feedback_hold_ms, &config);
        assert_eq!(wizard.screen(), WizardScreen::Menu);
    }

    #[test]
    fn pending_connect_does_not_auto_return() {
        let config = config();
        let mut wizard = wizard_on_list(&["home"]);
        wizard.handle_button(Button::Select, 0, &config);
        let mut now = type_password(&mut wizard, "sunflower", 1_000);
        for _ in 0..9 {
            now += 400;
            wizard.handle_button(Button::Esc, now, &config);
        }

        // No result yet: the feedback screen must wait indefinitely.
        wizard.tick(now + config.feedback_hold_ms * 10, &config);
        assert_eq!(wizard.screen(), WizardScreen::ConnectFeedback);
    }

    #[test]
    fn disconnect_flows_back_to_the_menu() {
        let config = config();
        let mut wizard = WizardMachine::new();

        wizard.handle_button(Button::Down, 0, &config);
        let effect = wizard.handle_button(Button::Select, 400, &config);
        assert_eq!(effect, Some(WizardEffect::Disconnect));
        assert_eq!(wizard.screen(), WizardScreen::Disconnect);

        wizard.handle_button(Button::Esc, 800, &config);
        assert_eq!(wizard.screen(), WizardScreen::Menu);

        // And via the timeout instead of Esc.
        wizard.handle_button(Button::Down, 1_200, &config);
        wizard.handle_button(Button::Select, 1_600, &config);
        wizard.tick(1_600 + config.feedback_hold_ms, &config);
        assert_eq!(wizard.screen(), WizardScreen::Menu);
    }

    #[test]
    fn held_cycling_accelerates_after_the_threshold() {
        let config = config();
        let mut wizard = wizard_on_list(&["home"]);
        wizard.handle_button(Button::Select, 0, &config);

        // Simulated hold: one accepted press every 301 ms.
        let mut now = 10_000;
        let mut last_char = b'a';
        let mut max_jump = 0usize;
        for _ in 0..14 {
            now += 301;
            wizard.handle_button(Button::Up, now, &config);
            let current = wizard.editor().password().into_bytes()[0];
            let jump = alphabet_distance(last_char, current);
            max_jump = max_jump.max(jump);
            last_char = current;
        }

        assert_eq!(max_jump, usize::from(config.hold_accel_step));

        // A pause resets the hold back to single steps.
        now += 5_000;
        wizard.handle_button(Button::Up, now, &config);
        let current = wizard.editor().password().into_bytes()[0];
        assert_eq!(alphabet_distance(last_char, current), 1);
    }

    fn alphabet_distance(from: u8, to: u8) -> usize {
        let len = PASSWORD_ALPHABET.len();
        let a = PASSWORD_ALPHABET.iter().position(|c| *c == from).unwrap();
        let b = PASSWORD_ALPHABET.iter().position(|c| *c == to).unwrap();
        (b + len - a) % len
    }
}
