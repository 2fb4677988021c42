//! The three periodic control loops.
//!
//! Each loop is a small engine: pure given (raw inputs, retained state,
//! settings) -> new commanded state, with explicit hysteresis so commands do
//! not chatter around a single threshold. Time enters only through a
//! caller-supplied monotonic `now_ms`, never read inside the engine. None of
//! the loops returns an error: untrustworthy sensor input collapses into a
//! fail-safe actuator state instead.

use crate::config::{ControllerConfig, PersistedSettings};

/// Lamp policy: presence wins immediately, darkness keeps the lamp lit, and
/// a cooldown window bridges short absences so the lamp does not cut out the
/// moment someone steps away in a dark room.
#[derive(Debug, Clone, Default)]
pub struct LightingControl {
    presence_active: bool,
    cooldown_started_ms: Option<u64>,
}

impl LightingControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// The presence latch, as shown on the status screen. Stays set through
    /// the cooldown window after the PIR goes inactive.
    pub fn presence_active(&self) -> bool {
        self.presence_active
    }

    /// Returns the new lamp command.
    pub fn evaluate(
        &mut self,
        presence: bool,
        dark: bool,
        lamp_on: bool,
        now_ms: u64,
        config: &ControllerConfig,
    ) -> bool {
        if presence {
            // Presence turns the lamp on immediately and re-arms the window.
            self.presence_active = true;
            self.cooldown_started_ms = None;
            return true;
        }

        if dark && !lamp_on {
            return true;
        }

        if !dark && !self.presence_active {
            self.cooldown_started_ms = None;
            return false;
        }

        if self.presence_active && self.cooldown_started_ms.is_none() {
            // Falling edge of presence: start the grace window.
            self.cooldown_started_ms = Some(now_ms);
            return lamp_on;
        }

        if let Some(started_ms) = self.cooldown_started_ms {
            if now_ms.saturating_sub(started_ms) >= config.presence_cooldown_ms {
                self.presence_active = false;
                self.cooldown_started_ms = None;
                // Darkness still demands the lamp even after the window.
                return dark && lamp_on;
            }
        }

        lamp_on
    }
}

/// Outcome of one level-loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDecision {
    pub percent: u16,
    pub fault: bool,
    pub pump_on: bool,
}

/// Cistern policy: fault window first, then min/max hysteresis with a dead
/// band that holds the previous pump command.
#[derive(Debug, Clone, Default)]
pub struct LevelControl {
    pump_on: bool,
}

impl LevelControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        raw: u16,
        settings: &PersistedSettings,
        config: &ControllerConfig,
    ) -> LevelDecision {
        let percent = level_percent(raw, config);

        // Outside the calibrated window the probe cannot be trusted; the
        // fault check must override any percentage-based decision.
        if raw >= config.level_open_circuit || raw <= config.level_short_circuit {
            self.pump_on = false;
            return LevelDecision {
                percent,
                fault: true,
                pump_on: false,
            };
        }

        LevelDecision {
            percent,
            fault: false,
            pump_on: self.decide_pump(percent, settings),
        }
    }

    fn decide_pump(&mut self, percent: u16, settings: &PersistedSettings) -> bool {
        if percent <= u16::from(settings.min_level_pct) {
            self.pump_on = true;
        } else if percent >= u16::from(settings.max_level_pct) {
            self.pump_on = false;
        }
        self.pump_on
    }
}

/// Maps a raw probe reading onto [0, 100], saturating at both calibration
/// endpoints so the result is monotonic across the whole valid window.
pub fn level_percent(raw: u16, config: &ControllerConfig) -> u16 {
    let floor = config.level_short_circuit + config.level_threshold;
    let ceiling = config.level_open_circuit - config.level_threshold;
    if raw <= floor {
        return 0;
    }

    let span = u32::from(ceiling - floor);
    let percent = u32::from(raw - floor) * 100 / span;
    percent.min(100) as u16
}

/// Irrigation policy: hot AND dry AND enough water turns the valve on; the
/// off band sits 2 degrees / 5 points past the thresholds so a marginal
/// reading cannot produce short bursts. When neither band matches the valve
/// is held off.
#[derive(Debug, Clone, Default)]
pub struct IrrigationControl {
    irrigator_on: bool,
}

impl IrrigationControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        temperature: f64,
        humidity: f64,
        level_percent: u16,
        settings: &PersistedSettings,
    ) -> bool {
        let hot = f64::from(settings.hot_temp_c);
        let dry = f64::from(settings.low_humidity_pct);

        if temperature >= hot
            && humidity <= dry
            && level_percent >= u16::from(settings.min_level_pct)
        {
            self.irrigator_on = true;
        } else if temperature < hot - 2.0 || humidity > dry + 5.0 {
            self.irrigator_on = false;
        } else {
            // Never irrigate on an ambiguous reading.
            self.irrigator_on = false;
        }

        self.irrigator_on
    }
}
