//! Host build: the full control engine against simulated hardware.
//!
//! Sensor waveforms are synthesized, buttons arrive on stdin
//! (`s`/`e`/`u`/`d` + Enter), and actuator/display/network side effects are
//! rendered through `tracing`. The task layout and periods match the device
//! build so the engine behaves identically in both.

use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

use garden_common::{
    actuator_report, menu, screen_lines, sensor_report, settings_report, Button, ControllerConfig,
    Debouncer, DisplayScreen, IrrigationControl, LevelControl, LightingControl, MenuEvent,
    RuntimeConfig, SystemState, WizardEffect, WizardMachine, ENDPOINT_SAVE_SETTINGS,
    ENDPOINT_UPDATE_DATA,
};

#[derive(Clone)]
struct AppState {
    system: Arc<Mutex<SystemState>>,
    wizard: Arc<Mutex<WizardMachine>>,
    config: Arc<ControllerConfig>,
    store: AppStore,
    net_tx: mpsc::Sender<NetRequest>,
}

/// Work handed to the network task so nothing blocks under the state lock.
#[derive(Debug)]
enum NetRequest {
    Wizard(WizardEffect),
    PushSettings,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.settings.sanitize();

    let mut system = SystemState::new(runtime.settings.clone());
    system.wifi_ssid = runtime.network.wifi_ssid.clone();

    let (net_tx, net_rx) = mpsc::channel(16);
    let app_state = AppState {
        system: Arc::new(Mutex::new(system)),
        wizard: Arc::new(Mutex::new(WizardMachine::new())),
        config: Arc::new(runtime.controller.clone()),
        store,
        net_tx,
    };

    spawn_sensor_loop(app_state.clone());
    spawn_control_loop(app_state.clone());
    spawn_actuator_loop(app_state.clone());
    spawn_display_loop(app_state.clone());
    spawn_telemetry_loop(app_state.clone());
    spawn_network_task(app_state.clone(), net_rx);

    info!("garden controller host harness started; buttons: s=Select e=Esc u=Up d=Down");
    run_button_input(app_state).await
}

fn spawn_sensor_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        let climate_every = (app_state.config.climate_sample_interval_ms / 100).max(1);
        let mut tick: u64 = 0;

        loop {
            interval.tick().await;
            tick = tick.wrapping_add(1);

            // Hardware integration point: the device build samples the level
            // ADC and the PIR/LDR inputs here. The host synthesizes a slow
            // fill/drain ramp plus periodic presence and light flips.
            let level_raw = 400 + ((tick % 800) * 4) as u16;
            let presence = tick % 450 < 5;
            let dark = (tick / 600) % 2 == 1;

            let climate = if tick % climate_every == 0 {
                let temperature = 24.0 + ((tick / climate_every) % 50) as f64 * 0.2;
                let humidity = 35.0 - ((tick / climate_every) % 40) as f64 * 0.5;
                Some((temperature, humidity))
            } else {
                None
            };

            let mut system = app_state.system.lock().await;
            system.level_raw = level_raw;
            system.presence_detected = presence;
            system.light_is_dark = dark;
            if let Some((temperature, humidity)) = climate {
                system.update_climate(Some(temperature), Some(humidity));
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        let mut lighting = LightingControl::new();
        let mut level = LevelControl::new();
        let mut irrigation = IrrigationControl::new();

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            {
                let mut system = app_state.system.lock().await;
                system.lamp_on = lighting.evaluate(
                    system.presence_detected,
                    system.light_is_dark,
                    system.lamp_on,
                    now_ms,
                    &app_state.config,
                );

                let decision =
                    level.evaluate(system.level_raw, &system.settings, &app_state.config);
                system.level_percent = decision.percent;
                system.fault_led_on = decision.fault;
                system.pump_on = decision.pump_on;

                system.irrigator_on = irrigation.evaluate(
                    system.temperature,
                    system.humidity,
                    system.level_percent,
                    &system.settings,
                );
            }

            let effect = {
                let mut wizard = app_state.wizard.lock().await;
                wizard.tick(now_ms, &app_state.config)
            };
            if let Some(effect) = effect {
                let _ = app_state.net_tx.send(NetRequest::Wizard(effect)).await;
            }
        }
    });
}

fn spawn_actuator_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        let mut applied: Option<(bool, bool, bool)> = None;
        let mut fault_lit = false;

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let (lamp, pump, irrigator, fault) = {
                let system = app_state.system.lock().await;
                (
                    system.lamp_on,
                    system.pump_on,
                    system.irrigator_on,
                    system.fault_led_on,
                )
            };

            // Hardware integration point: GPIO writes land here on the
            // device. The host logs commanded-state transitions instead.
            if applied != Some((lamp, pump, irrigator)) {
                info!(
                    lamp = on_off(lamp),
                    pump = on_off(pump),
                    irrigator = on_off(irrigator),
                    "actuators applied"
                );
                applied = Some((lamp, pump, irrigator));
            }

            // The blink override lives at the apply layer so a fault is
            // visible regardless of the commanded LED state.
            let lit = fault && (now_ms / app_state.config.fault_blink_ms) % 2 == 0;
            if lit != fault_lit {
                debug!(fault_led = on_off(lit), "fault LED");
                fault_lit = lit;
            }
        }
    });
}

fn spawn_display_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;

            let (screen, lines) = {
                let system = app_state.system.lock().await;
                let wizard = app_state.wizard.lock().await;
                (
                    system.screen,
                    screen_lines(&system, &wizard, &app_state.config),
                )
            };

            let mut frame = String::new();
            for line in &lines {
                frame.push_str(&format!("\n  {:<14}{}", line.label, line.value));
            }
            info!(screen = screen.as_str(), "display{frame}");
        }
    });
}

fn spawn_telemetry_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(app_state.config.telemetry_interval_ms));
        loop {
            interval.tick().await;

            let (connected, sensors, actuators) = {
                let system = app_state.system.lock().await;
                (
                    system.wifi_connected,
                    sensor_report(&system),
                    actuator_report(&system),
                )
            };

            if !connected {
                debug!("telemetry skipped; wifi down");
                continue;
            }

            for payload in [
                serde_json::to_string(&sensors),
                serde_json::to_string(&actuators),
            ] {
                match payload {
                    Ok(body) => post_json(&app_state, ENDPOINT_UPDATE_DATA, &body).await,
                    Err(err) => warn!("telemetry serialization failed: {err}"),
                }
            }
        }
    });
}

fn spawn_network_task(app_state: AppState, mut net_rx: mpsc::Receiver<NetRequest>) {
    tokio::spawn(async move {
        while let Some(request) = net_rx.recv().await {
            match request {
                NetRequest::Wizard(effect) => handle_wizard_effect(&app_state, effect).await,
                NetRequest::PushSettings => push_settings(&app_state).await,
            }
        }
    });
}

async fn handle_wizard_effect(app_state: &AppState, effect: WizardEffect) {
    match effect {
        WizardEffect::StartScan => {
            // Hardware integration point: the device build runs a real
            // station scan here; the host answers with a fixed set.
            tokio::time::sleep(Duration::from_millis(800)).await;
            let networks = vec![
                "greenhouse".to_string(),
                "toolshed-2.4G".to_string(),
                "neighbor".to_string(),
                "barn-iot".to_string(),
            ];
            info!("wifi scan found {} networks", networks.len());
            app_state.wizard.lock().await.scan_complete(networks);
        }
        WizardEffect::Connect { ssid, password } => {
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            // The simulated access point accepts any compliant passphrase.
            let ok = password.len() >= app_state.config.min_password_len;
            info!(ssid = %ssid, ok, "wifi join attempt finished");

            if ok {
                {
                    let mut system = app_state.system.lock().await;
                    system.wifi_connected = true;
                    system.wifi_ssid = ssid.clone();
                }
                persist_credentials(app_state, &ssid, &password).await;
            }
            app_state
                .wizard
                .lock()
                .await
                .connect_result(ok, monotonic_ms());
        }
        WizardEffect::Disconnect => {
            let mut system = app_state.system.lock().await;
            system.wifi_connected = false;
            info!("wifi disconnected");
        }
        WizardEffect::Exit => {
            let mut system = app_state.system.lock().await;
            system.screen = DisplayScreen::WifiStatus;
        }
    }
}

async fn push_settings(app_state: &AppState) {
    let report = {
        let system = app_state.system.lock().await;
        settings_report(&system.settings)
    };
    match serde_json::to_string(&report) {
        Ok(body) => post_json(app_state, ENDPOINT_SAVE_SETTINGS, &body).await,
        Err(err) => warn!("settings serialization failed: {err}"),
    }

    let settings = {
        let system = app_state.system.lock().await;
        system.settings.clone()
    };
    let mut runtime = app_state
        .store
        .load_runtime_config()
        .await
        .unwrap_or_default();
    runtime.settings = settings;
    if let Err(err) = app_state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist settings: {err:#}");
    }
}

/// Hardware integration point: the device build issues a real HTTP POST with
/// retry here (see the esp32 module); the host logs the outgoing document.
async fn post_json(app_state: &AppState, endpoint: &str, body: &str) {
    for attempt in 1..=app_state.config.push_retry_attempts {
        info!(endpoint, attempt, "POST {body}");
        // The simulated transport never fails; a real failure would loop.
        break;
    }
}

async fn persist_credentials(app_state: &AppState, ssid: &str, password: &str) {
    let mut runtime = app_state
        .store
        .load_runtime_config()
        .await
        .unwrap_or_default();
    runtime.network.wifi_ssid = ssid.to_string();
    runtime.network.wifi_pass = password.to_string();
    if let Err(err) = app_state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist wifi credentials: {err:#}");
    }
}

/// Reads stdin lines and replays each character as a debounced button press.
/// Characters within one line are spaced one debounce window apart so held
/// buttons can be exercised (e.g. a line of `u`s).
async fn run_button_input(app_state: AppState) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut debouncer = Debouncer::new(app_state.config.button_debounce_ms);

    while let Some(line) = lines.next_line().await.context("stdin read failed")? {
        let base_ms = monotonic_ms();
        for (i, key) in line.trim().chars().enumerate() {
            let button = match key {
                's' => Button::Select,
                'e' => Button::Esc,
                'u' => Button::Up,
                'd' => Button::Down,
                _ => continue,
            };
            let now_ms = base_ms + i as u64 * (app_state.config.button_debounce_ms + 1);
            if !debouncer.accept(now_ms) {
                continue;
            }
            dispatch_button(&app_state, button, now_ms).await;
        }
    }

    info!("stdin closed; shutting down");
    Ok(())
}

async fn dispatch_button(app_state: &AppState, button: Button, now_ms: u64) {
    let in_wizard = {
        let system = app_state.system.lock().await;
        system.screen == DisplayScreen::WifiWizard
    };

    if in_wizard {
        let effect = {
            let mut wizard = app_state.wizard.lock().await;
            wizard.handle_button(button, now_ms, &app_state.config)
        };
        if let Some(effect) = effect {
            let _ = app_state.net_tx.send(NetRequest::Wizard(effect)).await;
        }
        return;
    }

    let event = {
        let mut system = app_state.system.lock().await;
        menu::handle_button(&mut system, button)
    };
    match event {
        Some(MenuEvent::SettingsCommitted) => {
            let _ = app_state.net_tx.send(NetRequest::PushSettings).await;
        }
        Some(MenuEvent::WizardOpened) => {
            app_state.wizard.lock().await.reset();
        }
        None => {}
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("GARDEN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.garden"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
