//! ESP32 build: the control engine wired to the shield hardware.
//!
//! Five named threads mirror the host harness: sensor sampling, control
//! decisions, actuator apply, display refresh, and network work (WiFi
//! scan/connect for the wizard plus backend HTTP sync). The shared state
//! lock is held only for short read-modify-write sections; all network and
//! bus I/O happens outside it.

use std::{
    sync::{mpsc, Arc, Mutex, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::dht11;
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::attenuation::DB_11,
    adc::oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
    delay::Ets,
    gpio::{PinDriver, Pull},
    i2c::{I2cConfig, I2cDriver},
    prelude::*,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::prelude::Peripherals,
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use ssd1306::{
    mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306,
};

use garden_common::{
    actuator_report, apply_settings_json, menu, screen_lines, sensor_report, settings_report,
    Button, ControllerConfig, Debouncer, DisplayScreen, IrrigationControl, LevelControl,
    LightingControl, MenuEvent, RuntimeConfig, SystemState, WizardEffect, WizardMachine,
    ENDPOINT_GET_SETTINGS, ENDPOINT_SAVE_SETTINGS, ENDPOINT_UPDATE_DATA,
};

const NVS_NAMESPACE: &str = "garden";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const MAX_HTTP_BODY: usize = 4096;

#[derive(Clone)]
struct SharedState {
    system: Arc<Mutex<SystemState>>,
    wizard: Arc<Mutex<WizardMachine>>,
    config: Arc<ControllerConfig>,
}

/// Work handed to the network thread so nothing blocks under the state lock.
#[derive(Debug)]
enum NetRequest {
    Wizard(WizardEffect),
    PushSettings,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
        lock: Arc::new(Mutex::new(())),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.settings.sanitize();

    info!(
        "NVS config loaded: ssid=`{}`, server=`{}`",
        runtime.network.wifi_ssid, runtime.network.server_url
    );

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let mut system = SystemState::new(runtime.settings.clone());
    system.wifi_ssid = runtime.network.wifi_ssid.clone();

    let state = SharedState {
        system: Arc::new(Mutex::new(system)),
        wizard: Arc::new(Mutex::new(WizardMachine::new())),
        config: Arc::new(runtime.controller.clone()),
    };

    let wifi = connect_wifi(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs_partition))?,
        sys_loop,
        &runtime.network,
    )?;
    {
        let mut system = state.system.lock().unwrap();
        system.wifi_connected = wifi_is_connected(&wifi);
    }

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;

    let (net_tx, net_rx) = mpsc::channel::<NetRequest>();

    spawn_sensor_thread(
        state.clone(),
        net_tx.clone(),
        SensorPins {
            adc1: peripherals.adc1,
            level: pins.gpio36,
            climate: pins.gpio25,
            light: pins.gpio5,
            pir: pins.gpio13,
            btn_select: pins.gpio33,
            btn_esc: pins.gpio32,
            btn_up: pins.gpio27,
            btn_down: pins.gpio26,
        },
    );
    spawn_control_thread(state.clone(), net_tx);
    spawn_actuator_thread(
        state.clone(),
        ActuatorPins {
            fault_led: pins.gpio14,
            irrigator: pins.gpio4,
            pump: pins.gpio2,
            lamp: pins.gpio12,
        },
    );
    spawn_display_thread(state.clone(), peripherals.i2c0, pins.gpio21, pins.gpio22);
    spawn_network_thread(state, nvs_store, runtime.network.clone(), wifi, net_rx);

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

struct SensorPins {
    adc1: esp_idf_hal::adc::ADC1,
    level: esp_idf_hal::gpio::Gpio36,
    climate: esp_idf_hal::gpio::Gpio25,
    light: esp_idf_hal::gpio::Gpio5,
    pir: esp_idf_hal::gpio::Gpio13,
    btn_select: esp_idf_hal::gpio::Gpio33,
    btn_esc: esp_idf_hal::gpio::Gpio32,
    btn_up: esp_idf_hal::gpio::Gpio27,
    btn_down: esp_idf_hal::gpio::Gpio26,
}

fn spawn_sensor_thread(state: SharedState, net_tx: mpsc::Sender<NetRequest>, pins: SensorPins) {
    thread::Builder::new()
        .name("sensors".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            if let Err(err) = sensor_loop(state, net_tx, pins) {
                warn!("sensor loop terminated: {err:#}");
            }
        })
        .expect("failed to spawn sensor thread");
}

fn sensor_loop(
    state: SharedState,
    net_tx: mpsc::Sender<NetRequest>,
    pins: SensorPins,
) -> anyhow::Result<()> {
    let adc = AdcDriver::new(pins.adc1)?;
    let level_config = AdcChannelConfig {
        attenuation: DB_11,
        ..Default::default()
    };
    let mut level = AdcChannelDriver::new(&adc, pins.level, &level_config)?;

    let light = PinDriver::input(pins.light)?;
    let pir = PinDriver::input(pins.pir)?;

    let mut btn_select = PinDriver::input(pins.btn_select)?;
    let mut btn_esc = PinDriver::input(pins.btn_esc)?;
    let mut btn_up = PinDriver::input(pins.btn_up)?;
    let mut btn_down = PinDriver::input(pins.btn_down)?;
    btn_select.set_pull(Pull::Up)?;
    btn_esc.set_pull(Pull::Up)?;
    btn_up.set_pull(Pull::Up)?;
    btn_down.set_pull(Pull::Up)?;

    let mut climate = PinDriver::input_output_od(pins.climate)?;
    climate.set_high()?;

    let mut debouncer = Debouncer::new(state.config.button_debounce_ms);
    let mut last_climate_ms = 0_u64;

    loop {
        let now_ms = monotonic_ms();

        let level_raw = match adc.read(&mut level) {
            Ok(raw) => Some(raw),
            Err(err) => {
                warn!("level ADC read failed: {err}");
                None
            }
        };
        let dark = light.is_high();
        let presence = pir.is_high();

        {
            let mut system = state.system.lock().unwrap();
            if let Some(raw) = level_raw {
                system.level_raw = raw;
            }
            system.light_is_dark = dark;
            system.presence_detected = presence;
        }

        // The DHT11 cannot be polled faster than its 2 s cycle; invalid
        // frames keep the previous reading.
        if now_ms.saturating_sub(last_climate_ms) >= state.config.climate_sample_interval_ms {
            last_climate_ms = now_ms;
            let reading = dht11::Reading::read(&mut Ets, &mut climate);
            let mut system = state.system.lock().unwrap();
            match reading {
                Ok(sample) => system.update_climate(
                    Some(f64::from(sample.temperature)),
                    Some(f64::from(sample.relative_humidity)),
                ),
                Err(err) => {
                    warn!("DHT11 read failed: {err:?}");
                    system.update_climate(None, None);
                }
            }
        }

        // Buttons are active-low; a single gate debounces all four.
        for (pressed, button) in [
            (btn_select.is_low(), Button::Select),
            (btn_esc.is_low(), Button::Esc),
            (btn_up.is_low(), Button::Up),
            (btn_down.is_low(), Button::Down),
        ] {
            if pressed && debouncer.accept(now_ms) {
                dispatch_button(&state, &net_tx, button, now_ms);
            }
        }

        thread::sleep(Duration::from_millis(100));
    }
}

fn dispatch_button(
    state: &SharedState,
    net_tx: &mpsc::Sender<NetRequest>,
    button: Button,
    now_ms: u64,
) {
    let in_wizard = {
        let system = state.system.lock().unwrap();
        system.screen == DisplayScreen::WifiWizard
    };

    if in_wizard {
        let effect = {
            let mut wizard = state.wizard.lock().unwrap();
            wizard.handle_button(button, now_ms, &state.config)
        };
        if let Some(effect) = effect {
            let _ = net_tx.send(NetRequest::Wizard(effect));
        }
        return;
    }

    let event = {
        let mut system = state.system.lock().unwrap();
        menu::handle_button(&mut system, button)
    };
    match event {
        Some(MenuEvent::SettingsCommitted) => {
            let _ = net_tx.send(NetRequest::PushSettings);
        }
        Some(MenuEvent::WizardOpened) => {
            state.wizard.lock().unwrap().reset();
        }
        None => {}
    }
}

fn spawn_control_thread(state: SharedState, net_tx: mpsc::Sender<NetRequest>) {
    thread::Builder::new()
        .name("control".into())
        .stack_size(12 * 1024)
        .spawn(move || {
            if let Err(err) = add_current_task_to_watchdog() {
                warn!("failed to register control loop with watchdog: {err:#}");
            }

            let mut lighting = LightingControl::new();
            let mut level = LevelControl::new();
            let mut irrigation = IrrigationControl::new();

            loop {
                feed_watchdog();
                let now_ms = monotonic_ms();

                {
                    let mut system = state.system.lock().unwrap();
                    system.lamp_on = lighting.evaluate(
                        system.presence_detected,
                        system.light_is_dark,
                        system.lamp_on,
                        now_ms,
                        &state.config,
                    );

                    let decision =
                        level.evaluate(system.level_raw, &system.settings, &state.config);
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
                    let mut wizard = state.wizard.lock().unwrap();
                    wizard.tick(now_ms, &state.config)
                };
                if let Some(effect) = effect {
                    let _ = net_tx.send(NetRequest::Wizard(effect));
                }

                thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("failed to spawn control thread");
}

struct ActuatorPins {
    fault_led: esp_idf_hal::gpio::Gpio14,
    irrigator: esp_idf_hal::gpio::Gpio4,
    pump: esp_idf_hal::gpio::Gpio2,
    lamp: esp_idf_hal::gpio::Gpio12,
}

fn spawn_actuator_thread(state: SharedState, pins: ActuatorPins) {
    thread::Builder::new()
        .name("actuators".into())
        .stack_size(4 * 1024)
        .spawn(move || {
            if let Err(err) = actuator_loop(state, pins) {
                warn!("actuator loop terminated: {err:#}");
            }
        })
        .expect("failed to spawn actuator thread");
}

fn actuator_loop(state: SharedState, pins: ActuatorPins) -> anyhow::Result<()> {
    let mut fault_led = PinDriver::output(pins.fault_led)?;
    let mut irrigator = PinDriver::output(pins.irrigator)?;
    let mut pump = PinDriver::output(pins.pump)?;
    let mut lamp = PinDriver::output(pins.lamp)?;

    loop {
        let now_ms = monotonic_ms();
        let (lamp_on, pump_on, irrigator_on, fault_on) = {
            let system = state.system.lock().unwrap();
            (
                system.lamp_on,
                system.pump_on,
                system.irrigator_on,
                system.fault_led_on,
            )
        };

        lamp.set_level(lamp_on.into())?;
        pump.set_level(pump_on.into())?;
        irrigator.set_level(irrigator_on.into())?;

        // Blink override at the apply layer: a commanded fault shows as a
        // 500 ms blink regardless of the commanded LED level.
        let lit = fault_on && (now_ms / state.config.fault_blink_ms) % 2 == 0;
        fault_led.set_level(lit.into())?;

        thread::sleep(Duration::from_millis(100));
    }
}

fn spawn_display_thread(
    state: SharedState,
    i2c: esp_idf_hal::i2c::I2C0,
    sda: esp_idf_hal::gpio::Gpio21,
    scl: esp_idf_hal::gpio::Gpio22,
) {
    thread::Builder::new()
        .name("display".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            if let Err(err) = display_loop(state, i2c, sda, scl) {
                warn!("display loop terminated: {err:#}");
            }
        })
        .expect("failed to spawn display thread");
}

fn display_loop(
    state: SharedState,
    i2c: esp_idf_hal::i2c::I2C0,
    sda: esp_idf_hal::gpio::Gpio21,
    scl: esp_idf_hal::gpio::Gpio22,
) -> anyhow::Result<()> {
    let config = I2cConfig::new().baudrate(400.kHz().into());
    let i2c = I2cDriver::new(i2c, sda, scl, &config)?;

    let interface = I2CDisplayInterface::new(i2c);
    let mut display: Ssd1306<_, _, BufferedGraphicsMode<DisplaySize128x64>> =
        Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
    display
        .init()
        .map_err(|err| anyhow!("display init failed: {err:?}"))?;

    let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);

    loop {
        let lines = {
            let system = state.system.lock().unwrap();
            let wizard = state.wizard.lock().unwrap();
            screen_lines(&system, &wizard, &state.config)
        };

        display.clear(BinaryColor::Off).ok();
        for (row, line) in lines.iter().enumerate() {
            let y = row as i32 * 10;
            Text::with_baseline(line.label, Point::new(0, y), style, Baseline::Top)
                .draw(&mut display)
                .map_err(|err| anyhow!("display draw failed: {err:?}"))?;
            Text::with_baseline(&line.value, Point::new(80, y), style, Baseline::Top)
                .draw(&mut display)
                .map_err(|err| anyhow!("display draw failed: {err:?}"))?;
        }
        display
            .flush()
            .map_err(|err| anyhow!("display flush failed: {err:?}"))?;

        thread::sleep(Duration::from_secs(1));
    }
}

fn spawn_network_thread(
    state: SharedState,
    nvs_store: NvsStore,
    mut network: garden_common::NetworkConfig,
    mut wifi: BlockingWifi<EspWifi<'static>>,
    net_rx: mpsc::Receiver<NetRequest>,
) {
    thread::Builder::new()
        .name("network".into())
        .stack_size(16 * 1024)
        .spawn(move || {
            // One settings pull at startup; the backend is authoritative for
            // values changed from the web side while we were off.
            if wifi_is_connected(&wifi) {
                pull_settings(&state, &network);
            }

            let mut last_telemetry_ms = 0_u64;

            loop {
                match net_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(NetRequest::Wizard(effect)) => {
                        handle_wizard_effect(&state, &nvs_store, &mut network, &mut wifi, effect);
                    }
                    Ok(NetRequest::PushSettings) => {
                        push_settings(&state, &nvs_store, &network);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => return,
                }

                let now_ms = monotonic_ms();
                let connected = wifi_is_connected(&wifi);
                {
                    let mut system = state.system.lock().unwrap();
                    system.wifi_connected = connected;
                }

                if connected
                    && now_ms.saturating_sub(last_telemetry_ms)
                        >= state.config.telemetry_interval_ms
                {
                    last_telemetry_ms = now_ms;
                    push_telemetry(&state, &network);
                }
            }
        })
        .expect("failed to spawn network thread");
}

fn handle_wizard_effect(
    state: &SharedState,
    nvs_store: &NvsStore,
    network: &mut garden_common::NetworkConfig,
    wifi: &mut BlockingWifi<EspWifi<'static>>,
    effect: WizardEffect,
) {
    match effect {
        WizardEffect::StartScan => {
            let ssids = match wifi.scan() {
                Ok(access_points) => access_points
                    .into_iter()
                    .map(|ap| ap.ssid.to_string())
                    .filter(|ssid| !ssid.is_empty())
                    .collect(),
                Err(err) => {
                    warn!("wifi scan failed: {err:#}");
                    Vec::new()
                }
            };
            info!("wifi scan found {} networks", ssids.len());
            state.wizard.lock().unwrap().scan_complete(ssids);
        }
        WizardEffect::Connect { ssid, password } => {
            let ok = join_station(wifi, &ssid, &password, &state.config).is_ok();
            info!("wifi join `{ssid}`: {}", if ok { "connected" } else { "failed" });

            if ok {
                network.wifi_ssid = ssid.clone();
                network.wifi_pass = password;
                save_network(nvs_store, network);

                let mut system = state.system.lock().unwrap();
                system.wifi_connected = true;
                system.wifi_ssid = ssid;
            }
            state
                .wizard
                .lock()
                .unwrap()
                .connect_result(ok, monotonic_ms());
        }
        WizardEffect::Disconnect => {
            if let Err(err) = wifi.disconnect() {
                warn!("wifi disconnect failed: {err:#}");
            }
            let mut system = state.system.lock().unwrap();
            system.wifi_connected = false;
        }
        WizardEffect::Exit => {
            let mut system = state.system.lock().unwrap();
            system.screen = DisplayScreen::WifiStatus;
        }
    }
}

fn join_station(
    wifi: &mut BlockingWifi<EspWifi<'static>>,
    ssid: &str,
    password: &str,
    config: &ControllerConfig,
) -> anyhow::Result<()> {
    let _ = wifi.disconnect();

    let auth_method = if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow!("ssid too long"))?,
        password: password
            .try_into()
            .map_err(|_| anyhow!("password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    if !wifi.is_started()? {
        wifi.start()?;
    }
    wifi.connect()?;

    // Bounded wait so a wrong password comes back as feedback instead of
    // stalling the wizard.
    let deadline = Instant::now() + Duration::from_millis(config.wifi_connect_timeout_ms);
    while !wifi.is_connected().unwrap_or(false) {
        if Instant::now() >= deadline {
            let _ = wifi.disconnect();
            return Err(anyhow!("join timed out"));
        }
        thread::sleep(Duration::from_millis(200));
    }
    wifi.wait_netif_up()?;
    Ok(())
}

fn connect_wifi(
    esp_wifi: EspWifi<'static>,
    sys_loop: EspSystemEventLoop,
    network: &garden_common::NetworkConfig,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    if !network.has_credentials() {
        // No stored credentials: start the radio so the wizard can scan,
        // and leave provisioning to the on-device UI.
        warn!("wifi credentials missing; waiting for on-device provisioning");
        wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        wifi.start()?;
        return Ok(wifi);
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                return Ok(wifi);
            }
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                let _ = wifi.disconnect();
                if attempt < WIFI_CONNECT_ATTEMPTS {
                    thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
                }
            }
        }
    }

    // Degrade to offline operation; the wizard can re-provision later.
    warn!("all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; running offline");
    Ok(wifi)
}

fn wifi_is_connected(wifi: &BlockingWifi<EspWifi<'static>>) -> bool {
    wifi.is_connected().unwrap_or(false)
}

fn pull_settings(state: &SharedState, network: &garden_common::NetworkConfig) {
    let url = format!("{}{}", network.server_url, ENDPOINT_GET_SETTINGS);
    match http_get(&url) {
        Ok(body) => {
            let mut system = state.system.lock().unwrap();
            match apply_settings_json(&mut system.settings, &body) {
                Ok(true) => info!("settings updated from backend"),
                Ok(false) => {}
                Err(err) => warn!("backend settings rejected: {err}"),
            }
        }
        Err(err) => warn!("settings pull failed: {err:#}"),
    }
}

fn push_settings(state: &SharedState, nvs_store: &NvsStore, network: &garden_common::NetworkConfig) {
    let (report, settings) = {
        let system = state.system.lock().unwrap();
        (settings_report(&system.settings), system.settings.clone())
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_default();
    runtime.settings = settings;
    if let Err(err) = nvs_store.save_runtime_config(&runtime) {
        warn!("failed to persist settings to NVS: {err:#}");
    }

    match serde_json::to_vec(&report) {
        Ok(body) => {
            let url = format!("{}{}", network.server_url, ENDPOINT_SAVE_SETTINGS);
            post_with_retry(state, &url, &body);
        }
        Err(err) => warn!("settings serialization failed: {err}"),
    }
}

fn push_telemetry(state: &SharedState, network: &garden_common::NetworkConfig) {
    let (sensors, actuators) = {
        let system = state.system.lock().unwrap();
        (sensor_report(&system), actuator_report(&system))
    };

    let url = format!("{}{}", network.server_url, ENDPOINT_UPDATE_DATA);
    for payload in [
        serde_json::to_vec(&sensors),
        serde_json::to_vec(&actuators),
    ] {
        match payload {
            Ok(body) => post_with_retry(state, &url, &body),
            Err(err) => warn!("telemetry serialization failed: {err}"),
        }
    }
}

fn post_with_retry(state: &SharedState, url: &str, body: &[u8]) {
    for attempt in 1..=state.config.push_retry_attempts {
        match http_post(url, body) {
            Ok(status) if (200..300).contains(&status) => return,
            Ok(status) => warn!("POST {url} returned {status} (attempt {attempt})"),
            Err(err) => warn!("POST {url} failed (attempt {attempt}): {err:#}"),
        }
        if attempt < state.config.push_retry_attempts {
            thread::sleep(Duration::from_millis(state.config.push_retry_delay_ms));
        }
    }
}

fn http_post(url: &str, body: &[u8]) -> anyhow::Result<u16> {
    let connection = EspHttpConnection::new(&HttpClientConfiguration {
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    })?;
    let mut client = HttpClient::wrap(connection);

    let content_length = body.len().to_string();
    let headers = [
        ("content-type", "application/json"),
        ("content-length", content_length.as_str()),
    ];
    let mut request = client
        .request(Method::Post, url, &headers)
        .context("failed to open POST request")?;
    request.write_all(body)?;
    request.flush()?;

    let response = request.submit()?;
    Ok(response.status())
}

fn http_get(url: &str) -> anyhow::Result<String> {
    let connection = EspHttpConnection::new(&HttpClientConfiguration {
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    })?;
    let mut client = HttpClient::wrap(connection);

    let request = client.get(url).context("failed to open GET request")?;
    let mut response = request.submit()?;

    let mut body = vec![0_u8; MAX_HTTP_BODY];
    let mut read_total = 0;
    loop {
        let read = response.read(&mut body[read_total..])?;
        if read == 0 {
            break;
        }
        read_total += read;
        if read_total == body.len() {
            break;
        }
    }
    body.truncate(read_total);
    String::from_utf8(body).context("non utf8 response body")
}

fn save_network(nvs_store: &NvsStore, network: &garden_common::NetworkConfig) {
    let mut runtime = nvs_store.load_runtime_config().unwrap_or_default();
    runtime.network = network.clone();
    if let Err(err) = nvs_store.save_runtime_config(&runtime) {
        warn!("failed to persist wifi credentials: {err:#}");
    }
}

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
    lock: Arc<Mutex<()>>,
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().unwrap();
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }

    fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let payload = serde_json::to_string(runtime)?;
        nvs.set_str(NVS_RUNTIME_KEY, &payload)?;
        Ok(())
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
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
