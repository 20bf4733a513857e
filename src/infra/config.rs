//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument; a missing
//! or unparseable file falls back to built-in defaults with a warning.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    pub device: String,
    pub baud: u32,
    /// Pause between ingestion polls (the scanner is drained once per tick)
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Backoff between reopen attempts when the scanner is unplugged
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_reconnect_backoff_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModbusConfig {
    pub addr: String,
    /// Global ceiling on any single Modbus operation, including connect
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
    pub gate_coil: u16,
    pub gate_dwell_ms: u64,
}

fn default_op_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct CounterConfig {
    #[serde(default = "default_counter_poll_secs")]
    pub poll_interval_secs: u64,
    /// Input registers holding the in/out totalizer values
    pub in_total_register: u16,
    pub out_total_register: u16,
    /// Start of the baseline holding-register pair written at realignment
    pub baseline_register: u16,
    pub save_coil: u16,
    pub reset_in_coil: u16,
    pub reset_out_coil: u16,
    #[serde(default = "default_coil_pulse_ms")]
    pub coil_pulse_ms: u64,
}

fn default_counter_poll_secs() -> u64 {
    10
}

fn default_coil_pulse_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Enable the external receipt-lookup check
    #[serde(default)]
    pub online: bool,
    #[serde(default = "default_online_url")]
    pub online_url: String,
    /// Substring whose presence in the lookup response confirms the receipt
    #[serde(default = "default_online_found")]
    pub online_found: String,
    /// Ceiling on the whole lookup round trip
    #[serde(default = "default_online_timeout_secs")]
    pub online_timeout_secs: u64,
    /// When set, the duplicate-use check is skipped entirely
    #[serde(default)]
    pub allow_duplicates: bool,
    /// Maximum age of a receipt (issue to arrival) in seconds
    pub window_secs: i64,
    /// Fiscal drive numbers allowed to open the gate
    #[serde(default)]
    pub fiscal_drives: Vec<String>,
}

fn default_online_url() -> String {
    "http://receipt.taxcom.ru/v01/show".to_string()
}

fn default_online_found() -> String {
    "found".to_string()
}

fn default_online_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_watchdog_interval_secs")]
    pub interval_secs: u64,
}

fn default_watchdog_interval_secs() -> u64 {
    10
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { interval_secs: default_watchdog_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "parkgate.sqlite".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub serial: SerialConfig,
    pub modbus: ModbusConfig,
    pub counter: CounterConfig,
    pub validation: ValidationConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    serial_device: String,
    serial_baud: u32,
    scan_interval_ms: u64,
    reconnect_backoff_secs: u64,
    modbus_addr: String,
    modbus_op_timeout_secs: u64,
    gate_coil: u16,
    gate_dwell_ms: u64,
    counter_poll_interval_secs: u64,
    in_total_register: u16,
    out_total_register: u16,
    baseline_register: u16,
    save_coil: u16,
    reset_in_coil: u16,
    reset_out_coil: u16,
    coil_pulse_ms: u64,
    online_enabled: bool,
    online_url: String,
    online_found: String,
    online_timeout_secs: u64,
    allow_duplicates: bool,
    window_secs: i64,
    fiscal_drives: Vec<String>,
    watchdog_interval_secs: u64,
    store_path: String,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_device: "/dev/ttyUSB0".to_string(),
            serial_baud: 9600,
            scan_interval_ms: 1000,
            reconnect_backoff_secs: 5,
            modbus_addr: "192.168.0.60:502".to_string(),
            modbus_op_timeout_secs: 60,
            gate_coil: 0,
            gate_dwell_ms: 700,
            counter_poll_interval_secs: 10,
            in_total_register: 0,
            out_total_register: 1,
            baseline_register: 0,
            save_coil: 1,
            reset_in_coil: 2,
            reset_out_coil: 3,
            coil_pulse_ms: 100,
            online_enabled: false,
            online_url: default_online_url(),
            online_found: default_online_found(),
            online_timeout_secs: 60,
            allow_duplicates: false,
            window_secs: 600,
            fiscal_drives: Vec::new(),
            watchdog_interval_secs: 10,
            store_path: default_store_path(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            serial_device: toml_config.serial.device,
            serial_baud: toml_config.serial.baud,
            scan_interval_ms: toml_config.serial.scan_interval_ms,
            reconnect_backoff_secs: toml_config.serial.reconnect_backoff_secs,
            modbus_addr: toml_config.modbus.addr,
            modbus_op_timeout_secs: toml_config.modbus.op_timeout_secs,
            gate_coil: toml_config.modbus.gate_coil,
            gate_dwell_ms: toml_config.modbus.gate_dwell_ms,
            counter_poll_interval_secs: toml_config.counter.poll_interval_secs,
            in_total_register: toml_config.counter.in_total_register,
            out_total_register: toml_config.counter.out_total_register,
            baseline_register: toml_config.counter.baseline_register,
            save_coil: toml_config.counter.save_coil,
            reset_in_coil: toml_config.counter.reset_in_coil,
            reset_out_coil: toml_config.counter.reset_out_coil,
            coil_pulse_ms: toml_config.counter.coil_pulse_ms,
            online_enabled: toml_config.validation.online,
            online_url: toml_config.validation.online_url,
            online_found: toml_config.validation.online_found,
            online_timeout_secs: toml_config.validation.online_timeout_secs,
            allow_duplicates: toml_config.validation.allow_duplicates,
            window_secs: toml_config.validation.window_secs,
            fiscal_drives: toml_config.validation.fiscal_drives,
            watchdog_interval_secs: toml_config.watchdog.interval_secs,
            store_path: toml_config.store.path,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn modbus_addr(&self) -> &str {
        &self.modbus_addr
    }

    pub fn modbus_op_timeout(&self) -> Duration {
        Duration::from_secs(self.modbus_op_timeout_secs)
    }

    pub fn gate_coil(&self) -> u16 {
        self.gate_coil
    }

    pub fn gate_dwell(&self) -> Duration {
        Duration::from_millis(self.gate_dwell_ms)
    }

    pub fn counter_poll_interval(&self) -> Duration {
        Duration::from_secs(self.counter_poll_interval_secs)
    }

    pub fn in_total_register(&self) -> u16 {
        self.in_total_register
    }

    pub fn out_total_register(&self) -> u16 {
        self.out_total_register
    }

    pub fn baseline_register(&self) -> u16 {
        self.baseline_register
    }

    pub fn save_coil(&self) -> u16 {
        self.save_coil
    }

    pub fn reset_in_coil(&self) -> u16 {
        self.reset_in_coil
    }

    pub fn reset_out_coil(&self) -> u16 {
        self.reset_out_coil
    }

    pub fn coil_pulse(&self) -> Duration {
        Duration::from_millis(self.coil_pulse_ms)
    }

    pub fn online_enabled(&self) -> bool {
        self.online_enabled
    }

    pub fn online_url(&self) -> &str {
        &self.online_url
    }

    pub fn online_found(&self) -> &str {
        &self.online_found
    }

    pub fn online_timeout(&self) -> Duration {
        Duration::from_secs(self.online_timeout_secs)
    }

    pub fn allow_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    pub fn fiscal_drives(&self) -> &[String] {
        &self.fiscal_drives
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
