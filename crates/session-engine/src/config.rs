//! Engine configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `SCANNER__SAMPLE_PERIOD_MS=500`
pub const ENV_PREFIX: &str = "SCANNER";

/// Highest RPM an `010C` frame can carry
const MAX_ENCODABLE_RPM: u16 = 16383;

/// Diagnostic engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retained traffic log entries (default: 10)
    pub traffic_capacity: usize,
    /// Telemetry sampling period in milliseconds (default: 2000)
    pub sample_period_ms: u64,
    /// LINKING -> PROTOCOL_INIT delay in milliseconds
    pub pairing_delay_ms: u64,
    /// PROTOCOL_INIT -> ECU_SYNC delay in milliseconds
    pub protocol_init_delay_ms: u64,
    /// ECU_SYNC -> READY delay in milliseconds
    pub ecu_sync_delay_ms: u64,
    /// Lowest simulated idle RPM
    pub idle_rpm_min: u16,
    /// Highest simulated idle RPM
    pub idle_rpm_max: u16,
    /// Alternator charging voltage floor (V)
    pub charging_voltage: f64,
    /// Random spread added to the charging voltage (V)
    pub charging_voltage_spread: f64,
    /// Battery voltage with the engine off (V)
    pub resting_voltage: f64,
    /// Coolant temperature with the engine running (°C)
    pub warm_coolant_c: i16,
    /// Coolant temperature with the engine off (°C)
    pub cold_coolant_c: i16,
    /// Log level for the demo binary
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            traffic_capacity: traffic_log::DEFAULT_CAPACITY,
            sample_period_ms: 2000,
            pairing_delay_ms: 800,
            protocol_init_delay_ms: 600,
            ecu_sync_delay_ms: 600,
            idle_rpm_min: 780,
            idle_rpm_max: 920,
            charging_voltage: 14.0,
            charging_voltage_spread: 0.3,
            resting_voltage: 12.4,
            warm_coolant_c: 92,
            cold_coolant_c: 45,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, an optional TOML file and
    /// `SCANNER__*` environment variables, in increasing precedence
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        let config: EngineConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check that the values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.traffic_capacity == 0 {
            return Err(ConfigError::Invalid("traffic_capacity must be at least 1".into()));
        }
        if self.sample_period_ms == 0 {
            return Err(ConfigError::Invalid("sample_period_ms must be positive".into()));
        }
        if self.idle_rpm_min > self.idle_rpm_max {
            return Err(ConfigError::Invalid(format!(
                "idle_rpm_min {} exceeds idle_rpm_max {}",
                self.idle_rpm_min, self.idle_rpm_max
            )));
        }
        if self.idle_rpm_max > MAX_ENCODABLE_RPM {
            return Err(ConfigError::Invalid(format!(
                "idle_rpm_max {} exceeds {}",
                self.idle_rpm_max, MAX_ENCODABLE_RPM
            )));
        }
        if self.charging_voltage_spread.is_nan() || self.charging_voltage_spread < 0.0 {
            return Err(ConfigError::Invalid("charging_voltage_spread must be non-negative".into()));
        }
        for (field, value) in [
            ("warm_coolant_c", self.warm_coolant_c),
            ("cold_coolant_c", self.cold_coolant_c),
        ] {
            if !(-40..=215).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} {value} is outside the encodable range [-40, 215]"
                )));
            }
        }
        Ok(())
    }

    /// Sampling period
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// Total time from `start_session` to READY
    pub fn handshake_duration(&self) -> Duration {
        Duration::from_millis(
            self.pairing_delay_ms + self.protocol_init_delay_ms + self.ecu_sync_delay_ms,
        )
    }
}
