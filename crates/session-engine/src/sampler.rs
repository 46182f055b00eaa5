//! Telemetry Sampler
//!
//! While a session is READY, produces one sample set per period. With the
//! engine running the RPM comes from a synthesised `010C` frame pushed through
//! the PID decoder; with the engine off the adapter reports `SEARCHING...`.

use crate::config::EngineConfig;
use crate::lifecycle::SessionTask;
use crate::random::{range_inclusive, RandomSource};
use obd_protocol::{decode_frame, handshake, Pid};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use traffic_log::TrafficEntry;

/// Unit reported for the adapter voltage reading
const VOLTAGE_UNIT: &str = "V";

/// One decoded sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSample {
    /// Request the value answers, e.g. "010C" or "ATRV"
    pub pid: String,
    /// Physical value
    pub value: f64,
    /// Engineering unit
    pub unit: String,
    /// Sample time (Unix ms)
    pub timestamp_ms: u64,
}

impl DecodedSample {
    /// Decode `raw` as the response to `pid`; undecodable frames read as 0
    pub fn from_frame(pid: Pid, raw: &str) -> Self {
        let command = pid.command();
        let outcome = decode_frame(&command, raw);
        if !outcome.is_decoded() {
            debug!("{} response {:?} not decodable ({:?}), reporting 0", command, raw, outcome);
        }
        Self {
            pid: command,
            value: outcome.value_or_zero(),
            unit: pid.unit().to_string(),
            timestamp_ms: traffic_log::unix_time_ms(),
        }
    }

    /// Battery / charging voltage reading
    pub fn voltage(value: f64) -> Self {
        Self {
            pid: handshake::READ_VOLTAGE.to_string(),
            value,
            unit: VOLTAGE_UNIT.to_string(),
            timestamp_ms: traffic_log::unix_time_ms(),
        }
    }
}

/// Output of one sampler tick
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTick {
    /// Exchange appended to the traffic log
    pub entry: TrafficEntry,
    /// Samples replacing the previous ones per PID
    pub samples: Vec<DecodedSample>,
}

impl SampleTick {
    /// Sample for the given request, if present
    pub fn sample(&self, pid: &str) -> Option<&DecodedSample> {
        self.samples.iter().find(|s| s.pid == pid)
    }
}

/// Generates simulated sample sets
pub struct TelemetrySampler {
    idle_rpm_min: u16,
    idle_rpm_max: u16,
    charging_voltage: f64,
    charging_voltage_spread: f64,
    resting_voltage: f64,
    warm_coolant_c: i16,
    cold_coolant_c: i16,
    random: Box<dyn RandomSource>,
}

impl TelemetrySampler {
    /// Create a sampler using the configured simulation bands
    pub fn new(config: &EngineConfig, random: Box<dyn RandomSource>) -> Self {
        Self {
            idle_rpm_min: config.idle_rpm_min,
            idle_rpm_max: config.idle_rpm_max,
            charging_voltage: config.charging_voltage,
            charging_voltage_spread: config.charging_voltage_spread,
            resting_voltage: config.resting_voltage,
            warm_coolant_c: config.warm_coolant_c,
            cold_coolant_c: config.cold_coolant_c,
            random,
        }
    }

    /// Produce one sample set
    pub fn sample(&mut self, engine_running: bool) -> SampleTick {
        if engine_running {
            self.sample_running()
        } else {
            self.sample_stopped()
        }
    }

    fn sample_running(&mut self) -> SampleTick {
        let rpm = range_inclusive(
            self.random.as_mut(),
            self.idle_rpm_min as u32,
            self.idle_rpm_max as u32,
        );
        let encoded = ((rpm * 4).min(u16::MAX as u32) as u16).to_be_bytes();
        let rpm_frame = Pid::Rpm.encode_frame(&encoded);

        let spread = self.random.next_unit() * self.charging_voltage_spread;
        let voltage = round_tenths(self.charging_voltage + spread);

        let samples = vec![
            DecodedSample::from_frame(Pid::Rpm, &rpm_frame),
            DecodedSample::voltage(voltage),
            DecodedSample::from_frame(Pid::CoolantTemp, &coolant_frame(self.warm_coolant_c)),
        ];

        SampleTick {
            entry: TrafficEntry::new(Pid::Rpm.command(), rpm_frame),
            samples,
        }
    }

    fn sample_stopped(&mut self) -> SampleTick {
        let samples = vec![
            DecodedSample::from_frame(Pid::Rpm, handshake::SEARCHING),
            DecodedSample::voltage(self.resting_voltage),
            DecodedSample::from_frame(Pid::CoolantTemp, &coolant_frame(self.cold_coolant_c)),
        ];

        SampleTick {
            entry: TrafficEntry::new(Pid::Rpm.command(), handshake::SEARCHING),
            samples,
        }
    }
}

fn coolant_frame(celsius: i16) -> String {
    let a = (celsius as i32 + 40).clamp(0, 255) as u8;
    Pid::CoolantTemp.encode_frame(&[a])
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Sample on a fixed period until the session leaves READY
pub(crate) async fn run_sampler(task: &SessionTask) {
    let period = task.config.sample_period();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Telemetry sampler started ({} ms period)", task.config.sample_period_ms);

    loop {
        ticker.tick().await;
        if !task.shared.is_ready(task.generation) {
            break;
        }

        let running = task.shared.engine_running.load(Ordering::Acquire);
        let tick = task.sampler.lock().sample(running);
        if !task.shared.commit_sample(task.generation, tick) {
            break;
        }
    }

    info!("Telemetry sampler stopped");
}
