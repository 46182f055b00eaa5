//! Deterministic collaborators for tests and demos

use crate::random::RandomSource;
use obd_protocol::{Adapter, ObdError, SimulatedAdapter};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Random source replaying a fixed sequence of values, cycling at the end
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    next: usize,
}

impl SequenceRandom {
    /// Values are clamped into `[0, 1)`; an empty sequence always yields 0
    pub fn new(values: Vec<f64>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0 - f64::EPSILON))
            .collect();
        Self { values, next: 0 }
    }
}

impl RandomSource for SequenceRandom {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}

/// Simulated adapter that fails chosen commands and records what it was sent
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    inner: SimulatedAdapter,
    failures: HashMap<String, ObdError>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    /// Behaves like [`SimulatedAdapter`] until told otherwise
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `error`
    pub fn fail_on(mut self, command: &str, error: ObdError) -> Self {
        self.failures.insert(command.to_ascii_uppercase(), error);
        self
    }

    /// Replace the Mode 03 answer
    pub fn with_dtc_response(mut self, response: &str) -> Self {
        self.inner = self.inner.with_dtc_response(response);
        self
    }

    /// Commands received so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl Adapter for ScriptedAdapter {
    fn exchange(&self, command: &str) -> Result<String, ObdError> {
        self.sent.lock().push(command.to_string());
        match self.failures.get(&command.trim().to_ascii_uppercase()) {
            Some(error) => Err(error.clone()),
            None => self.inner.exchange(command),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
