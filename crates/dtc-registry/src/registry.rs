//! DTC Registry Implementation

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Fault severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A fault code reported by the ECU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticTroubleCode {
    /// Code such as "P0301"
    pub code: String,
    /// Human readable description
    pub description: String,
    /// Severity
    pub severity: Severity,
}

impl DiagnosticTroubleCode {
    /// Create a new fault code
    pub fn new(code: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            severity,
        }
    }

    /// Build a fault from a bare code using the known-code table
    pub fn from_code(code: &str) -> Self {
        let (description, severity) = describe(code);
        Self::new(code, description, severity)
    }
}

/// Outcome of the last scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "fault", rename_all = "snake_case")]
pub enum ScanResult {
    /// No scan has been recorded
    #[default]
    NotScanned,
    /// A scan completed and reported no codes
    NoFaults,
    /// A scan completed and reported this fault
    Fault(DiagnosticTroubleCode),
}

/// Description and severity for common powertrain codes
pub fn describe(code: &str) -> (&'static str, Severity) {
    match code.to_ascii_uppercase().as_str() {
        "P0300" => ("Random/multiple cylinder misfire detected", Severity::High),
        "P0301" => ("Cylinder 1 misfire detected", Severity::High),
        "P0302" => ("Cylinder 2 misfire detected", Severity::High),
        "P0171" => ("System too lean (bank 1)", Severity::Medium),
        "P0420" => ("Catalyst system efficiency below threshold (bank 1)", Severity::Medium),
        "P0128" => ("Coolant thermostat below regulating temperature", Severity::Low),
        _ => ("Unknown fault code", Severity::Medium),
    }
}

/// Registry holding the current scan result
#[derive(Debug, Clone, Default)]
pub struct DtcRegistry {
    /// Result of the last scan
    result: ScanResult,
    /// Number of faults recorded since creation
    recorded_count: usize,
}

impl DtcRegistry {
    /// Create an empty registry (not scanned)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the single current fault, replacing any previous result
    pub fn record_fault(
        &mut self,
        code: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
    ) -> DiagnosticTroubleCode {
        let dtc = DiagnosticTroubleCode::new(code, description, severity);
        self.recorded_count += 1;
        info!("Fault recorded: {} ({:?})", dtc.code, dtc.severity);
        self.result = ScanResult::Fault(dtc.clone());
        dtc
    }

    /// Record a scan that found no codes
    pub fn record_clean_scan(&mut self) {
        debug!("Scan completed with no fault codes");
        self.result = ScanResult::NoFaults;
    }

    /// Forget the recorded result
    pub fn clear(&mut self) {
        if self.result != ScanResult::NotScanned {
            debug!("Clearing fault registry");
        }
        self.result = ScanResult::NotScanned;
    }

    /// Whether a fault is currently recorded
    pub fn has_fault(&self) -> bool {
        matches!(self.result, ScanResult::Fault(_))
    }

    /// Whether any scan result is recorded
    pub fn is_scanned(&self) -> bool {
        self.result != ScanResult::NotScanned
    }

    /// Current fault, if any
    pub fn current(&self) -> Option<&DiagnosticTroubleCode> {
        match &self.result {
            ScanResult::Fault(dtc) => Some(dtc),
            _ => None,
        }
    }

    /// Current scan result
    pub fn result(&self) -> &ScanResult {
        &self.result
    }

    /// Number of faults recorded since creation
    pub fn recorded_count(&self) -> usize {
        self.recorded_count
    }
}
