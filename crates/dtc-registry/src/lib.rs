//! Diagnostic Trouble Code Registry
//!
//! Holds the outcome of the last scan: not scanned, scanned clean, or a fault.

mod registry;

pub use registry::{describe, DiagnosticTroubleCode, DtcRegistry, ScanResult, Severity};
