//! Diagnostic Advisor Boundary
//!
//! Explanations and workshop tips for trouble codes come from an external
//! advisor. Its failures surface as "no data" or a fixed fallback tip.

mod advisor;
mod error;
mod explanation;

pub use advisor::{Advisor, DiagnosticAdvisor, LocalAdvisor, FALLBACK_TIP};
pub use error::AdvisorError;
pub use explanation::{parse_explanation, Explanation, ProbableCause, TechnicalSpecs};
