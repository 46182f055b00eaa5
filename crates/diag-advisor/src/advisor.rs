//! Advisor trait and the fault-tolerant wrapper the UI calls

use crate::error::AdvisorError;
use crate::explanation::{Explanation, ProbableCause, TechnicalSpecs};
use async_trait::async_trait;
use dtc_registry::describe;
use tracing::{debug, warn};

/// Tip shown when the advisor cannot answer
pub const FALLBACK_TIP: &str =
    "Check the connections and the physical condition of the part for visible damage.";

/// External knowledge source for trouble codes
#[async_trait]
pub trait DiagnosticAdvisor: Send + Sync {
    /// Structured explanation of `code`
    async fn explain_code(&self, code: &str) -> Result<Explanation, AdvisorError>;

    /// Short inspection tip for `part` given `code`
    async fn workshop_tip(&self, code: &str, part: &str) -> Result<String, AdvisorError>;
}

/// Wrapper that turns advisor failures into "no data" or a fallback tip
pub struct Advisor<A> {
    inner: A,
}

impl<A: DiagnosticAdvisor> Advisor<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    /// Explanation for `code`, or `None` if the advisor failed
    pub async fn explain(&self, code: &str) -> Option<Explanation> {
        match self.inner.explain_code(code).await {
            Ok(explanation) => Some(explanation),
            Err(e) => {
                warn!("No explanation for {}: {}", code, e);
                None
            }
        }
    }

    /// Workshop tip, falling back to [`FALLBACK_TIP`]
    pub async fn tip(&self, code: &str, part: &str) -> String {
        match self.inner.workshop_tip(code, part).await {
            Ok(tip) if !tip.trim().is_empty() => tip,
            Ok(_) => {
                debug!("Empty tip for {} / {}", code, part);
                FALLBACK_TIP.to_string()
            }
            Err(e) => {
                warn!("No workshop tip for {} / {}: {}", code, part, e);
                FALLBACK_TIP.to_string()
            }
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

/// Offline advisor answering from the built-in code table
#[derive(Debug, Clone, Default)]
pub struct LocalAdvisor;

#[async_trait]
impl DiagnosticAdvisor for LocalAdvisor {
    async fn explain_code(&self, code: &str) -> Result<Explanation, AdvisorError> {
        let (description, severity) = describe(code);
        Ok(Explanation {
            code: code.to_string(),
            explanation: format!("{description} (severity {severity:?})"),
            technical_specs: TechnicalSpecs {
                tool: "Scan tool".into(),
                reference_value: "No stored codes after clearing".into(),
                procedure: "Clear the code, drive one cycle and rescan".into(),
            },
            causes: vec![ProbableCause {
                part: "Wiring and connectors".into(),
                probability: 50.0,
                reason: "Most common cause of intermittent codes".into(),
            }],
            repair_steps: vec![
                "Inspect the related wiring harness".into(),
                "Clear the code and rescan".into(),
            ],
        })
    }

    async fn workshop_tip(&self, _code: &str, _part: &str) -> Result<String, AdvisorError> {
        Err(AdvisorError::Unavailable("no tips offline".into()))
    }
}
