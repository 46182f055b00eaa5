//! Structured fault explanation returned by an advisor

use crate::error::AdvisorError;
use serde::{Deserialize, Serialize};

/// How to confirm the suspected part is at fault
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TechnicalSpecs {
    /// Recommended tool (e.g. multimeter)
    pub tool: String,
    /// Expected reading for a healthy part
    pub reference_value: String,
    /// Where to take the measurement
    pub procedure: String,
}

/// One probable cause of a fault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbableCause {
    pub part: String,
    /// Percent, 0..=100
    pub probability: f64,
    #[serde(default)]
    pub reason: String,
}

/// Explanation of one trouble code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub code: String,
    pub explanation: String,
    #[serde(default)]
    pub technical_specs: TechnicalSpecs,
    #[serde(default)]
    pub causes: Vec<ProbableCause>,
    #[serde(default)]
    pub repair_steps: Vec<String>,
}

impl Explanation {
    /// Causes ordered from most to least probable
    pub fn ranked_causes(&self) -> Vec<&ProbableCause> {
        let mut causes: Vec<&ProbableCause> = self.causes.iter().collect();
        causes.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        causes
    }
}

/// Parse an advisor JSON payload
pub fn parse_explanation(json: &str) -> Result<Explanation, AdvisorError> {
    let explanation: Explanation = serde_json::from_str(json)?;
    if explanation.code.trim().is_empty() {
        return Err(AdvisorError::InvalidResponse("missing code".into()));
    }
    if let Some(cause) = explanation
        .causes
        .iter()
        .find(|c| !(0.0..=100.0).contains(&c.probability))
    {
        return Err(AdvisorError::InvalidResponse(format!(
            "probability {} for {} out of range",
            cause.probability, cause.part
        )));
    }
    Ok(explanation)
}
