//! Strict parser for the repository analyst's structured output.
//!
//! Model output is untrusted. Anything that does not match the contract
//! (missing fields, wrong types, confidence outside `[0, 1]`, complexity
//! outside `1..=10`, unknown or blank roles) becomes [`TransientError::MalformedOutput`] so the
//! orchestrator retries the attempt. Nothing is coerced.

use serde::Deserialize;

use crate::llms::base_llm::BaseLLMState;
use crate::tasks::{Citation, RoleAssertion, TechRole, TechSignal};
use crate::utilities::errors::TransientError;

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireAnalysis {
    summary: String,
    complexity_score: u8,
    #[serde(default)]
    tech_signals: Vec<WireSignal>,
    claims: Vec<WireClaim>,
}

#[derive(Debug, Deserialize)]
struct WireSignal {
    technology: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct WireClaim {
    text: String,
    confidence: f64,
    #[serde(default)]
    citations: Vec<WireCitation>,
    #[serde(default)]
    role: Option<WireRole>,
}

#[derive(Debug, Deserialize)]
struct WireCitation {
    field: String,
    #[serde(default)]
    quote: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRole {
    kind: String,
    value: String,
}

// ---------------------------------------------------------------------------
// Parsed output
// ---------------------------------------------------------------------------

/// A claim as proposed by the model, before grounding.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedClaim {
    pub text: String,
    pub confidence: f64,
    pub citations: Vec<Citation>,
    pub role: Option<RoleAssertion>,
}

/// Validated analysis of one repository.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub summary: String,
    pub complexity: u8,
    pub tech_signals: Vec<TechSignal>,
    pub claims: Vec<ProposedClaim>,
}

fn check_confidence(value: f64, what: &str) -> Result<f64, TransientError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(TransientError::malformed(format!(
            "{what} confidence {value} outside [0, 1]"
        )))
    }
}

fn parse_role(role: WireRole, idx: usize) -> Result<RoleAssertion, TransientError> {
    let kind = role
        .kind
        .parse::<TechRole>()
        .map_err(|e| TransientError::malformed(format!("claim {idx}: {e}")))?;
    if role.value.trim().is_empty() {
        return Err(TransientError::malformed(format!("claim {idx} has an empty role value")));
    }
    Ok(RoleAssertion::new(kind, role.value))
}

/// Parse and validate a raw model response.
pub fn parse_analysis(response: &str) -> Result<ParsedAnalysis, TransientError> {
    let value = BaseLLMState::extract_json(response)
        .ok_or_else(|| TransientError::malformed("response contains no JSON object"))?;
    let wire: WireAnalysis = serde_json::from_value(value)
        .map_err(|e| TransientError::malformed(format!("schema mismatch: {e}")))?;

    let summary = wire.summary.trim().to_string();
    if summary.is_empty() {
        return Err(TransientError::malformed("summary is empty"));
    }
    if !(1..=10).contains(&wire.complexity_score) {
        return Err(TransientError::malformed(format!(
            "complexity_score {} outside 1..=10",
            wire.complexity_score
        )));
    }

    let mut tech_signals = Vec::with_capacity(wire.tech_signals.len());
    for signal in wire.tech_signals {
        let confidence = check_confidence(signal.confidence, "tech signal")?;
        if signal.technology.trim().is_empty() {
            return Err(TransientError::malformed("tech signal without technology"));
        }
        tech_signals.push(TechSignal::new(signal.technology, confidence));
    }

    let mut claims = Vec::with_capacity(wire.claims.len());
    for (idx, claim) in wire.claims.into_iter().enumerate() {
        let text = claim.text.trim().to_string();
        if text.is_empty() {
            return Err(TransientError::malformed(format!("claim {idx} has empty text")));
        }
        let confidence = check_confidence(claim.confidence, &format!("claim {idx}"))?;
        let citations = claim
            .citations
            .into_iter()
            .map(|c| Citation::new(c.field.trim(), c.quote))
            .collect();
        let role = claim
            .role
            .map(|r| parse_role(r, idx))
            .transpose()?;
        claims.push(ProposedClaim {
            text,
            confidence,
            citations,
            role,
        });
    }

    Ok(ParsedAnalysis {
        summary,
        complexity: wire.complexity_score,
        tech_signals,
        claims,
    })
}
