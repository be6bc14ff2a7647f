//! Reason list loading and random selection.

use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::error::{NoapiError, Result};

/// Reply used on the rare occasions the service gives in.
pub const SIGH_REASON: &str = "Ugh... fine... I'll do something productive I guess.";

/// Body of a normal (non-throttled) response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// HTTP status code to answer with
    #[serde(skip)]
    pub status: u16,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigh: Option<bool>,
}

/// A fixed list of reasons, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ReasonProvider {
    reasons: Vec<String>,
    sigh_probability: f64,
}

impl ReasonProvider {
    /// Build a provider from an in-memory list.
    pub fn new(reasons: Vec<String>, sigh_probability: f64) -> Result<Self> {
        if reasons.is_empty() {
            return Err(NoapiError::Reasons("reason list is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&sigh_probability) {
            return Err(NoapiError::Config(format!(
                "sigh_probability must be between 0 and 1, got {}",
                sigh_probability
            )));
        }

        Ok(Self {
            reasons,
            sigh_probability,
        })
    }

    /// Load reasons from a JSON file containing an array of strings.
    pub fn from_file<P: AsRef<Path>>(path: P, sigh_probability: f64) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let provider = Self::from_json(&contents, sigh_probability)?;

        info!(
            path = %path.display(),
            count = provider.len(),
            "Loaded reasons"
        );
        Ok(provider)
    }

    /// Parse reasons from a JSON array of strings.
    pub fn from_json(json: &str, sigh_probability: f64) -> Result<Self> {
        let reasons: Vec<String> = serde_json::from_str(json)
            .map_err(|e| NoapiError::Reasons(format!("Failed to parse reasons: {}", e)))?;
        Self::new(reasons, sigh_probability)
    }

    /// Number of loaded reasons.
    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    /// Whether the list is empty; never true for a constructed provider.
    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Pick the reply for one request.
    ///
    /// With probability `sigh_probability` the service relents and answers
    /// 200; otherwise it answers 406 with a random reason.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Reply {
        if rng.gen_bool(self.sigh_probability) {
            return Reply {
                status: 200,
                reason: SIGH_REASON.to_string(),
                sigh: Some(true),
            };
        }

        // The list is never empty after construction.
        let reason = self.reasons.choose(rng).cloned().unwrap_or_default();
        Reply {
            status: 406,
            reason,
            sigh: None,
        }
    }
}
