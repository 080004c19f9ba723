//! TaskAllocator: keyword/verb scoring into an effort tier
//!
//! Score = (2 x detected domains + reasoning-verb weights), times 1.5 when a
//! detected domain is high-stakes, plus flat bonuses for novelty and for
//! large or re-verification-flagged prior context.

use super::effort::{EffortProfile, EffortTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Summary of what earlier rounds or sessions already established
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorContext {
    pub summary: String,
    /// Earlier conclusions must be re-checked
    #[serde(default)]
    pub needs_reverification: bool,
}

impl PriorContext {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            needs_reverification: false,
        }
    }

    pub fn reverify(mut self) -> Self {
        self.needs_reverification = true;
        self
    }
}

/// Scoring tables and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Domain name -> keywords (single words or space-separated phrases)
    pub domains: BTreeMap<String, Vec<String>>,
    /// Verb stem -> weight; a token matches when it starts with the stem
    pub reasoning_verbs: BTreeMap<String, f64>,
    /// Domains that trigger the stakes multiplier
    pub high_stakes: Vec<String>,
    pub novelty_markers: Vec<String>,
    /// Prior summaries with at least this many words count as large
    pub large_context_words: usize,
    pub domain_weight: f64,
    pub stakes_multiplier: f64,
    pub novelty_bonus: f64,
    pub large_context_bonus: f64,
    pub reverify_bonus: f64,
    /// Scores below this are `simple`
    pub moderate_threshold: f64,
    /// Scores at or above this are `complex`
    pub complex_threshold: f64,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        let mut domains = BTreeMap::new();
        domains.insert(
            "medical".to_string(),
            words(&[
                "drug", "drugs", "mortality", "clinical", "patient", "patients", "trial",
                "trials", "disease", "therapy", "treatment", "dose", "diagnosis", "symptom",
                "symptoms", "medical", "medicine", "vaccine", "hospital", "adverse event",
            ]),
        );
        domains.insert(
            "legal".to_string(),
            words(&[
                "law", "legal", "court", "statute", "liability", "lawsuit", "regulation",
                "regulatory", "compliance", "jurisdiction", "case law",
            ]),
        );
        domains.insert(
            "financial".to_string(),
            words(&[
                "market", "markets", "stock", "stocks", "investment", "revenue", "inflation",
                "portfolio", "financial", "valuation", "interest rate",
            ]),
        );
        domains.insert(
            "technical".to_string(),
            words(&[
                "software", "algorithm", "database", "compiler", "protocol", "api",
                "architecture", "latency", "kernel", "distributed system",
            ]),
        );
        domains.insert(
            "scientific".to_string(),
            words(&[
                "experiment", "hypothesis", "physics", "chemistry", "biology", "gene",
                "protein", "climate", "species", "quantum",
            ]),
        );

        let mut reasoning_verbs = BTreeMap::new();
        for (stem, weight) in [
            ("analy", 2.0),
            ("explain", 2.0),
            ("investigat", 2.0),
            ("compar", 3.0),
            ("contrast", 3.0),
            ("evaluat", 3.0),
            ("assess", 3.0),
            ("predict", 3.0),
            ("integrat", 3.0),
            ("synthes", 4.0),
            ("critiqu", 4.0),
            ("reconcil", 5.0),
        ] {
            reasoning_verbs.insert(stem.to_string(), weight);
        }

        Self {
            domains,
            reasoning_verbs,
            high_stakes: words(&["medical", "legal"]),
            novelty_markers: words(&[
                "latest", "recent", "recently", "current", "currently", "today", "newest",
                "emerging", "this year", "up to date",
            ]),
            large_context_words: 400,
            domain_weight: 2.0,
            stakes_multiplier: 1.5,
            novelty_bonus: 2.0,
            large_context_bonus: 2.0,
            reverify_bonus: 3.0,
            moderate_threshold: 4.0,
            complex_threshold: 8.0,
        }
    }
}

/// The outcome of scoring one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub score: f64,
    pub tier: EffortTier,
    pub profile: EffortProfile,
    /// Detected domains, sorted
    pub domains: Vec<String>,
    /// Matched verb stems, sorted
    pub verbs: Vec<String>,
    pub high_stakes: bool,
    pub novelty: bool,
}

/// Classifies requests into effort tiers
#[derive(Debug, Clone, Default)]
pub struct TaskAllocator {
    config: AllocatorConfig,
}

impl TaskAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Score a request and pick its tier
    pub fn allocate(&self, request: &str, prior: Option<&PriorContext>) -> Allocation {
        let tokens = tokenize(request);
        let padded = format!(" {} ", tokens.join(" "));

        let domains: Vec<String> = self
            .config
            .domains
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| contains_term(&padded, k)))
            .map(|(domain, _)| domain.clone())
            .collect();

        let mut verbs = Vec::new();
        let mut verb_score = 0.0;
        for (stem, weight) in &self.config.reasoning_verbs {
            if tokens.iter().any(|t| t.starts_with(stem.as_str())) {
                verbs.push(stem.clone());
                verb_score += weight;
            }
        }

        let mut score = domains.len() as f64 * self.config.domain_weight + verb_score;

        let high_stakes = domains.iter().any(|d| self.config.high_stakes.contains(d));
        if high_stakes {
            score *= self.config.stakes_multiplier;
        }

        let novelty = self
            .config
            .novelty_markers
            .iter()
            .any(|m| contains_term(&padded, m));
        if novelty {
            score += self.config.novelty_bonus;
        }

        if let Some(prior) = prior {
            if prior.summary.split_whitespace().count() >= self.config.large_context_words {
                score += self.config.large_context_bonus;
            }
            if prior.needs_reverification {
                score += self.config.reverify_bonus;
            }
        }

        let tier = self.tier_for(score);
        debug!(score, tier = %tier, ?domains, ?verbs, "allocated effort");

        Allocation {
            score,
            tier,
            profile: tier.profile(),
            domains,
            verbs,
            high_stakes,
            novelty,
        }
    }

    fn tier_for(&self, score: f64) -> EffortTier {
        if score < self.config.moderate_threshold {
            EffortTier::Simple
        } else if score < self.config.complex_threshold {
            EffortTier::Moderate
        } else {
            EffortTier::Complex
        }
    }
}

/// Lowercase alphanumeric tokens (hyphens kept inside words)
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|t| t.trim_matches('-').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whole-word (or whole-phrase) match against a space-padded token string
fn contains_term(padded: &str, term: &str) -> bool {
    let normalized = tokenize(term).join(" ");
    !normalized.is_empty() && padded.contains(&format!(" {} ", normalized))
}
