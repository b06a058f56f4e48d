//! Quality gate: deterministic rubric scoring of generated notes.
//!
//! Seven equally weighted slots. The automation slot doubles as a
//! hard-fail override: meta-commentary from the generator (it talking
//! about itself as a script or an AI) zeroes the whole score, while the
//! remaining checks still report their issues for diagnosis.

use serde::{Deserialize, Serialize};

/// Weighted slots in the rubric.
pub const RUBRIC_SLOTS: u32 = 7;

/// Default acceptance threshold.
pub const DEFAULT_MIN_QUALITY: f64 = 0.7;

/// Issue recorded when the hard-fail override triggers.
pub const META_COMMENTARY_ISSUE: &str = "critical: meta-commentary detected";

/// Issue recorded for soft automation language.
pub const AUTOMATION_LANGUAGE_ISSUE: &str = "minor: potential automation language";

/// Phrases that mean the generator described its own process.
pub const CRITICAL_MARKERS: &[&str] = &[
    "i have processed",
    "i generated these",
    "this script",
    "as an ai",
    "i cannot access",
    "files have been processed",
    "batch processing completed",
    "script completed",
];

/// Words that often, but not always, signal automation talk
/// ("automated testing" is legitimate content).
pub const MINOR_MARKERS: &[&str] = &["automated", "processed", "generated"];

const LIST_MARKERS: &[&str] = &["- ", "* ", "1. ", "• "];

/// Tunable parts of the rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Rubric {
    /// Minimum content length in characters.
    pub min_length: usize,
    /// Label keywords that make code blocks mandatory.
    pub technical_keywords: Vec<String>,
    /// Voice markers; any one satisfies the check.
    pub voice_phrases: Vec<String>,
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            min_length: 1500,
            technical_keywords: ["code", "spring", "java", "programming"]
                .map(String::from)
                .to_vec(),
            voice_phrases: [
                "production",
                "real-world",
                "actually",
                "here's the thing",
                "gotcha",
                "reality",
                "battle-tested",
                "in the trenches",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Score plus the ordered list of violated checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub score: f64,
    pub issues: Vec<String>,
}

impl QualityReport {
    pub fn passes(&self, min_quality: f64) -> bool {
        self.score >= min_quality
    }

    /// True when the meta-commentary override zeroed the score.
    pub fn is_hard_fail(&self) -> bool {
        self.issues.iter().any(|i| i == META_COMMENTARY_ISSUE)
    }
}

/// Stateless scorer over a fixed rubric.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    rubric: Rubric,
}

impl QualityGate {
    pub fn new(rubric: Rubric) -> Self {
        Self { rubric }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Score `content` generated for the item labelled `item_label`.
    pub fn evaluate(&self, content: &str, item_label: &str) -> QualityReport {
        let lower = content.to_lowercase();
        let label = item_label.to_lowercase();
        let mut issues = Vec::new();
        let mut passed = 0u32;
        let mut hard_fail = false;

        let length = content.chars().count();
        if length >= self.rubric.min_length {
            passed += 1;
        } else {
            issues.push(format!(
                "too short ({length} chars, min {})",
                self.rubric.min_length
            ));
        }

        if content.contains("##") {
            passed += 1;
        } else {
            issues.push("missing section headers".to_string());
        }

        // Non-technical items get this slot for free.
        let technical = self
            .rubric
            .technical_keywords
            .iter()
            .any(|k| label.contains(&k.to_lowercase()));
        if !technical || content.contains("```") {
            passed += 1;
        } else {
            issues.push("technical content missing code blocks".to_string());
        }

        if self
            .rubric
            .voice_phrases
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
        {
            passed += 1;
        } else {
            issues.push("missing voice markers".to_string());
        }

        if CRITICAL_MARKERS.iter().any(|m| lower.contains(m)) {
            issues.push(META_COMMENTARY_ISSUE.to_string());
            hard_fail = true;
        } else if MINOR_MARKERS.iter().any(|m| lower.contains(m)) {
            issues.push(AUTOMATION_LANGUAGE_ISSUE.to_string());
        } else {
            passed += 1;
        }

        if LIST_MARKERS.iter().any(|m| content.contains(m)) {
            passed += 1;
        } else {
            issues.push("missing lists".to_string());
        }

        if content.contains('*') || content.contains("__") {
            passed += 1;
        } else {
            issues.push("missing emphasis".to_string());
        }

        let score = if hard_fail {
            0.0
        } else {
            f64::from(passed) / f64::from(RUBRIC_SLOTS)
        };

        QualityReport { score, issues }
    }
}

/// Score with the default rubric.
pub fn evaluate(content: &str, item_label: &str) -> QualityReport {
    QualityGate::default().evaluate(content, item_label)
}
