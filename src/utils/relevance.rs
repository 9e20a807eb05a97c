//! Keyword-cluster relevance windows.
//!
//! A question is mapped to topic clusters by plain phrase matching; the policy text is then
//! narrowed to lines mentioning any of the matched clusters' keywords, plus a little context.
//! There is no semantic matching: content phrased outside the keyword table is not found.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use super::text::take_chars;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCluster {
    pub topic: String,
    /// Extra phrases that select this cluster when found in a question
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Phrases that mark a policy line as relevant
    pub keywords: Vec<String>,
}

impl KeywordCluster {
    fn new(topic: &str, triggers: &[&str], keywords: &[&str]) -> Self {
        Self {
            topic: topic.to_string(),
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn matches_question(&self, question_lower: &str) -> bool {
        std::iter::once(&self.topic)
            .chain(self.triggers.iter())
            .filter(|phrase| !phrase.is_empty())
            .any(|phrase| question_lower.contains(phrase.as_str()))
    }
}

#[derive(Error, Debug)]
pub enum KeywordTableError {
    #[error("failed to read keyword table {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid keyword table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("keyword table must contain at least one cluster with keywords")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    clusters: Vec<KeywordCluster>,
}

static DEFAULT_CLUSTERS: Lazy<Vec<KeywordCluster>> = Lazy::new(|| {
    vec![
        KeywordCluster::new(
            "grace period",
            &["grace", "premium payment", "late payment"],
            &["grace period", "premium payment", "due date", "renewal"],
        ),
        KeywordCluster::new(
            "waiting period",
            &["pre-existing", "preexisting", "waiting"],
            &[
                "waiting period",
                "pre-existing",
                "preexisting",
                "continuous coverage",
                "months of continuous",
            ],
        ),
        KeywordCluster::new(
            "maternity",
            &["pregnancy", "childbirth", "delivery", "newborn"],
            &[
                "maternity",
                "pregnancy",
                "childbirth",
                "delivery",
                "new born",
                "newborn",
                "termination",
            ],
        ),
        KeywordCluster::new(
            "cataract",
            &["eye surgery"],
            &["cataract", "eye surgery", "lens"],
        ),
        KeywordCluster::new(
            "organ donor",
            &["organ donation", "transplant"],
            &["organ donor", "donor", "harvesting", "transplant"],
        ),
        KeywordCluster::new(
            "no claim discount",
            &["ncd", "no claim bonus", "claim free"],
            &["no claim discount", "ncd", "no claim bonus", "claim free"],
        ),
        KeywordCluster::new(
            "health check",
            &["check-up", "checkup", "preventive"],
            &[
                "health check",
                "check-up",
                "checkup",
                "preventive",
                "block of two continuous policy years",
            ],
        ),
        KeywordCluster::new(
            "hospital",
            &["define a hospital", "definition of hospital"],
            &[
                "hospital means",
                "inpatient beds",
                "in-patient beds",
                "qualified nursing",
                "operation theatre",
                "medical practitioner",
            ],
        ),
        KeywordCluster::new(
            "ayush",
            &["ayurveda", "homeopathy", "unani", "siddha", "naturopathy"],
            &[
                "ayush",
                "ayurveda",
                "yoga",
                "naturopathy",
                "unani",
                "siddha",
                "homeopathy",
            ],
        ),
        KeywordCluster::new(
            "room rent",
            &["icu charges", "intensive care", "sub-limit", "sublimit"],
            &[
                "room rent",
                "icu charges",
                "intensive care",
                "sub-limit",
                "sublimit",
                "sum insured",
                "plan a",
            ],
        ),
        KeywordCluster::new(
            "exclusion",
            &["not covered", "excluded"],
            &["exclusion", "excluded", "not covered", "shall not be liable"],
        ),
        KeywordCluster::new(
            "claim",
            &["reimbursement", "cashless", "settlement"],
            &[
                "claim",
                "reimbursement",
                "cashless",
                "settlement",
                "intimation",
            ],
        ),
    ]
});

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            clusters: DEFAULT_CLUSTERS.clone(),
        }
    }
}

impl KeywordTable {
    /// Builds a table, lower-casing every phrase. Clusters without keywords are dropped.
    pub fn new(clusters: Vec<KeywordCluster>) -> Result<Self, KeywordTableError> {
        let clusters = clusters
            .into_iter()
            .map(|c| KeywordCluster {
                topic: c.topic.trim().to_lowercase(),
                triggers: normalize_phrases(c.triggers),
                keywords: normalize_phrases(c.keywords),
            })
            .filter(|c| !c.keywords.is_empty())
            .collect::<Vec<_>>();

        if clusters.is_empty() {
            return Err(KeywordTableError::Empty);
        }
        Ok(Self { clusters })
    }

    pub fn from_json_str(json: &str) -> Result<Self, KeywordTableError> {
        let clusters: Vec<KeywordCluster> = serde_json::from_str(json)?;
        Self::new(clusters)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, KeywordTableError> {
        let raw = std::fs::read_to_string(path).map_err(|source| KeywordTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn clusters(&self) -> &[KeywordCluster] {
        &self.clusters
    }

    /// Union of keywords of every cluster selected by the question, in table order.
    pub fn keywords_for(&self, question: &str) -> Vec<&str> {
        let question_lower = question.to_lowercase();
        let mut seen = HashSet::new();
        self.clusters
            .iter()
            .filter(|c| c.matches_question(&question_lower))
            .flat_map(|c| c.keywords.iter().map(String::as_str))
            .filter(|k| seen.insert(*k))
            .collect()
    }
}

fn normalize_phrases(phrases: Vec<String>) -> Vec<String> {
    phrases
        .into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelevanceConfig {
    /// Lines kept before and after every matching line
    pub context_lines: usize,
    /// Windows shorter than this (in characters) are replaced by the prefix fallback
    pub min_window_chars: usize,
    pub fallback_prefix_chars: usize,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            context_lines: 2,
            min_window_chars: 1000,
            fallback_prefix_chars: 5000,
        }
    }
}

/// Narrows `text` to the part likely to answer `question`.
///
/// Returns `text` unchanged when the question selects no cluster, and the first
/// `fallback_prefix_chars` characters when the matched window is too small.
pub fn select_window(
    question: &str,
    text: &str,
    table: &KeywordTable,
    cfg: &RelevanceConfig,
) -> String {
    let keywords = table.keywords_for(question);
    if keywords.is_empty() {
        debug!(target: "relevance", "No keyword cluster matched; using full text");
        return text.to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut included = vec![false; lines.len()];
    let mut order = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        if !keywords.iter().any(|k| lower.contains(k)) {
            continue;
        }
        let start = i.saturating_sub(cfg.context_lines);
        let end = (i + cfg.context_lines).min(lines.len().saturating_sub(1));
        for j in start..=end {
            if !included[j] {
                included[j] = true;
                order.push(j);
            }
        }
    }

    let window = order
        .iter()
        .map(|&j| lines[j])
        .collect::<Vec<_>>()
        .join("\n");

    let window_chars = window.chars().count();
    if window_chars < cfg.min_window_chars {
        debug!(
            target: "relevance",
            window_chars,
            min = cfg.min_window_chars,
            "Relevance window too small; using text prefix"
        );
        return take_chars(text, cfg.fallback_prefix_chars).to_string();
    }

    debug!(
        target: "relevance",
        keywords = keywords.len(),
        lines = order.len(),
        window_chars,
        "Relevance window selected"
    );
    window
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(tag: &str, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("{} line {} about hospital administration", tag, i))
            .collect()
    }

    fn small_cfg() -> RelevanceConfig {
        RelevanceConfig {
            context_lines: 2,
            min_window_chars: 10,
            fallback_prefix_chars: 5000,
        }
    }

    #[test]
    fn default_table_maps_grace_period_questions() {
        let table = KeywordTable::default();
        let keywords = table.keywords_for("What is the Grace Period for premium payment?");
        assert!(keywords.contains(&"premium payment"));
        assert!(keywords.contains(&"due date"));
        assert!(keywords.contains(&"renewal"));
    }

    #[test]
    fn unmatched_question_returns_full_text() {
        let text = "alpha\nbeta\ngamma";
        let out = select_window(
            "Who wrote this?",
            text,
            &KeywordTable::default(),
            &RelevanceConfig::default(),
        );
        assert_eq!(out, text);
    }

    #[test]
    fn window_keeps_two_lines_of_context_and_nothing_else() {
        let mut lines = filler("before", 10);
        lines.push("The premium payment due date is the 1st of each month".to_string());
        lines.extend(filler("after", 10));
        let text = lines.join("\n");

        let out = select_window(
            "What is the grace period?",
            &text,
            &KeywordTable::default(),
            &small_cfg(),
        );

        let expected = [
            "before line 8 about hospital administration",
            "before line 9 about hospital administration",
            "The premium payment due date is the 1st of each month",
            "after line 0 about hospital administration",
            "after line 1 about hospital administration",
        ]
        .join("\n");
        assert_eq!(out, expected);
        assert!(!out.contains("before line 7"));
        assert!(!out.contains("after line 2"));
    }

    #[test]
    fn overlapping_windows_are_deduplicated_in_order() {
        let text = "a\nb\ndue date one\nc\ndue date two\nd\ne\nf\ng";
        let out = select_window(
            "grace period?",
            text,
            &KeywordTable::default(),
            &small_cfg(),
        );
        assert_eq!(out, "a\nb\ndue date one\nc\ndue date two\nd\ne");
    }

    #[test]
    fn context_is_clipped_at_document_bounds() {
        let text = "renewal terms\nx\ny\nz\nlast renewal";
        let cfg = RelevanceConfig {
            context_lines: 1,
            min_window_chars: 1,
            fallback_prefix_chars: 5000,
        };
        let out = select_window("grace period", text, &KeywordTable::default(), &cfg);
        assert_eq!(out, "renewal terms\nx\nz\nlast renewal");
    }

    #[test]
    fn small_window_falls_back_to_text_prefix() {
        let mut lines = filler("body", 400);
        lines.insert(200, "Premium payment due date".to_string());
        let text = lines.join("\n");

        let out = select_window(
            "grace period",
            &text,
            &KeywordTable::default(),
            &RelevanceConfig::default(),
        );

        assert_eq!(out.chars().count(), 5000);
        assert!(text.starts_with(&out));
        assert!(!out.contains("Premium payment due date"));
    }

    #[test]
    fn large_window_is_returned_as_is() {
        let long_line = format!("premium payment due date {}", "x".repeat(1200));
        let text = format!("intro\n{}\noutro\nunrelated\nstill unrelated\nfar away", long_line);

        let out = select_window(
            "grace period",
            &text,
            &KeywordTable::default(),
            &RelevanceConfig::default(),
        );
        assert_eq!(out, format!("intro\n{}\noutro\nunrelated", long_line));
    }

    #[test]
    fn json_table_is_normalized() {
        let table = KeywordTable::from_json_str(
            r#"[{"topic": " Deductible ", "triggers": ["EXCESS"], "keywords": ["Deductible", " "]},
                {"topic": "empty", "keywords": []}]"#,
        )
        .expect("table");
        assert_eq!(table.clusters().len(), 1);
        assert_eq!(table.clusters()[0].topic, "deductible");
        assert_eq!(table.keywords_for("Is there an excess?"), vec!["deductible"]);
    }

    #[test]
    fn json_table_without_keywords_is_rejected() {
        let err = KeywordTable::from_json_str(r#"[{"topic": "x", "keywords": []}]"#).unwrap_err();
        assert!(matches!(err, KeywordTableError::Empty));
        assert!(matches!(
            KeywordTable::from_json_str("{").unwrap_err(),
            KeywordTableError::Json(_)
        ));
    }

    #[test]
    fn table_loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keywords.json");
        std::fs::write(
            &path,
            r#"[{"topic": "co-payment", "keywords": ["co-payment", "copay"]}]"#,
        )
        .expect("write");

        let table = KeywordTable::from_json_file(&path).expect("table");
        assert_eq!(table.keywords_for("Any co-payment?"), vec!["co-payment", "copay"]);

        let missing = KeywordTable::from_json_file(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(KeywordTableError::Io { .. })));
    }
}
