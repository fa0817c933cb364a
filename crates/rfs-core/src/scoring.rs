//! Keyword-bucket relevance scoring.
//!
//! A record's title and snippet are lowercased into one haystack and matched by plain
//! substring containment against each [`KeywordBucket`]. A bucket adds its weight at most
//! once no matter how many of its phrases occur. Recency is read from the raw publication
//! date string: the first [`RecencyTier`] whose year token appears in it wins.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordBucket {
    pub name: String,
    pub weight: u32,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyTier {
    pub weight: u32,
    pub years: Vec<String>,
}

/// Scoring vocabulary. Usually loaded from `rules/scoring.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    #[serde(default)]
    pub buckets: Vec<KeywordBucket>,
    #[serde(default)]
    pub recency: Vec<RecencyTier>,
    /// Collector wrapper text removed from title and snippet before scoring.
    #[serde(default = "default_strip_markers")]
    pub strip_markers: Vec<String>,
}

pub fn default_strip_markers() -> Vec<String> {
    crate::DEFAULT_STRIP_MARKERS.iter().map(|m| m.to_string()).collect()
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            buckets: vec![
                bucket(
                    "high_priority",
                    3,
                    &[
                        "phase 3",
                        "phase iii",
                        "fda approval",
                        "breakthrough",
                        "complete response",
                        "survival benefit",
                    ],
                ),
                bucket(
                    "medium_priority",
                    2,
                    &["phase 2", "phase ii", "clinical trial", "efficacy", "safety"],
                ),
                bucket(
                    "condition",
                    2,
                    &["bladder cancer", "urothelial cancer", "urothelial carcinoma"],
                ),
            ],
            recency: vec![
                RecencyTier {
                    weight: 3,
                    years: vec!["2026".into(), "2025".into()],
                },
                RecencyTier {
                    weight: 1,
                    years: vec!["2024".into()],
                },
            ],
            strip_markers: default_strip_markers(),
        }
    }
}

fn bucket(name: &str, weight: u32, phrases: &[&str]) -> KeywordBucket {
    KeywordBucket {
        name: name.to_string(),
        weight,
        phrases: phrases.iter().map(|p| p.to_string()).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketHit {
    pub bucket: String,
    pub phrase: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub total: u32,
    pub matched: Vec<BucketHit>,
    pub recency: u32,
}

/// Scorer with its vocabulary normalized for matching.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    rules: ScoringRules,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(ScoringRules::default())
    }
}

impl RelevanceScorer {
    pub fn new(mut rules: ScoringRules) -> Self {
        for bucket in &mut rules.buckets {
            bucket.phrases = bucket
                .phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect();
        }
        for tier in &mut rules.recency {
            tier.years = tier
                .years
                .iter()
                .map(|y| y.trim().to_string())
                .filter(|y| !y.is_empty())
                .collect();
        }
        Self { rules }
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    /// `search_term` is accepted for future use and does not influence the score.
    pub fn score(
        &self,
        title: &str,
        snippet: &str,
        published_date: Option<&str>,
        search_term: &str,
    ) -> u32 {
        self.explain(title, snippet, published_date, search_term).total
    }

    pub fn explain(
        &self,
        title: &str,
        snippet: &str,
        published_date: Option<&str>,
        _search_term: &str,
    ) -> ScoreBreakdown {
        let haystack = format!("{title} {snippet}").to_lowercase();
        let mut out = ScoreBreakdown::default();

        for bucket in &self.rules.buckets {
            if let Some(phrase) = bucket.phrases.iter().find(|p| haystack.contains(p.as_str())) {
                out.total = out.total.saturating_add(bucket.weight);
                out.matched.push(BucketHit {
                    bucket: bucket.name.clone(),
                    phrase: phrase.clone(),
                    weight: bucket.weight,
                });
            }
        }

        out.recency = published_date.map(|d| self.recency_bonus(d)).unwrap_or(0);
        out.total = out.total.saturating_add(out.recency);
        out
    }

    fn recency_bonus(&self, published_date: &str) -> u32 {
        self.rules
            .recency
            .iter()
            .find(|tier| tier.years.iter().any(|y| published_date.contains(y.as_str())))
            .map(|tier| tier.weight)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_signal_title_scores_eight() {
        let scorer = RelevanceScorer::default();
        let score = scorer.score(
            "Phase 3 FDA Approval Trial",
            "bladder cancer survival benefit",
            Some("2026"),
            "X",
        );
        assert_eq!(score, 8);
    }

    #[test]
    fn unrelated_news_without_date_scores_zero() {
        let scorer = RelevanceScorer::default();
        assert_eq!(scorer.score("general health news", "", None, "X"), 0);
    }

    #[test]
    fn bucket_contributes_once_despite_many_matches() {
        let scorer = RelevanceScorer::default();
        let breakdown = scorer.explain(
            "phase 3 breakthrough",
            "fda approval with complete response",
            None,
            "X",
        );
        assert_eq!(breakdown.total, 3);
        assert_eq!(breakdown.matched.len(), 1);
        assert_eq!(breakdown.matched[0].bucket, "high_priority");
        assert_eq!(breakdown.matched[0].phrase, "phase 3");
    }

    #[test]
    fn recency_tiers_are_exclusive() {
        let scorer = RelevanceScorer::default();
        assert_eq!(scorer.score("", "", Some("December 2025, revised 2024"), "X"), 3);
        assert_eq!(scorer.score("", "", Some("August 2024"), "X"), 1);
        assert_eq!(scorer.score("", "", Some("September 3, 2006"), "X"), 0);
        assert_eq!(scorer.score("", "", Some("2 hours ago"), "X"), 0);
        assert_eq!(scorer.score("", "", Some(""), "X"), 0);
    }

    #[test]
    fn matching_is_case_insensitive_on_text_only() {
        let scorer = RelevanceScorer::default();
        assert_eq!(scorer.score("UROTHELIAL CARCINOMA", "Clinical Trial", None, "X"), 4);
        // the year must be in the date, not the text
        assert_eq!(scorer.score("2026 outlook", "", None, "X"), 0);
    }

    #[test]
    fn search_term_does_not_change_score() {
        let scorer = RelevanceScorer::default();
        let a = scorer.score("efficacy data", "bladder cancer", Some("2025"), "one");
        let b = scorer.score("efficacy data", "bladder cancer", Some("2025"), "bladder cancer phase 3");
        assert_eq!(a, b);
        assert_eq!(a, 7);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = RelevanceScorer::default();
        let args = ("Phase II safety", "urothelial cancer", Some("March 8, 2025"), "t");
        let first = scorer.explain(args.0, args.1, args.2, args.3);
        let second = scorer.explain(args.0, args.1, args.2, args.3);
        assert_eq!(first, second);
        assert_eq!(first.total, 7);
    }

    #[test]
    fn custom_vocabulary_is_normalized() {
        let rules = ScoringRules {
            buckets: vec![bucket("genomic", 2, &["  FGFR3 ", "", "Nectin-4"])],
            recency: vec![RecencyTier {
                weight: 4,
                years: vec!["2030".into()],
            }],
            strip_markers: Vec::new(),
        };
        let scorer = RelevanceScorer::new(rules);
        assert_eq!(scorer.rules().buckets[0].phrases, vec!["fgfr3", "nectin-4"]);
        assert_eq!(scorer.score("NECTIN-4 ADC", "fgfr3", Some("May 2030"), "t"), 6);
        assert_eq!(scorer.score("phase 3", "bladder cancer", Some("2026"), "t"), 0);
    }

    #[test]
    fn rules_parse_from_yaml() {
        let yaml = r#"
buckets:
  - name: high_priority
    weight: 3
    phrases: ["phase 3"]
recency:
  - weight: 1
    years: ["2024"]
"#;
        let rules: ScoringRules = serde_yaml::from_str(yaml).expect("yaml");
        assert_eq!(rules.buckets.len(), 1);
        assert_eq!(rules.recency[0].weight, 1);
        assert_eq!(rules.strip_markers, default_strip_markers());
    }
}
