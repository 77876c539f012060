//! Leaf condition evaluation
//!
//! The condition evaluator hands every leaf to a [`LeafEvaluator`]. The
//! builtin implementation covers text, regex, date, number, exists and
//! lexicon leaves; boolean expressions belong to an external evaluator.

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use docpolicy_core::{Document, Error, LexiconId, Result};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

use crate::condition::{DateOperator, NumberOperator, TextMatchMode};
use crate::config::Lexicon;
use crate::{Condition, EnvironmentSnapshot};

/// Compiled lexicon terms
///
/// Terms and values are both folded with Unicode lowercasing, so substring
/// and whole-value matching agree on case.
struct LexiconMatcher {
    automaton: AhoCorasick,
    terms: HashSet<String>,
}

impl LexiconMatcher {
    fn build(lexicon: &Lexicon) -> Result<Self> {
        let terms: HashSet<String> = lexicon.terms.iter().map(|t| t.to_lowercase()).collect();
        let automaton = AhoCorasick::builder().build(&terms).map_err(|e| {
            Error::condition(format!(
                "failed to build matcher for lexicon {}: {}",
                lexicon.id, e
            ))
        })?;
        Ok(Self { automaton, terms })
    }

    fn is_match(&self, value: &str, whole_value: bool) -> bool {
        let folded = value.to_lowercase();
        if whole_value {
            self.terms.contains(&folded)
        } else {
            self.automaton.is_match(&folded)
        }
    }
}

/// Evaluates a single leaf condition against a document
#[async_trait]
pub trait LeafEvaluator: Send + Sync {
    /// Match verdict for `condition`
    ///
    /// Failures are reported as [`Error::ConditionEvaluation`].
    async fn evaluate_leaf(
        &self,
        condition: &Condition,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<bool>;
}

/// Reference leaf evaluator
///
/// A leaf matches when any value of any resolved field satisfies it.
#[derive(Default)]
pub struct BuiltinLeafEvaluator {
    regex_cache: Mutex<HashMap<String, Regex>>,
    /// Matchers for the snapshot fingerprint seen last
    lexicon_cache: Mutex<HashMap<(String, LexiconId), Arc<LexiconMatcher>>>,
}

impl BuiltinLeafEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn regex(&self, pattern: &str) -> Result<Regex> {
        let mut cache = self.regex_cache.lock();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }

        let regex = Regex::new(pattern)
            .map_err(|e| Error::condition(format!("invalid regex '{}': {}", pattern, e)))?;
        cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    fn lexicon_matcher(
        &self,
        snapshot: &EnvironmentSnapshot,
        lexicon_id: LexiconId,
    ) -> Result<Arc<LexiconMatcher>> {
        let key = (snapshot.fingerprint().to_string(), lexicon_id);
        let mut cache = self.lexicon_cache.lock();
        if let Some(matcher) = cache.get(&key) {
            return Ok(Arc::clone(matcher));
        }

        let lexicon = snapshot
            .lexicon(lexicon_id)
            .ok_or_else(|| Error::condition(format!("lexicon {} not found", lexicon_id)))?;
        let matcher = Arc::new(LexiconMatcher::build(lexicon)?);

        cache.retain(|(fingerprint, _), _| fingerprint == snapshot.fingerprint());
        cache.insert(key, Arc::clone(&matcher));
        Ok(matcher)
    }

    fn evaluate(
        &self,
        condition: &Condition,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<bool> {
        match condition {
            Condition::Text {
                field,
                value,
                mode,
                case_sensitive,
            } => {
                let values = snapshot.field_values(document, field);
                Ok(if *case_sensitive {
                    values.iter().any(|v| text_matches(v, value, *mode))
                } else {
                    let expected = value.to_lowercase();
                    values
                        .iter()
                        .any(|v| text_matches(&v.to_lowercase(), &expected, *mode))
                })
            }

            Condition::Regex { field, pattern } => {
                let regex = self.regex(pattern)?;
                Ok(snapshot
                    .field_values(document, field)
                    .iter()
                    .any(|v| regex.is_match(v)))
            }

            Condition::Date {
                field,
                operator,
                value,
            } => {
                let expected = parse_date(value).ok_or_else(|| {
                    Error::condition(format!("invalid date '{}' in condition on '{}'", value, field))
                })?;
                Ok(snapshot
                    .field_values(document, field)
                    .iter()
                    .filter_map(|v| parse_date(v))
                    .any(|actual| match operator {
                        DateOperator::Before => actual < expected,
                        DateOperator::After => actual > expected,
                        DateOperator::On => actual.date_naive() == expected.date_naive(),
                    }))
            }

            Condition::Number {
                field,
                operator,
                value,
            } => Ok(snapshot
                .field_values(document, field)
                .iter()
                .filter_map(|v| v.trim().parse::<f64>().ok())
                .any(|actual| match operator {
                    NumberOperator::Lt => actual < *value,
                    NumberOperator::Le => actual <= *value,
                    NumberOperator::Eq => actual == *value,
                    NumberOperator::Ge => actual >= *value,
                    NumberOperator::Gt => actual > *value,
                })),

            Condition::Exists { field } => Ok(!snapshot.field_values(document, field).is_empty()),

            Condition::Lexicon {
                field,
                lexicon_id,
                whole_value,
            } => {
                let matcher = self.lexicon_matcher(snapshot, *lexicon_id)?;
                if matcher.terms.is_empty() {
                    return Ok(false);
                }
                Ok(snapshot
                    .field_values(document, field)
                    .iter()
                    .any(|v| matcher.is_match(v, *whole_value)))
            }

            Condition::Expression { expression, .. } => Err(Error::condition(format!(
                "expression conditions need an external evaluator: '{}'",
                expression
            ))),

            other => Err(Error::condition(format!(
                "'{}' is not a leaf condition",
                other.kind()
            ))),
        }
    }
}

#[async_trait]
impl LeafEvaluator for BuiltinLeafEvaluator {
    async fn evaluate_leaf(
        &self,
        condition: &Condition,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<bool> {
        let matched = self.evaluate(condition, document, snapshot)?;
        trace!(
            kind = condition.kind(),
            field = condition.field().unwrap_or_default(),
            matched,
            "Evaluated leaf"
        );
        Ok(matched)
    }
}

fn text_matches(actual: &str, expected: &str, mode: TextMatchMode) -> bool {
    match mode {
        TextMatchMode::Equals => actual == expected,
        TextMatchMode::Contains => actual.contains(expected),
        TextMatchMode::StartsWith => actual.starts_with(expected),
        TextMatchMode::EndsWith => actual.ends_with(expected),
    }
}

/// Parse RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC)
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldLabel, Lexicon, RuleConfiguration};
    use uuid::Uuid;

    fn snapshot() -> EnvironmentSnapshot {
        let config = RuleConfiguration {
            lexicons: vec![Lexicon {
                id: 1,
                name: "finance".to_string(),
                terms: vec!["Invoice".to_string(), "receipt".to_string()],
            }],
            field_labels: vec![FieldLabel {
                name: "text".to_string(),
                fields: vec!["title".to_string(), "content".to_string()],
            }],
            ..Default::default()
        };
        EnvironmentSnapshot::build(config, Uuid::new_v4(), None).unwrap()
    }

    fn document() -> Document {
        Document::new("doc-1")
            .with_field("title", "Monthly INVOICE")
            .with_field("content", "hello")
            .with_field("pages", "12")
            .with_field("pages", "n/a")
            .with_field("received", "2024-03-15")
            .with_field("modified", "2024-03-15T10:30:00Z")
    }

    async fn eval(condition: Condition) -> Result<bool> {
        BuiltinLeafEvaluator::new()
            .evaluate_leaf(&condition, &document(), &snapshot())
            .await
    }

    fn text(field: &str, value: &str, mode: TextMatchMode, case_sensitive: bool) -> Condition {
        Condition::Text {
            field: field.to_string(),
            value: value.to_string(),
            mode,
            case_sensitive,
        }
    }

    #[tokio::test]
    async fn test_text_modes() {
        assert!(eval(text("content", "HELLO", TextMatchMode::Equals, false)).await.unwrap());
        assert!(!eval(text("content", "HELLO", TextMatchMode::Equals, true)).await.unwrap());
        assert!(eval(text("title", "invoice", TextMatchMode::Contains, false)).await.unwrap());
        assert!(eval(text("title", "monthly", TextMatchMode::StartsWith, false)).await.unwrap());
        assert!(!eval(text("title", "monthly", TextMatchMode::EndsWith, false)).await.unwrap());
        assert!(!eval(text("missing", "hello", TextMatchMode::Equals, false)).await.unwrap());
    }

    #[tokio::test]
    async fn test_text_through_field_label() {
        assert!(eval(text("text", "hello", TextMatchMode::Equals, false)).await.unwrap());
    }

    #[tokio::test]
    async fn test_regex() {
        let condition = Condition::Regex {
            field: "title".to_string(),
            pattern: r"(?i)^monthly\s+invoice$".to_string(),
        };
        assert!(eval(condition).await.unwrap());

        let invalid = Condition::Regex {
            field: "title".to_string(),
            pattern: "(".to_string(),
        };
        assert!(matches!(eval(invalid).await, Err(Error::ConditionEvaluation(_))));
    }

    #[tokio::test]
    async fn test_regex_cache_reused() {
        let evaluator = BuiltinLeafEvaluator::new();
        let condition = Condition::Regex {
            field: "content".to_string(),
            pattern: "hel+o".to_string(),
        };
        let (doc, snap) = (document(), snapshot());

        assert!(evaluator.evaluate_leaf(&condition, &doc, &snap).await.unwrap());
        assert!(evaluator.evaluate_leaf(&condition, &doc, &snap).await.unwrap());
        assert_eq!(evaluator.regex_cache.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_dates() {
        let date = |field: &str, operator, value: &str| Condition::Date {
            field: field.to_string(),
            operator,
            value: value.to_string(),
        };

        assert!(eval(date("received", DateOperator::Before, "2024-04-01")).await.unwrap());
        assert!(eval(date("received", DateOperator::After, "2024-01-01T00:00:00Z")).await.unwrap());
        assert!(eval(date("modified", DateOperator::On, "2024-03-15")).await.unwrap());
        assert!(!eval(date("modified", DateOperator::On, "2024-03-16")).await.unwrap());
        assert!(eval(date("received", DateOperator::On, "not a date")).await.is_err());
    }

    #[tokio::test]
    async fn test_numbers_skip_unparseable_values() {
        let number = |operator, value| Condition::Number {
            field: "pages".to_string(),
            operator,
            value,
        };

        assert!(eval(number(NumberOperator::Ge, 12.0)).await.unwrap());
        assert!(eval(number(NumberOperator::Eq, 12.0)).await.unwrap());
        assert!(!eval(number(NumberOperator::Gt, 12.0)).await.unwrap());
        assert!(eval(number(NumberOperator::Lt, 100.0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let exists = |field: &str| Condition::Exists {
            field: field.to_string(),
        };
        assert!(eval(exists("title")).await.unwrap());
        assert!(eval(exists("text")).await.unwrap());
        assert!(!eval(exists("author")).await.unwrap());
    }

    #[tokio::test]
    async fn test_lexicon() {
        let lexicon = |field: &str, whole_value| Condition::Lexicon {
            field: field.to_string(),
            lexicon_id: 1,
            whole_value,
        };

        assert!(eval(lexicon("title", false)).await.unwrap());
        assert!(!eval(lexicon("title", true)).await.unwrap());
        assert!(!eval(lexicon("content", false)).await.unwrap());

        let doc = Document::new("d").with_field("kind", "RECEIPT");
        let matched = BuiltinLeafEvaluator::new()
            .evaluate_leaf(&lexicon("kind", true), &doc, &snapshot())
            .await
            .unwrap();
        assert!(matched);
    }

    #[tokio::test]
    async fn test_lexicon_folds_unicode_case_in_both_modes() {
        let config = RuleConfiguration {
            lexicons: vec![Lexicon {
                id: 7,
                name: "schools".to_string(),
                terms: vec!["école".to_string()],
            }],
            ..Default::default()
        };
        let snapshot = EnvironmentSnapshot::build(config, Uuid::new_v4(), None).unwrap();
        let evaluator = BuiltinLeafEvaluator::new();
        let lexicon = |whole_value| Condition::Lexicon {
            field: "name".to_string(),
            lexicon_id: 7,
            whole_value,
        };

        let whole = Document::new("a").with_field("name", "ÉCOLE");
        let within = Document::new("b").with_field("name", "NOUVELLE ÉCOLE DU NORD");
        for (document, whole_value) in [(&whole, true), (&whole, false), (&within, false)] {
            let matched = evaluator
                .evaluate_leaf(&lexicon(whole_value), document, &snapshot)
                .await
                .unwrap();
            assert!(matched, "{} whole_value={}", document.reference, whole_value);
        }
    }

    #[tokio::test]
    async fn test_lexicon_matcher_reused_per_snapshot() {
        let evaluator = BuiltinLeafEvaluator::new();
        let first = snapshot();

        let a = evaluator.lexicon_matcher(&first, 1).unwrap();
        let b = evaluator.lexicon_matcher(&first, 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let mut changed = RuleConfiguration::default();
        changed.lexicons.push(Lexicon {
            id: 1,
            name: "finance".to_string(),
            terms: vec!["statement".to_string()],
        });
        let second = EnvironmentSnapshot::build(changed, Uuid::new_v4(), None).unwrap();
        let c = evaluator.lexicon_matcher(&second, 1).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(c.is_match("Bank STATEMENT", false));
        assert_eq!(evaluator.lexicon_cache.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_expression_and_composites_are_errors() {
        let expression = Condition::Expression {
            field: "content".to_string(),
            expression: "len > 3".to_string(),
        };
        assert!(matches!(eval(expression).await, Err(Error::ConditionEvaluation(_))));

        let composite = Condition::And { conditions: vec![] };
        assert!(eval(composite).await.is_err());
    }
}
