//! Rating-object extraction for evaluation responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::json::{extract_json_object, ObjectExtraction};

/// The four criteria every rating object must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    PromptRelevance,
    AestheticQuality,
    ContentCoherence,
    Artifacts,
}

impl Criterion {
    pub fn all() -> [Criterion; 4] {
        [
            Criterion::PromptRelevance,
            Criterion::AestheticQuality,
            Criterion::ContentCoherence,
            Criterion::Artifacts,
        ]
    }

    /// JSON key of the criterion.
    pub fn key(&self) -> &'static str {
        match self {
            Criterion::PromptRelevance => "prompt_relevance",
            Criterion::AestheticQuality => "aesthetic_quality",
            Criterion::ContentCoherence => "content_coherence",
            Criterion::Artifacts => "artifacts",
        }
    }
}

/// Why a response could not be turned into a rating.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RatingError {
    #[error("response did not contain a usable JSON object ({0})")]
    NoObject(String),

    #[error("rating is missing keys {missing:?}; got {received:?}")]
    MissingKeys {
        missing: Vec<String>,
        received: Vec<String>,
    },
}

/// A validated rating object.
///
/// Only key presence is checked. Values are kept exactly as the evaluator
/// returned them, including out-of-range or non-integer scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingScores(Map<String, Value>);

impl RatingScores {
    /// Validates a decoded object, rejecting it if any criterion is missing.
    pub fn from_object(object: Map<String, Value>) -> Result<Self, RatingError> {
        let missing: Vec<String> = Criterion::all()
            .iter()
            .filter(|c| !object.contains_key(c.key()))
            .map(|c| c.key().to_string())
            .collect();

        if !missing.is_empty() {
            return Err(RatingError::MissingKeys {
                missing,
                received: object.keys().cloned().collect(),
            });
        }

        Ok(Self(object))
    }

    /// Integer score for a criterion, if the stored value is an integer.
    pub fn score(&self, criterion: Criterion) -> Option<i64> {
        self.0.get(criterion.key()).and_then(Value::as_i64)
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Extracts and validates a rating object from raw evaluator text.
///
/// Never panics; any failure is reported as a [`RatingError`] so that no
/// partial rating can be persisted.
pub fn parse_rating(text: &str) -> Result<RatingScores, RatingError> {
    match extract_json_object(text) {
        ObjectExtraction::Found(object) => RatingScores::from_object(object),
        other => Err(RatingError::NoObject(other.describe())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_rating() {
        let text = "```json\n{\"prompt_relevance\":4,\"aesthetic_quality\":5,\"content_coherence\":3,\"artifacts\":5}\n```";
        let rating = parse_rating(text).expect("valid rating");

        assert_eq!(rating.as_object().len(), 4);
        assert_eq!(rating.score(Criterion::PromptRelevance), Some(4));
        assert_eq!(rating.score(Criterion::AestheticQuality), Some(5));
        assert_eq!(rating.score(Criterion::ContentCoherence), Some(3));
        assert_eq!(rating.score(Criterion::Artifacts), Some(5));
    }

    #[test]
    fn test_missing_key_rejected() {
        let text = "{\"prompt_relevance\":4,\"aesthetic_quality\":5,\"artifacts\":5}";
        let err = parse_rating(text).expect_err("missing key");
        match err {
            RatingError::MissingKeys { missing, received } => {
                assert_eq!(missing, vec!["content_coherence".to_string()]);
                assert_eq!(received.len(), 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_values_accepted() {
        let text = "{\"prompt_relevance\":9,\"aesthetic_quality\":0,\"content_coherence\":\"3\",\"artifacts\":5}";
        let rating = parse_rating(text).expect("permissive");
        assert_eq!(rating.score(Criterion::PromptRelevance), Some(9));
        assert_eq!(rating.score(Criterion::ContentCoherence), None);
        assert_eq!(
            rating.as_object().get("content_coherence"),
            Some(&Value::from("3"))
        );
    }

    #[test]
    fn test_garbage_is_no_object() {
        assert!(matches!(
            parse_rating("I cannot rate this image."),
            Err(RatingError::NoObject(_))
        ));
        assert!(matches!(parse_rating(""), Err(RatingError::NoObject(_))));
    }

    #[test]
    fn test_rating_serializes_as_plain_object() {
        let rating = parse_rating(
            "{\"prompt_relevance\":1,\"aesthetic_quality\":2,\"content_coherence\":3,\"artifacts\":4}",
        )
        .expect("valid");
        let value = serde_json::to_value(&rating).expect("serialize");
        assert_eq!(value["artifacts"], Value::from(4));
    }
}
