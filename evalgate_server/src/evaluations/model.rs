use evalgate::UserId;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// The lowest accepted mood rating
pub const MIN_MOOD: i64 = 1;
/// The highest accepted mood rating
pub const MAX_MOOD: i64 = 10;
/// The mood rating assumed when none is given
pub const DEFAULT_MOOD: i64 = 5;
/// The processing status of a new evaluation
pub const DEFAULT_STATUS: &str = "pending";

/// A stored evaluation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
    /// Monotonic identifier, starting at 1
    pub id: u64,
    /// Caller-controlled content
    #[serde(flatten)]
    pub fields: EvaluationFields,
    /// The user who created the evaluation
    pub owner_id: UserId,
    /// When the evaluation was created
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the evaluation was last changed
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The fields of an evaluation that callers may set
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationFields {
    /// Free-form evaluation text
    pub content: String,
    /// Mood on a scale of 1 to 10
    pub mood_rating: i64,
    /// Whether the author asked to remain anonymous
    pub is_anonymous: bool,
    /// Sentiment score assigned by an analyzer
    pub ai_sentiment_score: Option<f64>,
    /// Tags assigned by an analyzer
    pub ai_tags: Vec<String>,
    /// Follow-up suggested by an analyzer
    pub ai_suggested_action: Option<String>,
    /// Where the evaluation is in analysis
    pub processing_status: String,
}

/// A field in a request body failed validation
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// The offending field
    pub field: &'static str,
    /// What was wrong with it
    pub message: String,
}

fn validate_mood(mood_rating: i64) -> Result<i64, ValidationError> {
    if (MIN_MOOD..=MAX_MOOD).contains(&mood_rating) {
        Ok(mood_rating)
    } else {
        Err(ValidationError {
            field: "mood_rating",
            message: format!("must be between {MIN_MOOD} and {MAX_MOOD}"),
        })
    }
}

/// Tags as they may arrive in a request body
#[derive(Deserialize)]
#[serde(untagged)]
enum TagsDto {
    List(Vec<String>),
    Joined(String),
}

impl From<TagsDto> for Vec<String> {
    fn from(dto: TagsDto) -> Self {
        match dto {
            TagsDto::List(tags) => tags,
            TagsDto::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<TagsDto>::deserialize(deserializer)?.map(Vec::from))
}

fn deserialize_present_tags<'de, D>(
    deserializer: D,
) -> Result<Option<Option<Vec<String>>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_tags(deserializer).map(Some)
}

// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`)
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A request to create an evaluation
#[derive(Clone, Debug, Deserialize)]
pub struct NewEvaluation {
    /// Free-form evaluation text
    pub content: String,
    /// Mood on a scale of 1 to 10
    #[serde(default = "default_mood")]
    pub mood_rating: i64,
    /// Whether the author asked to remain anonymous
    #[serde(default)]
    pub is_anonymous: bool,
    /// Sentiment score
    #[serde(default)]
    pub ai_sentiment_score: Option<f64>,
    /// Tags, as a list or a comma-separated string
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub ai_tags: Option<Vec<String>>,
    /// Suggested follow-up
    #[serde(default)]
    pub ai_suggested_action: Option<String>,
    /// Processing status, `"pending"` if empty or absent
    #[serde(default)]
    pub processing_status: Option<String>,
}

fn default_mood() -> i64 {
    DEFAULT_MOOD
}

impl NewEvaluation {
    /// Validates the request, filling in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the mood rating is out of range.
    pub fn validate(self) -> Result<EvaluationFields, ValidationError> {
        Ok(EvaluationFields {
            content: self.content,
            mood_rating: validate_mood(self.mood_rating)?,
            is_anonymous: self.is_anonymous,
            ai_sentiment_score: self.ai_sentiment_score,
            ai_tags: self.ai_tags.unwrap_or_default(),
            ai_suggested_action: self.ai_suggested_action,
            processing_status: self
                .processing_status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_STATUS.to_owned()),
        })
    }
}

/// A partial update to an evaluation
///
/// Only fields present in the request body are changed. An explicit `null`
/// clears the optional fields.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EvaluationUpdate {
    /// Free-form evaluation text
    #[serde(default)]
    pub content: Option<String>,
    /// Mood on a scale of 1 to 10
    #[serde(default)]
    pub mood_rating: Option<i64>,
    /// Whether the author asked to remain anonymous
    #[serde(default)]
    pub is_anonymous: Option<bool>,
    /// Sentiment score
    #[serde(default, deserialize_with = "deserialize_present")]
    pub ai_sentiment_score: Option<Option<f64>>,
    /// Tags, as a list or a comma-separated string
    #[serde(default, deserialize_with = "deserialize_present_tags")]
    pub ai_tags: Option<Option<Vec<String>>>,
    /// Suggested follow-up
    #[serde(default, deserialize_with = "deserialize_present")]
    pub ai_suggested_action: Option<Option<String>>,
    /// Processing status
    #[serde(default)]
    pub processing_status: Option<String>,
}

impl EvaluationUpdate {
    /// Applies the update to `fields`
    ///
    /// `fields` is left untouched if validation fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the mood rating is out of range.
    pub fn apply_to(self, fields: &mut EvaluationFields) -> Result<(), ValidationError> {
        let mood_rating = self.mood_rating.map(validate_mood).transpose()?;

        if let Some(content) = self.content {
            fields.content = content;
        }
        if let Some(mood_rating) = mood_rating {
            fields.mood_rating = mood_rating;
        }
        if let Some(is_anonymous) = self.is_anonymous {
            fields.is_anonymous = is_anonymous;
        }
        if let Some(score) = self.ai_sentiment_score {
            fields.ai_sentiment_score = score;
        }
        if let Some(tags) = self.ai_tags {
            fields.ai_tags = tags.unwrap_or_default();
        }
        if let Some(action) = self.ai_suggested_action {
            fields.ai_suggested_action = action;
        }
        if let Some(status) = self.processing_status {
            fields.processing_status = status;
        }

        Ok(())
    }
}
