// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::html::clean_html;

pub type QuestionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// An immutable multiple-choice question owned by the question bank.
/// The engine only ever references it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: QuestionId,

    pub category_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic_id: Option<String>,

    /// The text content of the question.
    pub prompt: String,

    /// At least two options.
    pub options: Vec<String>,

    /// Zero-based index into `options`.
    pub correct_option_index: usize,

    /// Explanation or analysis of the correct answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

/// DTO for sending a question to a test taker (excludes the answer and explanation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub category_id: String,
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<&QuestionRecord> for PublicQuestion {
    fn from(q: &QuestionRecord) -> Self {
        Self {
            id: q.id.clone(),
            category_id: q.category_id.clone(),
            prompt: q.prompt.clone(),
            options: q.options.clone(),
        }
    }
}

/// Filter understood by the question bank. Every populated field narrows the
/// result; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFilter {
    pub category_id: Option<String>,
    pub subject_id: Option<String>,
    pub topic_id: Option<String>,
    pub subtopic_id: Option<String>,
}

impl QuestionFilter {
    pub fn matches(&self, q: &QuestionRecord) -> bool {
        fn field_matches(want: &Option<String>, have: Option<&String>) -> bool {
            match want {
                Some(w) => have == Some(w),
                None => true,
            }
        }

        field_matches(&self.category_id, Some(&q.category_id))
            && field_matches(&self.subject_id, q.subject_id.as_ref())
            && field_matches(&self.topic_id, q.topic_id.as_ref())
            && field_matches(&self.subtopic_id, q.subtopic_id.as_ref())
    }
}

/// DTO for importing a question into the bank.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_correct_option))]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(length(min = 1, max = 64))]
    pub category_id: String,
    pub subject_id: Option<String>,
    pub topic_id: Option<String>,
    pub subtopic_id: Option<String>,
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    pub correct_option_index: usize,
    #[validate(length(max = 4000))]
    pub explanation: Option<String>,
    pub difficulty: Option<Difficulty>,
}

impl CreateQuestionRequest {
    /// Builds the stored record, sanitising every free-text field.
    pub fn into_record(self) -> QuestionRecord {
        QuestionRecord {
            id: self.id,
            category_id: self.category_id,
            subject_id: self.subject_id,
            topic_id: self.topic_id,
            subtopic_id: self.subtopic_id,
            prompt: clean_html(&self.prompt),
            options: self.options.iter().map(|o| clean_html(o)).collect(),
            correct_option_index: self.correct_option_index,
            explanation: self.explanation.as_deref().map(clean_html),
            difficulty: self.difficulty,
        }
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    for opt in options {
        if opt.is_empty() || opt.len() > 500 {
            return Err(validator::ValidationError::new("invalid_option_length"));
        }
    }
    Ok(())
}

fn validate_correct_option(req: &CreateQuestionRequest) -> Result<(), validator::ValidationError> {
    if req.correct_option_index >= req.options.len() {
        return Err(validator::ValidationError::new("correct_option_out_of_range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: Vec<&str>, correct: usize) -> CreateQuestionRequest {
        CreateQuestionRequest {
            id: "q1".into(),
            category_id: "math".into(),
            subject_id: None,
            topic_id: None,
            subtopic_id: None,
            prompt: "2 + 2 = ?".into(),
            options: options.into_iter().map(String::from).collect(),
            correct_option_index: correct,
            explanation: Some("<script>x</script>Basic addition".into()),
            difficulty: Some(Difficulty::Easy),
        }
    }

    #[test]
    fn test_question_request_validation() {
        assert!(request(vec!["3", "4"], 1).validate().is_ok());
        assert!(request(vec!["4"], 0).validate().is_err());
        assert!(request(vec!["3", "4"], 2).validate().is_err());
    }

    #[test]
    fn test_into_record_sanitizes_text() {
        let record = request(vec!["3", "4"], 1).into_record();
        assert_eq!(record.explanation.as_deref(), Some("Basic addition"));
    }

    #[test]
    fn test_filter_composes_as_intersection() {
        let mut q = request(vec!["3", "4"], 1).into_record();
        q.subject_id = Some("arith".into());

        let by_category = QuestionFilter {
            category_id: Some("math".into()),
            ..Default::default()
        };
        assert!(by_category.matches(&q));

        let narrower = QuestionFilter {
            category_id: Some("math".into()),
            topic_id: Some("fractions".into()),
            ..Default::default()
        };
        assert!(!narrower.matches(&q));
    }
}
