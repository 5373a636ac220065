use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{generate_id, QuizCategory};

/// A question in the skin or hair question bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub category: QuizCategory,
    pub text: String,
    pub options: Vec<String>,
}

/// A submitted questionnaire, later annotated with generated feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub user_id: String,
    pub category: QuizCategory,
    pub answers: Vec<QuizAnswer>,
    pub feedback: Option<String>,
    pub feedback_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub question_id: String,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitQuizRequest {
    pub category: QuizCategory,
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionQuery {
    pub category: QuizCategory,
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackQuery {
    #[serde(default)]
    pub regenerate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizFeedbackResponse {
    pub quiz_id: String,
    pub feedback: String,
    pub generated_at: DateTime<Utc>,
    pub regenerated: bool,
}

impl QuizQuestion {
    pub fn new(category: QuizCategory, text: &str, options: &[&str]) -> Self {
        Self {
            id: generate_id('Q'),
            category,
            text: text.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }
}

impl Quiz {
    pub fn new(user_id: String, category: QuizCategory, answers: Vec<QuizAnswer>) -> Self {
        Self {
            id: generate_id('Z'),
            user_id,
            category,
            answers,
            feedback: None,
            feedback_generated_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn set_feedback(&mut self, feedback: String) {
        self.feedback = Some(feedback);
        self.feedback_generated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_creation() {
        let question = QuizQuestion::new(
            QuizCategory::Hair,
            "How often do you wash your hair?",
            &["Daily", "Weekly"],
        );
        assert!(question.id.starts_with('Q'));
        assert_eq!(question.options, vec!["Daily", "Weekly"]);
    }

    #[test]
    fn test_quiz_feedback() {
        let mut quiz = Quiz::new("Uuser0001".to_string(), QuizCategory::Skin, vec![]);
        assert!(quiz.id.starts_with('Z'));
        assert!(quiz.feedback.is_none());

        quiz.set_feedback("Use sunscreen daily.".to_string());
        assert_eq!(quiz.feedback.as_deref(), Some("Use sunscreen daily."));
        assert!(quiz.feedback_generated_at.is_some());
    }

    #[test]
    fn test_feedback_query_defaults() {
        let query: FeedbackQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.regenerate);
    }
}
