use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;

use crate::models::{
    AuthenticatedUser, Quiz, QuizAnswer, QuizCategory, QuizFeedbackResponse, QuizQuestion,
    ServiceError, ServiceResult, SubmitQuizRequest, Validate,
};
use crate::repositories::QuizRepository;
use crate::services::feedback_client::{FeedbackError, FeedbackGenerator};
use crate::services::insert_with_fresh_id;

pub const DEFAULT_QUESTION_COUNT: usize = 5;
pub const MAX_QUESTION_COUNT: usize = 20;

/// Skin and hair quizzes with generated feedback
pub struct QuizService {
    repository: Arc<dyn QuizRepository>,
    generator: Option<Arc<dyn FeedbackGenerator>>,
}

impl QuizService {
    pub fn new(
        repository: Arc<dyn QuizRepository>,
        generator: Option<Arc<dyn FeedbackGenerator>>,
    ) -> Self {
        Self {
            repository,
            generator,
        }
    }

    /// Random distinct questions from the category's bank
    #[instrument(skip(self))]
    pub async fn sample_questions(
        &self,
        category: QuizCategory,
        count: Option<usize>,
    ) -> ServiceResult<Vec<QuizQuestion>> {
        let count = count
            .unwrap_or(DEFAULT_QUESTION_COUNT)
            .clamp(1, MAX_QUESTION_COUNT);
        let bank = self.repository.find_questions(category).await?;

        let sample: Vec<QuizQuestion> = bank
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect();

        crate::info_with_trace!(bank_size = bank.len(), sampled = sample.len(), "Sampled quiz questions");
        Ok(sample)
    }

    #[instrument(skip(self, user, request), fields(user_id = %user.user_id, category = %request.category))]
    pub async fn submit_quiz(
        &self,
        user: &AuthenticatedUser,
        request: SubmitQuizRequest,
    ) -> ServiceResult<Quiz> {
        request.validate()?;

        let bank: HashMap<String, QuizQuestion> = self
            .repository
            .find_questions(request.category)
            .await?
            .into_iter()
            .map(|question| (question.id.clone(), question))
            .collect();

        let answers = request
            .answers
            .into_iter()
            .map(|submitted| {
                let question = bank.get(&submitted.question_id).ok_or_else(|| {
                    ServiceError::ValidationError {
                        message: format!(
                            "Question {} is not part of the {} quiz",
                            submitted.question_id, request.category
                        ),
                    }
                })?;
                Ok(QuizAnswer {
                    question_id: submitted.question_id,
                    question: question.text.clone(),
                    answer: submitted.answer.trim().to_string(),
                })
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        let quiz = insert_with_fresh_id(
            Quiz::new(user.user_id.clone(), request.category, answers),
            |quiz| self.repository.create_quiz(quiz),
        )
        .await?;

        crate::info_with_trace!(quiz_id = %quiz.id, "Quiz submitted");
        Ok(quiz)
    }

    /// Stored feedback is returned as-is unless `regenerate` is set
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn generate_feedback(
        &self,
        user: &AuthenticatedUser,
        quiz_id: &str,
        regenerate: bool,
    ) -> ServiceResult<QuizFeedbackResponse> {
        let quiz = self.get_quiz(user, quiz_id).await?;

        if !regenerate {
            if let (Some(feedback), Some(generated_at)) =
                (quiz.feedback.clone(), quiz.feedback_generated_at)
            {
                return Ok(QuizFeedbackResponse {
                    quiz_id: quiz.id,
                    feedback,
                    generated_at,
                    regenerated: false,
                });
            }
        }

        let generator = self
            .generator
            .as_ref()
            .ok_or(FeedbackError::NotConfigured)?;
        let feedback = generator.generate(quiz.category, &quiz.answers).await?;

        let mut quiz = quiz;
        quiz.set_feedback(feedback);
        let generated_at = quiz.feedback_generated_at.unwrap_or(quiz.created_at);
        let feedback = quiz.feedback.unwrap_or_default();

        self.repository
            .save_feedback(&quiz.id, &feedback, generated_at)
            .await?;

        crate::info_with_trace!(quiz_id = %quiz.id, "Quiz feedback stored");
        Ok(QuizFeedbackResponse {
            quiz_id: quiz.id,
            feedback,
            generated_at,
            regenerated: true,
        })
    }

    /// The caller's quizzes, newest first
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn list_quizzes(&self, user: &AuthenticatedUser) -> ServiceResult<Vec<Quiz>> {
        let mut quizzes = self.repository.find_quizzes_by_user(&user.user_id).await?;
        quizzes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quizzes)
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn get_quiz(&self, user: &AuthenticatedUser, id: &str) -> ServiceResult<Quiz> {
        let quiz = self
            .repository
            .find_quiz(id)
            .await?
            .ok_or_else(|| ServiceError::QuizNotFound { id: id.to_string() })?;

        if !user.can_act_for(&quiz.user_id) {
            return Err(ServiceError::forbidden("Quiz belongs to another user"));
        }
        Ok(quiz)
    }

    /// Insert built-in questions whose text is not in the bank yet.
    /// Returns how many were added.
    #[instrument(skip(self))]
    pub async fn seed_default_questions(&self) -> ServiceResult<usize> {
        let mut added = 0;

        for category in [QuizCategory::Skin, QuizCategory::Hair] {
            let existing: HashSet<String> = self
                .repository
                .find_questions(category)
                .await?
                .into_iter()
                .map(|question| question.text)
                .collect();

            for question in default_questions(category) {
                if existing.contains(&question.text) {
                    continue;
                }
                self.repository.save_question(question).await?;
                added += 1;
            }
        }

        crate::info_with_trace!(added = added, "Seeded default quiz questions");
        Ok(added)
    }
}

const SKIN_QUESTIONS: &[(&str, &[&str])] = &[
    (
        "How does your skin feel a few hours after washing?",
        &["Tight", "Comfortable", "Oily in the T-zone", "Oily all over"],
    ),
    (
        "How often do you get breakouts?",
        &["Rarely", "Before my period or when stressed", "Weekly", "Constantly"],
    ),
    (
        "How does your skin react to new products?",
        &["No reaction", "Occasional redness", "Often stings or itches"],
    ),
    (
        "How visible are your pores?",
        &["Barely visible", "Visible on the nose", "Large across the face"],
    ),
    (
        "How much time do you spend in the sun each day?",
        &["Under 30 minutes", "1-2 hours", "Most of the day"],
    ),
    (
        "Do you wear sunscreen daily?",
        &["Always", "Sometimes", "Never"],
    ),
    (
        "Which concern bothers you most?",
        &["Dryness", "Acne", "Dark spots", "Fine lines", "Redness"],
    ),
    (
        "How many glasses of water do you drink a day?",
        &["Fewer than 4", "4-8", "More than 8"],
    ),
    (
        "How many hours do you usually sleep?",
        &["Under 6", "6-8", "More than 8"],
    ),
    (
        "What does your current routine include?",
        &["Nothing", "Cleanser only", "Cleanser and moisturizer", "A full multi-step routine"],
    ),
];

const HAIR_QUESTIONS: &[(&str, &[&str])] = &[
    (
        "How would you describe your hair texture?",
        &["Straight", "Wavy", "Curly", "Coily"],
    ),
    (
        "How quickly does your scalp get oily?",
        &["Within a day", "After 2-3 days", "Rarely"],
    ),
    (
        "How often do you wash your hair?",
        &["Daily", "Every 2-3 days", "Weekly or less"],
    ),
    (
        "How often do you use heat styling tools?",
        &["Daily", "A few times a week", "Rarely", "Never"],
    ),
    (
        "Has your hair been colored or chemically treated in the last year?",
        &["No", "Colored", "Bleached", "Permed or relaxed"],
    ),
    (
        "Do you notice split ends or breakage?",
        &["No", "A little", "A lot"],
    ),
    (
        "Do you experience dandruff or an itchy scalp?",
        &["Never", "Occasionally", "Often"],
    ),
    (
        "How thick is each strand of your hair?",
        &["Fine", "Medium", "Coarse"],
    ),
    (
        "What is your main hair goal?",
        &["More volume", "Less frizz", "Repair damage", "Faster growth", "Low maintenance"],
    ),
    (
        "How long has it been since your last haircut?",
        &["Under 6 weeks", "2-3 months", "Over 3 months"],
    ),
];

/// Built-in question bank
pub fn default_questions(category: QuizCategory) -> Vec<QuizQuestion> {
    let bank = match category {
        QuizCategory::Skin => SKIN_QUESTIONS,
        QuizCategory::Hair => HAIR_QUESTIONS,
    };

    bank.iter()
        .map(|(text, options)| QuizQuestion::new(category, text, options))
        .collect()
}
