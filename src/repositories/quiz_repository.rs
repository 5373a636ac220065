use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn, Instrument};

use super::dynamodb::{
    dynamodb_span, list_of_maps, map_dynamodb_error, optional_datetime, optional_s, query_index,
    record_outcome, required_datetime, required_parsed, required_s, Item,
};
use crate::models::{Quiz, QuizAnswer, QuizCategory, QuizQuestion, RepositoryResult};

/// Data access for the question bank and submitted quizzes
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// All questions of a category (CategoryIndex GSI)
    async fn find_questions(&self, category: QuizCategory) -> RepositoryResult<Vec<QuizQuestion>>;

    async fn save_question(&self, question: QuizQuestion) -> RepositoryResult<QuizQuestion>;

    async fn create_quiz(&self, quiz: Quiz) -> RepositoryResult<Quiz>;

    async fn find_quiz(&self, id: &str) -> RepositoryResult<Option<Quiz>>;

    /// Quizzes submitted by a user (UserIndex GSI)
    async fn find_quizzes_by_user(&self, user_id: &str) -> RepositoryResult<Vec<Quiz>>;

    /// Store generated feedback text on an existing quiz
    async fn save_feedback(
        &self,
        id: &str,
        feedback: &str,
        generated_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;
}

/// DynamoDB implementation of the QuizRepository trait
pub struct DynamoDbQuizRepository {
    client: Arc<DynamoDbClient>,
    quizzes_table: String,
    questions_table: String,
    user_index: String,
    category_index: String,
    region: String,
}

impl DynamoDbQuizRepository {
    pub fn new(
        client: Arc<DynamoDbClient>,
        quizzes_table: String,
        questions_table: String,
        region: String,
    ) -> Self {
        Self {
            client,
            quizzes_table,
            questions_table,
            user_index: "UserIndex".to_string(),
            category_index: "CategoryIndex".to_string(),
            region,
        }
    }

    pub fn question_to_item(&self, question: &QuizQuestion) -> Item {
        let mut item = Item::new();
        item.insert("id".to_string(), AttributeValue::S(question.id.clone()));
        item.insert(
            "category".to_string(),
            AttributeValue::S(question.category.to_string()),
        );
        item.insert("text".to_string(), AttributeValue::S(question.text.clone()));
        item.insert(
            "options".to_string(),
            AttributeValue::L(
                question
                    .options
                    .iter()
                    .map(|o| AttributeValue::S(o.clone()))
                    .collect(),
            ),
        );
        item
    }

    pub fn item_to_question(&self, item: &Item) -> RepositoryResult<QuizQuestion> {
        let options = item
            .get("options")
            .and_then(|v| v.as_l().ok())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_s().ok().cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(QuizQuestion {
            id: required_s(item, "id")?,
            category: required_parsed(item, "category")?,
            text: required_s(item, "text")?,
            options,
        })
    }

    pub fn quiz_to_item(&self, quiz: &Quiz) -> Item {
        let mut item = Item::new();
        item.insert("id".to_string(), AttributeValue::S(quiz.id.clone()));
        item.insert(
            "user_id".to_string(),
            AttributeValue::S(quiz.user_id.clone()),
        );
        item.insert(
            "category".to_string(),
            AttributeValue::S(quiz.category.to_string()),
        );

        let answers: Vec<AttributeValue> = quiz
            .answers
            .iter()
            .map(|answer| {
                let mut map = Item::new();
                map.insert(
                    "question_id".to_string(),
                    AttributeValue::S(answer.question_id.clone()),
                );
                map.insert(
                    "question".to_string(),
                    AttributeValue::S(answer.question.clone()),
                );
                map.insert(
                    "answer".to_string(),
                    AttributeValue::S(answer.answer.clone()),
                );
                AttributeValue::M(map)
            })
            .collect();
        item.insert("answers".to_string(), AttributeValue::L(answers));

        if let Some(ref feedback) = quiz.feedback {
            item.insert("feedback".to_string(), AttributeValue::S(feedback.clone()));
        }
        if let Some(generated_at) = quiz.feedback_generated_at {
            item.insert(
                "feedback_generated_at".to_string(),
                AttributeValue::S(generated_at.to_rfc3339()),
            );
        }
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(quiz.created_at.to_rfc3339()),
        );
        item
    }

    pub fn item_to_quiz(&self, item: &Item) -> RepositoryResult<Quiz> {
        let answers = list_of_maps(item, "answers")
            .iter()
            .map(|map| {
                Ok(QuizAnswer {
                    question_id: required_s(map, "question_id")?,
                    question: required_s(map, "question")?,
                    answer: required_s(map, "answer")?,
                })
            })
            .collect::<RepositoryResult<Vec<_>>>()?;

        Ok(Quiz {
            id: required_s(item, "id")?,
            user_id: required_s(item, "user_id")?,
            category: required_parsed(item, "category")?,
            answers,
            feedback: optional_s(item, "feedback"),
            feedback_generated_at: optional_datetime(item, "feedback_generated_at"),
            created_at: required_datetime(item, "created_at")?,
        })
    }

    async fn put(&self, table_name: &str, item: Item, condition: &str) -> RepositoryResult<()> {
        async {
            let result = self
                .client
                .put_item()
                .table_name(table_name)
                .set_item(Some(item))
                .condition_expression(condition)
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), table_name))
        }
        .instrument(dynamodb_span("PutItem", table_name, &self.region))
        .await?;

        Ok(())
    }
}

#[async_trait]
impl QuizRepository for DynamoDbQuizRepository {
    #[instrument(skip(self), fields(table = %self.questions_table, category = %category))]
    async fn find_questions(&self, category: QuizCategory) -> RepositoryResult<Vec<QuizQuestion>> {
        let items = query_index(
            &self.client,
            &self.questions_table,
            &self.region,
            &self.category_index,
            "category",
            &category.to_string(),
        )
        .await?;

        let questions: Vec<QuizQuestion> = items
            .iter()
            .filter_map(|item| match self.item_to_question(item) {
                Ok(question) => Some(question),
                Err(e) => {
                    warn!("Failed to parse question item: {}", e);
                    None
                }
            })
            .collect();

        info!("Found {} questions", questions.len());
        Ok(questions)
    }

    #[instrument(skip(self, question), fields(table = %self.questions_table, id = %question.id))]
    async fn save_question(&self, question: QuizQuestion) -> RepositoryResult<QuizQuestion> {
        let item = self.question_to_item(&question);
        self.put(&self.questions_table, item, "attribute_not_exists(id)")
            .await?;
        Ok(question)
    }

    #[instrument(skip(self, quiz), fields(table = %self.quizzes_table, id = %quiz.id))]
    async fn create_quiz(&self, quiz: Quiz) -> RepositoryResult<Quiz> {
        info!("Creating new quiz");
        let item = self.quiz_to_item(&quiz);
        self.put(&self.quizzes_table, item, "attribute_not_exists(id)")
            .await?;
        Ok(quiz)
    }

    #[instrument(skip(self), fields(table = %self.quizzes_table, id = %id))]
    async fn find_quiz(&self, id: &str) -> RepositoryResult<Option<Quiz>> {
        let response = async {
            let result = self
                .client
                .get_item()
                .table_name(&self.quizzes_table)
                .key("id", AttributeValue::S(id.to_string()))
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), &self.quizzes_table))
        }
        .instrument(dynamodb_span("GetItem", &self.quizzes_table, &self.region))
        .await?;

        response
            .item
            .map(|item| self.item_to_quiz(&item))
            .transpose()
    }

    #[instrument(skip(self), fields(table = %self.quizzes_table, user_id = %user_id))]
    async fn find_quizzes_by_user(&self, user_id: &str) -> RepositoryResult<Vec<Quiz>> {
        let items = query_index(
            &self.client,
            &self.quizzes_table,
            &self.region,
            &self.user_index,
            "user_id",
            user_id,
        )
        .await?;

        Ok(items
            .iter()
            .filter_map(|item| match self.item_to_quiz(item) {
                Ok(quiz) => Some(quiz),
                Err(e) => {
                    warn!("Failed to parse quiz item: {}", e);
                    None
                }
            })
            .collect())
    }

    #[instrument(skip(self, feedback), fields(table = %self.quizzes_table, id = %id))]
    async fn save_feedback(
        &self,
        id: &str,
        feedback: &str,
        generated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        async {
            let result = self
                .client
                .update_item()
                .table_name(&self.quizzes_table)
                .key("id", AttributeValue::S(id.to_string()))
                .update_expression("SET feedback = :feedback, feedback_generated_at = :at")
                .expression_attribute_values(":feedback", AttributeValue::S(feedback.to_string()))
                .expression_attribute_values(":at", AttributeValue::S(generated_at.to_rfc3339()))
                .condition_expression("attribute_exists(id)")
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), &self.quizzes_table))
        }
        .instrument(dynamodb_span("UpdateItem", &self.quizzes_table, &self.region))
        .await?;

        info!("Quiz feedback saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_repository() -> DynamoDbQuizRepository {
        let config = aws_sdk_dynamodb::Config::builder()
            .region(aws_sdk_dynamodb::config::Region::new("us-east-1"))
            .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
            .build();
        let client = Arc::new(aws_sdk_dynamodb::Client::from_conf(config));
        DynamoDbQuizRepository::new(
            client,
            "test-quizzes".to_string(),
            "test-questions".to_string(),
            "us-east-1".to_string(),
        )
    }

    #[test]
    fn test_question_item_conversion() {
        let repo = test_repository();
        let question = QuizQuestion::new(
            QuizCategory::Skin,
            "How does your skin feel by midday?",
            &["Oily", "Dry", "Normal"],
        );

        let item = repo.question_to_item(&question);
        assert_eq!(
            item.get("category"),
            Some(&AttributeValue::S("skin".to_string()))
        );

        let converted = repo.item_to_question(&item).unwrap();
        assert_eq!(converted, question);
    }

    #[test]
    fn test_quiz_item_conversion() {
        let repo = test_repository();
        let mut quiz = Quiz::new(
            "Uuser0001".to_string(),
            QuizCategory::Hair,
            vec![QuizAnswer {
                question_id: "Qabc12345".to_string(),
                question: "How often do you wash your hair?".to_string(),
                answer: "Every other day".to_string(),
            }],
        );

        let item = repo.quiz_to_item(&quiz);
        assert!(!item.contains_key("feedback"));
        assert_eq!(repo.item_to_quiz(&item).unwrap(), quiz);

        quiz.set_feedback("Try a sulfate-free shampoo.".to_string());
        let item = repo.quiz_to_item(&quiz);
        let converted = repo.item_to_quiz(&item).unwrap();
        assert_eq!(converted.feedback, quiz.feedback);
        assert_eq!(converted.feedback_generated_at, quiz.feedback_generated_at);
    }
}
