use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::models::{
    AuthenticatedUser, FeedbackQuery, QuestionQuery, Quiz, QuizFeedbackResponse, QuizQuestion,
    SubmitQuizRequest,
};

use super::api::{service_error_to_response, ApiState};
use super::extract::{ApiJson, ApiPath, ApiQuery};

/// Random questions for a new skin or hair quiz
#[instrument(name = "sample_questions", skip(state, user), fields(
    user_id = %user.user_id,
    category = %query.category,
    count = ?query.count,
))]
pub async fn sample_questions(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<QuestionQuery>,
) -> Result<Json<Vec<QuizQuestion>>, (StatusCode, Json<Value>)> {
    state
        .quizzes
        .sample_questions(query.category, query.count)
        .await
        .map(Json)
        .map_err(|err| {
            error!("Failed to sample questions: {}", err);
            service_error_to_response(err)
        })
}

#[instrument(name = "submit_quiz", skip(state, user, request), fields(
    user_id = %user.user_id,
    category = %request.category,
    answers = request.answers.len(),
))]
pub async fn submit_quiz(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<SubmitQuizRequest>,
) -> Result<(StatusCode, Json<Quiz>), (StatusCode, Json<Value>)> {
    match state.quizzes.submit_quiz(&user, request).await {
        Ok(quiz) => {
            info!(quiz_id = %quiz.id, "Quiz stored");
            Ok((StatusCode::CREATED, Json(quiz)))
        }
        Err(err) => {
            error!("Failed to submit quiz: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

#[instrument(name = "list_quizzes", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_quizzes(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Quiz>>, (StatusCode, Json<Value>)> {
    state
        .quizzes
        .list_quizzes(&user)
        .await
        .map(Json)
        .map_err(service_error_to_response)
}

#[instrument(name = "get_quiz", skip(state, user), fields(user_id = %user.user_id, quiz_id = %quiz_id))]
pub async fn get_quiz(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiPath(quiz_id): ApiPath<String>,
) -> Result<Json<Quiz>, (StatusCode, Json<Value>)> {
    state
        .quizzes
        .get_quiz(&user, &quiz_id)
        .await
        .map(Json)
        .map_err(service_error_to_response)
}

/// Stored feedback, or freshly generated advice when missing or `regenerate=true`
#[instrument(name = "quiz_feedback", skip(state, user), fields(
    user_id = %user.user_id,
    quiz_id = %quiz_id,
    regenerate = query.regenerate,
))]
pub async fn generate_feedback(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiPath(quiz_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<FeedbackQuery>,
) -> Result<Json<QuizFeedbackResponse>, (StatusCode, Json<Value>)> {
    let result = state
        .business
        .trace_feedback_request(state.quizzes.generate_feedback(
            &user,
            &quiz_id,
            query.regenerate,
        ))
        .await;

    match result {
        Ok(response) => {
            crate::info_with_trace!(
                quiz_id = %response.quiz_id,
                regenerated = response.regenerated,
                "Quiz feedback returned"
            );
            Ok(Json(response))
        }
        Err(err) => {
            crate::error_with_trace!("Failed to produce quiz feedback: {}", err);
            Err(service_error_to_response(err))
        }
    }
}
