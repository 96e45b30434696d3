// src/web/handlers/system_handlers.rs
use crate::interview::{InterviewService, INTRO_TEXT, QUESTIONS};
use crate::web::types::*;

use rocket::serde::json::Json;
use rocket::State;
use tracing::info;

pub async fn health_handler(service: &State<InterviewService>) -> Json<TextResponse> {
    let sessions = service.sessions().len().await;
    info!("Health check ({} active sessions)", sessions);

    Json(TextResponse::success(
        format!("Interview prep API is running ({} active sessions)", sessions),
        None,
    ))
}

pub async fn questions_handler() -> Json<DataResponse<QuestionsData>> {
    Json(DataResponse::success(
        format!("{} onboarding questions", QUESTIONS.len()),
        QuestionsData {
            intro: INTRO_TEXT.to_string(),
            questions: QUESTIONS.iter().map(|q| q.to_string()).collect(),
        },
        None,
    ))
}
