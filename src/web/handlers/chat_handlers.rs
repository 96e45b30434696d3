// src/web/handlers/chat_handlers.rs
//! Interview chat turns, whole or streamed as server-sent events

use crate::app_log;
use crate::interview::InterviewService;
use crate::web::types::*;

use futures::stream::{self, BoxStream, StreamExt};
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::State;

use super::{parse_session_id, workflow_error};

pub async fn chat_handler(
    id: &str,
    request: Json<ChatRequest>,
    service: &State<InterviewService>,
) -> Result<Json<DataResponse<ChatReplyData>>, Json<StandardErrorResponse>> {
    let id = parse_session_id(id)?;

    let reply = service
        .send_turn(id, &request.message)
        .await
        .map_err(|e| workflow_error(e, id))?;

    let turns = service.transcript(id).await.map_or(0, |t| t.len());
    app_log!(info, "Session {} chat reply ({} turns)", id, turns);

    Ok(Json(DataResponse::success(
        "Interviewer replied".to_string(),
        ChatReplyData { reply, turns },
        Some(id.to_string()),
    )))
}

/// `chunk` events carry reply text; a failed turn adds one `error` event.
/// The stream always ends with `done`.
pub async fn chat_stream_handler(
    id: &str,
    request: Json<ChatRequest>,
    service: &State<InterviewService>,
) -> Result<EventStream<BoxStream<'static, Event>>, Json<StandardErrorResponse>> {
    let id = parse_session_id(id)?;

    let replies = service
        .stream_turn(id, &request.message)
        .await
        .map_err(|e| workflow_error(e, id))?;

    app_log!(info, "Session {} streaming chat reply", id);

    let events = replies
        .map(move |chunk| match chunk {
            Ok(text) => Event::data(text).event("chunk"),
            Err(e) => Event::json(&StandardErrorResponse::from_workflow(&e, Some(id.to_string())))
                .event("error"),
        })
        .chain(stream::once(async { Event::data("").event("done") }))
        .boxed();

    Ok(EventStream::from(events))
}
