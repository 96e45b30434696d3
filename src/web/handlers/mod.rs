pub mod chat_handlers;
pub mod session_handlers;
pub mod system_handlers;

pub use chat_handlers::*;
pub use session_handlers::*;
pub use system_handlers::*;

use rocket::serde::json::Json;
use uuid::Uuid;

use crate::interview::WorkflowError;
use crate::web::types::StandardErrorResponse;

/// Parse the `<id>` path segment of a session route
pub(crate) fn parse_session_id(id: &str) -> Result<Uuid, Json<StandardErrorResponse>> {
    Uuid::parse_str(id.trim()).map_err(|_| {
        Json(StandardErrorResponse::new(
            format!("Invalid session id: {}", id),
            "SESSION_NOT_FOUND".to_string(),
            vec!["Create a new session with POST /api/sessions".to_string()],
            None,
        ))
    })
}

pub(crate) fn workflow_error(error: WorkflowError, id: Uuid) -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::from_workflow(
        &error,
        Some(id.to_string()),
    ))
}
