// src/web/handlers/session_handlers.rs
//! Session lifecycle, input collection and processing

use crate::interview::onboarding::QUESTIONS;
use crate::interview::{
    ChatTurn, CredentialsUpdate, InterviewService, SessionView, WizardStep, WorkflowError,
};
use crate::web::types::*;
use crate::app_log;

use rocket::form::Form;
use rocket::serde::json::Json;
use rocket::State;

use super::{parse_session_id, workflow_error};

type ApiResult<T> = Result<Json<T>, Json<StandardErrorResponse>>;

pub async fn create_session_handler(
    service: &State<InterviewService>,
) -> Json<DataResponse<SessionView>> {
    let view = service.create_session().await;
    let id = view.id.to_string();

    Json(DataResponse::success(
        "Session created. Enter your Gemini API key to begin.".to_string(),
        view,
        Some(id),
    ))
}

pub async fn get_session_handler(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<SessionView>> {
    let id = parse_session_id(id)?;
    let view = service.view(id).await.map_err(|e| workflow_error(e, id))?;

    Ok(Json(DataResponse::success(
        format!("Session is {}", stage_label(&view)),
        view,
        Some(id.to_string()),
    )))
}

pub async fn delete_session_handler(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<ActionResponse> {
    let id = parse_session_id(id)?;
    service
        .remove_session(id)
        .await
        .map_err(|e| workflow_error(e, id))?;

    Ok(Json(ActionResponse::success(
        "Session discarded".to_string(),
        "deleted".to_string(),
        Some(id.to_string()),
    )))
}

pub async fn update_credentials_handler(
    id: &str,
    request: Json<CredentialsUpdate>,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<SessionView>> {
    let id = parse_session_id(id)?;
    let view = service
        .set_credentials(id, request.into_inner())
        .await
        .map_err(|e| workflow_error(e, id))?;

    Ok(Json(DataResponse::success(
        "Credentials updated".to_string(),
        view,
        Some(id.to_string()),
    )))
}

pub async fn upload_cv_handler(
    id: &str,
    mut upload: Form<CvUploadForm<'_>>,
    service: &State<InterviewService>,
) -> ApiResult<ActionResponse> {
    let id = parse_session_id(id)?;

    // metadata first; persist_to() moves the file
    let content_type = upload.cv_file.content_type();
    let is_pdf = content_type.map_or(false, |ct| ct.is_pdf());
    let file_size = upload.cv_file.len();

    let file_name = match upload.cv_file.raw_name() {
        Some(name) if is_pdf => format!("{}.pdf", name.as_str().unwrap_or("uploaded_cv")),
        Some(name) => name.dangerous_unsafe_unsanitized_raw().as_str().to_string(),
        None if is_pdf => "uploaded_cv.pdf".to_string(),
        None => "uploaded_cv".to_string(),
    };

    app_log!(
        info,
        "CV upload '{}' ({} bytes, content type: {})",
        file_name,
        file_size,
        content_type
            .map(|ct| ct.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    let limit = service.settings().max_upload_bytes;
    if file_size > limit {
        return Err(workflow_error(
            WorkflowError::FileTooLarge {
                size: file_size,
                limit,
            },
            id,
        ));
    }

    let temp_path = std::env::temp_dir().join(format!("cv_upload_{}", uuid::Uuid::new_v4()));

    if let Err(e) = upload.cv_file.persist_to(&temp_path).await {
        app_log!(error, "Failed to save uploaded file: {}", e);
        return Err(Json(StandardErrorResponse::new(
            "Failed to process uploaded file".to_string(),
            "INTERNAL_ERROR".to_string(),
            vec!["Try uploading the file again".to_string()],
            Some(id.to_string()),
        )));
    }

    let bytes = tokio::fs::read(&temp_path).await;
    let _ = tokio::fs::remove_file(&temp_path).await;

    let bytes = bytes.map_err(|e| {
        app_log!(error, "Failed to read uploaded file: {}", e);
        Json(StandardErrorResponse::new(
            "Failed to read uploaded file".to_string(),
            "INTERNAL_ERROR".to_string(),
            vec!["Try uploading the file again".to_string()],
            Some(id.to_string()),
        ))
    })?;

    let cv = service
        .upload_cv(id, &file_name, &bytes)
        .await
        .map_err(|e| workflow_error(e, id))?;

    let characters = cv.text().map_or(0, |text| text.chars().count());
    let response = ActionResponse::success(
        format!(
            "CV '{}' uploaded and text extracted ({} characters)",
            file_name, characters
        ),
        "extracted".to_string(),
        Some(id.to_string()),
    )
    .with_next_actions(vec![
        "Answer the onboarding questions".to_string(),
        "Process your information to start the interview".to_string(),
    ]);

    Ok(Json(response))
}

pub async fn set_answer_handler(
    id: &str,
    index: usize,
    request: Json<AnswerRequest>,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<AnswersData>> {
    let id = parse_session_id(id)?;
    let answers = service
        .set_answer(id, index, &request.answer)
        .await
        .map_err(|e| workflow_error(e, id))?;

    let answered = answers.answered_count();
    Ok(Json(DataResponse::success(
        format!("{} of {} questions answered", answered, QUESTIONS.len()),
        AnswersData { answers, answered },
        Some(id.to_string()),
    )))
}

pub async fn move_wizard_handler(
    id: &str,
    direction: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<WizardData>> {
    let id = parse_session_id(id)?;

    let step = WizardStep::parse(direction).ok_or_else(|| {
        Json(StandardErrorResponse::new(
            format!("Unknown wizard direction: {}", direction),
            "BAD_REQUEST".to_string(),
            vec!["Use 'next' or 'back'".to_string()],
            Some(id.to_string()),
        ))
    })?;

    let position = service
        .move_wizard(id, step)
        .await
        .map_err(|e| workflow_error(e, id))?;

    Ok(Json(DataResponse::success(
        format!("Question {} of {}", position + 1, QUESTIONS.len()),
        WizardData {
            position,
            question: QUESTIONS[position].to_string(),
            is_first: position == 0,
            is_last: position + 1 == QUESTIONS.len(),
        },
        Some(id.to_string()),
    )))
}

pub async fn process_handler(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<ProcessData>> {
    let id = parse_session_id(id)?;
    let outcome = service.process(id).await.map_err(|e| workflow_error(e, id))?;

    Ok(Json(DataResponse::success(
        "Summary generated! The interview has started.".to_string(),
        ProcessData {
            summary: outcome.summary,
            linkedin_status: outcome.linkedin.status_text(),
            opening_line: outcome.opening_line,
        },
        Some(id.to_string()),
    )))
}

pub async fn reset_handler(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<SessionView>> {
    let id = parse_session_id(id)?;
    let view = service.reset(id).await.map_err(|e| workflow_error(e, id))?;

    Ok(Json(DataResponse::success(
        "Session reset. Credentials were kept.".to_string(),
        view,
        Some(id.to_string()),
    )))
}

pub async fn transcript_handler(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<Vec<ChatTurn>>> {
    let id = parse_session_id(id)?;
    let transcript = service
        .transcript(id)
        .await
        .map_err(|e| workflow_error(e, id))?;

    Ok(Json(DataResponse::success(
        format!("{} turns", transcript.len()),
        transcript.turns().to_vec(),
        Some(id.to_string()),
    )))
}

fn stage_label(view: &SessionView) -> String {
    use crate::interview::Stage;

    match &view.stage {
        Stage::Collecting => "collecting information".to_string(),
        Stage::Processing => "processing".to_string(),
        Stage::Interviewing => "interviewing".to_string(),
        Stage::Halted(reason) => format!("halted: {}", reason),
    }
}
