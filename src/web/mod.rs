// src/web/mod.rs

pub mod handlers;
pub mod types;

pub use handlers::*;
pub use types::*;

use crate::config::AppConfig;
use crate::interview::{ChatTurn, CredentialsUpdate, InterviewService, SessionView};
use anyhow::{Context, Result};
use futures::stream::BoxStream;
use rocket::data::{Limits, ToByteUnit};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::form::Form;
use rocket::http::{Header, Status};
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{
    catchers, delete, get, options, post, put, routes, Build, Request, Response, Rocket, State,
};
use tracing::info;

// CORS Fairing
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, PUT, DELETE, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

type ApiResult<T> = Result<Json<T>, Json<StandardErrorResponse>>;

#[get("/health")]
pub async fn health(service: &State<InterviewService>) -> Json<TextResponse> {
    handlers::health_handler(service).await
}

#[get("/questions")]
pub async fn questions() -> Json<DataResponse<QuestionsData>> {
    handlers::questions_handler().await
}

#[post("/sessions")]
pub async fn create_session(service: &State<InterviewService>) -> Json<DataResponse<SessionView>> {
    handlers::create_session_handler(service).await
}

#[get("/sessions/<id>")]
pub async fn get_session(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<SessionView>> {
    handlers::get_session_handler(id, service).await
}

#[delete("/sessions/<id>")]
pub async fn delete_session(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<ActionResponse> {
    handlers::delete_session_handler(id, service).await
}

#[put("/sessions/<id>/credentials", data = "<request>")]
pub async fn update_credentials(
    id: &str,
    request: Json<CredentialsUpdate>,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<SessionView>> {
    handlers::update_credentials_handler(id, request, service).await
}

#[post("/sessions/<id>/cv", data = "<upload>")]
pub async fn upload_cv(
    id: &str,
    upload: Form<CvUploadForm<'_>>,
    service: &State<InterviewService>,
) -> ApiResult<ActionResponse> {
    handlers::upload_cv_handler(id, upload, service).await
}

#[put("/sessions/<id>/answers/<index>", data = "<request>")]
pub async fn set_answer(
    id: &str,
    index: usize,
    request: Json<AnswerRequest>,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<AnswersData>> {
    handlers::set_answer_handler(id, index, request, service).await
}

#[post("/sessions/<id>/wizard/<direction>")]
pub async fn move_wizard(
    id: &str,
    direction: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<WizardData>> {
    handlers::move_wizard_handler(id, direction, service).await
}

#[post("/sessions/<id>/process")]
pub async fn process(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<ProcessData>> {
    handlers::process_handler(id, service).await
}

#[post("/sessions/<id>/reset")]
pub async fn reset(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<SessionView>> {
    handlers::reset_handler(id, service).await
}

#[get("/sessions/<id>/transcript")]
pub async fn transcript(
    id: &str,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<Vec<ChatTurn>>> {
    handlers::transcript_handler(id, service).await
}

#[post("/sessions/<id>/chat", data = "<request>")]
pub async fn chat(
    id: &str,
    request: Json<ChatRequest>,
    service: &State<InterviewService>,
) -> ApiResult<DataResponse<ChatReplyData>> {
    handlers::chat_handler(id, request, service).await
}

#[post("/sessions/<id>/chat/stream", data = "<request>")]
pub async fn chat_stream(
    id: &str,
    request: Json<ChatRequest>,
    service: &State<InterviewService>,
) -> Result<EventStream<BoxStream<'static, Event>>, Json<StandardErrorResponse>> {
    handlers::chat_stream_handler(id, request, service).await
}

#[options("/<_..>")]
pub async fn options() -> Status {
    Status::Ok
}

// Error catchers
#[rocket::catch(400)]
pub fn bad_request() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Invalid request format".to_string(),
        "BAD_REQUEST".to_string(),
        vec![
            "Check your request JSON format".to_string(),
            "Verify all required fields are present".to_string(),
        ],
        None,
    ))
}

#[rocket::catch(404)]
pub fn not_found(request: &Request<'_>) -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        format!("No route for {} {}", request.method(), request.uri()),
        "NOT_FOUND".to_string(),
        vec!["Check the endpoint path and method".to_string()],
        None,
    ))
}

#[rocket::catch(413)]
pub fn payload_too_large() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Uploaded file exceeds the size limit".to_string(),
        "FILE_TOO_LARGE".to_string(),
        vec![
            "Compress your CV file".to_string(),
            "Upload a smaller PDF".to_string(),
        ],
        None,
    ))
}

#[rocket::catch(422)]
pub fn unprocessable() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Request body does not match the expected shape".to_string(),
        "BAD_REQUEST".to_string(),
        vec![
            "Verify all required fields are present".to_string(),
            "Send CV uploads as multipart form data in the 'cv_file' field".to_string(),
        ],
        None,
    ))
}

#[rocket::catch(500)]
pub fn internal_error() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Internal server error".to_string(),
        "INTERNAL_ERROR".to_string(),
        vec![
            "Try again in a few moments".to_string(),
            "Contact support if the problem persists".to_string(),
        ],
        None,
    ))
}

/// Upload limits sized for CV files plus multipart overhead
fn upload_limits(max_upload_bytes: u64) -> Limits {
    Limits::default()
        .limit("file", max_upload_bytes.bytes())
        .limit("data-form", (max_upload_bytes + 1024 * 1024).bytes())
}

/// Assemble the API around an existing service; the caller launches it.
pub fn build_rocket(service: InterviewService, config: &AppConfig) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port))
        .merge(("limits", upload_limits(config.session.max_upload_bytes)));

    rocket::custom(figment)
        .attach(Cors)
        .manage(service)
        .register(
            "/api",
            catchers![
                bad_request,
                not_found,
                payload_too_large,
                unprocessable,
                internal_error
            ],
        )
        .mount(
            "/api",
            routes![
                health,
                questions,
                create_session,
                get_session,
                delete_session,
                update_credentials,
                upload_cv,
                set_answer,
                move_wizard,
                process,
                reset,
                transcript,
                chat,
                chat_stream,
                options,
            ],
        )
}

// Main server start function
pub async fn start_web_server(config: AppConfig) -> Result<()> {
    let service = InterviewService::from_config(&config)?;

    info!("Starting interview prep API server");
    info!(
        "Listening on http://{}:{}/api",
        config.server.address, config.server.port
    );
    info!("LLM: {} ({})", config.llm.model, config.llm.base_url);

    let sweep = service.spawn_idle_sweep();
    if sweep.is_some() {
        info!(
            "Idle sessions expire after {}s",
            config.session.idle_timeout_seconds
        );
    }

    let launched = build_rocket(service, &config).launch().await;
    if let Some(sweep) = sweep {
        sweep.abort();
    }
    let _rocket = launched.context("Rocket server failed")?;

    Ok(())
}
