use serde::{Deserialize, Serialize};

// Response of POST /uas/authenticate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LoginResponse {
    pub login_result: String,
}

// Paged collection returned by the voyager endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Elements {
    #[serde(default)]
    pub elements: Vec<serde_json::Value>,
}
