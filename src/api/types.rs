use serde::{Deserialize, Serialize};

/// Body posted to the inference endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    pub query: String,
    pub user_id: String,
    pub request_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchResponse {
    #[serde(default)]
    pub success: bool,
}
