//! Resume parsing

use axum::http::StatusCode;
use axum::response::Response;
use coursemart_core::parse_resume;
use serde::Deserialize;

use super::{respond, ApiJson};
use crate::error::ApiResult;

#[derive(Deserialize)]
pub struct ParseResumeRequest {
    pub text: String,
}

/// POST /api/resume/parse
pub async fn parse(ApiJson(req): ApiJson<ParseResumeRequest>) -> ApiResult<Response> {
    let profile = parse_resume(&req.text)?;
    respond(StatusCode::OK, "Parsed", profile)
}
