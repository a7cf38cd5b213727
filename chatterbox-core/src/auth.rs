//! Login and registration against the server's HTTP API.
//!
//! The endpoints are plain JSON POSTs; a failed attempt still carries a
//! parseable `{success, message}` body, so HTTP error statuses are mapped to
//! `AuthResponse` rather than transport errors.

use crate::net::{HttpClient, HttpRequest};
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

pub async fn login(
    http: &dyn HttpClient,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse> {
    let response = post_credentials(http, &format!("{base_url}/api/login"), username, password)
        .await?;
    info!(target: "Auth", "Login for {username}: success={}", response.success);
    Ok(response)
}

pub async fn register(
    http: &dyn HttpClient,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse> {
    let response = post_credentials(http, &format!("{base_url}/api/register"), username, password)
        .await?;
    info!(target: "Auth", "Registration for {username}: success={}", response.success);
    Ok(response)
}

async fn post_credentials(
    http: &dyn HttpClient,
    url: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse> {
    let body = serde_json::to_vec(&Credentials { username, password })?;
    let request = HttpRequest::post(url)
        .with_header("Content-Type", "application/json")
        .with_body(body);
    let response = http.execute(request).await?;
    serde_json::from_slice(&response.body).with_context(|| {
        format!(
            "auth endpoint returned an unparseable body (status {})",
            response.status_code
        )
    })
}
