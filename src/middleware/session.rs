use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{error::AppError, services::upload_store::ANONYMOUS_SESSION};

pub const SESSION_HEADER: &str = "x-session-id";

const MAX_SESSION_ID_LEN: usize = 128;

/// Upload slot key taken from the `X-Session-Id` header.
///
/// Requests without the header all share the anonymous slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession(String);

impl UploadSession {
    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self(ANONYMOUS_SESSION.to_string())),
            Some(id) if is_valid_session_id(id) => Ok(Self(format!("session:{}", id))),
            Some(_) => Err(AppError::InvalidSession),
        }
    }
}

fn is_valid_session_id(id: &str) -> bool {
    id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl<S> FromRequestParts<S> for UploadSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(SESSION_HEADER) {
            Some(value) => Some(value.to_str().map_err(|_| AppError::InvalidSession)?),
            None => None,
        };
        Self::parse(header)
    }
}
