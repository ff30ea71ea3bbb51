use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue},
};
use axum_extra::headers::{authorization::Credentials, Authorization};
use axum_extra::TypedHeader;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{error::AppError, state::AppState};

/// `Authorization: SuperAdmin <token>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperAdmin(String);

impl SuperAdmin {
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl Credentials for SuperAdmin {
    const SCHEME: &'static str = "SuperAdmin";

    fn decode(value: &HeaderValue) -> Option<Self> {
        let raw = value.to_str().ok()?;
        let token = raw.get(Self::SCHEME.len()..)?.trim();
        (!token.is_empty()).then(|| SuperAdmin(token.to_string()))
    }

    fn encode(&self) -> HeaderValue {
        HeaderValue::from_str(&format!("{} {}", Self::SCHEME, self.0))
            .unwrap_or_else(|_| HeaderValue::from_static(Self::SCHEME))
    }
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// Caller holding the upload credential. Rejected with 403 before the body
/// is read.
#[derive(Debug, Clone)]
pub struct UploadAdmin;

#[async_trait]
impl FromRequestParts<AppState> for UploadAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.upload_admin_token.as_deref() else {
            warn!("upload refused: no admin token configured");
            return Err(AppError::forbidden());
        };

        let TypedHeader(Authorization(credentials)) =
            TypedHeader::<Authorization<SuperAdmin>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::forbidden())?;

        if !tokens_match(credentials.token(), expected) {
            warn!("upload refused: credential mismatch");
            return Err(AppError::forbidden());
        }
        Ok(UploadAdmin)
    }
}
