use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Caller identity as forwarded by the authenticating gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER).ok_or(AppError::Unauthorized)?;
        Ok(Principal { user_id, email: header(parts, USER_EMAIL_HEADER) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<Principal, AppError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Principal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_identity_headers() {
        let principal = extract(Request::builder().header(USER_ID_HEADER, "user_42").header(USER_EMAIL_HEADER, "a@b.co"))
            .await
            .unwrap();
        assert_eq!(principal, Principal { user_id: "user_42".into(), email: Some("a@b.co".into()) });
    }

    #[tokio::test]
    async fn missing_or_blank_user_is_unauthorized() {
        assert!(matches!(extract(Request::builder()).await, Err(AppError::Unauthorized)));
        assert!(matches!(
            extract(Request::builder().header(USER_ID_HEADER, "  ")).await,
            Err(AppError::Unauthorized)
        ));
    }
}
