use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// The verified caller, inserted as a request extension by [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

/// Resolve a bearer token to an identity that still exists.
pub async fn authenticate(state: &AppState, token: String) -> Result<String, ApiError> {
    blocking(state, move |s| Ok(s.codec.verify(&token, &s.db)?)).await
}

/// Extract and verify the token from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated)?
        .to_string();

    let identity = authenticate(&state, token).await?;

    req.extensions_mut().insert(Identity(identity));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;
    use axum::{Extension, Router, body::Body, http, http::StatusCode, middleware, routing::get};
    use tower::ServiceExt;

    async fn whoami(Extension(Identity(id)): Extension<Identity>) -> String {
        id
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(state, require_auth))
    }

    fn request(auth: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn valid_token_reaches_the_handler() {
        let state = testing::state();
        testing::add_user(&state, "u1", false);
        let token = state.codec.issue("u1").unwrap();

        let res = app(state)
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn every_failure_is_401() {
        let state = testing::state();
        testing::add_user(&state, "u1", false);
        let orphan = state.codec.issue("deleted-user").unwrap();

        for auth in [
            None,
            Some("Basic dTE6cHc=".to_string()),
            Some("Bearer not.a.token".to_string()),
            Some("Bearer onlyone".to_string()),
            Some(format!("Bearer {orphan}")),
        ] {
            let res = app(state.clone())
                .oneshot(request(auth.as_deref()))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
        }
    }
}
