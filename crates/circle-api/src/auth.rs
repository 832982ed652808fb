use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};
use uuid::Uuid;

use circle_db::{Entity, StoreError, Value, text};
use circle_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use circle_types::models::{PRIVACY_PRIVATE, PRIVACY_PUBLIC, User, timestamp};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// An account refuses logins once this many consecutive attempts have failed.
pub const MAX_FAILED_LOGINS: i64 = 10;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = register_account(&state, req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(login_account(&state, req).await?))
}

pub async fn register_account(
    state: &AppState,
    req: RegisterRequest,
) -> Result<RegisterResponse, ApiError> {
    let email = normalize_email(&req.email);
    if !email.contains('@') {
        return Err(ApiError::Validation("email is invalid".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("password is required".into()));
    }

    blocking(state, move |s| {
        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))?
            .to_string();

        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            password,
            first_name: req.first_name,
            last_name: req.last_name,
            nickname: req.nickname,
            date_of_birth: req.date_of_birth,
            about: req.about,
            avatar: req.avatar,
            privacy: if req.private { PRIVACY_PRIVATE } else { PRIVACY_PUBLIC }.into(),
            failed_logins: 0,
            created_at: timestamp(),
        };

        s.db.with_store(|store| user.create(store))
            .map_err(|e| match e {
                StoreError::ConstraintViolation(_) => {
                    ApiError::Conflict("email is already registered".into())
                }
                other => other.into(),
            })?;

        let token = s.codec.issue(&user.id)?;
        info!("Registered account {}", user.id);

        Ok(RegisterResponse {
            user_id: user.id,
            token,
        })
    })
    .await
}

pub async fn login_account(state: &AppState, req: LoginRequest) -> Result<LoginResponse, ApiError> {
    let email = normalize_email(&req.email);

    blocking(state, move |s| {
        let user = s
            .db
            .with_store(|store| User::find_one(store, &[("email", text(email))]))?
            .ok_or(ApiError::InvalidCredentials)?;

        if user.failed_logins >= MAX_FAILED_LOGINS {
            warn!("Login refused for locked account {}", user.id);
            return Err(ApiError::Locked);
        }

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| ApiError::Internal(format!("stored hash for {} is corrupt: {}", user.id, e)))?;

        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            let failures = s.db.transaction(|store| {
                let current = User::find_one(store, &[("id", text(&user.id))])?
                    .map_or(user.failed_logins, |u| u.failed_logins)
                    + 1;
                User::update(
                    store,
                    &[("failed_logins", Value::Integer(current))],
                    &[("id", text(&user.id))],
                )?;
                Ok::<_, StoreError>(current)
            })?;
            if failures >= MAX_FAILED_LOGINS {
                warn!("Account {} locked after {} failed logins", user.id, failures);
            }
            return Err(ApiError::InvalidCredentials);
        }

        if user.failed_logins > 0 {
            s.db.with_store(|store| {
                User::update(
                    store,
                    &[("failed_logins", Value::Integer(0))],
                    &[("id", text(&user.id))],
                )
            })?;
        }

        let token = s.codec.issue(&user.id)?;
        Ok(LoginResponse {
            display_name: user.display_name(),
            user_id: user.id,
            token,
        })
    })
    .await
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
