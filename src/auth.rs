use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::{Duration, Utc};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{session::Session, user::{User, UserRole}},
    services::users::NewUser,
    state::AppState,
    validation::Registration,
};

pub const SESSION_COOKIE: &str = "shared_travel_session";

/// The acting identity handed to every rule and service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            uuid: user.uuid.clone(),
            username: user.username.clone(),
            role: user.role(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.cookie_key.clone());
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Self(None));
        };
        Ok(Self(resolve_session(&state, cookie.value()).await?))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }

    pub fn require_admin(&self) -> Result<&AuthenticatedUser, AppError> {
        let user = self.require_user()?;
        if user.is_admin() {
            Ok(user)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::Other(anyhow!("password hashing failed: {err}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!("stored password hash is unreadable: {err}");
            false
        }
    }
}

pub async fn register_user(
    state: &AppState,
    registration: &Registration,
) -> Result<AuthenticatedUser, AppError> {
    let user = state
        .users
        .insert(NewUser {
            username: registration.username.clone(),
            full_name: registration.full_name.clone(),
            email: registration.email.clone(),
            phone_number: registration.phone_number.clone(),
            password_hash: hash_password(&registration.password)?,
            role: UserRole::User,
        })
        .await?;
    Ok(AuthenticatedUser::from(&user))
}

pub async fn authenticate_user(
    state: &AppState,
    identifier: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let Some(user) = state.users.find_by_identifier(identifier).await? else {
        return Err(AppError::Unauthorized);
    };
    if !verify_password(password, &user.password_hash) {
        debug!(user_id = user.id, "password mismatch");
        return Err(AppError::Unauthorized);
    }
    if user.banned {
        return Err(AppError::BadRequest("This account has been locked.".into()));
    }
    state.users.touch_login(user.id, Utc::now()).await?;
    Ok(AuthenticatedUser::from(&user))
}

pub async fn create_session(state: &AppState, user_id: i64) -> Result<String, AppError> {
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id,
        created_at: now,
        last_seen_at: now,
        expires_at: Some(now + Duration::hours(state.config.session_ttl_hours)),
    };
    sqlx::query(
        "INSERT INTO sessions (id, user_id, created_at, last_seen_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.created_at)
    .bind(session.last_seen_at)
    .bind(session.expires_at)
    .execute(&state.db)
    .await?;
    Ok(session.id)
}

pub async fn destroy_session(state: &AppState, session_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?1")
        .bind(session_id)
        .execute(&state.db)
        .await?;
    Ok(())
}

/// Banned users and expired sessions resolve to no user.
pub async fn resolve_session(
    state: &AppState,
    session_id: &str,
) -> Result<Option<AuthenticatedUser>, AppError> {
    let row = sqlx::query(
        "SELECT s.id, s.user_id, s.created_at, s.last_seen_at, s.expires_at,
                u.uuid, u.username, u.role
         FROM sessions s JOIN users u ON u.id = s.user_id
         WHERE s.id = ?1 AND u.banned = 0",
    )
    .bind(session_id)
    .fetch_optional(&state.db)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let session = Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
        last_seen_at: row.get("last_seen_at"),
        expires_at: row.get("expires_at"),
    };
    let now = Utc::now();
    if session.is_expired(now) {
        destroy_session(state, &session.id).await?;
        return Ok(None);
    }
    sqlx::query("UPDATE sessions SET last_seen_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(&session.id)
        .execute(&state.db)
        .await?;

    Ok(Some(AuthenticatedUser {
        id: session.user_id,
        uuid: row.get("uuid"),
        username: row.get("username"),
        role: UserRole::parse(row.get::<&str, _>("role")),
    }))
}

pub fn apply_session_cookie(jar: PrivateCookieJar, session_id: &str) -> PrivateCookieJar {
    jar.add(
        Cookie::build((SESSION_COOKIE, session_id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// Creates the configured administrator account unless it already exists.
pub async fn ensure_admin(state: &AppState) -> Result<(), AppError> {
    let Some(seed) = state.config.admin_seed.clone() else {
        return Ok(());
    };
    if let Some(existing) = state.users.find_by_identifier(&seed.email).await? {
        if existing.role() != UserRole::Admin {
            state.users.set_role(existing.id, UserRole::Admin).await?;
            info!(user_id = existing.id, "promoted seeded account to admin");
        }
        return Ok(());
    }
    let admin = state
        .users
        .insert(NewUser {
            username: seed.email.clone(),
            full_name: "Admin User".into(),
            email: seed.email.to_lowercase(),
            phone_number: None,
            password_hash: hash_password(&seed.password)?,
            role: UserRole::Admin,
        })
        .await?;
    info!(user_id = admin.id, "seeded admin account");
    Ok(())
}
