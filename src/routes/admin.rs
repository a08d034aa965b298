use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::{DateTime, Local, Utc};
use tracing::warn;

use super::Nav;
use crate::{auth::CurrentUser, error::AppError, flash, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(users_list))
        .route("/users/:id/ban", post(ban_user))
        .route("/users/:id/unban", post(unban_user))
        .route("/users/:id/delete", post(delete_user))
}

#[derive(Template)]
#[template(path = "admin/users.html")]
struct AdminUsersTemplate {
    nav: Nav,
    flash: Option<String>,
    current_id: i64,
    users: Vec<AdminUserRow>,
}

#[derive(Clone)]
struct AdminUserRow {
    id: i64,
    username: String,
    full_name: String,
    email: String,
    role: String,
    banned: bool,
    created_at: String,
    last_login_at: String,
}

async fn users_list(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    let admin = current.require_admin()?;
    let users = state
        .users
        .list()
        .await?
        .into_iter()
        .map(|user| AdminUserRow {
            id: user.id,
            created_at: format_datetime(user.created_at),
            last_login_at: user
                .last_login_at
                .map(format_datetime)
                .unwrap_or_else(|| "–".into()),
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            role: user.role,
            banned: user.banned,
        })
        .collect();
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(AdminUsersTemplate {
            nav: Nav::from(&current),
            flash,
            current_id: admin.id,
            users,
        }),
    ))
}

async fn ban_user(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(user_id): Path<i64>,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    let admin = current.require_admin()?;
    if admin.id == user_id {
        return Err(AppError::BadRequest("You cannot ban yourself.".into()));
    }
    state.users.ban(user_id).await?;
    warn!(admin_id = admin.id, user_id, "account banned by admin");
    Ok((
        flash::set(jar, "The user has been banned."),
        Redirect::to("/admin/users"),
    ))
}

async fn unban_user(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(user_id): Path<i64>,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    current.require_admin()?;
    state.users.unban(user_id).await?;
    Ok((
        flash::set(jar, "The user has been unbanned."),
        Redirect::to("/admin/users"),
    ))
}

async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(user_id): Path<i64>,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    let admin = current.require_admin()?;
    if admin.id == user_id {
        return Err(AppError::BadRequest("You cannot delete your own account here.".into()));
    }
    match state.users.delete(user_id).await {
        Ok(()) => {
            warn!(admin_id = admin.id, user_id, "account deleted by admin");
            Ok((
                flash::set(jar, "The user has been deleted."),
                Redirect::to("/admin/users"),
            ))
        }
        Err(AppError::BadRequest(msg)) => {
            Ok((flash::set(jar, msg), Redirect::to("/admin/users")))
        }
        Err(err) => Err(err),
    }
}

fn format_datetime(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string()
}
