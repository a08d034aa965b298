use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;

use super::{today, Nav};
use crate::{
    auth::CurrentUser,
    error::AppError,
    flash,
    models::{review::RatingSummary, trip::TripSummary, user::User},
    state::AppState,
    validation::ProfileInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/edit", get(edit_form).post(edit_submit))
        .route("/:user_id", get(show))
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    nav: Nav,
    flash: Option<String>,
    user: User,
    member_since: String,
    rating: RatingSummary,
    trips: Vec<TripSummary>,
    is_self: bool,
}

async fn show(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = current.require_user()?;
    let user = state.users.find(user_id).await?.ok_or(AppError::NotFound)?;
    let rating = state.users.organizer_rating(user.id).await?;
    let trips = state.trips.organized(user.id, today()).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(ProfileTemplate {
            nav: Nav::from(&current),
            flash,
            member_since: user.created_at.format("%d.%m.%Y").to_string(),
            is_self: viewer.id == user.id,
            user,
            rating,
            trips,
        }),
    ))
}

#[derive(Template)]
#[template(path = "profile_edit.html")]
struct ProfileEditTemplate {
    nav: Nav,
    errors: Vec<String>,
    email: String,
    form: ProfileInput,
}

async fn edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let viewer = current.require_user()?;
    let user = state.users.find(viewer.id).await?.ok_or(AppError::NotFound)?;
    Ok(AskamaTemplateResponse::into_response(ProfileEditTemplate {
        nav: Nav::from(&current),
        errors: Vec::new(),
        form: ProfileInput {
            username: user.username,
            full_name: user.full_name,
            phone_number: user.phone_number.unwrap_or_default(),
        },
        email: user.email,
    }))
}

async fn edit_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Form(form): Form<ProfileInput>,
) -> Result<Response, AppError> {
    let viewer = current.require_user()?;
    let email = state
        .users
        .find(viewer.id)
        .await?
        .ok_or(AppError::NotFound)?
        .email;
    let draft = match form.parse() {
        Ok(draft) => draft,
        Err(errors) => return Ok(render_edit_error(&current, email, form, errors.messages())),
    };

    match state.users.update_profile(viewer.id, &draft).await {
        Ok(user) => Ok((
            flash::set(jar, "Your profile has been updated."),
            Redirect::to(&format!("/profile/{}", user.id)),
        )
            .into_response()),
        Err(AppError::BadRequest(msg)) => Ok(render_edit_error(&current, email, form, vec![msg])),
        Err(err) => Err(err),
    }
}

fn render_edit_error(
    current: &CurrentUser,
    email: String,
    form: ProfileInput,
    errors: Vec<String>,
) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        AskamaTemplateResponse::into_response(ProfileEditTemplate {
            nav: Nav::from(current),
            errors,
            email,
            form,
        }),
    )
        .into_response()
}
