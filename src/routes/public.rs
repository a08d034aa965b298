use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;
use tracing::info;

use super::Nav;
use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    flash,
    state::AppState,
    validation::RegistrationInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/login", get(login_form).post(login_submit))
        .route("/register", get(register_form).post(register_submit))
        .route("/logout", post(logout))
}

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingTemplate {
    nav: Nav,
    flash: Option<String>,
}

async fn landing(current: CurrentUser, jar: PrivateCookieJar) -> impl IntoResponse {
    let (jar, flash) = flash::take(jar);
    (
        jar,
        AskamaTemplateResponse::into_response(LandingTemplate {
            nav: Nav::from(&current),
            flash,
        }),
    )
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    nav: Nav,
    show_error: bool,
    error_message: String,
    identifier: String,
}

async fn login_form() -> impl IntoResponse {
    AskamaTemplateResponse::into_response(LoginTemplate {
        nav: Nav::default(),
        show_error: false,
        error_message: String::new(),
        identifier: String::new(),
    })
}

#[derive(Deserialize)]
struct LoginForm {
    identifier: String,
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match auth::authenticate_user(&state, &form.identifier, &form.password).await {
        Ok(user) => {
            let session_id = auth::create_session(&state, user.id).await?;
            info!(user_id = user.id, "user logged in");
            Ok((
                auth::apply_session_cookie(jar, &session_id),
                Redirect::to("/trips"),
            )
                .into_response())
        }
        Err(AppError::Unauthorized) => Ok(render_login_error(
            form.identifier,
            "Login failed, please check your username and password.".into(),
        )),
        Err(AppError::BadRequest(msg)) => Ok(render_login_error(form.identifier, msg)),
        Err(err) => Err(err),
    }
}

fn render_login_error(identifier: String, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(LoginTemplate {
            nav: Nav::default(),
            show_error: true,
            error_message: message,
            identifier,
        }),
    )
        .into_response()
}

#[derive(Template)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    nav: Nav,
    errors: Vec<String>,
    username: String,
    full_name: String,
    email: String,
    phone_number: String,
}

impl RegisterTemplate {
    fn new(form: &RegistrationInput, errors: Vec<String>) -> Self {
        Self {
            nav: Nav::default(),
            errors,
            username: form.username.clone(),
            full_name: form.full_name.clone(),
            email: form.email.clone(),
            phone_number: form.phone_number.clone(),
        }
    }
}

async fn register_form() -> impl IntoResponse {
    AskamaTemplateResponse::into_response(RegisterTemplate::new(
        &RegistrationInput::default(),
        Vec::new(),
    ))
}

async fn register_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<RegistrationInput>,
) -> Result<Response, AppError> {
    let registration = match form.parse() {
        Ok(registration) => registration,
        Err(errors) => return Ok(render_register_error(&form, errors.messages())),
    };

    match auth::register_user(&state, &registration).await {
        Ok(user) => {
            let session_id = auth::create_session(&state, user.id).await?;
            Ok((
                auth::apply_session_cookie(jar, &session_id),
                Redirect::to("/trips"),
            )
                .into_response())
        }
        Err(AppError::BadRequest(msg)) => Ok(render_register_error(&form, vec![msg])),
        Err(err) => Err(err),
    }
}

fn render_register_error(form: &RegistrationInput, errors: Vec<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(RegisterTemplate::new(form, errors)),
    )
        .into_response()
}

async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        auth::destroy_session(&state, cookie.value()).await?;
    }
    Ok((auth::clear_session_cookie(jar), Redirect::to("/")))
}
