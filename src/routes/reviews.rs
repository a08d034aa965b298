use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;

use super::{today, Nav};
use crate::{
    auth::{AuthenticatedUser, CurrentUser},
    error::AppError,
    flash,
    models::{review::Review, trip::TripSummary},
    rules::eligibility,
    services::reviews::ReviewOutcome,
    state::AppState,
    validation::ReviewInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create_submit))
        .route("/new", get(create_form))
        .route("/mine", get(my_reviews))
        .route("/:id", get(details))
        .route("/:id/edit", get(edit_form).post(edit_submit))
        .route("/:id/delete", post(delete))
}

#[derive(Template)]
#[template(path = "reviews/list.html")]
struct ReviewListTemplate {
    nav: Nav,
    flash: Option<String>,
    heading: String,
    reviews: Vec<Review>,
    user_id: i64,
    is_admin: bool,
}

async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let reviews = state.reviews.list().await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(list_template(
            &current,
            user,
            flash,
            "Reviews",
            reviews,
        )),
    ))
}

async fn my_reviews(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let reviews = state.reviews.by_reviewer(user.id).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(list_template(
            &current,
            user,
            flash,
            "My reviews",
            reviews,
        )),
    ))
}

fn list_template(
    current: &CurrentUser,
    user: &AuthenticatedUser,
    flash: Option<String>,
    heading: &str,
    reviews: Vec<Review>,
) -> ReviewListTemplate {
    ReviewListTemplate {
        nav: Nav::from(current),
        flash,
        heading: heading.into(),
        reviews,
        user_id: user.id,
        is_admin: user.is_admin(),
    }
}

#[derive(Template)]
#[template(path = "reviews/detail.html")]
struct ReviewDetailTemplate {
    nav: Nav,
    flash: Option<String>,
    review: Review,
    can_manage: bool,
}

async fn details(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(review_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let review = state.reviews.get(review_id).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(ReviewDetailTemplate {
            nav: Nav::from(&current),
            flash,
            can_manage: eligibility::can_manage_review(user, &review),
            review,
        }),
    ))
}

#[derive(Template)]
#[template(path = "reviews/form.html")]
struct ReviewFormTemplate {
    nav: Nav,
    flash: Option<String>,
    heading: String,
    action: String,
    errors: Vec<String>,
    editing: bool,
    trips: Vec<TripSummary>,
    selected_trip: i64,
    content: String,
    rating: String,
}

#[derive(Debug, Default, Deserialize)]
struct NewReviewQuery {
    #[serde(default)]
    trip_id: Option<i64>,
}

async fn create_form(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Query(query): Query<NewReviewQuery>,
) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    let trips = state.trips.past(today()).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(ReviewFormTemplate {
            nav: Nav::from(&current),
            flash,
            heading: "Write a review".into(),
            action: "/reviews".into(),
            errors: Vec::new(),
            editing: false,
            trips,
            selected_trip: query.trip_id.unwrap_or_default(),
            content: String::new(),
            rating: "5".into(),
        }),
    ))
}

async fn create_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Form(form): Form<ReviewInput>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let draft = match form.parse() {
        Ok(draft) => draft,
        Err(errors) => {
            return render_create_error(&state, &current, &form, errors.messages()).await
        }
    };

    match state.reviews.create(user, form.trip_id, &draft, today()).await {
        Ok(ReviewOutcome::Created(id)) => Ok((
            flash::set(jar, "Thank you for your review!"),
            Redirect::to(&format!("/reviews/{id}")),
        )
            .into_response()),
        Ok(ReviewOutcome::Denied(reason)) => Ok((
            flash::set(jar, reason.message()),
            Redirect::to("/reviews/new"),
        )
            .into_response()),
        Err(AppError::Validation(errors)) => {
            render_create_error(&state, &current, &form, errors.messages()).await
        }
        Err(err) => Err(err),
    }
}

async fn render_create_error(
    state: &AppState,
    current: &CurrentUser,
    form: &ReviewInput,
    errors: Vec<String>,
) -> Result<Response, AppError> {
    let trips = state.trips.past(today()).await?;
    Ok((
        StatusCode::UNPROCESSABLE_ENTITY,
        AskamaTemplateResponse::into_response(ReviewFormTemplate {
            nav: Nav::from(current),
            flash: None,
            heading: "Write a review".into(),
            action: "/reviews".into(),
            errors,
            editing: false,
            trips,
            selected_trip: form.trip_id.unwrap_or_default(),
            content: form.content.clone(),
            rating: form.rating.clone(),
        }),
    )
        .into_response())
}

async fn edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(review_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let review = state.reviews.get(review_id).await?;
    if !eligibility::can_manage_review(user, &review) {
        return Err(AppError::Forbidden);
    }
    Ok(AskamaTemplateResponse::into_response(ReviewFormTemplate {
        nav: Nav::from(&current),
        flash: None,
        heading: format!("Edit review of {}", review.trip_label()),
        action: format!("/reviews/{review_id}/edit"),
        errors: Vec::new(),
        editing: true,
        trips: Vec::new(),
        selected_trip: review.trip_id.unwrap_or_default(),
        content: review.content,
        rating: review.rating.to_string(),
    }))
}

async fn edit_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(review_id): Path<i64>,
    Form(form): Form<ReviewInput>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    match form.parse() {
        Ok(draft) => {
            state.reviews.update(user, review_id, &draft).await?;
            Ok((
                flash::set(jar, "Your review has been updated."),
                Redirect::to(&format!("/reviews/{review_id}")),
            )
                .into_response())
        }
        Err(errors) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            AskamaTemplateResponse::into_response(ReviewFormTemplate {
                nav: Nav::from(&current),
                flash: None,
                heading: "Edit review".into(),
                action: format!("/reviews/{review_id}/edit"),
                errors: errors.messages(),
                editing: true,
                trips: Vec::new(),
                selected_trip: form.trip_id.unwrap_or_default(),
                content: form.content,
                rating: form.rating,
            }),
        )
            .into_response()),
    }
}

async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(review_id): Path<i64>,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    let user = current.require_user()?;
    state.reviews.delete(user, review_id).await?;
    Ok((
        flash::set(jar, "The review has been deleted."),
        Redirect::to("/reviews/mine"),
    ))
}
