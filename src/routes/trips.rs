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
use chrono::NaiveDate;
use serde::Deserialize;
use serde_with::{serde_as, NoneAsEmptyString};

use super::{today, Nav};
use crate::{
    auth::CurrentUser,
    error::AppError,
    flash,
    models::{review::Review, trip::{Trip, TripSummary}},
    rules::{eligibility, search::TripFilter},
    services::trips::{JoinOutcome, LeaveOutcome},
    state::AppState,
    validation::TripInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create_submit))
        .route("/new", get(create_form))
        .route("/mine", get(my_trips))
        .route("/organized", get(organized_trips))
        .route("/past", get(past_trips))
        .route("/:id", get(details))
        .route("/:id/edit", get(edit_form).post(edit_submit))
        .route("/:id/delete", post(delete))
        .route("/:id/join", post(join))
        .route("/:id/leave", post(leave))
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    departure: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    min_available_spots: Option<u32>,
}

impl SearchQuery {
    fn to_filter(&self) -> TripFilter {
        TripFilter {
            departure: self.departure.clone(),
            destination: self.destination.clone(),
            date: self.date,
            min_available_spots: self.min_available_spots,
            ..TripFilter::upcoming()
        }
    }
}

/// Values echoed back into the search form.
#[derive(Debug, Clone, Default)]
struct SearchForm {
    departure: String,
    destination: String,
    date: String,
    min_available_spots: String,
}

impl From<&SearchQuery> for SearchForm {
    fn from(query: &SearchQuery) -> Self {
        Self {
            departure: query.departure.clone().unwrap_or_default(),
            destination: query.destination.clone().unwrap_or_default(),
            date: query.date.map(|d| d.to_string()).unwrap_or_default(),
            min_available_spots: query
                .min_available_spots
                .map(|n| n.to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "trips/list.html")]
struct TripListTemplate {
    nav: Nav,
    flash: Option<String>,
    heading: String,
    empty_text: String,
    show_search: bool,
    any_search: bool,
    search: SearchForm,
    trips: Vec<TripSummary>,
    allow_join: bool,
}

impl TripListTemplate {
    fn plain(
        nav: Nav,
        flash: Option<String>,
        heading: &str,
        empty_text: &str,
        trips: Vec<TripSummary>,
    ) -> Self {
        Self {
            nav,
            flash,
            heading: heading.into(),
            empty_text: empty_text.into(),
            show_search: false,
            any_search: false,
            search: SearchForm::default(),
            trips,
            allow_join: false,
        }
    }
}

async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    let filter = query.to_filter();
    let trips = state.trips.search(&filter, today()).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(TripListTemplate {
            nav: Nav::from(&current),
            flash,
            heading: "Upcoming trips".into(),
            empty_text: if filter.has_search_terms() {
                "No trips match your search.".into()
            } else {
                "There are no upcoming trips with free seats yet.".into()
            },
            show_search: true,
            any_search: filter.has_search_terms(),
            search: SearchForm::from(&query),
            trips,
            allow_join: true,
        }),
    ))
}

async fn my_trips(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trips = state.trips.participating(user.id, today()).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(TripListTemplate::plain(
            Nav::from(&current),
            flash,
            "Trips I joined",
            "You have not joined any trips yet.",
            trips,
        )),
    ))
}

async fn organized_trips(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trips = state.trips.organized(user.id, today()).await?;
    let (jar, flash) = flash::take(jar);
    Ok((
        jar,
        AskamaTemplateResponse::into_response(TripListTemplate::plain(
            Nav::from(&current),
            flash,
            "Trips I organize",
            "You have not organized any trips yet.",
            trips,
        )),
    ))
}

async fn past_trips(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    let trips = state.trips.past(today()).await?;
    Ok(AskamaTemplateResponse::into_response(TripListTemplate::plain(
        Nav::from(&current),
        None,
        "Past trips",
        "No trips have taken place yet.",
        trips,
    )))
}

#[derive(Template)]
#[template(path = "trips/detail.html")]
struct TripDetailTemplate {
    nav: Nav,
    flash: Option<String>,
    trip: Trip,
    reviews: Vec<Review>,
    is_participant: bool,
    is_organizer: bool,
    can_manage: bool,
    can_join: bool,
    can_review: bool,
}

async fn details(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(trip_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.get(trip_id).await?;
    let reviews = state.reviews.for_trip(trip_id).await?;
    let today = today();
    let (jar, flash) = flash::take(jar);
    let template = TripDetailTemplate {
        nav: Nav::from(&current),
        flash,
        is_participant: trip.has_participant(user.id),
        is_organizer: trip.is_organizer(user.id),
        can_manage: eligibility::can_manage_trip(user, &trip),
        can_join: trip.trip_date >= today
            && !trip.has_participant(user.id)
            && eligibility::can_join(user.id, &trip).is_allowed(),
        can_review: eligibility::can_review(user.id, &trip, today).is_allowed(),
        reviews,
        trip,
    };
    Ok((jar, AskamaTemplateResponse::into_response(template)))
}

#[derive(Template)]
#[template(path = "trips/form.html")]
struct TripFormTemplate {
    nav: Nav,
    flash: Option<String>,
    heading: String,
    action: String,
    errors: Vec<String>,
    form: TripInput,
    version: i64,
}

async fn create_form(current: CurrentUser) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    Ok(AskamaTemplateResponse::into_response(TripFormTemplate {
        nav: Nav::from(&current),
        flash: None,
        heading: "Organize a trip".into(),
        action: "/trips".into(),
        errors: Vec::new(),
        form: TripInput {
            max_participants: "3".into(),
            ..TripInput::default()
        },
        version: 0,
    }))
}

async fn create_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Form(form): Form<TripInput>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let draft = match form.parse(Some(today())) {
        Ok(draft) => draft,
        Err(errors) => {
            return Ok(render_form_error(
                Nav::from(&current),
                "Organize a trip",
                "/trips".into(),
                form,
                0,
                errors.messages(),
            ))
        }
    };
    let id = state.trips.create(user, &draft).await?;
    Ok((
        flash::set(jar, "Your trip has been published."),
        Redirect::to(&format!("/trips/{id}")),
    )
        .into_response())
}

async fn edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(trip_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.get(trip_id).await?;
    if !eligibility::can_manage_trip(user, &trip) {
        return Err(AppError::Forbidden);
    }
    let (jar, flash) = flash::take(jar);
    let template = TripFormTemplate {
        nav: Nav::from(&current),
        flash,
        heading: "Edit trip".into(),
        action: format!("/trips/{trip_id}/edit"),
        errors: Vec::new(),
        form: TripInput {
            departure_town: trip.departure_town.clone(),
            destination_town: trip.destination_town.clone(),
            trip_date: trip.trip_date.to_string(),
            planned_start_time: trip.start_time_label(),
            organizer_phone: trip.organizer_phone.clone(),
            max_participants: trip.max_participants.to_string(),
            version: Some(trip.version),
        },
        version: trip.version,
    };
    Ok((jar, AskamaTemplateResponse::into_response(template)))
}

async fn edit_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(trip_id): Path<i64>,
    Form(form): Form<TripInput>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let action = format!("/trips/{trip_id}/edit");
    let version = form
        .version
        .ok_or_else(|| AppError::BadRequest("missing trip version".into()))?;
    let draft = match form.parse(None) {
        Ok(draft) => draft,
        Err(errors) => {
            return Ok(render_form_error(
                Nav::from(&current),
                "Edit trip",
                action,
                form,
                version,
                errors.messages(),
            ))
        }
    };
    match state.trips.update(user, trip_id, version, &draft).await {
        Ok(()) => Ok((
            flash::set(jar, "The trip has been updated."),
            Redirect::to(&format!("/trips/{trip_id}")),
        )
            .into_response()),
        Err(AppError::Validation(errors)) => Ok(render_form_error(
            Nav::from(&current),
            "Edit trip",
            action,
            form,
            version,
            errors.messages(),
        )),
        Err(AppError::Conflict(message)) => Ok((
            flash::set(jar, message),
            Redirect::to(&format!("/trips/{trip_id}/edit")),
        )
            .into_response()),
        Err(err) => Err(err),
    }
}

fn render_form_error(
    nav: Nav,
    heading: &str,
    action: String,
    form: TripInput,
    version: i64,
    errors: Vec<String>,
) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        AskamaTemplateResponse::into_response(TripFormTemplate {
            nav,
            flash: None,
            heading: heading.into(),
            action,
            errors,
            form,
            version,
        }),
    )
        .into_response()
}

async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(trip_id): Path<i64>,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    let user = current.require_user()?;
    state.trips.delete(user, trip_id).await?;
    Ok((
        flash::set(jar, "The trip has been deleted."),
        Redirect::to("/trips/organized"),
    ))
}

async fn join(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(trip_id): Path<i64>,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    let user = current.require_user()?;
    let outcome = state.trips.join(user, trip_id).await?;
    let target = match outcome {
        JoinOutcome::Denied(_) => "/trips".to_string(),
        JoinOutcome::Joined | JoinOutcome::AlreadyParticipant => format!("/trips/{trip_id}"),
    };
    Ok((flash::set(jar, outcome.message()), Redirect::to(&target)))
}

async fn leave(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: PrivateCookieJar,
    Path(trip_id): Path<i64>,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    let user = current.require_user()?;
    let jar = match state.trips.leave(user, trip_id).await? {
        LeaveOutcome::Left => flash::set(jar, "You left the trip."),
        LeaveOutcome::NotParticipant => jar,
    };
    Ok((jar, Redirect::to("/trips/mine")))
}
