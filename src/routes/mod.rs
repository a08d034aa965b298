pub mod admin;
pub mod profile;
pub mod public;
pub mod reviews;
pub mod trips;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use crate::rules::today;
use crate::{auth::CurrentUser, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .nest("/trips", trips::router())
        .nest("/reviews", reviews::router())
        .nest("/profile", profile::router())
        .nest("/admin", admin::router())
        .nest_service("/static", ServeDir::new("static"))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Navigation bar data every page template carries.
#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub logged_in: bool,
    pub username: String,
    pub is_admin: bool,
}

impl From<&CurrentUser> for Nav {
    fn from(current: &CurrentUser) -> Self {
        match &current.0 {
            Some(user) => Self {
                logged_in: true,
                username: user.username.clone(),
                is_admin: user.is_admin(),
            },
            None => Self::default(),
        }
    }
}

