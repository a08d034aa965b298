#![allow(dead_code)]

use std::{collections::HashMap, fmt, fs::File, net::SocketAddr};

use anyhow::Context;
use chrono::{Duration, NaiveTime};
use cucumber::{given, then, when, World as _};
use shared_travel::{
    auth::{self, AuthenticatedUser},
    config::AppConfig,
    db::{init_pool, migrate},
    error::AppError,
    models::trip::Capacity,
    rules::{search::TripFilter, today},
    services::{reviews::ReviewOutcome, trips::JoinOutcome},
    state::AppState,
    validation::{RegistrationInput, ReviewDraft, TripDraft},
};
use tempfile::TempDir;

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    users: HashMap<String, AuthenticatedUser>,
    trips: HashMap<String, i64>,
    last_join: Option<JoinOutcome>,
    last_review: Option<ReviewOutcome>,
    last_error: Option<String>,
    search_results: Vec<i64>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn user(&self, username: &str) -> AuthenticatedUser {
        self.users
            .get(username)
            .cloned()
            .unwrap_or_else(|| panic!("unknown user {username}"))
    }

    fn trip(&self, name: &str) -> i64 {
        *self
            .trips
            .get(name)
            .unwrap_or_else(|| panic!("unknown trip {name}"))
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "bdd-cookie-secret".into(),
            session_ttl_hours: 1,
            admin_seed: None,
        };

        let db = init_pool(&config.database_url).await?;
        migrate(&db).await?;

        let app = AppState::new(config, db);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

fn trip_draft(from: &str, to: &str, day_offset: i64, seats: i64) -> TripDraft {
    TripDraft {
        departure_town: from.into(),
        destination_town: to.into(),
        trip_date: today() + Duration::days(day_offset),
        planned_start_time: NaiveTime::from_hms_opt(8, 30, 0).expect("valid time"),
        organizer_phone: "+359 888 123 456".into(),
        max_participants: seats,
    }
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.users.clear();
    world.trips.clear();
    world.last_join = None;
    world.last_review = None;
    world.last_error = None;
    world.search_results.clear();
}

#[given(regex = r#"^a registered user "([^"]+)" with password "([^"]+)"$"#)]
async fn given_registered_user(world: &mut AppWorld, username: String, password: String) {
    register_user(world, username, password)
        .await
        .expect("register user");
}

#[when(regex = r#"^I register a user "([^"]+)" with password "([^"]+)"$"#)]
async fn when_register_user(world: &mut AppWorld, username: String, password: String) {
    if let Err(err) = register_user(world, username, password).await {
        world.last_error = Some(err.to_string());
    }
}

#[then(regex = r#"^I can authenticate as "([^"]+)" using password "([^"]+)"$"#)]
async fn then_can_authenticate(world: &mut AppWorld, identifier: String, password: String) {
    let authed = auth::authenticate_user(world.app_state(), &identifier, &password)
        .await
        .expect("authentication");
    assert_eq!(authed.username, identifier);
}

#[then(regex = r#"^authenticating as "([^"]+)" using password "([^"]+)" fails with "([^"]+)"$"#)]
async fn then_authentication_fails(
    world: &mut AppWorld,
    identifier: String,
    password: String,
    message: String,
) {
    let err = auth::authenticate_user(world.app_state(), &identifier, &password)
        .await
        .expect_err("authentication should fail");
    assert_eq!(err.to_string(), message);
}

#[then(regex = r#"^registration fails with "([^"]+)"$"#)]
async fn then_registration_fails(world: &mut AppWorld, message: String) {
    let error = world.last_error.as_deref().expect("an error was expected");
    assert!(error.contains(&message), "{error:?} does not mention {message:?}");
}

#[when(regex = r#"^the account "([^"]+)" is banned$"#)]
async fn when_account_banned(world: &mut AppWorld, username: String) {
    let user = world.user(&username);
    world.app_state().users.ban(user.id).await.expect("ban user");
}

#[given(
    regex = r#"^"([^"]+)" organizes trip "([^"]+)" from "([^"]+)" to "([^"]+)" in (-?\d+) days? with (\d+) seats?$"#
)]
async fn given_trip(
    world: &mut AppWorld,
    organizer: String,
    name: String,
    from: String,
    to: String,
    day_offset: i64,
    seats: i64,
) {
    let organizer = world.user(&organizer);
    let id = world
        .app_state()
        .trips
        .create(&organizer, &trip_draft(&from, &to, day_offset, seats))
        .await
        .expect("create trip");
    world.trips.insert(name, id);
}

#[when(regex = r#"^"([^"]+)" joins trip "([^"]+)"$"#)]
async fn when_join(world: &mut AppWorld, username: String, trip: String) {
    let user = world.user(&username);
    let outcome = world
        .app_state()
        .trips
        .join(&user, world.trip(&trip))
        .await
        .expect("join trip");
    world.last_join = Some(outcome);
}

#[when(regex = r#"^"([^"]+)" leaves trip "([^"]+)"$"#)]
async fn when_leave(world: &mut AppWorld, username: String, trip: String) {
    let user = world.user(&username);
    world
        .app_state()
        .trips
        .leave(&user, world.trip(&trip))
        .await
        .expect("leave trip");
}

#[then(regex = r#"^the join answer is "([^"]+)"$"#)]
async fn then_join_answer(world: &mut AppWorld, message: String) {
    let outcome = world.last_join.expect("a join was attempted");
    assert_eq!(outcome.message(), message);
}

#[then(regex = r#"^trip "([^"]+)" has (\d+) participants? and (-?\d+) free seats?$"#)]
async fn then_trip_capacity(world: &mut AppWorld, trip: String, participants: i64, free: i64) {
    let trip = world
        .app_state()
        .trips
        .get(world.trip(&trip))
        .await
        .expect("load trip");
    assert_eq!(trip.participant_count(), participants);
    assert_eq!(trip.available_spots(), free);
}

#[when(
    regex = r#"^I search for trips from "([^"]*)" to "([^"]*)" with at least (\d+) free seats?$"#
)]
async fn when_search(world: &mut AppWorld, from: String, to: String, seats: u32) {
    let filter = TripFilter {
        departure: Some(from).filter(|s| !s.is_empty()),
        destination: Some(to).filter(|s| !s.is_empty()),
        min_available_spots: Some(seats),
        ..TripFilter::upcoming()
    };
    world.search_results = world
        .app_state()
        .trips
        .search(&filter, today())
        .await
        .expect("search trips")
        .into_iter()
        .map(|trip| trip.id)
        .collect();
}

#[then(regex = r#"^the search returns trips "([^"]*)"$"#)]
async fn then_search_returns(world: &mut AppWorld, names: String) {
    let expected: Vec<i64> = names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| world.trip(name))
        .collect();
    assert_eq!(world.search_results, expected);
}

#[when(regex = r#"^"([^"]+)" reviews trip "([^"]+)" with rating (\d) saying "([^"]+)"$"#)]
async fn when_review(
    world: &mut AppWorld,
    username: String,
    trip: String,
    rating: i64,
    text: String,
) {
    let user = world.user(&username);
    let draft = ReviewDraft {
        content: text,
        rating,
    };
    let outcome = world
        .app_state()
        .reviews
        .create(&user, Some(world.trip(&trip)), &draft, today())
        .await
        .expect("create review");
    world.last_review = Some(outcome);
}

#[then("the review is published")]
async fn then_review_published(world: &mut AppWorld) {
    match world.last_review {
        Some(ReviewOutcome::Created(id)) => {
            world.app_state().reviews.get(id).await.expect("stored review");
        }
        other => panic!("expected a published review, got {other:?}"),
    }
}

#[then(regex = r#"^the review is refused with "([^"]+)"$"#)]
async fn then_review_refused(world: &mut AppWorld, message: String) {
    match world.last_review {
        Some(ReviewOutcome::Denied(reason)) => assert_eq!(reason.message(), message),
        other => panic!("expected a refused review, got {other:?}"),
    }
}

#[then(regex = r#"^"([^"]+)" has an organizer rating of ([\d.]+) from (\d+) reviews?$"#)]
async fn then_organizer_rating(
    world: &mut AppWorld,
    username: String,
    average: String,
    count: i64,
) {
    let user = world.user(&username);
    let rating = world
        .app_state()
        .users
        .organizer_rating(user.id)
        .await
        .expect("organizer rating");
    assert_eq!(rating.count, count);
    assert_eq!(rating.average_text(), average);
}

async fn register_user(
    world: &mut AppWorld,
    username: String,
    password: String,
) -> Result<(), AppError> {
    let input = RegistrationInput {
        username: username.clone(),
        full_name: format!("{username} Tester"),
        email: format!("{username}@example.com"),
        phone_number: String::new(),
        password: password.clone(),
        password_confirm: password,
    };
    let registration = input.parse().map_err(AppError::Validation)?;
    let created = auth::register_user(world.app_state(), &registration).await?;
    world.users.insert(username, created);
    Ok(())
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
