use std::{fs::File, net::SocketAddr};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, NaiveTime};
use shared_travel::{
    auth::{self, SESSION_COOKIE},
    config::AppConfig,
    db::{init_pool, migrate},
    flash::FLASH_COOKIE,
    routes::create_router,
    rules::today,
    state::AppState,
    validation::{Registration, TripDraft},
};
use tempfile::TempDir;
use tower::ServiceExt;

async fn test_state() -> (AppState, TempDir) {
    let root = TempDir::new().expect("temp dir");
    let db_path = root.path().join("router.sqlite");
    File::create(&db_path).expect("db file");
    let config = AppConfig {
        database_url: format!("sqlite://{}", db_path.to_string_lossy()),
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        cookie_secret: "router-test-cookie-secret".into(),
        session_ttl_hours: 1,
        admin_seed: None,
    };
    let db = init_pool(&config.database_url).await.expect("pool");
    migrate(&db).await.expect("migrate");
    (AppState::new(config, db), root)
}

async fn test_app() -> (Router, TempDir) {
    let (state, root) = test_state().await;
    (create_router(state), root)
}

fn form(uri: &str, body: String, cookie: Option<&str>) -> Request<Body> {
    let mut builder =
        Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).expect("request")
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn set_cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&format!("{name}=")))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

fn session_cookie(response: &Response) -> String {
    set_cookie(response, SESSION_COOKIE).expect("session cookie")
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn register(app: &Router, username: &str) -> String {
    let body = format!(
        "username={username}&full_name=Test+User&email={username}%40example.com\
         &phone_number=&password=secret-pass&password_confirm=secret-pass"
    );
    let response = app.clone().oneshot(form("/register", body, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/trips");
    session_cookie(&response)
}

#[tokio::test]
async fn anonymous_visitors_are_sent_to_login() {
    let (app, _root) = test_app().await;
    let response = app.clone().oneshot(get("/trips", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = app.oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn registered_user_publishes_and_views_a_trip() {
    let (app, _root) = test_app().await;
    let cookie = register(&app, "maria").await;

    let response = app.clone().oneshot(get("/trips", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let date = (today() + Duration::days(3)).format("%Y-%m-%d");
    let body = format!(
        "departure_town=Sofia&destination_town=Varna&trip_date={date}\
         &planned_start_time=08%3A30&organizer_phone=0888123456&max_participants=3"
    );
    let response = app.clone().oneshot(form("/trips", body, Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/trips/1");

    let response = app.oneshot(get("/trips/1", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_trip_form_is_rendered_again() {
    let (app, _root) = test_app().await;
    let cookie = register(&app, "ivan").await;
    let body = concat!(
        "departure_town=&destination_town=Varna&trip_date=tomorrow",
        "&planned_start_time=8&organizer_phone=x&max_participants=0",
    )
    .to_string();
    let response = app.oneshot(form("/trips", body, Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn admin_pages_are_forbidden_for_travellers() {
    let (app, _root) = test_app().await;
    let cookie = register(&app, "petar").await;
    let response = app.oneshot(get("/admin/users", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn joining_an_unknown_trip_is_not_found() {
    let (app, _root) = test_app().await;
    let cookie = register(&app, "elena").await;
    let response = app
        .oneshot(form("/trips/999/join", String::new(), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let (app, _root) = test_app().await;
    let cookie = register(&app, "georgi").await;
    let response = app
        .clone()
        .oneshot(form("/logout", String::new(), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app.oneshot(get("/trips", Some(&cookie))).await.unwrap();
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn review_confirmation_is_shown_once_on_the_review_page() {
    let (state, _root) = test_state().await;
    let organizer = auth::register_user(
        &state,
        &Registration {
            username: "nikola".into(),
            full_name: "Nikola Petrov".into(),
            email: "nikola@example.com".into(),
            phone_number: None,
            password: "secret-pass".into(),
        },
    )
    .await
    .expect("organizer");
    let draft = TripDraft {
        departure_town: "Plovdiv".into(),
        destination_town: "Burgas".into(),
        trip_date: today() - Duration::days(2),
        planned_start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
        organizer_phone: "0888123456".into(),
        max_participants: 3,
    };
    let trip_id = state.trips.create(&organizer, &draft).await.expect("trip");
    let app = create_router(state);
    let session = register(&app, "desi").await;

    let body = format!("trip_id={trip_id}&rating=4&content=Nice");
    let response = app
        .clone()
        .oneshot(form("/reviews", body, Some(&session)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/reviews/1");
    let flash = set_cookie(&response, FLASH_COOKIE).expect("flash cookie");

    let cookies = format!("{session}; {flash}");
    let response = app
        .clone()
        .oneshot(get("/reviews/1", Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = set_cookie(&response, FLASH_COOKIE).expect("flash removal");
    assert_eq!(cleared, format!("{FLASH_COOKIE}="));
    assert!(body_text(response).await.contains("Thank you for your review!"));

    let response = app.oneshot(get("/reviews/1", Some(&session))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_text(response).await.contains("Thank you for your review!"));
}

#[tokio::test]
async fn travellers_edit_their_profile_but_not_into_a_taken_name() {
    let (app, _root) = test_app().await;
    let maria = register(&app, "maria").await;

    let response = app
        .clone()
        .oneshot(get("/profile/edit", Some(&maria)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("maria@example.com"));

    let body = "username=maria_i&full_name=Maria+Ivanova&phone_number=".to_string();
    let response = app
        .clone()
        .oneshot(form("/profile/edit", body, Some(&maria)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/1");
    let flash = set_cookie(&response, FLASH_COOKIE).expect("flash cookie");

    let cookies = format!("{maria}; {flash}");
    let response = app
        .clone()
        .oneshot(get("/profile/1", Some(&cookies)))
        .await
        .unwrap();
    let page = body_text(response).await;
    assert!(page.contains("Your profile has been updated."));
    assert!(page.contains("Maria Ivanova"));

    let ivan = register(&app, "ivan").await;
    let body = "username=maria_i&full_name=Ivan+Georgiev&phone_number=".to_string();
    let response = app
        .oneshot(form("/profile/edit", body, Some(&ivan)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("This username is already taken."));
}
