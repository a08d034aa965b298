//! One-time notifications carried across a redirect.

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};

pub const FLASH_COOKIE: &str = "shared_travel_flash";

pub fn set(jar: PrivateCookieJar, message: impl Into<String>) -> PrivateCookieJar {
    jar.add(
        Cookie::build((FLASH_COOKIE, message.into()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Reads the pending message and removes it so it shows only once.
pub fn take(jar: PrivateCookieJar) -> (PrivateCookieJar, Option<String>) {
    match jar.get(FLASH_COOKIE) {
        Some(cookie) => {
            let message = cookie.value().to_string();
            (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), Some(message))
        }
        None => (jar, None),
    }
}
