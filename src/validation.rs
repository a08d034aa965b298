//! Typed parsing of submitted forms.
//!
//! Every form arrives as raw strings and is turned into a draft value or a
//! list of field errors. Nothing past this boundary sees unchecked input.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_with::{serde_as, NoneAsEmptyString};

pub const MAX_TOWN_LEN: usize = 100;
pub const MAX_PARTICIPANTS: i64 = 50;
pub const MAX_REVIEW_LEN: usize = 2000;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(|e| e.message.clone()).collect()
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripInput {
    pub departure_town: String,
    pub destination_town: String,
    pub trip_date: String,
    pub planned_start_time: String,
    pub organizer_phone: String,
    pub max_participants: String,
    #[serde(default)]
    pub version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripDraft {
    pub departure_town: String,
    pub destination_town: String,
    pub trip_date: NaiveDate,
    pub planned_start_time: NaiveTime,
    pub organizer_phone: String,
    pub max_participants: i64,
}

impl TripInput {
    /// `today` is only consulted for new trips; edits may keep a past date.
    pub fn parse(&self, today: Option<NaiveDate>) -> Result<TripDraft, FieldErrors> {
        let mut errors = FieldErrors::default();

        let departure_town = town(&mut errors, "departure_town", &self.departure_town);
        let destination_town = town(&mut errors, "destination_town", &self.destination_town);

        let trip_date = match NaiveDate::parse_from_str(self.trip_date.trim(), "%Y-%m-%d") {
            Ok(date) => {
                if today.is_some_and(|today| date < today) {
                    errors.push("trip_date", "The trip date cannot be in the past.");
                }
                Some(date)
            }
            Err(_) => {
                errors.push("trip_date", "Please enter a valid date (YYYY-MM-DD).");
                None
            }
        };

        let raw_time = self.planned_start_time.trim();
        let planned_start_time = NaiveTime::parse_from_str(raw_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw_time, "%H:%M:%S"))
            .ok();
        if planned_start_time.is_none() {
            errors.push("planned_start_time", "Please enter a valid start time (HH:MM).");
        }

        let organizer_phone = self.organizer_phone.trim().to_string();
        if !is_phone_number(&organizer_phone) {
            errors.push("organizer_phone", "Please enter a valid phone number.");
        }

        let max_participants = match self.max_participants.trim().parse::<i64>() {
            Ok(n) if (1..=MAX_PARTICIPANTS).contains(&n) => n,
            _ => {
                errors.push(
                    "max_participants",
                    format!("Seats must be a number between 1 and {MAX_PARTICIPANTS}."),
                );
                0
            }
        };

        match (trip_date, planned_start_time) {
            (Some(trip_date), Some(planned_start_time)) if errors.is_empty() => Ok(TripDraft {
                departure_town,
                destination_town,
                trip_date,
                planned_start_time,
                organizer_phone,
                max_participants,
            }),
            _ => Err(errors),
        }
    }
}

fn town(errors: &mut FieldErrors, field: &'static str, raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        errors.push(field, "This field is required.");
    } else if value.chars().count() > MAX_TOWN_LEN {
        errors.push(field, format!("At most {MAX_TOWN_LEN} characters are allowed."));
    }
    value.to_string()
}

fn is_phone_number(raw: &str) -> bool {
    raw.chars().filter(|c| c.is_ascii_digit()).count() >= 3
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'))
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewInput {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub trip_id: Option<i64>,
    pub content: String,
    pub rating: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDraft {
    pub content: String,
    pub rating: i64,
}

impl ReviewInput {
    pub fn parse(&self) -> Result<ReviewDraft, FieldErrors> {
        let mut errors = FieldErrors::default();

        let content = self.content.trim().to_string();
        if content.is_empty() {
            errors.push("content", "Please write a few words about the trip.");
        } else if content.chars().count() > MAX_REVIEW_LEN {
            errors.push("content", format!("At most {MAX_REVIEW_LEN} characters are allowed."));
        }

        let rating = match self.rating.trim().parse::<i64>() {
            Ok(n) if (1..=5).contains(&n) => n,
            _ => {
                errors.push("rating", "The rating must be between 1 and 5.");
                0
            }
        };

        errors.into_result(|| ReviewDraft { content, rating })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationInput {
    pub username: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password: String,
}

impl RegistrationInput {
    pub fn parse(&self) -> Result<Registration, FieldErrors> {
        let mut errors = FieldErrors::default();

        let username = username(&mut errors, &self.username);
        let full_name = full_name(&mut errors, &self.full_name);

        let email = self.email.trim().to_lowercase();
        if !is_email(&email) {
            errors.push("email", "Please enter a valid email address.");
        }

        let phone_number = optional_phone(&mut errors, &self.phone_number);

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(
                "password",
                format!("The password must have at least {MIN_PASSWORD_LEN} characters."),
            );
        }
        if self.password != self.password_confirm {
            errors.push("password_confirm", "The passwords do not match.");
        }

        errors.into_result(|| Registration {
            username,
            full_name,
            email,
            phone_number,
            password: self.password.clone(),
        })
    }
}

/// Fields a user may change on their own profile. The email address is fixed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDraft {
    pub username: String,
    pub full_name: String,
    pub phone_number: Option<String>,
}

impl ProfileInput {
    pub fn parse(&self) -> Result<ProfileDraft, FieldErrors> {
        let mut errors = FieldErrors::default();
        let username = username(&mut errors, &self.username);
        let full_name = full_name(&mut errors, &self.full_name);
        let phone_number = optional_phone(&mut errors, &self.phone_number);
        errors.into_result(|| ProfileDraft {
            username,
            full_name,
            phone_number,
        })
    }
}

// Usernames and emails share the login field, so a username never looks like an address.
fn username(errors: &mut FieldErrors, raw: &str) -> String {
    let username = raw.trim().to_string();
    if !(3..=32).contains(&username.chars().count()) {
        errors.push("username", "The username must have 3 to 32 characters.");
    } else if username.contains('@') || username.contains(char::is_whitespace) {
        errors.push("username", "The username cannot contain spaces or '@'.");
    }
    username
}

fn full_name(errors: &mut FieldErrors, raw: &str) -> String {
    let full_name = raw.trim().to_string();
    if full_name.is_empty() {
        errors.push("full_name", "Please tell us your name.");
    }
    full_name
}

fn optional_phone(errors: &mut FieldErrors, raw: &str) -> Option<String> {
    let phone = raw.trim();
    if phone.is_empty() {
        return None;
    }
    if !is_phone_number(phone) {
        errors.push("phone_number", "Please enter a valid phone number.");
    }
    Some(phone.to_string())
}

fn is_email(raw: &str) -> bool {
    match raw.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !raw.contains(' ')
        }
        None => false,
    }
}
