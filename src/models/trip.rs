use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::user::UserCard;

/// Seat accounting shared by fully loaded trips and listing rows.
pub trait Capacity {
    fn max_participants(&self) -> i64;
    fn participant_count(&self) -> i64;

    fn available_spots(&self) -> i64 {
        self.max_participants() - self.participant_count()
    }

    fn is_full(&self) -> bool {
        self.available_spots() <= 0
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Trip {
    pub id: i64,
    pub departure_town: String,
    pub destination_town: String,
    pub trip_date: NaiveDate,
    pub planned_start_time: NaiveTime,
    pub organizer_id: i64,
    pub organizer_name: String,
    pub organizer_phone: String,
    pub max_participants: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub participants: Vec<UserCard>,
}

impl Trip {
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    pub fn is_organizer(&self, user_id: i64) -> bool {
        self.organizer_id == user_id
    }

    pub fn date_label(&self) -> String {
        self.trip_date.format("%d.%m.%Y").to_string()
    }

    pub fn start_time_label(&self) -> String {
        self.planned_start_time.format("%H:%M").to_string()
    }

    pub fn spots_left(&self) -> i64 {
        self.available_spots()
    }
}

impl Capacity for Trip {
    fn max_participants(&self) -> i64 {
        self.max_participants
    }

    fn participant_count(&self) -> i64 {
        self.participants.len() as i64
    }
}

/// Row shape of every trip listing.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TripSummary {
    pub id: i64,
    pub departure_town: String,
    pub destination_town: String,
    pub trip_date: NaiveDate,
    pub planned_start_time: NaiveTime,
    pub organizer_id: i64,
    pub organizer_name: String,
    pub organizer_phone: String,
    pub max_participants: i64,
    pub participant_count: i64,
}

impl TripSummary {
    pub fn date_label(&self) -> String {
        self.trip_date.format("%d.%m.%Y").to_string()
    }

    pub fn start_time_label(&self) -> String {
        self.planned_start_time.format("%H:%M").to_string()
    }

    pub fn label(&self) -> String {
        format!(
            "{} to {} on {}",
            self.departure_town,
            self.destination_town,
            self.date_label()
        )
    }

    pub fn spots_left(&self) -> i64 {
        self.available_spots()
    }
}

impl Capacity for TripSummary {
    fn max_participants(&self) -> i64 {
        self.max_participants
    }

    fn participant_count(&self) -> i64 {
        self.participant_count
    }
}
