use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A review joined with its author and, while the trip still exists, the trip.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub content: String,
    pub rating: i64,
    pub trip_id: Option<i64>,
    pub reviewer_id: i64,
    pub reviewer_name: String,
    pub departure_town: Option<String>,
    pub destination_town: Option<String>,
    pub trip_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn trip_label(&self) -> String {
        match (&self.departure_town, &self.destination_town, self.trip_date) {
            (Some(from), Some(to), Some(date)) => {
                format!("{from} to {to} on {}", date.format("%d.%m.%Y"))
            }
            _ => "Deleted trip".to_string(),
        }
    }

    pub fn stars(&self) -> String {
        let filled = self.rating.clamp(0, 5) as usize;
        format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
    }
}

/// Aggregate rating over all reviews of the trips a user organized.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i64,
}

impl RatingSummary {
    pub fn average_text(&self) -> String {
        format!("{:.1}", self.average)
    }
}
