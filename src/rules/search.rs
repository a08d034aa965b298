//! Trip search filters.
//!
//! A [`TripFilter`] is turned into a conjunctive set of [`TripPredicate`]s.
//! The same set renders into bound SQL for the database and evaluates in
//! memory, so listings and tests agree on what a filter means.

use std::cmp::Ordering;

use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};

use crate::models::trip::{Capacity, TripSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripFilter {
    pub departure: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
    pub min_available_spots: Option<u32>,
    pub include_past: bool,
    pub include_full: bool,
}

impl TripFilter {
    /// Forward-looking listing: no past trips, no full trips.
    pub fn upcoming() -> Self {
        Self::default()
    }

    /// Everything, regardless of date or capacity.
    pub fn everything() -> Self {
        Self {
            include_past: true,
            include_full: true,
            ..Self::default()
        }
    }

    pub fn has_search_terms(&self) -> bool {
        non_blank(&self.departure).is_some()
            || non_blank(&self.destination).is_some()
            || self.date.is_some()
            || self.min_available_spots.is_some_and(|n| n > 0)
    }

    pub fn build(&self, today: NaiveDate) -> TripPredicates {
        let mut predicates = Vec::new();
        if let Some(needle) = non_blank(&self.departure) {
            predicates.push(TripPredicate::DepartureContains(needle));
        }
        if let Some(needle) = non_blank(&self.destination) {
            predicates.push(TripPredicate::DestinationContains(needle));
        }
        if let Some(date) = self.date {
            predicates.push(TripPredicate::OnDate(date));
        }
        if let Some(min) = self.min_available_spots.filter(|n| *n > 0) {
            predicates.push(TripPredicate::MinAvailableSpots(min));
        }
        if !self.include_past {
            predicates.push(TripPredicate::NotBefore(today));
        }
        if !self.include_full {
            predicates.push(TripPredicate::HasFreeSeat);
        }
        TripPredicates(predicates)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripPredicate {
    DepartureContains(String),
    DestinationContains(String),
    OnDate(NaiveDate),
    MinAvailableSpots(u32),
    NotBefore(NaiveDate),
    HasFreeSeat,
}

impl TripPredicate {
    pub fn matches(&self, trip: &TripSummary) -> bool {
        match self {
            TripPredicate::DepartureContains(needle) => {
                trip.departure_town.contains(needle.as_str())
            }
            TripPredicate::DestinationContains(needle) => {
                trip.destination_town.contains(needle.as_str())
            }
            TripPredicate::OnDate(date) => trip.trip_date == *date,
            TripPredicate::MinAvailableSpots(min) => trip.available_spots() >= i64::from(*min),
            TripPredicate::NotBefore(today) => trip.trip_date >= *today,
            TripPredicate::HasFreeSeat => !trip.is_full(),
        }
    }

    /// Appends ` AND <condition>` against the listing row columns.
    fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            TripPredicate::DepartureContains(needle) => {
                qb.push(" AND instr(departure_town, ")
                    .push_bind(needle.clone())
                    .push(") > 0");
            }
            TripPredicate::DestinationContains(needle) => {
                qb.push(" AND instr(destination_town, ")
                    .push_bind(needle.clone())
                    .push(") > 0");
            }
            TripPredicate::OnDate(date) => {
                qb.push(" AND trip_date = ").push_bind(*date);
            }
            TripPredicate::MinAvailableSpots(min) => {
                qb.push(" AND (max_participants - participant_count) >= ")
                    .push_bind(i64::from(*min));
            }
            TripPredicate::NotBefore(today) => {
                qb.push(" AND trip_date >= ").push_bind(*today);
            }
            TripPredicate::HasFreeSeat => {
                qb.push(" AND participant_count < max_participants");
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripPredicates(Vec<TripPredicate>);

impl TripPredicates {
    pub fn iter(&self) -> impl Iterator<Item = &TripPredicate> {
        self.0.iter()
    }

    pub fn matches(&self, trip: &TripSummary) -> bool {
        self.0.iter().all(|p| p.matches(trip))
    }

    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for predicate in &self.0 {
            predicate.push_sql(qb);
        }
    }

    /// In-memory counterpart of the SQL listing: filter, then sort.
    pub fn apply(
        &self,
        trips: impl IntoIterator<Item = TripSummary>,
        order: TripOrder,
    ) -> Vec<TripSummary> {
        let mut selected: Vec<TripSummary> =
            trips.into_iter().filter(|t| self.matches(t)).collect();
        selected.sort_by(|a, b| order.compare(a, b));
        selected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TripOrder {
    /// Soonest first.
    #[default]
    Upcoming,
    /// Most recent first.
    Past,
}

impl TripOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            TripOrder::Upcoming => " ORDER BY trip_date ASC, planned_start_time ASC, id ASC",
            TripOrder::Past => " ORDER BY trip_date DESC, planned_start_time DESC, id ASC",
        }
    }

    pub fn compare(&self, a: &TripSummary, b: &TripSummary) -> Ordering {
        let primary =
            (a.trip_date, a.planned_start_time).cmp(&(b.trip_date, b.planned_start_time));
        let primary = match self {
            TripOrder::Upcoming => primary,
            TripOrder::Past => primary.reverse(),
        };
        primary.then(a.id.cmp(&b.id))
    }
}
