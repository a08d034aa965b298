//! Who may join, review or manage a trip.
//!
//! Every check here is a pure function over already-loaded state. Callers pass
//! the acting user and the reference date explicitly so the same decisions can
//! be made in handlers, services and tests without ambient request state.

use std::fmt;

use chrono::NaiveDate;

use crate::{
    auth::AuthenticatedUser,
    models::{
        review::Review,
        trip::{Capacity, Trip},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    OwnTrip,
    TripFull,
    OwnTripReview,
    TripNotYetOccurred,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::OwnTrip => "You cannot join your own trip.",
            DenyReason::TripFull => "Sorry, this trip is full.",
            DenyReason::OwnTripReview => "You cannot write a review for your own trip.",
            DenyReason::TripNotYetOccurred => {
                "You cannot write a review for a trip that has not yet occurred."
            }
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Already being a participant is allowed; the join itself is then a no-op.
pub fn can_join(user_id: i64, trip: &Trip) -> Decision {
    if trip.is_organizer(user_id) {
        return Decision::Deny(DenyReason::OwnTrip);
    }
    if trip.is_full() && !trip.has_participant(user_id) {
        return Decision::Deny(DenyReason::TripFull);
    }
    Decision::Allow
}

/// Any non-organizer may review a trip once its date has passed.
pub fn can_review(user_id: i64, trip: &Trip, today: NaiveDate) -> Decision {
    if trip.trip_date >= today {
        return Decision::Deny(DenyReason::TripNotYetOccurred);
    }
    if trip.is_organizer(user_id) {
        return Decision::Deny(DenyReason::OwnTripReview);
    }
    Decision::Allow
}

pub fn available_spots(trip: &impl Capacity) -> i64 {
    trip.available_spots()
}

pub fn can_manage_trip(user: &AuthenticatedUser, trip: &Trip) -> bool {
    user.is_admin() || trip.is_organizer(user.id)
}

pub fn can_manage_review(user: &AuthenticatedUser, review: &Review) -> bool {
    user.is_admin() || review.reviewer_id == user.id
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveTime, Utc};

    use super::*;
    use crate::models::user::{UserCard, UserRole};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn trip(organizer_id: i64, max: i64, participants: &[i64], date: NaiveDate) -> Trip {
        Trip {
            id: 1,
            departure_town: "Sofia".into(),
            destination_town: "Plovdiv".into(),
            trip_date: date,
            planned_start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            organizer_id,
            organizer_name: "org1".into(),
            organizer_phone: "555-0001".into(),
            max_participants: max,
            version: 1,
            created_at: Utc::now(),
            participants: participants
                .iter()
                .map(|id| UserCard {
                    id: *id,
                    username: format!("user{id}"),
                    full_name: format!("User {id}"),
                })
                .collect(),
        }
    }

    fn user(id: i64, role: UserRole) -> AuthenticatedUser {
        AuthenticatedUser {
            id,
            uuid: format!("uuid-{id}"),
            username: format!("user{id}"),
            role,
        }
    }

    #[test]
    fn organizer_cannot_join_own_trip() {
        let t = trip(1, 3, &[], today());
        assert_eq!(can_join(1, &t), Decision::Deny(DenyReason::OwnTrip));

        let full = trip(1, 1, &[2], today());
        assert_eq!(can_join(1, &full), Decision::Deny(DenyReason::OwnTrip));
    }

    #[test]
    fn full_trip_denies_newcomers_but_not_members() {
        let t = trip(1, 2, &[2, 3], today());
        assert_eq!(can_join(4, &t), Decision::Deny(DenyReason::TripFull));
        assert_eq!(can_join(2, &t), Decision::Allow);
    }

    #[test]
    fn open_trip_allows_join() {
        let t = trip(1, 2, &[2], today());
        assert!(can_join(3, &t).is_allowed());
        assert_eq!(available_spots(&t), 1);
    }

    #[test]
    fn available_spots_tracks_participants() {
        for (max, members) in [(1, vec![]), (1, vec![2]), (4, vec![2, 3]), (3, vec![2, 3, 4])] {
            let t = trip(1, max, &members, today());
            assert_eq!(available_spots(&t), max - members.len() as i64);
            assert!(available_spots(&t) >= 0);
        }
    }

    #[test]
    fn past_trip_reviewable_by_anyone_but_organizer() {
        let t = trip(1, 3, &[], today() - Duration::days(1));
        assert_eq!(can_review(2, &t, today()), Decision::Allow);
        assert_eq!(
            can_review(1, &t, today()),
            Decision::Deny(DenyReason::OwnTripReview)
        );
    }

    #[test]
    fn todays_and_future_trips_are_not_reviewable() {
        for offset in [0, 1, 30] {
            let t = trip(1, 3, &[], today() + Duration::days(offset));
            assert_eq!(
                can_review(2, &t, today()),
                Decision::Deny(DenyReason::TripNotYetOccurred)
            );
        }
    }

    #[test]
    fn date_check_runs_before_organizer_check() {
        let t = trip(1, 3, &[], today() + Duration::days(1));
        assert_eq!(
            can_review(1, &t, today()),
            Decision::Deny(DenyReason::TripNotYetOccurred)
        );
    }

    #[test]
    fn admins_and_organizers_manage_trips() {
        let t = trip(1, 3, &[2], today());
        assert!(can_manage_trip(&user(1, UserRole::User), &t));
        assert!(can_manage_trip(&user(9, UserRole::Admin), &t));
        assert!(!can_manage_trip(&user(2, UserRole::User), &t));
    }

    #[test]
    fn deny_messages_are_user_facing() {
        assert_eq!(DenyReason::TripFull.to_string(), "Sorry, this trip is full.");
        assert_eq!(
            DenyReason::OwnTrip.message(),
            "You cannot join your own trip."
        );
    }
}
