use chrono::{NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info};

use crate::{
    auth::AuthenticatedUser,
    db::DbPool,
    error::AppError,
    models::{
        trip::{Trip, TripSummary},
        user::UserCard,
    },
    rules::{
        eligibility::{self, Decision, DenyReason},
        search::{TripFilter, TripOrder},
    },
    validation::{FieldErrors, TripDraft},
};

const LISTING_SQL: &str = "SELECT id, departure_town, destination_town, trip_date, \
     planned_start_time, \
     organizer_id, organizer_name, organizer_phone, max_participants, participant_count FROM ( \
     SELECT t.id, t.departure_town, t.destination_town, t.trip_date, t.planned_start_time, \
     t.organizer_id, u.username AS organizer_name, t.organizer_phone, t.max_participants, \
     (SELECT COUNT(*) FROM trip_participants p WHERE p.trip_id = t.id) AS participant_count \
     FROM trips t JOIN users u ON u.id = t.organizer_id) AS trip_rows WHERE 1 = 1";

/// Which trips a listing draws from before filters apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripScope {
    All,
    ParticipatedBy(i64),
    OrganizedBy(i64),
    EndedBefore(NaiveDate),
}

impl TripScope {
    fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            TripScope::All => {}
            TripScope::ParticipatedBy(user_id) => {
                qb.push(" AND id IN (SELECT trip_id FROM trip_participants WHERE user_id = ")
                    .push_bind(*user_id)
                    .push(")");
            }
            TripScope::OrganizedBy(user_id) => {
                qb.push(" AND organizer_id = ").push_bind(*user_id);
            }
            TripScope::EndedBefore(date) => {
                qb.push(" AND trip_date < ").push_bind(*date);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyParticipant,
    Denied(DenyReason),
}

impl JoinOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            JoinOutcome::Joined => "You joined the trip. Have a nice ride!",
            JoinOutcome::AlreadyParticipant => "You are already part of this trip.",
            JoinOutcome::Denied(reason) => reason.message(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    NotParticipant,
}

#[derive(Clone)]
pub struct TripService {
    db: DbPool,
}

impl TripService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        organizer: &AuthenticatedUser,
        draft: &TripDraft,
    ) -> Result<i64, AppError> {
        let id = sqlx::query(
            "INSERT INTO trips (departure_town, destination_town, trip_date, planned_start_time,
                                organizer_id, organizer_phone, max_participants, version,
                                created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
        )
        .bind(&draft.departure_town)
        .bind(&draft.destination_town)
        .bind(draft.trip_date)
        .bind(draft.planned_start_time)
        .bind(organizer.id)
        .bind(&draft.organizer_phone)
        .bind(draft.max_participants)
        .bind(Utc::now())
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        info!(
            trip_id = id,
            organizer_id = organizer.id,
            from = %draft.departure_town,
            to = %draft.destination_town,
            date = %draft.trip_date,
            "trip created"
        );
        Ok(id)
    }

    pub async fn find(&self, id: i64) -> Result<Option<Trip>, AppError> {
        let trip = sqlx::query_as::<_, Trip>(
            "SELECT t.id, t.departure_town, t.destination_town, t.trip_date, t.planned_start_time,
                    t.organizer_id, u.username AS organizer_name, t.organizer_phone,
                    t.max_participants, t.version, t.created_at
             FROM trips t JOIN users u ON u.id = t.organizer_id
             WHERE t.id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        let Some(mut trip) = trip else {
            return Ok(None);
        };
        trip.participants = sqlx::query_as::<_, UserCard>(
            "SELECT u.id, u.username, u.full_name
             FROM trip_participants p JOIN users u ON u.id = p.user_id
             WHERE p.trip_id = ?1
             ORDER BY p.joined_at, u.id",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;
        Ok(Some(trip))
    }

    pub async fn get(&self, id: i64) -> Result<Trip, AppError> {
        self.find(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn list(
        &self,
        scope: TripScope,
        filter: &TripFilter,
        order: TripOrder,
        today: NaiveDate,
    ) -> Result<Vec<TripSummary>, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(LISTING_SQL);
        scope.push_sql(&mut qb);
        filter.build(today).push_sql(&mut qb);
        qb.push(order.sql());
        let trips = qb.build_query_as::<TripSummary>().fetch_all(&self.db).await?;
        debug!(?scope, count = trips.len(), "listed trips");
        Ok(trips)
    }

    /// Upcoming trips with free seats, narrowed by the search filter.
    pub async fn search(
        &self,
        filter: &TripFilter,
        today: NaiveDate,
    ) -> Result<Vec<TripSummary>, AppError> {
        self.list(TripScope::All, filter, TripOrder::Upcoming, today)
            .await
    }

    pub async fn participating(
        &self,
        user_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<TripSummary>, AppError> {
        self.list(
            TripScope::ParticipatedBy(user_id),
            &TripFilter::everything(),
            TripOrder::Upcoming,
            today,
        )
        .await
    }

    pub async fn organized(
        &self,
        user_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<TripSummary>, AppError> {
        self.list(
            TripScope::OrganizedBy(user_id),
            &TripFilter::everything(),
            TripOrder::Upcoming,
            today,
        )
        .await
    }

    /// Trips whose date lies before `today`, most recent first.
    pub async fn past(&self, today: NaiveDate) -> Result<Vec<TripSummary>, AppError> {
        self.list(
            TripScope::EndedBefore(today),
            &TripFilter::everything(),
            TripOrder::Past,
            today,
        )
        .await
    }

    /// Applies an organizer edit if nobody changed the trip since `expected_version`.
    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        id: i64,
        expected_version: i64,
        draft: &TripDraft,
    ) -> Result<(), AppError> {
        let trip = self.get(id).await?;
        if !eligibility::can_manage_trip(actor, &trip) {
            return Err(AppError::Forbidden);
        }
        if trip.version != expected_version {
            return Err(AppError::stale());
        }
        if draft.max_participants < trip.participants.len() as i64 {
            let mut errors = FieldErrors::default();
            errors.push(
                "max_participants",
                format!(
                    "{} people already joined; the seat count cannot be lower.",
                    trip.participants.len()
                ),
            );
            return Err(AppError::Validation(errors));
        }

        let updated = sqlx::query(
            "UPDATE trips SET departure_town = ?1, destination_town = ?2, trip_date = ?3,
                    planned_start_time = ?4, organizer_phone = ?5, max_participants = ?6,
                    version = version + 1
             WHERE id = ?7 AND version = ?8
               AND ?6 >= (SELECT COUNT(*) FROM trip_participants p WHERE p.trip_id = ?7)",
        )
        .bind(&draft.departure_town)
        .bind(&draft.destination_town)
        .bind(draft.trip_date)
        .bind(draft.planned_start_time)
        .bind(&draft.organizer_phone)
        .bind(draft.max_participants)
        .bind(id)
        .bind(expected_version)
        .execute(&self.db)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::stale());
        }
        info!(trip_id = id, actor_id = actor.id, "trip updated");
        Ok(())
    }

    /// Participants go with the trip; reviews stay but lose their trip link.
    pub async fn delete(&self, actor: &AuthenticatedUser, id: i64) -> Result<(), AppError> {
        let trip = self.get(id).await?;
        if !eligibility::can_manage_trip(actor, &trip) {
            return Err(AppError::Forbidden);
        }
        sqlx::query("DELETE FROM trips WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;
        info!(trip_id = id, actor_id = actor.id, "trip deleted");
        Ok(())
    }

    /// The seat is taken by a single conditional insert, so two racing joins
    /// can never push a trip past its capacity.
    pub async fn join(&self, user: &AuthenticatedUser, id: i64) -> Result<JoinOutcome, AppError> {
        let trip = self.get(id).await?;
        if let Decision::Deny(reason) = eligibility::can_join(user.id, &trip) {
            info!(trip_id = id, user_id = user.id, %reason, "join denied");
            return Ok(JoinOutcome::Denied(reason));
        }
        if trip.has_participant(user.id) {
            return Ok(JoinOutcome::AlreadyParticipant);
        }

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO trip_participants (trip_id, user_id, joined_at)
             SELECT t.id, ?2, ?3 FROM trips t
             WHERE t.id = ?1 AND t.organizer_id <> ?2
               AND (SELECT COUNT(*) FROM trip_participants p WHERE p.trip_id = t.id)
                   < t.max_participants",
        )
        .bind(id)
        .bind(user.id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?
        .rows_affected();

        if inserted == 1 {
            info!(trip_id = id, user_id = user.id, "joined trip");
            return Ok(JoinOutcome::Joined);
        }

        // Lost a race: someone else took the last seat, or this user joined twice at once.
        let current = self.get(id).await?;
        if current.has_participant(user.id) {
            Ok(JoinOutcome::AlreadyParticipant)
        } else {
            info!(trip_id = id, user_id = user.id, "join lost the race for the last seat");
            Ok(JoinOutcome::Denied(DenyReason::TripFull))
        }
    }

    pub async fn leave(&self, user: &AuthenticatedUser, id: i64) -> Result<LeaveOutcome, AppError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM trips WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound);
        }

        let removed =
            sqlx::query("DELETE FROM trip_participants WHERE trip_id = ?1 AND user_id = ?2")
                .bind(id)
                .bind(user.id)
                .execute(&self.db)
                .await?
                .rows_affected();

        if removed == 0 {
            return Ok(LeaveOutcome::NotParticipant);
        }
        info!(trip_id = id, user_id = user.id, "left trip");
        Ok(LeaveOutcome::Left)
    }
}
