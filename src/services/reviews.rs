use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::{
    auth::AuthenticatedUser,
    db::DbPool,
    error::AppError,
    models::review::Review,
    rules::eligibility::{self, Decision, DenyReason},
    services::trips::TripService,
    validation::{FieldErrors, ReviewDraft},
};

const REVIEW_SQL: &str = "SELECT r.id, r.content, r.rating, r.trip_id, r.reviewer_id, \
     u.username AS reviewer_name, t.departure_town, t.destination_town, t.trip_date, \
     r.created_at, r.updated_at \
     FROM reviews r JOIN users u ON u.id = r.reviewer_id LEFT JOIN trips t ON t.id = r.trip_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Created(i64),
    Denied(DenyReason),
}

#[derive(Clone)]
pub struct ReviewService {
    db: DbPool,
    trips: TripService,
}

impl ReviewService {
    pub fn new(db: DbPool) -> Self {
        Self {
            trips: TripService::new(db.clone()),
            db,
        }
    }

    pub async fn list(&self) -> Result<Vec<Review>, AppError> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SQL} ORDER BY r.created_at DESC, r.id DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(reviews)
    }

    pub async fn by_reviewer(&self, user_id: i64) -> Result<Vec<Review>, AppError> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SQL} WHERE r.reviewer_id = ?1 ORDER BY r.created_at DESC, r.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(reviews)
    }

    pub async fn for_trip(&self, trip_id: i64) -> Result<Vec<Review>, AppError> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SQL} WHERE r.trip_id = ?1 ORDER BY r.created_at DESC, r.id DESC"
        ))
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        Ok(reviews)
    }

    pub async fn find(&self, id: i64) -> Result<Option<Review>, AppError> {
        let review = sqlx::query_as::<_, Review>(&format!("{REVIEW_SQL} WHERE r.id = ?1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(review)
    }

    pub async fn get(&self, id: i64) -> Result<Review, AppError> {
        self.find(id).await?.ok_or(AppError::NotFound)
    }

    /// An unknown trip is an input error on the form, an ineligible one is a denial.
    pub async fn create(
        &self,
        reviewer: &AuthenticatedUser,
        trip_id: Option<i64>,
        draft: &ReviewDraft,
        today: NaiveDate,
    ) -> Result<ReviewOutcome, AppError> {
        let mut errors = FieldErrors::default();
        let Some(trip_id) = trip_id else {
            errors.push("trip_id", "Please choose a trip.");
            return Err(AppError::Validation(errors));
        };
        let Some(trip) = self.trips.find(trip_id).await? else {
            errors.push("trip_id", "The selected trip does not exist.");
            return Err(AppError::Validation(errors));
        };

        if let Decision::Deny(reason) = eligibility::can_review(reviewer.id, &trip, today) {
            info!(trip_id, user_id = reviewer.id, %reason, "review denied");
            return Ok(ReviewOutcome::Denied(reason));
        }

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO reviews (content, rating, trip_id, reviewer_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(&draft.content)
        .bind(draft.rating)
        .bind(trip_id)
        .bind(reviewer.id)
        .bind(now)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        info!(
            review_id = id,
            trip_id,
            user_id = reviewer.id,
            rating = draft.rating,
            "review created"
        );
        Ok(ReviewOutcome::Created(id))
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        id: i64,
        draft: &ReviewDraft,
    ) -> Result<(), AppError> {
        let review = self.get(id).await?;
        if !eligibility::can_manage_review(actor, &review) {
            return Err(AppError::Forbidden);
        }
        sqlx::query("UPDATE reviews SET content = ?1, rating = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(&draft.content)
            .bind(draft.rating)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        info!(review_id = id, actor_id = actor.id, "review updated");
        Ok(())
    }

    pub async fn delete(&self, actor: &AuthenticatedUser, id: i64) -> Result<(), AppError> {
        let review = self.get(id).await?;
        if !eligibility::can_manage_review(actor, &review) {
            return Err(AppError::Forbidden);
        }
        sqlx::query("DELETE FROM reviews WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;
        info!(review_id = id, actor_id = actor.id, "review deleted");
        Ok(())
    }
}
