use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        review::RatingSummary,
        user::{User, UserRole},
    },
    validation::ProfileDraft,
};

const USER_COLUMNS: &str = "id, uuid, username, full_name, email, phone_number, password_hash, \
     role, banned, created_at, last_login_at";

/// Fields of a user row about to be inserted; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
}

#[derive(Clone)]
pub struct UserService {
    db: DbPool,
}

impl UserService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        if self.identifier_taken(&user.username, None).await?
            || self.identifier_taken(&user.email, None).await?
        {
            return Err(AppError::BadRequest(
                "This username or email address is already registered.".into(),
            ));
        }

        let id = sqlx::query(
            "INSERT INTO users (uuid, username, full_name, email, phone_number, password_hash,
                                role, banned, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        info!(user_id = id, username = %user.username, role = %user.role, "user registered");
        self.find(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn find(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    /// Usernames and emails share one login namespace: a value is taken when
    /// any other account uses it as either.
    async fn identifier_taken(&self, value: &str, except: Option<i64>) -> Result<bool, AppError> {
        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users
             WHERE (username = ?1 OR email = lower(?1)) AND id <> ?2",
        )
        .bind(value)
        .bind(except.unwrap_or(-1))
        .fetch_one(&self.db)
        .await?;
        Ok(taken > 0)
    }

    /// Changes the self-service profile fields; the email address stays as registered.
    pub async fn update_profile(&self, id: i64, draft: &ProfileDraft) -> Result<User, AppError> {
        if self.identifier_taken(&draft.username, Some(id)).await? {
            return Err(AppError::BadRequest("This username is already taken.".into()));
        }
        let updated = sqlx::query(
            "UPDATE users SET username = ?1, full_name = ?2, phone_number = ?3 WHERE id = ?4",
        )
        .bind(&draft.username)
        .bind(&draft.full_name)
        .bind(&draft.phone_number)
        .bind(id)
        .execute(&self.db)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(AppError::NotFound);
        }
        info!(user_id = id, username = %draft.username, "profile updated");
        self.find(id).await?.ok_or(AppError::NotFound)
    }

    /// Looks a user up by username or email.
    pub async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        let identifier = identifier.trim();
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR email = lower(?1)"
        ))
        .bind(identifier)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    pub async fn touch_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = ?1 WHERE id = ?2")
            .bind(at)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn set_role(&self, id: i64, role: UserRole) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET role = ?1 WHERE id = ?2")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Locks the account and ends all of its sessions.
    pub async fn ban(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;
        let updated = sqlx::query("UPDATE users SET banned = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::NotFound);
        }
        sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(user_id = id, "user banned");
        Ok(())
    }

    pub async fn unban(&self, id: i64) -> Result<(), AppError> {
        let updated = sqlx::query("UPDATE users SET banned = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::NotFound);
        }
        info!(user_id = id, "user unbanned");
        Ok(())
    }

    /// Organizers must hand over or delete their trips first.
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        let organized: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM trips WHERE organizer_id = ?1")
                .bind(id)
                .fetch_one(&self.db)
                .await?;
        if organized > 0 {
            return Err(AppError::BadRequest(format!(
                "This user still organizes {organized} trip(s); delete those first."
            )));
        }
        let deleted = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound);
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }

    /// Average rating over every review left on trips this user organized.
    pub async fn organizer_rating(&self, id: i64) -> Result<RatingSummary, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(r.id) AS review_count, AVG(r.rating) AS average
             FROM reviews r JOIN trips t ON t.id = r.trip_id
             WHERE t.organizer_id = ?1",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        Ok(RatingSummary {
            count: row.get("review_count"),
            average: row.get::<Option<f64>, _>("average").unwrap_or(0.0),
        })
    }
}
