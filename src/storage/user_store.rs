use crate::{
    domain::{error::DomainError, models::UserRecord},
    storage::{SqliteStore, util},
};

type UserRow = (String, String, String, i64);

impl SqliteStore {
    pub async fn upsert_user(&self, user: &UserRecord) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO users(user_id, name, email, created_at_ms) VALUES(?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
               name = excluded.name, \
               email = excluded.email",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(util::ms_to_i64(user.created_at_ms))
        .execute(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to upsert user: {error}")))?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DomainError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, name, email, created_at_ms FROM users WHERE user_id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to get user: {error}")))?;

        Ok(row.map(map_user_row))
    }

    pub async fn put_session(
        &self,
        session_id: &str,
        user_id: &str,
        now_ms: u64,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO user_sessions(session_id, user_id, created_at_ms, last_active_ms) \
             VALUES(?, ?, ?, ?) \
             ON CONFLICT(session_id) DO UPDATE SET last_active_ms = excluded.last_active_ms",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(util::ms_to_i64(now_ms))
        .bind(util::ms_to_i64(now_ms))
        .execute(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to put session: {error}")))?;
        Ok(())
    }

    /// Indexed session -> user lookup; never a scan over user rows.
    pub async fn find_user_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<UserRecord>, DomainError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.user_id, u.name, u.email, u.created_at_ms \
             FROM user_sessions s JOIN users u ON u.user_id = s.user_id \
             WHERE s.session_id = ? LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|error| {
            DomainError::Storage(format!("failed to resolve session user: {error}"))
        })?;

        Ok(row.map(map_user_row))
    }

    pub async fn remove_session(&self, session_id: &str) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(self.pool())
            .await
            .map_err(|error| DomainError::Storage(format!("failed to remove session: {error}")))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_users(&self) -> Result<u64, DomainError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await
            .map_err(|error| DomainError::Storage(format!("failed to count users: {error}")))?;
        Ok(util::i64_to_ms(count))
    }
}

fn map_user_row(row: UserRow) -> UserRecord {
    let (id, name, email, created_at_ms) = row;
    UserRecord {
        id,
        name,
        email,
        created_at_ms: util::i64_to_ms(created_at_ms),
    }
}
