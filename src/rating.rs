use crate::{db, Error};
use std::{fmt::Display, str::FromStr};
use rocket_db_pools::sqlx::{self, Connection, Sqlite, pool::PoolConnection};


/// What a user thinks of a photo. A user holds at most one action per photo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Like,
    Dislike,
}

impl Action {
    /// Representation stored in the `action` column of `user_ratings`
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Like => "like",
            Action::Dislike => "dislike",
        }
    }

    /// Status reported when the user already rated the photo this way
    pub fn already_rated_status(&self) -> &'static str {
        match self {
            Action::Like => "already liked",
            Action::Dislike => "already disliked",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Action::Like),
            "dislike" => Ok(Action::Dislike),
            _ => Err(format!("unknown rating action \"{}\"", s)),
        }
    }
}


/// Result of applying an action to the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RatingOutcome {
    /// The user had not rated this photo yet
    Rated,
    /// The user's previous, opposite rating has been replaced
    Switched,
    /// The user had already rated this photo this way, nothing changed
    AlreadyRated,
}

impl RatingOutcome {
    /// Amounts to add to the (likes, dislikes) counters of the photo for this outcome
    pub fn counter_deltas(&self, action: Action) -> (i64, i64) {
        match (self, action) {
            (RatingOutcome::Rated, Action::Like) => (1, 0),
            (RatingOutcome::Rated, Action::Dislike) => (0, 1),
            (RatingOutcome::Switched, Action::Like) => (1, -1),
            (RatingOutcome::Switched, Action::Dislike) => (-1, 1),
            (RatingOutcome::AlreadyRated, _) => (0, 0),
        }
    }
}


/// Record that `email` rates `photo_id` with `action`, keeping the counters of the photo equal
/// to the number of entries of each kind in `user_ratings`.
///
/// The lookup and the update happen in a single transaction that starts with a write, so
/// SQLite grants it the write lock before anything is read : two concurrent requests for the
/// same pair are serialized instead of both seeing "no rating yet".
pub async fn apply(db_conn: &mut PoolConnection<Sqlite>, email: &str, photo_id: i64, action: Action) -> Result<RatingOutcome, Error> {
    // Photos are never removed, so this check doesn't need to be part of the transaction
    if !db::photo_exists(db_conn, photo_id).await? {
        return Err(Error::UnknownPhoto(photo_id));
    }

    let mut tx = db_conn.begin().await?;

    // Flip an existing opposite rating
    let switched = sqlx::query("UPDATE user_ratings SET action=? WHERE email=? AND photo_id=? AND action<>?;")
        .bind(action.as_str())
        .bind(email)
        .bind(photo_id)
        .bind(action.as_str())
        .execute(&mut *tx).await?
        .rows_affected() > 0;

    let outcome = if switched {
        RatingOutcome::Switched
    } else {
        // Either there is no rating yet, or it is already the requested one
        let inserted = sqlx::query("INSERT INTO user_ratings(email, photo_id, action) VALUES (?, ?, ?) ON CONFLICT(email, photo_id) DO NOTHING;")
            .bind(email)
            .bind(photo_id)
            .bind(action.as_str())
            .execute(&mut *tx).await?
            .rows_affected() > 0;
        if inserted { RatingOutcome::Rated } else { RatingOutcome::AlreadyRated }
    };

    if outcome != RatingOutcome::AlreadyRated {
        let (likes_delta, dislikes_delta) = outcome.counter_deltas(action);
        sqlx::query("UPDATE photos SET likes = likes + ?, dislikes = dislikes + ? WHERE id=?;")
            .bind(likes_delta)
            .bind(dislikes_delta)
            .bind(photo_id)
            .execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(outcome)
}


#[cfg(test)]
mod tests {
    use super::*;
    use rocket_db_pools::sqlx::{Row, SqlitePool};

    /// Open a private in-memory database with the schema and two photos
    async fn ledger() -> PoolConnection<Sqlite> {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let mut db_conn = pool.acquire().await.unwrap();
        for sql_query in include_str!("../schema.sql").split(';').map(|s| s.trim()).filter(|s| !s.is_empty()) {
            sqlx::query(sql_query).execute(&mut *db_conn).await.unwrap();
        }
        db::insert_photos(&mut db_conn, &["a.jpg".to_string(), "b.jpg".to_string()]).await.unwrap();
        db_conn
    }

    async fn counters(db_conn: &mut PoolConnection<Sqlite>, photo_id: i64) -> (u32, u32) {
        let photo = db::get_photo(db_conn, photo_id).await.unwrap().unwrap();
        (photo.likes, photo.dislikes)
    }

    async fn ledger_counts(db_conn: &mut PoolConnection<Sqlite>, photo_id: i64) -> (u32, u32) {
        let row = sqlx::query("SELECT
                COALESCE(SUM(action = 'like'), 0),
                COALESCE(SUM(action = 'dislike'), 0)
            FROM user_ratings WHERE photo_id=?;")
            .bind(photo_id)
            .fetch_one(&mut **db_conn).await.unwrap();
        (row.get(0), row.get(1))
    }

    #[test]
    fn action_text_form() {
        assert_eq!("like".parse::<Action>(), Ok(Action::Like));
        assert_eq!("dislike".parse::<Action>(), Ok(Action::Dislike));
        assert!("love".parse::<Action>().is_err());
        assert_eq!(Action::Dislike.to_string(), "dislike");
        assert_eq!(Action::Like.already_rated_status(), "already liked");
    }

    #[test]
    fn switching_moves_one_unit_between_counters() {
        assert_eq!(RatingOutcome::Switched.counter_deltas(Action::Dislike), (-1, 1));
        assert_eq!(RatingOutcome::Switched.counter_deltas(Action::Like), (1, -1));
        assert_eq!(RatingOutcome::AlreadyRated.counter_deltas(Action::Like), (0, 0));
    }

    #[rocket::async_test]
    async fn first_rating_then_repeat_then_switch() {
        let mut db_conn = ledger().await;

        assert_eq!(apply(&mut db_conn, "a@example.com", 1, Action::Like).await.unwrap(), RatingOutcome::Rated);
        assert_eq!(counters(&mut db_conn, 1).await, (1, 0));

        assert_eq!(apply(&mut db_conn, "a@example.com", 1, Action::Like).await.unwrap(), RatingOutcome::AlreadyRated);
        assert_eq!(counters(&mut db_conn, 1).await, (1, 0));

        assert_eq!(apply(&mut db_conn, "a@example.com", 1, Action::Dislike).await.unwrap(), RatingOutcome::Switched);
        assert_eq!(counters(&mut db_conn, 1).await, (0, 1));

        assert_eq!(apply(&mut db_conn, "b@example.com", 1, Action::Like).await.unwrap(), RatingOutcome::Rated);
        assert_eq!(counters(&mut db_conn, 1).await, (1, 1));

        // The other photo is untouched
        assert_eq!(counters(&mut db_conn, 2).await, (0, 0));
    }

    #[rocket::async_test]
    async fn counters_follow_the_ledger() {
        let mut db_conn = ledger().await;
        let users = ["a@example.com", "b@example.com", "c@example.com"];
        let sequence = [
            (0, 1, Action::Like), (1, 1, Action::Dislike), (2, 2, Action::Dislike),
            (0, 1, Action::Dislike), (0, 1, Action::Dislike), (1, 2, Action::Like),
            (2, 1, Action::Like), (1, 1, Action::Like), (2, 2, Action::Like),
            (0, 1, Action::Like),
        ];

        for (user, photo_id, action) in sequence {
            apply(&mut db_conn, users[user], photo_id, action).await.unwrap();
            for photo_id in [1, 2] {
                assert_eq!(counters(&mut db_conn, photo_id).await, ledger_counts(&mut db_conn, photo_id).await);
            }
        }

        // Last actions : photo 1 liked by everyone, photo 2 liked by b and c
        assert_eq!(counters(&mut db_conn, 1).await, (3, 0));
        assert_eq!(counters(&mut db_conn, 2).await, (2, 0));

        let entries: i64 = sqlx::query("SELECT COUNT(*) FROM user_ratings;")
            .fetch_one(&mut *db_conn).await.unwrap()
            .get(0);
        assert_eq!(entries, 5);
    }

    #[rocket::async_test]
    async fn unknown_photo_is_rejected_without_ledger_entry() {
        let mut db_conn = ledger().await;
        let result = apply(&mut db_conn, "a@example.com", 42, Action::Like).await;
        assert!(matches!(result, Err(Error::UnknownPhoto(42))));

        let entries: i64 = sqlx::query("SELECT COUNT(*) FROM user_ratings;")
            .fetch_one(&mut *db_conn).await.unwrap()
            .get(0);
        assert_eq!(entries, 0);
    }
}
