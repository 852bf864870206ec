use crate::{Error, photos::{Comment, Photo}};
use rocket::{fairing, Rocket, Build};
use rocket_db_pools::{sqlx::{self, Sqlite, sqlite::SqliteRow, QueryBuilder, pool::PoolConnection}, sqlx::Row, Database};


/// Name of the pool in Rocket's `databases` configuration
pub const DATABASE_NAME: &'static str = "photorate";

/// Statements used to create the tables
const SCHEMA: &'static str = include_str!("../schema.sql");


#[derive(Database)]
#[database("photorate")]
pub struct DB(pub sqlx::SqlitePool);



/// Fairing callback that checks if the database has already been filled with the `photos`
/// table and if not, executes `schema.sql` to initialize it
pub async fn init_schema(rocket: Rocket<Build>) -> fairing::Result {
    // Make sure the database has been initialized (fairings have been attached in the correct order)
    if let Some(db) = DB::fetch(&rocket) {
        let db = &db.0;

        // Check the `sqlite_master` table for a table named `photos`
        let query_result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='photos';")
            .fetch_optional(db).await;
        match query_result {
            // The table already exists, we can proceed with liftoff
            Ok(Some(_)) => Ok(rocket),

            // The table doesn't exist, import the schema to create it
            Ok(None) => {
                info!("Database is empty, creating schema");
                match execute_schema(db).await {
                    Ok(()) => Ok(rocket),
                    Err((sql_query, error)) => {
                        error!("Unable to execute a query from schema.sql : {}", error);
                        error_!("{}", sql_query);
                        Err(rocket)
                    }
                }
            },

            // Something went wrong when checking `sqlite_master`, we'll have to scrub the launch
            Err(e) => {
                error!("Unable to access database to check schema : {}", e);
                Err(rocket)
            }
        }
    } else {
        error!("Database pool \"{}\" is not available, cannot check schema", DATABASE_NAME);
        Err(rocket)
    }
}


/// Execute every statement of the schema, returning the faulty statement on failure
async fn execute_schema(db: &sqlx::SqlitePool) -> Result<(), (&'static str, sqlx::Error)> {
    // Split the schema to import into individual queries
    let sql_queries = SCHEMA.split(';').map(|s| s.trim()).filter(|s| !s.is_empty());
    for sql_query in sql_queries {
        sqlx::query(sql_query)
            .execute(db).await
            .map_err(|e| (sql_query, e))?;
    }
    Ok(())
}


/// Get the names of every photo in the catalog
pub async fn get_photo_names(db_conn: &mut PoolConnection<Sqlite>) -> Result<Vec<String>, Error> {
    sqlx::query("SELECT name FROM photos;")
        .fetch_all(&mut **db_conn).await
        .map(|rows| rows.iter()
            .filter_map(|row| row.try_get::<String, _>(0).ok())
            .collect::<Vec<String>>()
        )
        .map_err(|e| Error::DatabaseError(e))
}


/// Insert a list of new photos into the catalog with zero counters. Names that are already
/// known are ignored. Returns the number of photos actually inserted.
pub async fn insert_photos(db_conn: &mut PoolConnection<Sqlite>, names: &[String]) -> Result<u64, Error> {
    let mut inserted = 0;

    // Insert photos by batches of up to 100
    for batch in names.chunks(100) {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new("INSERT OR IGNORE INTO photos(name) ");
        query_builder.push_values(batch, |mut builder, name| {
            builder.push_bind(name);
        });
        let query = query_builder.build();
        inserted += query.execute(&mut **db_conn).await
            .map_err(|e| Error::DatabaseError(e))?
            .rows_affected();
    }
    Ok(inserted)
}


/// Check whether a photo with the given id is in the catalog
pub async fn photo_exists(db_conn: &mut PoolConnection<Sqlite>, photo_id: i64) -> Result<bool, Error> {
    sqlx::query("SELECT 1 FROM photos WHERE id=? LIMIT 1;")
        .bind(photo_id)
        .fetch_optional(&mut **db_conn).await
        .map(|row| row.is_some())
        .map_err(|e| Error::DatabaseError(e))
}


/// Get a single photo based on its id
pub async fn get_photo(db_conn: &mut PoolConnection<Sqlite>, photo_id: i64) -> Result<Option<Photo>, Error> {
    sqlx::query("SELECT id, name, likes, dislikes FROM photos WHERE id=? LIMIT 1;")
        .bind(photo_id)
        .try_map(|row: SqliteRow| row_to_photo(&row))
        .fetch_optional(&mut **db_conn).await
        .map_err(|e| Error::DatabaseError(e))
}


/// Get every photo of the catalog in gallery order : least disliked first, then most liked,
/// then oldest in the catalog
pub async fn get_photos(db_conn: &mut PoolConnection<Sqlite>) -> Result<Vec<Photo>, Error> {
    sqlx::query("SELECT id, name, likes, dislikes FROM photos ORDER BY dislikes ASC, likes DESC, id ASC;")
        .fetch_all(&mut **db_conn).await
        .map(|rows| rows.iter()
            // Convert the list of rows into a list of Photo's, excluding invalid inputs from the result
            .filter_map(|row| {
                row_to_photo(row)
                    .map_err(|e| warn!("Unable to decode a photo : {}", e))
                    .ok()
            })
            .collect::<Vec<Photo>>()
        )
        .map_err(|e| Error::DatabaseError(e))
}


/// Get every comment, in creation order
pub async fn get_comments(db_conn: &mut PoolConnection<Sqlite>) -> Result<Vec<Comment>, Error> {
    sqlx::query("SELECT photo_id, email, text, created_at FROM comments ORDER BY created_at ASC, id ASC;")
        .try_map(|row: SqliteRow| Ok(Comment {
            photo_id: row.try_get(0)?,
            email: row.try_get(1)?,
            text: row.try_get(2)?,
            created_at: row.try_get(3)?,
        }))
        .fetch_all(&mut **db_conn).await
        .map_err(|e| Error::DatabaseError(e))
}


/// Append a comment to a photo
pub async fn insert_comment(db_conn: &mut PoolConnection<Sqlite>, photo_id: i64, email: &str, text: &str) -> Result<(), Error> {
    sqlx::query("INSERT INTO comments(photo_id, email, text) VALUES (?, ?, ?);")
        .bind(photo_id)
        .bind(email)
        .bind(text)
        .execute(&mut **db_conn).await
        .map(|_| ())
        .map_err(|e| Error::DatabaseError(e))
}


/// Deserialize an SQL row into a Photo struct, based on the `id, name, likes, dislikes` column order
fn row_to_photo(row: &SqliteRow) -> Result<Photo, sqlx::Error> {
    Ok(Photo {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        likes: row.try_get(2)?,
        dislikes: row.try_get(3)?,
        ..Default::default()
    })
}
