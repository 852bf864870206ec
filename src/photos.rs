use crate::config::Config;
use crate::db::{self, DB};
use crate::Error;
use std::io;
use std::path::{Path, PathBuf};
use itertools::Itertools;
use rocket::{fairing, Rocket, Build};
use rocket::futures::StreamExt;
use rocket::tokio::fs;
use rocket_db_pools::{Database, sqlx::{Sqlite, pool::PoolConnection}};
use serde::Serialize;
use tokio_stream::wrappers::ReadDirStream;

/// A photo of the catalog, with its rating counters
#[derive(Default, Serialize, Clone, Debug, PartialEq)]
pub struct Photo {
    pub id: i64,
    pub name: String,
    pub likes: u32,
    pub dislikes: u32,
    pub comments: Vec<Comment>,
}

/// A comment left by a user on a photo
#[derive(Default, Serialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub photo_id: i64,
    pub email: String,
    pub text: String,
    pub created_at: String,
}


/// Load every photo of the gallery, in display order, optionally with their comments
pub async fn load(db_conn: &mut PoolConnection<Sqlite>, with_comments: bool) -> Result<Vec<Photo>, Error> {
    let mut photos = db::get_photos(db_conn).await?;

    if with_comments {
        let mut comments = db::get_comments(db_conn).await?
            .into_iter()
            .into_group_map_by(|comment| comment.photo_id);
        for photo in photos.iter_mut() {
            if let Some(photo_comments) = comments.remove(&photo.id) {
                photo.comments = photo_comments;
            }
        }
    }

    Ok(photos)
}


/// Append a comment to the given photo, which must exist
pub async fn add_comment(db_conn: &mut PoolConnection<Sqlite>, email: &str, photo_id: i64, text: &str) -> Result<(), Error> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::MissingField("comment"));
    }
    if !db::photo_exists(db_conn, photo_id).await? {
        return Err(Error::UnknownPhoto(photo_id));
    }
    db::insert_comment(db_conn, photo_id, email, text).await
}


/// Fairing callback that adds to the catalog every file of the photos directory that is not
/// known yet. Running it again on the same directory doesn't change anything.
pub async fn seed(rocket: Rocket<Build>) -> fairing::Result {
    let photos_dir = rocket.state::<Config>().map(|config| PathBuf::from(&config.PHOTOS_DIR));
    let pool = DB::fetch(&rocket).map(|db| db.0.clone());
    let (Some(photos_dir), Some(pool)) = (photos_dir, pool) else {
        error!("Config or database pool missing, cannot load the photos catalog");
        return Err(rocket);
    };

    let result = match pool.acquire().await {
        Ok(mut db_conn) => seed_from_dir(&mut db_conn, &photos_dir).await,
        Err(e) => Err(Error::DatabaseError(e)),
    };
    match result {
        Ok(_) => Ok(rocket),
        Err(error) => {
            error!("Unable to load the photos catalog : {}", error);
            Err(rocket)
        }
    }
}


/// Insert the files of the given directory that are not in the database yet, and return
/// the list of names inserted
pub async fn seed_from_dir(db_conn: &mut PoolConnection<Sqlite>, photos_dir: &Path) -> Result<Vec<String>, Error> {
    check_photos_dir(photos_dir).await?;

    // Find photos in the filesystem that are not in the database yet
    let filenames_in_db = db::get_photo_names(db_conn).await?;
    let photos_to_insert = list_photo_files(photos_dir).await?
        .into_iter()
        .filter(|filename| !filenames_in_db.contains(filename))
        .collect::<Vec<String>>();

    if !photos_to_insert.is_empty() {
        info!("Inserting {} photo(s) into the database : {}",
            photos_to_insert.len(),
            photos_to_insert.iter().map(|filename| format!("\"{}\"", filename)).join(", ")
        );
        db::insert_photos(db_conn, &photos_to_insert).await?;
    }

    Ok(photos_to_insert)
}


/// Check that the photos directory exists, and if not, try to create it
pub async fn check_photos_dir(path: &Path) -> Result<(), Error> {
    match fs::metadata(path).await {
        Ok(metadata) => {
            if metadata.is_dir() {
                Ok(())
            } else {
                // The given path exists but is not a directory (probably a file?)
                Err(Error::FileError(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("\"{}\" is not a valid directory", path.display())
                ), path.to_path_buf()))
            }
        },

        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            info!("Creating empty directory \"{}\"", path.display());
            fs::create_dir_all(path).await.map_err(|e| Error::FileError(e, path.to_path_buf()))
        },

        Err(error) => Err(Error::FileError(error, path.to_path_buf())),
    }
}


/// Return the names of the regular, non-hidden files in the given directory, in natural order
pub async fn list_photo_files(path: &Path) -> Result<Vec<String>, Error> {
    let mut filenames: Vec<String> = Vec::new();
    let dir = fs::read_dir(path).await
        .map_err(|e| Error::FileError(e, path.to_path_buf()))?;
    let mut dir_stream = ReadDirStream::new(dir);
    while let Some(entry) = dir_stream.next().await {
        let entry = entry.map_err(|e| Error::FileError(e, path.to_path_buf()))?;
        if let Ok(file_type) = entry.file_type().await {
            match entry.file_name().into_string() {
                Ok(filename) => if file_type.is_file() && !filename.starts_with('.') {
                    filenames.push(filename);
                },
                Err(filename) => warn!("Ignoring file with a non UTF-8 name : {:?}", filename),
            }
        }
    }
    filenames.sort_by(|a, b| natord::compare(a, b));
    Ok(filenames)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::scratch_dir;
    use std::fs::File;

    #[rocket::async_test]
    async fn files_are_listed_in_natural_order() {
        let dir = scratch_dir();
        for name in ["img10.jpg", "img2.jpg", "img1.jpg", ".hidden.jpg"] {
            File::create(dir.join(name)).unwrap();
        }
        std::fs::create_dir(dir.join("subdir")).unwrap();

        let files = list_photo_files(&dir).await.unwrap();
        assert_eq!(files, vec!["img1.jpg", "img2.jpg", "img10.jpg"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[rocket::async_test]
    async fn missing_photos_dir_is_created() {
        let dir = scratch_dir().join("images");
        check_photos_dir(&dir).await.unwrap();
        assert!(dir.is_dir());
        std::fs::remove_dir_all(dir.parent().unwrap()).unwrap();
    }

    #[rocket::async_test]
    async fn photos_dir_must_be_a_directory() {
        let dir = scratch_dir();
        let file = dir.join("not_a_dir");
        File::create(&file).unwrap();
        assert!(matches!(check_photos_dir(&file).await, Err(Error::FileError(_, _))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
