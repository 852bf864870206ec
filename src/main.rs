#[macro_use] extern crate rocket;

mod config;
mod db;
mod photos;
mod rating;
mod session;

use config::Config;
use db::DB;
use rating::{Action, RatingOutcome};
use session::Identity;
use std::{io, path::PathBuf};
use rocket::{Build, Request, Rocket, State};
use rocket::fairing::AdHoc;
use rocket::fs::{FileServer, Options};
use rocket::http::{CookieJar, Status};
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket_db_pools::{Connection, Database};
use rocket_dyn_templates::{Template, context};
use serde::{Deserialize, Serialize};



#[launch]
async fn rocket() -> _ {
    // Try to read the config file, or exit immediately in case of an error
    let config = Config::read_or_exit();

    // Let's go to spaaace !
    build(config)
}


/// Assemble the app for the given config : database and catalog fairings, routes and catchers
pub fn build(config: Config) -> Rocket<Build> {
    let photos_dir = PathBuf::from(&config.PHOTOS_DIR);

    rocket::custom(config.figment())
        .attach(DB::init())
        .attach(AdHoc::try_on_ignite("Database schema", db::init_schema))
        .attach(AdHoc::try_on_ignite("Photos catalog", photos::seed))
        .attach(Template::fairing())
        .mount("/", routes![
            get_gallery,
            post_login,
            post_logout,
            post_like,
            post_dislike,
            post_comment,
        ])
        // The directory is created by the catalog fairing if it doesn't exist yet
        .mount("/images", FileServer::new(photos_dir, Options::Missing))
        .register("/", catchers![
            bad_request,
            forbidden,
            not_found,
            unprocessable_entity,
            internal_error,
        ])
        .manage(config)
}


/// Route handler called to render the gallery
#[get("/")]
async fn get_gallery(identity: Option<Identity>, mut db: Connection<DB>, config: &State<Config>) -> Result<Template, Error> {
    let photos = photos::load(&mut *db, config.SHOW_COMMENTS).await?;
    Ok(Template::render("index", context! {
        title: &config.TITLE,
        email: identity.as_ref().map(|identity| identity.email()),
        show_comments: config.SHOW_COMMENTS,
        photos: photos,
    }))
}


#[derive(Deserialize, Debug)]
struct LoginRequest {
    email: Option<String>,
}

/// Route handler called by AJAX to associate an email with the client's session
#[post("/login", data = "<request>")]
fn post_login(request: Json<LoginRequest>, cookies: &CookieJar<'_>) -> Result<Json<StatusResponse>, Error> {
    let email = request.email.as_deref().unwrap_or_default();
    let identity = Identity::login(cookies, email).ok_or(Error::MissingField("email"))?;
    info!("{} logged in", identity.email());
    Ok(Json(StatusResponse::success().with_message("Logged in successfully")))
}


/// Route handler called by AJAX to forget the client's identity
#[post("/logout")]
fn post_logout(cookies: &CookieJar<'_>) -> Json<StatusResponse> {
    Identity::logout(cookies);
    Json(StatusResponse::success().with_message("Logged out successfully"))
}


#[derive(Deserialize, Debug)]
struct RatingRequest {
    photo_id: i64,
}

/// Route handler called by AJAX when a user likes a photo
#[post("/like", data = "<request>")]
async fn post_like(identity: Identity, db: Connection<DB>, request: Json<RatingRequest>) -> Result<Json<StatusResponse>, Error> {
    rate(identity, db, request.photo_id, Action::Like).await
}

/// Route handler called by AJAX when a user dislikes a photo
#[post("/dislike", data = "<request>")]
async fn post_dislike(identity: Identity, db: Connection<DB>, request: Json<RatingRequest>) -> Result<Json<StatusResponse>, Error> {
    rate(identity, db, request.photo_id, Action::Dislike).await
}

/// Apply the rating and report the outcome along with the updated counters of the photo
async fn rate(identity: Identity, mut db: Connection<DB>, photo_id: i64, action: Action) -> Result<Json<StatusResponse>, Error> {
    let outcome = rating::apply(&mut *db, identity.email(), photo_id, action).await?;
    let mut response = match outcome {
        RatingOutcome::AlreadyRated => StatusResponse::new(action.already_rated_status()),
        RatingOutcome::Rated | RatingOutcome::Switched => {
            info!("{} {}s photo {}", identity.email(), action, photo_id);
            StatusResponse::success()
        }
    };
    if let Some(photo) = db::get_photo(&mut *db, photo_id).await? {
        response = response.with_counters(photo.likes, photo.dislikes);
    }
    Ok(Json(response))
}


#[derive(Deserialize, Debug)]
struct CommentRequest {
    photo_id: i64,
    comment: String,
}

/// Route handler called by AJAX to add a comment to a photo
#[post("/comment", data = "<request>")]
async fn post_comment(identity: Identity, mut db: Connection<DB>, request: Json<CommentRequest>) -> Result<Json<StatusResponse>, Error> {
    photos::add_comment(&mut *db, identity.email(), request.photo_id, &request.comment).await?;
    info!("{} commented on photo {}", identity.email(), request.photo_id);
    Ok(Json(StatusResponse::success()))
}


#[catch(400)]
fn bad_request() -> Json<StatusResponse> {
    Json(StatusResponse::error("Bad request"))
}

#[catch(403)]
fn forbidden() -> Json<StatusResponse> {
    Json(StatusResponse::error(&Error::MissingIdentity.to_string()))
}

#[catch(404)]
fn not_found() -> Json<StatusResponse> {
    Json(StatusResponse::error("Not found"))
}

#[catch(422)]
fn unprocessable_entity() -> Json<StatusResponse> {
    Json(StatusResponse::error("Invalid request body"))
}

#[catch(500)]
fn internal_error() -> Json<StatusResponse> {
    Json(StatusResponse::error("Internal server error"))
}


/// JSON body returned by every AJAX route
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatusResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    likes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dislikes: Option<u32>,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            message: None,
            likes: None,
            dislikes: None,
        }
    }

    pub fn success() -> Self {
        Self::new("success")
    }

    pub fn error(message: &str) -> Self {
        Self::new("error").with_message(message)
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_counters(mut self, likes: u32, dislikes: u32) -> Self {
        self.likes = Some(likes);
        self.dislikes = Some(dislikes);
        self
    }
}


/// Generic error type used to uniformize errors across the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("You must be logged in to rate or comment on photos")]
    MissingIdentity,
    #[error("The \"{0}\" field is required")]
    MissingField(&'static str),
    #[error("Unknown photo {0}")]
    UnknownPhoto(i64),
    #[error("file error for \"{}\" : {}", .1.display(), .0)]
    FileError(io::Error, PathBuf),
    #[error("parser error : {0}")]
    TomlParserError(#[from] toml::de::Error),
    #[error("database error : {0}")]
    DatabaseError(#[from] rocket_db_pools::sqlx::Error),
}

impl Error {
    /// HTTP status matching this error when it ends a request
    pub fn status(&self) -> Status {
        match self {
            Error::MissingIdentity => Status::Forbidden,
            Error::MissingField(_) => Status::BadRequest,
            Error::UnknownPhoto(_) => Status::NotFound,
            Error::FileError(_, _) | Error::TomlParserError(_) | Error::DatabaseError(_) => Status::InternalServerError,
        }
    }
}

/// Errors returned by route handlers are sent to the client as a JSON status body. Internal
/// errors are logged and their details are not disclosed.
impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let body = if status == Status::InternalServerError {
            error!("{} {} failed : {}", request.method(), request.uri(), self);
            StatusResponse::error("Internal server error")
        } else {
            StatusResponse::error(&self.to_string())
        };
        (status, Json(body)).respond_to(request)
    }
}
