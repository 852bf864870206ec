use crate::Error;
use std::{fs, io::ErrorKind, path::Path, path::PathBuf};
use rocket::figment::Figment;
use serde::{Deserialize, Serialize};


/// Name of the main config file in the app's folder
pub const FILENAME: &'static str = "photorate.config";

/// Name of the environment variable that overrides the PORT setting
pub const PORT_ENV_VAR: &'static str = "PORT";


/// The app's config
#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// IP address to serve on.
    /// Default : 0.0.0.0
    #[serde(default="config_default_address")]
    pub ADDRESS: String,

    /// Port to serve on. Overridden by the `PORT` environment variable when it is set.
    /// Default : 5000
    #[serde(default="config_default_port")]
    pub PORT: u16,

    /// Title displayed in the page title and at the top of the gallery.
    #[serde(default="config_default_title")]
    pub TITLE: String,

    /// Path to the photos directory, default is `static/images/` in the app's folder.
    /// Every file found in it is added to the catalog at startup. Write access is only
    /// required if the directory doesn't exist yet.
    #[serde(default="config_default_photos_dir")]
    pub PHOTOS_DIR: String,

    /// Path to the SQLite database file.
    /// Default : "likes.db" in the app's folder
    #[serde(default="config_default_database_path")]
    pub DATABASE_PATH: String,

    /// If enabled, comments are listed under each photo in the gallery.
    /// Default : true
    #[serde(default="config_default_true")]
    pub SHOW_COMMENTS: bool,

    /// Key used to encrypt and sign the session cookie, as a base64 or hex string of 256 bits.
    /// Leave empty to let Rocket decide (a random key in debug builds, launch refused in release).
    #[serde(default)]
    pub SECRET_KEY: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ADDRESS: config_default_address(),
            PORT: config_default_port(),
            TITLE: config_default_title(),
            PHOTOS_DIR: config_default_photos_dir(),
            DATABASE_PATH: config_default_database_path(),
            SHOW_COMMENTS: config_default_true(),
            SECRET_KEY: String::new(),
        }
    }
}

impl Config {

    /// Deserialize a TOML string into a Config struct
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }

    /// Read the config file at the given location and deserialize it into a Config struct.
    /// A missing file is not an error : the default config is returned instead.
    pub fn read_from<P>(path: P) -> Result<Self, Error>
        where P: AsRef<Path>
    {
        match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(Error::FileError(error, PathBuf::from(path.as_ref()))),
        }
    }

    /// Try to read and parse the main config file, and apply the environment overrides.
    /// In case of error, print it to stderr and exit with a status code of -1
    pub fn read_or_exit() -> Self {
        // Rocket's logger is not initialized yet at this point, so errors go to stderr
        let mut config = Self::read_from(FILENAME)
            .unwrap_or_else(|e| match e {
                Error::FileError(error, path) => {
                    eprintln!("Error, unable to open the config file \"{}\" : {}", path.display(), error);
                    std::process::exit(-1);
                }
                Error::TomlParserError(error) => {
                    eprintln!("Error, unable to parse the config file \"{}\" : {}", FILENAME, error);
                    std::process::exit(-1);
                }
                _ => std::process::exit(-1),
            });
        if let Some(warning) = config.override_port(std::env::var(PORT_ENV_VAR).ok().as_deref()) {
            eprintln!("Warning : {}", warning);
        }
        config
    }

    /// Replace the configured port with the given value, if any. Returns a warning message
    /// when the value is not a valid port number, in which case the config is left untouched.
    pub fn override_port(&mut self, value: Option<&str>) -> Option<String> {
        let value = value?.trim();
        match value.parse::<u16>() {
            Ok(port) => {
                self.PORT = port;
                None
            }
            Err(error) => Some(format!(
                "ignoring invalid {} environment variable \"{}\" : {}", PORT_ENV_VAR, value, error
            )),
        }
    }

    /// Map this config onto Rocket's own configuration provider
    pub fn figment(&self) -> Figment {
        let figment = rocket::Config::figment()
            .merge(("address", &self.ADDRESS))
            .merge(("port", self.PORT))
            .merge((format!("databases.{}.url", crate::db::DATABASE_NAME), &self.DATABASE_PATH));
        if self.SECRET_KEY.is_empty() {
            figment
        } else {
            figment.merge(("secret_key", &self.SECRET_KEY))
        }
    }

}


// Default values for config keys

fn config_default_address() -> String {
    "0.0.0.0".to_string()
}

fn config_default_port() -> u16 {
    5000
}

fn config_default_title() -> String {
    "Photo Gallery".to_string()
}

fn config_default_photos_dir() -> String {
    "static/images".to_string()
}

fn config_default_database_path() -> String {
    "likes.db".to_string()
}

fn config_default_true() -> bool {
    true
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.PORT, 5000);
        assert_eq!(config.ADDRESS, "0.0.0.0");
        assert_eq!(config.PHOTOS_DIR, "static/images");
        assert_eq!(config.DATABASE_PATH, "likes.db");
        assert!(config.SHOW_COMMENTS);
        assert!(config.SECRET_KEY.is_empty());
    }

    #[test]
    fn keys_override_defaults() {
        let config = Config::from_toml(r#"
            PORT = 8080
            TITLE = "Holidays"
            SHOW_COMMENTS = false
        "#).unwrap();
        assert_eq!(config.PORT, 8080);
        assert_eq!(config.TITLE, "Holidays");
        assert!(!config.SHOW_COMMENTS);
        assert_eq!(config.DATABASE_PATH, "likes.db");
    }

    #[test]
    fn invalid_toml_is_a_parser_error() {
        let result = Config::from_toml("PORT = \"not a number\"");
        assert!(matches!(result, Err(Error::TomlParserError(_))));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::read_from("this/file/does/not/exist.config").unwrap();
        assert_eq!(config.PORT, 5000);
    }

    #[test]
    fn port_override() {
        let mut config = Config::default();
        assert!(config.override_port(None).is_none());
        assert_eq!(config.PORT, 5000);

        assert!(config.override_port(Some("8123")).is_none());
        assert_eq!(config.PORT, 8123);

        assert!(config.override_port(Some("http")).is_some());
        assert_eq!(config.PORT, 8123);
    }

    #[test]
    fn figment_carries_database_url() {
        let config = Config {
            DATABASE_PATH: "/tmp/ratings.sqlite".to_string(),
            ..Config::default()
        };
        let url: String = config.figment().extract_inner("databases.photorate.url").unwrap();
        assert_eq!(url, "/tmp/ratings.sqlite");
        let port: u16 = config.figment().extract_inner("port").unwrap();
        assert_eq!(port, 5000);
    }
}
