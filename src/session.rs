use crate::Error;
use rocket::{
    http::{Cookie, CookieJar, Status},
    request::{self, FromRequest},
};

/// Name of the private cookie holding the email of the logged in user
pub const COOKIE_NAME: &'static str = "photorate_email";

/// The user a request is made on behalf of, used as a request guard.
///
/// The email is read from a private cookie, which Rocket encrypts and authenticates with the
/// app's secret key : a client cannot forge or alter it. The guard fails with a 403 status
/// when the cookie is absent, invalid or empty, so routes that take an `Identity` never run
/// for anonymous users. Use `Option<Identity>` for routes open to everyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    email: String,
}

impl Identity {
    /// Associate the given email with the client's session and return the new identity,
    /// or None if the email is blank
    pub fn login(cookies: &CookieJar<'_>, email: &str) -> Option<Self> {
        let email = email.trim();
        if email.is_empty() {
            return None;
        }
        cookies.add_private(Cookie::build((COOKIE_NAME, email.to_string())));
        Some(Self { email: email.to_string() })
    }

    /// Forget the identity associated with the client's session
    pub fn logout(cookies: &CookieJar<'_>) {
        cookies.remove_private(COOKIE_NAME);
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = Error;

    async fn from_request(request: &'r rocket::Request<'_>) -> request::Outcome<Self, Self::Error> {
        match request.cookies().get_private(COOKIE_NAME) {
            Some(cookie) if !cookie.value().trim().is_empty() => {
                request::Outcome::Success(Identity { email: cookie.value().trim().to_string() })
            }
            _ => request::Outcome::Error((Status::Forbidden, Error::MissingIdentity)),
        }
    }
}
