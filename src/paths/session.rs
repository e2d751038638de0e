use std::future::{ready, Ready};

use actix_session::{Session, SessionExt};
use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};

use crate::model::*;

const USER_KEY: &str = "user";
const FLASH_KEY: &str = "_messages";

/// The logged-in user, read from the cookie session. Never fails: a missing
/// or unreadable session is an anonymous visitor.
impl FromRequest for Identity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let identity = match req.get_session().get::<User>(USER_KEY) {
            Ok(Some(user)) => Identity::User(user),
            Ok(None) => Identity::Anonymous,
            Err(e) => {
                warn!("Failed to read user from session: {}", e);
                Identity::Anonymous
            }
        };
        ready(Ok(identity))
    }
}

/// Starts a fresh session for `user`.
pub fn log_in(session: &Session, user: &User) -> Result<(), Error> {
    session.renew();
    session.insert(USER_KEY, user)?;
    Ok(())
}

pub fn log_out(session: &Session) {
    session.purge();
}

/// Queues a message for the next page the visitor sees.
pub fn flash(session: &Session, level: Level, text: &str) {
    let mut messages = peek_messages(session);
    messages.push(FlashMessage {
        level,
        text: text.to_owned(),
    });
    if let Err(e) = session.insert(FLASH_KEY, messages) {
        error!("Failed to store flash message [{}]: {}", text, e);
    }
}

/// Removes and returns all queued messages.
pub fn take_messages(session: &Session) -> Vec<FlashMessage> {
    let messages = peek_messages(session);
    session.remove(FLASH_KEY);
    messages
}

fn peek_messages(session: &Session) -> Vec<FlashMessage> {
    session.get::<Vec<FlashMessage>>(FLASH_KEY)
        .unwrap_or_else(|e| {
            warn!("Dropping unreadable flash messages: {}", e);
            None
        })
        .unwrap_or_default()
}
