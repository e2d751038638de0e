use actix_session::Session;
use actix_web::{error, web, HttpResponse, Result};
use actix_web::web::{Data, Form, Json, ServiceConfig};
use serde::Deserialize;

use crate::{
    model::*,
    operations::{LoginError, PollOperationsT},
};
use super::{redirect, INDEX_PATH};
use super::session::{log_in, log_out, take_messages};

pub const LOGIN_PATH: &str = "/accounts/login/";
pub const LOGOUT_PATH: &str = "/accounts/logout/";

const BAD_CREDENTIALS: &str = "Please enter a correct username and password.";

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

async fn login_page_handler(session: Session) -> Json<LoginPage> {
    Json(LoginPage {
        username: None,
        error_message: None,
        messages: take_messages(&session),
    })
}

async fn login_handler<A: 'static + PollOperationsT>(
    ops: Data<A>,
    session: Session,
    body: Form<LoginForm>) -> Result<HttpResponse>
{
    let Form(form) = body;
    match ops.login(&form.username, &form.password).await {
        Ok(user) => {
            log_in(&session, &user)?;
            info!("user {} logged in", user.id);
            Ok(redirect(INDEX_PATH))
        },
        Err(LoginError::BadCredentials) => Ok(HttpResponse::Ok().json(LoginPage {
            username: Some(form.username),
            error_message: Some(BAD_CREDENTIALS.to_owned()),
            messages: take_messages(&session),
        })),
        Err(LoginError::Unexpected) => Err(error::ErrorInternalServerError("Failed to log in")),
    }
}

async fn logout_handler(identity: Identity, session: Session) -> HttpResponse {
    if let Identity::User(user) = identity {
        info!("user {} logged out", user.id);
    }
    log_out(&session);
    redirect(LOGIN_PATH)
}

pub fn config<A: 'static + PollOperationsT>(cfg: &mut ServiceConfig) {
    cfg.route(LOGIN_PATH, web::get().to(login_page_handler))
        .route(LOGIN_PATH, web::post().to(login_handler::<A>))
        .route(LOGOUT_PATH, web::get().to(logout_handler))
    ;
}
