use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{Error, Result},
    state::AppState,
    user::{self, UserInfo},
};

use super::{Message, USER_ID_KEY, current_user};

#[derive(Deserialize, ToSchema)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    fn required(self) -> Result<(String, String)> {
        match (self.username, self.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Ok((username, password))
            }
            _ => Err(Error::bad_request("Username and password required")),
        }
    }
}

#[utoipa::path(
    path = "/api/auth/register/",
    method(post),
    tag = "auth",
    request_body = Credentials,
    responses(
        (status = 201, description = "User created", body = Message),
        (status = 400, description = "Missing fields, taken username or weak password")
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<Message>)> {
    let (username, password) = req.required()?;
    user::create_user(&state.database, &username, &password).await?;
    Ok((
        StatusCode::CREATED,
        Json(Message::new("User created successfully. Please log in.")),
    ))
}

#[utoipa::path(
    path = "/api/auth/login/",
    method(post),
    tag = "auth",
    request_body = Credentials,
    responses(
        (status = 200, description = "Logged in", body = UserInfo),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<Credentials>,
) -> Result<Json<UserInfo>> {
    let username = req.username.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    let user = user::login(&state.database, &username, &password).await?;
    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user.id).await?;
    info!("user {} logged in", user.username);
    Ok(Json(user))
}

#[utoipa::path(
    path = "/api/auth/logout/",
    method(post),
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = Message),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn logout(session: Session) -> Result<Json<Message>> {
    current_user(&session).await?;
    session.flush().await?;
    Ok(Json(Message::new("Logged out")))
}

#[utoipa::path(
    path = "/api/auth/user/",
    method(get),
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn user_info(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<UserInfo>> {
    let user_id = current_user(&session).await?;
    let user = user::get_user(&state.database, user_id).await?;
    Ok(Json(user))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UsernameQuery {
    pub username: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}

#[utoipa::path(
    path = "/api/check-username/",
    method(get),
    tag = "auth",
    params(UsernameQuery),
    responses(
        (status = 200, description = "Whether the username is free", body = UsernameAvailability),
        (status = 400, description = "Missing username parameter")
    )
)]
pub async fn check_username(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<UsernameAvailability>> {
    let username = query
        .username
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::bad_request("Username parameter required"))?;
    let available = user::username_available(&state.database, &username).await?;
    Ok(Json(UsernameAvailability {
        username,
        available,
    }))
}

pub fn get_auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest(
            "/auth",
            Router::new()
                .route("/register/", post(register))
                .route("/login/", post(login))
                .route("/logout/", post(logout))
                .route("/user/", get(user_info)),
        )
        .route("/check-username/", get(check_username))
}
