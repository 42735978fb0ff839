pub mod auth;
pub mod books;
pub mod discussion;
pub mod groups;
pub mod progress;
pub mod schedules;

use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tower_sessions::Session;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::{Error, Result},
    state::AppState,
};

/// Session key holding the logged-in user's id.
pub const USER_ID_KEY: &str = "user_id";

/// The logged-in user's id, `Unauthorized` without a session.
pub async fn current_user(session: &Session) -> Result<i64> {
    session
        .get::<i64>(USER_ID_KEY)
        .await?
        .ok_or(Error::Unauthorized)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::logout,
        auth::user_info,
        auth::check_username,
        books::list_books,
        books::book_detail,
        books::group_chapters,
        groups::list_groups,
        groups::create_group,
        groups::group_detail,
        groups::join_group,
        groups::leave_group,
        progress::get_progress,
        progress::setup_progress,
        progress::update_progress,
        progress::list_progress,
        progress::progress_stats,
        schedules::list_schedules,
        schedules::upsert_schedules,
        schedules::update_schedule,
        schedules::delete_schedule,
        discussion::list_posts,
        discussion::create_post,
        discussion::add_comment,
        discussion::toggle_reaction,
    ),
    tags(
        (name = "auth", description = "Registration and sessions"),
        (name = "books", description = "Book catalogue"),
        (name = "groups", description = "Reading groups and membership"),
        (name = "progress", description = "Reading progress and group pacing"),
        (name = "schedules", description = "Personal chapter schedules"),
        (name = "discussion", description = "Group discussion threads"),
    )
)]
pub struct ApiDoc;

pub fn get_api_router() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            .merge(auth::get_auth_router())
            .merge(books::get_books_router())
            .merge(groups::get_groups_router())
            .merge(progress::get_progress_router())
            .merge(schedules::get_schedules_router())
            .merge(discussion::get_discussion_router()),
    )
}

/// The application router without the session layer, which the caller adds
/// with the store of its choice.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(get_api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    use super::*;
    use crate::{config::Config, database::connect_in_memory};

    /// An in-memory app that remembers the session cookie between requests,
    /// like a browser would.
    pub(crate) struct TestClient {
        pub app: Router,
        pub state: Arc<AppState>,
        cookie: Option<String>,
    }

    impl TestClient {
        pub async fn new() -> Self {
            let database = connect_in_memory().await.unwrap();
            let state = Arc::new(AppState::new(database, Config::default()));
            Self::with_state(state)
        }

        pub fn with_state(state: Arc<AppState>) -> Self {
            let app = app(state.clone()).layer(SessionManagerLayer::new(MemoryStore::default()));
            Self {
                app,
                state,
                cookie: None,
            }
        }

        /// Another client on the same database with its own cookie jar.
        pub fn fork(&self) -> Self {
            Self::with_state(self.state.clone())
        }

        pub async fn request(
            &mut self,
            method: &str,
            uri: &str,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(cookie) = &self.cookie {
                builder = builder.header(header::COOKIE, cookie);
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.app.clone().oneshot(request).await.unwrap();
            if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
                let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
                self.cookie = Some(pair.to_string());
            }
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }

        pub async fn get(&mut self, uri: &str) -> (StatusCode, Value) {
            self.request("GET", uri, None).await
        }

        pub async fn post(&mut self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.request("POST", uri, Some(body)).await
        }

        pub async fn put(&mut self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.request("PUT", uri, Some(body)).await
        }

        pub async fn delete(&mut self, uri: &str) -> (StatusCode, Value) {
            self.request("DELETE", uri, None).await
        }

        /// Registers and logs in.
        pub async fn sign_up(&mut self, username: &str) -> i64 {
            let credentials = serde_json::json!({"username": username, "password": "Reader9x"});
            let (status, _) = self.post("/api/auth/register/", credentials.clone()).await;
            assert_eq!(status, StatusCode::CREATED);
            let (status, user) = self.post("/api/auth/login/", credentials).await;
            assert_eq!(status, StatusCode::OK);
            user["id"].as_i64().unwrap()
        }
    }

    #[tokio::test]
    async fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/groups/{id}/progress-stats/"));
        assert!(doc.paths.paths.contains_key("/api/groups/{id}/chapter-schedules/"));
    }

    #[tokio::test]
    async fn test_requires_session() {
        let mut client = TestClient::new().await;
        let (status, body) = client.get("/api/groups/").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication credentials were not provided");
    }
}
