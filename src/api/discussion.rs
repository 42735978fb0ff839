use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tower_sessions::Session;

use crate::{
    discussion::{
        self, Comment, NewComment, NewPost, Post, ReactionRequest, ReactionToggle,
    },
    error::Result,
    group,
    state::AppState,
};

use super::current_user;

#[utoipa::path(
    path = "/api/groups/{id}/discussion/",
    method(get),
    tag = "discussion",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Posts, newest first, with comments and reactions", body = Vec<Post>),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Post>>> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let posts = discussion::list_posts(&state.database, group.id).await?;
    Ok(Json(posts))
}

#[utoipa::path(
    path = "/api/groups/{id}/discussion/",
    method(post),
    tag = "discussion",
    params(("id" = i64, Path, description = "Group id")),
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Blank content or chapter outside the book")
    )
)]
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
    Json(req): Json<NewPost>,
) -> Result<(StatusCode, Json<Post>)> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let post = discussion::create_post(&state.database, user_id, &group, req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[utoipa::path(
    path = "/api/posts/{id}/comments/",
    method(post),
    tag = "discussion",
    params(("id" = i64, Path, description = "Post id")),
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 403, description = "Not a member of the post's group"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
    Json(req): Json<NewComment>,
) -> Result<(StatusCode, Json<Comment>)> {
    let user_id = current_user(&session).await?;
    let comment = discussion::add_comment(&state.database, user_id, id, req).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    path = "/api/posts/{id}/reactions/",
    method(post),
    tag = "discussion",
    params(("id" = i64, Path, description = "Post id")),
    request_body = ReactionRequest,
    responses(
        (status = 200, description = "Reaction added or removed", body = ReactionToggle),
        (status = 400, description = "Missing or too long emoji"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn toggle_reaction(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<ReactionToggle>> {
    let user_id = current_user(&session).await?;
    let toggle =
        discussion::toggle_reaction(&state.database, user_id, id, req.emoji.as_deref()).await?;
    Ok(Json(toggle))
}

pub fn get_discussion_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/groups/{id}/discussion/", get(list_posts).post(create_post))
        .route("/posts/{id}/comments/", post(add_comment))
        .route("/posts/{id}/reactions/", post(toggle_reaction))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        api::tests::TestClient,
        book::{self, tests::new_book},
    };

    #[tokio::test]
    async fn test_discussion_thread() {
        let mut ann = TestClient::new().await;
        let book_id = book::create_book(&ann.state.database, &new_book("Emma", 300, 2))
            .await
            .unwrap();
        ann.sign_up("ann").await;
        let (_, group) = ann
            .post(
                "/api/groups/",
                json!({"name": "Highbury", "book": book_id, "start_date": "2024-03-01", "end_date": "2024-03-31"}),
            )
            .await;
        let uri = format!("/api/groups/{}/discussion/", group["id"]);

        let (status, post) = ann.post(&uri, json!({"content": "Is Emma likeable?"})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(post["author_name"], "ann");
        assert_eq!(post["chapter"], json!(null));

        let (status, body) = ann.post(&uri, json!({"content": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["content"][0], "This field may not be blank.");

        let mut bob = ann.fork();
        bob.sign_up("bob").await;
        let comments = format!("/api/posts/{}/comments/", post["id"]);
        let (status, body) = bob.post(&comments, json!({"content": "No"})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Not a member of this group");

        bob.post(&format!("/api/groups/{}/join/", group["id"]), json!({}))
            .await;
        let (status, comment) = bob.post(&comments, json!({"content": "Not at first"})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment["author_name"], "bob");

        let reactions = format!("/api/posts/{}/reactions/", post["id"]);
        let (status, body) = bob.post(&reactions, json!({"emoji": "🤔"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "added");
        assert_eq!(body["reactions"][0]["emoji"], "🤔");
        let (_, body) = bob.post(&reactions, json!({"emoji": "🤔"})).await;
        assert_eq!(body["action"], "removed");
        assert_eq!(body["reactions"], json!([]));
        let (status, body) = bob.post(&reactions, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Emoji is required");

        let (status, posts) = ann.get(&uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(posts.as_array().unwrap().len(), 1);
        assert_eq!(posts[0]["comments"][0]["content"], "Not at first");

        let (status, body) = ann.post("/api/posts/999/comments/", json!({"content": "hi"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Post not found");
    }
}
