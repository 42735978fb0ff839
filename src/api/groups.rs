use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tower_sessions::Session;

use crate::{
    error::Result,
    group::{self, Group, GroupDetail, NewGroup},
    state::AppState,
};

use super::{Message, current_user};

#[utoipa::path(
    path = "/api/groups/",
    method(get),
    tag = "groups",
    responses(
        (status = 200, description = "Groups the caller belongs to", body = Vec<Group>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<Group>>> {
    let user_id = current_user(&session).await?;
    let groups = group::list_user_groups(&state.database, user_id).await?;
    Ok(Json(groups))
}

#[utoipa::path(
    path = "/api/groups/",
    method(post),
    tag = "groups",
    request_body = NewGroup,
    responses(
        (status = 201, description = "Group created, creator joined", body = Group),
        (status = 400, description = "Blank name, unknown book or inverted dates")
    )
)]
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<NewGroup>,
) -> Result<(StatusCode, Json<Group>)> {
    let user_id = current_user(&session).await?;
    let group = group::create_group(&state.database, user_id, req).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    path = "/api/groups/{id}/",
    method(get),
    tag = "groups",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group with members and book", body = GroupDetail),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn group_detail(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<GroupDetail>> {
    let user_id = current_user(&session).await?;
    let detail = group::get_group_detail(&state.database, id, user_id).await?;
    Ok(Json(detail))
}

#[utoipa::path(
    path = "/api/groups/{id}/join/",
    method(post, delete),
    tag = "groups",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Joined", body = Message),
        (status = 400, description = "Group is full or already a member"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn join_group(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<Message>> {
    let user_id = current_user(&session).await?;
    group::join_group(&state.database, id, user_id).await?;
    Ok(Json(Message::new("Joined group successfully")))
}

#[utoipa::path(
    path = "/api/groups/{id}/leave/",
    method(post, delete),
    tag = "groups",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Left, progress and schedules removed", body = Message),
        (status = 400, description = "Not a member, or creator with other members"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn leave_group(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<Message>> {
    let user_id = current_user(&session).await?;
    group::leave_group(&state.database, id, user_id).await?;
    Ok(Json(Message::new("Left group successfully")))
}

pub fn get_groups_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/groups/", get(list_groups).post(create_group))
        .route("/groups/{id}/", get(group_detail))
        .route("/groups/{id}/join/", post(join_group).delete(join_group))
        .route("/groups/{id}/leave/", post(leave_group).delete(leave_group))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::{api::tests::TestClient, book, book::tests::new_book, group::MAX_GROUP_MEMBERS};

    async fn club() -> (TestClient, Value) {
        let mut ann = TestClient::new().await;
        let book_id = book::create_book(&ann.state.database, &new_book("Dune", 412, 3))
            .await
            .unwrap();
        ann.sign_up("ann").await;
        let (status, group) = ann
            .post(
                "/api/groups/",
                json!({"name": "Spice", "book": book_id, "start_date": "2024-01-01", "end_date": "2024-02-01"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (ann, group)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (mut ann, group) = club().await;
        assert_eq!(group["name"], "Spice");
        assert_eq!(group["creator_name"], "ann");
        assert!(group["creator"].is_i64());
        assert!(group["book"].is_i64());
        assert!(group.get("creator_id").is_none());
        assert_eq!(group["member_count"], 1);
        assert_eq!(group["is_full"], false);
        assert_eq!(group["start_date"], "2024-01-01");

        let (status, groups) = ann.get("/api/groups/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(groups.as_array().unwrap().len(), 1);

        let (status, detail) = ann.get(&format!("/api/groups/{}/", group["id"])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["members"][0]["username"], "ann");
        assert_eq!(detail["book_details"]["title"], "Dune");

        let (status, body) = ann
            .post(
                "/api/groups/",
                json!({"name": "Backwards", "book": group["book"], "start_date": "2024-02-01", "end_date": "2024-01-01"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["non_field_errors"][0], "End date must be after start date.");
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let (mut ann, group) = club().await;
        let join = format!("/api/groups/{}/join/", group["id"]);
        let leave = format!("/api/groups/{}/leave/", group["id"]);

        let mut bob = ann.fork();
        bob.sign_up("bob").await;
        let (status, body) = bob.post(&join, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Joined group successfully");
        let (status, body) = bob.post(&join, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Already a member");

        let (status, _) = ann.post(&leave, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = bob.delete(&leave).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Left group successfully");
        let (status, body) = bob.delete(&leave).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Not a member of this group");

        let (status, _) = bob.post("/api/groups/999/join/", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = bob.get(&format!("/api/groups/{}/", group["id"])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_group_capacity() {
        let (ann, group) = club().await;
        let join = format!("/api/groups/{}/join/", group["id"]);
        for i in 1..MAX_GROUP_MEMBERS {
            let mut member = ann.fork();
            member.sign_up(&format!("reader{}", i)).await;
            let (status, _) = member.post(&join, json!({})).await;
            assert_eq!(status, StatusCode::OK);
        }
        let mut late = ann.fork();
        late.sign_up("latecomer").await;
        let (status, body) = late.post(&join, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Group is full");
    }
}
