use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, State},
    http::StatusCode,
    routing::get,
};
use tower_sessions::Session;

use crate::{
    error::Result,
    group,
    progress::{self, ProgressUpdate, ReadingProgress, stats::StatsReport},
    state::AppState,
    utils::today,
};

use super::current_user;

#[utoipa::path(
    path = "/api/groups/{id}/progress/",
    method(get),
    tag = "progress",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Caller's progress, created on first access", body = ReadingProgress),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<ReadingProgress>> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let progress = progress::get_or_create_progress(&state.database, user_id, &group).await?;
    Ok(Json(progress))
}

#[utoipa::path(
    path = "/api/groups/{id}/progress/",
    method(post),
    tag = "progress",
    params(("id" = i64, Path, description = "Group id")),
    request_body = ProgressUpdate,
    responses(
        (status = 201, description = "Progress created", body = ReadingProgress),
        (status = 200, description = "Existing progress updated", body = ReadingProgress),
        (status = 400, description = "Invalid field")
    )
)]
pub async fn setup_progress(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
    Json(update): Json<ProgressUpdate>,
) -> Result<(StatusCode, Json<ReadingProgress>)> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let (progress, created) =
        progress::setup_progress(&state.database, user_id, &group, update).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(progress)))
}

#[utoipa::path(
    path = "/api/groups/{id}/progress/",
    method(put),
    tag = "progress",
    params(("id" = i64, Path, description = "Group id")),
    request_body = ProgressUpdate,
    responses(
        (status = 200, description = "Progress updated", body = ReadingProgress),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "No progress yet")
    )
)]
pub async fn update_progress(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<ReadingProgress>> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let progress = progress::update_progress(&state.database, user_id, &group, update).await?;
    Ok(Json(progress))
}

#[utoipa::path(
    path = "/api/reading-progress/",
    method(get),
    tag = "progress",
    responses(
        (status = 200, description = "All of the caller's progress", body = Vec<ReadingProgress>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_progress(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<ReadingProgress>>> {
    let user_id = current_user(&session).await?;
    let list = progress::list_user_progress(&state.database, user_id).await?;
    Ok(Json(list))
}

#[utoipa::path(
    path = "/api/groups/{id}/progress-stats/",
    method(get),
    tag = "progress",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Members classified against today's expected progress", body = StatsReport),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn progress_stats(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<StatsReport>> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let report = progress::group_progress_stats(&state.database, &group, today()).await?;
    Ok(Json(report))
}

pub fn get_progress_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/groups/{id}/progress/",
            get(get_progress).post(setup_progress).put(update_progress),
        )
        .route("/groups/{id}/progress-stats/", get(progress_stats))
        .route("/reading-progress/", get(list_progress))
}
