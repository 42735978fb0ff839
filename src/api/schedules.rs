use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, put},
};
use tower_sessions::Session;

use crate::{
    error::Result,
    group,
    schedule::{self, ChapterSchedule, ScheduleBatch, ScheduleBatchRequest, ScheduleUpdate},
    state::AppState,
};

use super::current_user;

#[utoipa::path(
    path = "/api/groups/{id}/chapter-schedules/",
    method(get),
    tag = "schedules",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Caller's schedules by chapter number", body = Vec<ChapterSchedule>),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ChapterSchedule>>> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let schedules = schedule::list_schedules(&state.database, user_id, group.id).await?;
    Ok(Json(schedules))
}

#[utoipa::path(
    path = "/api/groups/{id}/chapter-schedules/",
    method(post),
    tag = "schedules",
    params(("id" = i64, Path, description = "Group id")),
    request_body = ScheduleBatchRequest,
    responses(
        (status = 201, description = "At least one schedule saved", body = ScheduleBatch),
        (status = 400, description = "Nothing saved, see errors", body = ScheduleBatch)
    )
)]
pub async fn upsert_schedules(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
    Json(req): Json<ScheduleBatchRequest>,
) -> Result<(StatusCode, Json<ScheduleBatch>)> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let batch = schedule::upsert_schedules(&state.database, user_id, &group, &req.schedules).await?;
    let status = if batch.created > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(batch)))
}

#[utoipa::path(
    path = "/api/groups/{id}/chapter-schedules/{schedule_id}/",
    method(put),
    tag = "schedules",
    params(
        ("id" = i64, Path, description = "Group id"),
        ("schedule_id" = i64, Path, description = "Schedule id")
    ),
    request_body = ScheduleUpdate,
    responses(
        (status = 200, description = "Schedule updated", body = ChapterSchedule),
        (status = 400, description = "Date outside the group window"),
        (status = 404, description = "Schedule not found")
    )
)]
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((id, schedule_id)): Path<(i64, i64)>,
    Json(update): Json<ScheduleUpdate>,
) -> Result<Json<ChapterSchedule>> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let schedule =
        schedule::update_schedule(&state.database, user_id, &group, schedule_id, update).await?;
    Ok(Json(schedule))
}

#[utoipa::path(
    path = "/api/groups/{id}/chapter-schedules/{schedule_id}/",
    method(delete),
    tag = "schedules",
    params(
        ("id" = i64, Path, description = "Group id"),
        ("schedule_id" = i64, Path, description = "Schedule id")
    ),
    responses(
        (status = 204, description = "Schedule deleted"),
        (status = 404, description = "Schedule not found")
    )
)]
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((id, schedule_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    schedule::delete_schedule(&state.database, user_id, &group, schedule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn get_schedules_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/groups/{id}/chapter-schedules/",
            get(list_schedules).post(upsert_schedules),
        )
        .route(
            "/groups/{id}/chapter-schedules/{schedule_id}/",
            put(update_schedule).delete(delete_schedule),
        )
}
