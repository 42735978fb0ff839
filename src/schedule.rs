//! Personal chapter schedules: one target date per (user, group, chapter),
//! always inside the group's reading window.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use time::{Date, OffsetDateTime};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{
    book::{self, Chapter},
    error::{Error, Result},
    group::Group,
    utils::{format_date, iso_date, now_utc, parse_date},
};

/// Inclusive `[start, end]` date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Date,
    pub end: Date,
}

impl DateWindow {
    pub fn of(group: &Group) -> Self {
        Self {
            start: group.start_date,
            end: group.end_date,
        }
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn out_of_window_message(&self) -> String {
        format!(
            "Date must be between {} and {}",
            format_date(self.start),
            format_date(self.end)
        )
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ChapterSchedule {
    pub id: i64,
    #[serde(rename = "user")]
    pub user_id: i64,
    #[serde(rename = "group")]
    pub group_id: i64,
    #[serde(rename = "chapter")]
    pub chapter_id: i64,
    pub chapter_number: i64,
    pub chapter_title: String,
    #[serde(with = "iso_date")]
    pub target_completion_date: Date,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One entry of a bulk submission. Fields are optional so a bad entry is
/// reported instead of rejecting the whole batch.
#[derive(Debug, Clone, Default, ToSchema)]
pub struct ScheduleItem {
    /// Chapter id, a number or a numeric string
    pub chapter: Option<i64>,
    /// `YYYY-MM-DD`
    pub target_completion_date: Option<String>,
}

impl ScheduleItem {
    /// Reads an item from arbitrary JSON. Values of the wrong shape become
    /// `None` (or an unparseable date) and are rejected per item later.
    pub fn from_json(value: &Value) -> Self {
        let chapter = match value.get("chapter") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let target_completion_date = match value.get("target_completion_date") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
            _ => None,
        };
        Self {
            chapter,
            target_completion_date,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ScheduleBatchRequest {
    #[serde(default, deserialize_with = "lenient_items")]
    pub schedules: Vec<ScheduleItem>,
}

fn lenient_items<'de, D>(de: D) -> std::result::Result<Vec<ScheduleItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(de)?.unwrap_or_default();
    Ok(values.iter().map(ScheduleItem::from_json).collect())
}

/// Outcome of a bulk upsert: the saved schedules and one message per rejected item.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduleBatch {
    pub created: usize,
    pub schedules: Vec<ChapterSchedule>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ScheduleUpdate {
    pub target_completion_date: Option<String>,
    pub completed: Option<bool>,
}

const SCHEDULE_SELECT: &str = "select s.id, s.user_id, s.group_id, s.chapter_id,
    c.chapter_number, c.title as chapter_title, s.target_completion_date,
    s.completed, s.completed_at, s.created_at, s.updated_at
    from chapter_schedule s
    join chapter c on c.id = s.chapter_id";

pub async fn list_schedules(
    database: &SqlitePool,
    user_id: i64,
    group_id: i64,
) -> Result<Vec<ChapterSchedule>> {
    let sql = format!(
        "{SCHEDULE_SELECT} where s.user_id = ? and s.group_id = ? order by c.chapter_number"
    );
    let schedules = sqlx::query_as::<_, ChapterSchedule>(&sql)
        .bind(user_id)
        .bind(group_id)
        .fetch_all(database)
        .await?;
    Ok(schedules)
}

async fn find_schedule(
    database: &SqlitePool,
    schedule_id: i64,
    user_id: i64,
    group_id: i64,
) -> Result<ChapterSchedule> {
    let sql = format!("{SCHEDULE_SELECT} where s.id = ? and s.user_id = ? and s.group_id = ?");
    sqlx::query_as::<_, ChapterSchedule>(&sql)
        .bind(schedule_id)
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("Schedule"))
}

/// Validates an item, returning the chapter and date to save or the
/// message explaining why it was rejected.
async fn validate_item(
    database: &SqlitePool,
    group: &Group,
    item: &ScheduleItem,
) -> Result<std::result::Result<(Chapter, Date), String>> {
    let chapter_id = item.chapter.filter(|&id| id != 0);
    let raw_date = item
        .target_completion_date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let (Some(chapter_id), Some(raw_date)) = (chapter_id, raw_date) else {
        return Ok(Err("Missing chapter or date in schedule".to_string()));
    };
    let Some(chapter) = book::find_chapter(database, group.book_id, chapter_id).await? else {
        return Ok(Err(format!("Chapter {} not found", chapter_id)));
    };
    let Some(date) = parse_date(raw_date) else {
        return Ok(Err(format!(
            "Chapter {}: Invalid date '{}', expected YYYY-MM-DD",
            chapter.chapter_number, raw_date
        )));
    };
    let window = DateWindow::of(group);
    if !window.contains(date) {
        return Ok(Err(format!(
            "Chapter {}: {}",
            chapter.chapter_number,
            window.out_of_window_message()
        )));
    }
    Ok(Ok((chapter, date)))
}

/// Validates and saves one item, the error is the message reported for it.
async fn save_item(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
    item: &ScheduleItem,
) -> std::result::Result<ChapterSchedule, String> {
    let (chapter, date) = match validate_item(database, group, item).await {
        Ok(valid) => valid?,
        Err(e) => {
            error!("schedule lookup failed in group {}: {}", group.id, e);
            return Err("Could not save schedule".to_string());
        }
    };
    let saved: Result<ChapterSchedule> = async {
        let id = upsert_schedule(database, user_id, group.id, chapter.id, date).await?;
        find_schedule(database, id, user_id, group.id).await
    }
    .await;
    saved.map_err(|e| {
        error!(
            "user {} schedule for chapter {} failed in group {}: {}",
            user_id, chapter.id, group.id, e
        );
        format!("Chapter {}: Could not save schedule", chapter.chapter_number)
    })
}

/// Creates or moves the (user, group, chapter) schedule in one statement.
async fn upsert_schedule(
    database: &SqlitePool,
    user_id: i64,
    group_id: i64,
    chapter_id: i64,
    date: Date,
) -> Result<i64> {
    let now = now_utc();
    let id = sqlx::query_scalar(
        "insert into chapter_schedule
        (user_id, group_id, chapter_id, target_completion_date, completed, created_at, updated_at)
        values (?, ?, ?, ?, 0, ?, ?)
        on conflict (user_id, group_id, chapter_id) do update set
            target_completion_date = excluded.target_completion_date,
            updated_at = excluded.updated_at
        returning id",
    )
    .bind(user_id)
    .bind(group_id)
    .bind(chapter_id)
    .bind(date)
    .bind(now)
    .bind(now)
    .fetch_one(database)
    .await?;
    Ok(id)
}

/// Saves every valid item independently; invalid ones are reported in `errors`
/// and never abort the rest of the batch. Each item is its own statement, so a
/// database failure on one item is reported in `errors` as well while the
/// items saved before it stay saved.
pub async fn upsert_schedules(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
    items: &[ScheduleItem],
) -> Result<ScheduleBatch> {
    if items.is_empty() {
        return Err(Error::bad_request("No schedules provided"));
    }
    let mut schedules = Vec::new();
    let mut errors = Vec::new();
    for item in items {
        match save_item(database, user_id, group, item).await {
            Ok(schedule) => schedules.push(schedule),
            Err(message) => {
                warn!("user {} schedule rejected in group {}: {}", user_id, group.id, message);
                errors.push(message);
            }
        }
    }
    info!(
        "user {} saved {} schedules in group {}, {} rejected",
        user_id,
        schedules.len(),
        group.id,
        errors.len()
    );
    Ok(ScheduleBatch {
        created: schedules.len(),
        schedules,
        errors,
    })
}

/// Moves the target date and/or toggles completion of one schedule.
pub async fn update_schedule(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
    schedule_id: i64,
    update: ScheduleUpdate,
) -> Result<ChapterSchedule> {
    let schedule = find_schedule(database, schedule_id, user_id, group.id).await?;
    let mut target_completion_date = schedule.target_completion_date;
    if let Some(raw) = update
        .target_completion_date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let date = parse_date(raw).ok_or_else(|| {
            Error::bad_request(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
        })?;
        let window = DateWindow::of(group);
        if !window.contains(date) {
            return Err(Error::bad_request(window.out_of_window_message()));
        }
        target_completion_date = date;
    }
    let now = now_utc();
    let (completed, completed_at) = match update.completed {
        Some(true) => (true, Some(now)),
        Some(false) => (false, None),
        None => (schedule.completed, schedule.completed_at),
    };
    sqlx::query(
        "update chapter_schedule set target_completion_date = ?, completed = ?, completed_at = ?, updated_at = ?
        where id = ?",
    )
    .bind(target_completion_date)
    .bind(completed)
    .bind(completed_at)
    .bind(now)
    .bind(schedule.id)
    .execute(database)
    .await?;
    find_schedule(database, schedule.id, user_id, group.id).await
}

pub async fn delete_schedule(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
    schedule_id: i64,
) -> Result<()> {
    let schedule = find_schedule(database, schedule_id, user_id, group.id).await?;
    sqlx::query("delete from chapter_schedule where id = ?")
        .bind(schedule.id)
        .execute(database)
        .await?;
    Ok(())
}
