pub mod stats;

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::{Date, OffsetDateTime};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    book,
    error::{Error, Result},
    group::Group,
    utils::{iso_date, now_utc, parse_date},
};

use stats::{MemberProgress, ProgressSnapshot, StatsReport, StatsWindow, compute_stats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    InProgress,
    Completed,
}

/// A member's reading position within a group's book.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ReadingProgress {
    pub id: i64,
    #[serde(rename = "user")]
    pub user_id: i64,
    #[serde(rename = "book")]
    pub book_id: i64,
    pub book_title: String,
    #[serde(rename = "group")]
    pub group_id: i64,
    /// Minutes per page, 0 until the reader picks a speed
    pub reading_speed_minutes: i64,
    pub current_page: i64,
    #[serde(rename = "current_chapter")]
    pub current_chapter_id: Option<i64>,
    pub chapter_title: Option<String>,
    #[serde(with = "iso_date::option")]
    pub chapter_deadline: Option<Date>,
    pub chapter_status: ChapterStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub last_read_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Partial update, absent fields are left unchanged and `null` clears the nullable ones.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProgressUpdate {
    pub current_page: Option<i64>,
    pub reading_speed_minutes: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub current_chapter: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub chapter_deadline: Option<Option<String>>,
    pub chapter_status: Option<ChapterStatus>,
}

fn double_option<'de, T, D>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

const PROGRESS_SELECT: &str = "select p.id, p.user_id, p.book_id, b.title as book_title, p.group_id,
    p.reading_speed_minutes, p.current_page, p.current_chapter_id, c.title as chapter_title,
    p.chapter_deadline, p.chapter_status, p.last_read_at, p.created_at
    from reading_progress p
    join book b on b.id = p.book_id
    left join chapter c on c.id = p.current_chapter_id";

async fn find_progress(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
) -> Result<Option<ReadingProgress>> {
    let sql = format!("{PROGRESS_SELECT} where p.user_id = ? and p.book_id = ? and p.group_id = ?");
    let progress = sqlx::query_as::<_, ReadingProgress>(&sql)
        .bind(user_id)
        .bind(group.book_id)
        .bind(group.id)
        .fetch_optional(database)
        .await?;
    Ok(progress)
}

/// Inserts a progress row unless one exists, returns whether it was created.
async fn insert_progress(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
    reading_speed_minutes: i64,
) -> Result<bool> {
    let now = now_utc();
    let result = sqlx::query(
        "insert into reading_progress
        (user_id, book_id, group_id, reading_speed_minutes, current_page, chapter_status, last_read_at, created_at)
        values (?, ?, ?, ?, 1, 'in_progress', ?, ?)
        on conflict (user_id, book_id, group_id) do nothing",
    )
    .bind(user_id)
    .bind(group.book_id)
    .bind(group.id)
    .bind(reading_speed_minutes)
    .bind(now)
    .bind(now)
    .execute(database)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Returns the member's progress, creating it on first access with no speed chosen.
pub async fn get_or_create_progress(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
) -> Result<ReadingProgress> {
    if insert_progress(database, user_id, group, 0).await? {
        info!("user {} started reading in group {}", user_id, group.id);
    }
    find_progress(database, user_id, group)
        .await?
        .ok_or(Error::NotFound("Progress"))
}

/// Creates the progress with defaults if needed, then applies the update.
/// The flag tells whether the row was created.
pub async fn setup_progress(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
    update: ProgressUpdate,
) -> Result<(ReadingProgress, bool)> {
    let created = insert_progress(database, user_id, group, 1).await?;
    let progress = update_progress(database, user_id, group, update).await?;
    Ok((progress, created))
}

pub async fn update_progress(
    database: &SqlitePool,
    user_id: i64,
    group: &Group,
    update: ProgressUpdate,
) -> Result<ReadingProgress> {
    let progress = find_progress(database, user_id, group)
        .await?
        .ok_or(Error::NotFound("Progress"))?;

    let current_page = update.current_page.unwrap_or(progress.current_page);
    if current_page < 0 {
        return Err(Error::invalid_field(
            "current_page",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    let reading_speed_minutes = update
        .reading_speed_minutes
        .unwrap_or(progress.reading_speed_minutes);
    if reading_speed_minutes < 0 {
        return Err(Error::invalid_field(
            "reading_speed_minutes",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    let current_chapter_id = match update.current_chapter {
        None => progress.current_chapter_id,
        Some(None) => None,
        Some(Some(chapter_id)) => {
            if book::find_chapter(database, group.book_id, chapter_id)
                .await?
                .is_none()
            {
                return Err(Error::invalid_field(
                    "current_chapter",
                    format!("Invalid pk \"{}\" - object does not exist.", chapter_id),
                ));
            }
            Some(chapter_id)
        }
    };
    let chapter_deadline = match update.chapter_deadline {
        None => progress.chapter_deadline,
        Some(None) => None,
        Some(Some(raw)) => Some(parse_date(&raw).ok_or_else(|| {
            Error::invalid_field(
                "chapter_deadline",
                "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.",
            )
        })?),
    };
    let chapter_status = update.chapter_status.unwrap_or(progress.chapter_status);

    sqlx::query(
        "update reading_progress set current_page = ?, reading_speed_minutes = ?,
        current_chapter_id = ?, chapter_deadline = ?, chapter_status = ?, last_read_at = ?
        where id = ?",
    )
    .bind(current_page)
    .bind(reading_speed_minutes)
    .bind(current_chapter_id)
    .bind(chapter_deadline)
    .bind(chapter_status)
    .bind(now_utc())
    .bind(progress.id)
    .execute(database)
    .await?;
    find_progress(database, user_id, group)
        .await?
        .ok_or(Error::NotFound("Progress"))
}

/// Every progress record of the user, across groups.
pub async fn list_user_progress(database: &SqlitePool, user_id: i64) -> Result<Vec<ReadingProgress>> {
    let sql = format!("{PROGRESS_SELECT} where p.user_id = ? order by p.last_read_at desc");
    let list = sqlx::query_as::<_, ReadingProgress>(&sql)
        .bind(user_id)
        .fetch_all(database)
        .await?;
    Ok(list)
}

/// Loads the roster with each member's progress and classifies it for `today`.
pub async fn group_progress_stats(
    database: &SqlitePool,
    group: &Group,
    today: Date,
) -> Result<StatsReport> {
    let total_pages: i64 = sqlx::query_scalar("select total_pages from book where id = ?")
        .bind(group.book_id)
        .fetch_one(database)
        .await?;
    let rows = sqlx::query_as::<_, (String, Option<i64>, Option<OffsetDateTime>)>(
        "select u.username, p.current_page, p.last_read_at
        from group_membership m
        join user_account u on u.id = m.user_id
        left join reading_progress p
            on p.user_id = m.user_id and p.group_id = m.group_id and p.book_id = ?
        where m.group_id = ?
        order by m.id",
    )
    .bind(group.book_id)
    .bind(group.id)
    .fetch_all(database)
    .await?;
    let members: Vec<MemberProgress> = rows
        .into_iter()
        .map(|(username, current_page, last_read_at)| MemberProgress {
            username,
            progress: last_read_at.map(|last_read| ProgressSnapshot {
                current_page,
                last_read,
            }),
        })
        .collect();
    let window = StatsWindow {
        start_date: Some(group.start_date),
        end_date: Some(group.end_date),
        total_pages,
    };
    Ok(compute_stats(today, window, &members))
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::{
        book::{create_book, get_chapters, tests::new_book},
        database::connect_in_memory,
        group::{create_group, get_group, join_group, leave_group, tests::new_group},
        user::create_user,
    };

    async fn setup() -> (SqlitePool, Group, i64, i64) {
        let database = connect_in_memory().await.unwrap();
        let book_id = create_book(&database, &new_book("Dune", 200, 4)).await.unwrap();
        let ann = create_user(&database, "ann", "Reader9x").await.unwrap();
        let bob = create_user(&database, "bob", "Reader9x").await.unwrap();
        let group = create_group(
            &database,
            ann,
            new_group(book_id, date!(2024 - 01 - 01), date!(2024 - 01 - 11)),
        )
        .await
        .unwrap();
        join_group(&database, group.id, bob).await.unwrap();
        let group = get_group(&database, group.id).await.unwrap();
        (database, group, ann, bob)
    }

    #[tokio::test]
    async fn test_lazy_creation_is_idempotent() {
        let (database, group, ann, _) = setup().await;
        let first = get_or_create_progress(&database, ann, &group).await.unwrap();
        assert_eq!(first.current_page, 1);
        assert_eq!(first.reading_speed_minutes, 0);
        assert_eq!(first.chapter_status, ChapterStatus::InProgress);
        assert_eq!(first.book_title, "Dune");
        let second = get_or_create_progress(&database, ann, &group).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(list_user_progress(&database, ann).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_setup_and_update() {
        let (database, group, ann, _) = setup().await;
        let update = ProgressUpdate {
            reading_speed_minutes: Some(3),
            ..Default::default()
        };
        let (progress, created) = setup_progress(&database, ann, &group, update).await.unwrap();
        assert!(created);
        assert_eq!(progress.reading_speed_minutes, 3);
        let (_, created) = setup_progress(&database, ann, &group, ProgressUpdate::default())
            .await
            .unwrap();
        assert!(!created);

        let chapter = get_chapters(&database, group.book_id).await.unwrap()[1].clone();
        let update: ProgressUpdate = serde_json::from_str(&format!(
            r#"{{"current_page": 57, "current_chapter": {}, "chapter_deadline": "2024-01-05", "chapter_status": "completed"}}"#,
            chapter.id
        ))
        .unwrap();
        let progress = update_progress(&database, ann, &group, update).await.unwrap();
        assert_eq!(progress.current_page, 57);
        assert_eq!(progress.reading_speed_minutes, 3);
        assert_eq!(progress.current_chapter_id, Some(chapter.id));
        assert_eq!(progress.chapter_title.as_deref(), Some("Chapter 2"));
        assert_eq!(progress.chapter_deadline, Some(date!(2024 - 01 - 05)));
        assert_eq!(progress.chapter_status, ChapterStatus::Completed);

        // null clears, absent keeps
        let update: ProgressUpdate =
            serde_json::from_str(r#"{"current_chapter": null}"#).unwrap();
        let progress = update_progress(&database, ann, &group, update).await.unwrap();
        assert_eq!(progress.current_chapter_id, None);
        assert_eq!(progress.chapter_deadline, Some(date!(2024 - 01 - 05)));
    }

    #[tokio::test]
    async fn test_update_validation() {
        let (database, group, ann, bob) = setup().await;
        assert!(matches!(
            update_progress(&database, bob, &group, ProgressUpdate::default()).await,
            Err(Error::NotFound("Progress"))
        ));
        get_or_create_progress(&database, ann, &group).await.unwrap();
        let negative = ProgressUpdate {
            current_page: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            update_progress(&database, ann, &group, negative).await,
            Err(Error::InvalidField { field: "current_page", .. })
        ));
        let foreign_chapter = ProgressUpdate {
            current_chapter: Some(Some(999)),
            ..Default::default()
        };
        assert!(matches!(
            update_progress(&database, ann, &group, foreign_chapter).await,
            Err(Error::InvalidField { field: "current_chapter", .. })
        ));
        let bad_date = ProgressUpdate {
            chapter_deadline: Some(Some("next week".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            update_progress(&database, ann, &group, bad_date).await,
            Err(Error::InvalidField { field: "chapter_deadline", .. })
        ));
    }

    #[tokio::test]
    async fn test_group_stats_from_database() {
        let (database, group, ann, bob) = setup().await;
        let cid = create_user(&database, "cid", "Reader9x").await.unwrap();
        join_group(&database, group.id, cid).await.unwrap();

        get_or_create_progress(&database, ann, &group).await.unwrap();
        let update = ProgressUpdate {
            current_page: Some(100),
            ..Default::default()
        };
        update_progress(&database, ann, &group, update).await.unwrap();
        get_or_create_progress(&database, bob, &group).await.unwrap();

        let report = group_progress_stats(&database, &group, date!(2024 - 01 - 06))
            .await
            .unwrap();
        assert_eq!(report.total_members, 3);
        assert_eq!(report.expected_progress, 50.0);
        assert_eq!(report.on_track.members[0].username, "ann");
        assert_eq!(report.on_track.members[0].progress_percent, 50.0);
        assert_eq!(report.behind.members[0].username, "bob");
        assert_eq!(report.not_started.members[0].username, "cid");
    }

    #[tokio::test]
    async fn test_leaving_drops_progress() {
        let (database, group, _, bob) = setup().await;
        get_or_create_progress(&database, bob, &group).await.unwrap();
        leave_group(&database, group.id, bob).await.unwrap();
        assert!(list_user_progress(&database, bob).await.unwrap().is_empty());
        let group = get_group(&database, group.id).await.unwrap();
        let report = group_progress_stats(&database, &group, date!(2024 - 01 - 06))
            .await
            .unwrap();
        assert_eq!(report.total_members, 1);
    }
}
