use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::{Date, OffsetDateTime};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    book::{self, Book},
    error::{Error, Result, is_unique_violation},
    utils::{iso_date, now_utc},
};

/// Capacity of a reading group, creator included.
pub const MAX_GROUP_MEMBERS: i64 = 10;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(rename = "book")]
    pub book_id: i64,
    pub book_title: String,
    #[serde(rename = "creator")]
    pub creator_id: i64,
    pub creator_name: String,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
    pub member_count: i64,
    #[sqlx(skip)]
    pub is_full: bool,
}

impl Group {
    fn with_capacity(mut self) -> Self {
        self.is_full = self.member_count >= MAX_GROUP_MEMBERS;
        self
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Member {
    pub id: i64,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub members: Vec<Member>,
    pub book_details: Book,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewGroup {
    pub name: String,
    /// Book id
    pub book: i64,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
}

const GROUP_SELECT: &str = "select g.id, g.name, g.book_id, b.title as book_title, g.creator_id,
    u.username as creator_name, g.start_date, g.end_date,
    (select count(*) from group_membership m where m.group_id = g.id) as member_count
    from reading_group g
    join book b on b.id = g.book_id
    join user_account u on u.id = g.creator_id";

pub async fn get_group(database: &SqlitePool, id: i64) -> Result<Group> {
    let sql = format!("{GROUP_SELECT} where g.id = ?");
    sqlx::query_as::<_, Group>(&sql)
        .bind(id)
        .fetch_optional(database)
        .await?
        .map(Group::with_capacity)
        .ok_or(Error::NotFound("Group"))
}

/// Groups the user belongs to.
pub async fn list_user_groups(database: &SqlitePool, user_id: i64) -> Result<Vec<Group>> {
    let sql = format!(
        "{GROUP_SELECT} where g.id in (select group_id from group_membership where user_id = ?) order by g.start_date, g.id"
    );
    let groups = sqlx::query_as::<_, Group>(&sql)
        .bind(user_id)
        .fetch_all(database)
        .await?;
    Ok(groups.into_iter().map(Group::with_capacity).collect())
}

pub async fn list_all_groups(database: &SqlitePool) -> Result<Vec<Group>> {
    let sql = format!("{GROUP_SELECT} order by g.id");
    let groups = sqlx::query_as::<_, Group>(&sql).fetch_all(database).await?;
    Ok(groups.into_iter().map(Group::with_capacity).collect())
}

/// Groups reading the book that still have members and a free seat.
pub async fn available_groups_for_book(database: &SqlitePool, book_id: i64) -> Result<Vec<Group>> {
    let sql = format!("{GROUP_SELECT} where g.book_id = ? order by g.start_date, g.id");
    let groups = sqlx::query_as::<_, Group>(&sql)
        .bind(book_id)
        .fetch_all(database)
        .await?;
    Ok(groups
        .into_iter()
        .map(Group::with_capacity)
        .filter(|g| g.member_count > 0 && !g.is_full)
        .collect())
}

/// Creates the group and makes the creator its first member.
pub async fn create_group(database: &SqlitePool, creator_id: i64, req: NewGroup) -> Result<Group> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(Error::invalid_field("name", "This field may not be blank."));
    }
    if req.start_date > req.end_date {
        return Err(Error::invalid_field(
            "non_field_errors",
            "End date must be after start date.",
        ));
    }
    match book::get_book(database, req.book).await {
        Ok(_) => {}
        Err(Error::NotFound(_)) => {
            return Err(Error::invalid_field(
                "book",
                format!("Invalid pk \"{}\" - object does not exist.", req.book),
            ));
        }
        Err(e) => return Err(e),
    }
    let now = now_utc();
    let mut tx = database.begin().await?;
    let group_id = sqlx::query(
        "insert into reading_group (name, book_id, creator_id, start_date, end_date, created_at) values (?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(req.book)
    .bind(creator_id)
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    sqlx::query("insert into group_membership (user_id, group_id, joined_at) values (?, ?, ?)")
        .bind(creator_id)
        .bind(group_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!("user {} created group {}-{}", creator_id, group_id, name);
    get_group(database, group_id).await
}

pub async fn is_member(database: &SqlitePool, group_id: i64, user_id: i64) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("select count(*) from group_membership where group_id = ? and user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .fetch_one(database)
            .await?;
    Ok(count > 0)
}

/// Fails with `NotMember` unless the user belongs to the group.
pub async fn ensure_member(database: &SqlitePool, group_id: i64, user_id: i64) -> Result<()> {
    if is_member(database, group_id, user_id).await? {
        Ok(())
    } else {
        Err(Error::NotMember)
    }
}

/// Loads a group the user is a member of: 404 for a missing group, 403 for outsiders.
pub async fn get_member_group(database: &SqlitePool, group_id: i64, user_id: i64) -> Result<Group> {
    let group = get_group(database, group_id).await?;
    ensure_member(database, group_id, user_id).await?;
    Ok(group)
}

pub async fn get_members(database: &SqlitePool, group_id: i64) -> Result<Vec<Member>> {
    let members = sqlx::query_as::<_, Member>(
        "select u.id, u.username, m.joined_at from group_membership m
        join user_account u on u.id = m.user_id
        where m.group_id = ? order by m.id",
    )
    .bind(group_id)
    .fetch_all(database)
    .await?;
    Ok(members)
}

pub async fn get_group_detail(database: &SqlitePool, group_id: i64, user_id: i64) -> Result<GroupDetail> {
    let group = get_member_group(database, group_id, user_id).await?;
    let members = get_members(database, group_id).await?;
    let book_details = book::get_book(database, group.book_id).await?;
    Ok(GroupDetail {
        group,
        members,
        book_details,
    })
}

pub async fn join_group(database: &SqlitePool, group_id: i64, user_id: i64) -> Result<()> {
    let group = get_group(database, group_id).await?;
    if group.is_full {
        return Err(Error::bad_request("Group is full"));
    }
    if is_member(database, group_id, user_id).await? {
        return Err(Error::bad_request("Already a member"));
    }
    // the capacity check and the insert are one statement so concurrent joins can't overfill
    let result = sqlx::query(
        "insert into group_membership (user_id, group_id, joined_at)
        select ?, ?, ? where (select count(*) from group_membership where group_id = ?) < ?",
    )
    .bind(user_id)
    .bind(group_id)
    .bind(now_utc())
    .bind(group_id)
    .bind(MAX_GROUP_MEMBERS)
    .execute(database)
    .await;
    match result {
        Ok(r) if r.rows_affected() == 0 => Err(Error::bad_request("Group is full")),
        Ok(_) => {
            info!("user {} joined group {}", user_id, group_id);
            Ok(())
        }
        Err(e) if is_unique_violation(&e) => Err(Error::bad_request("Already a member")),
        Err(e) => Err(e.into()),
    }
}

/// Removes the membership together with the member's reading progress and
/// chapter schedules for the group.
pub async fn leave_group(database: &SqlitePool, group_id: i64, user_id: i64) -> Result<()> {
    let group = get_group(database, group_id).await?;
    if !is_member(database, group_id, user_id).await? {
        return Err(Error::bad_request("Not a member of this group"));
    }
    if group.creator_id == user_id && group.member_count > 1 {
        return Err(Error::bad_request(
            "As the group creator, you cannot leave while other members are present. Transfer ownership or wait for others to leave first.",
        ));
    }
    let mut tx = database.begin().await?;
    sqlx::query("delete from group_membership where group_id = ? and user_id = ?")
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from reading_progress where group_id = ? and user_id = ?")
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("delete from chapter_schedule where group_id = ? and user_id = ?")
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!("user {} left group {}", user_id, group_id);
    Ok(())
}
