use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    book,
    error::{Error, Result},
    group::{Group, ensure_member},
    utils::now_utc,
};

pub const MAX_EMOJI_CHARS: usize = 10;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Comment {
    pub id: i64,
    #[serde(skip)]
    pub post_id: i64,
    pub author: i64,
    pub author_name: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Reaction {
    pub id: i64,
    pub post: i64,
    pub user: i64,
    pub user_name: String,
    pub emoji: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Post {
    pub id: i64,
    pub group: i64,
    pub author: i64,
    pub author_name: String,
    pub chapter: Option<i64>,
    pub chapter_title: Option<String>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[sqlx(skip)]
    pub comments: Vec<Comment>,
    #[sqlx(skip)]
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewPost {
    #[serde(default)]
    pub content: String,
    /// Chapter id within the group's book
    pub chapter: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewComment {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReactionRequest {
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReactionToggle {
    pub action: ReactionAction,
    pub reactions: Vec<Reaction>,
}

const POST_SELECT: &str = "select p.id, p.group_id as \"group\", p.author_id as author,
    u.username as author_name, p.chapter_id as chapter, c.title as chapter_title,
    p.content, p.created_at
    from discussion_post p
    join user_account u on u.id = p.author_id
    left join chapter c on c.id = p.chapter_id";

const COMMENT_SELECT: &str = "select c.id, c.post_id, c.author_id as author,
    u.username as author_name, c.content, c.created_at
    from comment c
    join user_account u on u.id = c.author_id";

const REACTION_SELECT: &str = "select r.id, r.post_id as post, r.user_id as user,
    u.username as user_name, r.emoji, r.created_at
    from reaction r
    join user_account u on u.id = r.user_id";

fn non_blank(field: &'static str, content: &str) -> Result<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::invalid_field(field, "This field may not be blank."));
    }
    Ok(content.to_string())
}

/// Posts of a group, newest first, each with its comments (oldest first) and reactions.
pub async fn list_posts(database: &SqlitePool, group_id: i64) -> Result<Vec<Post>> {
    let sql = format!("{POST_SELECT} where p.group_id = ? order by p.created_at desc, p.id desc");
    let mut posts = sqlx::query_as::<_, Post>(&sql)
        .bind(group_id)
        .fetch_all(database)
        .await?;

    let sql = format!(
        "{COMMENT_SELECT} join discussion_post p on p.id = c.post_id
        where p.group_id = ? order by c.created_at, c.id"
    );
    let comments = sqlx::query_as::<_, Comment>(&sql)
        .bind(group_id)
        .fetch_all(database)
        .await?;

    let sql = format!(
        "{REACTION_SELECT} join discussion_post p on p.id = r.post_id
        where p.group_id = ? order by r.id"
    );
    let reactions = sqlx::query_as::<_, Reaction>(&sql)
        .bind(group_id)
        .fetch_all(database)
        .await?;

    let mut comments_by_post: HashMap<i64, Vec<Comment>> = HashMap::new();
    for comment in comments {
        comments_by_post.entry(comment.post_id).or_default().push(comment);
    }
    let mut reactions_by_post: HashMap<i64, Vec<Reaction>> = HashMap::new();
    for reaction in reactions {
        reactions_by_post.entry(reaction.post).or_default().push(reaction);
    }
    for post in posts.iter_mut() {
        post.comments = comments_by_post.remove(&post.id).unwrap_or_default();
        post.reactions = reactions_by_post.remove(&post.id).unwrap_or_default();
    }
    Ok(posts)
}

async fn get_post(database: &SqlitePool, post_id: i64) -> Result<Post> {
    let sql = format!("{POST_SELECT} where p.id = ?");
    sqlx::query_as::<_, Post>(&sql)
        .bind(post_id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("Post"))
}

/// Loads a post whose group the user belongs to.
async fn get_member_post(database: &SqlitePool, post_id: i64, user_id: i64) -> Result<Post> {
    let post = get_post(database, post_id).await?;
    ensure_member(database, post.group, user_id).await?;
    Ok(post)
}

pub async fn create_post(
    database: &SqlitePool,
    author_id: i64,
    group: &Group,
    req: NewPost,
) -> Result<Post> {
    let content = non_blank("content", &req.content)?;
    if let Some(chapter_id) = req.chapter {
        if book::find_chapter(database, group.book_id, chapter_id)
            .await?
            .is_none()
        {
            return Err(Error::invalid_field(
                "chapter",
                format!("Invalid pk \"{}\" - object does not exist.", chapter_id),
            ));
        }
    }
    let id: i64 = sqlx::query_scalar(
        "insert into discussion_post (group_id, author_id, chapter_id, content, created_at)
        values (?, ?, ?, ?, ?) returning id",
    )
    .bind(group.id)
    .bind(author_id)
    .bind(req.chapter)
    .bind(content)
    .bind(now_utc())
    .fetch_one(database)
    .await?;
    info!("user {} posted {} in group {}", author_id, id, group.id);
    get_post(database, id).await
}

pub async fn add_comment(
    database: &SqlitePool,
    author_id: i64,
    post_id: i64,
    req: NewComment,
) -> Result<Comment> {
    let post = get_member_post(database, post_id, author_id).await?;
    let content = non_blank("content", &req.content)?;
    let id: i64 = sqlx::query_scalar(
        "insert into comment (post_id, author_id, content, created_at) values (?, ?, ?, ?) returning id",
    )
    .bind(post.id)
    .bind(author_id)
    .bind(content)
    .bind(now_utc())
    .fetch_one(database)
    .await?;
    let sql = format!("{COMMENT_SELECT} where c.id = ?");
    let comment = sqlx::query_as::<_, Comment>(&sql)
        .bind(id)
        .fetch_one(database)
        .await?;
    Ok(comment)
}

pub async fn list_reactions(database: &SqlitePool, post_id: i64) -> Result<Vec<Reaction>> {
    let sql = format!("{REACTION_SELECT} where r.post_id = ? order by r.id");
    let reactions = sqlx::query_as::<_, Reaction>(&sql)
        .bind(post_id)
        .fetch_all(database)
        .await?;
    Ok(reactions)
}

/// Removes the user's reaction with this emoji if present, adds it otherwise.
pub async fn toggle_reaction(
    database: &SqlitePool,
    user_id: i64,
    post_id: i64,
    emoji: Option<&str>,
) -> Result<ReactionToggle> {
    let post = get_member_post(database, post_id, user_id).await?;
    let emoji = emoji.map(str::trim).unwrap_or_default();
    if emoji.is_empty() {
        return Err(Error::bad_request("Emoji is required"));
    }
    if emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(Error::invalid_field(
            "emoji",
            format!("Ensure this field has no more than {} characters.", MAX_EMOJI_CHARS),
        ));
    }

    let removed = sqlx::query("delete from reaction where post_id = ? and user_id = ? and emoji = ?")
        .bind(post.id)
        .bind(user_id)
        .bind(emoji)
        .execute(database)
        .await?
        .rows_affected();
    let action = if removed > 0 {
        ReactionAction::Removed
    } else {
        sqlx::query(
            "insert into reaction (post_id, user_id, emoji, created_at) values (?, ?, ?, ?)
            on conflict (post_id, user_id, emoji) do nothing",
        )
        .bind(post.id)
        .bind(user_id)
        .bind(emoji)
        .bind(now_utc())
        .execute(database)
        .await?;
        ReactionAction::Added
    };
    let reactions = list_reactions(database, post.id).await?;
    Ok(ReactionToggle { action, reactions })
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::{
        book::{create_book, get_chapters, tests::new_book},
        database::connect_in_memory,
        group::{create_group, join_group, tests::new_group},
        user::create_user,
    };

    async fn setup() -> (SqlitePool, Group, i64, i64) {
        let database = connect_in_memory().await.unwrap();
        let book_id = create_book(&database, &new_book("Emma", 300, 3)).await.unwrap();
        let ann = create_user(&database, "ann", "Reader9x").await.unwrap();
        let bob = create_user(&database, "bob", "Reader9x").await.unwrap();
        let group = create_group(
            &database,
            ann,
            new_group(book_id, date!(2024 - 03 - 01), date!(2024 - 03 - 31)),
        )
        .await
        .unwrap();
        (database, group, ann, bob)
    }

    fn post(content: &str, chapter: Option<i64>) -> NewPost {
        NewPost {
            content: content.to_string(),
            chapter,
        }
    }

    #[tokio::test]
    async fn test_thread() {
        let (database, group, ann, bob) = setup().await;
        join_group(&database, group.id, bob).await.unwrap();
        let chapters = get_chapters(&database, group.book_id).await.unwrap();

        let first = create_post(&database, ann, &group, post("Opening thoughts", None))
            .await
            .unwrap();
        let second = create_post(&database, bob, &group, post(" Chapter one! ", Some(chapters[0].id)))
            .await
            .unwrap();
        assert_eq!(second.content, "Chapter one!");
        assert_eq!(second.chapter_title.as_deref(), Some(chapters[0].title.as_str()));

        add_comment(&database, bob, first.id, NewComment { content: "agreed".into() })
            .await
            .unwrap();
        add_comment(&database, ann, first.id, NewComment { content: "thanks".into() })
            .await
            .unwrap();
        toggle_reaction(&database, bob, first.id, Some("👍")).await.unwrap();

        let posts = list_posts(&database, group.id).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, second.id);
        assert_eq!(posts[1].id, first.id);
        let comments: Vec<_> = posts[1].comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(comments, vec!["agreed", "thanks"]);
        assert_eq!(posts[1].reactions.len(), 1);
        assert_eq!(posts[1].reactions[0].user_name, "bob");
        assert!(posts[0].comments.is_empty());
    }

    #[tokio::test]
    async fn test_post_validation() {
        let (database, group, ann, _) = setup().await;
        assert!(matches!(
            create_post(&database, ann, &group, post("   ", None)).await,
            Err(Error::InvalidField { field: "content", .. })
        ));

        let other = create_book(&database, &new_book("Persuasion", 250, 2)).await.unwrap();
        let foreign = get_chapters(&database, other).await.unwrap();
        assert!(matches!(
            create_post(&database, ann, &group, post("hi", Some(foreign[0].id))).await,
            Err(Error::InvalidField { field: "chapter", .. })
        ));
    }

    #[tokio::test]
    async fn test_outsiders_rejected() {
        let (database, group, ann, bob) = setup().await;
        let p = create_post(&database, ann, &group, post("hello", None)).await.unwrap();
        assert!(matches!(
            add_comment(&database, bob, p.id, NewComment { content: "hi".into() }).await,
            Err(Error::NotMember)
        ));
        assert!(matches!(
            toggle_reaction(&database, bob, p.id, Some("🔥")).await,
            Err(Error::NotMember)
        ));
        assert!(matches!(
            add_comment(&database, ann, 999, NewComment { content: "hi".into() }).await,
            Err(Error::NotFound("Post"))
        ));
    }

    #[tokio::test]
    async fn test_toggle_reaction() {
        let (database, group, ann, bob) = setup().await;
        join_group(&database, group.id, bob).await.unwrap();
        let p = create_post(&database, ann, &group, post("hello", None)).await.unwrap();

        let added = toggle_reaction(&database, ann, p.id, Some("❤️")).await.unwrap();
        assert_eq!(added.action, ReactionAction::Added);
        assert_eq!(added.reactions.len(), 1);

        let other = toggle_reaction(&database, bob, p.id, Some("❤️")).await.unwrap();
        assert_eq!(other.action, ReactionAction::Added);
        assert_eq!(other.reactions.len(), 2);

        let removed = toggle_reaction(&database, ann, p.id, Some("❤️")).await.unwrap();
        assert_eq!(removed.action, ReactionAction::Removed);
        assert_eq!(removed.reactions.len(), 1);
        assert_eq!(removed.reactions[0].user, bob);

        assert!(matches!(
            toggle_reaction(&database, ann, p.id, None).await,
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            toggle_reaction(&database, ann, p.id, Some("abcdefghijk")).await,
            Err(Error::InvalidField { field: "emoji", .. })
        ));
    }
}
