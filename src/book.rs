pub mod catalogue;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub total_pages: i64,
    pub total_chapters: i64,
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Chapter {
    pub id: i64,
    #[serde(rename = "book")]
    pub book_id: i64,
    /// 1-based, unique within the book
    pub chapter_number: i64,
    pub title: String,
}

/// A book to be added to the catalogue.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub description: String,
    pub total_pages: i64,
    /// Used to generate "Chapter N" titles when `chapters` is empty
    pub total_chapters: Option<i64>,
    pub cover_image: Option<String>,
    #[serde(default)]
    pub chapters: Vec<String>,
}

impl NewBook {
    fn chapter_titles(&self) -> Vec<String> {
        if !self.chapters.is_empty() {
            return self.chapters.clone();
        }
        let n = self.total_chapters.unwrap_or(0).max(0);
        (1..=n).map(|i| format!("Chapter {}", i)).collect()
    }
}

const BOOK_COLUMNS: &str =
    "id, title, author, genre, description, total_pages, total_chapters, cover_image";

fn like_pattern(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Lists books, optionally filtered by a title/author substring and a genre,
/// both case-insensitive.
pub async fn list_books(
    database: &SqlitePool,
    search: Option<&str>,
    genre: Option<&str>,
) -> Result<Vec<Book>> {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    let genre = genre.map(str::trim).filter(|s| !s.is_empty());
    let pattern = search.map(like_pattern);
    let sql = format!(
        r"select {BOOK_COLUMNS} from book
        where (? is null or title like ? escape '\' or author like ? escape '\')
        and (? is null or lower(genre) = lower(?))
        order by title"
    );
    let books = sqlx::query_as::<_, Book>(&sql)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(genre)
        .bind(genre)
        .fetch_all(database)
        .await?;
    Ok(books)
}

pub async fn get_book(database: &SqlitePool, id: i64) -> Result<Book> {
    let sql = format!("select {BOOK_COLUMNS} from book where id = ?");
    sqlx::query_as::<_, Book>(&sql)
        .bind(id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("Book"))
}

pub async fn get_chapters(database: &SqlitePool, book_id: i64) -> Result<Vec<Chapter>> {
    let chapters = sqlx::query_as::<_, Chapter>(
        "select id, book_id, chapter_number, title from chapter where book_id = ? order by chapter_number",
    )
    .bind(book_id)
    .fetch_all(database)
    .await?;
    Ok(chapters)
}

/// Looks up a chapter by id, only if it belongs to the given book.
pub async fn find_chapter(
    database: &SqlitePool,
    book_id: i64,
    chapter_id: i64,
) -> Result<Option<Chapter>> {
    let chapter = sqlx::query_as::<_, Chapter>(
        "select id, book_id, chapter_number, title from chapter where id = ? and book_id = ?",
    )
    .bind(chapter_id)
    .bind(book_id)
    .fetch_optional(database)
    .await?;
    Ok(chapter)
}

/// Adds a book and its chapters, numbered from 1 in the given order.
pub async fn create_book(database: &SqlitePool, book: &NewBook) -> Result<i64> {
    if book.title.trim().is_empty() {
        return Err(Error::invalid_field("title", "This field may not be blank."));
    }
    if book.total_pages <= 0 {
        return Err(Error::invalid_field(
            "total_pages",
            "Total pages must be a positive number",
        ));
    }
    let chapters = book.chapter_titles();
    let mut tx = database.begin().await?;
    let book_id = sqlx::query(
        "insert into book (title, author, genre, description, total_pages, total_chapters, cover_image) values (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.genre)
    .bind(&book.description)
    .bind(book.total_pages)
    .bind(chapters.len() as i64)
    .bind(&book.cover_image)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    for (idx, title) in chapters.iter().enumerate() {
        sqlx::query("insert into chapter (book_id, chapter_number, title) values (?, ?, ?)")
            .bind(book_id)
            .bind(idx as i64 + 1)
            .bind(title)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!("add book {}-{} with {} chapters", book_id, book.title, chapters.len());
    Ok(book_id)
}

pub async fn delete_book(database: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("delete from book where id = ?")
        .bind(id)
        .execute(database)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound("Book"));
    }
    Ok(())
}
