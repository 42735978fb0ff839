use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::Date;
use tower_sessions::Session;
use utoipa::{IntoParams, ToSchema};

use crate::{
    book::{self, Book, Chapter},
    error::Result,
    group::{self, Group},
    state::AppState,
    utils::iso_date,
};

use super::current_user;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Substring of the title or author
    pub search: Option<String>,
    pub genre: Option<String>,
}

#[utoipa::path(
    path = "/api/books/",
    method(get),
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = Vec<Book>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_books(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<BookQuery>,
) -> Result<Json<Vec<Book>>> {
    current_user(&session).await?;
    let books = book::list_books(
        &state.database,
        query.search.as_deref(),
        query.genre.as_deref(),
    )
    .await?;
    Ok(Json(books))
}

#[derive(Serialize, ToSchema)]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: Book,
    /// Groups on this book with members and a free seat
    pub available_groups: Vec<Group>,
}

#[utoipa::path(
    path = "/api/books/{id}/",
    method(get),
    tag = "books",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book with joinable groups", body = BookDetail),
        (status = 404, description = "Book not found")
    )
)]
pub async fn book_detail(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<BookDetail>> {
    current_user(&session).await?;
    let book = book::get_book(&state.database, id).await?;
    let available_groups = group::available_groups_for_book(&state.database, id).await?;
    Ok(Json(BookDetail {
        book,
        available_groups,
    }))
}

#[derive(Serialize, ToSchema)]
pub struct GroupChapters {
    pub book_id: i64,
    pub book_title: String,
    pub total_chapters: i64,
    #[serde(with = "iso_date")]
    pub group_start_date: Date,
    #[serde(with = "iso_date")]
    pub group_end_date: Date,
    pub chapters: Vec<Chapter>,
}

#[utoipa::path(
    path = "/api/groups/{id}/chapters/",
    method(get),
    tag = "books",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Chapters of the group's book", body = GroupChapters),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn group_chapters(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<GroupChapters>> {
    let user_id = current_user(&session).await?;
    let group = group::get_member_group(&state.database, id, user_id).await?;
    let book = book::get_book(&state.database, group.book_id).await?;
    let chapters = book::get_chapters(&state.database, book.id).await?;
    Ok(Json(GroupChapters {
        book_id: book.id,
        book_title: book.title,
        total_chapters: book.total_chapters,
        group_start_date: group.start_date,
        group_end_date: group.end_date,
        chapters,
    }))
}

pub fn get_books_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/books/", get(list_books))
        .route("/books/{id}/", get(book_detail))
        .route("/groups/{id}/chapters/", get(group_chapters))
}
