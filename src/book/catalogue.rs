use std::path::Path;

use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use super::{NewBook, create_book};

/// A TOML list of books:
///
/// ```toml
/// [[book]]
/// title = "Atomic Habits"
/// author = "James Clear"
/// total_pages = 320
/// chapters = ["The Surprising Power of Atomic Habits", "..."]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Catalogue {
    #[serde(rename = "book", default)]
    pub books: Vec<NewBook>,
}

impl Catalogue {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

/// Imports every book of the catalogue, skipping ones whose title and author
/// are already present. Returns the ids of the added books.
pub async fn import_catalogue(
    database: &SqlitePool,
    catalogue: &Catalogue,
) -> anyhow::Result<Vec<i64>> {
    let mut book_ids = Vec::new();
    for book in &catalogue.books {
        let exists: i64 =
            sqlx::query_scalar("select count(*) from book where title = ? and author = ?")
                .bind(&book.title)
                .bind(&book.author)
                .fetch_one(database)
                .await?;
        if exists > 0 {
            warn!("book {} already exists, skipped", book.title);
            continue;
        }
        match create_book(database, book).await {
            Ok(id) => book_ids.push(id),
            Err(e) => error!("add book {} failed: {}", book.title, e),
        }
    }
    info!("imported {} books", book_ids.len());
    Ok(book_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{book::get_chapters, database::connect_in_memory};

    const CATALOGUE: &str = r#"
[[book]]
title = "Atomic Habits"
author = "James Clear"
genre = "Self-Help"
total_pages = 320
chapters = ["The Surprising Power of Atomic Habits", "How Your Habits Shape Your Identity"]

[[book]]
title = "The Silent Patient"
author = "Alex Michaelides"
genre = "Thriller"
total_pages = 336
total_chapters = 31

[[book]]
title = "Broken"
author = "Nobody"
total_pages = 0
"#;

    #[tokio::test]
    async fn test_import_catalogue() {
        let database = connect_in_memory().await.unwrap();
        let catalogue = Catalogue::parse(CATALOGUE).unwrap();
        assert_eq!(catalogue.books.len(), 3);

        let ids = import_catalogue(&database, &catalogue).await.unwrap();
        // the zero-page book is rejected, the rest go in
        assert_eq!(ids.len(), 2);
        let chapters = get_chapters(&database, ids[0]).await.unwrap();
        assert_eq!(chapters[1].title, "How Your Habits Shape Your Identity");
        assert_eq!(get_chapters(&database, ids[1]).await.unwrap().len(), 31);

        // importing twice adds nothing
        assert!(import_catalogue(&database, &catalogue).await.unwrap().is_empty());
    }
}
