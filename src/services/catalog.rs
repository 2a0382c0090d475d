//! Catalogue management service

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{is_valid_isbn, Book, CreateBook, UpdateBook},
    repository::{BookStore, Repository},
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// List all books
    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.books.list().await
    }

    /// Search books by substring match over title and author
    pub async fn search_books(&self, query: &str) -> AppResult<Vec<Book>> {
        self.repository.books.search(query).await
    }

    /// Get a single book
    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository.books.get(id).await
    }

    /// Create a new book
    pub async fn create_book(&self, draft: CreateBook) -> AppResult<Book> {
        draft.validate()?;
        check_isbn(draft.isbn.as_deref())?;
        self.repository.books.create(draft).await
    }

    /// Update a book's editorial fields
    pub async fn update_book(&self, id: Uuid, patch: UpdateBook) -> AppResult<Book> {
        patch.validate()?;
        check_isbn(patch.isbn.as_deref())?;
        self.repository.books.update(id, patch).await
    }

    /// Delete a book. The store refuses the deletion while the book is
    /// on loan.
    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        self.repository.books.delete(id).await
    }
}

fn check_isbn(isbn: Option<&str>) -> AppResult<()> {
    if let Some(isbn) = isbn {
        if !is_valid_isbn(isbn) {
            return Err(AppError::InvalidInput(format!(
                "isbn '{}' must be 10 or 13 digits, hyphens allowed",
                isbn
            )));
        }
    }
    Ok(())
}
