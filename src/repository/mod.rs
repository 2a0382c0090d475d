//! Record stores for books and loans.
//!
//! Each store is responsible for making its own single-record
//! read-modify-write atomic; cross-record coordination lives in the
//! lending service and relies solely on the conditional primitives
//! exposed here (`set_status`, `mark_returned`, conditional `delete`).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookStatus, CreateBook, UpdateBook},
        loan::{Loan, LoanDraft},
    },
};

/// Store owning Book records and their availability status.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Create a book with a fresh identifier, status AVAILABLE
    async fn create(&self, draft: CreateBook) -> AppResult<Book>;

    /// Get a book by ID
    async fn get(&self, id: Uuid) -> AppResult<Book>;

    /// List all books
    async fn list(&self) -> AppResult<Vec<Book>>;

    /// Case-insensitive substring search over title and author.
    /// Result order is not part of the contract.
    async fn search(&self, query: &str) -> AppResult<Vec<Book>>;

    /// Apply a partial update to a book's editorial fields
    async fn update(&self, id: Uuid, patch: UpdateBook) -> AppResult<Book>;

    /// Compare-and-swap on the status field: succeeds only when the
    /// current status equals `expected`, otherwise fails with
    /// `AppError::Conflict`. This is the linearization primitive the
    /// lending service builds its transitions on.
    async fn set_status(&self, id: Uuid, status: BookStatus, expected: BookStatus)
        -> AppResult<Book>;

    /// Delete a book. Fails with `AppError::Conflict` while the book is
    /// ON_LOAN; the status check and the removal are atomic.
    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

/// Store owning Loan records and their lifecycle status.
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Create an ACTIVE loan with a fresh identifier
    async fn create(&self, draft: LoanDraft) -> AppResult<Loan>;

    /// Get a loan by ID
    async fn get(&self, id: Uuid) -> AppResult<Loan>;

    /// List loans with status ACTIVE
    async fn list_active(&self) -> AppResult<Vec<Loan>>;

    /// List all loans, ordered by borrow date descending
    async fn list_all(&self) -> AppResult<Vec<Loan>>;

    /// Find the ACTIVE loan referencing a book, if one exists
    async fn find_active_for_book(&self, book_id: Uuid) -> AppResult<Option<Loan>>;

    /// Count ACTIVE loans held by a borrower email
    async fn count_active_for_borrower(&self, email: &str) -> AppResult<i64>;

    /// Move a loan to RETURNED and set its return date. Fails with
    /// `AppError::Conflict` when the loan is already RETURNED; the
    /// check and the update are atomic.
    async fn mark_returned(&self, id: Uuid, return_date: DateTime<Utc>) -> AppResult<Loan>;
}

/// Main repository struct holding the two record stores
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub loans: Arc<dyn LoanStore>,
}

impl Repository {
    /// Create a repository backed by Postgres
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(postgres::PgBookStore::new(pool.clone())),
            loans: Arc::new(postgres::PgLoanStore::new(pool)),
        }
    }

    /// Create a repository backed by in-process memory. Used by the test
    /// suite; the conditional-update contracts are identical to the
    /// Postgres stores.
    pub fn in_memory() -> Self {
        Self {
            books: Arc::new(memory::MemoryBookStore::new()),
            loans: Arc::new(memory::MemoryLoanStore::new()),
        }
    }
}
