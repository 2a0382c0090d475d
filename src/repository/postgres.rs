//! Postgres stores.
//!
//! Conditional updates (`UPDATE ... WHERE id = $1 AND status = $2`) carry
//! the compare-and-swap contracts; when zero rows match, a follow-up read
//! distinguishes NotFound from Conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookStatus, CreateBook, UpdateBook},
        loan::{Loan, LoanDraft, LoanStatus},
    },
};

use super::{BookStore, LoanStore};

/// Build a LIKE pattern matching `query` as a substring, with LIKE
/// metacharacters in the query treated literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn row_to_book(row: &PgRow) -> Book {
    Book {
        id: row.get("id"),
        title: row.get("title"),
        author: row.get("author"),
        isbn: row.get("isbn"),
        publish_year: row.get("publish_year"),
        description: row.get("description"),
        status: BookStatus::from(row.get::<String, _>("status").as_str()),
    }
}

fn row_to_loan(row: &PgRow) -> Loan {
    Loan {
        id: row.get("id"),
        book_id: row.get("book_id"),
        book_name: row.get("book_name"),
        borrower_name: row.get("borrower_name"),
        borrower_email: row.get("borrower_email"),
        borrow_date: row.get("borrow_date"),
        due_date: row.get("due_date"),
        return_date: row.get("return_date"),
        status: LoanStatus::from(row.get::<String, _>("status").as_str()),
    }
}

#[derive(Clone)]
pub struct PgBookStore {
    pool: Pool<Postgres>,
}

impl PgBookStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn create(&self, draft: CreateBook) -> AppResult<Book> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO books (id, title, author, isbn, publish_year, description, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'AVAILABLE')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.author)
        .bind(&draft.isbn)
        .bind(draft.publish_year)
        .bind(&draft.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_book(&row))
    }

    async fn get(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_book(&row))
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn list(&self) -> AppResult<Vec<Book>> {
        let rows = sqlx::query("SELECT * FROM books ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_book).collect())
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Book>> {
        let rows = sqlx::query(
            "SELECT * FROM books WHERE title ILIKE $1 OR author ILIKE $1 ORDER BY title",
        )
        .bind(like_pattern(query))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_book).collect())
    }

    async fn update(&self, id: Uuid, patch: UpdateBook) -> AppResult<Book> {
        sqlx::query(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                publish_year = COALESCE($5, publish_year),
                description = COALESCE($6, description)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.author)
        .bind(&patch.isbn)
        .bind(patch.publish_year)
        .bind(&patch.description)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| row_to_book(&row))
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: BookStatus,
        expected: BookStatus,
    ) -> AppResult<Book> {
        let updated = sqlx::query("UPDATE books SET status = $2 WHERE id = $1 AND status = $3 RETURNING *")
            .bind(id)
            .bind(status.as_str())
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = updated {
            return Ok(row_to_book(&row));
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match current {
            Some(current) => Err(AppError::Conflict(format!(
                "book {} status is {}, expected {}",
                id,
                current,
                expected.as_str()
            ))),
            None => Err(AppError::NotFound(format!("Book with id {} not found", id))),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1 AND status <> 'ON_LOAN'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<String> = sqlx::query_scalar("SELECT status FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(AppError::Conflict(format!(
                "book {} cannot be deleted while on loan",
                id
            ))),
            None => Err(AppError::NotFound(format!("Book with id {} not found", id))),
        }
    }
}

#[derive(Clone)]
pub struct PgLoanStore {
    pool: Pool<Postgres>,
}

impl PgLoanStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoanStore for PgLoanStore {
    async fn create(&self, draft: LoanDraft) -> AppResult<Loan> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO loans
                (id, book_id, book_name, borrower_name, borrower_email,
                 borrow_date, due_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'ACTIVE')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(draft.book_id)
        .bind(&draft.book_name)
        .bind(&draft.borrower_name)
        .bind(&draft.borrower_email)
        .bind(draft.borrow_date)
        .bind(draft.due_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_loan(&row))
    }

    async fn get(&self, id: Uuid) -> AppResult<Loan> {
        sqlx::query("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_loan(&row))
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    async fn list_active(&self) -> AppResult<Vec<Loan>> {
        let rows =
            sqlx::query("SELECT * FROM loans WHERE status = 'ACTIVE' ORDER BY borrow_date DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(row_to_loan).collect())
    }

    async fn list_all(&self) -> AppResult<Vec<Loan>> {
        let rows = sqlx::query("SELECT * FROM loans ORDER BY borrow_date DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_loan).collect())
    }

    async fn find_active_for_book(&self, book_id: Uuid) -> AppResult<Option<Loan>> {
        // At most one row can match: a partial unique index guarantees a
        // single ACTIVE loan per book.
        let row = sqlx::query("SELECT * FROM loans WHERE book_id = $1 AND status = 'ACTIVE'")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row_to_loan(&row)))
    }

    async fn count_active_for_borrower(&self, email: &str) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE borrower_email = $1 AND status = 'ACTIVE'",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_returned(&self, id: Uuid, return_date: DateTime<Utc>) -> AppResult<Loan> {
        let updated = sqlx::query(
            r#"
            UPDATE loans SET status = 'RETURNED', return_date = $2
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(return_date)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(row_to_loan(&row));
        }

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(AppError::Conflict(format!("loan {} already returned", id))),
            None => Err(AppError::NotFound(format!("Loan with id {} not found", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("dune"), "%dune%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
