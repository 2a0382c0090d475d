//! In-memory stores.
//!
//! Every read-modify-write happens under the record map's mutex, which
//! gives the same atomicity guarantees as the conditional UPDATEs of the
//! Postgres stores. The lock is never held across an await point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookStatus, CreateBook, UpdateBook},
        loan::{Loan, LoanDraft, LoanStatus},
    },
};

use super::{BookStore, LoanStore};

pub struct MemoryBookStore {
    books: Mutex<HashMap<Uuid, Book>>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn create(&self, draft: CreateBook) -> AppResult<Book> {
        let book = Book {
            id: Uuid::new_v4(),
            title: draft.title,
            author: draft.author,
            isbn: draft.isbn,
            publish_year: draft.publish_year,
            description: draft.description,
            status: BookStatus::Available,
        };
        self.books.lock().unwrap().insert(book.id, book.clone());
        Ok(book)
    }

    async fn get(&self, id: Uuid) -> AppResult<Book> {
        self.books
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn list(&self) -> AppResult<Vec<Book>> {
        Ok(self.books.lock().unwrap().values().cloned().collect())
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Book>> {
        let needle = query.to_lowercase();
        Ok(self
            .books
            .lock()
            .unwrap()
            .values()
            .filter(|b| {
                b.title.to_lowercase().contains(&needle)
                    || b.author.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, patch: UpdateBook) -> AppResult<Book> {
        let mut books = self.books.lock().unwrap();
        let book = books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        if let Some(title) = patch.title {
            book.title = title;
        }
        if let Some(author) = patch.author {
            book.author = author;
        }
        if let Some(isbn) = patch.isbn {
            book.isbn = Some(isbn);
        }
        if let Some(publish_year) = patch.publish_year {
            book.publish_year = Some(publish_year);
        }
        if let Some(description) = patch.description {
            book.description = Some(description);
        }
        Ok(book.clone())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: BookStatus,
        expected: BookStatus,
    ) -> AppResult<Book> {
        let mut books = self.books.lock().unwrap();
        let book = books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        if book.status != expected {
            return Err(AppError::Conflict(format!(
                "book {} status is {}, expected {}",
                id,
                book.status.as_str(),
                expected.as_str()
            )));
        }
        book.status = status;
        Ok(book.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut books = self.books.lock().unwrap();
        let book = books
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        if book.status == BookStatus::OnLoan {
            return Err(AppError::Conflict(format!(
                "book {} cannot be deleted while on loan",
                id
            )));
        }
        books.remove(&id);
        Ok(())
    }
}

pub struct MemoryLoanStore {
    loans: Mutex<HashMap<Uuid, Loan>>,
}

impl MemoryLoanStore {
    pub fn new() -> Self {
        Self {
            loans: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLoanStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoanStore for MemoryLoanStore {
    async fn create(&self, draft: LoanDraft) -> AppResult<Loan> {
        let loan = Loan {
            id: Uuid::new_v4(),
            book_id: draft.book_id,
            book_name: draft.book_name,
            borrower_name: draft.borrower_name,
            borrower_email: draft.borrower_email,
            borrow_date: draft.borrow_date,
            due_date: draft.due_date,
            return_date: None,
            status: LoanStatus::Active,
        };
        self.loans.lock().unwrap().insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn get(&self, id: Uuid) -> AppResult<Loan> {
        self.loans
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    async fn list_active(&self) -> AppResult<Vec<Loan>> {
        Ok(self
            .loans
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.status == LoanStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> AppResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self.loans.lock().unwrap().values().cloned().collect();
        loans.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date));
        Ok(loans)
    }

    async fn find_active_for_book(&self, book_id: Uuid) -> AppResult<Option<Loan>> {
        Ok(self
            .loans
            .lock()
            .unwrap()
            .values()
            .find(|l| l.book_id == book_id && l.status == LoanStatus::Active)
            .cloned())
    }

    async fn count_active_for_borrower(&self, email: &str) -> AppResult<i64> {
        Ok(self
            .loans
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.status == LoanStatus::Active && l.borrower_email == email)
            .count() as i64)
    }

    async fn mark_returned(&self, id: Uuid, return_date: DateTime<Utc>) -> AppResult<Loan> {
        let mut loans = self.loans.lock().unwrap();
        let loan = loans
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        if loan.status == LoanStatus::Returned {
            return Err(AppError::Conflict(format!("loan {} already returned", id)));
        }
        loan.status = LoanStatus::Returned;
        loan.return_date = Some(return_date);
        Ok(loan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(title: &str, author: &str) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: author.to_string(),
            isbn: None,
            publish_year: None,
            description: None,
        }
    }

    fn loan_draft(book_id: Uuid, email: &str, borrow_date: DateTime<Utc>) -> LoanDraft {
        LoanDraft {
            book_id,
            book_name: "Dune".to_string(),
            borrower_name: "Alice".to_string(),
            borrower_email: email.to_string(),
            borrow_date,
            due_date: borrow_date + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn set_status_is_a_compare_and_swap() {
        let store = MemoryBookStore::new();
        let book = store.create(draft("Dune", "Frank Herbert")).await.unwrap();

        let reserved = store
            .set_status(book.id, BookStatus::OnLoan, BookStatus::Available)
            .await
            .unwrap();
        assert_eq!(reserved.status, BookStatus::OnLoan);

        // Same transition again must fail: the expected value no longer holds.
        let err = store
            .set_status(book.id, BookStatus::OnLoan, BookStatus::Available)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = store
            .set_status(Uuid::new_v4(), BookStatus::OnLoan, BookStatus::Available)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_refuses_books_on_loan() {
        let store = MemoryBookStore::new();
        let book = store.create(draft("Dune", "Frank Herbert")).await.unwrap();
        store
            .set_status(book.id, BookStatus::OnLoan, BookStatus::Available)
            .await
            .unwrap();

        let err = store.delete(book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        store
            .set_status(book.id, BookStatus::Available, BookStatus::OnLoan)
            .await
            .unwrap();
        store.delete(book.id).await.unwrap();
        assert!(matches!(store.get(book.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn search_matches_title_and_author_case_insensitively() {
        let store = MemoryBookStore::new();
        store.create(draft("Dune", "Frank Herbert")).await.unwrap();
        store.create(draft("Neuromancer", "William Gibson")).await.unwrap();

        let hits = store.search("dune").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Dune");

        let hits = store.search("HERBERT").await.unwrap();
        assert_eq!(hits.len(), 1);

        let hits = store.search("asimov").await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn update_patches_only_provided_fields() {
        let store = MemoryBookStore::new();
        let book = store.create(draft("Dune", "Frank Herbert")).await.unwrap();

        let patch = UpdateBook {
            title: Some("Dune Messiah".to_string()),
            author: None,
            isbn: Some("978-0-441-17271-9".to_string()),
            publish_year: None,
            description: None,
        };
        let updated = store.update(book.id, patch).await.unwrap();
        assert_eq!(updated.title, "Dune Messiah");
        assert_eq!(updated.author, "Frank Herbert");
        assert_eq!(updated.isbn.as_deref(), Some("978-0-441-17271-9"));
        assert_eq!(updated.status, BookStatus::Available);
    }

    #[tokio::test]
    async fn mark_returned_conflicts_on_second_call() {
        let store = MemoryLoanStore::new();
        let now = Utc::now();
        let loan = store
            .create(loan_draft(Uuid::new_v4(), "a@x.com", now))
            .await
            .unwrap();

        let returned = store.mark_returned(loan.id, now).await.unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert_eq!(returned.return_date, Some(now));

        let err = store.mark_returned(loan.id, now).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_all_orders_by_borrow_date_descending() {
        let store = MemoryLoanStore::new();
        let base = Utc::now();
        for offset in [2i64, 0, 1] {
            store
                .create(loan_draft(
                    Uuid::new_v4(),
                    "a@x.com",
                    base + Duration::minutes(offset),
                ))
                .await
                .unwrap();
        }

        let loans = store.list_all().await.unwrap();
        let dates: Vec<_> = loans.iter().map(|l| l.borrow_date).collect();
        let mut sorted = dates.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(dates, sorted);
    }

    #[tokio::test]
    async fn borrower_counts_see_only_active_loans() {
        let store = MemoryLoanStore::new();
        let now = Utc::now();
        let first = store
            .create(loan_draft(Uuid::new_v4(), "a@x.com", now))
            .await
            .unwrap();
        store
            .create(loan_draft(Uuid::new_v4(), "a@x.com", now))
            .await
            .unwrap();
        store
            .create(loan_draft(Uuid::new_v4(), "b@x.com", now))
            .await
            .unwrap();

        assert_eq!(store.count_active_for_borrower("a@x.com").await.unwrap(), 2);

        store.mark_returned(first.id, now).await.unwrap();
        assert_eq!(store.count_active_for_borrower("a@x.com").await.unwrap(), 1);
        assert_eq!(store.count_active_for_borrower("b@x.com").await.unwrap(), 1);
    }
}
