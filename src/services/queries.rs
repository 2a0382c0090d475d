//! Read-side composition consumed by the client. Pure reads, no
//! invariant responsibility.

use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{BookStatus, BookWithLoan},
        loan::Loan,
    },
    repository::{BookStore, LoanStore, Repository},
};

#[derive(Clone)]
pub struct QueryService {
    repository: Repository,
}

impl QueryService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Read a book together with its active loan. At most one ACTIVE
    /// loan can reference the book, so the lookup is only made while the
    /// book is ON_LOAN.
    pub async fn book_with_active_loan(&self, book_id: Uuid) -> AppResult<BookWithLoan> {
        let book = self.repository.books.get(book_id).await?;
        let active_loan = if book.status == BookStatus::OnLoan {
            self.repository.loans.find_active_for_book(book_id).await?
        } else {
            None
        };
        Ok(BookWithLoan { book, active_loan })
    }

    /// Full loan history, most recent borrow first
    pub async fn loan_history(&self) -> AppResult<Vec<Loan>> {
        self.repository.loans.list_all().await
    }

    /// Loans currently out
    pub async fn active_loans(&self) -> AppResult<Vec<Loan>> {
        self.repository.loans.list_active().await
    }
}
