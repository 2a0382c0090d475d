//! Lending service: the only writer of cross-entity transitions.
//!
//! A book's status is flipped with compare-and-swap operations on the
//! book store, so concurrent borrowers racing for the same book are
//! serialized by the store without any global lock. The loan record is
//! created strictly after the book has been reserved; if that creation
//! fails the reservation is reverted (compensation), and books whose
//! revert also failed are flagged for the reconciliation sweep.

use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        book::BookStatus,
        loan::{CreateLoan, Loan, LoanDraft},
    },
    repository::{BookStore, LoanStore, Repository},
};

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
    settings: LendingConfig,
    /// Books left ON_LOAN without a loan after a failed compensation.
    flagged: Arc<Mutex<HashSet<Uuid>>>,
}

impl LendingService {
    pub fn new(repository: Repository, settings: LendingConfig) -> Self {
        Self {
            repository,
            settings,
            flagged: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Borrow a book: validate the borrower, reserve the book via
    /// compare-and-swap, then create the loan record.
    ///
    /// Exactly one of several concurrent callers for the same book wins
    /// the CAS; the rest receive `AlreadyOnLoan`.
    pub async fn create_loan(&self, request: CreateLoan) -> AppResult<Loan> {
        request.validate()?;
        if request.borrower_name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "borrower_name must not be blank".to_string(),
            ));
        }

        let active = self
            .repository
            .loans
            .count_active_for_borrower(&request.borrower_email)
            .await?;
        if active >= self.settings.max_loans_per_borrower {
            return Err(AppError::Conflict(format!(
                "borrower {} has reached the maximum of {} active loans",
                request.borrower_email, self.settings.max_loans_per_borrower
            )));
        }

        let book = self.repository.books.get(request.book_id).await?;

        // Linearization point: flip AVAILABLE -> ON_LOAN or lose the race.
        match self
            .repository
            .books
            .set_status(book.id, BookStatus::OnLoan, BookStatus::Available)
            .await
        {
            Ok(_) => {}
            Err(AppError::Conflict(_)) => {
                return Err(AppError::AlreadyOnLoan(format!(
                    "book {} is not available for loan",
                    book.id
                )));
            }
            Err(err) => return Err(err),
        }

        let now = Utc::now();
        let draft = LoanDraft {
            book_id: book.id,
            book_name: book.title.clone(),
            borrower_name: request.borrower_name,
            borrower_email: request.borrower_email,
            borrow_date: now,
            due_date: now + Duration::days(self.settings.loan_period_days),
        };

        match self.repository.loans.create(draft).await {
            Ok(loan) => {
                tracing::info!("Loan {} created for book {}", loan.id, book.id);
                Ok(loan)
            }
            Err(err) => {
                tracing::error!(
                    "Loan creation failed for reserved book {}: {}",
                    book.id,
                    err
                );
                self.revert_reservation(book.id).await;
                Err(AppError::TransientFailure(format!(
                    "loan creation failed for book {}",
                    book.id
                )))
            }
        }
    }

    /// Return a borrowed book. Idempotent: returning an already-returned
    /// loan yields the same RETURNED loan, never an error, so a timed-out
    /// return can be retried safely.
    pub async fn return_loan(&self, loan_id: Uuid) -> AppResult<Loan> {
        match self.repository.loans.mark_returned(loan_id, Utc::now()).await {
            Ok(loan) => {
                // Genuine transition: release the book. The RETURNED loan
                // is authoritative, so a CAS failure here is an anomaly to
                // report, not an error to surface.
                if let Err(err) = self
                    .repository
                    .books
                    .set_status(loan.book_id, BookStatus::Available, BookStatus::OnLoan)
                    .await
                {
                    tracing::error!(
                        "Book {} was not ON_LOAN while returning loan {}: {}",
                        loan.book_id,
                        loan.id,
                        err
                    );
                }
                tracing::info!("Loan {} returned, book {} released", loan.id, loan.book_id);
                Ok(loan)
            }
            // Already returned: report the stored loan as a success.
            Err(AppError::Conflict(_)) => self.repository.loans.get(loan_id).await,
            Err(err) => Err(err),
        }
    }

    /// Revert a reservation after loan creation failed, retrying a
    /// bounded number of times before flagging the book.
    async fn revert_reservation(&self, book_id: Uuid) {
        for attempt in 1..=self.settings.compensation_retries {
            match self
                .repository
                .books
                .set_status(book_id, BookStatus::Available, BookStatus::OnLoan)
                .await
            {
                Ok(_) => {
                    tracing::warn!(
                        "Reverted reservation of book {} after failed loan creation",
                        book_id
                    );
                    return;
                }
                // The book is no longer ON_LOAN (or gone): nothing to revert.
                Err(AppError::Conflict(_)) | Err(AppError::NotFound(_)) => return,
                Err(err) => {
                    tracing::warn!(
                        "Compensation attempt {}/{} for book {} failed: {}",
                        attempt,
                        self.settings.compensation_retries,
                        book_id,
                        err
                    );
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(50 * attempt as u64)).await;
        }

        self.flagged.lock().unwrap().insert(book_id);
        tracing::error!(
            "Failed to revert reservation of book {}; flagged for reconciliation",
            book_id
        );
    }

    /// Re-check every flagged book and release the ones that are ON_LOAN
    /// with no ACTIVE loan. Returns the number of books repaired or
    /// found consistent. Invoked periodically by the background sweep.
    pub async fn reconcile(&self) -> AppResult<usize> {
        let flagged: Vec<Uuid> = self.flagged.lock().unwrap().iter().copied().collect();
        let mut resolved = 0;

        for book_id in flagged {
            match self.repair_book(book_id).await {
                Ok(true) => {
                    self.flagged.lock().unwrap().remove(&book_id);
                    resolved += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!("Reconciliation of book {} failed: {}", book_id, err);
                }
            }
        }
        Ok(resolved)
    }

    /// Number of books currently awaiting reconciliation
    pub fn pending_reconciliation(&self) -> usize {
        self.flagged.lock().unwrap().len()
    }

    async fn repair_book(&self, book_id: Uuid) -> AppResult<bool> {
        let book = match self.repository.books.get(book_id).await {
            Ok(book) => book,
            Err(AppError::NotFound(_)) => return Ok(true),
            Err(err) => return Err(err),
        };

        if book.status != BookStatus::OnLoan {
            return Ok(true);
        }
        if self
            .repository
            .loans
            .find_active_for_book(book_id)
            .await?
            .is_some()
        {
            // A loan does reference the book: the pair is consistent.
            return Ok(true);
        }

        match self
            .repository
            .books
            .set_status(book_id, BookStatus::Available, BookStatus::OnLoan)
            .await
        {
            Ok(_) => {
                tracing::info!("Reconciled orphaned reservation of book {}", book_id);
                Ok(true)
            }
            // Lost a race with a concurrent transition; the flag stays
            // until the next sweep confirms the pair is consistent.
            Err(AppError::Conflict(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
