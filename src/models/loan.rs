//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Lifecycle of a loan. A loan is created ACTIVE and moves to RETURNED
/// exactly once; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Active,
    Returned,
}

impl LoanStatus {
    /// Return the string code stored in the database
    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Active => "ACTIVE",
            LoanStatus::Returned => "RETURNED",
        }
    }
}

impl From<&str> for LoanStatus {
    fn from(s: &str) -> Self {
        match s {
            "RETURNED" => LoanStatus::Returned,
            _ => LoanStatus::Active,
        }
    }
}

/// Loan model. `book_id` is a reference, not ownership: the loan record
/// outlives edits to (and deletion of) the book, which is why the title
/// is snapshotted into `book_name` at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    /// Server-assigned identifier
    pub id: Uuid,
    pub book_id: Uuid,
    /// Book title at the time the loan was created
    pub book_name: String,
    pub borrower_name: String,
    pub borrower_email: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Set exactly once, when the loan is returned
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

/// Create loan request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub book_id: Uuid,
    #[validate(length(min = 1, message = "borrower_name must not be empty"))]
    pub borrower_name: String,
    #[validate(email(message = "borrower_email must be a valid email address"))]
    pub borrower_email: String,
}

/// Fully-computed loan record handed to the loan store, which only adds
/// the identifier. Built by the lending service after the book has been
/// reserved.
#[derive(Debug, Clone)]
pub struct LoanDraft {
    pub book_id: Uuid,
    pub book_name: String,
    pub borrower_name: String,
    pub borrower_email: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}
