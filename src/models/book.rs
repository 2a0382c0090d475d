//! Book (catalogue entry) model and related types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::loan::Loan;

/// Availability of a book. `OnLoan` iff an ACTIVE loan references the book;
/// only the lending service moves a book between the two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookStatus {
    Available,
    OnLoan,
}

impl BookStatus {
    /// Return the string code stored in the database
    pub fn as_str(self) -> &'static str {
        match self {
            BookStatus::Available => "AVAILABLE",
            BookStatus::OnLoan => "ON_LOAN",
        }
    }
}

impl From<&str> for BookStatus {
    fn from(s: &str) -> Self {
        match s {
            "ON_LOAN" => BookStatus::OnLoan,
            _ => BookStatus::Available,
        }
    }
}

/// Book model
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Book {
    /// Server-assigned identifier, immutable once created
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub publish_year: Option<i32>,
    pub description: Option<String>,
    pub status: BookStatus,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: String,
    #[validate(length(min = 1, message = "author must not be empty"))]
    pub author: String,
    pub isbn: Option<String>,
    #[validate(range(min = 0, max = 2100, message = "publish_year out of range"))]
    pub publish_year: Option<i32>,
    pub description: Option<String>,
}

/// Partial update of a book's editorial fields. `None` leaves a field
/// unchanged. Status is not part of the patch: it belongs to the
/// lending service alone.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "author must not be empty"))]
    pub author: Option<String>,
    pub isbn: Option<String>,
    #[validate(range(min = 0, max = 2100, message = "publish_year out of range"))]
    pub publish_year: Option<i32>,
    pub description: Option<String>,
}

/// Book together with its active loan, if any
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookWithLoan {
    pub book: Book,
    pub active_loan: Option<Loan>,
}

/// Check an ISBN: digits and hyphens only, 10 or 13 digits once
/// hyphens are stripped.
pub fn is_valid_isbn(isbn: &str) -> bool {
    let digits: Vec<char> = isbn.chars().filter(|c| *c != '-').collect();
    digits.iter().all(|c| c.is_ascii_digit()) && matches!(digits.len(), 10 | 13)
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn isbn_accepts_10_and_13_digit_forms() {
        assert!(is_valid_isbn("0441172717"));
        assert!(is_valid_isbn("978-0-441-17271-9"));
        assert!(is_valid_isbn("9780441172719"));
    }

    #[test]
    fn isbn_rejects_bad_lengths_and_characters() {
        assert!(!is_valid_isbn("12345"));
        assert!(!is_valid_isbn("97804411727190"));
        assert!(!is_valid_isbn("0441x72717"));
        assert!(!is_valid_isbn(""));
    }

    #[test]
    fn create_book_requires_title_and_author() {
        let draft = CreateBook {
            title: "".to_string(),
            author: "Herbert".to_string(),
            isbn: None,
            publish_year: None,
            description: None,
        };
        assert!(draft.validate().is_err());

        let draft = CreateBook {
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            isbn: None,
            publish_year: Some(1965),
            description: None,
        };
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn publish_year_bounds_are_enforced() {
        let draft = CreateBook {
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            isbn: None,
            publish_year: Some(-5),
            description: None,
        };
        assert!(draft.validate().is_err());
    }

    #[test]
    fn status_round_trips_through_db_codes() {
        assert_eq!(BookStatus::from(BookStatus::Available.as_str()), BookStatus::Available);
        assert_eq!(BookStatus::from(BookStatus::OnLoan.as_str()), BookStatus::OnLoan);
    }
}
