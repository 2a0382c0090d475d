//! Booklend - Book Lending Catalogue Service
//!
//! The lending domain service behind a book-lending catalogue client:
//! it owns Book and Loan state, enforces the "a book has at most one
//! active loan" invariant, and performs the borrow/return transitions
//! safely under concurrent requests, exposed over a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
