//! HTTP request handlers

pub mod enrichment;
pub mod health;
pub mod recommendation;

pub use enrichment::*;
pub use health::*;
pub use recommendation::*;

use crate::error::AppError;

/// First failing field of a `validator` report, as an input error
pub(crate) fn validation_error(errors: validator::ValidationErrors) -> AppError {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);

    match fields.first() {
        Some((field, errs)) => {
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| format!("Invalid {}", field));
            AppError::invalid(*field, message)
        }
        None => AppError::invalid("request", "Invalid request"),
    }
}
