use thiserror::Error;

/// Fatal errors: programming-contract violations in the input shape or in
/// arithmetic preconditions.
///
/// Business-rule conditions (ambiguous rates, unresolved lines, total
/// mismatches) are never errors; they are collected as
/// [`Message`](super::Message)s and the invoice is flagged as concept.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompletionError {
    /// The raw invoice violates the input contract (malformed or missing
    /// required fields).
    #[error("invalid invoice: {0}")]
    Contract(String),

    /// An arithmetic precondition was violated (insufficient known values,
    /// division by zero, equal rates in a two-rate split).
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
}
