//! Error types for the vending machine.

use thiserror::Error;

/// Result type alias for machine operations
pub type Result<T> = std::result::Result<T, VendError>;

/// Structural errors that abort an operation before anything is mutated.
///
/// Expected business outcomes of a vend (insufficient funds, out of stock,
/// no change) are not errors; see [`crate::machine::VendFailure`].
#[derive(Error, Debug)]
pub enum VendError {
    /// Coin value outside the accepted denomination set
    #[error("Invalid coin denomination: {0}")]
    InvalidDenomination(u32),

    /// Unknown product, or a product that cannot be selected
    #[error("Product not available or out of stock: {0}")]
    NotFound(String),

    /// An adjustment would drive a stock or till count below zero
    #[error("Invalid state for {key}: {current} adjusted by {delta} would be negative")]
    InvalidState {
        key: String,
        current: u64,
        delta: i64,
    },

    /// Load entry with a negative value or an empty name
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid script record
    #[error("Invalid command at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    /// Missing input file argument
    #[error("Missing input file argument. Usage: vending-machine <script.csv>")]
    MissingArgument,
}
