//! Core document types, configuration, message collection, and the input
//! contract.
//!
//! The data model follows the bookkeeping API's invoice schema: a customer
//! block, an invoice block with totals, and a sequence of lines carrying
//! VAT-rate provenance tags.

mod config;
mod contract;
mod error;
mod message;
mod types;

pub use config::*;
pub use contract::*;
pub use error::*;
pub use message::*;
pub use types::*;
