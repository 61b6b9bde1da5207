//! # factuur
//!
//! Invoice completion and VAT reconciliation engine for webshop
//! bookkeeping integrations: converts heterogeneous order/refund data into
//! a normalized invoice document and repairs it until it satisfies the
//! bookkeeping API's numerical and classification invariants, or flags it
//! as a concept (draft) with coded warnings for human review.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating
//! point. The engine is a pure in-process transformation: no persistence,
//! no outbound transport, one blocking rate lookup as its only suspension
//! point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use factuur::completion::complete;
//! use factuur::core::*;
//! use factuur::rates::StaticRates;
//! use rust_decimal_macros::dec;
//!
//! let mut invoice = Invoice::new(
//!     Customer { country_code: "NL".into(), ..Customer::default() },
//!     NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
//! );
//! invoice.lines.push(Line {
//!     description: "Consultancy".into(),
//!     quantity: dec!(10),
//!     unit_price: Some(dec!(150)),
//!     vat_rate: Some(dec!(21)),
//!     vat_rate_source: VatRateSource::Exact,
//!     ..Line::default()
//! });
//!
//! let mut sink = MessageSink::new();
//! let done = complete(invoice, &ShopConfig::default(), &StaticRates, &mut sink).unwrap();
//!
//! assert_eq!(done.vat_type, Some(VatType::National));
//! assert_eq!(done.vat_amount, Some(dec!(315.00)));
//! assert!(!done.concept);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | (default) | The full completion engine with built-in rate tables |
//! | `lookup` | HTTP-backed [`rates::RateSource`] implementation |

pub mod completion;
pub mod core;
pub mod money;
pub mod rates;
pub mod strategy;

// Re-export core types at crate root for convenience
pub use crate::core::*;
