//! VAT rate candidates and the rate-lookup collaborator.
//!
//! The engine never hardcodes which rates are legal for an invoice: it asks
//! a [`RateSource`] for the rates valid in a country on the invoice date.
//! [`StaticRates`] is the built-in offline source; an HTTP-backed source is
//! available behind the `lookup` feature.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::VatType;

#[cfg(feature = "lookup")]
mod client;

#[cfg(feature = "lookup")]
pub use client::HttpRates;

/// One legally possible (tax type, rate) combination for an invoice,
/// fixed at invoice-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatRateCandidate {
    pub vat_type: VatType,
    /// Rate as a percentage; 0 for reversed-charge types,
    /// [`EXEMPT_RATE`](crate::core::EXEMPT_RATE) for exempt/rest-of-world.
    pub rate: Decimal,
}

/// Error from a rate lookup collaborator.
///
/// Lookup failures are recoverable: the engine records the diagnostic and
/// continues with whatever candidates were obtained.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RateLookupError {
    /// No rate data for this country.
    #[error("no vat rates known for country '{0}'")]
    Unsupported(String),
    /// Network or HTTP failure.
    #[error("rate lookup network error: {0}")]
    Network(String),
    /// The rates API returned an error.
    #[error("rate lookup API error: {0}")]
    Api(String),
    /// Unexpected response shape.
    #[error("rate lookup parse error: {0}")]
    Parse(String),
}

/// Rate lookup collaborator: the legally valid VAT percentages in a country
/// on a given date.
///
/// Implementations own their timeout/retry policy; the engine treats the
/// call as blocking and degrades gracefully on failure.
pub trait RateSource {
    fn rates_on(&self, country_code: &str, date: NaiveDate) -> Result<Vec<Decimal>, RateLookupError>;
}

/// Distinct rate values among the candidates, highest first.
///
/// Candidates of different tax types may share a value (e.g. 0%); value
/// comparisons are on the 3-decimal key used throughout the engine.
pub fn distinct_rate_values(candidates: &[VatRateCandidate]) -> Vec<Decimal> {
    let mut values: Vec<Decimal> = candidates.iter().map(|c| c.rate.round_dp(3)).collect();
    values.sort();
    values.dedup();
    values.reverse();
    values
}

/// EU member states (ISO 3166-1 alpha-2), sorted for binary search.
static EU_COUNTRY_CODES: &[&str] = &[
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GR", "HR", "HU", "IE", "IT",
    "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK",
];

/// Whether `code` is an EU member state.
pub fn is_eu_country(code: &str) -> bool {
    EU_COUNTRY_CODES
        .binary_search(&code.to_uppercase().as_str())
        .is_ok()
}

pub(crate) const fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date,
        None => panic!("invalid calendar date"),
    }
}

/// Built-in historic rate tables for the home market and common
/// destination countries.
///
/// Rates are date-dependent: rate changes are effective from a statutory
/// date and invoices are judged by their issue date.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRates;

const NL_HIGH_21_FROM: NaiveDate = ymd(2012, 10, 1);
const NL_LOW_9_FROM: NaiveDate = ymd(2019, 1, 1);
const DE_COVID_CUT_FROM: NaiveDate = ymd(2020, 7, 1);
const DE_COVID_CUT_UNTIL: NaiveDate = ymd(2021, 1, 1);
const FR_HIGH_20_FROM: NaiveDate = ymd(2014, 1, 1);

impl RateSource for StaticRates {
    fn rates_on(&self, country_code: &str, date: NaiveDate) -> Result<Vec<Decimal>, RateLookupError> {
        let mut rates = match country_code.to_uppercase().as_str() {
            "NL" => {
                let high = if date >= NL_HIGH_21_FROM { dec!(21) } else { dec!(19) };
                let low = if date >= NL_LOW_9_FROM { dec!(9) } else { dec!(6) };
                vec![high, low]
            }
            "DE" => {
                if date >= DE_COVID_CUT_FROM && date < DE_COVID_CUT_UNTIL {
                    vec![dec!(16), dec!(5)]
                } else {
                    vec![dec!(19), dec!(7)]
                }
            }
            "BE" => vec![dec!(21), dec!(12), dec!(6)],
            "FR" => {
                let high = if date >= FR_HIGH_20_FROM { dec!(20) } else { dec!(19.6) };
                vec![high, dec!(10), dec!(5.5), dec!(2.1)]
            }
            "AT" => vec![dec!(20), dec!(13), dec!(10)],
            "ES" => vec![dec!(21), dec!(10), dec!(4)],
            "IT" => vec![dec!(22), dec!(10), dec!(5), dec!(4)],
            "LU" => vec![dec!(17), dec!(14), dec!(8), dec!(3)],
            other => return Err(RateLookupError::Unsupported(other.to_string())),
        };
        rates.push(Decimal::ZERO);
        Ok(rates)
    }
}
