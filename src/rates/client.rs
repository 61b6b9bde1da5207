//! HTTP-backed rate lookup against a public EU VAT rates API.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{RateLookupError, RateSource};

const RATES_URL: &str = "https://jsonvat.com/";

/// Rate lookup via the jsonvat.com EU rates dataset.
///
/// The call is blocking: the engine is synchronous and the lookup is its
/// only suspension point. The full dataset is fetched per call; callers
/// that complete many invoices should wrap this in their own cache.
#[derive(Debug, Clone)]
pub struct HttpRates {
    url: String,
    timeout: std::time::Duration,
}

impl Default for HttpRates {
    fn default() -> Self {
        Self {
            url: RATES_URL.to_string(),
            timeout: std::time::Duration::from_secs(30),
        }
    }
}

impl HttpRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the client at a different endpoint (e.g. a mirror or a test
    /// server serving the same JSON shape).
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    fn fetch(&self) -> Result<RatesDocument, RateLookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| RateLookupError::Network(e.to_string()))?;

        let resp = client
            .get(&self.url)
            .send()
            .map_err(|e| RateLookupError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| RateLookupError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(RateLookupError::Api(format!("HTTP {status}: {body}")));
        }

        serde_json::from_str(&body).map_err(|e| RateLookupError::Parse(e.to_string()))
    }
}

/// jsonvat.com response document.
#[derive(Debug, Deserialize)]
struct RatesDocument {
    rates: Vec<CountryRates>,
}

#[derive(Debug, Deserialize)]
struct CountryRates {
    country_code: String,
    periods: Vec<RatePeriod>,
}

#[derive(Debug, Deserialize)]
struct RatePeriod {
    effective_from: String,
    rates: PeriodRates,
}

#[derive(Debug, Deserialize)]
struct PeriodRates {
    standard: Option<Decimal>,
    reduced: Option<Decimal>,
    super_reduced: Option<Decimal>,
    parking: Option<Decimal>,
}

impl RateSource for HttpRates {
    fn rates_on(&self, country_code: &str, date: NaiveDate) -> Result<Vec<Decimal>, RateLookupError> {
        let document = self.fetch()?;
        let wanted = country_code.to_uppercase();

        let country = document
            .rates
            .iter()
            .find(|c| c.country_code.eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| RateLookupError::Unsupported(wanted.clone()))?;

        // Periods are effective-from dated; pick the latest one that had
        // started on the invoice date.
        let period = country
            .periods
            .iter()
            .filter_map(|p| {
                NaiveDate::parse_from_str(&p.effective_from, "%Y-%m-%d")
                    .ok()
                    .filter(|from| *from <= date)
                    .map(|from| (from, p))
            })
            .max_by_key(|(from, _)| *from)
            .map(|(_, p)| p)
            .ok_or_else(|| {
                RateLookupError::Api(format!("no rate period for {wanted} on {date}"))
            })?;

        let mut rates: Vec<Decimal> = [
            period.rates.standard,
            period.rates.reduced,
            period.rates.super_reduced,
            period.rates.parking,
        ]
        .into_iter()
        .flatten()
        .collect();
        rates.push(Decimal::ZERO);
        rates.dedup();
        Ok(rates)
    }
}
