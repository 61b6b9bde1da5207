//! Tax-type enumeration and classification.
//!
//! Before line completion the engine enumerates which tax regimes could
//! apply at all (a decision table over customer region, business status,
//! shop capabilities, and what the lines look like) and expands them to
//! the legally valid rate set. After completion, the line rates narrow the
//! candidates down to the one regime the invoice is filed under.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::core::{
    EXEMPT_RATE, Invoice, Line, MessageSink, ShopConfig, VatType, codes,
};
use crate::rates::{RateSource, VatRateCandidate, is_eu_country, ymd};

/// Since this date, digital services to EU consumers are taxed in the
/// consumer's country (the MOSS regime).
pub const DIGITAL_SERVICES_REGIME_FROM: NaiveDate = ymd(2015, 1, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Home,
    Eu,
    World,
}

fn region_of(customer_country: &str, home_country: &str) -> Region {
    let cc = customer_country.to_uppercase();
    if cc == home_country.to_uppercase() {
        Region::Home
    } else if is_eu_country(&cc) {
        Region::Eu
    } else {
        Region::World
    }
}

#[derive(Debug, Default)]
struct LineSignals {
    has_positive_rate: bool,
    has_zero_rate: bool,
    has_unknown_rate: bool,
    has_cost_price: bool,
}

fn collect_signals(lines: &[Line], signals: &mut LineSignals) {
    for line in lines {
        match line.vat_rate {
            Some(rate) if rate > Decimal::ZERO => signals.has_positive_rate = true,
            Some(_) => signals.has_zero_rate = true,
            None => signals.has_unknown_rate = true,
        }
        if line.cost_price.is_some() {
            signals.has_cost_price = true;
        }
        collect_signals(&line.children, signals);
    }
}

/// Enumerate the tax types that could apply to this invoice, in preference
/// order. An empty table outcome falls back to a safe default pair and
/// flags the invoice as concept.
pub(crate) fn init_possible_vat_types(
    invoice: &mut Invoice,
    config: &ShopConfig,
    sink: &mut MessageSink,
) -> Vec<VatType> {
    let region = region_of(&invoice.customer.country_code, &config.country_code);
    let business = invoice.customer.is_business();
    let mut signals = LineSignals::default();
    collect_signals(&invoice.lines, &mut signals);

    // A margin shop with cost-priced lines is selling under the scheme;
    // prefer it over plain national VAT.
    let margin_first = config.sells_margin_goods && signals.has_cost_price;

    let mut types = Vec::new();
    match region {
        Region::Home => {
            if margin_first {
                types.push(VatType::MarginScheme);
            }
            types.push(VatType::National);
            if config.national_reversed
                && business
                && (signals.has_zero_rate || signals.has_unknown_rate)
            {
                types.push(VatType::NationalReversed);
            }
            if config.sells_margin_goods && !margin_first {
                types.push(VatType::MarginScheme);
            }
        }
        Region::Eu => {
            if margin_first {
                types.push(VatType::MarginScheme);
            }
            if signals.has_positive_rate || signals.has_unknown_rate {
                types.push(VatType::National);
            }
            if business && (signals.has_zero_rate || signals.has_unknown_rate) {
                types.push(VatType::EuReversed);
            }
            if !business
                && config.sells_digital_services
                && invoice.issue_date >= DIGITAL_SERVICES_REGIME_FROM
            {
                types.push(VatType::ForeignVat);
            }
            if config.sells_margin_goods && !margin_first {
                types.push(VatType::MarginScheme);
            }
        }
        Region::World => {
            types.push(VatType::RestOfWorld);
            // Services performed at home remain home-taxed even for
            // overseas customers.
            if signals.has_positive_rate {
                types.push(VatType::National);
            }
        }
    }

    if types.is_empty() {
        sink.warning(
            codes::NO_VAT_TYPES,
            "no tax type matches this invoice; falling back to national/EU-reversed",
        );
        invoice.concept = true;
        types = vec![VatType::National, VatType::EuReversed];
    }
    types
}

/// Expand each candidate type to its legally valid rate set.
///
/// A lookup failure is recorded and that type simply contributes no rates:
/// downstream steps fall back to their empty-result branches.
pub(crate) fn possible_vat_rates(
    types: &[VatType],
    invoice: &Invoice,
    config: &ShopConfig,
    rates: &dyn RateSource,
    sink: &mut MessageSink,
) -> Vec<VatRateCandidate> {
    let mut candidates = Vec::new();
    let mut home_rates: Option<Vec<Decimal>> = None;

    for &vat_type in types {
        match vat_type {
            VatType::National | VatType::MarginScheme => {
                let fetched = home_rates.get_or_insert_with(|| {
                    fetch_rates(rates, &config.country_code, invoice.issue_date, sink)
                });
                for &rate in fetched.iter() {
                    candidates.push(VatRateCandidate { vat_type, rate });
                }
                if vat_type == VatType::National && config.sells_vat_free {
                    candidates.push(VatRateCandidate {
                        vat_type,
                        rate: EXEMPT_RATE,
                    });
                }
            }
            VatType::NationalReversed | VatType::EuReversed => {
                candidates.push(VatRateCandidate {
                    vat_type,
                    rate: Decimal::ZERO,
                });
            }
            VatType::RestOfWorld => {
                candidates.push(VatRateCandidate {
                    vat_type,
                    rate: EXEMPT_RATE,
                });
            }
            VatType::ForeignVat => {
                for rate in fetch_rates(
                    rates,
                    &invoice.customer.country_code,
                    invoice.issue_date,
                    sink,
                ) {
                    candidates.push(VatRateCandidate { vat_type, rate });
                }
            }
        }
    }
    candidates
}

fn fetch_rates(
    rates: &dyn RateSource,
    country: &str,
    date: NaiveDate,
    sink: &mut MessageSink,
) -> Vec<Decimal> {
    match rates.rates_on(country, date) {
        Ok(rates) => rates,
        Err(err) => {
            sink.warning_tagged(codes::RATE_LOOKUP_FAILED, "lookup", err.to_string());
            Vec::new()
        }
    }
}

/// Classify the invoice's tax type from the rates its lines ended up with.
pub(crate) fn complete_vat_type(
    invoice: &mut Invoice,
    initial_types: &[VatType],
    candidates: &[VatRateCandidate],
    sink: &mut MessageSink,
) {
    let per_line: Vec<Vec<VatType>> = invoice
        .lines
        .iter()
        .filter(|l| l.vat_rate_source.is_correct())
        .filter_map(|l| l.vat_rate)
        .map(|rate| possible_types_for_rate(rate, candidates))
        .collect();

    // Union across lines, preserving candidate order.
    let mut union: Vec<VatType> = Vec::new();
    for types in &per_line {
        for t in types {
            if !union.contains(t) {
                union.push(*t);
            }
        }
    }

    match union.len() {
        0 => {
            invoice.vat_type = initial_types.first().copied();
            invoice.concept = true;
            sink.warning(
                codes::VAT_TYPE_UNDETERMINED,
                "no tax type is consistent with the line rates; adopted the first candidate",
            );
        }
        1 => {
            // Fully determined.
            invoice.vat_type = Some(union[0]);
        }
        _ => {
            let intersection: Vec<VatType> = union
                .iter()
                .copied()
                .filter(|t| per_line.iter().all(|set| set.contains(t)))
                .collect();
            if let Some(&first) = intersection.first() {
                invoice.vat_type = Some(first);
                invoice.concept = true;
                sink.warning(
                    codes::VAT_TYPE_MAY_SPLIT,
                    format!(
                        "multiple tax types fit this invoice; adopted type {}; it may need \
                         splitting",
                        first.code()
                    ),
                );
            } else {
                invoice.vat_type = Some(union[0]);
                invoice.concept = true;
                sink.warning(
                    codes::VAT_TYPE_MUST_SPLIT,
                    "the lines mix incompatible tax regimes; the invoice must be split",
                );
            }
        }
    }
}

/// The candidate types consistent with one line rate.
///
/// Positive rates match on the exact value. Zero and exempt line rates
/// both mean "no VAT charged" and match every candidate type that supports
/// either encoding; the zero-vs-exempt distinction is corrected after
/// classification.
fn possible_types_for_rate(rate: Decimal, candidates: &[VatRateCandidate]) -> Vec<VatType> {
    let key = rate.round_dp(3);
    let mut types = Vec::new();
    for candidate in candidates {
        let matches = if key <= Decimal::ZERO {
            candidate.rate <= Decimal::ZERO
        } else {
            candidate.rate.round_dp(3) == key
        };
        if matches && !types.contains(&candidate.vat_type) {
            types.push(candidate.vat_type);
        }
    }
    types
}
