//! Line-level completion: fill required numeric fields, correct imprecise
//! calculated rates against the legally possible set, and hand what cannot
//! be inferred per line to the strategy resolver.

use rust_decimal::Decimal;

use crate::core::{
    codes, EXEMPT_RATE, Invoice, Line, MessageSink, ShopConfig, VatRateSource,
};
use crate::money;
use crate::rates::{distinct_rate_values, VatRateCandidate};

use super::flatten;

/// Outcome of matching a calculated-rate window against the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMatch {
    /// Exactly one candidate value falls within the window.
    Unique(Decimal),
    /// No candidate value falls within the window.
    None,
    /// Multiple different candidate values fall within the window.
    Multiple,
}

/// Match a `[min, max]` rate window against the candidate rates.
///
/// Pure function of its inputs: candidates of different types sharing the
/// same value count as one match (the engine cannot distinguish same-valued
/// rates of different jurisdictions without additional signal).
pub fn correct_vat_rate_by_range(
    min: Decimal,
    max: Decimal,
    candidates: &[VatRateCandidate],
) -> RangeMatch {
    let matching: Vec<Decimal> = distinct_rate_values(candidates)
        .into_iter()
        .filter(|v| min <= *v && *v <= max)
        .collect();
    match matching[..] {
        [] => RangeMatch::None,
        [value] => RangeMatch::Unique(value),
        _ => RangeMatch::Multiple,
    }
}

/// Run the full line-level completion sequence over the invoice.
///
/// The first steps see the line hierarchy; the list is flattened once the
/// per-line inference that benefits from parent/child context has run.
pub fn complete_lines(
    invoice: &mut Invoice,
    candidates: &[VatRateCandidate],
    config: &ShopConfig,
    sink: &mut MessageSink,
) {
    convert_to_home_currency(invoice);
    correct_calculated_vat_rates(&mut invoice.lines, candidates, config, sink);
    add_vat_rate_to_lookup_lines(&mut invoice.lines, candidates);
    for line in &mut invoice.lines {
        complete_line_required_data(line, config);
    }
    // Newly-filled unit prices may now yield matchable calculated rates.
    correct_calculated_vat_rates(&mut invoice.lines, candidates, config, sink);

    invoice.lines = flatten::flatten(std::mem::take(&mut invoice.lines), config);

    add_vat_rate_to_0price_lines(&mut invoice.lines);
    recalculate_line_data(&mut invoice.lines);
    complete_line_meta_data(&mut invoice.lines);
}

/// One-time conversion of every monetary field into the administration's
/// home currency.
fn convert_to_home_currency(invoice: &mut Invoice) {
    let Some(currency) = &mut invoice.currency else {
        return;
    };
    if !currency.convert || currency.rate <= Decimal::ZERO || currency.rate == Decimal::ONE {
        currency.convert = false;
        return;
    }
    let rate = currency.rate;
    currency.convert = false;

    for total in [
        &mut invoice.amount,
        &mut invoice.amount_inc,
        &mut invoice.vat_amount,
    ] {
        if let Some(value) = total {
            *value *= rate;
        }
    }
    walk_lines_mut(&mut invoice.lines, &mut |line| {
        for amount in [
            &mut line.unit_price,
            &mut line.unit_price_inc,
            &mut line.vat_amount,
            &mut line.cost_price,
            &mut line.discount_amount_inc,
            &mut line.discount_vat_amount,
            &mut line.original_unit_price,
        ] {
            if let Some(value) = amount {
                *value *= rate;
            }
        }
    });
}

fn walk_lines_mut(lines: &mut [Line], f: &mut impl FnMut(&mut Line)) {
    for line in lines {
        f(line);
        walk_lines_mut(&mut line.children, f);
    }
}

/// Correct every calculated (hence imprecise) rate by matching its
/// precision window against the candidate set.
pub(crate) fn correct_calculated_vat_rates(
    lines: &mut [Line],
    candidates: &[VatRateCandidate],
    config: &ShopConfig,
    sink: &mut MessageSink,
) {
    walk_lines_mut(lines, &mut |line| {
        if line.vat_rate_source != VatRateSource::Calculated {
            return;
        }
        let Some((min, max)) = rate_window(line, config) else {
            return;
        };
        match correct_vat_rate_by_range(min, max, candidates) {
            RangeMatch::Unique(rate) => {
                line.vat_rate = Some(rate);
                line.vat_rate_source = VatRateSource::CalculatedCorrected;
                line.vat_rate_min = None;
                line.vat_rate_max = None;
            }
            RangeMatch::Multiple => {
                // Ambiguous: defer to the later completion steps.
                line.vat_rate = None;
                line.vat_rate_source = VatRateSource::CompletorProvided;
                line.vat_rate_min = None;
                line.vat_rate_max = None;
            }
            RangeMatch::None => {
                line.vat_rate = None;
                line.vat_rate_min = None;
                line.vat_rate_max = None;
                if line.splittable {
                    line.vat_rate_source = VatRateSource::StrategyPending;
                } else {
                    sink.warning(
                        codes::LINE_RATE_UNRESOLVED,
                        format!(
                            "line '{}': calculated vat rate window [{min}, {max}] matches no \
                             legally possible rate",
                            line.description.trim()
                        ),
                    );
                }
            }
        }
    });
}

/// The `[min, max]` window of a calculated rate, in percentage points.
///
/// Uses the creator-provided bounds when present, otherwise re-derives them
/// from the amounts the rate was computed from.
fn rate_window(line: &Line, config: &ShopConfig) -> Option<(Decimal, Decimal)> {
    if let (Some(min), Some(max)) = (line.vat_rate_min, line.vat_rate_max) {
        return Some((min, max));
    }
    // A cleared rate means an earlier pass already found no match.
    line.vat_rate?;
    let vat = line.vat_amount?;
    let ex = line.unit_price?;
    if ex.is_zero() {
        return None;
    }
    let range = money::division_range(vat, ex, config.amount_precision, config.amount_precision)
        .ok()?;
    Some((
        range.min * Decimal::ONE_HUNDRED,
        range.max * Decimal::ONE_HUNDRED,
    ))
}

/// Promote product-level historical rates, but only when still legally
/// valid on the invoice date (tax law may have changed since the product
/// was last priced).
fn add_vat_rate_to_lookup_lines(lines: &mut [Line], candidates: &[VatRateCandidate]) {
    let values = distinct_rate_values(candidates);
    walk_lines_mut(lines, &mut |line| {
        if !line.vat_rate_source.is_provisional() || line.vat_rate.is_some() {
            return;
        }
        let Some(lookup) = line.vat_rate_lookup else {
            return;
        };
        if values.contains(&lookup.round_dp(3)) {
            line.vat_rate = Some(lookup.round_dp(3));
            line.vat_rate_source = VatRateSource::LookedUp;
            line.vat_rate_min = None;
            line.vat_rate_max = None;
        } else if line.splittable {
            line.vat_rate_source = VatRateSource::StrategyPending;
        }
    });
}

/// Fill the required numeric fields per line from whatever two of
/// (excl, incl, vat, rate) are present. Children are completed before
/// their parent so a resolved child rate can seed the parent.
fn complete_line_required_data(line: &mut Line, config: &ShopConfig) {
    for child in &mut line.children {
        complete_line_required_data(child, config);
    }

    // Margin-scheme lines are entered tax-inclusive; by definition the
    // "excl" unit price equals the inclusive one.
    if line.is_margin() {
        match (line.unit_price, line.unit_price_inc) {
            (Some(_), None) => line.unit_price_inc = line.unit_price,
            (None, Some(_)) => line.unit_price = line.unit_price_inc,
            _ => {}
        }
    }

    if let Ok(done) = money::reconcile(
        line.unit_price,
        line.unit_price_inc,
        line.vat_amount,
        rate_fraction(line),
    ) {
        line.unit_price.get_or_insert(done.amount_ex);
        line.unit_price_inc.get_or_insert(done.amount_inc);
        line.vat_amount.get_or_insert(done.vat_amount);
    }

    // With both amounts now known the rate is computable, if imprecise.
    if line.vat_rate.is_none()
        && line.vat_rate_source == VatRateSource::CompletorProvided
    {
        if let (Some(ex), Some(vat)) = (line.unit_price, line.vat_amount) {
            if !ex.is_zero() {
                if let Ok(range) = money::division_range(
                    vat,
                    ex,
                    config.amount_precision,
                    config.amount_precision,
                ) {
                    line.vat_rate = Some(range.calculated * Decimal::ONE_HUNDRED);
                    line.vat_rate_min = Some(range.min * Decimal::ONE_HUNDRED);
                    line.vat_rate_max = Some(range.max * Decimal::ONE_HUNDRED);
                    line.vat_rate_source = VatRateSource::Calculated;
                }
            }
        }
    }

    seed_rates_between_parent_and_children(line);
}

fn seed_rates_between_parent_and_children(line: &mut Line) {
    if line.children.is_empty() {
        return;
    }

    if line.vat_rate.is_none() {
        let mut rates: Vec<Decimal> = line
            .children
            .iter()
            .filter(|c| c.vat_rate_source.is_correct())
            .filter_map(|c| c.vat_rate)
            .map(|r| r.round_dp(3))
            .collect();
        rates.sort();
        rates.dedup();
        if let [rate] = rates[..] {
            line.vat_rate = Some(rate);
            line.vat_rate_source = VatRateSource::CopiedFromChildren;
        }
    }

    if line.vat_rate.is_some() && line.vat_rate_source.is_correct() {
        let parent_rate = line.vat_rate;
        for child in &mut line.children {
            let zero_priced = child.unit_price.unwrap_or(Decimal::ZERO).is_zero()
                && child.unit_price_inc.unwrap_or(Decimal::ZERO).is_zero();
            if child.vat_rate.is_none() && zero_priced {
                child.vat_rate = parent_rate;
                child.vat_rate_source = VatRateSource::CopiedFromParent;
            }
        }
    }
}

/// Zero-priced lines still awaiting a rate get the maximum rate appearing
/// elsewhere on the invoice: for free promotional items the highest rate is
/// statistically likelier correct than the average.
fn add_vat_rate_to_0price_lines(lines: &mut [Line]) {
    let max_rate = lines
        .iter()
        .filter(|l| l.vat_rate_source.is_correct())
        .filter_map(|l| l.vat_rate)
        .filter(|r| *r >= Decimal::ZERO)
        .max();

    for line in lines.iter_mut() {
        if line.vat_rate_source != VatRateSource::CompletorProvided || !zero_priced(line) {
            continue;
        }
        match max_rate {
            Some(rate) => {
                line.vat_rate = Some(rate);
                line.vat_rate_source = VatRateSource::CompletorCompleted;
                line.unit_price.get_or_insert(Decimal::ZERO);
                line.unit_price_inc.get_or_insert(Decimal::ZERO);
                line.vat_amount.get_or_insert(Decimal::ZERO);
            }
            None => line.vat_rate_source = VatRateSource::StrategyPending,
        }
    }
}

fn zero_priced(line: &Line) -> bool {
    match (line.unit_price, line.unit_price_inc) {
        (Some(ex), _) => ex.is_zero(),
        (None, Some(inc)) => inc.is_zero(),
        (None, None) => false,
    }
}

/// Recompute prices the shop derived with cent rounding, now that the rate
/// is trusted.
fn recalculate_line_data(lines: &mut [Line]) {
    for line in lines {
        if !line.recalculate_price
            || !line.vat_rate_source.is_correct()
        {
            continue;
        }
        let (Some(inc), Some(rate)) = (line.unit_price_inc, line.vat_rate) else {
            continue;
        };
        let divisor = Decimal::ONE + positive_or_zero(rate) / Decimal::ONE_HUNDRED;
        line.original_unit_price = line.unit_price;
        let ex = inc / divisor;
        line.unit_price = Some(ex);
        line.vat_amount = Some(inc - ex);
        line.recalculate_price = false;
    }
}

/// Fill remaining derivable fields on lines whose rate is trusted.
fn complete_line_meta_data(lines: &mut [Line]) {
    for line in lines {
        if !line.vat_rate_source.is_correct() {
            continue;
        }
        if let Ok(done) = money::reconcile(
            line.unit_price,
            line.unit_price_inc,
            line.vat_amount,
            rate_fraction(line),
        ) {
            line.unit_price.get_or_insert(done.amount_ex);
            line.unit_price_inc.get_or_insert(done.amount_inc);
            line.vat_amount.get_or_insert(done.vat_amount);
        }
        if line.discount_amount_inc.is_none() {
            if let (Some(discount_vat), Some(rate)) = (line.discount_vat_amount, line.vat_rate) {
                if rate > Decimal::ZERO {
                    line.discount_amount_inc =
                        Some(discount_vat * (Decimal::ONE_HUNDRED + rate) / rate);
                }
            }
        }
    }
}

/// The line's rate as a reconciler fraction; the exempt sentinel computes
/// as 0%.
fn rate_fraction(line: &Line) -> Option<Decimal> {
    line.vat_rate
        .map(|r| positive_or_zero(r) / Decimal::ONE_HUNDRED)
}

fn positive_or_zero(rate: Decimal) -> Decimal {
    if rate == EXEMPT_RATE || rate.is_sign_negative() {
        Decimal::ZERO
    } else {
        rate
    }
}
