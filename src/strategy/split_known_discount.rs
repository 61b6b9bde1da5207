//! Split discount lines by their known VAT portion.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::completion::{RangeMatch, correct_vat_rate_by_range};
use crate::core::{Line, TOTALS_TOLERANCE, VatRateSource};
use crate::money;

use super::{CompletorStrategy, StrategyInput, StrategyOutcome};

/// A discount line that carries its own (amount incl. VAT, VAT amount)
/// pair needs no guesswork: the pair fixes the rate directly, or, when
/// the discount spans several rates, fixes the two-rate split exactly.
///
/// Resolves only the pending lines that carry the pair; the rest stay for
/// the strategies further down the list.
pub struct SplitKnownDiscountLine;

impl CompletorStrategy for SplitKnownDiscountLine {
    fn name(&self) -> &'static str {
        "split-known-discount-line"
    }

    fn applies(&self, input: &StrategyInput<'_>) -> bool {
        input
            .pending
            .iter()
            .any(|l| l.discount_amount_inc.is_some() && l.discount_vat_amount.is_some())
    }

    fn try_resolve(&self, input: &StrategyInput<'_>) -> Option<StrategyOutcome> {
        let mut resolved = Vec::new();
        let mut replacements = Vec::new();

        for (i, line) in input.pending.iter().enumerate() {
            let (Some(inc), Some(vat)) = (line.discount_amount_inc, line.discount_vat_amount)
            else {
                continue;
            };
            let ex = inc - vat;
            if let Some(lines) = split_discount(line, ex, vat, input) {
                resolved.push(i);
                replacements.extend(lines);
            }
        }

        if resolved.is_empty() {
            None
        } else {
            Some(StrategyOutcome {
                resolved,
                replacements,
            })
        }
    }
}

fn split_discount(
    line: &Line,
    ex: Decimal,
    vat: Decimal,
    input: &StrategyInput<'_>,
) -> Option<Vec<Line>> {
    if ex.is_zero() {
        // A zero discount with zero VAT fits any bookkeeping; nothing to split.
        return vat.is_zero().then(|| {
            vec![replacement(line, &line.description, ex, vat, Decimal::ZERO)]
        });
    }

    // The pair may already pin a single legal rate.
    let range = money::division_range(vat, ex, dec!(0.01), dec!(0.01)).ok()?;
    let window = (
        range.min * Decimal::ONE_HUNDRED,
        range.max * Decimal::ONE_HUNDRED,
    );
    if let RangeMatch::Unique(rate) = correct_vat_rate_by_range(window.0, window.1, input.candidates)
    {
        return Some(vec![replacement(line, &line.description, ex, vat, rate)]);
    }

    // Discount over several rates: the known pair fixes the split exactly.
    let (low, high) = input.breakdown.rate_span()?;
    let (low_part, high_part) = money::split_amount_over_2_vat_rates(
        ex,
        vat,
        low / Decimal::ONE_HUNDRED,
        high / Decimal::ONE_HUNDRED,
    )
    .ok()?;
    if !part_within(low_part, ex) || !part_within(high_part, ex) {
        return None;
    }
    Some(vec![
        replacement(
            line,
            &format!("{} ({low}%)", line.description),
            low_part,
            low_part * low / Decimal::ONE_HUNDRED,
            low,
        ),
        replacement(
            line,
            &format!("{} ({high}%)", line.description),
            high_part,
            high_part * high / Decimal::ONE_HUNDRED,
            high,
        ),
    ])
}

/// Discount amounts are negative; a split part must stay between the total
/// and zero.
fn part_within(part: Decimal, total: Decimal) -> bool {
    if total.is_sign_negative() {
        total - TOTALS_TOLERANCE <= part && part <= TOTALS_TOLERANCE
    } else {
        -TOTALS_TOLERANCE <= part && part <= total + TOTALS_TOLERANCE
    }
}

fn replacement(
    original: &Line,
    description: &str,
    amount_ex: Decimal,
    vat_amount: Decimal,
    rate: Decimal,
) -> Line {
    Line {
        description: description.to_string(),
        quantity: Decimal::ONE,
        unit_price: Some(amount_ex),
        unit_price_inc: Some(amount_ex + vat_amount),
        vat_amount: Some(vat_amount),
        vat_rate: Some(rate),
        vat_rate_source: VatRateSource::StrategyCompleted,
        vat_rate_min: None,
        vat_rate_max: None,
        children: Vec::new(),
        ..original.clone()
    }
}
