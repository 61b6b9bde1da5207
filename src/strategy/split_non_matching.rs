//! Solve the one remaining line algebraically from the VAT remainder.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::completion::{RangeMatch, correct_vat_rate_by_range};
use crate::core::{Line, TOTALS_TOLERANCE, VatRateSource};
use crate::money;

use super::{CompletorStrategy, StrategyInput, StrategyOutcome};

/// With exactly one pending line, its pre-tax amount and the VAT remainder
/// determine the rate: `rate = vat_to_divide / pre_tax * 100`. The solution
/// is accepted only when it lands on a legally possible rate; otherwise the
/// line is split over the invoice's lowest and highest rates so the books
/// still balance.
pub struct SplitNonMatchingLine;

impl CompletorStrategy for SplitNonMatchingLine {
    fn name(&self) -> &'static str {
        "split-non-matching-line"
    }

    fn applies(&self, input: &StrategyInput<'_>) -> bool {
        match input.pending {
            [line] => {
                !line.quantity.is_zero()
                    && (line.unit_price.is_some() || line.unit_price_inc.is_some())
            }
            _ => false,
        }
    }

    fn try_resolve(&self, input: &StrategyInput<'_>) -> Option<StrategyOutcome> {
        let line = input.pending.first()?;
        let vat = input.vat_to_divide;

        let pre_tax = match line.total_ex() {
            Some(ex) => ex,
            // Inclusive total minus the remainder it must absorb.
            None => line.total_inc()? - vat,
        };
        if pre_tax.is_zero() {
            return None;
        }

        // Amounts are cent-rounded, so solve as a window, not a point.
        let range = money::division_range(vat, pre_tax, dec!(0.01), dec!(0.01)).ok()?;
        let window = (
            range.min * Decimal::ONE_HUNDRED,
            range.max * Decimal::ONE_HUNDRED,
        );
        if let RangeMatch::Unique(rate) = correct_vat_rate_by_range(window.0, window.1, input.candidates)
        {
            let replacement = line_from_totals(line, &line.description, pre_tax, vat, rate);
            return Some(StrategyOutcome {
                resolved: vec![0],
                replacements: vec![replacement],
            });
        }

        // No single rate fits: divide the amount over the invoice's rate
        // span so the line's VAT matches the remainder exactly.
        let (low, high) = input.breakdown.rate_span()?;
        let (low_part, high_part) = money::split_amount_over_2_vat_rates(
            pre_tax,
            vat,
            low / Decimal::ONE_HUNDRED,
            high / Decimal::ONE_HUNDRED,
        )
        .ok()?;
        if !part_within(low_part, pre_tax) || !part_within(high_part, pre_tax) {
            return None;
        }

        let replacements = vec![
            line_from_totals(
                line,
                &format!("{} ({low}%)", line.description),
                low_part,
                low_part * low / Decimal::ONE_HUNDRED,
                low,
            ),
            line_from_totals(
                line,
                &format!("{} ({high}%)", line.description),
                high_part,
                high_part * high / Decimal::ONE_HUNDRED,
                high,
            ),
        ];
        Some(StrategyOutcome {
            resolved: vec![0],
            replacements,
        })
    }
}

/// A split part must not overshoot the amount being divided.
fn part_within(part: Decimal, total: Decimal) -> bool {
    if total.is_sign_negative() {
        total - TOTALS_TOLERANCE <= part && part <= TOTALS_TOLERANCE
    } else {
        -TOTALS_TOLERANCE <= part && part <= total + TOTALS_TOLERANCE
    }
}

/// Build a replacement line carrying the given totals as a single unit.
fn line_from_totals(
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
