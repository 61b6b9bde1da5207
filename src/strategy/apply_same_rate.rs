//! Apply the invoice's single known rate to every pending line.

use rust_decimal::Decimal;

use crate::core::TOTALS_TOLERANCE;

use super::{CompletorStrategy, StrategyInput, StrategyOutcome, resolve_line_at_rate};

/// When one tax rate governs the whole order, the ancillary lines that lack
/// a rate (shipping, fees) almost certainly carry it too. Applicable only
/// while the breakdown holds exactly one distinct rate; accepted only if
/// the result reconciles with the VAT remainder.
pub struct ApplySameVatRate;

impl CompletorStrategy for ApplySameVatRate {
    fn name(&self) -> &'static str {
        "apply-same-vat-rate"
    }

    fn applies(&self, input: &StrategyInput<'_>) -> bool {
        input.breakdown.single_rate().is_some()
    }

    fn try_resolve(&self, input: &StrategyInput<'_>) -> Option<StrategyOutcome> {
        let rate = input.breakdown.single_rate()?;

        let mut replacements = Vec::with_capacity(input.pending.len());
        let mut vat_sum = Decimal::ZERO;
        for line in input.pending {
            let resolved = resolve_line_at_rate(line, rate)?;
            vat_sum += resolved.total_vat().unwrap_or(Decimal::ZERO);
            replacements.push(resolved);
        }

        if (vat_sum - input.vat_to_divide).abs() > TOTALS_TOLERANCE {
            return None;
        }
        Some(StrategyOutcome {
            resolved: (0..input.pending.len()).collect(),
            replacements,
        })
    }
}
