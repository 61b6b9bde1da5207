//! Brute-force search over all candidate-rate assignments.

use rust_decimal::Decimal;

use crate::core::{Line, TOTALS_TOLERANCE};
use crate::rates::distinct_rate_values;

use super::{CompletorStrategy, StrategyInput, StrategyOutcome, resolve_line_at_rate};

/// Upper bound on `rate_values ^ pending_lines`: above this the search
/// space is judged too large and the strategy reports not-applicable
/// instead of hanging. 4096 covers any realistic order (e.g. 4 rates over
/// 6 lines) at negligible cost.
pub const MAX_PERMUTATIONS: u64 = 4096;

/// Last resort: try every combination of one candidate rate per pending
/// line and accept the first whose total VAT reconciles with the
/// remainder. Rates are tried highest-first, so ties resolve toward the
/// higher rate, consistent with the zero-priced-line policy.
pub struct TryAllVatRatePermutations;

fn search_space(values: usize, lines: usize) -> Option<u64> {
    let lines = u32::try_from(lines).ok()?;
    (values as u64).checked_pow(lines)
}

impl CompletorStrategy for TryAllVatRatePermutations {
    fn name(&self) -> &'static str {
        "try-all-vat-rate-permutations"
    }

    fn applies(&self, input: &StrategyInput<'_>) -> bool {
        let values = distinct_rate_values(input.candidates);
        if values.is_empty() || input.pending.is_empty() {
            return false;
        }
        matches!(
            search_space(values.len(), input.pending.len()),
            Some(combinations) if combinations <= MAX_PERMUTATIONS
        )
    }

    fn try_resolve(&self, input: &StrategyInput<'_>) -> Option<StrategyOutcome> {
        let values = distinct_rate_values(input.candidates);
        let n = input.pending.len();

        // Odometer over the assignment (one value index per line).
        let mut assignment = vec![0usize; n];
        loop {
            if let Some(replacements) = evaluate(input, &values, &assignment) {
                return Some(StrategyOutcome {
                    resolved: (0..n).collect(),
                    replacements,
                });
            }

            let mut position = 0;
            loop {
                if position == n {
                    return None;
                }
                assignment[position] += 1;
                if assignment[position] < values.len() {
                    break;
                }
                assignment[position] = 0;
                position += 1;
            }
        }
    }
}

fn evaluate(
    input: &StrategyInput<'_>,
    values: &[Decimal],
    assignment: &[usize],
) -> Option<Vec<Line>> {
    let mut replacements = Vec::with_capacity(assignment.len());
    let mut vat_sum = Decimal::ZERO;
    for (line, &value_idx) in input.pending.iter().zip(assignment) {
        let resolved = resolve_line_at_rate(line, values[value_idx])?;
        vat_sum += resolved.total_vat().unwrap_or(Decimal::ZERO);
        replacements.push(resolved);
    }
    ((vat_sum - input.vat_to_divide).abs() <= TOTALS_TOLERANCE).then_some(replacements)
}
