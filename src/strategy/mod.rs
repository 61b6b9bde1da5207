//! Whole-invoice VAT reconciliation strategies.
//!
//! When per-line inference cannot determine a rate, the resolver divides
//! the unallocated VAT remainder over the pending lines: an explicit,
//! ordered list of strategies is tried in priority order, each declaring
//! its own applicability. The first success wins for the lines it covers;
//! a partial solution leaves the rest to the strategies further down the
//! list. Failure is surfaced to the orchestrator, never thrown.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::core::{EXEMPT_RATE, Invoice, Line, VatRateSource};
use crate::rates::VatRateCandidate;

mod apply_same_rate;
mod permutations;
mod split_known_discount;
mod split_non_matching;

pub use apply_same_rate::ApplySameVatRate;
pub use permutations::{MAX_PERMUTATIONS, TryAllVatRatePermutations};
pub use split_known_discount::SplitKnownDiscountLine;
pub use split_non_matching::SplitNonMatchingLine;

/// Per-rate aggregation over the lines whose rate is already trusted.
///
/// Recomputed per strategy attempt; never persisted.
#[derive(Debug, Clone, Default)]
pub struct VatBreakdown {
    entries: BTreeMap<Decimal, BreakdownEntry>,
}

/// Cumulative amounts for one distinct rate (3-decimal key).
#[derive(Debug, Clone)]
pub struct BreakdownEntry {
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub amount_ex: Decimal,
    pub count: u32,
}

impl VatBreakdown {
    /// Aggregate the "correct" lines of the invoice.
    pub fn compute(lines: &[Line]) -> Self {
        let mut entries: BTreeMap<Decimal, BreakdownEntry> = BTreeMap::new();
        for line in lines {
            if !line.vat_rate_source.is_correct() {
                continue;
            }
            let Some(rate) = line.vat_rate else { continue };
            let key = rate.round_dp(3);
            let entry = entries.entry(key).or_insert(BreakdownEntry {
                vat_rate: key,
                vat_amount: Decimal::ZERO,
                amount_ex: Decimal::ZERO,
                count: 0,
            });
            entry.vat_amount += line.total_vat().unwrap_or(Decimal::ZERO);
            entry.amount_ex += line.total_ex().unwrap_or(Decimal::ZERO);
            entry.count += 1;
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct rates, ascending.
    pub fn distinct_rates(&self) -> Vec<Decimal> {
        self.entries.keys().copied().collect()
    }

    /// The single rate governing all correct lines, if there is one.
    pub fn single_rate(&self) -> Option<Decimal> {
        match self.distinct_rates()[..] {
            [rate] => Some(rate),
            _ => None,
        }
    }

    /// Lowest and highest non-exempt rate, for two-rate splits.
    pub fn rate_span(&self) -> Option<(Decimal, Decimal)> {
        let rates: Vec<Decimal> = self
            .entries
            .keys()
            .copied()
            .filter(|r| *r >= Decimal::ZERO)
            .collect();
        match (rates.first(), rates.last()) {
            (Some(low), Some(high)) if low != high => Some((*low, *high)),
            _ => None,
        }
    }

    pub fn entry(&self, rate: Decimal) -> Option<&BreakdownEntry> {
        self.entries.get(&rate.round_dp(3))
    }
}

/// Ephemeral context for one strategy attempt.
#[derive(Debug)]
pub struct StrategyInput<'a> {
    /// Invoice-level VAT total minus the VAT already accounted for on
    /// trusted lines: the amount the strategy must allocate.
    pub vat_to_divide: Decimal,
    pub breakdown: &'a VatBreakdown,
    /// The lines still needing resolution, in invoice order.
    pub pending: &'a [Line],
    pub candidates: &'a [VatRateCandidate],
}

/// Result of a successful strategy attempt.
#[derive(Debug)]
pub struct StrategyOutcome {
    /// Indices into [`StrategyInput::pending`] this strategy resolved.
    pub resolved: Vec<usize>,
    /// Replacement lines, appended to the invoice in strategy-defined
    /// order.
    pub replacements: Vec<Line>,
}

/// One VAT reconciliation strategy.
pub trait CompletorStrategy {
    fn name(&self) -> &'static str;
    /// Cheap precondition check; an inapplicable strategy is skipped, not
    /// failed.
    fn applies(&self, input: &StrategyInput<'_>) -> bool;
    /// Attempt resolution. `None` means the attempt failed; a partial
    /// outcome is allowed.
    fn try_resolve(&self, input: &StrategyInput<'_>) -> Option<StrategyOutcome>;
}

/// The fixed priority order.
pub fn strategies() -> Vec<Box<dyn CompletorStrategy>> {
    vec![
        Box::new(SplitKnownDiscountLine),
        Box::new(SplitNonMatchingLine),
        Box::new(ApplySameVatRate),
        Box::new(TryAllVatRatePermutations),
    ]
}

/// What happened to one strategy during a resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    /// Preconditions unmet.
    Skipped,
    /// Attempted but did not produce a solution.
    Failed,
    /// Resolved this many pending lines.
    Applied(usize),
}

#[derive(Debug, Clone)]
pub struct StrategyAttempt {
    pub strategy: &'static str,
    pub result: AttemptResult,
}

/// Outcome of a full resolution run, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    pub attempted: Vec<StrategyAttempt>,
    /// Pending lines left after all strategies ran.
    pub unresolved: usize,
}

impl ResolutionReport {
    pub fn describe(&self) -> String {
        self.attempted
            .iter()
            .map(|a| {
                let state = match a.result {
                    AttemptResult::Skipped => "not applicable".to_string(),
                    AttemptResult::Failed => "failed".to_string(),
                    AttemptResult::Applied(n) => format!("resolved {n} line(s)"),
                };
                format!("{}: {}", a.strategy, state)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn pending_indices(invoice: &Invoice) -> Vec<usize> {
    invoice
        .lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.vat_rate_source == VatRateSource::StrategyPending)
        .map(|(i, _)| i)
        .collect()
}

/// The VAT remainder not yet attributable to any trusted line.
pub fn vat_to_divide(invoice: &Invoice) -> Option<Decimal> {
    let total = invoice.vat_amount?;
    let accounted: Decimal = invoice
        .lines
        .iter()
        .filter(|l| l.vat_rate_source.is_correct())
        .filter_map(Line::total_vat)
        .sum();
    Some(total - accounted)
}

/// Run the strategy list over the invoice's pending lines.
///
/// Each strategy sees freshly computed context; replacement lines are
/// appended and the resolved originals removed, preserving the order of
/// the remaining lines.
pub fn resolve(invoice: &mut Invoice, candidates: &[VatRateCandidate]) -> ResolutionReport {
    let mut report = ResolutionReport::default();

    for strategy in strategies() {
        let pending_at = pending_indices(invoice);
        if pending_at.is_empty() {
            break;
        }
        let Some(vat_to_divide) = vat_to_divide(invoice) else {
            break;
        };
        let breakdown = VatBreakdown::compute(&invoice.lines);
        let pending: Vec<Line> = pending_at.iter().map(|&i| invoice.lines[i].clone()).collect();
        let input = StrategyInput {
            vat_to_divide,
            breakdown: &breakdown,
            pending: &pending,
            candidates,
        };

        if !strategy.applies(&input) {
            report.attempted.push(StrategyAttempt {
                strategy: strategy.name(),
                result: AttemptResult::Skipped,
            });
            continue;
        }

        match strategy.try_resolve(&input) {
            Some(outcome) if !outcome.resolved.is_empty() => {
                report.attempted.push(StrategyAttempt {
                    strategy: strategy.name(),
                    result: AttemptResult::Applied(outcome.resolved.len()),
                });
                apply_outcome(invoice, &pending_at, outcome);
            }
            _ => report.attempted.push(StrategyAttempt {
                strategy: strategy.name(),
                result: AttemptResult::Failed,
            }),
        }
    }

    report.unresolved = pending_indices(invoice).len();
    report
}

fn apply_outcome(invoice: &mut Invoice, pending_at: &[usize], outcome: StrategyOutcome) {
    let mut remove: Vec<usize> = outcome.resolved.iter().map(|&i| pending_at[i]).collect();
    remove.sort_unstable();
    for idx in remove.into_iter().rev() {
        invoice.lines.remove(idx);
    }
    for mut line in outcome.replacements {
        line.vat_rate_source = VatRateSource::StrategyCompleted;
        line.vat_rate_min = None;
        line.vat_rate_max = None;
        invoice.lines.push(line);
    }
}

/// Resolve a pending line at the given rate, recomputing its amounts from
/// whichever price is present (the exempt sentinel computes as 0%).
pub(crate) fn resolve_line_at_rate(line: &Line, rate: Decimal) -> Option<Line> {
    let percentage = if rate == EXEMPT_RATE { Decimal::ZERO } else { rate };
    if percentage.is_sign_negative() || percentage >= Decimal::ONE_HUNDRED {
        return None;
    }
    let fraction = percentage / Decimal::ONE_HUNDRED;

    let mut out = line.clone();
    out.vat_rate = Some(rate);
    out.vat_rate_source = VatRateSource::StrategyCompleted;
    out.vat_rate_min = None;
    out.vat_rate_max = None;

    if let Some(ex) = line.unit_price {
        let vat = ex * fraction;
        out.vat_amount = Some(vat);
        out.unit_price_inc = Some(ex + vat);
    } else if let Some(inc) = line.unit_price_inc {
        let ex = inc / (Decimal::ONE + fraction);
        out.unit_price = Some(ex);
        out.vat_amount = Some(inc - ex);
    } else if let Some(vat) = line.vat_amount {
        if fraction.is_zero() {
            return None;
        }
        let ex = vat / fraction;
        out.unit_price = Some(ex);
        out.unit_price_inc = Some(ex + vat);
    } else {
        // No amounts at all: a free line fits any rate.
        out.unit_price = Some(Decimal::ZERO);
        out.unit_price_inc = Some(Decimal::ZERO);
        out.vat_amount = Some(Decimal::ZERO);
    }
    Some(out)
}
