//! Invoice-level totals reconciliation and the missing-amount correction.

use rust_decimal::Decimal;

use crate::core::{
    Invoice, Line, LineType, MessageSink, ShopConfig, TOTALS_TOLERANCE, VatRateSource, codes,
};
use crate::money;
use crate::rates::VatRateCandidate;

use super::lines::correct_calculated_vat_rates;

/// How one invoice-level total compares to the corresponding line sum.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TotalState {
    /// Both sides known and within tolerance.
    Equal,
    /// Both sides known; holds `invoice total - line sum`.
    Differs(Decimal),
    /// The invoice total is missing or some contributing line lacked the
    /// needed field.
    Incomplete,
}

#[derive(Debug, Default, Clone, Copy)]
struct LineSums {
    ex: Decimal,
    ex_complete: bool,
    inc: Decimal,
    inc_complete: bool,
    vat: Decimal,
    vat_complete: bool,
}

fn line_sums(lines: &[Line]) -> LineSums {
    let mut sums = LineSums {
        ex_complete: true,
        inc_complete: true,
        vat_complete: true,
        ..LineSums::default()
    };
    for line in lines {
        match line.total_ex() {
            Some(v) => sums.ex += v,
            None => sums.ex_complete = false,
        }
        match line.total_inc() {
            Some(v) => sums.inc += v,
            None => sums.inc_complete = false,
        }
        match line.total_vat() {
            Some(v) => sums.vat += v,
            None => sums.vat_complete = false,
        }
    }
    sums
}

/// Reconcile the invoice totals against the line sums; when they provably
/// differ and enough is known, inject a corrective line so the books
/// balance, flagging the invoice for review.
pub(crate) fn complete_line_totals(
    invoice: &mut Invoice,
    candidates: &[VatRateCandidate],
    config: &ShopConfig,
    sink: &mut MessageSink,
) {
    fill_invoice_totals(invoice);
    let sums = line_sums(&invoice.lines);

    // An absent invoice total is taken over from a complete line sum: the
    // comparison is then trivially equal.
    if invoice.amount.is_none() && sums.ex_complete {
        invoice.amount = Some(sums.ex);
    }
    if invoice.amount_inc.is_none() && sums.inc_complete {
        invoice.amount_inc = Some(sums.inc);
    }
    if invoice.vat_amount.is_none() && sums.vat_complete {
        invoice.vat_amount = Some(sums.vat);
    }
    fill_invoice_totals(invoice);

    let ex_state = compare(invoice.amount, sums.ex, sums.ex_complete);
    let inc_state = compare(invoice.amount_inc, sums.inc, sums.inc_complete);
    let vat_state = compare(invoice.vat_amount, sums.vat, sums.vat_complete);
    let states = [ex_state, inc_state, vat_state];

    if are_totals_equal(&states, invoice.vat_amount) != TotalsComparison::Differ {
        return;
    }

    let incomplete = states
        .iter()
        .filter(|s| matches!(s, TotalState::Incomplete))
        .count();
    if incomplete >= 2 {
        let (name, delta) = single_known_difference(&states);
        invoice.concept = true;
        sink.warning(
            codes::TOTALS_DIFFER,
            format!(
                "the {name} total differs from the line sum by {delta}, but the other totals \
                 are incomplete; no correction is possible"
            ),
        );
        return;
    }

    let delta_ex = delta_of(ex_state);
    let delta_inc = delta_of(inc_state);
    let delta_vat = delta_of(vat_state);
    // At most one delta is unknown; derive it from the other two.
    let delta_vat = delta_vat.unwrap_or_else(|| {
        delta_inc.unwrap_or(Decimal::ZERO) - delta_ex.unwrap_or(Decimal::ZERO)
    });
    let delta_ex =
        delta_ex.unwrap_or_else(|| delta_inc.unwrap_or(Decimal::ZERO) - delta_vat);
    let delta_inc = delta_inc.unwrap_or(delta_ex + delta_vat);

    let label = correction_label(invoice, &sums, delta_inc);
    let mut line = Line {
        description: label.to_string(),
        quantity: Decimal::ONE,
        unit_price: Some(delta_ex),
        unit_price_inc: Some(delta_ex + delta_vat),
        vat_amount: Some(delta_vat),
        line_type: LineType::Corrector,
        splittable: true,
        ..Line::default()
    };

    if delta_ex.is_zero() {
        line.vat_rate_source = VatRateSource::StrategyPending;
    } else if let Ok(range) = money::division_range(
        delta_vat,
        delta_ex,
        config.amount_precision,
        config.amount_precision,
    ) {
        line.vat_rate = Some(range.calculated * Decimal::ONE_HUNDRED);
        line.vat_rate_min = Some(range.min * Decimal::ONE_HUNDRED);
        line.vat_rate_max = Some(range.max * Decimal::ONE_HUNDRED);
        line.vat_rate_source = VatRateSource::Calculated;
        correct_calculated_vat_rates(std::slice::from_mut(&mut line), candidates, config, sink);
    }

    invoice.concept = true;
    sink.warning(
        codes::CORRECTIVE_LINE_ADDED,
        format!("missing amount added: '{label}' of {delta_inc} incl. VAT"),
    );
    invoice.lines.push(line);
}

/// Derive a missing invoice total from the other two.
fn fill_invoice_totals(invoice: &mut Invoice) {
    let known = [invoice.amount, invoice.amount_inc, invoice.vat_amount]
        .iter()
        .flatten()
        .count();
    if known == 2 {
        if let Ok(done) =
            money::reconcile(invoice.amount, invoice.amount_inc, invoice.vat_amount, None)
        {
            invoice.amount.get_or_insert(done.amount_ex);
            invoice.amount_inc.get_or_insert(done.amount_inc);
            invoice.vat_amount.get_or_insert(done.vat_amount);
        }
    }
}

/// Verdict over the three total comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TotalsComparison {
    Equal,
    Differ,
    /// Nothing provably differs, but nothing meaningful matches either;
    /// no correction is attempted.
    Undecided,
}

/// Decide whether invoice totals and line sums agree.
///
/// Any difference wins. With no differences, at least one equality makes
/// the totals equal, UNLESS the only equality is the VAT totals at zero:
/// that could be a genuine zero-tax invoice or an undetectable real
/// mismatch (reversed-charge invoices land here), so it stays undecided.
fn are_totals_equal(states: &[TotalState; 3], vat_total: Option<Decimal>) -> TotalsComparison {
    if states.iter().any(|s| matches!(s, TotalState::Differs(_))) {
        return TotalsComparison::Differ;
    }
    let equal_count = states
        .iter()
        .filter(|s| matches!(s, TotalState::Equal))
        .count();
    if equal_count == 0 {
        return TotalsComparison::Undecided;
    }
    let only_zero_vat_equal = equal_count == 1
        && matches!(states[2], TotalState::Equal)
        && vat_total.unwrap_or(Decimal::ZERO).abs() <= TOTALS_TOLERANCE;
    if only_zero_vat_equal {
        TotalsComparison::Undecided
    } else {
        TotalsComparison::Equal
    }
}

fn compare(total: Option<Decimal>, sum: Decimal, complete: bool) -> TotalState {
    match total {
        Some(total) if complete => {
            let delta = total - sum;
            if delta.abs() <= TOTALS_TOLERANCE {
                TotalState::Equal
            } else {
                TotalState::Differs(delta)
            }
        }
        _ => TotalState::Incomplete,
    }
}

fn delta_of(state: TotalState) -> Option<Decimal> {
    match state {
        TotalState::Equal => Some(Decimal::ZERO),
        TotalState::Differs(delta) => Some(delta),
        TotalState::Incomplete => None,
    }
}

fn single_known_difference(states: &[TotalState; 3]) -> (&'static str, Decimal) {
    let names = ["ex-VAT", "inc-VAT", "VAT"];
    for (state, name) in states.iter().zip(names) {
        if let TotalState::Differs(delta) = state {
            return (name, *delta);
        }
    }
    ("ex-VAT", Decimal::ZERO)
}

/// Label the corrective line by the invoice's direction and the delta's
/// sign.
fn correction_label(invoice: &Invoice, sums: &LineSums, delta_inc: Decimal) -> &'static str {
    if delta_inc.is_sign_negative() {
        let reference = invoice.amount_inc.unwrap_or(sums.inc);
        if reference.is_sign_negative() {
            "Refund adjustment"
        } else {
            "Discount adjustment"
        }
    } else {
        "Fee adjustment"
    }
}
