//! Tests for the strategy resolver: priority order, partial solutions,
//! and the resolution report.

use chrono::NaiveDate;
use factuur::core::*;
use factuur::rates::VatRateCandidate;
use factuur::strategy::{self, AttemptResult, VatBreakdown};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn candidates() -> Vec<VatRateCandidate> {
    vec![
        VatRateCandidate {
            vat_type: VatType::National,
            rate: dec!(21),
        },
        VatRateCandidate {
            vat_type: VatType::National,
            rate: dec!(9),
        },
        VatRateCandidate {
            vat_type: VatType::National,
            rate: dec!(0),
        },
    ]
}

fn correct_line(ex: Decimal, rate: Decimal) -> Line {
    let vat = ex * rate / dec!(100);
    Line {
        description: "Artikel".into(),
        unit_price: Some(ex),
        unit_price_inc: Some(ex + vat),
        vat_amount: Some(vat),
        vat_rate: Some(rate),
        vat_rate_source: VatRateSource::Exact,
        ..Line::default()
    }
}

fn pending_line(description: &str, ex: Decimal) -> Line {
    Line {
        description: description.into(),
        unit_price: Some(ex),
        vat_rate_source: VatRateSource::StrategyPending,
        splittable: true,
        ..Line::default()
    }
}

fn invoice_with_vat_total(lines: Vec<Line>, vat_total: Decimal) -> Invoice {
    let mut inv = Invoice::new(
        Customer {
            country_code: "NL".into(),
            ..Customer::default()
        },
        date(),
    );
    inv.lines = lines;
    inv.vat_amount = Some(vat_total);
    inv
}

#[test]
fn vat_to_divide_subtracts_accounted_vat() {
    let inv = invoice_with_vat_total(
        vec![
            correct_line(dec!(100), dec!(21)),
            pending_line("Open", dec!(50)),
        ],
        dec!(25.50),
    );
    assert_eq!(strategy::vat_to_divide(&inv), Some(dec!(4.50)));
}

#[test]
fn same_rate_wins_over_permutations() {
    // Both apply-same-vat-rate and the permutation search would solve
    // this; the priority order must pick apply-same-vat-rate.
    let mut inv = invoice_with_vat_total(
        vec![
            correct_line(dec!(100), dec!(21)),
            pending_line("Verzending", dec!(10)),
            pending_line("Betaalkosten", dec!(2)),
        ],
        dec!(23.52),
    );
    let report = strategy::resolve(&mut inv, &candidates());

    let applied: Vec<&str> = report
        .attempted
        .iter()
        .filter(|a| matches!(a.result, AttemptResult::Applied(_)))
        .map(|a| a.strategy)
        .collect();
    assert_eq!(applied, vec!["apply-same-vat-rate"]);
    assert!(
        !report
            .attempted
            .iter()
            .any(|a| a.strategy == "try-all-vat-rate-permutations"),
        "permutations must not run once the invoice is resolved"
    );
    assert_eq!(report.unresolved, 0);
    for line in &inv.lines {
        assert_eq!(line.vat_rate, Some(dec!(21)));
    }
}

#[test]
fn permutations_used_when_same_rate_fails() {
    // Breakdown holds a single rate (9) but applying it to everything
    // does not reconcile; the permutation search finds 21/9.
    let mut inv = invoice_with_vat_total(
        vec![
            correct_line(dec!(10), dec!(9)),
            pending_line("Open A", dec!(100)),
            pending_line("Open B", dec!(50)),
        ],
        dec!(26.40),
    );
    let report = strategy::resolve(&mut inv, &candidates());

    let outcomes: Vec<(&str, AttemptResult)> = report
        .attempted
        .iter()
        .map(|a| (a.strategy, a.result))
        .collect();
    assert!(outcomes.contains(&("apply-same-vat-rate", AttemptResult::Failed)));
    assert!(outcomes.contains(&("try-all-vat-rate-permutations", AttemptResult::Applied(2))));
    assert_eq!(report.unresolved, 0);

    let a = inv.lines.iter().find(|l| l.description == "Open A").unwrap();
    let b = inv.lines.iter().find(|l| l.description == "Open B").unwrap();
    assert_eq!(a.vat_rate, Some(dec!(21)));
    assert_eq!(b.vat_rate, Some(dec!(9)));
    for line in &inv.lines {
        assert!(line.vat_rate_source.is_correct());
    }
}

#[test]
fn partial_solution_chains_strategies() {
    // The discount line resolves by its known pair; the remaining line is
    // then the single non-matching line and resolves algebraically.
    let discount = Line {
        description: "Korting".into(),
        line_type: LineType::Discount,
        vat_rate_source: VatRateSource::StrategyPending,
        splittable: true,
        discount_amount_inc: Some(dec!(-12.10)),
        discount_vat_amount: Some(dec!(-2.10)),
        ..Line::default()
    };
    let mut inv = invoice_with_vat_total(
        vec![
            correct_line(dec!(100), dec!(21)),
            correct_line(dec!(50), dec!(9)),
            discount,
            pending_line("Verzending", dec!(10)),
        ],
        // 21 + 4.50 - 2.10 + 0.90 (shipping at 9%)
        dec!(24.30),
    );
    let report = strategy::resolve(&mut inv, &candidates());

    let outcomes: Vec<(&str, AttemptResult)> = report
        .attempted
        .iter()
        .map(|a| (a.strategy, a.result))
        .collect();
    assert!(outcomes.contains(&("split-known-discount-line", AttemptResult::Applied(1))));
    assert!(outcomes.contains(&("split-non-matching-line", AttemptResult::Applied(1))));
    assert_eq!(report.unresolved, 0);

    let shipping = inv
        .lines
        .iter()
        .find(|l| l.description.contains("Verzending"))
        .unwrap();
    assert_eq!(shipping.vat_rate, Some(dec!(9)));

    let vat_sum: Decimal = inv.lines.iter().filter_map(Line::total_vat).sum();
    assert!((vat_sum - dec!(24.30)).abs() <= dec!(0.05));
}

#[test]
fn replacement_lines_are_appended_and_order_preserved() {
    let mut inv = invoice_with_vat_total(
        vec![
            correct_line(dec!(10), dec!(21)),
            pending_line("Open", dec!(100)),
            correct_line(dec!(20), dec!(21)),
        ],
        dec!(27.30),
    );
    let report = strategy::resolve(&mut inv, &candidates());
    assert_eq!(report.unresolved, 0);
    // The two untouched lines keep their relative order; the resolved
    // line moved to the end.
    assert_eq!(inv.lines[0].unit_price, Some(dec!(10)));
    assert_eq!(inv.lines[1].unit_price, Some(dec!(20)));
    assert_eq!(inv.lines[2].description, "Open");
    assert_eq!(inv.lines[2].vat_rate, Some(dec!(21)));
}

#[test]
fn unsolvable_remainder_reports_all_attempts() {
    let mut inv = invoice_with_vat_total(
        vec![correct_line(dec!(10), dec!(21)), pending_line("Open", dec!(100))],
        // 37.00 of unallocated vat matches no rate and no split.
        dec!(39.10),
    );
    let report = strategy::resolve(&mut inv, &candidates());
    assert_eq!(report.unresolved, 1);
    assert_eq!(report.attempted.len(), 4);
    assert!(report.describe().contains("not applicable"));
    assert!(report.describe().contains("failed"));
    // The pending line is untouched.
    let open = inv.lines.iter().find(|l| l.description == "Open").unwrap();
    assert_eq!(open.vat_rate, None);
    assert_eq!(open.vat_rate_source, VatRateSource::StrategyPending);
}

#[test]
fn breakdown_keys_rates_at_three_decimals() {
    let lines = vec![
        correct_line(dec!(100), dec!(21.0001)),
        correct_line(dec!(50), dec!(21.0002)),
    ];
    let breakdown = VatBreakdown::compute(&lines);
    // Both rates collapse onto the same 3-decimal key.
    assert_eq!(breakdown.distinct_rates(), vec![dec!(21.000)]);
    assert_eq!(breakdown.entry(dec!(21)).unwrap().count, 2);
}
