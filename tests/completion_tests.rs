//! End-to-end tests for the invoice completion pipeline.

use chrono::NaiveDate;
use factuur::completion::complete;
use factuur::core::*;
use factuur::rates::StaticRates;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn nl_customer() -> Customer {
    Customer {
        first_name: Some("Jan".into()),
        last_name: Some("Jansen".into()),
        address1: Some("Dorpsstraat 1".into()),
        postal_code: Some("1234 AB".into()),
        city: Some("Utrecht".into()),
        country_code: "NL".into(),
        email: Some("jan@example.org".into()),
        overwrite_if_exists: true,
        ..Customer::default()
    }
}

fn invoice(lines: Vec<Line>) -> Invoice {
    let mut inv = Invoice::new(nl_customer(), date());
    inv.lines = lines;
    inv
}

fn exact_line(description: &str, quantity: Decimal, unit_price: Decimal, rate: Decimal) -> Line {
    Line {
        description: description.into(),
        quantity,
        unit_price: Some(unit_price),
        vat_rate: Some(rate),
        vat_rate_source: VatRateSource::Exact,
        ..Line::default()
    }
}

fn run(invoice: Invoice) -> (Invoice, MessageSink) {
    run_with(invoice, &ShopConfig::default())
}

fn run_with(invoice: Invoice, config: &ShopConfig) -> (Invoice, MessageSink) {
    let mut sink = MessageSink::new();
    let done = complete(invoice, config, &StaticRates, &mut sink).unwrap();
    (done, sink)
}

fn assert_vat_closure(invoice: &Invoice) {
    let vat_sum: Decimal = invoice.lines.iter().filter_map(Line::total_vat).sum();
    let diff = (vat_sum - invoice.vat_amount.unwrap()).abs();
    assert!(
        diff <= dec!(0.05),
        "vat closure violated: lines {vat_sum} vs invoice {:?}",
        invoice.vat_amount
    );
}

// ---------------------------------------------------------------------------
// Direct inference
// ---------------------------------------------------------------------------

#[test]
fn exact_rate_line_completes() {
    // Single line, rate exactly 21, excl 100.00.
    let (done, sink) = run(invoice(vec![exact_line("Artikel", dec!(1), dec!(100.00), dec!(21))]));

    let line = &done.lines[0];
    assert_eq!(line.unit_price_inc, Some(dec!(121.00)));
    assert_eq!(line.vat_amount, Some(dec!(21.00)));
    assert_eq!(line.vat_rate_source, VatRateSource::Exact);
    assert_eq!(done.vat_type, Some(VatType::National));
    assert_eq!(done.amount, Some(dec!(100.00)));
    assert_eq!(done.amount_inc, Some(dec!(121.00)));
    assert_eq!(done.vat_amount, Some(dec!(21.00)));
    assert!(!done.concept);
    assert!(sink.is_empty());
    assert_vat_closure(&done);
}

#[test]
fn calculated_rate_corrects_against_candidates() {
    // Incl 121.00, creator-computed rate with window [20.5, 21.5].
    let line = Line {
        description: "Artikel".into(),
        unit_price_inc: Some(dec!(121.00)),
        vat_rate: Some(dec!(20.99)),
        vat_rate_min: Some(dec!(20.5)),
        vat_rate_max: Some(dec!(21.5)),
        vat_rate_source: VatRateSource::Calculated,
        ..Line::default()
    };
    let (done, _) = run(invoice(vec![line]));

    let line = &done.lines[0];
    assert_eq!(line.vat_rate, Some(dec!(21)));
    assert_eq!(line.vat_rate_source, VatRateSource::CalculatedCorrected);
    assert_eq!(line.vat_rate_min, None);
    assert_eq!(line.vat_rate_max, None);
    assert_eq!(line.unit_price.map(|p| p.round_dp(2)), Some(dec!(100.00)));
    assert!(!done.concept);
    assert_vat_closure(&done);
}

#[test]
fn zero_priced_shipping_gets_max_rate() {
    // Other lines show 21 and 9; free shipping gets the max.
    let shipping = Line {
        description: "Gratis verzending".into(),
        unit_price: Some(dec!(0)),
        line_type: LineType::Shipping,
        vat_rate_source: VatRateSource::CompletorProvided,
        ..Line::default()
    };
    let (done, _) = run(invoice(vec![
        exact_line("Artikel A", dec!(1), dec!(100), dec!(21)),
        exact_line("Artikel B", dec!(1), dec!(50), dec!(9)),
        shipping,
    ]));

    let shipping = done
        .lines
        .iter()
        .find(|l| l.line_type == LineType::Shipping)
        .unwrap();
    assert_eq!(shipping.vat_rate, Some(dec!(21)));
    assert_eq!(shipping.vat_rate_source, VatRateSource::CompletorCompleted);
    assert!(!done.concept);
    assert_vat_closure(&done);
}

// ---------------------------------------------------------------------------
// Strategy resolution through the full pipeline
// ---------------------------------------------------------------------------

#[test]
fn unresolved_line_takes_remainder_rate() {
    // Invoice incl 242.00, two lines each incl 121.00, one resolved at 21;
    // the remainder (21.00) determines the other line's rate.
    let resolved = Line {
        description: "Artikel A".into(),
        unit_price_inc: Some(dec!(121.00)),
        vat_rate: Some(dec!(21)),
        vat_rate_source: VatRateSource::Exact,
        ..Line::default()
    };
    let pending = Line {
        description: "Artikel B".into(),
        unit_price_inc: Some(dec!(121.00)),
        vat_rate_source: VatRateSource::StrategyPending,
        splittable: true,
        ..Line::default()
    };
    let mut inv = invoice(vec![resolved, pending]);
    inv.amount = Some(dec!(200.00));
    inv.amount_inc = Some(dec!(242.00));

    let (done, sink) = run(inv);
    assert_eq!(done.vat_amount, Some(dec!(42.00)));
    let b = done
        .lines
        .iter()
        .find(|l| l.description.contains("Artikel B"))
        .unwrap();
    assert_eq!(b.vat_rate, Some(dec!(21)));
    assert_eq!(b.vat_rate_source, VatRateSource::StrategyCompleted);
    assert!(!done.concept, "messages: {:?}", sink.messages());
    assert_vat_closure(&done);
}

#[test]
fn known_discount_pair_resolves_without_guessing() {
    let discount = Line {
        description: "Kortingscode ZOMER".into(),
        line_type: LineType::Discount,
        vat_rate_source: VatRateSource::StrategyPending,
        splittable: true,
        discount_amount_inc: Some(dec!(-12.10)),
        discount_vat_amount: Some(dec!(-2.10)),
        ..Line::default()
    };
    let mut inv = invoice(vec![
        exact_line("Artikel A", dec!(1), dec!(100), dec!(21)),
        exact_line("Artikel B", dec!(1), dec!(100), dec!(9)),
        discount,
    ]);
    inv.amount = Some(dec!(190.00));
    inv.amount_inc = Some(dec!(217.90));
    inv.vat_amount = Some(dec!(27.90));

    let (done, sink) = run(inv);
    let discount = done
        .lines
        .iter()
        .find(|l| l.line_type == LineType::Discount)
        .unwrap();
    assert_eq!(discount.vat_rate, Some(dec!(21)));
    assert_eq!(discount.vat_rate_source, VatRateSource::StrategyCompleted);
    assert_eq!(discount.unit_price, Some(dec!(-10.00)));
    assert!(!done.concept, "messages: {:?}", sink.messages());
    assert_vat_closure(&done);
}

#[test]
fn exhausted_strategies_flag_concept() {
    // 37.00 of unallocated vat fits no candidate rate on a 100.00 line.
    let pending = Line {
        description: "Onbekend".into(),
        unit_price: Some(dec!(100.00)),
        vat_rate_source: VatRateSource::StrategyPending,
        splittable: true,
        ..Line::default()
    };
    let mut inv = invoice(vec![exact_line("Artikel", dec!(1), dec!(10), dec!(21)), pending]);
    inv.amount = Some(dec!(110.00));
    inv.vat_amount = Some(dec!(39.10));

    let (done, sink) = run(inv);
    assert!(done.concept);
    assert!(sink.has_code(codes::STRATEGY_FAILED));
    let text = &sink
        .messages()
        .iter()
        .find(|m| m.code == codes::STRATEGY_FAILED)
        .unwrap()
        .text;
    // The warning names what was attempted and why it did not stick.
    assert!(text.contains("apply-same-vat-rate"));
    assert!(text.contains("try-all-vat-rate-permutations"));
}

// ---------------------------------------------------------------------------
// Totals reconciliation
// ---------------------------------------------------------------------------

#[test]
fn total_mismatch_injects_corrective_line() {
    let mut inv = invoice(vec![exact_line("Artikel", dec!(1), dec!(100), dec!(21))]);
    inv.amount = Some(dec!(110.00));
    inv.amount_inc = Some(dec!(131.00));
    inv.vat_amount = Some(dec!(21.00));

    let (done, sink) = run(inv);
    assert!(done.concept);
    assert!(sink.has_code(codes::CORRECTIVE_LINE_ADDED));
    let corrector = done
        .lines
        .iter()
        .find(|l| l.line_type == LineType::Corrector)
        .unwrap();
    assert_eq!(corrector.description, "Fee adjustment");
    assert_eq!(corrector.unit_price, Some(dec!(10.00)));
    assert_vat_closure(&done);
}

// ---------------------------------------------------------------------------
// Customer handling
// ---------------------------------------------------------------------------

#[test]
fn private_customer_fictionalized_when_configured() {
    let config = ShopConfig {
        send_customer: false,
        generic_customer_email: "anoniem@winkel.example".into(),
        ..ShopConfig::default()
    };
    let (done, _) = run_with(
        invoice(vec![exact_line("Artikel", dec!(1), dec!(100), dec!(21))]),
        &config,
    );

    let customer = &done.customer;
    assert_eq!(customer.first_name, None);
    assert_eq!(customer.last_name, None);
    assert_eq!(customer.address1, None);
    assert_eq!(customer.postal_code, None);
    assert_eq!(customer.city, None);
    assert_eq!(customer.email.as_deref(), Some("anoniem@winkel.example"));
    assert!(!customer.overwrite_if_exists);
    // Classification still worked on the remaining country code.
    assert_eq!(done.vat_type, Some(VatType::National));
}

// ---------------------------------------------------------------------------
// Tax regimes
// ---------------------------------------------------------------------------

#[test]
fn export_invoice_promotes_zero_to_exempt() {
    let mut inv = invoice(vec![Line {
        description: "Export artikel".into(),
        unit_price: Some(dec!(100)),
        vat_rate: Some(dec!(0)),
        vat_rate_source: VatRateSource::ExactZero,
        ..Line::default()
    }]);
    inv.customer.country_code = "US".into();

    let (done, sink) = run(inv);
    assert_eq!(done.vat_type, Some(VatType::RestOfWorld));
    assert_eq!(done.lines[0].vat_rate, Some(EXEMPT_RATE));
    assert!(!done.concept, "messages: {:?}", sink.messages());
}

#[test]
fn eu_business_zero_invoice_is_reversed_charge() {
    let mut inv = invoice(vec![Line {
        description: "Dienst".into(),
        unit_price: Some(dec!(500)),
        vat_rate: Some(dec!(0)),
        vat_rate_source: VatRateSource::ExactZero,
        ..Line::default()
    }]);
    inv.customer.country_code = "DE".into();
    inv.customer.company_name = Some("Kunde GmbH".into());
    inv.customer.vat_number = Some("DE123456789".into());

    let (done, _) = run(inv);
    assert_eq!(done.vat_type, Some(VatType::EuReversed));
    // 0% stays 0% under reversed charge; it is not an exemption.
    assert_eq!(done.lines[0].vat_rate, Some(dec!(0)));
    assert!(!done.concept);
}

#[test]
fn vat_free_shop_promotes_zero_rated_lines() {
    let config = ShopConfig {
        sells_vat_free: true,
        ..ShopConfig::default()
    };
    let inv = invoice(vec![
        exact_line("Cursus", dec!(1), dec!(200), dec!(21)),
        Line {
            description: "Vrijgestelde dienst".into(),
            unit_price: Some(dec!(100)),
            vat_rate: Some(dec!(0)),
            vat_rate_source: VatRateSource::ExactZero,
            ..Line::default()
        },
    ]);
    let (done, _) = run_with(inv, &config);
    let exempt = done
        .lines
        .iter()
        .find(|l| l.description.starts_with("Vrijgestelde"))
        .unwrap();
    assert_eq!(exempt.vat_rate, Some(EXEMPT_RATE));
}

#[test]
fn margin_scheme_moves_inclusive_price_into_unit_price() {
    let config = ShopConfig {
        sells_margin_goods: true,
        ..ShopConfig::default()
    };
    let margin_line = Line {
        description: "Tweedehands fiets".into(),
        unit_price_inc: Some(dec!(250)),
        cost_price: Some(dec!(100)),
        vat_rate: Some(dec!(21)),
        vat_rate_source: VatRateSource::Exact,
        ..Line::default()
    };
    let fee = exact_line("Afleverkosten", dec!(1), dec!(10), dec!(21));
    let (done, sink) = run_with(invoice(vec![margin_line, fee]), &config);

    assert_eq!(done.vat_type, Some(VatType::MarginScheme));
    assert!(sink.has_code(codes::VAT_TYPE_MAY_SPLIT));
    let bike = &done.lines[0];
    assert_eq!(bike.unit_price, Some(dec!(250)));
    assert_eq!(bike.cost_price, Some(dec!(100)));
    let fee = &done.lines[1];
    // Non-margin lines get a zero cost price and the inclusive amount.
    assert_eq!(fee.cost_price, Some(dec!(0)));
    assert_eq!(fee.unit_price, Some(dec!(12.10)));
    assert_eq!(fee.original_unit_price, Some(dec!(10)));
}

#[test]
fn mixed_regimes_warn_must_split() {
    // A Dutch 21% line next to a German 19% digital-services line: one
    // fits only national VAT, the other only foreign VAT.
    let config = ShopConfig {
        sells_digital_services: true,
        ..ShopConfig::default()
    };
    let mut inv = invoice(vec![
        exact_line("Artikel", dec!(1), dec!(100), dec!(21)),
        exact_line("Download", dec!(1), dec!(50), dec!(19)),
    ]);
    inv.customer.country_code = "DE".into();

    let (done, sink) = run_with(inv, &config);
    assert!(done.concept);
    assert!(sink.has_code(codes::VAT_TYPE_MUST_SPLIT));
    // The first union member is adopted as the best effort.
    assert!(done.vat_type.is_some());
}

#[test]
fn ambiguous_zero_line_warns_may_split() {
    // A 21% line next to a 0% line for an EU business: national VAT
    // covers both, but EU-reversed also fits the zero line.
    let mut inv = invoice(vec![
        exact_line("Artikel", dec!(1), dec!(100), dec!(21)),
        Line {
            description: "Dienst".into(),
            unit_price: Some(dec!(200)),
            vat_rate: Some(dec!(0)),
            vat_rate_source: VatRateSource::ExactZero,
            ..Line::default()
        },
    ]);
    inv.customer.country_code = "DE".into();
    inv.customer.company_name = Some("Kunde GmbH".into());
    inv.customer.vat_number = Some("DE123456789".into());

    let (done, sink) = run(inv);
    assert!(done.concept);
    assert!(sink.has_code(codes::VAT_TYPE_MAY_SPLIT));
    assert_eq!(done.vat_type, Some(VatType::National));
}

// ---------------------------------------------------------------------------
// Degradation and contract
// ---------------------------------------------------------------------------

#[test]
fn lookup_failure_degrades_to_concept() {
    let config = ShopConfig {
        country_code: "XX".into(),
        ..ShopConfig::default()
    };
    let (done, sink) = run_with(
        invoice(vec![exact_line("Artikel", dec!(1), dec!(100), dec!(21))]),
        &config,
    );
    assert!(sink.has_code(codes::RATE_LOOKUP_FAILED));
    // Without candidates nothing can be classified, but the run completes.
    assert!(done.concept);
    assert!(done.vat_type.is_some());
}

#[test]
fn empty_invoice_is_a_contract_violation() {
    let mut sink = MessageSink::new();
    let result = complete(
        Invoice::new(nl_customer(), date()),
        &ShopConfig::default(),
        &StaticRates,
        &mut sink,
    );
    assert!(matches!(result, Err(CompletionError::Contract(_))));
}

#[test]
fn missing_country_is_a_contract_violation() {
    let mut inv = invoice(vec![exact_line("Artikel", dec!(1), dec!(100), dec!(21))]);
    inv.customer.country_code = String::new();
    let mut sink = MessageSink::new();
    let result = complete(inv, &ShopConfig::default(), &StaticRates, &mut sink);
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

#[test]
fn empty_shipping_removed_when_configured() {
    let config = ShopConfig {
        remove_empty_shipping: true,
        ..ShopConfig::default()
    };
    let shipping = Line {
        description: "Gratis verzending".into(),
        unit_price: Some(dec!(0)),
        line_type: LineType::Shipping,
        vat_rate_source: VatRateSource::CompletorProvided,
        ..Line::default()
    };
    let (done, _) = run_with(
        invoice(vec![
            exact_line("Artikel", dec!(1), dec!(100), dec!(21)),
            shipping,
        ]),
        &config,
    );
    assert!(done.lines.iter().all(|l| l.line_type != LineType::Shipping));
    assert_vat_closure(&done);
}

#[test]
fn completed_invoice_serializes_for_submission() {
    let (done, sink) = run(invoice(vec![exact_line("Artikel", dec!(1), dec!(100.00), dec!(21))]));
    let json = serde_json::to_value(&done).unwrap();
    assert_eq!(json["customer"]["country_code"], "NL");
    assert_eq!(json["concept"], false);
    assert_eq!(json["vat_type"], "National");
    // Messages travel with the document to the submission collaborator.
    assert!(serde_json::to_string(sink.messages()).is_ok());
}

#[test]
fn refund_invoice_completes_with_negative_amounts() {
    let mut inv = invoice(vec![exact_line("Retour artikel", dec!(1), dec!(-100), dec!(21))]);
    inv.amount = Some(dec!(-100));

    let (done, _) = run(inv);
    assert_eq!(done.vat_amount, Some(dec!(-21.00)));
    assert_eq!(done.lines[0].unit_price_inc, Some(dec!(-121.00)));
    assert!(!done.concept);
    assert_vat_closure(&done);
}

#[test]
fn flattened_bundle_keeps_heterogeneous_rates_apart() {
    let mut parent = exact_line("Pakket", dec!(1), dec!(100), dec!(21));
    parent.children = vec![
        exact_line("Boek", dec!(1), dec!(0), dec!(9)),
        exact_line("CD", dec!(1), dec!(0), dec!(21)),
    ];
    let (done, _) = run(invoice(vec![parent]));
    // Never merged: parent plus both children survive as lines.
    assert_eq!(done.lines.len(), 3);
    assert!(done.lines[1].parent_index.is_some());
}
