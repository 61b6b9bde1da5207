use rust_decimal::Decimal;

use super::error::CompletionError;
use super::types::{Invoice, Line};

/// Validate the raw invoice shape before completion starts.
///
/// Violations here are creator bugs, not data problems: the engine aborts
/// rather than guess. All checks are collected so the creator author sees
/// every problem at once.
pub fn validate_raw(invoice: &Invoice) -> Result<(), CompletionError> {
    let mut problems = Vec::new();

    if invoice.lines.is_empty() {
        problems.push("invoice has no lines".to_string());
    }

    let country = invoice.customer.country_code.trim();
    if country.is_empty() {
        problems.push("customer country code is missing".to_string());
    } else if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        problems.push(format!(
            "customer country code '{country}' is not ISO 3166-1 alpha-2"
        ));
    }

    if let Some(currency) = &invoice.currency {
        if currency.convert && currency.rate <= Decimal::ZERO {
            problems.push(format!(
                "currency conversion requested but rate is {}",
                currency.rate
            ));
        }
    }

    for (i, line) in invoice.lines.iter().enumerate() {
        check_line(line, &format!("lines[{i}]"), &mut problems);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(CompletionError::Contract(problems.join("; ")))
    }
}

fn check_line(line: &Line, path: &str, problems: &mut Vec<String>) {
    if line.quantity.is_sign_negative() {
        problems.push(format!(
            "{path}.quantity is negative ({}); refunds must carry negative amounts instead",
            line.quantity
        ));
    }
    if line.description.trim().is_empty() {
        problems.push(format!("{path}.description is empty"));
    }
    for (j, child) in line.children.iter().enumerate() {
        check_line(child, &format!("{path}.children[{j}]"), problems);
    }
}
