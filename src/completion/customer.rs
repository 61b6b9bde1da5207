//! Customer block normalization: fictionalization of personal data and
//! email sanitization.

use crate::core::{Customer, MessageSink, ShopConfig, codes};

pub(crate) fn complete_customer(
    customer: &mut Customer,
    config: &ShopConfig,
    sink: &mut MessageSink,
) {
    if !config.send_customer && !customer.is_business() {
        fictionalize(customer, config);
    }
    sanitize_email(customer, config, sink);
}

/// Strip all personal fields of a non-business customer when the shop is
/// configured not to share them. The country code stays: it drives the
/// tax-type decision table.
fn fictionalize(customer: &mut Customer, config: &ShopConfig) {
    customer.first_name = None;
    customer.last_name = None;
    customer.address1 = None;
    customer.address2 = None;
    customer.postal_code = None;
    customer.city = None;
    customer.telephone = None;
    customer.email = Some(config.generic_customer_email.clone());
    customer.overwrite_if_exists = false;
}

/// The bookkeeping API rejects an empty-but-present email value while
/// tolerating the field's total absence; shops also record comma-joined
/// lists and `Display Name <addr>` wrappers.
fn sanitize_email(customer: &mut Customer, config: &ShopConfig, sink: &mut MessageSink) {
    let Some(raw) = customer.email.as_deref() else {
        return;
    };
    let cleaned = first_bare_address(raw);
    if cleaned.is_empty() {
        customer.email = Some(config.generic_customer_email.clone());
        sink.warning(
            codes::EMPTY_EMAIL_REPLACED,
            "customer email was empty; replaced by the configured placeholder",
        );
    } else {
        customer.email = Some(cleaned);
    }
}

fn first_bare_address(raw: &str) -> String {
    let first = raw
        .split([',', ';'])
        .next()
        .unwrap_or_default()
        .trim();
    match (first.find('<'), first.ends_with('>')) {
        (Some(start), true) => first[start + 1..first.len() - 1].trim().to_string(),
        _ => first.to_string(),
    }
}
