//! The invoice completion pipeline.
//!
//! One forward-only pass per invoice: customer normalization, tax-type
//! enumeration, line completion, totals reconciliation, strategy
//! resolution, tax-type classification, and the final schema corrections.
//! Every inconclusive step marks the invoice as concept and records a
//! coded warning; the pipeline itself never aborts for business-rule
//! conditions (best-effort completion: a human can always fix a concept
//! invoice downstream).

use rust_decimal::Decimal;

use crate::core::{
    CompletionError, EXEMPT_RATE, Invoice, LineType, MessageSink, ShopConfig, VatRateSource,
    VatType, codes, validate_raw,
};
use crate::money;
use crate::rates::{RateSource, VatRateCandidate};
use crate::strategy;

mod customer;
mod flatten;
mod lines;
mod totals;
mod vat_types;

pub use flatten::flatten;
pub use lines::{RangeMatch, correct_vat_rate_by_range};
pub use vat_types::DIGITAL_SERVICES_REGIME_FROM;

/// Completes raw webshop invoices into documents the bookkeeping API
/// accepts.
///
/// Stateless between invoices: holds only the read-only shop configuration
/// and the rate-lookup collaborator, so independent instances (or calls)
/// may run concurrently.
pub struct Completor<'a> {
    config: &'a ShopConfig,
    rates: &'a dyn RateSource,
}

impl<'a> Completor<'a> {
    pub fn new(config: &'a ShopConfig, rates: &'a dyn RateSource) -> Self {
        Self { config, rates }
    }

    /// Run the full completion pipeline on one raw invoice.
    ///
    /// # Errors
    ///
    /// Only input-contract violations abort; every recoverable condition is
    /// collected in `sink` instead.
    pub fn complete(
        &self,
        mut invoice: Invoice,
        sink: &mut MessageSink,
    ) -> Result<Invoice, CompletionError> {
        validate_raw(&invoice)?;

        customer::complete_customer(&mut invoice.customer, self.config, sink);

        let types = vat_types::init_possible_vat_types(&mut invoice, self.config, sink);
        let candidates =
            vat_types::possible_vat_rates(&types, &invoice, self.config, self.rates, sink);

        lines::complete_lines(&mut invoice, &candidates, self.config, sink);
        totals::complete_line_totals(&mut invoice, &candidates, self.config, sink);
        self.resolve_strategies(&mut invoice, &candidates, sink);

        vat_types::complete_vat_type(&mut invoice, &types, &candidates, sink);
        self.correct_margin_scheme(&mut invoice);
        self.correct_zero_rate_lines(&mut invoice, &candidates, sink);
        self.remove_empty_shipping(&mut invoice);
        finalize(&mut invoice);

        Ok(invoice)
    }

    fn resolve_strategies(
        &self,
        invoice: &mut Invoice,
        candidates: &[VatRateCandidate],
        sink: &mut MessageSink,
    ) {
        let pending = invoice
            .lines
            .iter()
            .filter(|l| l.vat_rate_source == VatRateSource::StrategyPending)
            .count();
        if pending == 0 {
            return;
        }
        if invoice.vat_amount.is_none() {
            invoice.concept = true;
            sink.warning(
                codes::STRATEGY_FAILED,
                format!(
                    "{pending} line(s) need whole-invoice resolution but the invoice vat \
                     total is unknown"
                ),
            );
            return;
        }

        let report = strategy::resolve(invoice, candidates);
        if report.unresolved > 0 {
            invoice.concept = true;
            sink.warning(
                codes::STRATEGY_FAILED,
                format!(
                    "could not determine vat rates for {} line(s); {}",
                    report.unresolved,
                    report.describe()
                ),
            );
        }
    }

    /// Under the margin scheme every line must carry a cost price and its
    /// unit price field must hold the tax-inclusive amount.
    fn correct_margin_scheme(&self, invoice: &mut Invoice) {
        if invoice.vat_type != Some(VatType::MarginScheme) {
            return;
        }
        for line in &mut invoice.lines {
            if line.cost_price.is_none() {
                line.cost_price = Some(Decimal::ZERO);
            }
            let fraction = line.vat_rate.map(|r| {
                if r <= Decimal::ZERO {
                    Decimal::ZERO
                } else {
                    r / Decimal::ONE_HUNDRED
                }
            });
            let inc = line.unit_price_inc.or_else(|| {
                money::reconcile(line.unit_price, None, line.vat_amount, fraction)
                    .ok()
                    .map(|done| done.amount_inc)
            });
            if let Some(inc) = inc {
                if line.unit_price != Some(inc) {
                    line.original_unit_price = line.unit_price;
                    line.unit_price = Some(inc);
                }
                line.unit_price_inc = Some(inc);
            }
        }
    }

    /// A 0%-rated line and a legally exempt line are distinct concepts in
    /// the target schema; promote or flag, never guess.
    fn correct_zero_rate_lines(
        &self,
        invoice: &mut Invoice,
        candidates: &[VatRateCandidate],
        sink: &mut MessageSink,
    ) {
        let Some(vat_type) = invoice.vat_type else {
            return;
        };
        let allows_zero = candidates
            .iter()
            .any(|c| c.vat_type == vat_type && c.rate.is_zero());
        let mut disallowed = 0u32;

        for line in &mut invoice.lines {
            if !line.vat_rate_source.is_correct() || line.vat_rate != Some(Decimal::ZERO) {
                continue;
            }
            match vat_type {
                // The schema has exactly one encoding for "no VAT applies"
                // outside the EU.
                VatType::RestOfWorld => line.vat_rate = Some(EXEMPT_RATE),
                VatType::National if self.config.sells_vat_free => {
                    line.vat_rate = Some(EXEMPT_RATE);
                }
                _ if allows_zero => {}
                _ => disallowed += 1,
            }
        }

        if disallowed > 0 {
            invoice.concept = true;
            sink.warning(
                codes::ZERO_RATE_NOT_ALLOWED,
                format!(
                    "{disallowed} line(s) carry a 0% rate under tax type {} which does not \
                     allow it",
                    vat_type.code()
                ),
            );
        }
    }

    /// Cosmetic: drop a zero-amount shipping line if so configured. Done
    /// last so it cannot disturb the totals reconciliation.
    fn remove_empty_shipping(&self, invoice: &mut Invoice) {
        if !self.config.remove_empty_shipping {
            return;
        }
        invoice.lines.retain(|line| {
            !(line.line_type == LineType::Shipping
                && line.unit_price.unwrap_or(Decimal::ZERO).is_zero()
                && line.unit_price_inc.unwrap_or(Decimal::ZERO).is_zero())
        });
    }
}

/// Drop internal working state and make sure no provisional line escapes
/// without the concept flag.
fn finalize(invoice: &mut Invoice) {
    let mut unresolved = false;
    for line in &mut invoice.lines {
        if line.vat_rate_source != VatRateSource::Calculated {
            line.vat_rate_min = None;
            line.vat_rate_max = None;
        }
        unresolved |= line.vat_rate_source.is_provisional();
    }
    if unresolved {
        invoice.concept = true;
    }
}

/// Complete a raw invoice: the library's single entry point.
///
/// Equivalent to [`Completor::new`] + [`Completor::complete`].
pub fn complete(
    invoice: Invoice,
    config: &ShopConfig,
    rates: &dyn RateSource,
    sink: &mut MessageSink,
) -> Result<Invoice, CompletionError> {
    Completor::new(config, rates).complete(invoice, sink)
}
