//! Monetary value reconciliation.
//!
//! Pure arithmetic over the quadruple (amount excl. VAT, amount incl. VAT,
//! VAT amount, VAT rate): derive the missing values from any two knowns,
//! compute quotient windows for rounded inputs, and solve the two-rate
//! split system. All values are [`Decimal`]; no floating point.

use rust_decimal::Decimal;

use crate::core::CompletionError;

/// Which of the three monetary amounts a reconciliation derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyField {
    AmountEx,
    AmountInc,
    VatAmount,
}

/// Result of [`reconcile`]: the completed triple plus which fields were
/// derived rather than given, so callers can track provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub amount_ex: Decimal,
    pub amount_inc: Decimal,
    pub vat_amount: Decimal,
    pub derived: Vec<MoneyField>,
}

/// Derive the missing members of (excl, incl, vat) from any two knowns.
///
/// `vat_rate` is a fraction in `[0, 1)` (0.21 for 21%) and counts as one of
/// the two required knowns. Fewer than two knowns, a rate outside `[0, 1)`,
/// or the pair (vat, rate 0) are arithmetic contract violations.
///
/// The derivation `excl = vat / rate` (only vat and rate known) is the
/// least precise path: a cent of rounding in the vat amount scales up by
/// `1 / rate` in the result.
pub fn reconcile(
    amount_ex: Option<Decimal>,
    amount_inc: Option<Decimal>,
    vat_amount: Option<Decimal>,
    vat_rate: Option<Decimal>,
) -> Result<Reconciled, CompletionError> {
    if let Some(rate) = vat_rate {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(CompletionError::Arithmetic(format!(
                "vat rate {rate} is not a fraction in [0, 1)"
            )));
        }
    }

    let mut derived = Vec::new();
    let (ex, inc, vat) = match (amount_ex, amount_inc, vat_amount, vat_rate) {
        (Some(ex), Some(inc), vat, _) => {
            let v = inc - ex;
            if vat.is_none() {
                derived.push(MoneyField::VatAmount);
            }
            (ex, inc, vat.unwrap_or(v))
        }
        (Some(ex), None, Some(vat), _) => {
            derived.push(MoneyField::AmountInc);
            (ex, ex + vat, vat)
        }
        (None, Some(inc), Some(vat), _) => {
            derived.push(MoneyField::AmountEx);
            (inc - vat, inc, vat)
        }
        (Some(ex), None, None, Some(rate)) => {
            derived.push(MoneyField::VatAmount);
            derived.push(MoneyField::AmountInc);
            let vat = ex * rate;
            (ex, ex + vat, vat)
        }
        (None, Some(inc), None, Some(rate)) => {
            derived.push(MoneyField::AmountEx);
            derived.push(MoneyField::VatAmount);
            let ex = inc / (Decimal::ONE + rate);
            (ex, inc, inc - ex)
        }
        (None, None, Some(vat), Some(rate)) => {
            if rate.is_zero() {
                return Err(CompletionError::Arithmetic(
                    "cannot derive amounts from a vat amount at rate 0".to_string(),
                ));
            }
            derived.push(MoneyField::AmountEx);
            derived.push(MoneyField::AmountInc);
            let ex = vat / rate;
            (ex, ex + vat, vat)
        }
        _ => {
            return Err(CompletionError::Arithmetic(
                "reconciliation needs at least two known values".to_string(),
            ));
        }
    };

    Ok(Reconciled {
        amount_ex: ex,
        amount_inc: inc,
        vat_amount: vat,
        derived,
    })
}

/// Quotient window for a division of two rounded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivisionRange {
    /// Smallest quotient the true pre-rounding values could have had.
    pub min: Decimal,
    /// The quotient of the values as given.
    pub calculated: Decimal,
    /// Largest possible quotient.
    pub max: Decimal,
}

/// Compute `{min, calculated, max}` for `numerator / denominator`, where
/// each operand was rounded to the given precision (0.01 for cents) and the
/// true value could lie anywhere within half the precision window on each
/// side.
///
/// A denominator bound that would cross zero is clamped to the point value:
/// the window stays sign-consistent and `min <= calculated <= max` holds.
/// With both precisions zero all three values are equal.
pub fn division_range(
    numerator: Decimal,
    denominator: Decimal,
    numerator_precision: Decimal,
    denominator_precision: Decimal,
) -> Result<DivisionRange, CompletionError> {
    if denominator.is_zero() {
        return Err(CompletionError::Arithmetic(
            "division range with zero denominator".to_string(),
        ));
    }

    let two = Decimal::TWO;
    let num_half = (numerator_precision / two).abs();
    let den_half = (denominator_precision / two).abs();

    let num_bounds = [numerator - num_half, numerator + num_half];
    let mut den_bounds = [denominator - den_half, denominator + den_half];
    for bound in &mut den_bounds {
        if bound.is_zero() || bound.is_sign_positive() != denominator.is_sign_positive() {
            *bound = denominator;
        }
    }

    let calculated = numerator / denominator;
    let mut min = calculated;
    let mut max = calculated;
    for n in num_bounds {
        for d in den_bounds {
            let q = n / d;
            min = min.min(q);
            max = max.max(q);
        }
    }

    Ok(DivisionRange {
        min,
        calculated,
        max,
    })
}

/// Split `amount_ex` into two parts taxed at `low_rate` and `high_rate`
/// (fractions) such that the parts sum to `amount_ex` and their combined
/// VAT equals `vat_amount`. Returns `(low_part, high_part)`.
///
/// Solves `low + high = amount_ex`, `low_rate*low + high_rate*high = vat`:
/// `high = (vat - amount_ex*low_rate) / (high_rate - low_rate)`.
///
/// Equal rates make the system underdetermined and are a contract
/// violation on the caller's side.
pub fn split_amount_over_2_vat_rates(
    amount_ex: Decimal,
    vat_amount: Decimal,
    low_rate: Decimal,
    high_rate: Decimal,
) -> Result<(Decimal, Decimal), CompletionError> {
    if low_rate == high_rate {
        return Err(CompletionError::Arithmetic(
            "two-rate split needs two distinct rates".to_string(),
        ));
    }
    let high_part = (vat_amount - amount_ex * low_rate) / (high_rate - low_rate);
    let low_part = amount_ex - high_part;
    Ok((low_part, high_part))
}
