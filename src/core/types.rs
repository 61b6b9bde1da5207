use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rate value marking a line as legally VAT-exempt (as opposed to 0%-rated).
///
/// The bookkeeping API distinguishes a 0% rate from "no VAT applies"; the
/// latter travels as this sentinel.
pub const EXEMPT_RATE: Decimal = Decimal::NEGATIVE_ONE;

/// Absolute tolerance for comparing invoice-level totals against line sums.
///
/// Cent rounding on every line plus shop-side rounding of the totals can
/// accumulate a few cents of drift on a real order.
pub const TOTALS_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// The invoice document as it travels through the completion pipeline.
///
/// Created fresh per run from a shop-specific creator's raw output, mutated
/// in place by the pipeline stages, terminal once handed to the submission
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Customer block.
    pub customer: Customer,
    /// Invoice number; assigned by the bookkeeping system when absent.
    pub number: Option<String>,
    /// Issue date. Also the reference date for rate validity.
    pub issue_date: NaiveDate,
    /// Payment state as known on the shop side.
    pub payment: PaymentStatus,
    /// Bookkeeping template to file the invoice under.
    pub template: Option<String>,
    /// Tax regime classification; set by the completor.
    pub vat_type: Option<VatType>,
    /// Draft flag: a concept invoice requires human review downstream.
    pub concept: bool,
    /// Invoice total excluding VAT.
    pub amount: Option<Decimal>,
    /// Invoice total including VAT.
    pub amount_inc: Option<Decimal>,
    /// Invoice VAT total.
    pub vat_amount: Option<Decimal>,
    /// Foreign-currency info when the shop recorded amounts in another
    /// currency than the bookkeeping administration's.
    pub currency: Option<CurrencyInfo>,
    /// Invoice lines, hierarchical until flattened.
    pub lines: Vec<Line>,
}

impl Invoice {
    /// A fresh invoice with no totals, no lines, and payment still due:
    /// the shape creators start from.
    pub fn new(customer: Customer, issue_date: NaiveDate) -> Self {
        Self {
            customer,
            number: None,
            issue_date,
            payment: PaymentStatus::Due,
            template: None,
            vat_type: None,
            concept: false,
            amount: None,
            amount_inc: None,
            vat_amount: None,
            currency: None,
            lines: Vec::new(),
        }
    }
}

/// Customer block of an invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    /// Company name; together with a VAT number this marks a business customer.
    pub company_name: Option<String>,
    /// Customer VAT number (with country prefix, e.g. "NL123456789B01").
    pub vat_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    /// ISO 3166-1 alpha-2 country code. Drives the tax-type decision table.
    pub country_code: String,
    pub telephone: Option<String>,
    pub email: Option<String>,
    /// Whether an existing customer record in the bookkeeping system may be
    /// overwritten with this data.
    pub overwrite_if_exists: bool,
}

impl Customer {
    /// A business customer has both a company name and a VAT number.
    /// Business customers are exempt from fictionalization.
    pub fn is_business(&self) -> bool {
        self.company_name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty())
            && self
                .vat_number
                .as_deref()
                .is_some_and(|n| !n.trim().is_empty())
    }
}

/// Payment state of the invoice on the shop side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Not (fully) paid yet.
    Due,
    /// Paid, optionally with the payment date.
    Paid { date: Option<NaiveDate> },
}

/// Foreign-currency conversion info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyInfo {
    /// ISO 4217 code the shop recorded amounts in.
    pub code: String,
    /// Home-currency units per one invoice-currency unit.
    pub rate: Decimal,
    /// True while conversion is still pending; cleared after the one
    /// conversion pass.
    pub convert: bool,
}

/// One billable unit on the invoice.
///
/// All monetary fields are per unit; line totals are `quantity` times the
/// unit value. `children` is only populated before flattening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    /// Article number / SKU.
    pub item_number: Option<String>,
    pub description: String,
    /// Invoiced quantity, never negative (refunds carry negative amounts).
    pub quantity: Decimal,
    /// Unit price excluding VAT.
    pub unit_price: Option<Decimal>,
    /// Unit price including VAT.
    pub unit_price_inc: Option<Decimal>,
    /// VAT rate as a percentage (21 means 21%); [`EXEMPT_RATE`] marks an
    /// exempt line.
    pub vat_rate: Option<Decimal>,
    /// VAT amount per unit.
    pub vat_amount: Option<Decimal>,
    /// Provenance of `vat_rate`; decides how much it can be trusted.
    pub vat_rate_source: VatRateSource,
    /// Lower bound of the rate precision window. Only meaningful while
    /// `vat_rate_source` is [`VatRateSource::Calculated`].
    pub vat_rate_min: Option<Decimal>,
    /// Upper bound of the rate precision window.
    pub vat_rate_max: Option<Decimal>,
    /// Product-level historical rate, recorded when the product was last
    /// priced. Only trusted if still legally valid on the invoice date.
    pub vat_rate_lookup: Option<Decimal>,
    /// Purchase price; presence marks a margin-scheme line.
    pub cost_price: Option<Decimal>,
    pub line_type: LineType,
    /// Known discount amount including VAT attributable to this line.
    pub discount_amount_inc: Option<Decimal>,
    /// Known VAT portion of the discount attributable to this line.
    pub discount_vat_amount: Option<Decimal>,
    /// Set by the creator when the unit price was derived with shop-side
    /// cent rounding and should be recomputed once the rate is trusted.
    pub recalculate_price: bool,
    /// Audit copy of the unit price before a correction overwrote it.
    pub original_unit_price: Option<Decimal>,
    /// Whether the strategy resolver may split this line over several rates.
    pub splittable: bool,
    /// Index of the parent line in the flattened list, for child lines that
    /// were kept separate.
    pub parent_index: Option<u32>,
    /// Number of child lines that were merged into this one.
    pub children_merged: Option<u32>,
    /// Child lines (bundle parts, variants, options); emptied by flattening.
    pub children: Vec<Line>,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            item_number: None,
            description: String::new(),
            quantity: Decimal::ONE,
            unit_price: None,
            unit_price_inc: None,
            vat_rate: None,
            vat_amount: None,
            vat_rate_source: VatRateSource::CompletorProvided,
            vat_rate_min: None,
            vat_rate_max: None,
            vat_rate_lookup: None,
            cost_price: None,
            line_type: LineType::Product,
            discount_amount_inc: None,
            discount_vat_amount: None,
            recalculate_price: false,
            original_unit_price: None,
            splittable: false,
            parent_index: None,
            children_merged: None,
            children: Vec::new(),
        }
    }
}

impl Line {
    pub fn new(description: impl Into<String>, line_type: LineType) -> Self {
        Self {
            description: description.into(),
            line_type,
            ..Self::default()
        }
    }

    /// Margin-scheme lines carry a cost price.
    pub fn is_margin(&self) -> bool {
        self.cost_price.is_some()
    }

    /// Line total excluding VAT.
    pub fn total_ex(&self) -> Option<Decimal> {
        self.unit_price.map(|p| p * self.quantity)
    }

    /// Line total including VAT.
    pub fn total_inc(&self) -> Option<Decimal> {
        self.unit_price_inc.map(|p| p * self.quantity)
    }

    /// Line VAT total.
    pub fn total_vat(&self) -> Option<Decimal> {
        self.vat_amount.map(|v| v * self.quantity)
    }
}

/// Provenance of a line's VAT rate.
///
/// A rate is trustworthy for downstream classification when its source is
/// one of the "correct" variants; all other sources are provisional and
/// must be resolved before the invoice can leave concept status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VatRateSource {
    /// The shop recorded this exact rate.
    Exact,
    /// The shop recorded an exact 0% rate.
    ExactZero,
    /// Derived from rounded amounts; imprecise, carries a [min,max] window.
    Calculated,
    /// A calculated rate matched exactly one legally possible rate.
    CalculatedCorrected,
    /// Taken from the product's historical rate, still valid today.
    LookedUp,
    /// The completor must still determine the rate.
    CompletorProvided,
    /// The completor filled the rate (e.g. zero-priced line policy).
    CompletorCompleted,
    /// Awaiting whole-invoice strategy resolution.
    StrategyPending,
    /// Resolved by a reconciliation strategy.
    StrategyCompleted,
    /// Copied from the parent line during flattening/completion.
    CopiedFromParent,
    /// Copied from the child lines during flattening/completion.
    CopiedFromChildren,
}

impl VatRateSource {
    /// Whether a rate with this provenance is trustworthy for
    /// classification and breakdown aggregation.
    pub fn is_correct(&self) -> bool {
        matches!(
            self,
            Self::Exact
                | Self::ExactZero
                | Self::CalculatedCorrected
                | Self::LookedUp
                | Self::CompletorCompleted
                | Self::StrategyCompleted
                | Self::CopiedFromParent
                | Self::CopiedFromChildren
        )
    }

    /// Provisional sources must be resolved before the invoice can leave
    /// concept status.
    pub fn is_provisional(&self) -> bool {
        !self.is_correct()
    }
}

/// Kind of billable unit a line represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineType {
    Product,
    Shipping,
    PaymentFee,
    GiftWrap,
    Discount,
    Manual,
    Voucher,
    /// Injected by the completor to repair a total mismatch.
    Corrector,
    Other,
}

/// Tax regime classification of the whole invoice, as the bookkeeping API
/// defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VatType {
    /// Home-country VAT at the national rates.
    National,
    /// Domestic reverse charge (buyer remits).
    NationalReversed,
    /// Intra-EU reverse charge to a business customer.
    EuReversed,
    /// Supply outside the EU; no VAT applies.
    RestOfWorld,
    /// Margin scheme for second-hand goods: VAT on sale price minus cost
    /// price.
    MarginScheme,
    /// Destination-country VAT for digital services to EU consumers.
    ForeignVat,
}

impl VatType {
    /// Numeric code in the bookkeeping API's invoice schema.
    pub fn code(&self) -> u8 {
        match self {
            Self::National => 1,
            Self::NationalReversed => 2,
            Self::EuReversed => 3,
            Self::RestOfWorld => 4,
            Self::MarginScheme => 5,
            Self::ForeignVat => 6,
        }
    }

    /// Parse from the bookkeeping API's numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::National),
            2 => Some(Self::NationalReversed),
            3 => Some(Self::EuReversed),
            4 => Some(Self::RestOfWorld),
            5 => Some(Self::MarginScheme),
            6 => Some(Self::ForeignVat),
            _ => None,
        }
    }
}
