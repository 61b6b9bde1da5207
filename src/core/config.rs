use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How parent and child line amounts relate for a given webshop.
///
/// This is a per-shop policy, not something the engine can auto-detect:
/// each shop module documents where its bundle/option plugins put the
/// money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildPriceMode {
    /// The parent line carries the full amount; children are informational.
    ParentOnly,
    /// The children carry the amounts; the parent is a grouping header.
    ChildrenOnly,
    /// Both parent and children carry the full amount (would double-count).
    Doubled,
    /// Parent and child amounts add up to the line total.
    Additive,
}

/// Read-only per-shop configuration consulted throughout a completion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopConfig {
    /// Home country of the administration (ISO 3166-1 alpha-2).
    pub country_code: String,
    /// Shop sells second-hand goods under the margin scheme.
    pub sells_margin_goods: bool,
    /// Shop sells digital services (destination VAT may apply to EU
    /// consumers).
    pub sells_digital_services: bool,
    /// Shop sells legally VAT-exempt goods or services.
    pub sells_vat_free: bool,
    /// Shop supports domestic reverse-charge sales (e.g. construction
    /// sector subcontracting).
    pub national_reversed: bool,
    /// Whether personal data of non-business customers may be sent to the
    /// bookkeeping system.
    pub send_customer: bool,
    /// Placeholder email substituted when personal data is withheld or the
    /// shop recorded an empty address.
    pub generic_customer_email: String,
    /// Merge child lines into the parent only up to this many children.
    pub max_child_lines_to_merge: usize,
    /// Keep children as separate lines from this count onward.
    pub min_child_lines_to_keep: usize,
    /// Maximum length of a merged description.
    pub max_merged_description_len: usize,
    /// Where bundle/option amounts live for this shop.
    pub child_price_mode: ChildPriceMode,
    /// Drop a zero-amount shipping line from the completed invoice.
    pub remove_empty_shipping: bool,
    /// Rounding precision of monetary amounts as recorded by the shop,
    /// used to widen calculated-rate windows.
    pub amount_precision: Decimal,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            country_code: "NL".to_string(),
            sells_margin_goods: false,
            sells_digital_services: false,
            sells_vat_free: false,
            national_reversed: false,
            send_customer: true,
            generic_customer_email: "customer@example.com".to_string(),
            max_child_lines_to_merge: 5,
            min_child_lines_to_keep: 10,
            max_merged_description_len: 180,
            child_price_mode: ChildPriceMode::ParentOnly,
            remove_empty_shipping: false,
            amount_precision: Decimal::new(1, 2),
        }
    }
}
