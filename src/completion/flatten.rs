//! Collapse the line hierarchy (bundles, variants, options) into a flat
//! list without double-counting amounts.

use rust_decimal::Decimal;

use crate::core::{ChildPriceMode, Line, ShopConfig, VatRateSource};

/// Flatten a line tree into a new owned flat list, children-first.
///
/// Children either stay as separate lines directly after their parent
/// (tagged with the parent's index in the flat list) or are merged into the
/// parent's description. Children with heterogeneous VAT rates are never
/// merged.
pub fn flatten(lines: Vec<Line>, config: &ShopConfig) -> Vec<Line> {
    let mut out = Vec::new();
    for line in lines {
        flatten_line(line, config, &mut out);
    }
    out
}

fn flatten_line(mut line: Line, config: &ShopConfig, out: &mut Vec<Line>) {
    let children = std::mem::take(&mut line.children);
    if children.is_empty() {
        out.push(line);
        return;
    }

    // Collapse grandchildren first so the decision below sees leaf lines.
    let mut flat_children = Vec::new();
    for child in children {
        flatten_line(child, config, &mut flat_children);
    }

    if keep_separate(&line, &flat_children, config) {
        correct_child_prices(&mut line, &mut flat_children, config);
        let parent_position = out.len() as u32;
        out.push(line);
        for mut child in flat_children {
            child.parent_index = Some(match child.parent_index {
                // Set by a nested pass: index relative to `flat_children`.
                Some(p) => parent_position + 1 + p,
                None => parent_position,
            });
            child.description = format!(" - {}", child.description);
            out.push(child);
        }
    } else {
        merge_children(&mut line, flat_children, config);
        out.push(line);
    }
}

/// Whether the children must remain separate lines.
///
/// Heterogeneous VAT rates force separation; otherwise the configured
/// thresholds decide.
fn keep_separate(parent: &Line, children: &[Line], config: &ShopConfig) -> bool {
    let mut rates: Vec<Decimal> = children
        .iter()
        .filter_map(|c| c.vat_rate)
        .map(|r| r.round_dp(3))
        .collect();
    if let Some(parent_rate) = parent.vat_rate {
        if !rates.is_empty() {
            rates.push(parent_rate.round_dp(3));
        }
    }
    rates.sort();
    rates.dedup();
    if rates.len() > 1 {
        return true;
    }

    if children.len() > config.max_child_lines_to_merge {
        return true;
    }
    if children.len() >= config.min_child_lines_to_keep {
        return true;
    }
    merged_description(parent, children).len() > config.max_merged_description_len
}

fn merged_description(parent: &Line, children: &[Line]) -> String {
    let joined = children
        .iter()
        .map(|c| c.description.trim())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} ({})", parent.description, joined)
}

/// Reconcile parent and child amounts for the separate-lines path,
/// according to where this webshop's plugins put the money.
fn correct_child_prices(parent: &mut Line, children: &mut [Line], config: &ShopConfig) {
    match config.child_price_mode {
        ChildPriceMode::ParentOnly => {
            for child in children.iter_mut() {
                zero_missing_amounts(child);
                copy_rate_from_parent(parent, child);
            }
        }
        ChildPriceMode::ChildrenOnly => {
            zero_missing_amounts(parent);
            copy_rate_from_children(parent, children);
        }
        ChildPriceMode::Doubled => {
            // The parent already carries the full amount; the same amounts
            // on the children would be counted twice.
            for child in children.iter_mut() {
                child.original_unit_price = child.unit_price;
                child.unit_price = Some(Decimal::ZERO);
                child.unit_price_inc = Some(Decimal::ZERO);
                child.vat_amount = Some(Decimal::ZERO);
                copy_rate_from_parent(parent, child);
            }
        }
        ChildPriceMode::Additive => {}
    }
}

/// A line without any price is informational; give it explicit zero
/// amounts. A line that carries one of the amounts is left alone; the
/// completor derives the rest consistently from its rate.
fn zero_missing_amounts(line: &mut Line) {
    if line.unit_price.is_none() && line.unit_price_inc.is_none() {
        line.unit_price = Some(Decimal::ZERO);
        line.unit_price_inc = Some(Decimal::ZERO);
        line.vat_amount = Some(Decimal::ZERO);
    }
}

fn copy_rate_from_parent(parent: &Line, child: &mut Line) {
    if child.vat_rate.is_none()
        && parent.vat_rate.is_some()
        && parent.vat_rate_source.is_correct()
    {
        child.vat_rate = parent.vat_rate;
        child.vat_rate_source = VatRateSource::CopiedFromParent;
    }
}

fn copy_rate_from_children(parent: &mut Line, children: &[Line]) {
    if parent.vat_rate.is_some() {
        return;
    }
    let mut rates: Vec<Decimal> = children
        .iter()
        .filter(|c| c.vat_rate_source.is_correct())
        .filter_map(|c| c.vat_rate)
        .map(|r| r.round_dp(3))
        .collect();
    rates.sort();
    rates.dedup();
    if let [rate] = rates[..] {
        parent.vat_rate = Some(rate);
        parent.vat_rate_source = VatRateSource::CopiedFromChildren;
    }
}

/// Merge children into the parent's description, folding their amounts in
/// when the parent does not already carry them.
fn merge_children(parent: &mut Line, children: Vec<Line>, config: &ShopConfig) {
    parent.description = merged_description(parent, &children);
    parent.children_merged = Some(children.len() as u32);

    let fold_amounts = matches!(
        config.child_price_mode,
        ChildPriceMode::ChildrenOnly | ChildPriceMode::Additive
    );
    if fold_amounts && !parent.quantity.is_zero() {
        let ex: Decimal = children.iter().filter_map(Line::total_ex).sum();
        let inc: Decimal = children.iter().filter_map(Line::total_inc).sum();
        let vat: Decimal = children.iter().filter_map(Line::total_vat).sum();
        if !ex.is_zero() || parent.unit_price.is_some() {
            parent.unit_price =
                Some(parent.unit_price.unwrap_or(Decimal::ZERO) + ex / parent.quantity);
        }
        if !inc.is_zero() || parent.unit_price_inc.is_some() {
            parent.unit_price_inc =
                Some(parent.unit_price_inc.unwrap_or(Decimal::ZERO) + inc / parent.quantity);
        }
        if !vat.is_zero() || parent.vat_amount.is_some() {
            parent.vat_amount =
                Some(parent.vat_amount.unwrap_or(Decimal::ZERO) + vat / parent.quantity);
        }
    }
}
