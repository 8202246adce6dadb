//! Toggle control label and size badge.

use super::metric_cache::SizeSubset;

const THOUSAND: u64 = 1_000;
const MILLION: u64 = 1_000_000;

/// Render `value` with a `k`/`M` suffix.
///
/// One decimal is shown only when the remainder below the unit is at least
/// a tenth of it; the decimal is rounded half up.
fn with_suffix(n: u64, unit: u64, suffix: char) -> String {
    if n % unit >= unit / 10 {
        let tenths = (u128::from(n) * 10 + u128::from(unit / 2)) / u128::from(unit);
        format!("{}.{}{suffix}", tenths / 10, tenths % 10)
    } else {
        format!("{}{suffix}", n / unit)
    }
}

/// Format a size estimate for the badge. `None` (not computed yet) is `…`.
pub fn format_tokens(value: Option<u64>) -> String {
    match value {
        None => "…".to_string(),
        Some(n) if n >= MILLION => with_suffix(n, MILLION, 'M'),
        Some(n) if n >= THOUSAND => with_suffix(n, THOUSAND, 'k'),
        Some(n) => n.to_string(),
    }
}

/// Subset whose estimate the badge shows.
pub fn badge_subset(expanded: bool) -> SizeSubset {
    if expanded {
        SizeSubset::Total
    } else {
        SizeSubset::Visible
    }
}

/// `[T:// value]`
pub fn badge(value: Option<u64>) -> String {
    format!("[T:// {}]", format_tokens(value))
}

/// Full control label.
///
/// `hidden` is the number of turns outside the window; `estimate` is the
/// value for [`badge_subset`] of `expanded`.
pub fn control_label(expanded: bool, batch: usize, hidden: usize, estimate: Option<u64>) -> String {
    let badge = badge(estimate);
    if expanded {
        format!("Show only last {batch} {badge}")
    } else if hidden > 0 {
        format!("Show {hidden} older {badge}")
    } else {
        format!("Hide older (none) {badge}")
    }
}
