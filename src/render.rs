//! Presentation boundary
//!
//! The service never touches presentation; it hands `MarketEntry` records to
//! whatever implements `Render`. The built-in implementation prints a plain
//! text table.

use crate::data::MarketEntry;

/// Narrow interface the data layer renders through.
pub trait Render {
    /// Displays the entries. `animate` hints that values changed since the
    /// last call and may be highlighted.
    fn render(&self, entries: &[MarketEntry], animate: bool);
}

/// Plain text renderer for terminal output.
pub struct TextRenderer;

impl Render for TextRenderer {
    fn render(&self, entries: &[MarketEntry], animate: bool) {
        for entry in entries {
            let marker = if entry.is_fallback { " (estimated)" } else { "" };
            let changed = if animate { "* " } else { "  " };
            let chart = match &entry.sparkline_7d {
                Some(points) => format!("{} pts", points.len()),
                None => "no chart data".to_string(),
            };
            println!(
                "{changed}{:<24} {:>6}  ${:>12}  {:>8}  vol {:>9}  cap {:>9}  [{chart}]{marker}",
                entry.name,
                entry.symbol,
                format_price(entry.current_price),
                format_change(entry.price_change_pct_24h),
                format_large_number(entry.total_volume),
                format_large_number(entry.market_cap),
            );
        }
    }
}

/// Formats a USD price: two decimals with thousands separators at a dollar
/// and above, four decimals below, `N/A` when unavailable.
pub fn format_price(price: Option<f64>) -> String {
    match price {
        None => "N/A".to_string(),
        Some(p) if p >= 1.0 => group_thousands(&format!("{p:.2}")),
        Some(p) => format!("{p:.4}"),
    }
}

/// Formats a 24h change as a signed percentage.
pub fn format_change(pct: f64) -> String {
    format!("{pct:+.2}%")
}

/// Formats a large USD figure with a T/B/M suffix.
pub fn format_large_number(num: Option<f64>) -> String {
    match num {
        None => "N/A".to_string(),
        Some(n) if n >= 1e12 => format!("{:.2}T", n / 1e12),
        Some(n) if n >= 1e9 => format!("{:.2}B", n / 1e9),
        Some(n) if n >= 1e6 => format!("{:.2}M", n / 1e6),
        Some(n) => group_thousands(&format!("{n:.0}")),
    }
}

/// Inserts comma separators into the integer part of a formatted number.
fn group_thousands(formatted: &str) -> String {
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted, None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    match frac_part {
        Some(frac) => format!("{grouped}.{frac}"),
        None => grouped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price_above_a_dollar() {
        assert_eq!(format_price(Some(67500.12)), "67,500.12");
        assert_eq!(format_price(Some(1.0)), "1.00");
    }

    #[test]
    fn test_format_price_below_a_dollar() {
        assert_eq!(format_price(Some(0.1401)), "0.1401");
        assert_eq!(format_price(Some(0.49)), "0.4900");
    }

    #[test]
    fn test_format_price_unavailable() {
        assert_eq!(format_price(None), "N/A");
    }

    #[test]
    fn test_format_large_number_suffixes() {
        assert_eq!(format_large_number(Some(1.33e12)), "1.33T");
        assert_eq!(format_large_number(Some(3.2e10)), "32.00B");
        assert_eq!(format_large_number(Some(4.56e6)), "4.56M");
        assert_eq!(format_large_number(Some(12345.0)), "12,345");
        assert_eq!(format_large_number(None), "N/A");
    }

    #[test]
    fn test_format_change_is_signed() {
        assert_eq!(format_change(2.5), "+2.50%");
        assert_eq!(format_change(-0.8), "-0.80%");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1234567.89"), "1,234,567.89");
        assert_eq!(group_thousands("100"), "100");
        assert_eq!(group_thousands("1000"), "1,000");
    }
}
