//! Report rendering and financial impact assessment

pub mod generator;
pub mod impact;

pub use generator::*;
pub use impact::*;

use bigdecimal::BigDecimal;

/// Insert thousands separators into a string of ASCII digits
fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Two-decimal money with thousands separators, e.g. `1,234.50`
pub fn format_money(amount: &BigDecimal) -> String {
    let text = amount.round(2).with_scale(2).to_string();
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, "00"));
    format!("{}{}.{}", sign, group_thousands(whole), fraction)
}

/// Count with thousands separators
pub fn format_count(count: usize) -> String {
    group_thousands(&count.to_string())
}

/// A rate as a two-decimal percentage, e.g. `0.0125` → `1.25%`
pub fn format_percent(rate: &BigDecimal) -> String {
    let percent = rate.clone() * BigDecimal::from(100);
    format!("{}%", percent.round(2).with_scale(2))
}
