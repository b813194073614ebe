//! Formatting helpers shared by reports.

/// One hundred million, the display unit for trading value and market cap (억).
pub const HUNDRED_MILLION: f64 = 100_000_000.0;

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries so Hangul and other multi-byte names are safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Format a monetary magnitude in hundred-millions, e.g. `1_234_000_000` -> `"12.3억"`.
///
/// Display only; ratios must be computed on the raw values.
pub fn format_hundred_millions(value: f64) -> String {
    format!("{:.1}억", value / HUNDRED_MILLION)
}

/// Format a price with thousands separators, keeping two decimals only when needed.
pub fn format_price(price: f64) -> String {
    let negative = price < 0.0;
    let abs = price.abs();
    let whole = abs.trunc() as u64;
    let cents = ((abs - abs.trunc()) * 100.0).round() as u64;

    // Rounding the fraction can carry into the integer part.
    let (whole, cents) = if cents >= 100 { (whole + 1, 0) } else { (whole, cents) };

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    if cents == 0 {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{cents:02}")
    }
}

/// Format a percentage value (already in percent units) with one decimal.
pub fn format_pct(pct: f64) -> String {
    format!("{:.1}%", pct)
}
