use ethers_core::types::U256;

use crate::blockchain::models::{TokenBalance, TokenError, U256Parts};

const CURRENCY_GLYPHS: &[char] = &['$', '€', '£', '¥'];

/// Builds a live balance from a validated `{low, high}` pair.
pub fn format_balance(parts: &U256Parts, decimals: u32) -> Result<TokenBalance, TokenError> {
    let value = parts.to_u256()?;
    let formatted = format_units(value, decimals);
    Ok(TokenBalance {
        numeric_value: parse_numeric_value(&formatted),
        formatted,
        raw: parts.clone(),
        is_real_data: true,
    })
}

/// Divides by `10^decimals`, drops trailing fractional zeros and groups the
/// whole part in thousands.
pub fn format_units(value: U256, decimals: u32) -> String {
    let (whole, fraction) = if decimals == 0 {
        (value, U256::zero())
    } else if decimals > 77 {
        // 10^78 no longer fits in a U256; every representable value is a pure fraction.
        (U256::zero(), value)
    } else {
        value.div_mod(U256::exp10(decimals as usize))
    };

    let whole = group_thousands(&whole.to_string());
    if fraction.is_zero() {
        return whole;
    }

    let digits = fraction.to_string();
    let padded = format!("{}{}", "0".repeat((decimals as usize).saturating_sub(digits.len())), digits);
    format!("{}.{}", whole, padded.trim_end_matches('0'))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Parses a display string back into a float, ignoring separators and
/// currency glyphs. Anything unparseable is 0.
pub fn parse_numeric_value(formatted: &str) -> f64 {
    let cleaned: String = formatted
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace() && !CURRENCY_GLYPHS.contains(c))
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

impl TokenBalance {
    /// Placeholder used when no live data is available, e.g. before a wallet
    /// connects. Always flagged `is_real_data = false`.
    pub fn fallback(magnitude: &str) -> Self {
        Self {
            numeric_value: parse_numeric_value(magnitude),
            formatted: magnitude.to_string(),
            raw: U256Parts::zero(),
            is_real_data: false,
        }
    }
}
