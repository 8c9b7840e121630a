use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn format_decimal(value: f64) -> String {
    format!("{:.2}", value)
}

/// Two decimals with Indian digit grouping: `1234567.5` -> `12,34,567.50`.
pub fn format_inr(value: f64) -> String {
    let fixed = format_decimal(value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let negative = value < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0');

    let grouped = if whole.len() <= 3 {
        whole.to_string()
    } else {
        let (head, last_three) = whole.split_at(whole.len() - 3);
        let mut groups = Vec::new();
        let mut rest = head;
        while rest.len() > 2 {
            let (front, pair) = rest.split_at(rest.len() - 2);
            groups.push(pair);
            rest = front;
        }
        groups.push(rest);
        groups.reverse();
        format!("{},{}", groups.join(","), last_three)
    };

    if negative {
        format!("-{}.{}", grouped, fraction)
    } else {
        format!("{}.{}", grouped, fraction)
    }
}

pub fn format_money(symbol: &str, value: f64) -> String {
    format!("{}{}", symbol, format_inr(value))
}

pub fn parse_decimal(value: &str) -> Result<f64> {
    let parsed = value
        .trim()
        .replace(',', "")
        .parse::<f64>()
        .map_err(|e| anyhow!("Parse decimal '{}': {}", value, e))?;
    if !parsed.is_finite() {
        return Err(anyhow!("Parse decimal '{}': not a finite number", value));
    }
    Ok(parsed)
}

/// Empty or whitespace-only form input counts as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
