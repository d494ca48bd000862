//! Format Recommendation
//!
//! Suggests a format template for a batch of sample values. Samples are
//! profiled (kind, digit counts, string lengths, date-time shape) and the
//! profile is matched against a fixed decision table; the highest-confidence
//! matching rule wins, with a plain `{}` fallback when nothing matches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the formatted output is going to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageContext {
    Log,
    Ui,
    DataExport,
    Scientific,
    General,
    Network,
}

/// Dominant shape of the sampled values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Integer,
    Decimal,
    Text,
    Boolean,
    DateTime,
    Other,
}

/// What the recommender concluded from the samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub format_str: String,
    pub reason: String,
    /// 0-100.
    pub confidence: u8,
}

/// Aggregated features of one sample batch.
#[derive(Debug, Clone, Copy)]
pub struct SampleProfile {
    pub kind: SampleKind,
    /// Average significant digits across numeric samples.
    pub avg_digits: usize,
    pub integer_like: bool,
    /// Any value outside [1e-3, 1e6) in magnitude.
    pub wide_magnitude: bool,
    pub avg_length: usize,
}

/// Profiles a sample batch. The dominant kind is decided by majority, with
/// date-time strings counted separately from plain text.
pub fn profile_samples(samples: &[Value]) -> SampleProfile {
    let mut integers = 0usize;
    let mut decimals = 0usize;
    let mut texts = 0usize;
    let mut booleans = 0usize;
    let mut date_times = 0usize;
    let mut others = 0usize;

    let mut digit_sum = 0usize;
    let mut numeric_count = 0usize;
    let mut integer_like = true;
    let mut wide_magnitude = false;

    let mut length_sum = 0usize;
    let mut text_count = 0usize;

    for sample in samples {
        match sample {
            Value::Number(n) => {
                let value = n.as_f64().unwrap_or(0.0);
                if n.is_i64() || n.is_u64() {
                    integers += 1;
                } else {
                    decimals += 1;
                    if value.fract() != 0.0 {
                        integer_like = false;
                    }
                }
                let magnitude = value.abs();
                if magnitude >= 1e6 || (magnitude > 0.0 && magnitude < 1e-3) {
                    wide_magnitude = true;
                }
                digit_sum += digit_count(value);
                numeric_count += 1;
            }
            Value::String(s) => {
                if looks_like_date_time(s) {
                    date_times += 1;
                } else {
                    texts += 1;
                }
                length_sum += s.chars().count();
                text_count += 1;
            }
            Value::Bool(_) => booleans += 1,
            _ => others += 1,
        }
    }

    let tallies = [
        (SampleKind::Integer, integers),
        (SampleKind::Decimal, decimals),
        (SampleKind::Text, texts),
        (SampleKind::Boolean, booleans),
        (SampleKind::DateTime, date_times),
        (SampleKind::Other, others),
    ];
    let kind = tallies
        .iter()
        .max_by_key(|(_, count)| *count)
        .filter(|(_, count)| *count > 0)
        .map(|(kind, _)| *kind)
        .unwrap_or(SampleKind::Other);

    SampleProfile {
        kind,
        avg_digits: if numeric_count > 0 {
            digit_sum / numeric_count
        } else {
            0
        },
        integer_like,
        wide_magnitude,
        avg_length: if text_count > 0 {
            length_sum / text_count
        } else {
            0
        },
    }
}

/// Picks a template for the samples in the given context.
pub fn recommend(samples: &[Value], ctx: UsageContext) -> Recommendation {
    let profile = profile_samples(samples);

    // Ordered decision table; first match wins within a confidence tier, so
    // the more specific rules sit above the generic ones.
    let matched: Option<(&str, &str, u8)> = match (profile.kind, ctx) {
        (SampleKind::Integer, UsageContext::Log) if profile.avg_digits < 5 => {
            Some(("{}", "short integers read best unpadded in logs", 95))
        }
        (SampleKind::Integer, UsageContext::DataExport) if profile.avg_digits >= 10 => {
            Some(("{:>14}", "wide right-aligned columns keep large exports scannable", 90))
        }
        (SampleKind::Decimal, UsageContext::Scientific) => {
            Some(("{:.6}", "six fractional digits for scientific output", 92))
        }
        (SampleKind::Decimal, UsageContext::Log) if profile.integer_like => {
            Some(("{:.0}", "whole-valued decimals log cleaner without a fraction", 88))
        }
        (SampleKind::Decimal, UsageContext::DataExport) if profile.wide_magnitude => {
            Some(("{:.2}", "two fractional digits bound very wide value ranges", 85))
        }
        (SampleKind::Text, UsageContext::Ui) if profile.avg_length > 20 => {
            Some(("{:<20.20}", "fixed 20-character column for long UI strings", 80))
        }
        (SampleKind::Text, UsageContext::Log) => {
            Some(("\"{}\"", "quoted strings keep log fields grep-friendly", 85))
        }
        (SampleKind::DateTime, UsageContext::Log) => {
            Some(("{}", "date-time strings are already ISO shaped", 90))
        }
        (SampleKind::Boolean, _) => Some(("{}", "booleans need no decoration", 95)),
        _ => None,
    };

    let (format_str, reason, confidence) =
        matched.unwrap_or(("{}", "no specific rule matched; plain rendering", 50));

    tracing::debug!(
        "Recommended {:?} for {} sample(s) ({:?}, confidence {})",
        format_str,
        samples.len(),
        profile.kind,
        confidence
    );

    Recommendation {
        format_str: format_str.to_string(),
        reason: reason.to_string(),
        confidence,
    }
}

fn digit_count(value: f64) -> usize {
    let mut magnitude = value.abs().trunc();
    if magnitude < 1.0 {
        return 1;
    }
    let mut count = 0;
    while magnitude >= 1.0 {
        magnitude /= 10.0;
        count += 1;
    }
    count
}

/// Loose date-time shape check: `YYYY-MM-DD`-style prefixes or a clock-like
/// colon in the middle of the string.
fn looks_like_date_time(s: &str) -> bool {
    let has_clock = s
        .find(':')
        .is_some_and(|i| i > 0 && i < s.len().saturating_sub(1));
    let has_dated_prefix = s.len() >= 8
        && s.chars().take(4).all(|c| c.is_ascii_digit())
        && matches!(s.as_bytes().get(4), Some(&b'-') | Some(&b'/'));
    has_clock || has_dated_prefix
}
