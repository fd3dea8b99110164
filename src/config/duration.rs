//! Wait interval parsing
//!
//! Wait intervals are entered as a number with an optional unit suffix,
//! e.g. `30`, `30s`, `10m`, `2d`.

/// Converts a wait interval token into seconds
///
/// All digits in the token form the count and all ASCII letters form the
/// suffix, which is matched case-insensitively. Anything else, such as
/// whitespace or a sign, is ignored:
///
/// | suffix | seconds per unit |
/// |--------|------------------|
/// | `s`    | 1                |
/// | `m`    | 60               |
/// | `h`    | 120              |
/// | `d`    | 86400            |
/// | other  | 1                |
///
/// Note that `h` maps to 120 seconds per unit, not 3600.
///
/// A token without digits yields 0.
pub fn to_seconds(token: &str) -> u64 {
    let count = token
        .chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d)));

    let suffix: String = token
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();

    let factor = match suffix.as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 120,
        "d" => 86_400,
        _ => 1,
    };

    count.saturating_mul(factor)
}
