//! NACHA file construction, rendering, parsing and validation.
//!
//! Files are fixed-width: every record is 94 characters and rendered files
//! are padded to blocks of ten records with `9`-filler lines.

pub mod builder;
pub mod codes;
pub mod effective_date;
pub mod file;
pub mod records;

pub use builder::{build_file, BuildError, Options};
pub use codes::{ReturnCode, SecCode, TransactionCode};
pub use file::{AchError, Batch, File};
pub use records::{
    Addenda, Addenda98, Addenda99, BatchControl, BatchHeader, EntryDetail, FileControl, FileHeader,
};

pub(crate) const RECORD_LENGTH: usize = 94;
pub(crate) const BLOCKING_FACTOR: usize = 10;

/// Left-justified alphanumeric field, space padded and truncated to `width`.
pub(crate) fn alpha(value: &str, width: usize) -> String {
    let mut out: String = value
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .take(width)
        .collect();
    while out.len() < width {
        out.push(' ');
    }
    out
}

/// Right-justified numeric field, zero padded. Overflow keeps the low digits.
pub(crate) fn numeric(value: i64, width: usize) -> String {
    let s = format!("{:0>width$}", value, width = width);
    if s.len() > width {
        s[s.len() - width..].to_string()
    } else {
        s
    }
}

/// Right-justified field padded with spaces.
pub(crate) fn right(value: &str, width: usize) -> String {
    let trimmed: String = value.chars().take(width).collect();
    format!("{:>width$}", trimmed, width = width)
}

/// ABA check digit over the first eight digits of a routing number
/// (3-7-1 weighting).
pub fn check_digit(routing8: &str) -> Option<u32> {
    let digits: Vec<u32> = routing8.chars().map(|c| c.to_digit(10)).collect::<Option<_>>()?;
    if digits.len() != 8 {
        return None;
    }
    const WEIGHTS: [u32; 8] = [3, 7, 1, 3, 7, 1, 3, 7];
    let sum: u32 = digits.iter().zip(WEIGHTS.iter()).map(|(d, w)| d * w).sum();
    Some((10 - (sum % 10)) % 10)
}

/// Whether a full 9-digit routing number has a valid check digit.
pub fn valid_routing_number(routing: &str) -> bool {
    if routing.len() != 9 || !routing.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match (check_digit(&routing[..8]), routing[8..].chars().next().and_then(|c| c.to_digit(10))) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}

/// The first eight digits of a routing number, as written into entry details
/// and ODFI identification fields.
pub fn aba8(routing: &str) -> &str {
    if routing.len() >= 8 {
        &routing[..8]
    } else {
        routing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_pads_and_truncates() {
        assert_eq!(alpha("AB", 4), "AB  ");
        assert_eq!(alpha("ABCDE", 4), "ABCD");
        assert_eq!(alpha("", 3), "   ");
    }

    #[test]
    fn numeric_pads_and_keeps_low_digits() {
        assert_eq!(numeric(42, 6), "000042");
        assert_eq!(numeric(1234567, 6), "234567");
    }

    #[test]
    fn check_digit_matches_known_routing_numbers() {
        // 22147578 -> 6, 07100030 -> 1, 98765432 -> 0
        assert_eq!(check_digit("22147578"), Some(6));
        assert_eq!(check_digit("07100030"), Some(1));
        assert_eq!(check_digit("98765432"), Some(0));
    }

    #[test]
    fn routing_number_validation() {
        assert!(valid_routing_number("221475786"));
        assert!(valid_routing_number("071000301"));
        assert!(!valid_routing_number("221475780"));
        assert!(!valid_routing_number("12345678"));
        assert!(!valid_routing_number("22147578a"));
    }
}
