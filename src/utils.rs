use std::str::FromStr;
use tokio::time::Duration;

/// Parses a run duration such as "30", "30s", "10m", "5h" or "3d".
///
/// A bare number is taken as seconds. Supported units:
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let unit_char = match s.chars().last() {
        Some(c) => c,
        None => return Err("Duration string cannot be empty".to_string()),
    };

    if unit_char.is_ascii_digit() {
        return parse_seconds(s).map(Duration::from_secs);
    }

    let value_str = &s[..s.len() - unit_char.len_utf8()];
    let value = parse_seconds(value_str)?;

    let multiplier = match unit_char {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => {
            return Err(format!(
                "Unknown duration unit: '{}'. Use 's', 'm', 'h', or 'd'.",
                unit_char
            ))
        }
    };

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration '{}' is too large", s))
}

fn parse_seconds(value_str: &str) -> Result<u64, String> {
    u64::from_str(value_str)
        .map_err(|_| format!("Invalid numeric value in duration: '{}'", value_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_seconds() {
        assert_eq!(parse_duration_string("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parse_seconds_suffix() {
        assert_eq!(
            parse_duration_string("30s").unwrap(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn parse_minutes() {
        assert_eq!(
            parse_duration_string("10m").unwrap(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn parse_hours() {
        assert_eq!(
            parse_duration_string("5h").unwrap(),
            Duration::from_secs(18000)
        );
    }

    #[test]
    fn parse_days() {
        assert_eq!(
            parse_duration_string("3d").unwrap(),
            Duration::from_secs(259200)
        );
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(
            parse_duration_string("  10m  ").unwrap(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn empty_string_errors() {
        let err = parse_duration_string("   ").unwrap_err();
        assert!(err.contains("empty"), "error was: {}", err);
    }

    #[test]
    fn unknown_suffix_errors() {
        let err = parse_duration_string("10x").unwrap_err();
        assert!(err.contains("Unknown duration unit"), "error was: {}", err);
    }

    #[test]
    fn no_number_errors() {
        let err = parse_duration_string("m").unwrap_err();
        assert!(err.contains("Invalid numeric"), "error was: {}", err);
    }

    #[test]
    fn negative_number_errors() {
        let err = parse_duration_string("-5m").unwrap_err();
        assert!(err.contains("Invalid numeric"), "error was: {}", err);
    }

    #[test]
    fn overflow_errors() {
        let err = parse_duration_string("18446744073709551615d").unwrap_err();
        assert!(err.contains("too large"), "error was: {}", err);
    }
}
