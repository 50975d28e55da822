use std::time::Duration;

/// Parses a `\d+(s|m|h)?` time string per `§6.5`, defaulting to the given
/// unit when no suffix is present.
pub fn parse_duration(input: &str, default_unit: TimeUnit) -> Option<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (digits, unit) = match trimmed.chars().last() {
        Some('s') => (&trimmed[..trimmed.len() - 1], TimeUnit::Seconds),
        Some('m') => (&trimmed[..trimmed.len() - 1], TimeUnit::Minutes),
        Some('h') => (&trimmed[..trimmed.len() - 1], TimeUnit::Hours),
        _ => (trimmed, default_unit),
    };
    let n: u64 = digits.parse().ok()?;
    Some(match unit {
        TimeUnit::Seconds => Duration::from_secs(n),
        TimeUnit::Minutes => Duration::from_secs(n * 60),
        TimeUnit::Hours => Duration::from_secs(n * 3600),
    })
}

#[derive(Debug, Clone, Copy)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_number_uses_default_unit() {
        assert_eq!(
            parse_duration("1", TimeUnit::Hours),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn suffix_overrides_default_unit() {
        assert_eq!(
            parse_duration("10m", TimeUnit::Hours),
            Some(Duration::from_secs(600))
        );
        assert_eq!(
            parse_duration("30s", TimeUnit::Minutes),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(parse_duration("", TimeUnit::Seconds), None);
    }
}
