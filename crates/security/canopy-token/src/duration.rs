//! Duration-string parsing for the configured token validity.
//!
//! Accepted forms: `500ms`, `30s`, `15m`, `24h`, `7d`, or a bare integer
//! meaning seconds.

use std::time::Duration;

use canopy_types::CatalogError;

/// Parse a human-readable duration string.
pub fn parse_duration(s: &str) -> Result<Duration, CatalogError> {
    let s = s.trim().to_lowercase();
    let err = || CatalogError::UnableToParseTokenDuration(s.clone());

    if let Some(num) = s.strip_suffix("ms") {
        return num.parse::<u64>().map(Duration::from_millis).map_err(|_| err());
    }
    if let Some(num) = s.strip_suffix('s') {
        return num.parse::<u64>().map(Duration::from_secs).map_err(|_| err());
    }
    if let Some(num) = s.strip_suffix('m') {
        return num
            .parse::<u64>()
            .map(|n| Duration::from_secs(n * 60))
            .map_err(|_| err());
    }
    if let Some(num) = s.strip_suffix('h') {
        return num
            .parse::<u64>()
            .map(|n| Duration::from_secs(n * 3600))
            .map_err(|_| err());
    }
    if let Some(num) = s.strip_suffix('d') {
        return num
            .parse::<u64>()
            .map(|n| Duration::from_secs(n * 86400))
            .map_err(|_| err());
    }
    if let Ok(num) = s.parse::<u64>() {
        return Ok(Duration::from_secs(num));
    }
    Err(err())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_forms() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration(" 2H ").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn garbage_is_rejected() {
        for bad in ["", "h", "12x", "-5s", "1.5h", "ms"] {
            assert!(matches!(
                parse_duration(bad),
                Err(CatalogError::UnableToParseTokenDuration(_))
            ));
        }
    }
}
