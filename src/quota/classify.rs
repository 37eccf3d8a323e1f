//! API error text classification.
//!
//! Upstream APIs report quota and rate problems as free-form error strings.
//! All keyword matching lives in this one function; everything else in the
//! crate works with the closed [`ErrorKind`] enum.

/// What an API error string tells us about the key that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Daily quota or billing limit hit; the key is out for the day.
    QuotaExceeded,
    /// Per-minute rate limit hit; the key recovers at the minute boundary.
    RateLimited,
    /// Anything else; repeated occurrences escalate the key to error status.
    Transient,
}

const QUOTA_KEYWORDS: [&str; 4] = ["quota", "limit exceeded", "resource exhausted", "billing"];
const RATE_KEYWORDS: [&str; 2] = ["rate limit", "429"];

/// Classifies an upstream error message.
pub fn classify_error(text: &str) -> ErrorKind {
    let lower = text.to_lowercase();
    if QUOTA_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        ErrorKind::QuotaExceeded
    } else if RATE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        ErrorKind::RateLimited
    } else {
        ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_keywords() {
        assert_eq!(classify_error("Quota exceeded for today"), ErrorKind::QuotaExceeded);
        assert_eq!(classify_error("RESOURCE EXHAUSTED"), ErrorKind::QuotaExceeded);
        assert_eq!(classify_error("billing account suspended"), ErrorKind::QuotaExceeded);
        assert_eq!(classify_error("daily limit exceeded"), ErrorKind::QuotaExceeded);
    }

    #[test]
    fn test_rate_limit_keywords() {
        assert_eq!(classify_error("Rate limit hit, slow down"), ErrorKind::RateLimited);
        assert_eq!(classify_error("HTTP 429 Too Many Requests"), ErrorKind::RateLimited);
    }

    #[test]
    fn test_quota_takes_precedence_over_rate() {
        // "quota" wins even when both families of keywords appear
        assert_eq!(
            classify_error("429: quota exceeded"),
            ErrorKind::QuotaExceeded
        );
    }

    #[test]
    fn test_everything_else_is_transient() {
        assert_eq!(classify_error("connection reset by peer"), ErrorKind::Transient);
        assert_eq!(classify_error("internal server error"), ErrorKind::Transient);
        assert_eq!(classify_error(""), ErrorKind::Transient);
    }
}
