//! Checks for the string `format` keyword.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::{Ipv4Addr, Ipv6Addr};

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex")
});
static RE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex"));
static RE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d(:[0-5]\d(\.\d+)?)?(Z|[+-]([01]\d|2[0-3]):[0-5]\d)?$")
        .expect("time regex")
});
static RE_HOST_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("hostname regex")
});

/// String formats with a dedicated check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Email,
    Url,
    Uuid,
    Date,
    DateTime,
    Time,
    Hostname,
    Ipv4,
    Ipv6,
}

impl Format {
    /// Look up a format keyword. Unknown formats return `None` and are not
    /// enforced.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "email" => Format::Email,
            "url" | "uri" => Format::Url,
            "uuid" => Format::Uuid,
            "date" => Format::Date,
            "date-time" => Format::DateTime,
            "time" => Format::Time,
            "hostname" => Format::Hostname,
            "ipv4" => Format::Ipv4,
            "ipv6" => Format::Ipv6,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Email => "email",
            Format::Url => "url",
            Format::Uuid => "uuid",
            Format::Date => "date",
            Format::DateTime => "date-time",
            Format::Time => "time",
            Format::Hostname => "hostname",
            Format::Ipv4 => "ipv4",
            Format::Ipv6 => "ipv6",
        }
    }

    pub fn check(&self, s: &str) -> bool {
        match self {
            Format::Email => RE_EMAIL.is_match(s),
            Format::Url => url::Url::parse(s).is_ok_and(|u| u.has_host() || u.scheme() == "file"),
            // Hyphenated form only; `parse_str` also takes simple, braced and urn forms.
            Format::Uuid => s.len() == 36 && uuid::Uuid::parse_str(s).is_ok(),
            Format::Date => {
                RE_DATE.is_match(s) && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }
            Format::DateTime => DateTime::parse_from_rfc3339(s).is_ok(),
            Format::Time => RE_TIME.is_match(s),
            Format::Hostname => is_hostname(s),
            Format::Ipv4 => s.parse::<Ipv4Addr>().is_ok(),
            Format::Ipv6 => s.parse::<Ipv6Addr>().is_ok(),
        }
    }
}

fn is_hostname(s: &str) -> bool {
    let s = s.strip_suffix('.').unwrap_or(s);
    !s.is_empty() && s.len() <= 253 && s.split('.').all(|label| RE_HOST_LABEL.is_match(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(Format::Email.check("ops@example.com"));
        assert!(Format::Email.check("first.last+tag@mail.example.co.uk"));
        assert!(!Format::Email.check("not-an-email"));
        assert!(!Format::Email.check("a@b"));
    }

    #[test]
    fn test_url() {
        assert!(Format::Url.check("https://example.com/path?q=1"));
        assert!(!Format::Url.check("example.com"));
        assert!(!Format::Url.check("mailto:"));
    }

    #[test]
    fn test_uuid() {
        assert!(Format::Uuid.check("123e4567-e89b-12d3-a456-426614174000"));
        assert!(!Format::Uuid.check("123e4567e89b12d3a456426614174000"));
        assert!(!Format::Uuid.check("{123e4567-e89b-12d3-a456-426614174000}"));
        assert!(!Format::Uuid.check("123e4567-e89b-12d3-a456-42661417400g"));
    }

    #[test]
    fn test_date_and_time() {
        assert!(Format::Date.check("2024-02-29"));
        assert!(!Format::Date.check("2023-02-29"));
        assert!(!Format::Date.check("2024-2-9"));
        assert!(Format::DateTime.check("2024-05-01T12:30:00Z"));
        assert!(Format::DateTime.check("2024-05-01T12:30:00.125+02:00"));
        assert!(!Format::DateTime.check("2024-05-01 12:30"));
        assert!(Format::Time.check("23:59:59"));
        assert!(Format::Time.check("08:15"));
        assert!(Format::Time.check("08:15:00.5Z"));
        assert!(!Format::Time.check("24:00:00"));
    }

    #[test]
    fn test_hostname() {
        assert!(Format::Hostname.check("api.example.com"));
        assert!(Format::Hostname.check("localhost"));
        assert!(!Format::Hostname.check("-bad.example.com"));
        assert!(!Format::Hostname.check("under_score.com"));
        assert!(!Format::Hostname.check(""));
    }

    #[test]
    fn test_ip_addresses() {
        assert!(Format::Ipv4.check("192.168.0.1"));
        assert!(!Format::Ipv4.check("256.1.1.1"));
        assert!(Format::Ipv6.check("::1"));
        assert!(Format::Ipv6.check("2001:db8::8a2e:370:7334"));
        assert!(!Format::Ipv6.check("192.168.0.1"));
    }

    #[test]
    fn test_unknown_format_is_not_enforced() {
        assert_eq!(Format::from_name("credit-card"), None);
        assert_eq!(Format::from_name("uri"), Some(Format::Url));
    }
}
