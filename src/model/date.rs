//! PDF date strings (`D:YYYYMMDDHHmmSSOHH'mm'`).

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use std::fmt;

/// Point in time with the offset it was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfDate(pub DateTime<FixedOffset>);

impl PdfDate {
    /// Current time in UTC.
    pub fn now() -> Self {
        Self(Utc::now().with_timezone(&Utc.fix()))
    }

    /// Parse a PDF date string.
    ///
    /// Everything after the year is optional; missing fields default to the
    /// start of their range and a missing offset means UTC.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidPdf(format!("invalid date string {:?}", text));
        let body = text.trim().strip_prefix("D:").unwrap_or(text.trim());
        let bytes = body.as_bytes();
        let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits < 4 {
            return Err(invalid());
        }

        let field = |start: usize, len: usize, default: u32| -> u32 {
            if start + len > digits {
                return default;
            }
            body[start..start + len].parse().unwrap_or(default)
        };
        let year: i32 = body[..4].parse().map_err(|_| invalid())?;
        let month = field(4, 2, 1);
        let day = field(6, 2, 1);
        let hour = field(8, 2, 0);
        let minute = field(10, 2, 0);
        let second = field(12, 2, 0);

        let offset_seconds = parse_offset(&body[digits..]).ok_or_else(invalid)?;
        let offset = FixedOffset::east_opt(offset_seconds).ok_or_else(invalid)?;
        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or_else(invalid)?;
        let date = naive.and_local_timezone(offset).single().ok_or_else(invalid)?;
        Ok(Self(date))
    }

    /// Format as a PDF date string.
    pub fn to_pdf_string(&self) -> String {
        let d = &self.0;
        let offset = d.offset().local_minus_utc();
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.abs();
        format!(
            "D:{:04}{:02}{:02}{:02}{:02}{:02}{}{:02}'{:02}'",
            d.year(),
            d.month(),
            d.day(),
            d.hour(),
            d.minute(),
            d.second(),
            sign,
            abs / 3600,
            (abs % 3600) / 60
        )
    }

    /// Parse an RFC 3339 timestamp (DTO form).
    pub fn from_rfc3339(text: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(text)
            .map(Self)
            .map_err(|e| Error::InvalidPdf(format!("invalid RFC 3339 date {:?}: {}", text, e)))
    }

    /// Format as RFC 3339 (DTO form).
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl fmt::Display for PdfDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pdf_string())
    }
}

fn parse_offset(rest: &str) -> Option<i32> {
    let mut chars = rest.chars();
    let sign = match chars.next() {
        None | Some('Z') => return Some(0),
        Some('+') => 1,
        Some('-') => -1,
        Some(_) => return None,
    };
    let numbers: Vec<i32> = chars
        .as_str()
        .split('\'')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    let hours = numbers.first().copied().unwrap_or(0);
    let minutes = numbers.get(1).copied().unwrap_or(0);
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}
