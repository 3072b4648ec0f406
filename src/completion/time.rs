use super::{CompletionCriteria, CriteriaBudget, InversionState};
use crate::error::{FaultForgeError, FfResult};
use std::fmt;

const MILLIS_PER_SEC: u64 = 1000;
const MILLIS_PER_MIN: u64 = 60 * MILLIS_PER_SEC;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MIN;

/// Satisfied once the elapsed wall-clock time reaches the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCompletionCriteria {
    millis: u64,
}

impl TimeCompletionCriteria {
    pub fn new(millis: u64) -> Self {
        Self { millis }
    }

    pub fn in_hours(hours: u64) -> Self {
        Self::new(hours * MILLIS_PER_HOUR)
    }

    pub fn in_minutes(minutes: u64) -> Self {
        Self::new(minutes * MILLIS_PER_MIN)
    }

    pub fn in_seconds(seconds: u64) -> Self {
        Self::new(seconds * MILLIS_PER_SEC)
    }

    pub fn from_time_string(s: &str) -> FfResult<Self> {
        Ok(Self::new(parse_time_string(s)?))
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn time_str(&self) -> String {
        get_time_str(self.millis)
    }
}

/// Parses `<n>h`, `<n>m`, `<n>s`, `<n>mi` (milliseconds) or a bare number of
/// milliseconds. Whole numbers only.
pub fn parse_time_string(s: &str) -> FfResult<u64> {
    let s = s.trim().to_lowercase();
    let (digits, scale) = if let Some(v) = s.strip_suffix("mi") {
        (v, 1)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, MILLIS_PER_HOUR)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, MILLIS_PER_MIN)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, MILLIS_PER_SEC)
    } else {
        (s.as_str(), 1)
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|e| FaultForgeError::Parse(format!("Invalid time '{}': {}", s, e)))?;
    value
        .checked_mul(scale)
        .ok_or_else(|| FaultForgeError::Parse(format!("Time '{}' overflows", s)))
}

/// Formats with the largest unit that divides the value exactly.
pub fn get_time_str(millis: u64) -> String {
    if millis > 0 && millis % MILLIS_PER_HOUR == 0 {
        format!("{}h", millis / MILLIS_PER_HOUR)
    } else if millis > 0 && millis % MILLIS_PER_MIN == 0 {
        format!("{}m", millis / MILLIS_PER_MIN)
    } else if millis > 0 && millis % MILLIS_PER_SEC == 0 {
        format!("{}s", millis / MILLIS_PER_SEC)
    } else {
        format!("{}mi", millis)
    }
}

impl CompletionCriteria for TimeCompletionCriteria {
    fn is_satisfied(&self, state: &InversionState) -> bool {
        state.elapsed_millis >= self.millis
    }

    fn budget(&self) -> Option<CriteriaBudget> {
        Some(CriteriaBudget::Millis(self.millis))
    }

    fn to_arg(&self) -> Option<String> {
        Some(self.time_str())
    }
}

impl fmt::Display for TimeCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeCompletionCriteria(time: {})", self.time_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mi_suffix_is_millis() {
        assert_eq!(parse_time_string("250mi").unwrap(), 250);
        assert_eq!(parse_time_string("3m").unwrap(), 180_000);
    }

    #[test]
    fn test_time_str_picks_exact_unit() {
        assert_eq!(get_time_str(90_000), "90s");
        assert_eq!(get_time_str(120_000), "2m");
        assert_eq!(get_time_str(1_500), "1500mi");
        assert_eq!(get_time_str(0), "0mi");
    }
}
