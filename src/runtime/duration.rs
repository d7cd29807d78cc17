//! Duration codecs for the two SCORM timespan formats.
//!
//! SCORM 1.2 uses `CMITimespan` (`HHHH:MM:SS.SS`); SCORM 2004 uses ISO 8601
//! durations (`PnYnMnDTnHnMnS`). Both parse to seconds as `f64` with
//! centisecond precision. Malformed input parses to `0` through the lenient
//! entry points; the `try_` variants let the runtimes reject bad values.

use regex::Regex;
use std::sync::OnceLock;

const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;
const SECONDS_PER_MONTH: f64 = 30.0 * 86_400.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

fn timespan_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{2,}):([0-5]\d):([0-5]\d)(?:\.(\d{1,2}))?$").expect("static regex")
    })
}

fn iso8601_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let n = r"(\d+(?:\.\d+)?)";
        let pattern = format!(
            r"^P(?:{n}Y)?(?:{n}M)?(?:{n}D)?(?:T(?:{n}H)?(?:{n}M)?(?:{n}S)?)?$"
        );
        Regex::new(&pattern).expect("static regex")
    })
}

/// Rounds to whole centiseconds; negative and non-finite inputs clamp to zero.
fn to_centis(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 100.0).round() as u64
}

pub fn try_parse_time_interval(value: &str) -> Option<f64> {
    let caps = timespan_re().captures(value.trim())?;
    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let secs: u64 = caps[3].parse().ok()?;
    // ".5" is half a second, ".05" five centiseconds
    let centis = match caps.get(4).map(|m| m.as_str()) {
        Some(f) if f.len() == 1 => f.parse::<u64>().ok()? * 10,
        Some(f) => f.parse::<u64>().ok()?,
        None => 0,
    };
    // hour fields of any width are accepted, so overflow parses as malformed
    let total = hours
        .checked_mul(3_600)?
        .checked_add(minutes * 60 + secs)?
        .checked_mul(100)?
        .checked_add(centis)?;
    Some(total as f64 / 100.0)
}

/// `HHHH:MM:SS.SS` to seconds; malformed input is `0`.
pub fn parse_time_interval(value: &str) -> f64 {
    try_parse_time_interval(value).unwrap_or(0.0)
}

/// Seconds to `HHHH:MM:SS.SS`, hours padded to at least four digits.
pub fn format_time_interval(seconds: f64) -> String {
    let centis = to_centis(seconds);
    let hours = centis / 360_000;
    let minutes = (centis / 6_000) % 60;
    let secs = (centis / 100) % 60;
    let frac = centis % 100;
    format!("{hours:04}:{minutes:02}:{secs:02}.{frac:02}")
}

pub fn try_iso8601_to_seconds(value: &str) -> Option<f64> {
    let value = value.trim();
    let caps = iso8601_re().captures(value)?;
    // "P" and "PT" alone match the pattern but carry no designator
    if value == "P" || value.ends_with('T') {
        return None;
    }
    let weights = [
        SECONDS_PER_YEAR,
        SECONDS_PER_MONTH,
        SECONDS_PER_DAY,
        3_600.0,
        60.0,
        1.0,
    ];
    let mut total = 0.0;
    for (i, weight) in weights.iter().enumerate() {
        if let Some(m) = caps.get(i + 1) {
            total += m.as_str().parse::<f64>().ok()? * weight;
        }
    }
    total.is_finite().then_some(total)
}

/// ISO 8601 duration to seconds; malformed input is `0`.
pub fn iso8601_to_seconds(value: &str) -> f64 {
    try_iso8601_to_seconds(value).unwrap_or(0.0)
}

/// Seconds to `PT#H#M#S`. Zero components are dropped, but seconds are
/// always written when nothing else would be.
pub fn seconds_to_iso8601(seconds: f64) -> String {
    let centis = to_centis(seconds);
    let hours = centis / 360_000;
    let minutes = (centis / 6_000) % 60;
    let secs = (centis / 100) % 60;
    let frac = centis % 100;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if secs > 0 || frac > 0 || out.len() == 2 {
        if frac == 0 {
            out.push_str(&format!("{secs}S"));
        } else if frac % 10 == 0 {
            out.push_str(&format!("{secs}.{}S", frac / 10));
        } else {
            out.push_str(&format!("{secs}.{frac:02}S"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cmi_timespans() {
        assert_eq!(parse_time_interval("0000:05:00.00"), 300.0);
        assert_eq!(parse_time_interval("01:02:03"), 3723.0);
        assert_eq!(parse_time_interval("0000:00:01.5"), 1.5);
        assert_eq!(parse_time_interval("0000:00:00.05"), 0.05);
        assert_eq!(parse_time_interval("12345:00:00.00"), 12345.0 * 3600.0);
    }

    #[test]
    fn malformed_timespans_are_zero() {
        for bad in ["garbage", "", "1:00:00", "0000:61:00.00", "0000:00:00.123", "-001:00:00"] {
            assert_eq!(parse_time_interval(bad), 0.0, "{bad}");
        }
    }

    #[test]
    fn oversized_hour_field_is_zero() {
        let huge = "99999999999999999:00:00.00";
        assert_eq!(try_parse_time_interval(huge), None);
        assert_eq!(parse_time_interval(huge), 0.0);
        assert_eq!(parse_time_interval(&format!("{}:00:00", "9".repeat(40))), 0.0);
        // wide but representable hour fields still parse
        assert_eq!(parse_time_interval("99999999:00:00"), 99_999_999.0 * 3600.0);
    }

    #[test]
    fn formats_cmi_timespans() {
        assert_eq!(format_time_interval(0.0), "0000:00:00.00");
        assert_eq!(format_time_interval(300.0), "0000:05:00.00");
        assert_eq!(format_time_interval(3723.5), "0001:02:03.50");
        assert_eq!(format_time_interval(-4.0), "0000:00:00.00");
        assert_eq!(format_time_interval(36_000_000.0), "10000:00:00.00");
    }

    #[test]
    fn timespan_round_trips_whole_and_half_seconds() {
        for half_steps in (0..20_000u64).step_by(37) {
            let seconds = half_steps as f64 / 2.0;
            assert_eq!(parse_time_interval(&format_time_interval(seconds)), seconds);
        }
    }

    #[test]
    fn parses_iso_durations() {
        assert_eq!(iso8601_to_seconds("PT5M"), 300.0);
        assert_eq!(iso8601_to_seconds("PT1H30M5S"), 5405.0);
        assert_eq!(iso8601_to_seconds("PT0.25S"), 0.25);
        assert_eq!(iso8601_to_seconds("P1D"), 86_400.0);
        assert_eq!(iso8601_to_seconds("P1DT1S"), 86_401.0);
        assert_eq!(iso8601_to_seconds("P1Y"), SECONDS_PER_YEAR);
        assert_eq!(iso8601_to_seconds("P2M"), 2.0 * SECONDS_PER_MONTH);
    }

    #[test]
    fn malformed_iso_durations_are_zero() {
        for bad in ["garbage", "", "P", "PT", "T5M", "PT5X", "5S", "PT-5S", "P1DT"] {
            assert_eq!(iso8601_to_seconds(bad), 0.0, "{bad}");
            assert!(try_iso8601_to_seconds(bad).is_none(), "{bad}");
        }
    }

    #[test]
    fn non_finite_iso_durations_are_zero() {
        let seconds = format!("PT{}S", "9".repeat(400));
        let years = format!("P{}Y", "9".repeat(400));
        for bad in [&seconds, &years] {
            assert_eq!(try_iso8601_to_seconds(bad), None);
            assert_eq!(iso8601_to_seconds(bad), 0.0);
        }
        assert_eq!(iso8601_to_seconds("PT1000000000S"), 1e9);
    }

    #[test]
    fn formats_iso_durations() {
        assert_eq!(seconds_to_iso8601(0.0), "PT0S");
        assert_eq!(seconds_to_iso8601(300.0), "PT5M");
        assert_eq!(seconds_to_iso8601(3600.0), "PT1H");
        assert_eq!(seconds_to_iso8601(5405.0), "PT1H30M5S");
        assert_eq!(seconds_to_iso8601(1.5), "PT1.5S");
        assert_eq!(seconds_to_iso8601(0.05), "PT0.05S");
    }

    #[test]
    fn iso_round_trips_whole_and_half_seconds() {
        for half_steps in (0..20_000u64).step_by(37) {
            let seconds = half_steps as f64 / 2.0;
            assert_eq!(iso8601_to_seconds(&seconds_to_iso8601(seconds)), seconds);
        }
    }
}
