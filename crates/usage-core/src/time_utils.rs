use chrono::{DateTime, Offset};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{Result, UsageError};

/// Zone the vendor exports are recorded in.
pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";

const MINUTE_MS: i64 = 60_000;
const HALF_MINUTE_MS: i64 = 30_000;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Uses the `iana-time-zone` crate directly – no subprocess calls.
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve the `"auto"` sentinel to the system zone; other names pass through.
pub fn resolve_timezone_name(name: &str) -> String {
    if name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        name.to_string()
    }
}

// ── TimestampStyle ────────────────────────────────────────────────────────────

/// Civil renderings used by the exports and the timestamp tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStyle {
    /// `yyyy/MM/dd HH:mm:ss`, the `formatedTime` CSV column.
    Csv,
    /// `yyyy年MM月dd日 HH時mm分`, the rounded timestamp display.
    JapaneseMinute,
    /// `yyyy年MM月dd日 HH時mm分ss秒`, the live preview of an unrounded input.
    JapaneseSecond,
}

impl TimestampStyle {
    fn pattern(self) -> &'static str {
        match self {
            TimestampStyle::Csv => "%Y/%m/%d %H:%M:%S",
            TimestampStyle::JapaneseMinute => "%Y年%m月%d日 %H時%M分",
            TimestampStyle::JapaneseSecond => "%Y年%m月%d日 %H時%M分%S秒",
        }
    }
}

// ── CivilClock ────────────────────────────────────────────────────────────────

/// Minute rounding and rendering of epoch-millisecond timestamps in one
/// explicit civil time zone.
///
/// Rounding and formatting never consult the host's default zone; the zone
/// is fixed when the clock is built and is the same for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilClock {
    tz: Tz,
}

impl Default for CivilClock {
    fn default() -> Self {
        Self { tz: Tz::Asia__Tokyo }
    }
}

impl CivilClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Build a clock from an IANA zone name.
    ///
    /// If `tz_name` is not a recognised IANA timezone, falls back to
    /// [`DEFAULT_TIMEZONE`] and logs a warning.
    pub fn from_name(tz_name: &str) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "CivilClock: unrecognised timezone \"{}\", falling back to {}",
                tz_name, DEFAULT_TIMEZONE
            );
            Tz::Asia__Tokyo
        });
        Self { tz }
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.parse::<Tz>().is_ok()
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    fn to_civil(&self, timestamp_ms: i64) -> Result<DateTime<Tz>> {
        DateTime::from_timestamp_millis(timestamp_ms)
            .map(|dt| dt.with_timezone(&self.tz))
            .ok_or_else(|| UsageError::InvalidTimestamp(timestamp_ms.to_string()))
    }

    /// Round `timestamp_ms` to the nearest whole civil minute.
    ///
    /// A civil seconds value of 30 or more advances to the next minute;
    /// seconds and milliseconds of the result are always zero. The offset in
    /// effect at the source instant is used, so DST transitions are not
    /// special-cased.
    pub fn round_to_minute(&self, timestamp_ms: i64) -> Result<i64> {
        let civil = self.to_civil(timestamp_ms)?;
        let offset_ms = i64::from(civil.offset().fix().local_minus_utc()) * 1_000;

        let within_minute = (timestamp_ms + offset_ms).rem_euclid(MINUTE_MS);
        let floor = timestamp_ms - within_minute;
        let rounded = if within_minute >= HALF_MINUTE_MS {
            floor + MINUTE_MS
        } else {
            floor
        };

        // The extra minute can step past the last representable instant.
        self.to_civil(rounded)?;
        Ok(rounded)
    }

    /// Render `timestamp_ms` in this clock's zone.
    pub fn format(&self, timestamp_ms: i64, style: TimestampStyle) -> Result<String> {
        Ok(self
            .to_civil(timestamp_ms)?
            .format(style.pattern())
            .to_string())
    }
}

// ── Timestamp conversion ──────────────────────────────────────────────────────

/// A single epoch-millisecond value, rounded and rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampConversion {
    pub original: i64,
    pub rounded: i64,
    /// Unrounded input, second precision.
    pub original_display: String,
    /// Rounded value, minute precision.
    pub rounded_display: String,
}

/// Parse `input` as epoch milliseconds and round it with `clock`.
pub fn convert_timestamp(input: &str, clock: &CivilClock) -> Result<TimestampConversion> {
    let original = input
        .trim()
        .parse::<i64>()
        .map_err(|_| UsageError::InvalidTimestamp(input.to_string()))?;
    let rounded = clock.round_to_minute(original)?;
    Ok(TimestampConversion {
        original,
        rounded,
        original_display: clock.format(original, TimestampStyle::JapaneseSecond)?,
        rounded_display: clock.format(rounded, TimestampStyle::JapaneseMinute)?,
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-04-30T18:00:00Z, 2024-05-01 03:00:00 in Tokyo.
    const BASE: i64 = 1_714_500_000_000;

    fn tokyo() -> CivilClock {
        CivilClock::from_name("Asia/Tokyo")
    }

    // ── construction ─────────────────────────────────────────────────────────

    #[test]
    fn test_validate_timezone() {
        assert!(CivilClock::validate_timezone("Asia/Tokyo"));
        assert!(CivilClock::validate_timezone("UTC"));
        assert!(!CivilClock::validate_timezone("Mars/Olympus"));
        assert!(!CivilClock::validate_timezone(""));
    }

    #[test]
    fn test_from_name_invalid_falls_back_to_tokyo() {
        let clock = CivilClock::from_name("Invalid/Zone");
        assert_eq!(clock.tz(), Tz::Asia__Tokyo);
        assert_eq!(clock, CivilClock::default());
    }

    #[test]
    fn test_resolve_timezone_name_passthrough() {
        assert_eq!(resolve_timezone_name("Europe/Berlin"), "Europe/Berlin");
        assert!(!resolve_timezone_name("auto").is_empty());
    }

    // ── round_to_minute ──────────────────────────────────────────────────────

    #[test]
    fn test_round_exact_minute_is_unchanged() {
        assert_eq!(tokyo().round_to_minute(BASE).unwrap(), BASE);
    }

    #[test]
    fn test_round_below_half_minute_goes_down() {
        let clock = tokyo();
        assert_eq!(clock.round_to_minute(BASE + 29_000).unwrap(), BASE);
        assert_eq!(clock.round_to_minute(BASE + 29_999).unwrap(), BASE);
    }

    #[test]
    fn test_round_half_minute_goes_up() {
        let clock = tokyo();
        assert_eq!(clock.round_to_minute(BASE + 30_000).unwrap(), BASE + 60_000);
        assert_eq!(clock.round_to_minute(BASE + 59_999).unwrap(), BASE + 60_000);
    }

    #[test]
    fn test_round_before_epoch() {
        let clock = CivilClock::from_name("UTC");
        assert_eq!(clock.round_to_minute(-1).unwrap(), 0);
        assert_eq!(clock.round_to_minute(-31_000).unwrap(), -60_000);
    }

    #[test]
    fn test_round_half_hour_offset_zone() {
        let kolkata = CivilClock::from_name("Asia/Kolkata");
        assert_eq!(kolkata.round_to_minute(BASE + 45_000).unwrap(), BASE + 60_000);
        assert_eq!(kolkata.round_to_minute(BASE + 15_000).unwrap(), BASE);
    }

    #[test]
    fn test_round_is_idempotent_and_minute_aligned() {
        let clock = tokyo();
        for step in 0..500 {
            let t = BASE + step * 7_919;
            let once = clock.round_to_minute(t).unwrap();
            assert_eq!(once.rem_euclid(60_000), 0, "not aligned for {t}");
            assert_eq!(clock.round_to_minute(once).unwrap(), once);
            assert!((once - t).abs() <= 30_000);
        }
    }

    #[test]
    fn test_round_out_of_range_is_invalid() {
        let err = tokyo().round_to_minute(i64::MAX).unwrap_err();
        assert!(matches!(err, UsageError::InvalidTimestamp(_)));
    }

    // ── format ───────────────────────────────────────────────────────────────

    #[test]
    fn test_format_csv_style_tokyo() {
        let s = tokyo().format(BASE, TimestampStyle::Csv).unwrap();
        assert_eq!(s, "2024/05/01 03:00:00");
    }

    #[test]
    fn test_format_csv_style_utc() {
        let s = CivilClock::from_name("UTC")
            .format(BASE, TimestampStyle::Csv)
            .unwrap();
        assert_eq!(s, "2024/04/30 18:00:00");
    }

    #[test]
    fn test_format_csv_style_dst_zone() {
        // New York is on EDT (UTC-4) at the end of April.
        let s = CivilClock::from_name("America/New_York")
            .format(BASE, TimestampStyle::Csv)
            .unwrap();
        assert_eq!(s, "2024/04/30 14:00:00");
    }

    #[test]
    fn test_format_japanese_minute_style() {
        let s = tokyo().format(BASE, TimestampStyle::JapaneseMinute).unwrap();
        assert_eq!(s, "2024年05月01日 03時00分");
    }

    #[test]
    fn test_format_japanese_second_style() {
        let s = tokyo()
            .format(BASE + 29_000, TimestampStyle::JapaneseSecond)
            .unwrap();
        assert_eq!(s, "2024年05月01日 03時00分29秒");
    }

    #[test]
    fn test_format_out_of_range_is_invalid() {
        assert!(tokyo().format(i64::MIN, TimestampStyle::Csv).is_err());
    }

    // ── convert_timestamp ────────────────────────────────────────────────────

    #[test]
    fn test_convert_timestamp() {
        let c = convert_timestamp(" 1714500045000 ", &tokyo()).unwrap();
        assert_eq!(c.original, BASE + 45_000);
        assert_eq!(c.rounded, BASE + 60_000);
        assert_eq!(c.original_display, "2024年05月01日 03時00分45秒");
        assert_eq!(c.rounded_display, "2024年05月01日 03時01分");
    }

    #[test]
    fn test_convert_timestamp_rejects_non_numeric() {
        let err = convert_timestamp("yesterday", &tokyo()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid timestamp: yesterday");
    }
}
