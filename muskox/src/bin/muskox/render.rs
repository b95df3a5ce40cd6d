// vim: tw=80
//! Humanization and terminal helpers shared by all subcommands

use std::{io::IsTerminal, str::FromStr};

use muskox_core::Error;
use time::OffsetDateTime;

si_scale::scale_fn!(bibytes0,
                    base: B1024,
                    constraint: UnitAndAbove,
                    mantissa_fmt: "{:.0}",
                    groupings: '_',
                    unit: "B");

si_scale::scale_fn!(counts0,
                    base: B1000,
                    constraint: UnitAndAbove,
                    mantissa_fmt: "{:.0}",
                    groupings: '_',
                    unit: "");

/// A byte quantity, humanized unless parsable output was requested
pub fn bytes_cell(v: u64, parsable: bool) -> String {
    if parsable {
        v.to_string()
    } else {
        bibytes0(v as f64)
    }
}

/// An operation count, humanized unless parsable output was requested
pub fn count_cell(v: u64, parsable: bool) -> String {
    if parsable {
        v.to_string()
    } else {
        // With no unit the scaler leaves a trailing separator
        counts0(v as f64).trim_end().to_owned()
    }
}

/// A duration in nanoseconds, humanized to the most natural unit
pub fn nicetime(ns: u64, parsable: bool) -> String {
    if parsable {
        return ns.to_string();
    }
    if ns == 0 {
        "-".to_owned()
    } else if ns < 1_000 {
        format!("{ns}ns")
    } else if ns < 1_000_000 {
        format!("{}us", ns / 1_000)
    } else if ns < 1_000_000_000 {
        format!("{}ms", ns / 1_000_000)
    } else {
        format!("{}s", ns / 1_000_000_000)
    }
}

pub const ANSI_RED: &str = "\x1b[1;31m";
pub const ANSI_YELLOW: &str = "\x1b[1;33m";
pub const ANSI_BLUE: &str = "\x1b[1;34m";
pub const ANSI_GRAY: &str = "\x1b[1;90m";
pub const ANSI_RESET: &str = "\x1b[0m";

/// Whether to emit ANSI colors at all
pub fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

/// The color conventionally attached to a health word, if any
pub fn health_color(health: &str) -> Option<&'static str> {
    match health {
        "DEGRADED" => Some(ANSI_YELLOW),
        "FAULTED" | "UNAVAIL" => Some(ANSI_RED),
        "OFFLINE" | "REMOVED" => Some(ANSI_GRAY),
        "INUSE" => Some(ANSI_BLUE),
        _ => None,
    }
}

pub fn colorize(s: &str, color: Option<&str>, enable: bool) -> String {
    match color {
        Some(c) if enable => format!("{c}{s}{ANSI_RESET}"),
        _ => s.to_owned(),
    }
}

/// The `-T` argument common to all the repeating commands
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimestampFmt {
    /// Seconds since the epoch
    Unix,
    /// Standard date format
    Date,
}

impl FromStr for TimestampFmt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "u" => Ok(TimestampFmt::Unix),
            "d" => Ok(TimestampFmt::Date),
            _ => Err(Error::Invalid(format!("invalid timestamp format '{s}'"))),
        }
    }
}

impl TimestampFmt {
    pub fn print(&self) {
        let now = OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc());
        match self {
            TimestampFmt::Unix => println!("{}", now.unix_timestamp()),
            TimestampFmt::Date => println!("{}", datetime(now)),
        }
    }
}

/// Render a point in time the way the status paragraphs do
pub fn datetime(t: OffsetDateTime) -> String {
    let fmt = time::macros::format_description!(
        "[weekday repr:short] [month repr:short] [day] \
         [hour]:[minute]:[second] [year]"
    );
    t.format(&fmt).unwrap_or_else(|_| t.unix_timestamp().to_string())
}

/// Render an epoch-seconds timestamp from the engine
pub fn epoch_datetime(secs: u64) -> String {
    match OffsetDateTime::from_unix_timestamp(secs as i64) {
        Ok(t) => datetime(t),
        Err(_) => secs.to_string(),
    }
}

#[cfg(test)]
mod t {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, "-")]
    #[case(999, "999ns")]
    #[case(12_345, "12us")]
    #[case(7_000_000, "7ms")]
    #[case(3_500_000_000, "3s")]
    fn nicetimes(#[case] ns: u64, #[case] expected: &str) {
        assert_eq!(expected, nicetime(ns, false));
    }

    #[test]
    fn nicetime_parsable() {
        assert_eq!("12345", nicetime(12_345, true));
    }

    #[test]
    fn parsable_bytes_are_exact() {
        assert_eq!("1048576", bytes_cell(1 << 20, true));
    }

    #[test]
    fn timestamp_fmt_from_str() {
        assert_eq!(Ok(TimestampFmt::Unix), "u".parse());
        assert_eq!(Ok(TimestampFmt::Date), "d".parse());
        assert!("x".parse::<TimestampFmt>().is_err());
    }

    #[test]
    fn colors() {
        assert_eq!(Some(ANSI_RED), health_color("FAULTED"));
        assert_eq!(Some(ANSI_YELLOW), health_color("DEGRADED"));
        assert_eq!(None, health_color("ONLINE"));
        assert_eq!("\x1b[1;31mX\x1b[0m",
                   colorize("X", Some(ANSI_RED), true));
        assert_eq!("X", colorize("X", Some(ANSI_RED), false));
        assert_eq!("X", colorize("X", None, true));
    }
}
