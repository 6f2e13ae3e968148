use chrono::{Local, LocalResult, NaiveDateTime, Offset, TimeZone};

/// Behaviour switches for the install sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShimConfig {
    /// Log probe verdicts and fallback installs.
    pub debug: bool,
    /// Turn failed installs into errors instead of report entries.
    pub strict: bool,
}

impl ShimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Reads `POLYFIX_DEBUG` and `POLYFIX_STRICT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| {
            lookup(name).is_some_and(|v| {
                matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
            })
        };
        Self {
            debug: flag("POLYFIX_DEBUG"),
            strict: flag("POLYFIX_STRICT"),
        }
    }
}

/// The local time zone used for local-time Date parsing and formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalTimeZone {
    #[default]
    System,
    Fixed { offset_minutes: i32 },
}

const MS_PER_MINUTE: f64 = 60_000.0;

impl LocalTimeZone {
    pub const UTC: Self = LocalTimeZone::Fixed { offset_minutes: 0 };

    /// Offset from UTC in minutes at the UTC instant `t` (ms since epoch).
    pub fn offset_at_utc(&self, t: f64) -> i32 {
        match self {
            LocalTimeZone::Fixed { offset_minutes } => *offset_minutes,
            LocalTimeZone::System => match to_naive(t) {
                Some(naive) => Local.offset_from_utc_datetime(&naive).fix().local_minus_utc() / 60,
                None => system_fallback_offset(),
            },
        }
    }

    /// Offset from UTC in minutes for a wall-clock local time `t`. For
    /// ambiguous local times the earlier instant wins.
    pub fn offset_at_local(&self, t: f64) -> i32 {
        match self {
            LocalTimeZone::Fixed { offset_minutes } => *offset_minutes,
            LocalTimeZone::System => {
                let Some(naive) = to_naive(t) else {
                    return system_fallback_offset();
                };
                match Local.offset_from_local_datetime(&naive) {
                    LocalResult::Single(off) => off.fix().local_minus_utc() / 60,
                    LocalResult::Ambiguous(early, _) => early.fix().local_minus_utc() / 60,
                    // inside a spring-forward gap: use the offset in effect just after it
                    LocalResult::None => Local.offset_from_utc_datetime(&naive).fix().local_minus_utc() / 60,
                }
            }
        }
    }

    /// UTC time value to local wall-clock time value.
    pub fn local_time(&self, t: f64) -> f64 {
        t + self.offset_at_utc(t) as f64 * MS_PER_MINUTE
    }

    /// Local wall-clock time value to UTC time value.
    pub fn utc_time(&self, local: f64) -> f64 {
        local - self.offset_at_local(local) as f64 * MS_PER_MINUTE
    }
}

fn to_naive(t: f64) -> Option<NaiveDateTime> {
    if !t.is_finite() {
        return None;
    }
    chrono::DateTime::from_timestamp_millis(t as i64).map(|dt| dt.naive_utc())
}

fn system_fallback_offset() -> i32 {
    Local::now().offset().fix().local_minus_utc() / 60
}
