//! # Cron Schedules
//!
//! Five-field cron (`minute hour day-of-month month day-of-week`) with the
//! `H` hash token, evaluated in UTC at minute resolution.
//!
//! Per field, comma-separated tokens of:
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `*`, `*/n` | every value, every n-th value |
//! | `a`, `a-b`, `a-b/n` | value, range, stepped range |
//! | `H`, `H(a-b)` | one value picked by hashing the seed |
//! | `H/n`, `H(a-b)/n` | every n-th value from a hashed offset |
//!
//! Aliases: `@yearly @annually @monthly @weekly @daily @midnight @hourly`.
//! A spec may span several lines; blank lines and `#` comments are ignored
//! and a minute matches if any line matches. Day-of-month and day-of-week
//! must both match. Day-of-week 7 is Sunday, like 0.
//!
//! `H` spreads load: jobs with the same spec fire at different but stable
//! times, because the hashed values derive from the seed (the job id).

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Schedule parse errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("line {line}: expected 5 fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: invalid {field} token '{token}': {reason}")]
    InvalidToken {
        line: usize,
        field: &'static str,
        token: String,
        reason: String,
    },

    #[error("line {line}: unknown alias '{alias}'")]
    UnknownAlias { line: usize, alias: String },

    #[error("line {line}: time zone lines are not supported; schedules run in UTC")]
    TimeZone { line: usize },
}

#[derive(Clone, Copy)]
struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    /// Upper bound for hashed values.
    hash_max: u32,
}

const FIELDS: [Field; 5] = [
    Field { name: "minute", min: 0, max: 59, hash_max: 59 },
    Field { name: "hour", min: 0, max: 23, hash_max: 23 },
    Field { name: "day-of-month", min: 1, max: 31, hash_max: 28 },
    Field { name: "month", min: 1, max: 12, hash_max: 12 },
    Field { name: "day-of-week", min: 0, max: 7, hash_max: 6 },
];

/// Latest a search may look ahead before declaring a schedule unsatisfiable.
const SEARCH_HORIZON_DAYS: i64 = 366 * 8;

/// One parsed line: a bit set per field.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CronEntry {
    bits: [u64; 5],
}

impl CronEntry {
    fn month_matches(&self, t: &DateTime<Utc>) -> bool {
        self.bits[3] & (1u64 << t.month()) != 0
    }

    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let weekday = t.weekday().num_days_from_sunday();
        self.bits[2] & (1u64 << t.day()) != 0 && self.bits[4] & (1u64 << weekday) != 0
    }

    fn hour_matches(&self, t: &DateTime<Utc>) -> bool {
        self.bits[1] & (1u64 << t.hour()) != 0
    }

    fn minute_matches(&self, t: &DateTime<Utc>) -> bool {
        self.bits[0] & (1u64 << t.minute()) != 0
    }

    fn matches(&self, t: &DateTime<Utc>) -> bool {
        self.month_matches(t)
            && self.day_matches(t)
            && self.hour_matches(t)
            && self.minute_matches(t)
    }

    /// First matching minute at or after `from` (which is minute-aligned).
    fn next_from(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let horizon = from + Duration::days(SEARCH_HORIZON_DAYS);
        let mut t = from;

        while t <= horizon {
            if !self.month_matches(&t) {
                t = start_of_next_month(&t)?;
            } else if !self.day_matches(&t) {
                t = start_of_day(&t)? + Duration::days(1);
            } else if !self.hour_matches(&t) {
                t = start_of_hour(&t)? + Duration::hours(1);
            } else if !self.minute_matches(&t) {
                t += Duration::minutes(1);
            } else {
                return Some(t);
            }
        }
        None
    }
}

fn start_of_day(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(t.year(), t.month(), t.day(), 0, 0, 0).single()
}

fn start_of_hour(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(t.year(), t.month(), t.day(), t.hour(), 0, 0).single()
}

fn start_of_next_month(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// Truncate to the start of the minute.
fn floor_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(t)
}

/// Deterministic pseudo-random values derived from a seed.
struct Hasher {
    seed: [u8; 32],
    counter: u32,
}

impl Hasher {
    fn new(seed: &str) -> Self {
        Self {
            seed: Sha256::digest(seed.as_bytes()).into(),
            counter: 0,
        }
    }

    /// Next value in `0..n`.
    fn next(&mut self, n: u32) -> u32 {
        let digest = Sha256::new()
            .chain_update(self.seed)
            .chain_update(self.counter.to_le_bytes())
            .finalize();
        self.counter += 1;
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(word) % u64::from(n.max(1))) as u32
    }
}

/// A parsed, possibly multi-line, schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    source: String,
    entries: Vec<CronEntry>,
}

impl Schedule {
    /// Parse `spec`, hashing `H` tokens from `seed`.
    pub fn parse(spec: &str, seed: &str) -> Result<Self, ScheduleError> {
        let mut hasher = Hasher::new(seed);
        let mut entries = Vec::new();

        for (idx, raw) in spec.lines().enumerate() {
            let line = idx + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            if text.starts_with("TZ=") {
                return Err(ScheduleError::TimeZone { line });
            }
            let expanded = expand_alias(text, line)?;
            entries.push(parse_line(expanded, line, &mut hasher)?);
        }

        Ok(Self {
            source: spec.to_string(),
            entries,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// A spec with only comments and blank lines never fires.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the minute containing `t` is scheduled.
    #[must_use]
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        let t = floor_minute(t);
        self.entries.iter().any(|e| e.matches(&t))
    }

    /// First scheduled minute strictly after `t`.
    #[must_use]
    pub fn next_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let from = floor_minute(t) + Duration::minutes(1);
        self.entries.iter().filter_map(|e| e.next_from(from)).min()
    }
}

/// Canonical text of a spec: one line per non-blank line, runs of
/// whitespace collapsed. Specs that normalise equally are the same schedule.
#[must_use]
pub fn normalize(spec: &str) -> String {
    spec.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn expand_alias(text: &str, line: usize) -> Result<&str, ScheduleError> {
    if !text.starts_with('@') {
        return Ok(text);
    }
    match text {
        "@yearly" | "@annually" => Ok("H H H H *"),
        "@monthly" => Ok("H H H * *"),
        "@weekly" => Ok("H H * * H"),
        "@daily" => Ok("H H * * *"),
        "@midnight" => Ok("H H(0-2) * * *"),
        "@hourly" => Ok("H * * * *"),
        other => Err(ScheduleError::UnknownAlias {
            line,
            alias: other.to_string(),
        }),
    }
}

fn parse_line(text: &str, line: usize, hasher: &mut Hasher) -> Result<CronEntry, ScheduleError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != FIELDS.len() {
        return Err(ScheduleError::FieldCount {
            line,
            found: tokens.len(),
        });
    }

    let mut bits = [0u64; 5];
    for (i, (field, token)) in FIELDS.iter().zip(tokens).enumerate() {
        for part in token.split(',') {
            bits[i] |=
                parse_token(part, *field, hasher).map_err(|reason| ScheduleError::InvalidToken {
                    line,
                    field: field.name,
                    token: part.to_string(),
                    reason,
                })?;
        }
    }

    // Sunday may be written 7.
    if bits[4] & (1u64 << 7) != 0 {
        bits[4] = (bits[4] & !(1u64 << 7)) | 1;
    }

    Ok(CronEntry { bits })
}

fn parse_token(token: &str, field: Field, hasher: &mut Hasher) -> Result<u64, String> {
    let (base, step) = match token.split_once('/') {
        Some((base, step)) => {
            let step: u32 = step.parse().map_err(|_| format!("bad step '{step}'"))?;
            if step == 0 {
                return Err("step must be positive".into());
            }
            (base, Some(step))
        }
        None => (token, None),
    };

    if let Some(rest) = base.strip_prefix('H') {
        let (lo, hi) = if rest.is_empty() {
            (field.min, field.hash_max)
        } else {
            let inner = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(|| "expected H or H(a-b)".to_string())?;
            parse_range(inner, field)?
        };
        return hashed(lo, hi, step.unwrap_or(1), hasher);
    }

    let (lo, hi) = if base == "*" {
        (field.min, field.max)
    } else if base.contains('-') {
        parse_range(base, field)?
    } else {
        let v = parse_value(base, field)?;
        // `a/n` runs from a to the end of the field.
        if step.is_some() {
            (v, field.max)
        } else {
            (v, v)
        }
    };

    let step = step.unwrap_or(1);
    let mut bits = 0u64;
    let mut v = lo;
    while v <= hi {
        bits |= 1u64 << v;
        v += step;
    }
    Ok(bits)
}

fn hashed(lo: u32, hi: u32, step: u32, hasher: &mut Hasher) -> Result<u64, String> {
    let span = hi - lo + 1;
    if step > span {
        return Err(format!("step {step} exceeds range {lo}-{hi}"));
    }
    if step == 1 {
        return Ok(1u64 << (lo + hasher.next(span)));
    }
    let mut bits = 0u64;
    let mut v = lo + hasher.next(step);
    while v <= hi {
        bits |= 1u64 << v;
        v += step;
    }
    Ok(bits)
}

fn parse_range(text: &str, field: Field) -> Result<(u32, u32), String> {
    let (a, b) = text
        .split_once('-')
        .ok_or_else(|| format!("expected range, found '{text}'"))?;
    let (lo, hi) = (parse_value(a, field)?, parse_value(b, field)?);
    if lo > hi {
        return Err(format!("range {lo}-{hi} is backwards"));
    }
    Ok((lo, hi))
}

fn parse_value(text: &str, field: Field) -> Result<u32, String> {
    let v: u32 = text.parse().map_err(|_| format!("'{text}' is not a number"))?;
    if v < field.min || v > field.max {
        return Err(format!("{v} is outside {}-{}", field.min, field.max));
    }
    Ok(v)
}
