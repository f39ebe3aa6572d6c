use crate::error::{CalendarResult, Error};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, Months, NaiveDate, NaiveDateTime,
    NaiveTime, Offset, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use tracing::debug;

/// Half-open `[start, end)` range used to scope listing queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// First day of the month containing `instant` through the first day of the next month, in UTC
    pub fn month_containing(instant: DateTime<Utc>) -> Self {
        let date = instant.date_naive();
        let first = date - Duration::days(i64::from(date.day0()));
        let next = first
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDate::MAX);
        Self {
            start: first.and_time(NaiveTime::MIN).and_utc(),
            end: next.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// The default listing window
    pub fn current_month() -> Self {
        Self::month_containing(Utc::now())
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Parse an IANA zone name
pub fn parse_zone(zone: &str) -> CalendarResult<Tz> {
    zone.trim()
        .parse::<Tz>()
        .map_err(|_| Error::InvalidTimezone(zone.to_string()))
}

/// Normalize a free-form date string into an RFC 3339 timestamp in `zone`.
///
/// Absent or blank input yields `Ok(None)`. Input without zone information is
/// read as wall-clock time in `zone`; input carrying its own zone or offset is
/// converted to `zone` keeping the instant.
pub fn normalize(input: Option<&str>, zone: &str) -> CalendarResult<Option<String>> {
    normalize_at(input, zone, Utc::now())
}

/// Same as [`normalize`], with `now` supplying the defaults for missing date parts
pub fn normalize_at(
    input: Option<&str>,
    zone: &str,
    now: DateTime<Utc>,
) -> CalendarResult<Option<String>> {
    let input = match input.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(None),
    };

    let tz = parse_zone(zone)?;
    let parsed = parse_datetime_in(input, tz, now)?;
    Ok(Some(format_timestamp(&parsed)))
}

/// Format with an explicit numeric offset, never `Z`
pub fn format_timestamp<Z: TimeZone>(dt: &DateTime<Z>) -> String {
    dt.fixed_offset()
        .to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Leniently parse `input` and express it in `tz`
pub fn parse_datetime_in(input: &str, tz: Tz, now: DateTime<Utc>) -> CalendarResult<DateTime<Tz>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&tz));
    }

    let today = now.with_timezone(&tz).date_naive();
    let parts = DateParts::parse(input)?;
    let naive = parts.resolve(input, today)?;

    match parts.zone {
        None => attach(&tz, naive, input),
        Some(ParsedZone::Fixed(offset)) => Ok(attach(&offset, naive, input)?.with_timezone(&tz)),
        Some(ParsedZone::Named(other)) => Ok(attach(&other, naive, input)?.with_timezone(&tz)),
    }
}

/// Interpret a wall-clock time in `zone`; a DST fold resolves to the earlier instant
fn attach<Z: TimeZone>(zone: &Z, naive: NaiveDateTime, input: &str) -> CalendarResult<DateTime<Z>> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(invalid(input, "time does not exist in the target timezone")),
    }
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidDateFormat {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

#[derive(Debug, Clone, Copy)]
enum ParsedZone {
    Fixed(FixedOffset),
    Named(Tz),
}

#[derive(Debug, Clone, Copy)]
struct Clock {
    hour: u32,
    minute: u32,
    second: u32,
    nano: u32,
}

/// Date and time components collected from the input tokens
#[derive(Debug, Default)]
struct DateParts {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    relative_days: Option<i64>,
    clock: Option<Clock>,
    meridiem: Option<Meridiem>,
    zone: Option<ParsedZone>,
}

const FILLER_WORDS: [&str; 4] = ["at", "on", "the", "of"];

const WEEKDAYS: [&str; 17] = [
    "mon", "monday", "tue", "tues", "tuesday", "wed", "wednesday", "thu", "thur", "thurs",
    "thursday", "fri", "friday", "sat", "saturday", "sun", "sunday",
];

const MONTHS: [(&str, u32); 24] = [
    ("jan", 1),
    ("january", 1),
    ("feb", 2),
    ("february", 2),
    ("mar", 3),
    ("march", 3),
    ("apr", 4),
    ("april", 4),
    ("may", 5),
    ("jun", 6),
    ("june", 6),
    ("jul", 7),
    ("july", 7),
    ("aug", 8),
    ("august", 8),
    ("sep", 9),
    ("sept", 9),
    ("september", 9),
    ("oct", 10),
    ("october", 10),
    ("nov", 11),
    ("november", 11),
    ("dec", 12),
    ("december", 12),
];

impl DateParts {
    fn parse(input: &str) -> CalendarResult<Self> {
        let tokens = tokenize(input);
        let mut parts = DateParts::default();
        let mut recognized = false;

        let mut i = 0;
        while i < tokens.len() {
            let raw = tokens[i].as_str();
            let lower = raw.to_ascii_lowercase();
            let word = lower.trim_end_matches('.');

            if FILLER_WORDS.contains(&word) || WEEKDAYS.contains(&word) {
                i += 1;
                continue;
            }

            recognized = true;

            if let Some(days) = relative_day(word) {
                set_once(&mut parts.relative_days, days, input, "relative day")?;
            } else if let Some(meridiem) = meridiem_word(word) {
                set_once(&mut parts.meridiem, meridiem, input, "am/pm marker")?;
            } else if word == "noon" {
                set_once(&mut parts.clock, clock(12, 0), input, "time")?;
            } else if word == "midnight" {
                set_once(&mut parts.clock, clock(0, 0), input, "time")?;
            } else if matches!(word, "z" | "utc" | "gmt") {
                set_once(&mut parts.zone, ParsedZone::Fixed(utc_offset()), input, "timezone")?;
            } else if let Some(month) = month_from_name(word) {
                set_once(&mut parts.month, month, input, "month")?;
            } else if raw.starts_with('+') || raw.starts_with('-') {
                let offset = parse_offset(raw).ok_or_else(|| invalid(input, "bad UTC offset"))?;
                set_once(&mut parts.zone, ParsedZone::Fixed(offset), input, "timezone")?;
            } else if raw.contains('/') && raw.chars().any(|c| c.is_ascii_alphabetic()) {
                let zone = raw
                    .parse::<Tz>()
                    .map_err(|_| invalid(input, &format!("unknown timezone '{}'", raw)))?;
                set_once(&mut parts.zone, ParsedZone::Named(zone), input, "timezone")?;
            } else if lower.contains(':') {
                parts.parse_clock_token(&lower, input)?;
            } else if lower.contains(['-', '/', '.']) {
                parts.parse_numeric_date(&lower, input)?;
            } else if let Some((digits, meridiem)) = split_meridiem_suffix(&lower) {
                let hour = digits
                    .parse::<u32>()
                    .map_err(|_| invalid(input, "bad hour"))?;
                set_once(&mut parts.clock, clock(hour, 0), input, "time")?;
                set_once(&mut parts.meridiem, meridiem, input, "am/pm marker")?;
            } else if let Some(day) = parse_ordinal(&lower) {
                set_once(&mut parts.day, day, input, "day")?;
            } else if lower.chars().all(|c| c.is_ascii_digit()) {
                let next_is_meridiem = tokens
                    .get(i + 1)
                    .map(|t| meridiem_word(t.to_ascii_lowercase().trim_end_matches('.')).is_some())
                    .unwrap_or(false);
                parts.parse_bare_number(&lower, next_is_meridiem, input)?;
            } else if parts.clock.is_some() && is_zone_abbreviation(raw) {
                // Abbreviations such as EST are ambiguous; the target zone applies
                debug!("Ignoring timezone abbreviation '{}' in '{}'", raw, input);
            } else {
                return Err(invalid(input, &format!("unrecognized token '{}'", raw)));
            }

            i += 1;
        }

        if !recognized {
            return Err(invalid(input, "no date or time found"));
        }

        Ok(parts)
    }

    fn parse_clock_token(&mut self, token: &str, input: &str) -> CalendarResult<()> {
        let mut rest = token;

        if let Some((body, meridiem)) = split_meridiem_suffix(rest) {
            set_once(&mut self.meridiem, meridiem, input, "am/pm marker")?;
            rest = body;
        }

        if let Some(body) = rest.strip_suffix('z') {
            set_once(&mut self.zone, ParsedZone::Fixed(utc_offset()), input, "timezone")?;
            rest = body;
        } else if let Some(pos) = rest.find(['+', '-']) {
            let offset =
                parse_offset(&rest[pos..]).ok_or_else(|| invalid(input, "bad UTC offset"))?;
            set_once(&mut self.zone, ParsedZone::Fixed(offset), input, "timezone")?;
            rest = &rest[..pos];
        }

        let fields: Vec<&str> = rest.split(':').collect();
        if fields.len() < 2 || fields.len() > 3 {
            return Err(invalid(input, "time must look like HH:MM or HH:MM:SS"));
        }

        let hour = parse_number(fields[0], 2).ok_or_else(|| invalid(input, "bad hour"))?;
        let minute = parse_number(fields[1], 2).ok_or_else(|| invalid(input, "bad minute"))?;
        let (second, nano) = match fields.get(2) {
            Some(field) => parse_seconds(field).ok_or_else(|| invalid(input, "bad seconds"))?,
            None => (0, 0),
        };

        set_once(
            &mut self.clock,
            Clock {
                hour,
                minute,
                second,
                nano,
            },
            input,
            "time",
        )
    }

    fn parse_numeric_date(&mut self, token: &str, input: &str) -> CalendarResult<()> {
        let separator = token
            .chars()
            .find(|c| matches!(c, '-' | '/' | '.'))
            .ok_or_else(|| invalid(input, "bad date"))?;
        let fields: Vec<&str> = token.split(separator).collect();

        if fields
            .iter()
            .any(|f| f.is_empty() || !f.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(invalid(input, &format!("unrecognized date '{}'", token)));
        }

        let values = fields
            .iter()
            .map(|f| f.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid(input, "bad date"))?;
        let lengths: Vec<usize> = fields.iter().map(|f| f.len()).collect();

        let (year, month, day) = match (values.as_slice(), lengths.as_slice()) {
            ([y, m, d], [4, _, _]) => (Some(*y as i32), *m, Some(*d)),
            // Day first only when the leading field cannot be a month
            ([d, m, y], [_, _, 4]) if *d > 12 && *m <= 12 => (Some(*y as i32), *m, Some(*d)),
            ([m, d, y], [_, _, 4]) => (Some(*y as i32), *m, Some(*d)),
            // Year first when no part is unambiguously a year
            ([y, m, d], [1 | 2, _, _]) => (Some(2000 + *y as i32), *m, Some(*d)),
            ([y, m], [4, _]) => (Some(*y as i32), *m, None),
            ([d, m], _) if *d > 12 && *m <= 12 => (None, *m, Some(*d)),
            ([m, d], _) => (None, *m, Some(*d)),
            _ => return Err(invalid(input, &format!("unrecognized date '{}'", token))),
        };

        if let Some(year) = year {
            set_once(&mut self.year, year, input, "year")?;
        }
        set_once(&mut self.month, month, input, "month")?;
        if let Some(day) = day {
            set_once(&mut self.day, day, input, "day")?;
        }
        Ok(())
    }

    fn parse_bare_number(
        &mut self,
        token: &str,
        next_is_meridiem: bool,
        input: &str,
    ) -> CalendarResult<()> {
        let value = token
            .parse::<u32>()
            .map_err(|_| invalid(input, "number out of range"))?;

        if next_is_meridiem {
            return set_once(&mut self.clock, clock(value, 0), input, "time");
        }

        match token.len() {
            8 => {
                set_once(&mut self.year, (value / 10_000) as i32, input, "year")?;
                set_once(&mut self.month, value / 100 % 100, input, "month")?;
                set_once(&mut self.day, value % 100, input, "day")
            }
            4 => set_once(&mut self.year, value as i32, input, "year"),
            // A second short number after the day is a two-digit year
            1 | 2 if self.day.is_some() && self.year.is_none() => {
                set_once(&mut self.year, 2000 + value as i32, input, "year")
            }
            1 | 2 => set_once(&mut self.day, value, input, "day"),
            _ => Err(invalid(input, &format!("unrecognized number '{}'", token))),
        }
    }

    /// Combine the collected parts into a wall-clock date and time
    fn resolve(&self, input: &str, today: NaiveDate) -> CalendarResult<NaiveDateTime> {
        let date = match self.relative_days {
            Some(days) => {
                if self.year.is_some() || self.month.is_some() || self.day.is_some() {
                    return Err(invalid(input, "relative day combined with a calendar date"));
                }
                today + Duration::days(days)
            }
            None => {
                let year = self.year.unwrap_or_else(|| today.year());
                let month = self.month.unwrap_or_else(|| today.month());
                let day = match (self.day, self.month) {
                    (Some(day), _) => day,
                    (None, Some(_)) => 1,
                    (None, None) => today.day(),
                };
                NaiveDate::from_ymd_opt(year, month, day)
                    .ok_or_else(|| invalid(input, "date out of range"))?
            }
        };

        let time = match self.clock {
            Some(clock) => {
                let hour = apply_meridiem(clock.hour, self.meridiem)
                    .ok_or_else(|| invalid(input, "hour out of range"))?;
                NaiveTime::from_hms_nano_opt(hour, clock.minute, clock.second, clock.nano)
                    .ok_or_else(|| invalid(input, "time out of range"))?
            }
            None if self.meridiem.is_some() => {
                return Err(invalid(input, "am/pm marker without a time"));
            }
            None => NaiveTime::MIN,
        };

        Ok(date.and_time(time))
    }
}

fn is_zone_abbreviation(raw: &str) -> bool {
    (2..=5).contains(&raw.len()) && raw.chars().all(|c| c.is_ascii_uppercase())
}

fn set_once<T>(slot: &mut Option<T>, value: T, input: &str, what: &str) -> CalendarResult<()> {
    if slot.is_some() {
        return Err(invalid(input, &format!("{} given more than once", what)));
    }
    *slot = Some(value);
    Ok(())
}

fn clock(hour: u32, minute: u32) -> Clock {
    Clock {
        hour,
        minute,
        second: 0,
        nano: 0,
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Split on whitespace and commas, and at an ISO `T` between a date and a time
fn tokenize(input: &str) -> Vec<String> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .flat_map(|token| {
            let bytes = token.as_bytes();
            let split_at = (1..bytes.len().saturating_sub(1)).find(|&i| {
                matches!(bytes[i], b'T' | b't')
                    && bytes[i - 1].is_ascii_digit()
                    && bytes[i + 1].is_ascii_digit()
            });
            match split_at {
                Some(i) => vec![token[..i].to_string(), token[i + 1..].to_string()],
                None => vec![token.to_string()],
            }
        })
        .collect()
}

fn relative_day(word: &str) -> Option<i64> {
    match word {
        "today" => Some(0),
        "tomorrow" => Some(1),
        "yesterday" => Some(-1),
        _ => None,
    }
}

fn meridiem_word(word: &str) -> Option<Meridiem> {
    match word {
        "am" | "a.m" => Some(Meridiem::Am),
        "pm" | "p.m" => Some(Meridiem::Pm),
        _ => None,
    }
}

fn month_from_name(word: &str) -> Option<u32> {
    MONTHS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, month)| *month)
}

/// `3pm` -> ("3", Pm), `3:30am` -> ("3:30", Am)
fn split_meridiem_suffix(token: &str) -> Option<(&str, Meridiem)> {
    let token = token.trim_end_matches('.');
    for (suffix, meridiem) in [
        ("a.m", Meridiem::Am),
        ("p.m", Meridiem::Pm),
        ("am", Meridiem::Am),
        ("pm", Meridiem::Pm),
    ] {
        if let Some(body) = token.strip_suffix(suffix) {
            if !body.is_empty() && body.chars().all(|c| c.is_ascii_digit() || c == ':') {
                return Some((body, meridiem));
            }
        }
    }
    None
}

fn parse_ordinal(token: &str) -> Option<u32> {
    ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .filter(|digits| !digits.is_empty() && digits.len() <= 2)
        .and_then(|digits| digits.parse().ok())
}

fn parse_number(field: &str, max_len: usize) -> Option<u32> {
    if field.is_empty() || field.len() > max_len || !field.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// `30` or `30.250` -> (seconds, nanoseconds)
fn parse_seconds(field: &str) -> Option<(u32, u32)> {
    let (whole, fraction) = match field.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (field, None),
    };
    let seconds = parse_number(whole, 2)?;
    let nanos = match fraction {
        Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            let mut padded: String = digits.chars().take(9).collect();
            while padded.len() < 9 {
                padded.push('0');
            }
            padded.parse().ok()?
        }
        Some(_) => return None,
        None => 0,
    };
    Some((seconds, nanos))
}

/// `+05:00`, `+0500`, `+05`, `-07`
fn parse_offset(token: &str) -> Option<FixedOffset> {
    let (sign, digits) = match token.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn apply_meridiem(hour: u32, meridiem: Option<Meridiem>) -> Option<u32> {
    match meridiem {
        None => Some(hour),
        Some(_) if hour == 0 || hour > 12 => None,
        Some(Meridiem::Am) => Some(hour % 12),
        Some(Meridiem::Pm) => Some(hour % 12 + 12),
    }
}
