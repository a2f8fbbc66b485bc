//! Semester calendar: semester bounds, named date variables and the
//! zero-based academic week grid every other component computes against.
//!
//! All arithmetic is fixed-length millisecond addition on UTC instants, so
//! daylight saving shifts and month lengths never move a lesson.

use crate::db::{self, from_ms, to_ms};
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

pub const MINUTE_MS: i64 = 60 * 1000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;
pub const FORTNIGHT_MS: i64 = 2 * WEEK_MS;

const MIN_YEAR: i64 = 2000;
const MAX_YEAR: i64 = 2100;
const LAST_ACADEMIC_DAY: i64 = 6;

pub const DEFAULT_FALLBACK_WEEKS: i64 = 20;
pub const MAX_FALLBACK_WEEKS: i64 = 60;

pub fn span(ms: i64) -> Duration {
    Duration::milliseconds(ms)
}

/// `base` moved by `count` steps of `unit_ms`, or `None` when the result is
/// not representable.
pub fn checked_shift(base: DateTime<Utc>, count: i64, unit_ms: i64) -> Option<DateTime<Utc>> {
    let ms = count.checked_mul(unit_ms)?;
    base.checked_add_signed(Duration::try_milliseconds(ms)?)
}

pub fn div_ceil(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}

/// Zero-based week of `instant` relative to `semester_start`.
pub fn week_of(semester_start: DateTime<Utc>, instant: DateTime<Utc>) -> i64 {
    (instant - semester_start).num_milliseconds().div_euclid(WEEK_MS)
}

/// Accepts RFC 3339, a naive ISO datetime or a bare date. Naive values are UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Used as `#[serde(deserialize_with = "instant_format::deserialize")]` on request payloads.
pub mod instant_format {
    use super::parse_instant;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_instant(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date {raw}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    pub year: i64,
    pub semester: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Semester {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start_date <= t && t < self.end_date
    }

    pub fn week_count(&self) -> i64 {
        div_ceil((self.end_date - self.start_date).num_milliseconds(), WEEK_MS)
    }

    /// Bounds of `week`; weeks outside `[0, week_count)` are `InvalidWeek`.
    pub fn week_bounds(&self, week: i64) -> EngineResult<WeekBounds> {
        if week < 0 || week >= self.week_count() {
            return Err(EngineError::InvalidWeek);
        }
        let start_of_week =
            checked_shift(self.start_date, week, WEEK_MS).ok_or(EngineError::InvalidWeek)?;
        let end_of_week =
            checked_shift(start_of_week, 1, WEEK_MS - 1).ok_or(EngineError::InvalidWeek)?;
        Ok(WeekBounds {
            start_of_week,
            end_of_week,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekBounds {
    pub start_of_week: DateTime<Utc>,
    pub end_of_week: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct CalendarSetup {
    pub semester_fallback_weeks: i64,
}

pub fn load_calendar_setup(conn: &Connection) -> CalendarSetup {
    let obj = db::settings_get_json(conn, "setup.calendar")
        .ok()
        .flatten()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let semester_fallback_weeks = obj
        .get("semesterFallbackWeeks")
        .and_then(|v| v.as_i64())
        .filter(|v| (1..=MAX_FALLBACK_WEEKS).contains(v))
        .unwrap_or(DEFAULT_FALLBACK_WEEKS);
    CalendarSetup {
        semester_fallback_weeks,
    }
}

pub fn check_year_and_semester(year: i64, semester: i64) -> EngineResult<()> {
    if !(1..=2).contains(&semester) {
        return Err(EngineError::InvalidQuery(
            "semester must be 1 or 2".to_string(),
        ));
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(EngineError::InvalidQuery(format!(
            "year must be between {} and {}",
            MIN_YEAR, MAX_YEAR
        )));
    }
    Ok(())
}

pub fn set_semester(
    conn: &Connection,
    year: i64,
    semester: i64,
    start_date: DateTime<Utc>,
) -> EngineResult<()> {
    check_year_and_semester(year, semester)?;
    conn.execute(
        "INSERT INTO semesters(year, semester, start_ms) VALUES(?, ?, ?)
         ON CONFLICT(year, semester) DO UPDATE SET start_ms = excluded.start_ms",
        (year, semester, to_ms(start_date)),
    )?;
    Ok(())
}

pub fn set_date_var(conn: &Connection, name: &str, date: DateTime<Utc>) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO date_vars(name, date_ms) VALUES(?, ?)
         ON CONFLICT(name) DO UPDATE SET date_ms = excluded.date_ms",
        (name, to_ms(date)),
    )?;
    Ok(())
}

/// Read access to the calendar at one fixed instant.
///
/// Every request resolves "now" once and threads it through here; nothing
/// below reads the wall clock.
pub struct Calendar<'a> {
    conn: &'a Connection,
    now: DateTime<Utc>,
    setup: CalendarSetup,
}

impl<'a> Calendar<'a> {
    pub fn new(conn: &'a Connection, now: DateTime<Utc>) -> Self {
        Self {
            conn,
            now,
            setup: load_calendar_setup(conn),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn conn(&self) -> &'a Connection {
        self.conn
    }

    /// All semesters in chronological order with their derived end dates.
    pub fn semesters(&self) -> EngineResult<Vec<Semester>> {
        let mut stmt = self
            .conn
            .prepare("SELECT year, semester, start_ms FROM semesters ORDER BY start_ms")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, from_ms(r.get(2)?)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let fallback = span(self.setup.semester_fallback_weeks * WEEK_MS);
        let mut out = Vec::with_capacity(rows.len());
        for (i, (year, semester, start_date)) in rows.iter().enumerate() {
            let end_date = rows
                .get(i + 1)
                .map(|next| next.2)
                .unwrap_or(*start_date + fallback);
            out.push(Semester {
                year: *year,
                semester: *semester,
                start_date: *start_date,
                end_date,
            });
        }
        Ok(out)
    }

    pub fn get_semester(&self, year: i64, semester: i64) -> EngineResult<Semester> {
        self.semesters()?
            .into_iter()
            .find(|s| s.year == year && s.semester == semester)
            .ok_or_else(|| EngineError::not_found("semester"))
    }

    pub fn current_semester(&self) -> EngineResult<Semester> {
        self.semesters()?
            .into_iter()
            .find(|s| s.contains(self.now))
            .ok_or(EngineError::DataNotFound)
    }

    pub fn date_var(&self, name: &str) -> EngineResult<DateTime<Utc>> {
        let ms: Option<i64> = self
            .conn
            .query_row("SELECT date_ms FROM date_vars WHERE name = ?", [name], |r| {
                r.get(0)
            })
            .optional()?;
        match ms {
            Some(ms) => Ok(from_ms(ms)?),
            None => Err(EngineError::NotFound(format!("date variable {}", name))),
        }
    }

    pub fn current_week(&self) -> EngineResult<i64> {
        let current = self.current_semester()?;
        Ok(week_of(current.start_date, self.now))
    }

    pub fn dates_of_week(&self, week: i64) -> EngineResult<WeekBounds> {
        self.current_semester()?.week_bounds(week)
    }

    pub fn dates_of_current_week(&self) -> EngineResult<WeekBounds> {
        let current = self.current_semester()?;
        current.week_bounds(week_of(current.start_date, self.now))
    }

    /// Day of the academic week, Monday = 1 through Saturday = 6.
    pub fn current_day(&self) -> EngineResult<i64> {
        let bounds = self.dates_of_current_week()?;
        let day = (self.now - bounds.start_of_week)
            .num_milliseconds()
            .div_euclid(DAY_MS)
            + 1;
        if !(1..=LAST_ACADEMIC_DAY).contains(&day) {
            return Err(EngineError::InvalidDay);
        }
        Ok(day)
    }

    pub fn specific_day_in_week(&self, week: i64, day: i64) -> EngineResult<DateTime<Utc>> {
        if !(1..=LAST_ACADEMIC_DAY).contains(&day) {
            return Err(EngineError::InvalidDay);
        }
        let bounds = self.dates_of_week(week)?;
        Ok(bounds.start_of_week + span((day - 1) * DAY_MS))
    }

    /// True when (`year`, `semester`) is the semester immediately before the
    /// one that is current.
    pub fn is_previous_semester(&self, year: i64, semester: i64) -> EngineResult<bool> {
        let all = self.semesters()?;
        let Some(idx) = all.iter().position(|s| s.contains(self.now)) else {
            return Err(EngineError::DataNotFound);
        };
        if idx == 0 {
            return Ok(false);
        }
        let previous = &all[idx - 1];
        Ok(previous.year == year && previous.semester == semester)
    }
}
