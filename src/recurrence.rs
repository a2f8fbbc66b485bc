//! Occurrence arithmetic for recurring lessons.
//!
//! An event stores the span of its first occurrence (`start`) and the end of
//! its last one (`end`). Everything here is pure: the stored record is never
//! touched, callers get a derived [`Occurrence`] back.

use crate::calendar::{div_ceil, span, week_of, FORTNIGHT_MS, WEEK_MS};
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    #[serde(alias = "NO_PERIOD")]
    None,
    #[serde(alias = "EVERY_WEEK")]
    Weekly,
    #[serde(alias = "EVERY_FORTNIGHT")]
    Fortnightly,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::None => "NONE",
            Period::Weekly => "WEEKLY",
            Period::Fortnightly => "FORTNIGHTLY",
        }
    }

    pub fn parse(s: &str) -> Option<Period> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" | "NO_PERIOD" => Some(Period::None),
            "WEEKLY" | "EVERY_WEEK" => Some(Period::Weekly),
            "FORTNIGHTLY" | "EVERY_FORTNIGHT" => Some(Period::Fortnightly),
            _ => None,
        }
    }

    /// Distance between two consecutive occurrences.
    pub fn step_ms(self) -> i64 {
        match self {
            Period::Fortnightly => FORTNIGHT_MS,
            Period::None | Period::Weekly => WEEK_MS,
        }
    }

    fn weeks_per_step(self) -> i64 {
        match self {
            Period::Fortnightly => 2,
            Period::None | Period::Weekly => 1,
        }
    }
}

impl FromSql for Period {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Period::parse(raw).ok_or_else(|| FromSqlError::Other(format!("unknown period {raw}").into()))
    }
}

impl ToSql for Period {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// One concrete occurrence of an event, projected onto a requested week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start_week: i64,
    pub end_week: i64,
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub fn resolve_occurrence(
    period: Period,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    semester_start: DateTime<Utc>,
    week: i64,
) -> EngineResult<Occurrence> {
    let start_week = week_of(semester_start, start);
    let end_week = week_of(semester_start, end);

    if period == Period::None {
        if week != start_week {
            return Err(EngineError::InvalidWeek);
        }
        return Ok(Occurrence {
            start_week,
            end_week,
            index: 0,
            start,
            end,
        });
    }

    if week < start_week || week > end_week {
        return Err(EngineError::InvalidWeek);
    }
    if period == Period::Fortnightly && start_week.rem_euclid(2) != week.rem_euclid(2) {
        return Err(EngineError::InvalidWeek);
    }

    let index = (week - start_week) / period.weeks_per_step();
    Ok(Occurrence {
        start_week,
        end_week,
        index: index as usize,
        start: start + span((week - start_week) * WEEK_MS),
        end: end - span((end_week - week) * WEEK_MS),
    })
}

/// Occurrence number used to look up per-occurrence overrides, or `None` when
/// the event has no occurrence in the week that `reference` closes.
pub fn occurrence_index_for_week(
    period: Period,
    event_start: DateTime<Utc>,
    reference: DateTime<Utc>,
) -> Option<usize> {
    let elapsed = (reference - event_start).num_milliseconds();
    if elapsed < 0 {
        return None;
    }
    let whole_weeks = elapsed / WEEK_MS;
    match period {
        Period::None => Some(0),
        Period::Weekly => Some(whole_weeks as usize),
        Period::Fortnightly if whole_weeks % 2 == 0 => Some((whole_weeks / 2) as usize),
        Period::Fortnightly => None,
    }
}

pub fn occurrence_count(start: DateTime<Utc>, end: DateTime<Utc>, period: Period) -> usize {
    if period == Period::None {
        return 1;
    }
    let n = div_ceil((end - start).num_milliseconds(), period.step_ms());
    n.max(1) as usize
}

/// Moves `requested_end` forward by whole periods to the last such instant
/// that still lies inside the semester.
pub fn last_valid_end_date(
    requested_end: DateTime<Utc>,
    semester_end: DateTime<Utc>,
    period: Period,
) -> DateTime<Utc> {
    if period == Period::None {
        return requested_end;
    }
    let room = (semester_end - requested_end).num_milliseconds();
    if room <= 0 {
        return requested_end;
    }
    let steps = room / period.step_ms();
    requested_end + span(steps * period.step_ms())
}

/// Recurrence metadata of a stored event, as mutated by calendar import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub slots: Vec<usize>,
}

impl Recurrence {
    pub fn new(period: Period, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let count = occurrence_count(start, end, period);
        Self {
            period,
            start,
            end,
            slots: (0..count).collect(),
        }
    }

    /// Turns a fortnightly event into a weekly one when a second occurrence is
    /// seen exactly one week after the anchor. Existing slots are kept; the
    /// slots the denser schedule needs are appended. Returns the appended
    /// indices, which are empty when nothing changed.
    pub fn upgrade_to_weekly(
        &mut self,
        incoming_start: DateTime<Utc>,
        incoming_end: DateTime<Utc>,
    ) -> Vec<usize> {
        if self.period != Period::Fortnightly
            || (incoming_start - self.start).num_milliseconds() != WEEK_MS
        {
            return Vec::new();
        }
        self.period = Period::Weekly;
        self.end = self.end.max(incoming_end);

        let wanted = occurrence_count(self.start, self.end, Period::Weekly);
        let added: Vec<usize> = (0..wanted).filter(|i| !self.slots.contains(i)).collect();
        self.slots.extend(added.iter().copied());
        added
    }
}
