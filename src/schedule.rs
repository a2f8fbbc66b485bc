//! Group schedules: the week-projection pipeline over stored events, event
//! creation and deletion, per-occurrence overrides and calendar import.
//!
//! Stored events keep the span of their first occurrence start and last
//! occurrence end. Listings never write back; a shifted copy is returned.

use crate::calendar::{
    self, instant_format, span, Calendar, Semester, WeekBounds, DAY_MS, HOUR_MS, MINUTE_MS,
    WEEK_MS,
};
use crate::db::{self, from_ms, to_ms};
use crate::discipline::{self, DisciplineKind};
use crate::error::{EngineError, EngineResult};
use crate::recurrence::{
    last_valid_end_date, occurrence_count, occurrence_index_for_week, resolve_occurrence, Period,
    Recurrence,
};
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub url: Option<String>,
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub index: usize,
    pub description: Option<String>,
    pub url: Option<String>,
    pub comment: Option<String>,
    pub is_test: bool,
    pub homework: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfoPatch {
    pub description: Option<String>,
    pub url: Option<String>,
    pub comment: Option<String>,
    pub is_test: Option<bool>,
    pub homework: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    pub discipline_type_id: String,
    #[serde(rename = "type")]
    pub kind: DisciplineKind,
    pub discipline_id: String,
    pub subject: String,
    pub is_selective: bool,
    pub teachers: Vec<String>,
}

/// An event as it looks in one particular week.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub period: Period,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub occurrence: usize,
    pub event_info: Option<EventInfo>,
    pub lessons: Vec<LessonView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekEvents {
    pub events: Vec<EventView>,
    pub week: i64,
    pub start_of_week: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEvents {
    pub events: Vec<EventView>,
    pub week: i64,
    pub day: i64,
    pub date: DateTime<Utc>,
}

/// Discipline-type filters of a listing. With no category flag set every
/// event passes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventFilter {
    pub add_lecture: bool,
    pub add_practice: bool,
    pub add_laboratory: bool,
    pub other_events: bool,
    pub is_own_selected: bool,
}

impl EventFilter {
    /// The public listing only knows about the three lesson categories.
    pub fn general(self) -> Self {
        Self {
            other_events: false,
            is_own_selected: false,
            ..self
        }
    }

    fn any_category(&self) -> bool {
        self.add_lecture || self.add_practice || self.add_laboratory || self.other_events
    }

    pub fn matches(&self, lessons: &[LessonView]) -> bool {
        if !self.any_category() {
            return true;
        }
        let has = |kind: DisciplineKind| lessons.iter().any(|l| l.kind == kind);
        (self.add_lecture && has(DisciplineKind::Lecture))
            || (self.add_practice && has(DisciplineKind::Practice))
            || (self.add_laboratory && has(DisciplineKind::Laboratory))
            || (self.other_events && is_other_event(lessons))
    }
}

/// No lessons at all, or a consultation, exam or workout.
pub fn is_other_event(lessons: &[LessonView]) -> bool {
    lessons.is_empty() || lessons.iter().any(|l| l.kind.is_other())
}

fn has_core_lesson(lessons: &[LessonView]) -> bool {
    lessons.iter().any(|l| !l.kind.is_other())
}

const EVENT_COLUMNS: &str = "id, group_id, name, url, period, start_ms, end_ms";

fn event_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: r.get(0)?,
        group_id: r.get(1)?,
        name: r.get(2)?,
        url: r.get(3)?,
        period: r.get(4)?,
        start: from_ms(r.get(5)?)?,
        end: from_ms(r.get(6)?)?,
    })
}

pub fn load_event(conn: &Connection, event_id: &str) -> EngineResult<EventRecord> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"),
        [event_id],
        event_from_row,
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("event"))
}

/// Events of the group whose stored span overlaps the week window.
fn load_events_in_window(
    conn: &Connection,
    group_id: &str,
    bounds: &WeekBounds,
) -> EngineResult<Vec<EventRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM events
         WHERE group_id = ? AND end_ms >= ? AND start_ms <= ?
         ORDER BY start_ms, id"
    ))?;
    let rows = stmt
        .query_map(
            (group_id, to_ms(bounds.start_of_week), to_ms(bounds.end_of_week)),
            event_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_lessons(conn: &Connection, event_id: &str) -> EngineResult<Vec<LessonView>> {
    let mut stmt = conn.prepare(
        "SELECT l.discipline_type_id, dty.name, d.id, s.name, d.is_selective
         FROM lessons l
         JOIN discipline_types dty ON dty.id = l.discipline_type_id
         JOIN disciplines d ON d.id = dty.discipline_id
         JOIN subjects s ON s.id = d.subject_id
         WHERE l.event_id = ?
         ORDER BY dty.name",
    )?;
    let mut lessons = stmt
        .query_map([event_id], |r| {
            Ok(LessonView {
                discipline_type_id: r.get(0)?,
                kind: r.get(1)?,
                discipline_id: r.get(2)?,
                subject: r.get(3)?,
                is_selective: r.get(4)?,
                teachers: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut teachers = conn.prepare(
        "SELECT DISTINCT t.last_name, t.first_name, t.middle_name
         FROM discipline_teacher_roles r
         JOIN discipline_teachers dt ON dt.id = r.discipline_teacher_id
         JOIN teachers t ON t.id = dt.teacher_id
         WHERE r.discipline_type_id = ?
         ORDER BY t.last_name, t.first_name",
    )?;
    for lesson in &mut lessons {
        lesson.teachers = teachers
            .query_map([&lesson.discipline_type_id], |r| {
                let last: String = r.get(0)?;
                let first: String = r.get(1)?;
                let middle: String = r.get(2)?;
                Ok(format!("{} {} {}", first, middle, last))
            })?
            .collect::<Result<Vec<_>, _>>()?;
    }
    Ok(lessons)
}

fn load_info(conn: &Connection, event_id: &str, index: usize) -> EngineResult<Option<EventInfo>> {
    let info = conn
        .query_row(
            "SELECT idx, description, url, comment, is_test, homework
             FROM event_infos WHERE event_id = ? AND idx = ?",
            (event_id, index as i64),
            |r| {
                Ok(EventInfo {
                    index: r.get::<_, i64>(0)? as usize,
                    description: r.get(1)?,
                    url: r.get(2)?,
                    comment: r.get(3)?,
                    is_test: r.get(4)?,
                    homework: r.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(info)
}

fn load_slots(conn: &Connection, event_id: &str) -> EngineResult<Vec<usize>> {
    let mut stmt = conn.prepare("SELECT idx FROM event_infos WHERE event_id = ? ORDER BY idx")?;
    let slots = stmt
        .query_map([event_id], |r| r.get::<_, i64>(0))?
        .map(|r| r.map(|i| i as usize))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(slots)
}

/// Projects one stored event onto `week`, or `None` when it has no
/// occurrence there.
fn project(
    conn: &Connection,
    semester: &Semester,
    week: i64,
    bounds: &WeekBounds,
    record: &EventRecord,
) -> EngineResult<Option<EventView>> {
    let occurrence =
        match resolve_occurrence(record.period, record.start, record.end, semester.start_date, week) {
            Ok(o) => o,
            Err(EngineError::InvalidWeek) => return Ok(None),
            Err(e) => return Err(e),
        };
    let Some(index) = occurrence_index_for_week(record.period, record.start, bounds.end_of_week)
    else {
        return Ok(None);
    };
    Ok(Some(EventView {
        id: record.id.clone(),
        name: record.name.clone(),
        url: record.url.clone(),
        period: record.period,
        start_time: occurrence.start,
        end_time: occurrence.end,
        occurrence: index,
        event_info: load_info(conn, &record.id, index)?,
        lessons: load_lessons(conn, &record.id)?,
    }))
}

fn resolve_week(cal: &Calendar, week: Option<i64>) -> EngineResult<(Semester, i64, WeekBounds)> {
    let semester = cal.current_semester()?;
    let week = match week {
        Some(w) => w,
        None => calendar::week_of(semester.start_date, cal.now()),
    };
    let bounds = semester.week_bounds(week)?;
    Ok((semester, week, bounds))
}

fn ensure_group(conn: &Connection, group_id: &str) -> EngineResult<()> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM groups WHERE id = ?", [group_id], |r| r.get(0))
        .optional()?;
    if found.is_none() {
        return Err(EngineError::InvalidEntityId("group".to_string()));
    }
    Ok(())
}

fn week_events<F>(cal: &Calendar, group_id: &str, week: Option<i64>, keep: F) -> EngineResult<WeekEvents>
where
    F: Fn(&EventView) -> bool,
{
    let conn = cal.conn();
    ensure_group(conn, group_id)?;
    let (semester, week, bounds) = resolve_week(cal, week)?;
    let mut events = Vec::new();
    for record in load_events_in_window(conn, group_id, &bounds)? {
        if let Some(view) = project(conn, &semester, week, &bounds, &record)? {
            if keep(&view) {
                events.push(view);
            }
        }
    }
    Ok(WeekEvents {
        events,
        week,
        start_of_week: bounds.start_of_week,
    })
}

/// Public timetable of a group: recurring lectures, practices and labs.
pub fn general_group_events(
    cal: &Calendar,
    group_id: &str,
    week: Option<i64>,
    filter: EventFilter,
) -> EngineResult<WeekEvents> {
    let filter = filter.general();
    week_events(cal, group_id, week, |view| {
        view.period != Period::None && has_core_lesson(&view.lessons) && filter.matches(&view.lessons)
    })
}

fn user_group(conn: &Connection, user_id: &str) -> EngineResult<Option<String>> {
    conn.query_row("SELECT group_id FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| EngineError::InvalidEntityId("user".to_string()))
}

fn selected_disciplines(conn: &Connection, user_id: &str) -> EngineResult<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT discipline_id FROM selective_choices WHERE user_id = ?")?;
    let ids = stmt
        .query_map([user_id], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

/// Timetable as a member of the group sees it. Non-members get the general
/// listing.
pub fn group_events(
    cal: &Calendar,
    group_id: &str,
    user_id: &str,
    week: Option<i64>,
    filter: EventFilter,
) -> EngineResult<WeekEvents> {
    let conn = cal.conn();
    if user_group(conn, user_id)?.as_deref() != Some(group_id) {
        return general_group_events(cal, group_id, week, filter);
    }
    let chosen = if filter.is_own_selected {
        Some(selected_disciplines(conn, user_id)?)
    } else {
        None
    };
    week_events(cal, group_id, week, |view| {
        if !filter.matches(&view.lessons) {
            return false;
        }
        match &chosen {
            Some(chosen) => view
                .lessons
                .iter()
                .all(|l| !l.is_selective || chosen.contains(&l.discipline_id)),
            None => true,
        }
    })
}

pub fn event_for_id(cal: &Calendar, event_id: &str, week: Option<i64>) -> EngineResult<EventView> {
    let week = week.ok_or(EngineError::InvalidWeek)?;
    let conn = cal.conn();
    let record = load_event(conn, event_id)?;
    let (semester, week, bounds) = resolve_week(cal, Some(week))?;
    project(conn, &semester, week, &bounds, &record)?.ok_or(EngineError::InvalidWeek)
}

/// Events of one weekday in the current week. Without `user_id` the general
/// listing is used.
pub fn day_filtered_events(
    cal: &Calendar,
    group_id: &str,
    user_id: Option<&str>,
    day: Option<i64>,
    filter: EventFilter,
) -> EngineResult<DayEvents> {
    let semester = cal.current_semester()?;
    let week = calendar::week_of(semester.start_date, cal.now());
    if week < 0 || week >= semester.week_count() {
        return Err(EngineError::InvalidWeek);
    }
    let day = match day {
        Some(d) => d,
        None => cal.current_day()?,
    };
    let date = cal.specific_day_in_week(week, day)?;

    let listed = match user_id {
        Some(user_id) => group_events(cal, group_id, user_id, Some(week), filter)?,
        None => general_group_events(cal, group_id, Some(week), filter)?,
    };
    let events = listed
        .events
        .into_iter()
        .filter(|e| (e.start_time - date).num_milliseconds().rem_euclid(WEEK_MS) < DAY_MS)
        .collect();
    Ok(DayEvents {
        events,
        week,
        day,
        date,
    })
}

pub fn update_event_info(
    cal: &Calendar,
    event_id: &str,
    week: i64,
    patch: &EventInfoPatch,
) -> EngineResult<EventInfo> {
    let conn = cal.conn();
    let record = load_event(conn, event_id)?;
    let (semester, week, bounds) = resolve_week(cal, Some(week))?;
    resolve_occurrence(record.period, record.start, record.end, semester.start_date, week)?;
    let index = occurrence_index_for_week(record.period, record.start, bounds.end_of_week)
        .ok_or(EngineError::InvalidWeek)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT OR IGNORE INTO event_infos(event_id, idx) VALUES(?, ?)",
        (&record.id, index as i64),
    )?;
    tx.execute(
        "UPDATE event_infos SET
           description = COALESCE(?, description),
           url = COALESCE(?, url),
           comment = COALESCE(?, comment),
           is_test = COALESCE(?, is_test),
           homework = COALESCE(?, homework)
         WHERE event_id = ? AND idx = ?",
        (
            &patch.description,
            &patch.url,
            &patch.comment,
            patch.is_test,
            &patch.homework,
            &record.id,
            index as i64,
        ),
    )?;
    tx.commit()?;

    load_info(conn, &record.id, index)?.ok_or_else(|| EngineError::not_found("event info"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub group_id: String,
    pub name: String,
    pub period: Period,
    #[serde(deserialize_with = "instant_format::deserialize")]
    pub start_time: DateTime<Utc>,
    #[serde(deserialize_with = "instant_format::deserialize")]
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub event_info: Option<EventInfoPatch>,
    #[serde(default)]
    pub discipline_id: Option<String>,
    #[serde(default)]
    pub discipline_type: Option<DisciplineKind>,
    #[serde(default)]
    pub teachers: Vec<String>,
    #[serde(default)]
    pub discipline_info: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub stored_end_time: DateTime<Utc>,
    pub slots: usize,
}

fn exists(conn: &Connection, sql: &str, id: &str) -> EngineResult<bool> {
    Ok(conn.prepare(sql)?.exists([id])?)
}

pub fn create_group_event(cal: &Calendar, input: &NewEvent) -> EngineResult<CreatedEvent> {
    let conn = cal.conn();
    let semester = cal.current_semester()?;
    if input.start_time > input.end_time
        || !semester.contains(input.start_time)
        || !semester.contains(input.end_time)
    {
        return Err(EngineError::InvalidDate);
    }
    let discipline = match (&input.discipline_id, input.discipline_type) {
        (Some(_), None) => return Err(EngineError::ObjectIsRequired("disciplineType".to_string())),
        (Some(id), Some(kind)) => Some((id.as_str(), kind)),
        (None, _) => None,
    };
    ensure_group(conn, &input.group_id)?;
    if let Some((discipline_id, _)) = discipline {
        if !exists(conn, "SELECT 1 FROM disciplines WHERE id = ?", discipline_id)? {
            return Err(EngineError::InvalidEntityId("discipline".to_string()));
        }
    }
    for teacher_id in &input.teachers {
        if !exists(conn, "SELECT 1 FROM teachers WHERE id = ?", teacher_id)? {
            return Err(EngineError::InvalidEntityId("teacher".to_string()));
        }
    }

    let stored_end = last_valid_end_date(input.end_time, semester.end_date, input.period);
    let slots = occurrence_count(input.start_time, stored_end, input.period);
    let id = Uuid::new_v4().to_string();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO events(id, group_id, name, url, period, start_ms, end_ms)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &input.group_id,
            input.name.trim(),
            &input.url,
            input.period,
            to_ms(input.start_time),
            to_ms(stored_end),
        ),
    )?;
    {
        let mut insert_slot =
            tx.prepare("INSERT INTO event_infos(event_id, idx) VALUES(?, ?)")?;
        for idx in 0..slots {
            insert_slot.execute((&id, idx as i64))?;
        }
    }
    if let Some(info) = &input.event_info {
        tx.execute(
            "UPDATE event_infos SET description = ?, url = ?, comment = ?, is_test = ?, homework = ?
             WHERE event_id = ? AND idx = 0",
            (
                &info.description,
                &info.url,
                &info.comment,
                db::bool_flag(info.is_test.unwrap_or(false)),
                &info.homework,
                &id,
            ),
        )?;
    }

    if let Some((discipline_id, kind)) = discipline {
        let type_id = discipline::ensure_discipline_type(&tx, discipline_id, kind)?;
        tx.execute(
            "INSERT INTO lessons(event_id, discipline_type_id) VALUES(?, ?)",
            (&id, &type_id),
        )?;
        if let Some(role) = kind.teacher_role() {
            for teacher_id in &input.teachers {
                let dt_id = discipline::ensure_discipline_teacher(&tx, teacher_id, discipline_id)?;
                discipline::ensure_teacher_role(&tx, &dt_id, &type_id, role)?;
            }
        }
        if let Some(description) = &input.discipline_info {
            tx.execute(
                "UPDATE disciplines SET description = ? WHERE id = ?",
                (description, discipline_id),
            )?;
        }
    }
    tx.commit()?;

    tracing::info!(event_id = %id, period = input.period.as_str(), slots, "event created");
    Ok(CreatedEvent {
        id,
        start_time: input.start_time,
        end_time: input.end_time,
        stored_end_time: stored_end,
        slots,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedEvent {
    pub removed_discipline_types: usize,
    pub removed_discipline_teachers: usize,
}

pub fn delete_event(conn: &Connection, event_id: &str) -> EngineResult<DeletedEvent> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let record = load_event(&tx, event_id)?;
    let type_ids: Vec<String> = {
        let mut stmt = tx.prepare("SELECT discipline_type_id FROM lessons WHERE event_id = ?")?;
        let ids = stmt
            .query_map([&record.id], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    tx.execute("DELETE FROM event_infos WHERE event_id = ?", [&record.id])?;
    tx.execute("DELETE FROM lessons WHERE event_id = ?", [&record.id])?;
    tx.execute("DELETE FROM events WHERE id = ?", [&record.id])?;

    let mut out = DeletedEvent::default();
    for type_id in &type_ids {
        if exists(&tx, "SELECT 1 FROM lessons WHERE discipline_type_id = ?", type_id)? {
            continue;
        }
        // Teachers whose every role points at the orphaned type go with it.
        let candidates: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT r.discipline_teacher_id FROM discipline_teacher_roles r
                 WHERE r.discipline_type_id = ?1
                   AND NOT EXISTS(
                     SELECT 1 FROM discipline_teacher_roles o
                     WHERE o.discipline_teacher_id = r.discipline_teacher_id
                       AND o.discipline_type_id <> ?1)",
            )?;
            let ids = stmt
                .query_map([type_id], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        tx.execute(
            "DELETE FROM discipline_teacher_roles WHERE discipline_type_id = ?",
            [type_id],
        )?;
        for dt_id in &candidates {
            if exists(&tx, "SELECT 1 FROM answers WHERE discipline_teacher_id = ?", dt_id)? {
                tracing::debug!(discipline_teacher_id = %dt_id, "kept: has poll answers");
                continue;
            }
            tx.execute(
                "DELETE FROM removed_discipline_teachers WHERE discipline_teacher_id = ?",
                [dt_id],
            )?;
            tx.execute("DELETE FROM discipline_teachers WHERE id = ?", [dt_id])?;
            out.removed_discipline_teachers += 1;
        }
        tx.execute("DELETE FROM discipline_types WHERE id = ?", [type_id])?;
        out.removed_discipline_types += 1;
    }
    tx.commit()?;

    tracing::info!(
        event_id,
        removed_types = out.removed_discipline_types,
        removed_teachers = out.removed_discipline_teachers,
        "event deleted"
    );
    Ok(out)
}

pub const DEFAULT_LESSON_MINUTES: i64 = 95;
pub const MAX_LESSON_MINUTES: i64 = 12 * 60;
pub const DEFAULT_SPAN_WEEKS: i64 = 16;
pub const MAX_SPAN_WEEKS: i64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct ImportSetup {
    pub lesson_minutes: i64,
    pub span_weeks: i64,
}

pub fn load_import_setup(conn: &Connection) -> ImportSetup {
    let obj = db::settings_get_json(conn, "setup.import")
        .ok()
        .flatten()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let bounded = |key: &str, default: i64, max: i64| {
        obj.get(key)
            .and_then(|v| v.as_i64())
            .filter(|v| (1..=max).contains(v))
            .unwrap_or(default)
    };
    ImportSetup {
        lesson_minutes: bounded("lessonMinutes", DEFAULT_LESSON_MINUTES, MAX_LESSON_MINUTES),
        span_weeks: bounded("spanWeeks", DEFAULT_SPAN_WEEKS, MAX_SPAN_WEEKS),
    }
}

/// One lesson slot as produced by a schedule scraper.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPair {
    pub subject_name: String,
    pub discipline_type_tag: String,
    #[serde(default)]
    pub teacher_names: Vec<String>,
    pub day: i64,
    pub week: i64,
    pub time: String,
    pub group: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub created: usize,
    pub upgraded: usize,
    pub unchanged: usize,
    pub added_slots: usize,
}

/// "Last First Middle"; missing parts are empty.
fn split_teacher_name(raw: &str) -> (String, String, String) {
    let mut parts = raw.split_whitespace().map(|p| p.trim_end_matches('.').to_string());
    let last = parts.next().unwrap_or_default();
    let first = parts.next().unwrap_or_default();
    let middle = parts.next().unwrap_or_default();
    (last, first, middle)
}

fn pair_start(semester: &Semester, pair: &ImportPair) -> EngineResult<DateTime<Utc>> {
    if !(1..=6).contains(&pair.day) {
        return Err(EngineError::InvalidDay);
    }
    let bounds = semester.week_bounds(pair.week)?;
    let time = NaiveTime::parse_from_str(pair.time.trim(), "%H:%M")
        .map_err(|_| EngineError::InvalidQuery(format!("bad lesson time {}", pair.time)))?;
    Ok(bounds.start_of_week
        + span(
            (pair.day - 1) * DAY_MS
                + i64::from(time.hour()) * HOUR_MS
                + i64::from(time.minute()) * MINUTE_MS,
        ))
}

fn find_imported_event(
    conn: &Connection,
    group_id: &str,
    type_id: &str,
    start: DateTime<Utc>,
) -> EngineResult<Option<EventRecord>> {
    let found = conn
        .query_row(
            "SELECT e.id, e.group_id, e.name, e.url, e.period, e.start_ms, e.end_ms
             FROM events e JOIN lessons l ON l.event_id = e.id
             WHERE e.group_id = ? AND l.discipline_type_id = ? AND e.start_ms = ?",
            (group_id, type_id, to_ms(start)),
            event_from_row,
        )
        .optional()?;
    Ok(found)
}

pub fn import_pairs(
    conn: &Connection,
    year: i64,
    semester: i64,
    pairs: &[ImportPair],
    now: DateTime<Utc>,
) -> EngineResult<ImportReport> {
    calendar::check_year_and_semester(year, semester)?;
    let target = Calendar::new(conn, now).get_semester(year, semester)?;
    let setup = load_import_setup(conn);
    let occurrence_span = span(setup.span_weeks * WEEK_MS + setup.lesson_minutes * MINUTE_MS);

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let mut report = ImportReport::default();
    for pair in pairs {
        let start = pair_start(&target, pair)?;
        let end = start + occurrence_span;

        let group_id = discipline::get_or_create_group(&tx, pair.group.trim())?;
        let subject_id = discipline::get_or_create_subject(&tx, pair.subject_name.trim())?;
        let discipline_id =
            discipline::get_or_create_discipline(&tx, &subject_id, &group_id, year, semester)?;
        let kind = DisciplineKind::from_import_tag(&pair.discipline_type_tag);
        let type_id = discipline::ensure_discipline_type(&tx, &discipline_id, kind)?;
        for raw in &pair.teacher_names {
            let (last, first, middle) = split_teacher_name(raw);
            if last.is_empty() {
                continue;
            }
            let teacher_id = discipline::get_or_create_teacher(&tx, &last, &first, &middle)?;
            let dt_id = discipline::ensure_discipline_teacher(&tx, &teacher_id, &discipline_id)?;
            if let Some(role) = kind.teacher_role() {
                discipline::ensure_teacher_role(&tx, &dt_id, &type_id, role)?;
            }
        }

        if find_imported_event(&tx, &group_id, &type_id, start)?.is_some() {
            report.unchanged += 1;
            continue;
        }
        if let Some(existing) =
            find_imported_event(&tx, &group_id, &type_id, start - span(WEEK_MS))?
        {
            let mut recurrence = Recurrence {
                period: existing.period,
                start: existing.start,
                end: existing.end,
                slots: load_slots(&tx, &existing.id)?,
            };
            let added = recurrence.upgrade_to_weekly(start, end);
            if recurrence.period != existing.period {
                tx.execute(
                    "UPDATE events SET period = ?, end_ms = ? WHERE id = ?",
                    (recurrence.period, to_ms(recurrence.end), &existing.id),
                )?;
                let mut insert_slot =
                    tx.prepare("INSERT OR IGNORE INTO event_infos(event_id, idx) VALUES(?, ?)")?;
                for idx in &added {
                    insert_slot.execute((&existing.id, *idx as i64))?;
                }
                tracing::info!(
                    event_id = %existing.id,
                    added_slots = added.len(),
                    "fortnightly event upgraded to weekly"
                );
                report.upgraded += 1;
                report.added_slots += added.len();
            } else {
                report.unchanged += 1;
            }
            continue;
        }

        let recurrence = Recurrence::new(Period::Fortnightly, start, end);
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO events(id, group_id, name, url, period, start_ms, end_ms)
             VALUES(?, ?, ?, NULL, ?, ?, ?)",
            (
                &id,
                &group_id,
                pair.subject_name.trim(),
                recurrence.period,
                to_ms(recurrence.start),
                to_ms(recurrence.end),
            ),
        )?;
        tx.execute(
            "INSERT INTO lessons(event_id, discipline_type_id) VALUES(?, ?)",
            (&id, &type_id),
        )?;
        let mut insert_slot = tx.prepare("INSERT INTO event_infos(event_id, idx) VALUES(?, ?)")?;
        for idx in &recurrence.slots {
            insert_slot.execute((&id, *idx as i64))?;
        }
        report.created += 1;
        report.added_slots += recurrence.slots.len();
    }
    tx.commit()?;

    tracing::info!(
        year,
        semester,
        created = report.created,
        upgraded = report.upgraded,
        unchanged = report.unchanged,
        "schedule import finished"
    );
    Ok(report)
}
