use crate::error::{EngineError, EngineResult};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeacherRole {
    Lecturer,
    Practician,
    Laborant,
}

impl TeacherRole {
    pub const ALL: [TeacherRole; 3] = [
        TeacherRole::Lecturer,
        TeacherRole::Practician,
        TeacherRole::Laborant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TeacherRole::Lecturer => "LECTURER",
            TeacherRole::Practician => "PRACTICIAN",
            TeacherRole::Laborant => "LABORANT",
        }
    }

    pub fn parse(s: &str) -> Option<TeacherRole> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisciplineKind {
    Lecture,
    Practice,
    Laboratory,
    Consultation,
    Exam,
    Workout,
}

impl DisciplineKind {
    pub const ALL: [DisciplineKind; 6] = [
        DisciplineKind::Lecture,
        DisciplineKind::Practice,
        DisciplineKind::Laboratory,
        DisciplineKind::Consultation,
        DisciplineKind::Exam,
        DisciplineKind::Workout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DisciplineKind::Lecture => "LECTURE",
            DisciplineKind::Practice => "PRACTICE",
            DisciplineKind::Laboratory => "LABORATORY",
            DisciplineKind::Consultation => "CONSULTATION",
            DisciplineKind::Exam => "EXAM",
            DisciplineKind::Workout => "WORKOUT",
        }
    }

    pub fn parse(s: &str) -> Option<DisciplineKind> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Tag used by the schedule scraper (`Лек`, `Прак`, `Лаб`), falling back
    /// to the plain names. Unknown tags are lectures.
    pub fn from_import_tag(tag: &str) -> DisciplineKind {
        match tag.trim() {
            "Лек" => DisciplineKind::Lecture,
            "Прак" => DisciplineKind::Practice,
            "Лаб" => DisciplineKind::Laboratory,
            other => Self::parse(other).unwrap_or(DisciplineKind::Lecture),
        }
    }

    pub fn teacher_role(self) -> Option<TeacherRole> {
        match self {
            DisciplineKind::Lecture => Some(TeacherRole::Lecturer),
            DisciplineKind::Practice => Some(TeacherRole::Practician),
            DisciplineKind::Laboratory => Some(TeacherRole::Laborant),
            DisciplineKind::Consultation | DisciplineKind::Exam | DisciplineKind::Workout => None,
        }
    }

    /// Consultations, exams and workouts are listed under "other events".
    pub fn is_other(self) -> bool {
        self.teacher_role().is_none()
    }
}

impl FromSql for DisciplineKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        DisciplineKind::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown discipline type {raw}").into()))
    }
}

/// A teacher's assignment to a discipline, with what the poll needs to know
/// about both sides.
#[derive(Debug, Clone)]
pub struct DisciplineTeacher {
    pub id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub discipline_id: String,
    pub subject_name: String,
    pub year: i64,
    pub semester: i64,
}

pub fn discipline_teacher(conn: &Connection, id: &str) -> EngineResult<DisciplineTeacher> {
    conn.query_row(
        "SELECT dt.id, t.id, t.first_name, t.middle_name, t.last_name,
                d.id, s.name, d.year, d.semester
         FROM discipline_teachers dt
         JOIN teachers t ON t.id = dt.teacher_id
         JOIN disciplines d ON d.id = dt.discipline_id
         JOIN subjects s ON s.id = d.subject_id
         WHERE dt.id = ?",
        [id],
        |r| {
            let first: String = r.get(2)?;
            let middle: String = r.get(3)?;
            let last: String = r.get(4)?;
            Ok(DisciplineTeacher {
                id: r.get(0)?,
                teacher_id: r.get(1)?,
                teacher_name: format!("{} {} {}", first, middle, last),
                discipline_id: r.get(5)?,
                subject_name: r.get(6)?,
                year: r.get(7)?,
                semester: r.get(8)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::InvalidEntityId("disciplineTeacher".to_string()))
}

fn parse_roles(raw: Vec<String>) -> Vec<TeacherRole> {
    let mut out: Vec<TeacherRole> = Vec::new();
    for role in raw.iter().filter_map(|s| TeacherRole::parse(s)) {
        if !out.contains(&role) {
            out.push(role);
        }
    }
    out
}

pub fn teacher_roles(conn: &Connection, discipline_teacher_id: &str) -> EngineResult<Vec<TeacherRole>> {
    let mut stmt = conn.prepare(
        "SELECT role FROM discipline_teacher_roles WHERE discipline_teacher_id = ? ORDER BY role",
    )?;
    let raw = stmt
        .query_map([discipline_teacher_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parse_roles(raw))
}

/// Every role any teacher holds anywhere in the discipline.
pub fn discipline_roles(conn: &Connection, discipline_id: &str) -> EngineResult<Vec<TeacherRole>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT r.role
         FROM discipline_teacher_roles r
         JOIN discipline_teachers dt ON dt.id = r.discipline_teacher_id
         WHERE dt.discipline_id = ?
         ORDER BY r.role",
    )?;
    let raw = stmt
        .query_map([discipline_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parse_roles(raw))
}

pub fn get_or_create_group(conn: &Connection, code: &str) -> EngineResult<String> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM groups WHERE code = ?", [code], |r| r.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO groups(id, code) VALUES(?, ?)", (&id, code))?;
    Ok(id)
}

pub fn get_or_create_subject(conn: &Connection, name: &str) -> EngineResult<String> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM subjects WHERE name = ?", [name], |r| r.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO subjects(id, name) VALUES(?, ?)", (&id, name))?;
    Ok(id)
}

pub fn get_or_create_discipline(
    conn: &Connection,
    subject_id: &str,
    group_id: &str,
    year: i64,
    semester: i64,
) -> EngineResult<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM disciplines
             WHERE subject_id = ? AND group_id = ? AND year = ? AND semester = ?",
            (subject_id, group_id, year, semester),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO disciplines(id, subject_id, group_id, year, semester) VALUES(?, ?, ?, ?, ?)",
        (&id, subject_id, group_id, year, semester),
    )?;
    Ok(id)
}

/// Resolves a teacher by name. Initials-only first/middle names match a
/// unique teacher with the same last name; otherwise the exact name is
/// looked up or created.
pub fn get_or_create_teacher(
    conn: &Connection,
    last_name: &str,
    first_name: &str,
    middle_name: &str,
) -> EngineResult<String> {
    if first_name.chars().count() <= 1 || middle_name.chars().count() <= 1 {
        let mut stmt = conn.prepare(
            "SELECT id FROM teachers
             WHERE last_name = ? AND first_name LIKE ? || '%' AND middle_name LIKE ? || '%'",
        )?;
        let ids = stmt
            .query_map((last_name, first_name, middle_name), |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if ids.len() == 1 {
            return Ok(ids[0].clone());
        }
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM teachers WHERE last_name = ? AND first_name = ? AND middle_name = ?",
            (last_name, first_name, middle_name),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, last_name, first_name, middle_name) VALUES(?, ?, ?, ?)",
        (&id, last_name, first_name, middle_name),
    )?;
    Ok(id)
}

pub fn ensure_discipline_type(
    conn: &Connection,
    discipline_id: &str,
    kind: DisciplineKind,
) -> EngineResult<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM discipline_types WHERE discipline_id = ? AND name = ?",
            (discipline_id, kind.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO discipline_types(id, discipline_id, name) VALUES(?, ?, ?)",
        (&id, discipline_id, kind.as_str()),
    )?;
    Ok(id)
}

pub fn ensure_discipline_teacher(
    conn: &Connection,
    teacher_id: &str,
    discipline_id: &str,
) -> EngineResult<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM discipline_teachers WHERE teacher_id = ? AND discipline_id = ?",
            (teacher_id, discipline_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO discipline_teachers(id, teacher_id, discipline_id) VALUES(?, ?, ?)",
        (&id, teacher_id, discipline_id),
    )?;
    Ok(id)
}

pub fn ensure_teacher_role(
    conn: &Connection,
    discipline_teacher_id: &str,
    discipline_type_id: &str,
    role: TeacherRole,
) -> EngineResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO discipline_teacher_roles(discipline_teacher_id, discipline_type_id, role)
         VALUES(?, ?, ?)",
        (discipline_teacher_id, discipline_type_id, role.as_str()),
    )?;
    Ok(())
}
