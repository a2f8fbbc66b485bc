use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "timetable.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Calendar reference data.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            start_ms INTEGER NOT NULL,
            PRIMARY KEY(year, semester)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semesters_start ON semesters(start_ms)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS date_vars(
            name TEXT PRIMARY KEY,
            date_ms INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            group_id TEXT,
            state TEXT NOT NULL DEFAULT 'PENDING',
            FOREIGN KEY(group_id) REFERENCES groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            middle_name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS disciplines(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            group_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            is_selective INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(group_id) REFERENCES groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_disciplines_group ON disciplines(group_id, year, semester)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS discipline_types(
            id TEXT PRIMARY KEY,
            discipline_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(discipline_id) REFERENCES disciplines(id),
            UNIQUE(discipline_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS discipline_teachers(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            discipline_id TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(discipline_id) REFERENCES disciplines(id),
            UNIQUE(teacher_id, discipline_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS discipline_teacher_roles(
            discipline_teacher_id TEXT NOT NULL,
            discipline_type_id TEXT NOT NULL,
            role TEXT NOT NULL,
            PRIMARY KEY(discipline_teacher_id, role),
            FOREIGN KEY(discipline_teacher_id) REFERENCES discipline_teachers(id),
            FOREIGN KEY(discipline_type_id) REFERENCES discipline_types(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS selective_choices(
            user_id TEXT NOT NULL,
            discipline_id TEXT NOT NULL,
            PRIMARY KEY(user_id, discipline_id),
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(discipline_id) REFERENCES disciplines(id)
        )",
        [],
    )?;

    // Schedule.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            name TEXT NOT NULL,
            url TEXT,
            period TEXT NOT NULL,
            start_ms INTEGER NOT NULL,
            end_ms INTEGER NOT NULL,
            FOREIGN KEY(group_id) REFERENCES groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_group_window ON events(group_id, start_ms, end_ms)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS event_infos(
            event_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            description TEXT,
            url TEXT,
            comment TEXT,
            is_test INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(event_id, idx),
            FOREIGN KEY(event_id) REFERENCES events(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            event_id TEXT NOT NULL,
            discipline_type_id TEXT NOT NULL,
            PRIMARY KEY(event_id, discipline_type_id),
            FOREIGN KEY(event_id) REFERENCES events(id),
            FOREIGN KEY(discipline_type_id) REFERENCES discipline_types(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_type ON lessons(discipline_type_id)",
        [],
    )?;

    // Poll.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            name TEXT NOT NULL,
            text TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_required INTEGER NOT NULL DEFAULT 0,
            criteria TEXT,
            type TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS question_roles(
            question_id TEXT NOT NULL,
            role TEXT NOT NULL,
            is_shown INTEGER NOT NULL DEFAULT 1,
            is_required INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(question_id, role),
            FOREIGN KEY(question_id) REFERENCES questions(id)
        )",
        [],
    )?;
    // The uniqueness of (discipline teacher, user, question) must hold even when
    // two submissions race past the validator.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS answers(
            discipline_teacher_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            value TEXT NOT NULL,
            FOREIGN KEY(discipline_teacher_id) REFERENCES discipline_teachers(id),
            FOREIGN KEY(question_id) REFERENCES questions(id),
            UNIQUE(discipline_teacher_id, user_id, question_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS removed_discipline_teachers(
            user_id TEXT NOT NULL,
            discipline_teacher_id TEXT NOT NULL,
            PRIMARY KEY(user_id, discipline_teacher_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS moderation_outbox(
            id TEXT PRIMARY KEY,
            discipline_teacher_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            teacher_name TEXT NOT NULL,
            user_id TEXT NOT NULL,
            response TEXT NOT NULL,
            question_id TEXT NOT NULL,
            created_ms INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roles(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            weight INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grants(
            role_id TEXT NOT NULL,
            permission TEXT NOT NULL,
            PRIMARY KEY(role_id, permission),
            FOREIGN KEY(role_id) REFERENCES roles(id)
        )",
        [],
    )?;

    // Columns added after the first schema revision.
    if !table_has_column(&conn, "disciplines", "description")? {
        conn.execute("ALTER TABLE disciplines ADD COLUMN description TEXT", [])?;
    }
    if !table_has_column(&conn, "event_infos", "homework")? {
        conn.execute("ALTER TABLE event_infos ADD COLUMN homework TEXT", [])?;
    }

    Ok(conn)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn to_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

/// Reads a stored epoch-millisecond column back into an instant.
pub fn from_ms(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

pub fn bool_flag(v: bool) -> i64 {
    i64::from(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
    }

    #[test]
    fn open_db_is_idempotent() {
        let ws = temp_workspace("timetabled-db");
        drop(open_db(&ws).expect("first open"));
        let conn = open_db(&ws).expect("second open");
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'answers'",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(n, 1);
    }

    #[test]
    fn older_workspaces_gain_added_columns() {
        let ws = temp_workspace("timetabled-migrate");
        std::fs::create_dir_all(&ws).expect("mkdir");
        {
            let conn = Connection::open(ws.join(DB_FILE_NAME)).expect("raw open");
            conn.execute_batch(
                "CREATE TABLE event_infos(
                    event_id TEXT NOT NULL,
                    idx INTEGER NOT NULL,
                    description TEXT,
                    url TEXT,
                    comment TEXT,
                    is_test INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY(event_id, idx)
                 );
                 INSERT INTO event_infos(event_id, idx) VALUES('e1', 0);",
            )
            .expect("old schema");
        }
        let conn = open_db(&ws).expect("migrate");
        assert!(table_has_column(&conn, "event_infos", "homework").expect("pragma"));
        assert!(table_has_column(&conn, "disciplines", "description").expect("pragma"));
        let kept: i64 = conn
            .query_row("SELECT COUNT(*) FROM event_infos", [], |r| r.get(0))
            .expect("count");
        assert_eq!(kept, 1);
    }

    #[test]
    fn settings_roundtrip_and_overwrite() {
        let conn = open_db(&temp_workspace("timetabled-settings")).expect("open");
        assert!(settings_get_json(&conn, "setup.calendar").expect("get").is_none());
        settings_set_json(&conn, "setup.calendar", &serde_json::json!({"a": 1})).expect("set");
        settings_set_json(&conn, "setup.calendar", &serde_json::json!({"a": 2})).expect("set");
        assert_eq!(
            settings_get_json(&conn, "setup.calendar").expect("get"),
            Some(serde_json::json!({"a": 2}))
        );
    }

    #[test]
    fn answer_triple_is_unique_at_storage_level() {
        let conn = open_db(&temp_workspace("timetabled-unique")).expect("open");
        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
             INSERT INTO answers VALUES('dt', 'u', 'q', '1');",
        )
        .expect("seed");
        let dup = conn.execute("INSERT INTO answers VALUES('dt', 'u', 'q', '0')", []);
        assert!(dup.is_err());
    }
}
