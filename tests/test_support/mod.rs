#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .env_remove("TIMETABLED_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn timetabled");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Returns the error object of a request that is expected to fail.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

/// Direct handle on the workspace database for seeding reference rows.
pub fn open_workspace_db(workspace: &Path) -> Connection {
    let conn = Connection::open(workspace.join("timetable.sqlite3")).expect("open workspace db");
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .expect("busy timeout");
    conn
}

pub fn seed_group(conn: &Connection, id: &str, code: &str) {
    conn.execute("INSERT INTO groups(id, code) VALUES(?, ?)", (id, code))
        .expect("seed group");
}

pub fn seed_user(conn: &Connection, id: &str, group_id: &str, state: &str) {
    conn.execute(
        "INSERT INTO users(id, group_id, state) VALUES(?, ?, ?)",
        (id, group_id, state),
    )
    .expect("seed user");
}

/// Subject, discipline and one teacher assigned to it with `roles`.
/// Returns (discipline id, discipline teacher id).
pub fn seed_discipline_teacher(
    conn: &Connection,
    prefix: &str,
    group_id: &str,
    year: i64,
    semester: i64,
    roles: &[&str],
) -> (String, String) {
    let subject = format!("{prefix}-subject");
    let discipline = format!("{prefix}-discipline");
    let teacher = format!("{prefix}-teacher");
    let dt = format!("{prefix}-dt");
    conn.execute(
        "INSERT INTO subjects(id, name) VALUES(?, ?)",
        (&subject, format!("Subject {prefix}")),
    )
    .expect("subject");
    conn.execute(
        "INSERT INTO disciplines(id, subject_id, group_id, year, semester) VALUES(?, ?, ?, ?, ?)",
        (&discipline, &subject, group_id, year, semester),
    )
    .expect("discipline");
    conn.execute(
        "INSERT INTO teachers(id, last_name, first_name, middle_name) VALUES(?, 'Franko', 'Ivan', 'Yakovych')",
        [&teacher],
    )
    .expect("teacher");
    conn.execute(
        "INSERT INTO discipline_teachers(id, teacher_id, discipline_id) VALUES(?, ?, ?)",
        (&dt, &teacher, &discipline),
    )
    .expect("discipline teacher");
    for role in roles {
        let kind = match *role {
            "LECTURER" => "LECTURE",
            "PRACTICIAN" => "PRACTICE",
            _ => "LABORATORY",
        };
        let type_id = format!("{prefix}-{kind}");
        conn.execute(
            "INSERT OR IGNORE INTO discipline_types(id, discipline_id, name) VALUES(?, ?, ?)",
            (&type_id, &discipline, kind),
        )
        .expect("discipline type");
        conn.execute(
            "INSERT INTO discipline_teacher_roles(discipline_teacher_id, discipline_type_id, role)
             VALUES(?, ?, ?)",
            (&dt, &type_id, role),
        )
        .expect("role");
    }
    (discipline, dt)
}
