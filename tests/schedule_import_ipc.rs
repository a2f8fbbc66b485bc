mod test_support;

use serde_json::json;
use test_support::{
    error_code, open_workspace_db, request_err, request_ok, select_workspace, spawn_sidecar,
    temp_dir,
};

const NOW: &str = "2023-02-08T09:00:00Z";

fn pair(week: i64) -> serde_json::Value {
    json!({
        "subjectName": "Databases",
        "disciplineTypeTag": "Лек",
        "teacherNames": ["Shevchenko Taras Hryhorovych"],
        "day": 2,
        "week": week,
        "time": "10:25",
        "group": "KI-31"
    })
}

#[test]
fn import_creates_fortnightly_events_and_upgrades_them_once() {
    let workspace = temp_dir("timetabled-import");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "0",
        "schedule.import",
        json!({ "year": 2023, "semester": 2, "pairs": [pair(0)], "now": NOW }),
    );
    assert_eq!(error_code(&e), "not_found");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.semesters.set",
        json!({ "year": 2023, "semester": 2, "startDate": "2023-02-06" }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.import",
        json!({ "year": 2023, "semester": 2, "pairs": [pair(0)], "now": NOW }),
    );
    assert_eq!(first.get("created").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(first.get("addedSlots").and_then(|v| v.as_u64()), Some(9));

    let conn = open_workspace_db(&workspace);
    let group_id: String = conn
        .query_row("SELECT id FROM groups WHERE code = 'KI-31'", [], |r| r.get(0))
        .expect("imported group");

    let odd_week = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.general.list",
        json!({ "groupId": group_id, "week": 1, "now": NOW }),
    );
    assert_eq!(odd_week["events"].as_array().map(|a| a.len()), Some(0));

    let upgraded = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.import",
        json!({ "year": 2023, "semester": 2, "pairs": [pair(1)], "now": NOW }),
    );
    assert_eq!(upgraded.get("upgraded").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(upgraded.get("addedSlots").and_then(|v| v.as_u64()), Some(8));

    let again = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.import",
        json!({ "year": 2023, "semester": 2, "pairs": [pair(0), pair(1)], "now": NOW }),
    );
    assert_eq!(again.get("unchanged").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(again.get("created").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(again.get("upgraded").and_then(|v| v.as_u64()), Some(0));

    let events: i64 = conn
        .query_row("SELECT COUNT(*) FROM events WHERE group_id = ?", [&group_id], |r| r.get(0))
        .expect("count events");
    assert_eq!(events, 1);
    let teachers: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM teachers WHERE last_name = 'Shevchenko'",
            [],
            |r| r.get(0),
        )
        .expect("count teachers");
    assert_eq!(teachers, 1);

    let odd_week = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.general.list",
        json!({ "groupId": group_id, "week": 1, "now": NOW }),
    );
    let listed = odd_week["events"].as_array().cloned().unwrap_or_default();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["period"].as_str(), Some("WEEKLY"));
    assert_eq!(listed[0]["startTime"].as_str(), Some("2023-02-14T10:25:00Z"));
    assert_eq!(listed[0]["endTime"].as_str(), Some("2023-02-14T12:00:00Z"));
    assert_eq!(listed[0]["lessons"][0]["type"].as_str(), Some("LECTURE"));
    assert_eq!(
        listed[0]["lessons"][0]["teachers"][0].as_str(),
        Some("Taras Hryhorovych Shevchenko")
    );
}

#[test]
fn import_rejects_bad_pairs_without_partial_writes() {
    let workspace = temp_dir("timetabled-import-bad");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.semesters.set",
        json!({ "year": 2023, "semester": 2, "startDate": "2023-02-06" }),
    );

    let mut sunday = pair(0);
    sunday["day"] = json!(7);
    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.import",
        json!({ "year": 2023, "semester": 2, "pairs": [pair(0), sunday], "now": NOW }),
    );
    assert_eq!(error_code(&e), "invalid_day");

    let mut bad_time = pair(0);
    bad_time["time"] = json!("late");
    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.import",
        json!({ "year": 2023, "semester": 2, "pairs": [bad_time], "now": NOW }),
    );
    assert_eq!(error_code(&e), "invalid_query");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.import",
        json!({ "year": 2023, "semester": 5, "pairs": [], "now": NOW }),
    );
    assert_eq!(error_code(&e), "invalid_query");

    let conn = open_workspace_db(&workspace);
    let events: i64 = conn
        .query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))
        .expect("count events");
    assert_eq!(events, 0);
}
