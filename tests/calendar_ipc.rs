mod test_support;

use serde_json::json;
use test_support::{error_code, request_err, request_ok, select_workspace, spawn_sidecar, temp_dir};

const NOW: &str = "2023-02-08T09:00:00Z";

#[test]
fn calendar_methods_resolve_weeks_and_days() {
    let workspace = temp_dir("timetabled-calendar");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let e = request_err(&mut stdin, &mut reader, "0", "calendar.current", json!({}));
    assert_eq!(error_code(&e), "no_workspace");

    select_workspace(&mut stdin, &mut reader, &workspace);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.current",
        json!({ "now": "2023-05-11T00:00:00Z" }),
    );
    assert_eq!(error_code(&e), "data_not_found");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.semesters.set",
        json!({ "year": 2022, "semester": 1, "startDate": "2022-09-05" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.semesters.set",
        json!({ "year": 2023, "semester": 2, "startDate": "2023-02-06T00:00:00Z" }),
    );

    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.semesters.set",
        json!({ "year": 2023, "semester": 3, "startDate": "2023-06-01" }),
    );
    assert_eq!(error_code(&e), "invalid_query");

    let autumn = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.semesters.get",
        json!({ "year": 2022, "semester": 1 }),
    );
    assert_eq!(
        autumn.get("endDate").and_then(|v| v.as_str()),
        Some("2023-02-06T00:00:00Z")
    );

    let e = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "calendar.semesters.get",
        json!({ "year": 2021, "semester": 2 }),
    );
    assert_eq!(error_code(&e), "not_found");

    // Wednesday of the third week.
    let current = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "calendar.current",
        json!({ "now": "2023-02-22T10:00:00" }),
    );
    assert_eq!(current.get("week").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(current.get("day").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(
        current
            .get("semester")
            .and_then(|s| s.get("year"))
            .and_then(|v| v.as_i64()),
        Some(2023)
    );

    let week = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "calendar.week",
        json!({ "week": 4, "now": "2023-02-22T10:00:00" }),
    );
    assert_eq!(
        week.get("startOfWeek").and_then(|v| v.as_str()),
        Some("2023-03-06T00:00:00Z")
    );
    assert_eq!(
        week.get("endOfWeek").and_then(|v| v.as_str()),
        Some("2023-03-12T23:59:59.999Z")
    );

    for (i, bad_week) in [json!(-1), json!(20), json!(100_000_000_000i64), json!(i64::MAX)]
        .into_iter()
        .enumerate()
    {
        let e = request_err(
            &mut stdin,
            &mut reader,
            &format!("8-{i}"),
            "calendar.week",
            json!({ "week": bad_week, "now": "2023-03-01" }),
        );
        assert_eq!(error_code(&e), "invalid_week");
    }
    let _ = request_ok(&mut stdin, &mut reader, "8-alive", "health", json!({}));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "calendar.day",
        json!({ "now": "2023-02-26T12:00:00Z" }),
    );
    assert_eq!(error_code(&e), "invalid_day");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "calendar.dateVars.set",
        json!({ "name": "START_POLL_2023_2", "date": "2023-05-10" }),
    );
    let var = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "calendar.dateVars.get",
        json!({ "name": "START_POLL_2023_2" }),
    );
    assert_eq!(
        var.get("date").and_then(|v| v.as_str()),
        Some("2023-05-10T00:00:00Z")
    );
    let e = request_err(
        &mut stdin,
        &mut reader,
        "12",
        "calendar.dateVars.get",
        json!({ "name": "END_POLL_2023_2" }),
    );
    assert_eq!(error_code(&e), "not_found");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "13",
        "calendar.current",
        json!({ "now": "yesterday" }),
    );
    assert_eq!(error_code(&e), "bad_params");

    let e = request_err(&mut stdin, &mut reader, "14", "calendar.unknown", json!({}));
    assert_eq!(error_code(&e), "not_implemented");
}

#[test]
fn setup_sections_drive_semester_length_and_import_span() {
    let workspace = temp_dir("timetabled-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let defaults = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(defaults["calendar"]["semesterFallbackWeeks"].as_i64(), Some(20));
    assert_eq!(defaults["import"]["lessonMinutes"].as_i64(), Some(95));
    assert_eq!(defaults["import"]["spanWeeks"].as_i64(), Some(16));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.semesters.set",
        json!({ "year": 2023, "semester": 2, "startDate": "2023-02-06" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.current",
        json!({ "now": "2023-05-11T00:00:00Z" }),
    );

    let rejected = [
        json!({ "section": "calendar", "patch": { "semesterFallbackWeeks": 0 } }),
        json!({ "section": "calendar", "patch": { "semesterFallbackWeeks": 100_000_000_000i64 } }),
        json!({ "section": "calendar", "patch": { "semesterFallbackWeeks": "ten" } }),
        json!({ "section": "calendar", "patch": { "lessonMinutes": 80 } }),
        json!({ "section": "import", "patch": { "lessonMinutes": -5 } }),
        json!({ "section": "grading", "patch": {} }),
        json!({ "section": "import", "patch": 3 }),
    ];
    for (i, params) in rejected.into_iter().enumerate() {
        let e = request_err(&mut stdin, &mut reader, &format!("bad-{i}"), "setup.update", params);
        assert_eq!(error_code(&e), "bad_params");
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "calendar", "patch": { "semesterFallbackWeeks": 10 } }),
    );
    let e = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.current",
        json!({ "now": "2023-05-11T00:00:00Z" }),
    );
    assert_eq!(error_code(&e), "data_not_found");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "setup.update",
        json!({ "section": "import", "patch": { "lessonMinutes": 80 } }),
    );
    assert_eq!(updated["values"]["lessonMinutes"].as_i64(), Some(80));
    assert_eq!(updated["values"]["spanWeeks"].as_i64(), Some(16));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.import",
        json!({
            "year": 2023,
            "semester": 2,
            "now": NOW,
            "pairs": [{
                "subjectName": "Databases",
                "disciplineTypeTag": "Лек",
                "teacherNames": [],
                "day": 2,
                "week": 0,
                "time": "10:25",
                "group": "KI-31"
            }]
        }),
    );
    let conn = test_support::open_workspace_db(&workspace);
    let group_id: String = conn
        .query_row("SELECT id FROM groups WHERE code = 'KI-31'", [], |r| r.get(0))
        .expect("imported group");
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.general.list",
        json!({ "groupId": group_id, "week": 0, "now": NOW }),
    );
    assert_eq!(
        listed["events"][0]["endTime"].as_str(),
        Some("2023-02-07T11:45:00Z")
    );

    let stored = request_ok(&mut stdin, &mut reader, "9", "setup.get", json!({}));
    assert_eq!(stored["calendar"]["semesterFallbackWeeks"].as_i64(), Some(10));
    assert_eq!(stored["import"]["lessonMinutes"].as_i64(), Some(80));
}
