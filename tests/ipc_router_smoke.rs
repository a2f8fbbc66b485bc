mod test_support;

use serde_json::json;
use test_support::{request, request_ok, select_workspace, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("timetabled-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));
    select_workspace(&mut stdin, &mut reader, &workspace);

    let now = json!("2023-02-08T09:00:00Z");
    let calls = [
        ("calendar.semesters.list", json!({})),
        ("calendar.current", json!({ "now": now })),
        ("schedule.general.list", json!({ "groupId": "missing", "now": now })),
        ("schedule.event.get", json!({ "eventId": "missing", "week": 0, "now": now })),
        ("schedule.event.delete", json!({ "eventId": "missing" })),
        ("poll.timeBorders", json!({ "now": now })),
        ("poll.eligible", json!({ "disciplineTeacherId": "x", "userId": "y", "now": now })),
        ("poll.questions.create", json!({ "questions": [] })),
        ("setup.get", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let value = request(&mut stdin, &mut reader, &format!("c{i}"), method, params);
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        assert_ne!(code, "not_implemented", "unexpected unknown method {}", method);
        assert_ne!(code, "bad_params", "{} rejected its params: {}", method, value);
    }

    let role = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "roles.create",
        json!({ "name": "Group captain", "grants": ["groups.g1.*", "groups.g1.students.get"] }),
    );
    assert_eq!(role.get("weight").and_then(|v| v.as_u64()), Some(4));

    let rejected = request(
        &mut stdin,
        &mut reader,
        "r2",
        "roles.create",
        json!({ "name": "", "grants": [] }),
    );
    assert_eq!(rejected["error"]["code"].as_str(), Some("object_is_required"));
    assert_eq!(rejected["error"]["details"]["field"].as_str(), Some("name"));

    let missing_id = request(&mut stdin, &mut reader, "x", "bogus.method", json!({}));
    assert_eq!(missing_id["error"]["code"].as_str(), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}
