use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

const TODAY: &str = "2025-09-10";

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schooltasksd");
    let mut child = Command::new(exe)
        .env("SCHOOLTASKSD_JWT_SECRET", "integration-test-secret")
        .env("SCHOOLTASKSD_TODAY", TODAY)
        .env_remove("SCHOOLTASKSD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schooltasksd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    token: Option<&str>,
    params: serde_json::Value,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(t) = token {
        payload["token"] = json!(t);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    token: Option<&str>,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, token, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "expected failure: {}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

/// Opens `workspace`, creates the first coordinator and returns its token.
fn setup_coordinator(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) -> String {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        None,
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "boot",
        "auth.bootstrap",
        None,
        json!({
            "email": "coord@school.test",
            "password": "coordpass",
            "firstName": "Carla",
            "lastName": "Mendez"
        }),
    );
    login(stdin, reader, "coord@school.test", "coordpass")
}

fn login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    email: &str,
    password: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        "login",
        "auth.login",
        None,
        json!({ "email": email, "password": password }),
    );
    res["token"].as_str().expect("token").to_string()
}

fn create_teacher(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    coord: &str,
    first: &str,
    email: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        "teacher",
        "users.create",
        Some(coord),
        json!({
            "firstName": first,
            "lastName": "Teacher",
            "email": email,
            "password": "teachpass",
            "role": "teacher"
        }),
    );
    res["id"].as_str().expect("teacher id").to_string()
}

struct School {
    coord: String,
    owner: String,
    other: String,
    math: String,
    g10a: String,
}

fn seed_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) -> School {
    let coord = setup_coordinator(stdin, reader, workspace);
    let owner_id = create_teacher(stdin, reader, &coord, "Ana", "ana@school.test");
    create_teacher(stdin, reader, &coord, "Luis", "luis@school.test");
    let math = request_ok(
        stdin,
        reader,
        "s1",
        "subjects.create",
        Some(&coord),
        json!({ "name": "Math", "code": "MAT" }),
    )["id"]
        .as_str()
        .expect("math id")
        .to_string();
    let g10a = request_ok(
        stdin,
        reader,
        "g1",
        "groups.create",
        Some(&coord),
        json!({ "name": "10A", "grade": "10", "section": "A", "academicYear": "2025" }),
    )["id"]
        .as_str()
        .expect("group id")
        .to_string();
    request_ok(
        stdin,
        reader,
        "a1",
        "assignments.create",
        Some(&coord),
        json!({ "userId": owner_id, "subjectId": math, "groupId": g10a, "academicYear": "2025" }),
    );
    School {
        owner: login(stdin, reader, "ana@school.test", "teachpass"),
        other: login(stdin, reader, "luis@school.test", "teachpass"),
        coord,
        math,
        g10a,
    }
}

#[test]
fn only_assigned_teachers_post_and_only_owners_mutate() {
    let workspace = temp_dir("schooltasks-task-lifecycle");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed_school(&mut stdin, &mut reader, &workspace);

    let new_task = json!({
        "title": "Quiz",
        "description": "Chapter 3",
        "dueDate": "2025-09-12T23:30:00-05:00",
        "subjectId": s.math,
        "groupId": s.g10a
    });

    let denied = request(&mut stdin, &mut reader, "t1", "tasks.create", Some(&s.other), new_task.clone());
    assert_eq!(error_code(&denied), "forbidden");
    let by_coord = request(&mut stdin, &mut reader, "t2", "tasks.create", Some(&s.coord), new_task.clone());
    assert_eq!(error_code(&by_coord), "forbidden");

    let task = request_ok(&mut stdin, &mut reader, "t3", "tasks.create", Some(&s.owner), new_task);
    assert_eq!(task["dueDate"], "2025-09-12");
    assert_eq!(task["status"], "pending");
    assert_eq!(task["priority"], "medium");
    assert_eq!(task["urgency"], "yellow");
    let task_id = task["id"].as_str().expect("task id").to_string();

    let foreign_update = request(
        &mut stdin,
        &mut reader,
        "u1",
        "tasks.update",
        Some(&s.other),
        json!({ "taskId": task_id, "title": "Hijacked" }),
    );
    assert_eq!(error_code(&foreign_update), "not_found");
    let missing_update = request(
        &mut stdin,
        &mut reader,
        "u2",
        "tasks.update",
        Some(&s.owner),
        json!({ "taskId": "no-such-task", "title": "x" }),
    );
    assert_eq!(error_code(&missing_update), "not_found");
    assert_eq!(foreign_update["error"]["message"], missing_update["error"]["message"]);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "u3",
        "tasks.update",
        Some(&s.owner),
        json!({ "taskId": task_id, "status": "completed", "dueDate": "2025-09-20" }),
    );
    assert_eq!(updated["status"], "completed");
    assert_eq!(updated["dueDate"], "2025-09-20");
    assert_eq!(updated["title"], "Quiz");

    let foreign_delete = request(
        &mut stdin,
        &mut reader,
        "d1",
        "tasks.delete",
        Some(&s.other),
        json!({ "taskId": task_id }),
    );
    assert_eq!(error_code(&foreign_delete), "not_found");
    request_ok(&mut stdin, &mut reader, "d2", "tasks.delete", Some(&s.owner), json!({ "taskId": task_id }));

    let gone = request(&mut stdin, &mut reader, "p1", "public.task", None, json!({ "taskId": task_id }));
    assert_eq!(error_code(&gone), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn listing_and_calendar_derive_status_and_urgency_from_today() {
    let workspace = temp_dir("schooltasks-task-calendar");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed_school(&mut stdin, &mut reader, &workspace);

    for (i, due) in ["2025-09-05", "2025-09-11", "2025-09-11", "2025-09-11", "2025-09-25"]
        .into_iter()
        .enumerate()
    {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "tasks.create",
            Some(&s.owner),
            json!({
                "title": format!("Task {}", i),
                "description": "Read",
                "dueDate": due,
                "subjectId": s.math,
                "groupId": s.g10a
            }),
        );
    }

    let listed = request_ok(&mut stdin, &mut reader, "l1", "tasks.list", Some(&s.owner), json!({}));
    let items = listed["items"].as_array().expect("items");
    assert_eq!(items.len(), 5);
    assert_eq!(items[0]["dueDate"], "2025-09-05");
    assert_eq!(items[0]["status"], "pending");
    assert_eq!(items[0]["effectiveStatus"], "overdue");

    let overdue = request_ok(
        &mut stdin,
        &mut reader,
        "l2",
        "tasks.list",
        Some(&s.owner),
        json!({ "status": "overdue" }),
    );
    assert_eq!(overdue["items"].as_array().map(Vec::len), Some(1));

    let cal = request_ok(
        &mut stdin,
        &mut reader,
        "cal",
        "tasks.calendar",
        Some(&s.owner),
        json!({ "groupId": s.g10a, "year": 2025, "month": 9 }),
    );
    let days = cal["days"].as_array().expect("days");
    assert_eq!(days.len(), 30);
    assert_eq!(days[10]["date"], "2025-09-11");
    assert_eq!(days[10]["taskCount"], 3);
    assert_eq!(days[10]["urgency"], "red");
    assert_eq!(days[24]["urgency"], "green");
    assert!(days[0]["urgency"].is_null());
    assert_eq!(cal["tasks"].as_array().map(Vec::len), Some(5));

    let not_assigned = request(
        &mut stdin,
        &mut reader,
        "cal2",
        "tasks.calendar",
        Some(&s.other),
        json!({ "groupId": s.g10a, "year": 2025, "month": 9 }),
    );
    assert_eq!(error_code(&not_assigned), "forbidden");

    let bad_month = request(
        &mut stdin,
        &mut reader,
        "cal3",
        "tasks.calendar",
        Some(&s.owner),
        json!({ "groupId": s.g10a, "year": 2025, "month": 13 }),
    );
    assert_eq!(error_code(&bad_month), "bad_params");

    let dash = request_ok(&mut stdin, &mut reader, "dash", "dashboard.teacher", Some(&s.owner), json!({}));
    assert_eq!(dash["stats"]["totalTasks"], 5);
    assert_eq!(dash["stats"]["overdueTasks"], 1);
    assert_eq!(dash["upcomingTasks"].as_array().map(Vec::len), Some(3));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn retiring_group_subject_and_teacher_keeps_their_history() {
    let workspace = temp_dir("schooltasks-task-history");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed_school(&mut stdin, &mut reader, &workspace);
    let owner_id = request_ok(&mut stdin, &mut reader, "me", "auth.me", Some(&s.owner), json!({}))["id"]
        .as_str()
        .expect("owner id")
        .to_string();

    let task = request_ok(
        &mut stdin,
        &mut reader,
        "t1",
        "tasks.create",
        Some(&s.owner),
        json!({
            "title": "Lab report",
            "description": "Pendulum",
            "dueDate": "2025-09-20",
            "subjectId": s.math,
            "groupId": s.g10a
        }),
    );
    let task_id = task["id"].as_str().expect("task id").to_string();

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "su",
        "subjects.update",
        Some(&s.coord),
        json!({ "id": s.math, "name": "Mathematics" }),
    );
    assert_eq!(renamed["name"], "Mathematics");
    assert_eq!(renamed["code"], "MAT");
    let resized = request_ok(
        &mut stdin,
        &mut reader,
        "gu",
        "groups.update",
        Some(&s.coord),
        json!({
            "id": s.g10a,
            "name": "10A",
            "grade": "10",
            "section": "A",
            "academicYear": "2025",
            "studentCount": 28
        }),
    );
    assert_eq!(resized["studentCount"], 28);

    request_ok(&mut stdin, &mut reader, "sd", "subjects.delete", Some(&s.coord), json!({ "id": s.math }));
    request_ok(&mut stdin, &mut reader, "gd", "groups.delete", Some(&s.coord), json!({ "id": s.g10a }));
    let subjects = request_ok(&mut stdin, &mut reader, "sl", "subjects.list", Some(&s.coord), json!({}));
    assert_eq!(subjects["items"].as_array().map(Vec::len), Some(0));
    let groups = request_ok(&mut stdin, &mut reader, "gl", "groups.list", Some(&s.coord), json!({}));
    assert_eq!(groups["items"].as_array().map(Vec::len), Some(0));

    let mine = request_ok(&mut stdin, &mut reader, "l1", "tasks.list", Some(&s.owner), json!({}));
    let items = mine["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], task_id.as_str());
    assert_eq!(items[0]["subject"]["name"], "Mathematics");
    assert_eq!(items[0]["group"]["name"], "10A");

    let public_task = request(&mut stdin, &mut reader, "p1", "public.task", None, json!({ "taskId": task_id }));
    assert_eq!(error_code(&public_task), "not_found");
    let public_cal = request(
        &mut stdin,
        &mut reader,
        "p2",
        "public.calendar.group",
        None,
        json!({ "groupId": s.g10a, "year": 2025, "month": 9 }),
    );
    assert_eq!(error_code(&public_cal), "not_found");

    request_ok(&mut stdin, &mut reader, "ud", "users.delete", Some(&s.coord), json!({ "id": owner_id }));
    let teachers = request_ok(
        &mut stdin,
        &mut reader,
        "ul",
        "users.list",
        Some(&s.coord),
        json!({ "role": "teacher" }),
    );
    let names: Vec<&str> = teachers["items"]
        .as_array()
        .expect("teacher items")
        .iter()
        .filter_map(|u| u["firstName"].as_str())
        .collect();
    assert_eq!(names, vec!["Luis"]);

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "ab",
        "assignments.byTeacher",
        Some(&s.coord),
        json!({ "teacherId": owner_id }),
    );
    let rows = history.as_array().expect("assignment rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["teacher"]["firstName"], "Ana");
    assert_eq!(rows[0]["subject"]["name"], "Mathematics");
    assert_eq!(rows[0]["group"]["name"], "10A");

    let dash = request_ok(&mut stdin, &mut reader, "dc", "dashboard.coordinator", Some(&s.coord), json!({}));
    let recent = dash["recentTasks"].as_array().expect("recent tasks");
    assert!(recent.iter().any(|t| t["id"] == task_id.as_str()));

    let locked_out = request(&mut stdin, &mut reader, "l2", "tasks.list", Some(&s.owner), json!({}));
    assert_eq!(error_code(&locked_out), "unauthorized");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
