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

#[test]
fn credentials_tokens_and_roles_are_enforced() {
    let workspace = temp_dir("schooltasks-auth-sessions");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let coord = setup_coordinator(&mut stdin, &mut reader, &workspace);

    let again = request(
        &mut stdin,
        &mut reader,
        "b2",
        "auth.bootstrap",
        None,
        json!({ "email": "x@school.test", "password": "whatever", "firstName": "X", "lastName": "Y" }),
    );
    assert_eq!(error_code(&again), "conflict");

    let wrong_pw = request(
        &mut stdin,
        &mut reader,
        "l1",
        "auth.login",
        None,
        json!({ "email": "coord@school.test", "password": "nope" }),
    );
    assert_eq!(error_code(&wrong_pw), "unauthorized");
    let unknown = request(
        &mut stdin,
        &mut reader,
        "l2",
        "auth.login",
        None,
        json!({ "email": "ghost@school.test", "password": "coordpass" }),
    );
    assert_eq!(error_code(&unknown), "unauthorized");
    assert_eq!(wrong_pw["error"]["message"], unknown["error"]["message"]);

    let me = request_ok(&mut stdin, &mut reader, "m1", "auth.me", Some(&coord), json!({}));
    assert_eq!(me["email"], "coord@school.test");
    assert_eq!(me["role"], "coordinator");
    assert!(me.get("passwordHash").is_none());

    let no_token = request(&mut stdin, &mut reader, "m2", "users.list", None, json!({}));
    assert_eq!(error_code(&no_token), "unauthorized");
    let junk = request(&mut stdin, &mut reader, "m3", "users.list", Some("not.a.jwt"), json!({}));
    assert_eq!(error_code(&junk), "unauthorized");

    let teacher_id = create_teacher(&mut stdin, &mut reader, &coord, "Ana", "Ana@School.test");
    let dup = request(
        &mut stdin,
        &mut reader,
        "dup",
        "users.create",
        Some(&coord),
        json!({
            "firstName": "Ana",
            "lastName": "Again",
            "email": "ana@school.test",
            "password": "teachpass",
            "role": "teacher"
        }),
    );
    assert_eq!(error_code(&dup), "conflict");

    let teacher = login(&mut stdin, &mut reader, "ANA@school.test", "teachpass");
    let forbidden = request(&mut stdin, &mut reader, "f1", "users.list", Some(&teacher), json!({}));
    assert_eq!(error_code(&forbidden), "forbidden");
    let forbidden = request(&mut stdin, &mut reader, "f2", "dashboard.coordinator", Some(&teacher), json!({}));
    assert_eq!(error_code(&forbidden), "forbidden");

    let me_id = me["id"].as_str().expect("coordinator id").to_string();
    let self_delete = request(
        &mut stdin,
        &mut reader,
        "del0",
        "users.delete",
        Some(&coord),
        json!({ "id": me_id }),
    );
    assert_eq!(error_code(&self_delete), "bad_params");

    request_ok(
        &mut stdin,
        &mut reader,
        "del1",
        "users.delete",
        Some(&coord),
        json!({ "id": teacher_id }),
    );
    let stale = request(&mut stdin, &mut reader, "m4", "auth.me", Some(&teacher), json!({}));
    assert_eq!(error_code(&stale), "unauthorized");
    let relogin = request(
        &mut stdin,
        &mut reader,
        "l3",
        "auth.login",
        None,
        json!({ "email": "ana@school.test", "password": "teachpass" }),
    );
    assert_eq!(error_code(&relogin), "unauthorized");

    let listed = request_ok(&mut stdin, &mut reader, "ul", "users.list", Some(&coord), json!({ "role": "teacher" }));
    assert_eq!(listed["pagination"]["totalItems"], 0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn login_without_configured_secret_is_an_opaque_internal_error() {
    let workspace = temp_dir("schooltasks-auth-nosecret");
    let exe = env!("CARGO_BIN_EXE_schooltasksd");
    let mut child = Command::new(exe)
        .env_remove("SCHOOLTASKSD_JWT_SECRET")
        .env("SCHOOLTASKSD_WORKSPACE", &workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schooltasksd");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    request_ok(
        &mut stdin,
        &mut reader,
        "b1",
        "auth.bootstrap",
        None,
        json!({ "email": "coord@school.test", "password": "coordpass", "firstName": "C", "lastName": "M" }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "l1",
        "auth.login",
        None,
        json!({ "email": "coord@school.test", "password": "coordpass" }),
    );
    assert_eq!(error_code(&resp), "internal");
    assert_eq!(resp["error"]["message"], "internal error");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
