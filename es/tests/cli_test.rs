//! Tests for the `es` binary

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("es")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("--log-level"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("es")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_subcommand_fails() {
    Command::cargo_bin("es").unwrap().assert().failure();
}

#[test]
fn test_call_rejects_bad_param() {
    Command::cargo_bin("es")
        .unwrap()
        .args(["call", "apie_1", "-p", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_missing_publishable_key_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("eventsync.yml");
    std::fs::write(&config, "server:\n  publishable-key-env: EVENTSYNC_CLI_TEST_UNSET_KEY\n").unwrap();

    Command::cargo_bin("es")
        .unwrap()
        .env_remove("EVENTSYNC_CLI_TEST_UNSET_KEY")
        .env("HOME", dir.path())
        .env("XDG_DATA_HOME", dir.path())
        .arg("--config")
        .arg(&config)
        .args(["watch", "view_1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("EVENTSYNC_CLI_TEST_UNSET_KEY"));
}

#[test]
fn test_call_prints_outcome() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        // The multipart body ends with the closing boundary line
        while !String::from_utf8_lossy(&request).trim_end().ends_with("--") {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
        }

        let body = r#"{"success": true, "data": {"eventId": 12, "output": {"id": "w1"}}}"#;
        write!(
            stream,
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
        .unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });

    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("eventsync.yml");
    std::fs::write(
        &config,
        format!("server:\n  host: {}\n  publishable-key-env: EVENTSYNC_CLI_TEST_KEY\n", addr),
    )
    .unwrap();

    Command::cargo_bin("es")
        .unwrap()
        .env("EVENTSYNC_CLI_TEST_KEY", "pk_cli")
        .env("HOME", dir.path())
        .env("XDG_DATA_HOME", dir.path())
        .arg("--config")
        .arg(&config)
        .args(["call", "apie_1", "-p", "name=widget"])
        .assert()
        .success()
        .stdout(predicate::str::contains("apie_1"))
        .stdout(predicate::str::contains("12"))
        .stdout(predicate::str::contains("\"w1\""));

    let request = server.join().unwrap();
    assert!(request.starts_with("POST /api-endpoints/apie_1/call "));
    assert!(request.contains("\"widget\""));
}
