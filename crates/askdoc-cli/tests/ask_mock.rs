//! Integration tests for `askdoc ask` against a mock backend.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANSWER: &str = "Use a list comprehension:\n\n```python\nsquares = [x * x for x in range(5)]\n```\n";

fn temp_askdoc_home() -> TempDir {
    TempDir::new().expect("create temp askdoc home")
}

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn answer_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/plain; charset=utf-8")
        .set_body_string(body.to_string())
}

#[tokio::test]
async fn test_ask_streams_answer_to_stdout() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_askdoc_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .and(body_json(json!({
            "query": "how do I square numbers?",
            "session_id": "default_user",
        })))
        .respond_with(answer_response(ANSWER))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .env("ASKDOC_BASE_URL", mock_server.uri())
        .args(["--plain", "ask", "how do I square numbers?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list comprehension"))
        .stdout(predicate::str::contains("squares = [x * x for x in range(5)]"));
}

#[tokio::test]
async fn test_ask_sends_session_flag() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_askdoc_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .and(body_json(json!({"query": "hi", "session_id": "alice"})))
        .respond_with(answer_response("hello alice"))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .env("ASKDOC_BASE_URL", mock_server.uri())
        .args(["--plain", "--session", "alice", "ask", "hi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello alice"));
}

#[tokio::test]
async fn test_ask_reads_query_from_stdin() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_askdoc_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .and(body_json(json!({"query": "piped question", "session_id": "default_user"})))
        .respond_with(answer_response("piped answer"))
        .expect(1)
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .env("ASKDOC_BASE_URL", mock_server.uri())
        .args(["--plain", "ask", "-"])
        .write_stdin("piped question\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("piped answer"));
}

#[tokio::test]
async fn test_ask_keeps_multibyte_text_intact() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_askdoc_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(answer_response("特斯拉 builds cars"))
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .env("ASKDOC_BASE_URL", mock_server.uri())
        .args(["--plain", "ask", "who?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("特斯拉 builds cars"))
        .stdout(predicate::str::contains("\u{FFFD}").not());
}

#[tokio::test]
async fn test_ask_reports_http_error_detail() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_askdoc_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "index unavailable"})),
        )
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .env("ASKDOC_BASE_URL", mock_server.uri())
        .args(["--plain", "ask", "anything"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("HTTP 500: index unavailable"));
}

#[tokio::test]
async fn test_ask_empty_body_is_unavailable() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_askdoc_home();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .env("ASKDOC_BASE_URL", mock_server.uri())
        .args(["--plain", "ask", "anything"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no streamable body"));
}

#[test]
fn test_ask_connection_refused() {
    let home = temp_askdoc_home();
    // bind then drop so nothing is listening on the port
    let port = match std::net::TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => listener.local_addr().unwrap().port(),
        Err(_) => {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
    };

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .env("ASKDOC_BASE_URL", format!("http://127.0.0.1:{port}"))
        .args(["--plain", "ask", "anything"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("answer stream failed"));
}

#[test]
fn test_ask_blank_query_is_rejected() {
    let home = temp_askdoc_home();

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .env("ASKDOC_BASE_URL", "http://127.0.0.1:9")
        .args(["--plain", "ask", "   "])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("must not be empty"));
}

#[test]
fn test_ask_rejects_invalid_base_url() {
    let home = temp_askdoc_home();

    cargo_bin_cmd!("askdoc")
        .env("ASKDOC_HOME", home.path())
        .args(["--base-url", "not a url", "ask", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid backend base URL"));
}
