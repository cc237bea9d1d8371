mod common;

use std::thread;

use common::cc_document;
use serde_json::json;
use tiny_http::{Header, Response, Server};

use fex_core::Error;
use fex_engines::{get_engine, RemoteSchemaStatus};

struct Reply {
    status: u16,
    body: String,
}

/// Serves one canned reply per expected request on a loopback port and
/// records "METHOD url" for each request seen.
fn spawn_server(replies: Vec<Reply>) -> (String, thread::JoinHandle<Vec<String>>) {
    let server = Server::http("127.0.0.1:0").expect("bind loopback server");
    let port = server
        .server_addr()
        .to_ip()
        .expect("loopback server has an ip address")
        .port();
    let base_url = format!("http://127.0.0.1:{}", port);
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for reply in replies {
            let request = server.recv().expect("receive request");
            seen.push(format!("{} {}", request.method(), request.url()));
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("static header");
            let response = Response::from_string(reply.body)
                .with_status_code(reply.status)
                .with_header(header);
            let _ = request.respond(response);
        }
        seen
    });
    (base_url, handle)
}

#[test]
fn instructions_validate_against_the_fetched_schema() {
    let schema = json!({
        "type": "object",
        "required": ["input_files", "result_files"]
    });
    let (base_url, handle) = spawn_server(vec![Reply {
        status: 200,
        body: schema.to_string(),
    }]);
    let doc = cc_document(&base_url);
    let engine = get_engine(&doc).unwrap();
    let report = engine.validate_instructions(&doc).unwrap();
    assert_eq!(report.remote_schema, RemoteSchemaStatus::Validated);
    let seen = handle.join().unwrap();
    assert_eq!(seen, vec!["GET /tasks/schema".to_string()]);
}

#[test]
fn fetched_schema_violations_are_fatal() {
    let schema = json!({
        "type": "object",
        "required": ["a_field_the_instructions_do_not_have"]
    });
    let (base_url, handle) = spawn_server(vec![Reply {
        status: 200,
        body: schema.to_string(),
    }]);
    let doc = cc_document(&base_url);
    let engine = get_engine(&doc).unwrap();
    let err = engine.validate_instructions(&doc).unwrap_err();
    assert_eq!(err.code(), "schema_violation");
    handle.join().unwrap();
}

#[test]
fn schema_endpoint_error_status_downgrades_to_a_warning() {
    let (base_url, handle) = spawn_server(vec![Reply {
        status: 503,
        body: "maintenance".to_string(),
    }]);
    let doc = cc_document(&base_url);
    let engine = get_engine(&doc).unwrap();
    let report = engine.validate_instructions(&doc).unwrap();
    match report.remote_schema {
        RemoteSchemaStatus::Unavailable { reason } => {
            assert!(reason.contains("503"), "reason was: {}", reason)
        }
        other => panic!("expected unavailable remote schema, got {:?}", other),
    }
    handle.join().unwrap();
}

#[test]
fn successful_submission_returns_the_decoded_response() {
    let (base_url, handle) = spawn_server(vec![Reply {
        status: 201,
        body: json!({"state": "created", "task_id": "t-17"}).to_string(),
    }]);
    let doc = cc_document(&base_url);
    let engine = get_engine(&doc).unwrap();
    let result = engine.run(&doc).unwrap();
    assert_eq!(
        result.response,
        json!({"state": "created", "task_id": "t-17"})
    );
    let seen = handle.join().unwrap();
    assert_eq!(seen, vec!["POST /tasks".to_string()]);
}

#[test]
fn rejected_submission_carries_status_and_body() {
    let (base_url, handle) = spawn_server(vec![Reply {
        status: 400,
        body: "instructions are invalid".to_string(),
    }]);
    let doc = cc_document(&base_url);
    let engine = get_engine(&doc).unwrap();
    let err = engine.run(&doc).unwrap_err();
    match err {
        Error::SubmissionRejected { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("instructions are invalid"));
        }
        other => panic!("expected submission_rejected, got {}", other),
    }
    handle.join().unwrap();
}

#[test]
fn unreachable_submission_endpoint_is_resource_unavailable() {
    let doc = cc_document(common::UNREACHABLE_URL);
    let engine = get_engine(&doc).unwrap();
    let err = engine.run(&doc).unwrap_err();
    assert_eq!(err.code(), "resource_unavailable");
}
