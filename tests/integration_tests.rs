use chrono::Utc;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use printcloud::{
    ClientConfig, Error, ListParams, MemoryTokenStore, Printer, Printers, SessionManager,
    TokenKind, TokenRecord, TokenStore, WaitOptions,
};

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new(
        "CLIENT_ID",
        format!("{}/guest", server.uri()),
        format!("{}/access", server.uri()),
        format!("{}/refresh", server.uri()),
        server.uri(),
    )
}

fn session_for(server: &MockServer) -> SessionManager {
    SessionManager::new(config_for(server), Box::new(MemoryTokenStore::new()))
}

/// A session whose store already holds a user access record.
fn logged_in_session(server: &MockServer, expires_in: i64) -> SessionManager {
    let store = MemoryTokenStore::new();
    let record = TokenRecord::from_payload(
        &json!({
            "access_token": "UserToken123",
            "expires_in": expires_in,
            "refresh_token": "RefreshToken456"
        }),
        Utc::now().timestamp_millis(),
    )
    .unwrap();
    store.set(TokenKind::Access, &record).unwrap();
    SessionManager::new(config_for(server), Box::new(store))
}

fn test_printer() -> Printer {
    Printer::from_payload(json!({
        "printer_id": "P1",
        "printer_name": "Lab DLP",
        "is_primary": true
    }))
    .unwrap()
}

#[tokio::test]
async fn test_complete_login_flow() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/access"))
        .and(query_param("code", "ACODE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "UserToken123",
            "expires_in": 3600,
            "refresh_token": "RefreshToken456",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server);

    assert!(!session.is_access_token_valid());
    assert!(session.access_token().is_none());

    let token = session.complete_login("ACODE").await.unwrap();
    assert_eq!(token, "UserToken123");

    assert!(session.is_access_token_valid());
    assert_eq!(session.access_token(), Some("UserToken123".to_string()));

    let record = session.access_token_object().unwrap();
    assert_eq!(record.expires_at, record.issued_at + 3600 * 1000);
    assert_eq!(record.refresh_token, Some("RefreshToken456".to_string()));

    session.logout().unwrap();
    assert!(!session.is_access_token_valid());
    assert!(session.access_token().is_none());
}

#[tokio::test]
async fn test_complete_login_rejects_malformed_response() {
    let mock_server = MockServer::start().await;

    // A 200 that is not a token (e.g. an error object from the auth proxy).
    Mock::given(method("GET"))
        .and(path("/access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "UserToken123"
        })))
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server);
    let err = session.complete_login("ACODE").await.unwrap_err();

    assert!(matches!(err, Error::MalformedResponse { .. }));
    // Nothing was persisted.
    assert!(session.access_token().is_none());
}

#[tokio::test]
async fn test_guest_token_fetches_once_then_serves_from_cache() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/guest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "GuestToken123",
            "expires_in": 1800
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server);

    let first = session.guest_token().await.unwrap();
    assert_eq!(first, "GuestToken123");

    // Served from the store; the mock's expect(1) verifies no second fetch.
    let second = session.guest_token().await.unwrap();
    assert_eq!(second, "GuestToken123");
}

#[tokio::test]
async fn test_guest_token_refetches_when_expired() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/guest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "FreshGuestToken",
            "expires_in": 1800
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = MemoryTokenStore::new();
    let expired = TokenRecord::from_payload(
        &json!({ "access_token": "StaleGuestToken", "expires_in": -1 }),
        Utc::now().timestamp_millis(),
    )
    .unwrap();
    store.set(TokenKind::Guest, &expired).unwrap();

    let session = SessionManager::new(config_for(&mock_server), Box::new(store));
    assert_eq!(session.guest_token().await.unwrap(), "FreshGuestToken");
}

#[tokio::test]
async fn test_refresh_access_token_persists_renewed_record() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/refresh"))
        .and(query_param("refresh_token", "RefreshToken456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "RenewedToken789",
            "expires_in": 7200,
            "refresh_token": "RefreshToken999"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);

    let record = session.refresh_access_token().await.unwrap();
    assert_eq!(record.access_token, "RenewedToken789");
    assert_eq!(record.expires_at, record.issued_at + 7200 * 1000);

    // The renewed record replaced the stored one.
    assert_eq!(session.access_token(), Some("RenewedToken789".to_string()));
    assert!(session.is_access_token_valid());
}

#[tokio::test]
async fn test_refresh_while_logged_out_issues_no_request() {
    let mock_server = MockServer::start().await;
    let session = session_for(&mock_server);

    let err = session.refresh_access_token().await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));

    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_api_request_without_token_is_unauthenticated() {
    let mock_server = MockServer::start().await;

    // The server rejects the anonymous listing; that rejection is the
    // expected signal, not a client-side error.
    Mock::given(method("GET"))
        .and(path("/print/printers"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "authorization required"
        })))
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server);
    let err = Printers::get(&session, &ListParams::default())
        .await
        .unwrap_err();

    match err {
        Error::Api { status, .. } => assert_eq!(status, 401),
        other => panic!("expected Api error, got {:?}", other),
    }

    let requests = mock_server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_guest_authorized_request_carries_guest_bearer() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/guest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "GuestToken123",
            "expires_in": 1800
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/print/materials"))
        .and(header("authorization", "Bearer GuestToken123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "materials": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server);
    let request = session
        .authenticated_request("/print/materials", TokenKind::Guest)
        .await
        .unwrap();
    request.get(None).await.unwrap();
}

#[tokio::test]
async fn test_printers_listing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/print/printers"))
        .and(header("authorization", "Bearer UserToken123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "printers": [
                { "printer_id": "P1", "printer_name": "Lab DLP", "is_primary": true },
                { "printer_id": "P2", "printer_name": "Shop FDM", "printer_last_health": "Offline" }
            ],
            "count": 2
        })))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let printers = Printers::get(&session, &ListParams::default()).await.unwrap();

    assert_eq!(printers.len(), 2);
    assert_eq!(printers[0].id, "P1");
    assert_eq!(printers[0].name, Some("Lab DLP".to_string()));
    assert!(printers[0].is_online());
    assert!(!printers[1].is_online());
    assert_eq!(printers.raw()["count"], 2);
}

#[tokio::test]
async fn test_send_command_returns_handle() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/print/printers/P1/pause"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "T-42" })))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let handle = test_printer().pause(&session, "J-7").await.unwrap();

    assert_eq!(handle.command, "pause");
    assert_eq!(handle.task_id, "T-42");
}

#[tokio::test]
async fn test_send_command_without_task_id_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/print/printers/P1/reset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accepted": true })))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let err = test_printer().reset(&session).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_wait_for_command_resolves_after_progress_sequence() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/print/printers/P1/calibrate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "T-1" })))
        .mount(&mock_server)
        .await;

    // Earlier-mounted mocks match first; each expires after one use, so the
    // three polls observe 0.3, 0.7 and then 1.0.
    for progress in [0.3, 0.7] {
        Mock::given(method("GET"))
            .and(path("/print/printers/P1/calibrate"))
            .and(query_param("task_id", "T-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "progress": progress })),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/print/printers/P1/calibrate"))
        .and(query_param("task_id", "T-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "progress": 1.0 })))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_callback = Arc::clone(&seen);
    let options = WaitOptions {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(1000),
        on_progress: Some(Box::new(move |status| {
            seen_by_callback.lock().unwrap().push(status.progress);
        })),
    };

    let status = test_printer()
        .send_command_and_wait(&session, "calibrate", None, options)
        .await
        .unwrap();

    assert_eq!(status.progress, 1.0);
    // Invoked on every poll, including the completed one, in order.
    assert_eq!(*seen.lock().unwrap(), vec![0.3, 0.7, 1.0]);
}

#[tokio::test]
async fn test_wait_for_command_rejects_on_service_error_and_stops() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/print/printers/P1/home"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "T-2" })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/print/printers/P1/home"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_error": true,
            "error_message": "jam"
        })))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let options = WaitOptions {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(1000),
        on_progress: None,
    };

    let err = test_printer()
        .send_command_and_wait(&session, "home", None, options)
        .await
        .unwrap_err();

    match err {
        Error::Command(message) => assert!(message.contains("jam")),
        other => panic!("expected Command error, got {:?}", other),
    }

    // The first error poll was terminal: no further status queries.
    let polls_after_error = mock_server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let polls_later = mock_server.received_requests().await.unwrap().len();
    assert_eq!(polls_after_error, polls_later);
}

#[tokio::test]
async fn test_wait_for_command_times_out_and_stops() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/print/printers/P1/firmware_upgrade"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "progress": 0.1 })))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let printer = test_printer();
    let handle = printcloud::CommandHandle {
        command: "firmware_upgrade".to_string(),
        task_id: "T-3".to_string(),
    };
    let options = WaitOptions {
        poll_interval: Duration::from_millis(20),
        timeout: Duration::from_millis(70),
        on_progress: None,
    };

    let err = printer
        .wait_for_command(&session, &handle, options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    let polls_at_timeout = mock_server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let polls_later = mock_server.received_requests().await.unwrap().len();
    assert_eq!(polls_at_timeout, polls_later);
}

#[tokio::test]
async fn test_wait_for_command_propagates_transport_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/print/printers/P1/park"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boiler room on fire"))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let handle = printcloud::CommandHandle {
        command: "park".to_string(),
        task_id: "T-4".to_string(),
    };
    let options = WaitOptions {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(1000),
        on_progress: None,
    };

    let err = test_printer()
        .wait_for_command(&session, &handle, options)
        .await
        .unwrap_err();
    match err {
        Error::Api { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("boiler room"));
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_status_caches_snapshot_and_clears_on_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/print/printers/P1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "printer_id": "P1",
            "printer_last_health": "Healthy",
            "last_reported_state": { "data": { "state": "Printing" } }
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/print/printers/P1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let mut printer = test_printer();

    printer.get_status(&session).await.unwrap();
    assert!(printer.status.is_some());
    assert!(printer.is_online());
    assert!(printer.is_printing());

    // The second fetch fails; the stale snapshot is dropped.
    let err = printer.get_status(&session).await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 503, .. }));
    assert!(printer.status.is_none());
    assert!(!printer.is_printing());
}

#[tokio::test]
async fn test_printer_jobs_round_trip() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/print/printers/P1/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [
                { "job_id": "J-1", "job_status": "queued" },
                { "job_id": "J-2", "job_status": "printing" }
            ]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/print/printers/P1/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "J-1" })))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let printer = test_printer();

    let jobs = printer
        .get_jobs(&session, &ListParams::default())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, "J-1");
    assert_eq!(jobs[1].status(), Some("printing"));

    printer.start_job(&session, "J-1").await.unwrap();
}

#[tokio::test]
async fn test_unregister_handles_empty_response_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/print/printers/P1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, 3600);
    let result = test_printer().unregister(&session, None).await.unwrap();
    assert!(result.is_null());
}
