use axum::http::StatusCode;
use fake_relay::{FakeRelay, Reply};
use greeter_schema::{IMPORT_FILE, SCHEMA_FILE, SERVICE};
use playground_core::call::{CallEvent, CallEvents, CallRequest, CallState, RpcCall};
use playground_core::negotiation::{DependencyBridge, DependencyKey, MissingDependency};
use playground_core::relay::{
    CertFile, CertType, Certificate, LoadCertStatus, LoadProtoStatus, LoadedProto, ProtoSource,
    SchemaFile, UploadCertificateResponse, UploadProtoResponse,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;


fn request(method: &str) -> CallRequest {
    let view = greeter_schema::schema().method(SERVICE, method).unwrap();
    CallRequest::new("localhost:50051", view).with_inputs(r#"{"name":"Alice"}"#)
}

fn missing_imports_reply() -> Reply {
    Reply::Json(
        StatusCode::BAD_REQUEST,
        json!({
            "status": 0,
            "missingImports": [{ "fileName": "types.proto", "filePath": IMPORT_FILE }],
            "message": "Missing imports"
        }),
    )
}

fn missing_certs_reply() -> Reply {
    Reply::Json(
        StatusCode::BAD_REQUEST,
        json!({
            "status": 5,
            "missingCerts": [{ "fileName": "client.key", "filePath": "certs/client.key", "type": "privateKey" }],
            "certificate": { "rootCert": { "fileName": "ca.pem", "filePath": "certs/ca.pem", "type": "rootCert" } }
        }),
    )
}

fn uploaded(path: &str) -> LoadedProto {
    let file = SchemaFile::placeholder(path);
    LoadedProto {
        file_name: file.file_name.clone(),
        proto: ProtoSource {
            file_name: file.file_name,
            file_path: file.file_path,
            proto_text: String::new(),
        },
    }
}

async fn next(events: &mut CallEvents) -> Option<CallEvent> {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event arrived")
}

async fn assert_silent(events: &mut CallEvents) {
    let event = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
    assert!(event.is_err(), "unexpected event: {event:?}");
}

async fn wait_for_listener(bridge: &DependencyBridge, key: &DependencyKey) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !bridge.has_listener(key) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener was never registered");
}

#[tokio::test]
async fn test_missing_imports_pause_until_upload_succeeds() {
    let relay = FakeRelay::start(vec![
        missing_imports_reply(),
        Reply::data(json!({ "message": "Hi Alice" })),
    ])
    .await;
    let bridge = Arc::new(DependencyBridge::new());

    let (call, mut events) = RpcCall::new(relay.client(), request("SayHello"));
    let mut call = call.with_bridge(bridge.clone());

    call.send().unwrap();

    match next(&mut events).await {
        Some(CallEvent::MissingDependency(MissingDependency::Imports { files, message })) => {
            assert_eq!(files, vec![SchemaFile::placeholder(IMPORT_FILE)]);
            assert_eq!(message.as_deref(), Some("Missing imports"));
        }
        other => panic!("Expected missing imports, got {other:?}"),
    }

    assert_eq!(call.state(), CallState::AwaitingDependency);
    assert_eq!(bridge.missing_imports(), vec![SchemaFile::placeholder(IMPORT_FILE)]);
    assert_silent(&mut events).await;

    let woken = bridge.apply_proto_upload(&UploadProtoResponse {
        status: LoadProtoStatus::Ok,
        protos: Some(vec![uploaded(IMPORT_FILE), uploaded(SCHEMA_FILE)]),
        missing_imports: None,
        message: None,
    });
    assert_eq!(woken, vec![DependencyKey::Schema(SCHEMA_FILE.to_string())]);
    assert!(bridge.missing_imports().is_empty());

    assert!(matches!(next(&mut events).await, Some(CallEvent::Data(frame)) if frame.data["message"] == "Hi Alice"));
    assert_eq!(next(&mut events).await, Some(CallEvent::End));
    assert_eq!(call.finished().await, CallState::Completed);

    let recorded = relay.recorded();
    assert_eq!(recorded.len(), 2);
    assert_ne!(recorded[0].body["requestId"], recorded[1].body["requestId"]);
    assert_eq!(recorded[0].body["requestData"], recorded[1].body["requestData"]);
}

#[tokio::test]
async fn test_partial_upload_keeps_the_call_paused() {
    let relay = FakeRelay::start(vec![missing_imports_reply()]).await;
    let bridge = Arc::new(DependencyBridge::new());

    let (call, mut events) = RpcCall::new(relay.client(), request("StreamReplies"));
    let mut call = call.with_bridge(bridge.clone());
    call.send().unwrap();

    assert!(matches!(
        next(&mut events).await,
        Some(CallEvent::MissingDependency(_))
    ));

    let woken = bridge.apply_proto_upload(&UploadProtoResponse {
        status: LoadProtoStatus::Part,
        protos: Some(vec![uploaded(IMPORT_FILE)]),
        missing_imports: Some(vec![SchemaFile::placeholder("common/money.proto")]),
        message: None,
    });

    assert!(woken.is_empty());
    assert_eq!(
        bridge.missing_imports(),
        vec![SchemaFile::placeholder("common/money.proto")]
    );
    assert_silent(&mut events).await;
    assert_eq!(call.state(), CallState::AwaitingDependency);
    assert_eq!(relay.request_count(), 1);

    call.cancel();
    assert_eq!(next(&mut events).await, Some(CallEvent::End));
    assert_eq!(next(&mut events).await, None);
}

#[tokio::test]
async fn test_manual_send_resumes_without_bridge() {
    let relay = FakeRelay::start(vec![missing_imports_reply(), Reply::data(json!({}))]).await;

    let (mut call, mut events) = RpcCall::new(relay.client(), request("SayHello"));
    call.send().unwrap();

    assert!(matches!(
        next(&mut events).await,
        Some(CallEvent::MissingDependency(_))
    ));

    call.send().unwrap();

    assert!(matches!(next(&mut events).await, Some(CallEvent::Data(_))));
    assert_eq!(next(&mut events).await, Some(CallEvent::End));
    assert_eq!(relay.request_count(), 2);
}

#[tokio::test]
async fn test_resumed_or_cancelled_calls_release_their_registration() {
    let relay = FakeRelay::start(vec![
        missing_imports_reply(),
        Reply::data(json!({})),
        missing_imports_reply(),
    ])
    .await;
    let bridge = Arc::new(DependencyBridge::new());
    let key = DependencyKey::Schema(SCHEMA_FILE.to_string());

    let (call, mut events) = RpcCall::new(relay.client(), request("SayHello"));
    let mut call = call.with_bridge(bridge.clone());
    call.send().unwrap();
    assert!(matches!(
        next(&mut events).await,
        Some(CallEvent::MissingDependency(_))
    ));
    assert_eq!(bridge.registered_keys(), vec![key.clone()]);

    call.send().unwrap();
    assert!(matches!(next(&mut events).await, Some(CallEvent::Data(_))));
    assert_eq!(next(&mut events).await, Some(CallEvent::End));
    assert!(bridge.registered_keys().is_empty());

    let (call, mut events) = RpcCall::new(relay.client(), request("SayHello"));
    let mut call = call.with_bridge(bridge.clone());
    call.send().unwrap();
    assert!(matches!(
        next(&mut events).await,
        Some(CallEvent::MissingDependency(_))
    ));
    wait_for_listener(&bridge, &key).await;

    call.cancel();
    assert_eq!(next(&mut events).await, Some(CallEvent::End));

    tokio::time::timeout(Duration::from_secs(5), async {
        while !bridge.registered_keys().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("cancelled call kept its registration");
}

#[tokio::test]
async fn test_missing_certificates_resume_on_certificate_upload() {
    let relay = FakeRelay::start(vec![missing_certs_reply(), Reply::data(json!({}))]).await;
    let bridge = Arc::new(DependencyBridge::new());

    let request = request("SayHello").with_certificate(Certificate::from_root_cert("certs/ca.pem"));
    let (call, mut events) = RpcCall::new(relay.client(), request);
    let mut call = call.with_bridge(bridge.clone());
    call.send().unwrap();

    match next(&mut events).await {
        Some(CallEvent::MissingDependency(MissingDependency::Certificates { files, .. })) => {
            assert_eq!(files[0].cert_type, CertType::PrivateKey);
        }
        other => panic!("Expected missing certificates, got {other:?}"),
    }

    let key = DependencyKey::Certificate("certs/ca.pem".to_string());
    assert!(bridge.has_listener(&key));

    let woken = bridge.apply_certificate_upload(&UploadCertificateResponse {
        status: LoadCertStatus::Ok,
        certificate: Some(Certificate::from_root_cert("certs/ca.pem")),
        certs: Some(vec![CertFile {
            file_name: "client.key".to_string(),
            file_path: "certs/client.key".to_string(),
            cert_type: CertType::PrivateKey,
        }]),
        missing_certs: None,
        message: None,
    });
    assert_eq!(woken, vec![key]);

    assert!(matches!(next(&mut events).await, Some(CallEvent::Data(_))));
    assert_eq!(next(&mut events).await, Some(CallEvent::End));

    let recorded = relay.recorded();
    assert_eq!(
        recorded[1].body["tlsCertificate"]["rootCert"]["filePath"],
        "certs/ca.pem"
    );
}

#[tokio::test]
async fn test_newer_listener_replaces_older_one() {
    let relay = FakeRelay::start(vec![missing_imports_reply(), missing_imports_reply()]).await;
    let bridge = Arc::new(DependencyBridge::new());
    let key = DependencyKey::Schema(SCHEMA_FILE.to_string());

    let (first, mut first_events) = RpcCall::new(relay.client(), request("SayHello"));
    let mut first = first.with_bridge(bridge.clone());
    first.send().unwrap();
    assert!(matches!(
        next(&mut first_events).await,
        Some(CallEvent::MissingDependency(_))
    ));

    let (second, mut second_events) = RpcCall::new(relay.client(), request("SayHello"));
    let mut second = second.with_bridge(bridge.clone());
    second.send().unwrap();
    assert!(matches!(
        next(&mut second_events).await,
        Some(CallEvent::MissingDependency(_))
    ));
    wait_for_listener(&bridge, &key).await;

    assert!(bridge.notify_resolved(&key));

    // Only the newest registration is woken; the older call stays paused.
    assert!(matches!(next(&mut second_events).await, Some(CallEvent::Data(_))));
    assert_eq!(next(&mut second_events).await, Some(CallEvent::End));
    assert_silent(&mut first_events).await;
    assert_eq!(first.state(), CallState::AwaitingDependency);
    assert_eq!(relay.request_count(), 3);

    first.cancel();
    assert_eq!(next(&mut first_events).await, Some(CallEvent::End));
}

#[tokio::test]
async fn test_register_replaces_and_notify_is_one_shot() {
    let bridge = DependencyBridge::new();
    let key = DependencyKey::Schema("a.proto".to_string());

    let old = bridge.register(key.clone());
    let new = bridge.register(key.clone());

    assert!(bridge.notify_resolved(&key));
    assert!(!bridge.notify_resolved(&key));

    assert!(!old.resolved().await);
    assert!(new.resolved().await);
}
