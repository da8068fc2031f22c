use axum::http::StatusCode;
use fake_relay::{FakeRelay, Reply};
use playground_core::relay::{
    CertType, GetProtoPayload, LoadCertStatus, LoadProtoStatus, RelayClientError, SchemaFile,
    UploadCertificatePayload, UploadFile, UploadProtoPayload,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;


#[tokio::test]
async fn test_get_proto_info_reads_partial_load_from_error_status() {
    let relay = FakeRelay::start(vec![Reply::Json(
        StatusCode::BAD_REQUEST,
        json!({
            "status": 0,
            "protos": [{
                "fileName": "greeter.proto",
                "proto": { "fileName": "greeter.proto", "filePath": "greeter.proto", "protoText": "syntax = \"proto3\";" }
            }],
            "missingImports": [{ "fileName": "types.proto", "filePath": "common/types.proto" }]
        }),
    )])
    .await;

    let payload = GetProtoPayload {
        entity_spec: json!({ "definition": { "$text": "greeter.proto" } }),
        is_gen_doc: Some(false),
    };

    let response = relay.client().get_proto_info(&payload).await.unwrap();

    assert_eq!(response.status, LoadProtoStatus::Part);
    assert_eq!(response.protos.unwrap()[0].proto.file_path, "greeter.proto");
    assert_eq!(
        response.missing_imports.unwrap()[0].file_path,
        "common/types.proto"
    );

    let recorded = relay.recorded();
    assert_eq!(recorded[0].path, "/api/grpc-playground/proto-info/greeter-app");
    assert_eq!(recorded[0].authorization.as_deref(), Some("Bearer test-token"));
    assert_eq!(recorded[0].body["isGenDoc"], false);
}

#[tokio::test]
async fn test_upload_proto_sends_files_and_json_fields() {
    let relay = FakeRelay::start(vec![Reply::Json(
        StatusCode::OK,
        json!({
            "status": 1,
            "protos": [{
                "fileName": "types.proto",
                "proto": { "fileName": "types.proto", "filePath": "common/types.proto", "protoText": "" }
            }]
        }),
    )])
    .await;

    let payload = UploadProtoPayload {
        files: vec![UploadFile {
            file_name: "types.proto".to_string(),
            content: b"syntax = \"proto3\";".to_vec(),
        }],
        import_for: Some(SchemaFile::placeholder("greeter.proto")),
        file_mappings: Some(BTreeMap::from([(
            "types.proto".to_string(),
            "common/types.proto".to_string(),
        )])),
        is_gen_doc: Some(false),
    };

    let response = relay.client().upload_proto(payload).await.unwrap();
    assert_eq!(response.status, LoadProtoStatus::Ok);
    assert_eq!(response.protos.unwrap()[0].proto.file_path, "common/types.proto");

    let recorded = relay.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].path, "/api/grpc-playground/upload-proto/greeter-app");
    assert_eq!(recorded[0].authorization.as_deref(), Some("Bearer test-token"));

    let body = &recorded[0].body;
    assert_eq!(
        body["files"],
        json!([{ "field": "files[]", "fileName": "types.proto", "content": "syntax = \"proto3\";" }])
    );

    let import_for: Value = serde_json::from_str(body["importFor"].as_str().unwrap()).unwrap();
    assert_eq!(import_for["filePath"], "greeter.proto");

    let mappings: Value = serde_json::from_str(body["fileMappings"].as_str().unwrap()).unwrap();
    assert_eq!(mappings, json!({ "types.proto": "common/types.proto" }));

    assert_eq!(body["isGenDoc"], "false");
}

#[tokio::test]
async fn test_upload_certificate_sends_every_file() {
    let relay = FakeRelay::start(vec![Reply::Json(
        StatusCode::OK,
        json!({
            "status": 3,
            "certificate": { "rootCert": { "fileName": "ca.pem", "filePath": "certs/ca.pem", "type": "rootCert" } },
            "certs": [{ "fileName": "ca.pem", "filePath": "certs/ca.pem", "type": "rootCert" }]
        }),
    )])
    .await;

    let payload = UploadCertificatePayload {
        files: vec![
            UploadFile {
                file_name: "ca.pem".to_string(),
                content: b"root".to_vec(),
            },
            UploadFile {
                file_name: "client.key".to_string(),
                content: b"key".to_vec(),
            },
        ],
        file_mappings: None,
    };

    let response = relay.client().upload_certificate(payload).await.unwrap();
    assert_eq!(response.status, LoadCertStatus::Ok);
    assert_eq!(response.certs.unwrap()[0].cert_type, CertType::RootCert);
    assert_eq!(
        response.certificate.unwrap().root_cert.file_path,
        "certs/ca.pem"
    );

    let recorded = relay.recorded();
    assert_eq!(recorded[0].path, "/api/grpc-playground/upload-cert/greeter-app");
    assert_eq!(recorded[0].authorization.as_deref(), Some("Bearer test-token"));

    let names: Vec<&str> = recorded[0].body["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|file| file["fileName"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ca.pem", "client.key"]);
    assert!(recorded[0].body.get("fileMappings").is_none());
}

#[tokio::test]
async fn test_unreadable_body_is_a_status_error() {
    let relay = FakeRelay::start(vec![Reply::Json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!("internal failure"),
    )])
    .await;

    let payload = GetProtoPayload {
        entity_spec: json!({}),
        is_gen_doc: None,
    };

    let err = relay.client().get_proto_info(&payload).await.unwrap_err();

    assert!(matches!(
        err,
        RelayClientError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
    ));
}

#[tokio::test]
async fn test_empty_upload_is_rejected_locally() {
    let relay = FakeRelay::start(vec![]).await;

    let err = relay
        .client()
        .upload_certificate(UploadCertificatePayload {
            files: vec![],
            file_mappings: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RelayClientError::EmptyUpload));
    assert_eq!(relay.request_count(), 0);
}
