//! Upload endpoint tests against a real loopback listener

use std::path::{Path, PathBuf};

use chatpane::upload::{router, upload_file, UploadReceipt, UPLOAD_FAILURE, UPLOAD_ROUTE};
use chatpane::ChatError;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn start_server(dir: PathBuf, limit: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(dir, limit)).await.unwrap();
    });
    format!("http://{addr}{UPLOAD_ROUTE}")
}

fn stored_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_upload_stores_file_with_extension() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_dir.path().join("uploads");
    let endpoint = start_server(storage.clone(), 1024 * 1024).await;

    let source = temp_dir.path().join("notes.TXT");
    std::fs::write(&source, b"quarterly numbers").unwrap();

    let receipt = upload_file(&reqwest::Client::new(), &endpoint, &source)
        .await
        .unwrap();
    assert_eq!(receipt.message, "File uploaded successfully!");

    let files = receipt.files.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].field, "file");
    assert_eq!(files[0].original_name, "notes.TXT");
    assert_eq!(files[0].size, 17);
    assert!(files[0].stored_name.ends_with(".txt"));

    let stored = storage.join(&files[0].stored_name);
    assert_eq!(std::fs::read(stored).unwrap(), b"quarterly numbers");
}

#[tokio::test]
async fn test_other_methods_not_allowed() {
    let temp_dir = TempDir::new().unwrap();
    let endpoint = start_server(temp_dir.path().to_path_buf(), 1024).await;
    let client = reqwest::Client::new();

    for response in [
        client.get(&endpoint).send().await.unwrap(),
        client.put(&endpoint).body("x").send().await.unwrap(),
        client.delete(&endpoint).send().await.unwrap(),
    ] {
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "message": "Method not allowed" }));
    }
}

#[tokio::test]
async fn test_path_traversal_names_stay_in_upload_dir() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_dir.path().join("a").join("b");
    let endpoint = start_server(storage.clone(), 1024 * 1024).await;

    let part = Part::bytes(b"#!/bin/sh".to_vec()).file_name("../../evil.sh");
    let response = reqwest::Client::new()
        .post(&endpoint)
        .multipart(Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let receipt: UploadReceipt = response.json().await.unwrap();
    let stored_name = &receipt.files.unwrap()[0].stored_name;
    assert!(stored_name.ends_with(".sh"));
    assert!(!stored_name.contains('/'));

    assert_eq!(stored_files(&storage), vec![storage.join(stored_name)]);
    assert!(!temp_dir.path().join("evil.sh").exists());
}

#[tokio::test]
async fn test_form_without_files_succeeds_empty() {
    let temp_dir = TempDir::new().unwrap();
    let endpoint = start_server(temp_dir.path().join("up"), 1024).await;

    let response = reqwest::Client::new()
        .post(&endpoint)
        .multipart(Form::new().text("note", "no file here"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipt: UploadReceipt = response.json().await.unwrap();
    assert_eq!(receipt.files, Some(Vec::new()));
}

#[tokio::test]
async fn test_malformed_body_fails() {
    let temp_dir = TempDir::new().unwrap();
    let endpoint = start_server(temp_dir.path().join("up"), 1024).await;
    let client = reqwest::Client::new();

    // Not multipart at all
    let response = client
        .post(&endpoint)
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let receipt: UploadReceipt = response.json().await.unwrap();
    assert_eq!(receipt.message, UPLOAD_FAILURE);

    // Multipart header, truncated body
    let response = client
        .post(&endpoint)
        .header("content-type", "multipart/form-data; boundary=XYZ")
        .body("--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\nabc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(stored_files(&temp_dir.path().join("up")).is_empty());
}

#[tokio::test]
async fn test_oversized_upload_removes_partial_file() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_dir.path().join("up");
    let endpoint = start_server(storage.clone(), 256).await;

    let part = Part::bytes(vec![b'x'; 4096]).file_name("big.bin");
    let response = reqwest::Client::new()
        .post(&endpoint)
        .multipart(Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(stored_files(&storage).is_empty());
}

#[tokio::test]
async fn test_client_reports_unreachable_server() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("a.txt");
    std::fs::write(&source, b"x").unwrap();

    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = upload_file(&reqwest::Client::new(), &format!("http://{addr}{UPLOAD_ROUTE}"), &source)
        .await
        .unwrap_err();
    match err {
        ChatError::UploadFailed(message) => assert_eq!(message, "Upload failed. Please try again."),
        other => panic!("unexpected error: {other}"),
    }
}
