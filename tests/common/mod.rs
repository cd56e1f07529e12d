//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use lopdf::{dictionary, Document, Object};

use metaclean_server::dispatch::ProcessPool;
use metaclean_server::{AppState, Config};

pub const BOUNDARY: &str = "metaclean-integration-boundary";

/// The server binary, re-executed as `worker` by the pool
pub fn worker_program() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_metaclean-server"))
}

/// App state over a real worker process pool
pub fn pool_state(work_dir: &Path, program: PathBuf, workers: usize) -> AppState {
    let mut config = Config::default();
    config.storage.work_dir = work_dir.to_path_buf();
    config.workers.count = workers;

    let pool = ProcessPool::start(program, workers, Duration::from_secs(60));
    AppState::new(config, Arc::new(pool))
}

/// One-page PDF with `/Creator` and `/CreationDate` in its Info dictionary
pub fn sample_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Creator" => Object::string_literal("Integration Writer"),
        "CreationDate" => Object::string_literal("D:20230615120000Z"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut data = Vec::new();
    doc.save_to(&mut data).unwrap();
    data
}

pub fn zip_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in members {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn upload(uri: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    write!(
        body,
        "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, filename
    )
    .unwrap();
    body.extend_from_slice(data);
    write!(body, "\r\n--{}--\r\n", BOUNDARY).unwrap();

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Entries left in the work directory
pub fn leftovers(work_dir: &Path) -> Vec<String> {
    std::fs::read_dir(work_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}
