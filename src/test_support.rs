//! Sample documents and request builders shared by unit tests

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use lopdf::{dictionary, Document, Object, Stream};

use crate::config::Config;
use crate::dispatch::InlineDispatcher;
use crate::state::AppState;

pub const MULTIPART_BOUNDARY: &str = "metaclean-test-boundary";

/// Minimal one-page PDF with `/Creator`, `/CreationDate` and an XMP stream
pub fn write_sample_pdf(path: &Path) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
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

    let xmp_id = doc.add_object(Stream::new(
        dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
        b"<x:xmpmeta><dc:creator>Writer 1.0</dc:creator></x:xmpmeta>".to_vec(),
    ));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "Metadata" => xmp_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Creator" => Object::string_literal("Writer 1.0"),
        "CreationDate" => Object::string_literal("D:20240101000000Z"),
    });

    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.save(path).unwrap();
}

/// One PNG chunk with a valid CRC
pub fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut crc = flate2::Crc::new();
    crc.update(kind);
    crc.update(data);

    let mut chunk = Vec::with_capacity(data.len() + 12);
    chunk.extend_from_slice(&(data.len() as u32).to_be_bytes());
    chunk.extend_from_slice(kind);
    chunk.extend_from_slice(data);
    chunk.extend_from_slice(&crc.sum().to_be_bytes());
    chunk
}

/// 1x1 grayscale PNG carrying an `Author` text chunk and a timestamp
pub fn sample_png() -> Vec<u8> {
    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend(png_chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]));
    png.extend(png_chunk(b"tEXt", b"Author\0Jane Doe"));
    png.extend(png_chunk(b"tIME", &[0x07, 0xE8, 1, 2, 3, 4, 5]));
    png.extend(png_chunk(b"IDAT", &[0x78, 0x9C, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01]));
    png.extend(png_chunk(b"IEND", &[]));
    png
}

fn jpeg_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut segment = vec![0xFF, marker];
    segment.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    segment.extend_from_slice(payload);
    segment
}

/// Structurally valid JPEG skeleton with JFIF, EXIF, ICC and a comment
pub fn sample_jpeg() -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend(jpeg_segment(0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0"));
    jpeg.extend(jpeg_segment(0xE1, b"Exif\0\0MM\0*\0\0\0\x08\0\0"));
    jpeg.extend(jpeg_segment(0xE2, b"ICC_PROFILE\0\x01\x01fake-profile"));
    jpeg.extend(jpeg_segment(0xFE, b"shot on a phone"));
    jpeg.extend(jpeg_segment(0xDB, &[0u8; 65]));
    jpeg.extend(jpeg_segment(0xDA, &[1, 1, 0, 0, 63, 0]));
    jpeg.extend_from_slice(&[0x12, 0x34, 0x56, 0xFF, 0x00, 0x78]);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

/// Write a ZIP archive with the given members
pub fn write_zip(path: &Path, members: &[(&str, Vec<u8>)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in members {
        writer.start_file(*name, options.clone()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

/// App state over an inline dispatcher rooted at `work_dir`
pub fn inline_state(work_dir: &Path) -> AppState {
    let mut config = Config::default();
    config.storage.work_dir = work_dir.to_path_buf();
    AppState::new(config, Arc::new(InlineDispatcher::new(2)))
}

/// Multipart body with a single `file` field
pub fn multipart_body(filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    write!(
        body,
        "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        MULTIPART_BOUNDARY, filename
    )
    .unwrap();
    body.extend_from_slice(data);
    write!(body, "\r\n--{}--\r\n", MULTIPART_BOUNDARY).unwrap();
    body
}

pub fn upload_request(uri: &str, filename: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        )
        .body(Body::from(multipart_body(filename, data)))
        .unwrap()
}

/// Entries left in the work directory
pub fn leftovers(work_dir: &Path) -> Vec<String> {
    std::fs::read_dir(work_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}
