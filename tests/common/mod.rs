#![allow(dead_code)]

use async_trait::async_trait;
use casefile_backend::AppState;
use casefile_backend::config::UploadConfig;
use casefile_backend::infrastructure::database::run_migrations;
use casefile_backend::services::storage::{ObjectStore, StorageError};
use sea_orm::{ConnectOptions, Database};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory object store standing in for S3. Failure flags let tests
/// exercise the error paths the real store would produce.
#[derive(Default)]
pub struct MemoryObjectStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_writes: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl MemoryObjectStore {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn write(&self, key: &str, _mime_type: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("store offline".to_string()));
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete_if_exists(&self, key: &str) -> Result<bool, StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::DeleteFailed("store offline".to_string()));
        }
        Ok(self.objects.lock().unwrap().remove(key).is_some())
    }
}

pub async fn test_state_with(config: UploadConfig) -> (AppState, Arc<MemoryObjectStore>) {
    // one pooled connection, or every checkout would see a fresh in-memory db
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    run_migrations(&db).await.unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    let state = AppState::new(db, store.clone(), config);
    (state, store)
}

pub async fn test_state() -> (AppState, Arc<MemoryObjectStore>) {
    test_state_with(UploadConfig::default()).await
}

/// A small but structurally complete PDF, built with the same parser the
/// validator uses so the two can never drift apart.
pub fn pdf_bytes() -> Vec<u8> {
    use lopdf::{Document, Object, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Builds a multipart body with one part named "file" per entry of
/// (filename, content type, bytes).
pub fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, content_type, bytes) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
