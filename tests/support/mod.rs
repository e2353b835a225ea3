#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;

use moth_catalog::app::{ProgressEvent, ProgressSink};
use moth_catalog::domain::{CatalogEntry, Rank, Taxon};
use moth_catalog::drive::DriveClient;
use moth_catalog::error::CatalogError;
use moth_catalog::photo::PhotoSource;

/// In-memory drive. Folder ids are `<parent>/<name>`; uploads return a link
/// built from the folder and file name.
#[derive(Default)]
pub struct MockDrive {
    pub folder_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub created: Mutex<Vec<(String, String)>>,
    /// Folder names that fail on their next creation attempt.
    pub fail_folder_once: Mutex<Vec<String>>,
    /// Upload attempt (1-based) that fails.
    pub fail_upload_at: Option<usize>,
    pub uploaded: Mutex<HashMap<String, Vec<String>>>,
}

impl MockDrive {
    pub fn failing_folder_once(name: &str) -> Self {
        Self {
            fail_folder_once: Mutex::new(vec![name.to_string()]),
            ..Self::default()
        }
    }

    pub fn failing_upload_at(attempt: usize) -> Self {
        Self {
            fail_upload_at: Some(attempt),
            ..Self::default()
        }
    }

    pub fn folder_calls(&self) -> usize {
        self.folder_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriveClient for MockDrive {
    async fn find_or_create_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<String, CatalogError> {
        self.folder_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        {
            let mut failing = self.fail_folder_once.lock().unwrap();
            if let Some(index) = failing.iter().position(|value| value == name) {
                failing.remove(index);
                return Err(CatalogError::DriveStatus {
                    status: 500,
                    message: format!("cannot create {name}"),
                });
            }
        }
        self.created
            .lock()
            .unwrap()
            .push((parent_id.to_string(), name.to_string()));
        Ok(format!("{parent_id}/{name}"))
    }

    async fn upload_file(
        &self,
        photo: &PhotoSource,
        folder_id: &str,
    ) -> Result<String, CatalogError> {
        let attempt = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::task::yield_now().await;
        if self.fail_upload_at == Some(attempt) {
            return Err(CatalogError::DriveHttp("connection reset".to_string()));
        }
        self.uploaded
            .lock()
            .unwrap()
            .entry(folder_id.to_string())
            .or_default()
            .push(photo.name.clone());
        Ok(format!("https://drive.test/{folder_id}/{}", photo.name))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event.message);
    }
}

pub fn taxon(id: &str, family: &str, name: &str) -> Taxon {
    let mut tokens = name.split_whitespace();
    let genus = tokens.next().unwrap_or_default().to_string();
    let species = tokens.next().map(str::to_string);
    let rest = tokens.collect::<Vec<_>>();
    Taxon {
        taxon_id: id.to_string(),
        scientific_name: name.to_string(),
        chinese_name: String::new(),
        rank: if rest.is_empty() {
            Rank::Species
        } else {
            Rank::Subspecies
        },
        family: family.to_string(),
        genus,
        species,
        subspecies: (!rest.is_empty()).then(|| rest.join(" ")),
    }
}

pub fn entry(id: &str, family: &str, name: &str) -> CatalogEntry {
    CatalogEntry::from_taxon(&taxon(id, family, name), Utc::now())
}

/// Writes a small PNG and returns its path.
pub fn write_png(dir: &Utf8Path, name: &str, width: u32, height: u32) -> Utf8PathBuf {
    let path = dir.join(name);
    image::RgbImage::new(width, height)
        .save(path.as_std_path())
        .unwrap();
    path
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}
