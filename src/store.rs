use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;
use tracing::debug;

use crate::assets::CachedFolder;
use crate::domain::{CatalogEntry, ImportRecord, Settings, Taxon};
use crate::error::CatalogError;

pub const IMPORT_HISTORY_LIMIT: usize = 10;

/// The independent documents kept on disk. Each is read and replaced whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    TaxonIndex,
    Entries,
    ImportHistory,
    Settings,
    Records,
    FolderCache,
}

impl StorageKey {
    pub const ALL: [StorageKey; 6] = [
        StorageKey::TaxonIndex,
        StorageKey::Entries,
        StorageKey::ImportHistory,
        StorageKey::Settings,
        StorageKey::Records,
        StorageKey::FolderCache,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StorageKey::TaxonIndex => "moth_taxon_index_v3",
            StorageKey::Entries => "moth_entries_v3",
            StorageKey::ImportHistory => "moth_import_history_v2",
            StorageKey::Settings => "moth_settings_v1",
            StorageKey::Records => "moth_records_v1",
            StorageKey::FolderCache => "moth_folder_cache_v1",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(data_dir: Option<&Utf8Path>) -> Result<Self, CatalogError> {
        if let Some(dir) = data_dir {
            return Ok(Self::new_with_root(dir.to_path_buf()));
        }
        let root = ProjectDirs::from("org", "moth-catalog", "moth-catalog")
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok())
            .ok_or_else(|| {
                CatalogError::Filesystem("unable to resolve data directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn path_for(&self, key: StorageKey) -> Utf8PathBuf {
        self.root.join(format!("{}.json", key.name()))
    }

    /// A missing document reads as `T::default()`.
    pub fn read<T: DeserializeOwned + Default>(&self, key: StorageKey) -> Result<T, CatalogError> {
        let path = self.path_for(key);
        if !path.as_std_path().exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| CatalogError::StoreCorrupt {
            key: key.name().to_string(),
            message: err.to_string(),
        })
    }

    pub fn write<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) -> Result<(), CatalogError> {
        let path = self.path_for(key);
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&path, &content)?;
        debug!(key = key.name(), bytes = content.len(), "wrote document");
        Ok(())
    }

    pub fn remove(&self, key: StorageKey) -> Result<(), CatalogError> {
        let path = self.path_for(key);
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), CatalogError> {
        for key in StorageKey::ALL {
            self.remove(key)?;
        }
        Ok(())
    }

    pub fn load_taxa(&self) -> Result<Vec<Taxon>, CatalogError> {
        self.read(StorageKey::TaxonIndex)
    }

    pub fn save_taxa(&self, taxa: &[Taxon]) -> Result<(), CatalogError> {
        self.write(StorageKey::TaxonIndex, taxa)
    }

    pub fn load_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.read(StorageKey::Entries)
    }

    pub fn save_entries(&self, entries: &[CatalogEntry]) -> Result<(), CatalogError> {
        self.write(StorageKey::Entries, entries)
    }

    pub fn load_import_history(&self) -> Result<Vec<ImportRecord>, CatalogError> {
        self.read(StorageKey::ImportHistory)
    }

    /// Newest first, keeping the last [`IMPORT_HISTORY_LIMIT`] imports.
    pub fn push_import_record(&self, record: ImportRecord) -> Result<(), CatalogError> {
        let mut history = self.load_import_history()?;
        history.insert(0, record);
        history.truncate(IMPORT_HISTORY_LIMIT);
        self.write(StorageKey::ImportHistory, &history)
    }

    pub fn load_settings(&self) -> Result<Settings, CatalogError> {
        self.read(StorageKey::Settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), CatalogError> {
        self.write(StorageKey::Settings, settings)
    }

    /// Records from the pre-entry data model; kept only so they can be counted
    /// and cleared.
    pub fn load_legacy_records(&self) -> Result<Vec<serde_json::Value>, CatalogError> {
        self.read(StorageKey::Records)
    }

    pub fn load_folder_cache(&self) -> Result<Vec<CachedFolder>, CatalogError> {
        self.read(StorageKey::FolderCache)
    }

    pub fn save_folder_cache(&self, folders: &[CachedFolder]) -> Result<(), CatalogError> {
        self.write(StorageKey::FolderCache, folders)
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
    let parent = path
        .parent()
        .ok_or_else(|| CatalogError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("moth-cat")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(())
}
