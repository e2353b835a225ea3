use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::assets::{AssetPathResolver, FolderCache};
use crate::catalog::{self, AttachReport, Catalog, Removal, SaveOutcome};
use crate::domain::{
    CatalogEntry, Gender, ImportKind, ImportRecord, PhotoItem, Settings, Stage, Taxon,
    new_opaque_id,
};
use crate::drive::DriveClient;
use crate::error::CatalogError;
use crate::export;
use crate::index::TaxonIndex;
use crate::normalize::{self, SkippedRow};
use crate::photo::PhotoSource;
use crate::store::{Store, write_bytes_atomic};

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub record_id: String,
    pub filename: String,
    pub accepted: usize,
    pub skipped_not_accepted: usize,
    pub skipped_malformed: usize,
    #[serde(skip)]
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub indexed: usize,
    pub results: Vec<Taxon>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryResult {
    pub outcome: EntryOutcome,
    pub entry: CatalogEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    Created,
    Existing,
    Updated,
}

impl From<SaveOutcome> for EntryOutcome {
    fn from(outcome: SaveOutcome) -> Self {
        match outcome {
            SaveOutcome::Created => EntryOutcome::Created,
            SaveOutcome::Updated => EntryOutcome::Updated,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub entries: Vec<EntrySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub id: String,
    pub entry_code: Option<String>,
    pub scientific_name: String,
    pub chinese_name: String,
    pub family: String,
    pub photo_sets: usize,
    pub last_updated: DateTime<Utc>,
}

impl From<&CatalogEntry> for EntrySummary {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            id: entry.id.clone(),
            entry_code: entry.entry_code.as_ref().map(|code| code.to_string()),
            scientific_name: entry.scientific_name(),
            chinese_name: entry.taxon_chinese.clone(),
            family: entry.family.clone(),
            photo_sets: entry.photo_set_count(),
            last_updated: entry.last_updated,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoSetResult {
    pub taxon_id: String,
    pub stage: Stage,
    pub set_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub rows: usize,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub entries: usize,
    pub photo_sets: usize,
    pub photos: usize,
    pub indexed_taxa: usize,
    pub legacy_records: usize,
    pub last_import: Option<ImportRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryResult {
    pub items: Vec<GalleryItem>,
}

/// Adult photos of one entry: the first male and female photo when tagged,
/// plus the first adult photo as a representative.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryItem {
    pub taxon_id: String,
    pub scientific_name: String,
    pub chinese_name: String,
    pub male: Option<PhotoItem>,
    pub female: Option<PhotoItem>,
    pub representative: Option<PhotoItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<D: DriveClient> {
    store: Store,
    resolver: AssetPathResolver<D>,
    persist_folder_cache: bool,
}

impl<D: DriveClient> App<D> {
    pub fn new(store: Store, drive: D, cache: Arc<FolderCache>) -> Self {
        Self {
            store,
            resolver: AssetPathResolver::new(drive, cache),
            persist_folder_cache: false,
        }
    }

    /// Writes the folder cache back to the store after every upload batch.
    pub fn persist_folder_cache(mut self, enabled: bool) -> Self {
        self.persist_folder_cache = enabled;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn resolver(&self) -> &AssetPathResolver<D> {
        &self.resolver
    }

    pub fn import_reference(
        &self,
        path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, CatalogError> {
        sink.event(ProgressEvent {
            message: format!("phase=Read; {path}"),
            elapsed: None,
        });
        let raw = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        let filename = path.file_name().unwrap_or(path.as_str());
        self.import_text(filename, &raw, sink)
    }

    /// Replaces the taxon index with the accepted rows of `raw`. When nothing
    /// is accepted the current index is kept.
    pub fn import_text(
        &self,
        filename: &str,
        raw: &str,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, CatalogError> {
        let start = Instant::now();
        let report = normalize::normalize(raw);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Normalize; accepted={} skipped={}",
                report.taxa.len(),
                report.skipped.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        if report.taxa.is_empty() {
            return Err(CatalogError::NoValidRows(filename.to_string()));
        }

        let record = ImportRecord {
            id: new_opaque_id(),
            filename: filename.to_string(),
            timestamp: Utc::now(),
            count: report.taxa.len(),
            kind: ImportKind::TaxonomyCsv,
        };
        let result = ImportResult {
            record_id: record.id.clone(),
            filename: filename.to_string(),
            accepted: report.taxa.len(),
            skipped_not_accepted: report.not_accepted_count(),
            skipped_malformed: report.malformed_count(),
            skipped: report.skipped,
        };

        sink.event(ProgressEvent {
            message: "phase=Store; replacing taxon index".to_string(),
            elapsed: None,
        });
        self.store.save_taxa(&report.taxa)?;
        self.store.push_import_record(record)?;
        info!(
            filename,
            accepted = result.accepted,
            skipped = result.skipped.len(),
            "imported reference table"
        );
        Ok(result)
    }

    pub fn index(&self) -> Result<TaxonIndex, CatalogError> {
        Ok(TaxonIndex::new(self.store.load_taxa()?))
    }

    pub fn catalog(&self) -> Result<Catalog, CatalogError> {
        Ok(Catalog::new(self.store.load_entries()?))
    }

    pub fn search(&self, query: &str) -> Result<SearchResult, CatalogError> {
        let index = self.index()?;
        let results = index.search(query).into_iter().cloned().collect();
        Ok(SearchResult {
            query: query.to_string(),
            indexed: index.len(),
            results,
        })
    }

    pub fn history(&self) -> Result<Vec<ImportRecord>, CatalogError> {
        self.store.load_import_history()
    }

    /// Opens the entry for `taxon_id`, creating and saving it from the index
    /// when the taxon has none yet.
    pub fn create_entry(&self, taxon_id: &str) -> Result<EntryResult, CatalogError> {
        let mut catalog = self.catalog()?;
        if let Some(existing) = catalog.get(taxon_id) {
            return Ok(EntryResult {
                outcome: EntryOutcome::Existing,
                entry: existing.clone(),
            });
        }

        let index = self.index()?;
        let taxon = index
            .get(taxon_id)
            .ok_or_else(|| CatalogError::TaxonNotFound(taxon_id.to_string()))?;
        let draft = catalog.open_or_draft(taxon);
        let outcome = catalog.save(draft);
        self.store.save_entries(catalog.entries())?;
        let entry = catalog
            .get(taxon_id)
            .cloned()
            .ok_or_else(|| CatalogError::EntryNotFound(taxon_id.to_string()))?;
        info!(taxon_id, entry_code = ?entry.entry_code, "created catalog entry");
        Ok(EntryResult {
            outcome: outcome.into(),
            entry,
        })
    }

    pub fn show_entry(&self, taxon_id: &str) -> Result<CatalogEntry, CatalogError> {
        self.catalog()?
            .get(taxon_id)
            .cloned()
            .ok_or_else(|| CatalogError::EntryNotFound(taxon_id.to_string()))
    }

    pub fn list_entries(&self, query: &str) -> Result<ListResult, CatalogError> {
        let catalog = self.catalog()?;
        let entries = catalog
            .filter(query)
            .into_iter()
            .map(EntrySummary::from)
            .collect();
        Ok(ListResult { entries })
    }

    pub fn update_notes(&self, taxon_id: &str, notes: &str) -> Result<CatalogEntry, CatalogError> {
        let (entry, ()) = self.edit_entry(taxon_id, |entry| {
            entry.set_notes(notes);
            Ok(())
        })?;
        Ok(entry)
    }

    pub fn delete_entry(&self, taxon_id: &str) -> Result<Removal, CatalogError> {
        let mut catalog = self.catalog()?;
        let removal = catalog.delete(taxon_id);
        if removal.is_removed() {
            self.store.save_entries(catalog.entries())?;
        }
        Ok(removal)
    }

    pub fn add_photo_set(&self, taxon_id: &str, stage: Stage) -> Result<PhotoSetResult, CatalogError> {
        let (_, set_id) = self.edit_entry(taxon_id, |entry| Ok(entry.add_photo_set(stage)))?;
        Ok(PhotoSetResult {
            taxon_id: taxon_id.to_string(),
            stage,
            set_id,
        })
    }

    /// Removes the set from the catalog. Remote files are left in place.
    pub fn delete_photo_set(
        &self,
        taxon_id: &str,
        stage: Stage,
        set_id: &str,
    ) -> Result<Removal, CatalogError> {
        let mut catalog = self.catalog()?;
        let Some(mut entry) = catalog.get(taxon_id).cloned() else {
            return Ok(Removal::NotFound);
        };
        let removal = entry.delete_photo_set(stage, set_id);
        if removal.is_removed() {
            catalog.save(entry);
            self.store.save_entries(catalog.entries())?;
        }
        Ok(removal)
    }

    pub fn set_inat_link(
        &self,
        taxon_id: &str,
        stage: Stage,
        set_id: &str,
        link: &str,
    ) -> Result<CatalogEntry, CatalogError> {
        let (entry, ()) =
            self.edit_entry(taxon_id, |entry| entry.set_inat_link(stage, set_id, link))?;
        Ok(entry)
    }

    pub fn remove_photo(
        &self,
        taxon_id: &str,
        stage: Stage,
        set_id: &str,
        photo_id: &str,
    ) -> Result<Removal, CatalogError> {
        let mut catalog = self.catalog()?;
        let Some(mut entry) = catalog.get(taxon_id).cloned() else {
            return Ok(Removal::NotFound);
        };
        let removal = entry.remove_photo(stage, set_id, photo_id)?;
        if removal.is_removed() {
            catalog.save(entry);
            self.store.save_entries(catalog.entries())?;
        }
        Ok(removal)
    }

    pub fn set_gender(
        &self,
        taxon_id: &str,
        stage: Stage,
        set_id: &str,
        photo_id: &str,
        gender: Gender,
    ) -> Result<CatalogEntry, CatalogError> {
        let (entry, ()) = self.edit_entry(taxon_id, |entry| {
            entry.set_gender(stage, set_id, photo_id, gender)
        })?;
        Ok(entry)
    }

    /// Uploads `paths` into the set and records them on the entry.
    ///
    /// The root folder id is checked and every file is read before the first
    /// remote call.
    pub async fn attach_photos(
        &self,
        taxon_id: &str,
        stage: Stage,
        set_id: &str,
        paths: &[Utf8PathBuf],
        sink: &dyn ProgressSink,
    ) -> Result<AttachReport, CatalogError> {
        let settings = self.store.load_settings()?;
        if settings.drive_root_id.trim().is_empty() {
            return Err(CatalogError::MissingRootFolder);
        }

        let mut catalog = self.catalog()?;
        let mut entry = catalog
            .get(taxon_id)
            .cloned()
            .ok_or_else(|| CatalogError::EntryNotFound(taxon_id.to_string()))?;
        let sources = paths
            .iter()
            .map(|path| PhotoSource::read(path))
            .collect::<Result<Vec<_>, _>>()?;

        let result = catalog::attach_photos(
            &mut entry,
            stage,
            set_id,
            &settings.drive_root_id,
            &self.resolver,
            &sources,
            sink,
        )
        .await;
        self.save_folder_cache();
        let report = result?;

        catalog.save(entry);
        self.store.save_entries(catalog.entries())?;
        Ok(report)
    }

    pub fn export_bytes(&self) -> Result<(Vec<u8>, usize), CatalogError> {
        let catalog = self.catalog()?;
        let mut buffer = Vec::new();
        let rows = export::write_checklist(catalog.entries(), &mut buffer)?;
        Ok((buffer, rows))
    }

    pub fn export_to(&self, path: &Utf8Path) -> Result<ExportResult, CatalogError> {
        let (bytes, rows) = self.export_bytes()?;
        write_bytes_atomic(path, &bytes)?;
        Ok(ExportResult {
            rows,
            path: Some(path.to_string()),
        })
    }

    pub fn stats(&self) -> Result<StatsResult, CatalogError> {
        let catalog = self.catalog()?;
        let photo_sets = catalog
            .entries()
            .iter()
            .map(CatalogEntry::photo_set_count)
            .sum::<usize>();
        let photos = catalog
            .entries()
            .iter()
            .flat_map(|entry| Stage::ALL.map(|stage| entry.photo_count(stage)))
            .sum::<usize>();
        Ok(StatsResult {
            entries: catalog.len(),
            photo_sets,
            photos,
            indexed_taxa: self.store.load_taxa()?.len(),
            legacy_records: self.store.load_legacy_records()?.len(),
            last_import: self.store.load_import_history()?.into_iter().next(),
        })
    }

    pub fn gallery(&self) -> Result<GalleryResult, CatalogError> {
        let catalog = self.catalog()?;
        let items = catalog
            .entries()
            .iter()
            .filter(|entry| !entry.stages.adult.is_empty())
            .map(|entry| {
                let adult_photos = || entry.stages.adult.iter().flat_map(|set| set.photos.iter());
                let first_with = |gender: Gender| {
                    adult_photos()
                        .find(|photo| photo.gender == Some(gender))
                        .cloned()
                };
                GalleryItem {
                    taxon_id: entry.id.clone(),
                    scientific_name: entry.scientific_name(),
                    chinese_name: entry.taxon_chinese.clone(),
                    male: first_with(Gender::Male),
                    female: first_with(Gender::Female),
                    representative: adult_photos().next().cloned(),
                }
            })
            .collect();
        Ok(GalleryResult { items })
    }

    pub fn settings(&self) -> Result<Settings, CatalogError> {
        self.store.load_settings()
    }

    pub fn set_root_folder(&self, folder_id: &str) -> Result<Settings, CatalogError> {
        let settings = Settings {
            drive_root_id: folder_id.trim().to_string(),
        };
        self.store.save_settings(&settings)?;
        Ok(settings)
    }

    pub fn reset(&self, sink: &dyn ProgressSink) -> Result<ClearResult, CatalogError> {
        sink.event(ProgressEvent {
            message: "phase=Store; clearing catalog data".to_string(),
            elapsed: None,
        });
        self.store.clear_all()?;
        Ok(ClearResult { cleared: true })
    }

    /// Applies `edit` to a working copy of the entry and saves it back.
    fn edit_entry<T, F>(&self, taxon_id: &str, edit: F) -> Result<(CatalogEntry, T), CatalogError>
    where
        F: FnOnce(&mut CatalogEntry) -> Result<T, CatalogError>,
    {
        let mut catalog = self.catalog()?;
        let mut entry = catalog
            .get(taxon_id)
            .cloned()
            .ok_or_else(|| CatalogError::EntryNotFound(taxon_id.to_string()))?;
        let value = edit(&mut entry)?;
        catalog.save(entry);
        self.store.save_entries(catalog.entries())?;
        let saved = catalog
            .get(taxon_id)
            .cloned()
            .ok_or_else(|| CatalogError::EntryNotFound(taxon_id.to_string()))?;
        Ok((saved, value))
    }

    fn save_folder_cache(&self) {
        if !self.persist_folder_cache {
            return;
        }
        let snapshot = self.resolver.cache().snapshot();
        if let Err(err) = self.store.save_folder_cache(&snapshot) {
            warn!(error = %err, "failed to persist folder cache");
        }
    }
}
