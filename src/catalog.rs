//! Catalog entries: one per taxon, with photo sets per life stage.
//!
//! Entries leave the [`Catalog`] as owned copies; edits happen on the copy and
//! are written back with [`Catalog::save`]. Nothing here deletes remote files.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::assets::{AssetPathResolver, ResolvedPath};
use crate::domain::{
    CatalogEntry, EntryCode, Gender, PhotoItem, PhotoSet, Stage, Taxon, new_opaque_id,
};
use crate::drive::DriveClient;
use crate::error::CatalogError;
use crate::photo::PhotoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Created,
    Updated,
}

/// Result of a removal. Removing something that is not there is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Removal {
    Removed { photos_discarded: usize },
    NotFound,
}

impl Removal {
    pub fn is_removed(&self) -> bool {
        matches!(self, Removal::Removed { .. })
    }
}

impl CatalogEntry {
    /// Appends an empty set to `stage` and returns its id.
    pub fn add_photo_set(&mut self, stage: Stage) -> String {
        let set = PhotoSet::new();
        let id = set.id.clone();
        self.stages.get_mut(stage).push(set);
        id
    }

    /// Drops the set from this entry only. Files already on remote storage
    /// stay there.
    pub fn delete_photo_set(&mut self, stage: Stage, set_id: &str) -> Removal {
        let sets = self.stages.get_mut(stage);
        match sets.iter().position(|set| set.id == set_id) {
            Some(index) => {
                let removed = sets.remove(index);
                Removal::Removed {
                    photos_discarded: removed.photos.len(),
                }
            }
            None => Removal::NotFound,
        }
    }

    pub fn photo_set(&self, stage: Stage, set_id: &str) -> Option<&PhotoSet> {
        self.stages.get(stage).iter().find(|set| set.id == set_id)
    }

    pub fn photo_set_mut(
        &mut self,
        stage: Stage,
        set_id: &str,
    ) -> Result<&mut PhotoSet, CatalogError> {
        self.stages
            .get_mut(stage)
            .iter_mut()
            .find(|set| set.id == set_id)
            .ok_or_else(|| CatalogError::PhotoSetNotFound(set_id.to_string()))
    }

    pub fn set_inat_link(
        &mut self,
        stage: Stage,
        set_id: &str,
        link: &str,
    ) -> Result<(), CatalogError> {
        self.photo_set_mut(stage, set_id)?.inat_link = link.trim().to_string();
        Ok(())
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    pub fn remove_photo(
        &mut self,
        stage: Stage,
        set_id: &str,
        photo_id: &str,
    ) -> Result<Removal, CatalogError> {
        let set = self.photo_set_mut(stage, set_id)?;
        let before = set.photos.len();
        set.photos.retain(|photo| photo.id != photo_id);
        if set.photos.len() == before {
            return Ok(Removal::NotFound);
        }
        Ok(Removal::Removed {
            photos_discarded: 1,
        })
    }

    pub fn set_gender(
        &mut self,
        stage: Stage,
        set_id: &str,
        photo_id: &str,
        gender: Gender,
    ) -> Result<(), CatalogError> {
        if stage != Stage::Adult {
            return Err(CatalogError::GenderNotApplicable(stage));
        }
        let photo = self
            .photo_set_mut(stage, set_id)?
            .photos
            .iter_mut()
            .find(|photo| photo.id == photo_id)
            .ok_or_else(|| CatalogError::PhotoNotFound(photo_id.to_string()))?;
        photo.gender = Some(gender);
        Ok(())
    }
}

/// All saved entries, most recently created first.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, taxon_id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.id == taxon_id)
    }

    /// Working copy of the saved entry for this taxon, or a fresh unsaved
    /// draft. Never produces a second entry for the same taxon.
    pub fn open_or_draft(&self, taxon: &Taxon) -> CatalogEntry {
        match self.get(&taxon.taxon_id) {
            Some(existing) => existing.clone(),
            None => CatalogEntry::from_taxon(taxon, Utc::now()),
        }
    }

    pub fn save(&mut self, entry: CatalogEntry) -> SaveOutcome {
        self.save_at(entry, Local::now())
    }

    /// Stores `entry`, assigning its entry code on first save. The code of an
    /// entry that already has one is never touched.
    pub fn save_at(&mut self, mut entry: CatalogEntry, now: DateTime<Local>) -> SaveOutcome {
        entry.last_updated = now.with_timezone(&Utc);

        let existing = self.entries.iter().position(|saved| saved.id == entry.id);
        let stored_code = existing.and_then(|index| self.entries[index].entry_code.clone());
        if let Some(code) = stored_code {
            entry.entry_code = Some(code);
        } else if entry.entry_code.is_none() {
            entry.entry_code = Some(EntryCode::from_time(&now));
        }

        match existing {
            Some(index) => {
                self.entries[index] = entry;
                SaveOutcome::Updated
            }
            None => {
                self.entries.insert(0, entry);
                SaveOutcome::Created
            }
        }
    }

    pub fn delete(&mut self, taxon_id: &str) -> Removal {
        match self.entries.iter().position(|entry| entry.id == taxon_id) {
            Some(index) => {
                let removed = self.entries.remove(index);
                let photos_discarded = Stage::ALL
                    .into_iter()
                    .map(|stage| removed.photo_count(stage))
                    .sum();
                Removal::Removed { photos_discarded }
            }
            None => Removal::NotFound,
        }
    }

    /// Entries whose scientific name, Chinese name, notes or entry code
    /// contain `query` (case-insensitive). An empty query lists everything.
    pub fn filter(&self, query: &str) -> Vec<&CatalogEntry> {
        let needle = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|entry| {
                needle.is_empty()
                    || entry.taxon_name.to_lowercase().contains(&needle)
                    || entry.taxon_chinese.to_lowercase().contains(&needle)
                    || entry.notes.to_lowercase().contains(&needle)
                    || entry
                        .entry_code
                        .as_ref()
                        .is_some_and(|code| code.as_str().contains(&needle))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachReport {
    pub folder_id: String,
    pub display_path: String,
    pub photos: Vec<PhotoItem>,
}

/// Uploads `sources` into the stage folder of `entry` and appends one
/// `PhotoItem` per file to the set.
///
/// The folder chain is resolved once for the whole batch. Files are uploaded
/// one after another; the first failure aborts the rest and leaves `entry`
/// unchanged, though files uploaded before it remain on remote storage.
pub async fn attach_photos<D: DriveClient>(
    entry: &mut CatalogEntry,
    stage: Stage,
    set_id: &str,
    root_folder_id: &str,
    resolver: &AssetPathResolver<D>,
    sources: &[PhotoSource],
    sink: &dyn ProgressSink,
) -> Result<AttachReport, CatalogError> {
    if root_folder_id.trim().is_empty() {
        return Err(CatalogError::MissingRootFolder);
    }
    if entry.photo_set(stage, set_id).is_none() {
        return Err(CatalogError::PhotoSetNotFound(set_id.to_string()));
    }

    sink.event(ProgressEvent {
        message: format!("phase=Resolve; folder path for {} ({stage})", entry.taxon_name),
        elapsed: None,
    });
    let ResolvedPath {
        folder_id,
        display_path,
        provisioned,
    } = resolver.resolve_path(root_folder_id, entry, stage).await?;
    info!(%display_path, provisioned, "resolved upload folder");

    let gender = (stage == Stage::Adult).then_some(Gender::Uncertain);
    let mut uploaded = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        sink.event(ProgressEvent {
            message: format!(
                "phase=Upload; {} ({}/{})",
                source.name,
                index + 1,
                sources.len()
            ),
            elapsed: None,
        });
        let start = std::time::Instant::now();
        let link = match resolver.drive().upload_file(source, &folder_id).await {
            Ok(link) => link,
            Err(err) => {
                warn!(
                    file = %source.name,
                    uploaded = uploaded.len(),
                    error = %err,
                    "upload failed, aborting batch"
                );
                return Err(err);
            }
        };
        sink.event(ProgressEvent {
            message: format!("drive.upload {}", source.name),
            elapsed: Some(start.elapsed()),
        });

        uploaded.push(PhotoItem {
            id: new_opaque_id(),
            url: source.local_url(),
            name: source.name.clone(),
            size: source.size,
            width: source.width,
            height: source.height,
            mime_type: source.mime_type.clone(),
            gender,
            drive_folder_id: Some(folder_id.clone()),
            drive_path_display: Some(display_path.clone()),
            drive_link: Some(link),
        });
    }

    entry
        .photo_set_mut(stage, set_id)?
        .photos
        .extend(uploaded.iter().cloned());

    Ok(AttachReport {
        folder_id,
        display_path,
        photos: uploaded,
    })
}
