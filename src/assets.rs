//! Family / Genus / Species / Stage folder tree on remote storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::{CatalogEntry, Stage, format_scientific_name};
use crate::drive::DriveClient;
use crate::error::CatalogError;

pub const UNSORTED: &str = "__UNSORTED__";
pub const UNNAMED: &str = "__UNNAMED__";

const FORBIDDEN_CHARS: [char; 10] = ['\\', '/', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Trims, replaces characters that are not allowed in folder names with `_`,
/// and falls back to [`UNNAMED`] when nothing is left.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned = name
        .trim()
        .chars()
        .map(|ch| if FORBIDDEN_CHARS.contains(&ch) { '_' } else { ch })
        .collect::<String>();
    if cleaned.is_empty() {
        UNNAMED.to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderKey {
    pub parent_id: String,
    pub name: String,
}

impl FolderKey {
    pub fn new(parent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFolder {
    #[serde(flatten)]
    pub key: FolderKey,
    pub folder_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLookup {
    pub folder_id: String,
    pub cached: bool,
}

/// Folder ids already provisioned under a parent, keyed by sanitized name.
///
/// Append-only: nothing is evicted. A key whose provisioning call is still in
/// flight is reserved, so concurrent lookups of that key wait for the same
/// call instead of issuing their own. A failed call releases the key.
#[derive(Debug, Default)]
pub struct FolderCache {
    slots: Mutex<HashMap<FolderKey, Arc<OnceCell<String>>>>,
}

impl FolderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(folders: Vec<CachedFolder>) -> Self {
        let slots = folders
            .into_iter()
            .map(|folder| (folder.key, Arc::new(OnceCell::new_with(Some(folder.folder_id)))))
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Resolved entries only; pending reservations are left out.
    pub fn snapshot(&self) -> Vec<CachedFolder> {
        let mut folders = self
            .lock()
            .iter()
            .filter_map(|(key, cell)| {
                cell.get().map(|folder_id| CachedFolder {
                    key: key.clone(),
                    folder_id: folder_id.clone(),
                })
            })
            .collect::<Vec<_>>();
        folders.sort_by(|a, b| {
            (&a.key.parent_id, &a.key.name).cmp(&(&b.key.parent_id, &b.key.name))
        });
        folders
    }

    pub fn get(&self, key: &FolderKey) -> Option<String> {
        self.lock().get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.lock().values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn get_or_provision<F, Fut>(
        &self,
        key: FolderKey,
        provision: F,
    ) -> Result<FolderLookup, CatalogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, CatalogError>>,
    {
        let cell = self.lock().entry(key).or_default().clone();
        let called = AtomicBool::new(false);
        let folder_id = cell
            .get_or_try_init(|| {
                called.store(true, Ordering::Relaxed);
                provision()
            })
            .await?;
        Ok(FolderLookup {
            folder_id: folder_id.clone(),
            cached: !called.load(Ordering::Relaxed),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FolderKey, Arc<OnceCell<String>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sanitized folder names for one `(entry, stage)`, root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathPlan {
    pub family: String,
    pub genus: String,
    pub species: String,
    pub stage: String,
}

impl PathPlan {
    pub fn segments(&self) -> [&str; 4] {
        [&self.family, &self.genus, &self.species, &self.stage]
    }

    pub fn display_path(&self) -> String {
        self.segments().join("/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    pub folder_id: String,
    pub display_path: String,
    /// Segments that needed a remote call on this resolution.
    pub provisioned: usize,
}

pub struct AssetPathResolver<D: DriveClient> {
    drive: D,
    cache: Arc<FolderCache>,
}

impl<D: DriveClient> AssetPathResolver<D> {
    pub fn new(drive: D, cache: Arc<FolderCache>) -> Self {
        Self { drive, cache }
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }

    pub fn cache(&self) -> &Arc<FolderCache> {
        &self.cache
    }

    pub fn plan_path(entry: &CatalogEntry, stage: Stage) -> PathPlan {
        let family = if entry.family.is_empty() {
            UNSORTED.to_string()
        } else {
            sanitize_segment(&entry.family)
        };
        let genus = if entry.genus.is_empty() {
            UNSORTED.to_string()
        } else {
            sanitize_segment(&entry.genus)
        };
        let species = match entry.species.as_deref().filter(|value| !value.is_empty()) {
            Some(species) => sanitize_segment(&format_scientific_name(
                &entry.genus,
                Some(species),
                entry.subspecies.as_deref(),
            )),
            None => UNSORTED.to_string(),
        };
        PathPlan {
            family,
            genus,
            species,
            stage: sanitize_segment(stage.as_str()),
        }
    }

    /// Provisions (or reuses) the four-level folder chain under `root_folder_id`.
    ///
    /// Folders created before a failure stay cached; a retry skips them.
    pub async fn resolve_path(
        &self,
        root_folder_id: &str,
        entry: &CatalogEntry,
        stage: Stage,
    ) -> Result<ResolvedPath, CatalogError> {
        let root = root_folder_id.trim();
        if root.is_empty() {
            return Err(CatalogError::MissingRootFolder);
        }

        let plan = Self::plan_path(entry, stage);
        let mut parent = root.to_string();
        let mut provisioned = 0;
        for segment in plan.segments() {
            let key = FolderKey::new(parent.as_str(), segment);
            let lookup = self
                .cache
                .get_or_provision(key, || self.drive.find_or_create_folder(&parent, segment))
                .await?;
            if !lookup.cached {
                provisioned += 1;
            }
            debug!(parent = %parent, segment, folder_id = %lookup.folder_id, cached = lookup.cached, "resolved folder");
            parent = lookup.folder_id;
        }

        Ok(ResolvedPath {
            folder_id: parent,
            display_path: plan.display_path(),
            provisioned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_forbidden_chars() {
        assert_eq!(sanitize_segment("  a/b\\c?d%e*f:g|h\"i<j>k "), "a_b_c_d_e_f_g_h_i_j_k");
    }

    #[test]
    fn sanitize_empty_becomes_unnamed() {
        assert_eq!(sanitize_segment("   "), UNNAMED);
        assert_eq!(sanitize_segment(UNSORTED), UNSORTED);
    }

    #[tokio::test]
    async fn cache_reports_hits() {
        let cache = FolderCache::new();
        let key = FolderKey::new("root", "Bombycidae");
        let first = cache
            .get_or_provision(key.clone(), || async { Ok("f1".to_string()) })
            .await
            .unwrap();
        assert!(!first.cached);
        let second = cache
            .get_or_provision(key.clone(), || async { Ok("other".to_string()) })
            .await
            .unwrap();
        assert_eq!(second.folder_id, "f1");
        assert!(second.cached);
        assert_eq!(cache.get(&key).as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn failed_provision_releases_key() {
        let cache = FolderCache::new();
        let key = FolderKey::new("root", "Erebidae");
        let err = cache
            .get_or_provision(key.clone(), || async {
                Err(CatalogError::DriveHttp("offline".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::DriveHttp(_)));
        assert!(cache.is_empty());

        let lookup = cache
            .get_or_provision(key, || async { Ok("f2".to_string()) })
            .await
            .unwrap();
        assert_eq!(lookup.folder_id, "f2");
        assert!(!lookup.cached);
    }

    #[test]
    fn snapshot_round_trips_resolved_entries() {
        let cache = FolderCache::from_snapshot(vec![CachedFolder {
            key: FolderKey::new("root", "Saturniidae"),
            folder_id: "f9".to_string(),
        }]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.snapshot()[0].folder_id, "f9");
    }
}
