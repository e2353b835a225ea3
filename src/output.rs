use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    EntryOutcome, EntryResult, GalleryResult, ImportResult, ListResult, ProgressEvent, ProgressSink,
    SearchResult, StatsResult,
};
use crate::catalog::{AttachReport, Removal};
use crate::domain::{CatalogEntry, ImportRecord, PhotoItem, Settings, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Machine-readable output: one pretty JSON document on stdout per command,
/// progress suppressed.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Plain text for a terminal. Progress lines go to stderr so stdout stays
/// pipeable.
pub struct HumanOutput;

impl ProgressSink for HumanOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

impl HumanOutput {
    pub fn print_import(result: &ImportResult) {
        println!(
            "Imported {} taxa from {} ({} not accepted, {} malformed)",
            result.accepted,
            result.filename,
            result.skipped_not_accepted,
            result.skipped_malformed
        );
    }

    pub fn print_search(result: &SearchResult) {
        if result.indexed == 0 {
            println!("Taxon index is empty; run `moth-cat import <FILE>` first");
            return;
        }
        for taxon in &result.results {
            println!(
                "{:<10} {:<40} {:<12} {} / {}",
                taxon.taxon_id,
                taxon.scientific_name,
                taxon.rank,
                taxon.family,
                taxon.chinese_name
            );
        }
        println!("{} match(es)", result.results.len());
    }

    pub fn print_history(history: &[ImportRecord]) {
        if history.is_empty() {
            println!("No imports yet");
        }
        for record in history {
            println!(
                "{}  {:<30} {} taxa",
                record.timestamp.format("%Y-%m-%d %H:%M"),
                record.filename,
                record.count
            );
        }
    }

    pub fn print_entry_result(result: &EntryResult) {
        let verb = match result.outcome {
            EntryOutcome::Existing => "Opened existing",
            EntryOutcome::Created => "Created",
            EntryOutcome::Updated => "Updated",
        };
        println!("{verb} entry");
        Self::print_entry(&result.entry);
    }

    pub fn print_entry(entry: &CatalogEntry) {
        let code = entry
            .entry_code
            .as_ref()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "(unsaved)".to_string());
        println!("{code}  {} {}", entry.scientific_name(), entry.taxon_chinese);
        println!("  taxon id: {}  rank: {}", entry.id, entry.taxon_rank);
        println!("  family: {}  genus: {}", entry.family, entry.genus);
        if !entry.notes.is_empty() {
            println!("  notes: {}", entry.notes);
        }
        for (stage, sets) in entry.stages.iter() {
            if sets.is_empty() {
                continue;
            }
            println!("  {}:", stage.label());
            for set in sets {
                let link = if set.inat_link.is_empty() {
                    String::new()
                } else {
                    format!("  {}", set.inat_link)
                };
                println!("    set {} ({} photos){link}", set.id, set.photos.len());
                for photo in &set.photos {
                    let gender = photo
                        .gender
                        .map(|gender| format!(" [{gender}]"))
                        .unwrap_or_default();
                    println!("      {} {}{gender}", photo.id, photo.name);
                }
            }
        }
        println!(
            "  last updated: {}",
            entry.last_updated.format("%Y-%m-%d %H:%M:%S")
        );
    }

    pub fn print_list(result: &ListResult) {
        if result.entries.is_empty() {
            println!("No entries");
        }
        for entry in &result.entries {
            println!(
                "{:<16} {:<10} {:<40} {:<16} {} set(s)",
                entry.entry_code.as_deref().unwrap_or("-"),
                entry.id,
                entry.scientific_name,
                entry.chinese_name,
                entry.photo_sets
            );
        }
    }

    pub fn print_removal(what: &str, removal: &Removal) {
        match removal {
            Removal::Removed { photos_discarded } => {
                println!("Removed {what} ({photos_discarded} photo record(s) discarded)")
            }
            Removal::NotFound => println!("Nothing to remove: {what} not found"),
        }
    }

    pub fn print_new_set(stage: Stage, set_id: &str) {
        println!("Added {stage} photo set {set_id}");
    }

    pub fn print_attach(report: &AttachReport) {
        println!(
            "Uploaded {} photo(s) to {}",
            report.photos.len(),
            report.display_path
        );
        for photo in &report.photos {
            println!(
                "  {} {}",
                photo.name,
                photo.drive_link.as_deref().unwrap_or_default()
            );
        }
    }

    pub fn print_stats(stats: &StatsResult) {
        println!("Entries:      {}", stats.entries);
        println!("Photo sets:   {}", stats.photo_sets);
        println!("Photos:       {}", stats.photos);
        println!("Indexed taxa: {}", stats.indexed_taxa);
        if stats.legacy_records > 0 {
            println!("Legacy records: {}", stats.legacy_records);
        }
        if let Some(record) = &stats.last_import {
            println!(
                "Last import:  {} ({})",
                record.filename,
                record.timestamp.format("%Y-%m-%d %H:%M")
            );
        }
    }

    pub fn print_gallery(gallery: &GalleryResult) {
        if gallery.items.is_empty() {
            println!("No adult photos yet");
        }
        for item in &gallery.items {
            println!("{} {}", item.scientific_name, item.chinese_name);
            let name = |photo: &Option<PhotoItem>| {
                photo
                    .as_ref()
                    .map(|photo| photo.name.clone())
                    .unwrap_or_else(|| "-".to_string())
            };
            println!(
                "  male: {}  female: {}  representative: {}",
                name(&item.male),
                name(&item.female),
                name(&item.representative)
            );
        }
    }

    pub fn print_settings(settings: &Settings) {
        if settings.drive_root_id.is_empty() {
            println!("Root folder id: (not set)");
        } else {
            println!("Root folder id: {}", settings.drive_root_id);
        }
    }
}
