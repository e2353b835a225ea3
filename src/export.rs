use std::cmp::Ordering;
use std::io::Write;

use chrono::SecondsFormat;

use crate::domain::{CatalogEntry, Gender, Stage};
use crate::error::CatalogError;

const BOM: &[u8] = "\u{feff}".as_bytes();

pub const EXPORT_HEADERS: [&str; 17] = [
    "Entry Code",
    "Family",
    "Genus",
    "Species",
    "Subspecies",
    "Scientific Name",
    "Chinese Name",
    "Rank",
    "Stages Seen",
    "egg_photos_count",
    "larva_photos_count",
    "pupa_photos_count",
    "adult_photos_count",
    "has_male_adult",
    "has_female_adult",
    "iNaturalist Links",
    "Last Updated",
];

/// Family, genus, species, subspecies; each compared case-insensitively.
pub fn taxonomic_order(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    let key = |entry: &CatalogEntry| {
        [
            entry.family.to_lowercase(),
            entry.genus.to_lowercase(),
            entry.species.as_deref().unwrap_or_default().to_lowercase(),
            entry.subspecies.as_deref().unwrap_or_default().to_lowercase(),
        ]
    };
    key(a).cmp(&key(b))
}

pub fn sorted_for_export(entries: &[CatalogEntry]) -> Vec<&CatalogEntry> {
    let mut sorted = entries.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| taxonomic_order(a, b));
    sorted
}

/// Writes the checklist as UTF-8 CSV with a byte-order mark, one row per entry.
pub fn write_checklist<W: Write>(entries: &[CatalogEntry], mut out: W) -> Result<usize, CatalogError> {
    out.write_all(BOM)
        .map_err(|err| CatalogError::Export(err.to_string()))?;
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(EXPORT_HEADERS)
        .map_err(|err| CatalogError::Export(err.to_string()))?;

    let sorted = sorted_for_export(entries);
    for entry in &sorted {
        writer
            .write_record(checklist_row(entry))
            .map_err(|err| CatalogError::Export(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| CatalogError::Export(err.to_string()))?;
    Ok(sorted.len())
}

pub fn checklist_row(entry: &CatalogEntry) -> Vec<String> {
    let stages_seen = entry
        .stages
        .iter()
        .filter(|(_, sets)| !sets.is_empty())
        .map(|(stage, _)| stage.label())
        .collect::<Vec<_>>()
        .join("|");
    let has_adult = |gender: Gender| {
        let found = entry
            .stages
            .adult
            .iter()
            .any(|set| set.photos.iter().any(|photo| photo.gender == Some(gender)));
        if found { "Yes" } else { "No" }.to_string()
    };
    let links = entry
        .stages
        .iter()
        .flat_map(|(_, sets)| sets.iter())
        .map(|set| set.inat_link.trim())
        .filter(|link| !link.is_empty())
        .collect::<Vec<_>>()
        .join(" ; ");

    let mut row = vec![
        entry
            .entry_code
            .as_ref()
            .map(|code| code.to_string())
            .unwrap_or_default(),
        entry.family.clone(),
        entry.genus.clone(),
        entry.species.clone().unwrap_or_default(),
        entry.subspecies.clone().unwrap_or_default(),
        entry.scientific_name(),
        entry.taxon_chinese.clone(),
        entry.taxon_rank.to_string(),
        stages_seen,
    ];
    row.extend(
        Stage::ALL
            .into_iter()
            .map(|stage| entry.photo_count(stage).to_string()),
    );
    row.push(has_adult(Gender::Male));
    row.push(has_adult(Gender::Female));
    row.push(links);
    row.push(
        entry
            .last_updated
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    row
}
