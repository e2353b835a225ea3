use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

const ENTRY_CODE_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Life-cycle stage a photo set was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Egg,
    Larva,
    Pupa,
    Adult,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Egg, Stage::Larva, Stage::Pupa, Stage::Adult];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Egg => "egg",
            Stage::Larva => "larva",
            Stage::Pupa => "pupa",
            Stage::Adult => "adult",
        }
    }

    /// Capitalized form used in exported checklists.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Egg => "Egg",
            Stage::Larva => "Larva",
            Stage::Pupa => "Pupa",
            Stage::Adult => "Adult",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "egg" => Ok(Stage::Egg),
            "larva" => Ok(Stage::Larva),
            "pupa" => Ok(Stage::Pupa),
            "adult" => Ok(Stage::Adult),
            _ => Err(CatalogError::InvalidStage(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Uncertain,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::Uncertain => write!(f, "uncertain"),
        }
    }
}

impl FromStr for Gender {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "uncertain" => Ok(Gender::Uncertain),
            _ => Err(CatalogError::InvalidGender(value.to_string())),
        }
    }
}

/// Taxonomic level of a checklist record. Known levels parse case-insensitively
/// and render in title case ("SPECIES" becomes `Species`); unknown levels keep
/// their spelling with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Rank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Superfamily,
    Family,
    Subfamily,
    Tribe,
    Genus,
    Subgenus,
    Species,
    Subspecies,
    Variety,
    Form,
    Other(String),
}

impl Rank {
    pub fn as_str(&self) -> &str {
        match self {
            Rank::Kingdom => "Kingdom",
            Rank::Phylum => "Phylum",
            Rank::Class => "Class",
            Rank::Order => "Order",
            Rank::Superfamily => "Superfamily",
            Rank::Family => "Family",
            Rank::Subfamily => "Subfamily",
            Rank::Tribe => "Tribe",
            Rank::Genus => "Genus",
            Rank::Subgenus => "Subgenus",
            Rank::Species => "Species",
            Rank::Subspecies => "Subspecies",
            Rank::Variety => "Variety",
            Rank::Form => "Form",
            Rank::Other(raw) => raw,
        }
    }
}

impl From<&str> for Rank {
    fn from(value: &str) -> Self {
        let value = value.trim();
        match value.to_lowercase().as_str() {
            "kingdom" => Rank::Kingdom,
            "phylum" => Rank::Phylum,
            "class" => Rank::Class,
            "order" => Rank::Order,
            "superfamily" => Rank::Superfamily,
            "family" => Rank::Family,
            "subfamily" => Rank::Subfamily,
            "tribe" => Rank::Tribe,
            "genus" => Rank::Genus,
            "subgenus" => Rank::Subgenus,
            "species" => Rank::Species,
            "subspecies" => Rank::Subspecies,
            "variety" => Rank::Variety,
            "form" => Rank::Form,
            _ => Rank::Other(value.to_string()),
        }
    }
}

impl From<String> for Rank {
    fn from(value: String) -> Self {
        Rank::from(value.as_str())
    }
}

impl From<Rank> for String {
    fn from(rank: Rank) -> Self {
        rank.as_str().to_string()
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted record of the reference checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub taxon_id: String,
    pub scientific_name: String,
    pub chinese_name: String,
    pub rank: Rank,
    pub family: String,
    pub genus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subspecies: Option<String>,
}

/// `Genus sp.`, `Genus species` or `Genus species subspecies`.
pub fn format_scientific_name(
    genus: &str,
    species: Option<&str>,
    subspecies: Option<&str>,
) -> String {
    let species = species.filter(|value| !value.is_empty());
    let subspecies = subspecies.filter(|value| !value.is_empty());
    match (species, subspecies) {
        (None, _) => format!("{genus} sp."),
        (Some(species), None) => format!("{genus} {species}"),
        (Some(species), Some(subspecies)) => format!("{genus} {species} {subspecies}"),
    }
}

/// Human-readable entry identifier, `YYYYMMDD-HHMMSS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryCode(String);

impl EntryCode {
    pub fn from_time(time: &DateTime<Local>) -> Self {
        Self(time.format(ENTRY_CODE_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryCode {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !is_valid_entry_code(trimmed) {
            return Err(CatalogError::InvalidEntryCode(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

fn is_valid_entry_code(value: &str) -> bool {
    let Some((date, time)) = value.split_once('-') else {
        return false;
    };
    let all_digits = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());
    if date.len() != 8 || time.len() != 6 || !all_digits(date) || !all_digits(time) {
        return false;
    }
    let field = |part: &str| part.parse::<u32>().unwrap_or(u32::MAX);
    let year = date[..4].parse::<i32>().unwrap_or(i32::MAX);
    let valid_date = NaiveDate::from_ymd_opt(year, field(&date[4..6]), field(&date[6..])).is_some();
    let valid_time =
        NaiveTime::from_hms_opt(field(&time[..2]), field(&time[2..4]), field(&time[4..])).is_some();
    valid_date && valid_time
}

impl TryFrom<String> for EntryCode {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntryCode> for String {
    fn from(code: EntryCode) -> Self {
        code.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoItem {
    pub id: String,
    pub url: String,
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_path_display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSet {
    pub id: String,
    #[serde(default)]
    pub inat_link: String,
    #[serde(default)]
    pub photos: Vec<PhotoItem>,
}

impl PhotoSet {
    pub fn new() -> Self {
        Self {
            id: new_opaque_id(),
            inat_link: String::new(),
            photos: Vec::new(),
        }
    }
}

impl Default for PhotoSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Photo sets per life stage. All four stages are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stages {
    #[serde(default)]
    pub egg: Vec<PhotoSet>,
    #[serde(default)]
    pub larva: Vec<PhotoSet>,
    #[serde(default)]
    pub pupa: Vec<PhotoSet>,
    #[serde(default)]
    pub adult: Vec<PhotoSet>,
}

impl Stages {
    pub fn get(&self, stage: Stage) -> &[PhotoSet] {
        match stage {
            Stage::Egg => &self.egg,
            Stage::Larva => &self.larva,
            Stage::Pupa => &self.pupa,
            Stage::Adult => &self.adult,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut Vec<PhotoSet> {
        match stage {
            Stage::Egg => &mut self.egg,
            Stage::Larva => &mut self.larva,
            Stage::Pupa => &mut self.pupa,
            Stage::Adult => &mut self.adult,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, &[PhotoSet])> {
        Stage::ALL.into_iter().map(move |stage| (stage, self.get(stage)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default, with = "optional_entry_code")]
    pub entry_code: Option<EntryCode>,
    pub taxon_name: String,
    pub taxon_chinese: String,
    pub taxon_rank: Rank,
    pub family: String,
    pub genus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subspecies: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub stages: Stages,
    #[serde(rename = "lastUpdated", with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl CatalogEntry {
    /// Unsaved entry carrying a copy of the taxon's classification.
    pub fn from_taxon(taxon: &Taxon, now: DateTime<Utc>) -> Self {
        Self {
            id: taxon.taxon_id.clone(),
            entry_code: None,
            taxon_name: taxon.scientific_name.clone(),
            taxon_chinese: taxon.chinese_name.clone(),
            taxon_rank: taxon.rank.clone(),
            family: taxon.family.clone(),
            genus: taxon.genus.clone(),
            species: taxon.species.clone(),
            subspecies: taxon.subspecies.clone(),
            notes: String::new(),
            stages: Stages::default(),
            last_updated: now,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.entry_code.is_some()
    }

    pub fn scientific_name(&self) -> String {
        format_scientific_name(
            &self.genus,
            self.species.as_deref(),
            self.subspecies.as_deref(),
        )
    }

    pub fn photo_set_count(&self) -> usize {
        self.stages.iter().map(|(_, sets)| sets.len()).sum()
    }

    pub fn photo_count(&self, stage: Stage) -> usize {
        self.stages
            .get(stage)
            .iter()
            .map(|set| set.photos.len())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    TaxonomyCsv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: String,
    pub filename: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub count: usize,
    #[serde(rename = "type")]
    pub kind: ImportKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub drive_root_id: String,
}

pub fn new_opaque_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

mod optional_entry_code {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::EntryCode;

    pub fn serialize<S: Serializer>(
        value: &Option<EntryCode>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_ref().map(EntryCode::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<EntryCode>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(D::Error::custom)
    }
}
