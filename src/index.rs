use crate::domain::Taxon;

pub const MAX_RESULTS: usize = 50;

/// Lower-cased copies of the searchable fields of one taxon.
#[derive(Debug, Clone)]
struct SearchKey {
    fields: [String; 5],
}

impl SearchKey {
    fn new(taxon: &Taxon) -> Self {
        Self {
            fields: [
                taxon.scientific_name.to_lowercase(),
                taxon.chinese_name.to_lowercase(),
                taxon.family.to_lowercase(),
                taxon.genus.to_lowercase(),
                taxon.rank.as_str().to_lowercase(),
            ],
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.fields.iter().any(|field| field.contains(needle))
    }
}

/// In-memory checklist index. Each import replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct TaxonIndex {
    taxa: Vec<Taxon>,
    keys: Vec<SearchKey>,
}

impl TaxonIndex {
    pub fn new(taxa: Vec<Taxon>) -> Self {
        let keys = taxa.iter().map(SearchKey::new).collect();
        Self { taxa, keys }
    }

    pub fn replace(&mut self, taxa: Vec<Taxon>) {
        *self = Self::new(taxa);
    }

    /// Case-insensitive substring match over scientific name, Chinese name,
    /// family, genus and rank. Returns at most [`MAX_RESULTS`] taxa in index
    /// order.
    pub fn search(&self, query: &str) -> Vec<&Taxon> {
        if query.is_empty() || self.taxa.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.taxa
            .iter()
            .zip(&self.keys)
            .filter(|(_, key)| key.matches(&needle))
            .map(|(taxon, _)| taxon)
            .take(MAX_RESULTS)
            .collect()
    }

    pub fn get(&self, taxon_id: &str) -> Option<&Taxon> {
        self.taxa.iter().find(|taxon| taxon.taxon_id == taxon_id)
    }

    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    pub fn into_taxa(self) -> Vec<Taxon> {
        self.taxa
    }
}

impl From<Vec<Taxon>> for TaxonIndex {
    fn from(taxa: Vec<Taxon>) -> Self {
        Self::new(taxa)
    }
}
