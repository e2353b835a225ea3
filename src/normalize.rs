//! TaiCOL checklist import: turns the comma-delimited export into [`Taxon`]
//! records, keeping only rows whose `usage_status` is `accepted`.

use serde::Serialize;
use tracing::debug;

use crate::domain::{Rank, Taxon};

const DELIMITER: char = ',';
const QUOTE: char = '"';
const ACCEPTED: &str = "accepted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NotAccepted { status: String },
    TooFewFields { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// 1-based line number in the source text.
    pub line: usize,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeReport {
    pub taxa: Vec<Taxon>,
    pub skipped: Vec<SkippedRow>,
}

impl NormalizeReport {
    pub fn not_accepted_count(&self) -> usize {
        self.skipped
            .iter()
            .filter(|row| matches!(row.reason, SkipReason::NotAccepted { .. }))
            .count()
    }

    pub fn malformed_count(&self) -> usize {
        self.skipped
            .iter()
            .filter(|row| matches!(row.reason, SkipReason::TooFewFields { .. }))
            .count()
    }
}

/// Header positions of the columns we read. `None` when the column is absent.
#[derive(Debug, Default)]
struct Columns {
    usage_status: Option<usize>,
    taxon_id: Option<usize>,
    simple_name: Option<usize>,
    search_name: Option<usize>,
    common_name_c: Option<usize>,
    rank: Option<usize>,
    family: Option<usize>,
    genus: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Self {
        let find = |name: &str| header.iter().position(|column| column == name);
        Self {
            usage_status: find("usage_status"),
            taxon_id: find("taxon_id"),
            simple_name: find("simple_name"),
            search_name: find("search_name"),
            common_name_c: find("common_name_c"),
            rank: find("rank"),
            family: find("family"),
            genus: find("genus"),
        }
    }
}

pub fn normalize_taxa(raw: &str) -> Vec<Taxon> {
    normalize(raw).taxa
}

pub fn normalize(raw: &str) -> NormalizeReport {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = raw
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .enumerate();

    let mut report = NormalizeReport::default();
    let Some((_, header_line)) = lines.next() else {
        return report;
    };
    let header = split_line(header_line)
        .into_iter()
        .map(|name| name.trim().to_string())
        .collect::<Vec<_>>();
    let columns = Columns::from_header(&header);

    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let row = split_line(line);
        if row.len() < header.len() {
            report.skipped.push(SkippedRow {
                line: line_no,
                reason: SkipReason::TooFewFields {
                    expected: header.len(),
                    found: row.len(),
                },
            });
            continue;
        }

        let status = field(&row, columns.usage_status);
        if status.to_lowercase() != ACCEPTED {
            report.skipped.push(SkippedRow {
                line: line_no,
                reason: SkipReason::NotAccepted {
                    status: status.to_string(),
                },
            });
            continue;
        }

        report.taxa.push(build_taxon(&row, &columns));
    }

    debug!(
        accepted = report.taxa.len(),
        skipped = report.skipped.len(),
        "normalized reference table"
    );
    report
}

fn build_taxon(row: &[String], columns: &Columns) -> Taxon {
    let simple_name = field(row, columns.simple_name);
    let search_name = field(row, columns.search_name);
    let chinese_name = if search_name.is_empty() {
        field(row, columns.common_name_c)
    } else {
        search_name
    };

    let (species, subspecies) = split_epithets(simple_name);

    Taxon {
        taxon_id: field(row, columns.taxon_id).to_string(),
        scientific_name: simple_name.to_string(),
        chinese_name: chinese_name.to_string(),
        rank: Rank::from(field(row, columns.rank)),
        family: field(row, columns.family).to_string(),
        genus: field(row, columns.genus).to_string(),
        species,
        subspecies,
    }
}

/// Token 0 is the genus; token 1 the species epithet; the rest form the
/// subspecies.
pub fn split_epithets(scientific_name: &str) -> (Option<String>, Option<String>) {
    let tokens = scientific_name.split_whitespace().collect::<Vec<_>>();
    let species = tokens.get(1).map(|token| token.to_string());
    let subspecies = (tokens.len() > 2).then(|| tokens[2..].join(" "));
    (species, subspecies)
}

fn field(row: &[String], column: Option<usize>) -> &str {
    column
        .and_then(|index| row.get(index))
        .map(String::as_str)
        .unwrap_or("")
}

/// Splits one line on commas that are not inside a quoted field. Quotes
/// delimiting a field are dropped; `""` inside quotes is a literal quote.
pub fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            QUOTE if in_quotes && chars.peek() == Some(&QUOTE) => {
                current.push(QUOTE);
                chars.next();
            }
            QUOTE => in_quotes = !in_quotes,
            DELIMITER if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain_line() {
        assert_eq!(split_line("a,b,,c"), vec!["a", "b", "", "c"]);
    }

    #[test]
    fn split_keeps_commas_inside_quotes() {
        assert_eq!(
            split_line(r#"1,"Walker, 1865",accepted"#),
            vec!["1", "Walker, 1865", "accepted"]
        );
    }

    #[test]
    fn split_unescapes_doubled_quotes() {
        assert_eq!(
            split_line(r#""say ""hi""",x"#),
            vec![r#"say "hi""#, "x"]
        );
    }

    #[test]
    fn epithets_from_name() {
        assert_eq!(split_epithets("Bombyx"), (None, None));
        assert_eq!(
            split_epithets("Bombyx mori"),
            (Some("mori".to_string()), None)
        );
        assert_eq!(
            split_epithets("Genus species sub1 sub2"),
            (Some("species".to_string()), Some("sub1 sub2".to_string()))
        );
    }
}
