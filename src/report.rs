//! Admin report rows built from stored result documents.

use serde::Serialize;

use crate::record::ResultDocument;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub id: String,
    pub name: String,
    pub class_name: Option<String>,
    pub score: u32,
    pub total_rounds: usize,
    pub rounds_played: usize,
    /// Share of played rounds answered correctly, 0 when nothing was played.
    pub accuracy_pct: f64,
    /// Longest sequence the student was shown.
    pub longest_sequence: usize,
    pub timestamp: String,
}

impl ReportRow {
    /// Row for a document, or `None` if the student never finished this game.
    pub fn from_document(id: &str, doc: &ResultDocument) -> Option<Self> {
        let section = doc.rabbit_path.as_ref()?;
        let accuracy_pct = if section.rounds_played == 0 {
            0.0
        } else {
            f64::from(section.score) / section.rounds_played as f64 * 100.0
        };
        Some(Self {
            id: id.to_owned(),
            name: doc.name.clone(),
            class_name: doc.class_name.clone(),
            score: section.score,
            total_rounds: section.total_rounds,
            rounds_played: section.rounds_played,
            accuracy_pct,
            longest_sequence: section
                .history
                .iter()
                .map(|r| r.sequence.len())
                .max()
                .unwrap_or(0),
            timestamp: section.timestamp.clone(),
        })
    }
}

/// Rows for every document with a rabbit-path section, newest first.
///
/// Timestamps are RFC 3339 in UTC, so string order is time order.
pub fn build_report<I>(documents: I) -> Vec<ReportRow>
where
    I: IntoIterator<Item = (String, ResultDocument)>,
{
    let mut rows: Vec<ReportRow> = documents
        .into_iter()
        .filter_map(|(id, doc)| ReportRow::from_document(&id, &doc))
        .collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows
}

/// Keep only rows for `class_name`. An empty filter keeps everything.
pub fn filter_class<'a>(rows: &'a [ReportRow], class_name: &str) -> Vec<&'a ReportRow> {
    if class_name.is_empty() {
        return rows.iter().collect();
    }
    rows.iter()
        .filter(|row| row.class_name.as_deref() == Some(class_name))
        .collect()
}
