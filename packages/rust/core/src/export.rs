//! Decision export as pretty JSON or CSV.

use std::fmt::Write;

use tribunal_shared::{DecisionRecord, Result, TribunalError};

/// Output format for `query export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// CSV header, in row order.
pub const CSV_COLUMNS: [&str; 11] = [
    "identifier",
    "description",
    "ref_no",
    "body",
    "published_date",
    "link_to_doc",
    "partition_date",
    "scraped_at",
    "file_path",
    "file_hash",
    "downloaded_at",
];

/// Render `records` in `format`.
pub fn render_decisions(records: &[DecisionRecord], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(records)
            .map_err(|e| TribunalError::validation(format!("encode export: {e}"))),
        ExportFormat::Csv => Ok(decisions_to_csv(records)),
    }
}

/// One header row, then one row per record. Absent values are empty cells.
pub fn decisions_to_csv(records: &[DecisionRecord]) -> String {
    let mut out = String::new();
    write_row(&mut out, CSV_COLUMNS.iter().copied());

    for r in records {
        let artifact = r.artifact.as_ref();
        let scraped_at = r.scraped_at.to_rfc3339();
        let downloaded_at = artifact.map(|a| a.downloaded_at.to_rfc3339());
        write_row(
            &mut out,
            [
                r.identifier.as_str(),
                r.description.as_str(),
                r.ref_no.as_str(),
                r.body.as_str(),
                r.published_date.as_deref().unwrap_or_default(),
                r.link_to_doc.as_deref().unwrap_or_default(),
                r.partition_date.as_str(),
                scraped_at.as_str(),
                artifact.map(|a| a.file_path.as_str()).unwrap_or_default(),
                artifact.map(|a| a.file_hash.as_str()).unwrap_or_default(),
                downloaded_at.as_deref().unwrap_or_default(),
            ],
        );
    }
    out
}

fn needs_quotes(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
}

fn write_row<'a>(out: &mut String, cells: impl IntoIterator<Item = &'a str>) {
    for (i, cell) in cells.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if needs_quotes(cell) {
            let _ = write!(out, "\"{}\"", cell.replace('"', "\"\""));
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tribunal_shared::StoredArtifact;

    fn record(identifier: &str) -> DecisionRecord {
        DecisionRecord {
            identifier: identifier.into(),
            description: "Unfair dismissal".into(),
            ref_no: identifier.into(),
            body: "Workplace Relations Commission".into(),
            published_date: Some("15/01/2024".into()),
            link_to_doc: Some("https://example.com/doc".into()),
            partition_date: "2024-01".into(),
            scraped_at: Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap(),
            artifact: None,
        }
    }

    #[test]
    fn csv_has_header_and_empty_cells_for_missing_values() {
        let mut acquired = record("ADJ-1");
        acquired.artifact = Some(StoredArtifact {
            file_path: "2024-01/ADJ-1.pdf".into(),
            file_hash: "abc".into(),
            downloaded_at: Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap(),
        });
        let mut bare = record("ADJ-2");
        bare.published_date = None;
        bare.link_to_doc = None;

        let csv = decisions_to_csv(&[acquired, bare]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "ADJ-1,Unfair dismissal,ADJ-1,Workplace Relations Commission,15/01/2024,\
             https://example.com/doc,2024-01,2024-03-05T09:30:00+00:00,2024-01/ADJ-1.pdf,abc,\
             2024-03-06T00:00:00+00:00"
        );
        assert_eq!(
            lines[2],
            "ADJ-2,Unfair dismissal,ADJ-2,Workplace Relations Commission,,,2024-01,\
             2024-03-05T09:30:00+00:00,,,"
        );
        assert!(csv.ends_with('\n'));
    }

    #[test]
    fn csv_quotes_delimiters_quotes_and_newlines() {
        let mut r = record("ADJ-3");
        r.description = "Pay, \"bonus\" and\nleave".into();

        let csv = decisions_to_csv(&[r]);
        assert!(csv.contains(",\"Pay, \"\"bonus\"\" and\nleave\","));
    }

    #[test]
    fn empty_export_is_header_only() {
        assert_eq!(decisions_to_csv(&[]), format!("{}\n", CSV_COLUMNS.join(",")));
        assert_eq!(render_decisions(&[], ExportFormat::Json).unwrap(), "[]");
    }

    #[test]
    fn json_export_lists_records() {
        let json = render_decisions(&[record("ADJ-4")], ExportFormat::Json).unwrap();
        let parsed: Vec<DecisionRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].identifier, "ADJ-4");
    }
}
