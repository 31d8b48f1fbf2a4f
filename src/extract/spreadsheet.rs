use calamine::{Data, Reader};
use std::io::Cursor;
use std::path::Path;

use super::{
    ExtractError, Extraction, ExtractionDetails, Extractor, table::table_to_markdown,
    text::decode_text,
};

/// CSV files and Excel workbooks rendered as markdown tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetExtractor;

impl Extractor for SpreadsheetExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let bytes = std::fs::read(path)?;
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            extract_csv(&bytes)
        } else {
            extract_workbook(bytes)
        }
    }
}

fn extract_csv(bytes: &[u8]) -> Result<Extraction, ExtractError> {
    let text = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ExtractError::Parse {
            format: "csv",
            message: err.to_string(),
        })?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let markdown = table_to_markdown(&rows);
    Ok(Extraction {
        details: ExtractionDetails {
            has_tables: Some(!markdown.is_empty()),
            ..ExtractionDetails::default()
        },
        text: markdown,
    })
}

fn extract_workbook(bytes: Vec<u8>) -> Result<Extraction, ExtractError> {
    let mut workbook =
        calamine::open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|err| {
            ExtractError::Parse {
                format: "spreadsheet",
                message: err.to_string(),
            }
        })?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut sections = Vec::new();
    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(range) => range,
            Err(err) => {
                tracing::warn!(sheet = %name, error = %err, "Skipping unreadable sheet");
                continue;
            }
        };
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        let markdown = table_to_markdown(&rows);
        if !markdown.is_empty() {
            sections.push(format!("Sheet: {name}\n\n{markdown}"));
        }
    }

    Ok(Extraction {
        details: ExtractionDetails {
            has_tables: Some(!sections.is_empty()),
            sheet_count: u32::try_from(sheet_names.len()).ok(),
            ..ExtractionDetails::default()
        },
        text: sections.join("\n\n"),
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_becomes_markdown_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.csv");
        std::fs::write(&path, "service,limit\nlambda,15 min\n,\ns3,\"5 TB, per object\"\n")
            .unwrap();

        let extraction = SpreadsheetExtractor.extract(&path).unwrap();
        assert_eq!(
            extraction.text,
            "| service | limit |\n| --- | --- |\n| lambda | 15 min |\n| s3 | 5 TB, per object |\n"
        );
        assert_eq!(extraction.details.has_tables, Some(true));
        assert_eq!(extraction.details.sheet_count, None);
    }

    #[test]
    fn empty_csv_has_no_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();
        let extraction = SpreadsheetExtractor.extract(&path).unwrap();
        assert!(extraction.text.is_empty());
        assert_eq!(extraction.details.has_tables, Some(false));
    }

    #[test]
    fn invalid_workbook_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"definitely not a workbook").unwrap();
        let error = SpreadsheetExtractor.extract(&path).unwrap_err();
        assert!(matches!(error, ExtractError::Parse { format: "spreadsheet", .. }));
    }
}
