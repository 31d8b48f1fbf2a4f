use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent, TableChild,
    TableRowChild,
};
use std::path::Path;

use super::{ExtractError, Extraction, ExtractionDetails, Extractor, table::table_to_markdown};

/// Paragraph text and markdown tables from `.docx` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordExtractor;

impl Extractor for WordExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let bytes = std::fs::read(path)?;
        let docx = docx_rs::read_docx(&bytes).map_err(|err| ExtractError::Parse {
            format: "docx",
            message: err.to_string(),
        })?;

        let mut paragraphs = Vec::new();
        let mut tables = Vec::new();
        for child in &docx.document.children {
            match child {
                DocumentChild::Paragraph(paragraph) => {
                    let text = paragraph_text(paragraph);
                    if !text.trim().is_empty() {
                        paragraphs.push(text);
                    }
                }
                DocumentChild::Table(table) => {
                    let markdown = table_to_markdown(&table_rows(table));
                    if !markdown.is_empty() {
                        tables.push(markdown);
                    }
                }
                _ => {}
            }
        }

        let has_tables = !tables.is_empty();
        paragraphs.extend(tables);
        Ok(Extraction {
            text: paragraphs.join("\n\n"),
            details: ExtractionDetails {
                has_tables: Some(has_tables),
                ..ExtractionDetails::default()
            },
        })
    }
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

// Row and cell wrappers are single-variant enums in current docx-rs releases.
#[allow(irrefutable_let_patterns)]
fn table_rows(table: &Table) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row in &table.rows {
        let TableChild::TableRow(row) = row else {
            continue;
        };
        let mut cells = Vec::new();
        for cell in &row.cells {
            if let TableRowChild::TableCell(cell) = cell {
                let text: Vec<String> = cell
                    .children
                    .iter()
                    .filter_map(|content| match content {
                        TableCellContent::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
                        _ => None,
                    })
                    .collect();
                cells.push(text.join(" "));
            }
        }
        rows.push(cells);
    }
    rows
}
