//! Markdown rendering for tabular content found in documents.

/// Render rows as a markdown table. The first row is the header; blank rows are skipped.
///
/// Returns an empty string when there is no header row.
pub fn table_to_markdown(rows: &[Vec<String>]) -> String {
    let Some(header) = rows.first().filter(|row| !row.is_empty()) else {
        return String::new();
    };

    let mut markdown = render_row(header);
    markdown.push_str(&render_row(&vec!["---".to_string(); header.len()]));
    for row in rows.iter().skip(1) {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        markdown.push_str(&render_row(row));
    }
    markdown
}

fn render_row(cells: &[String]) -> String {
    let cells: Vec<String> = cells.iter().map(|cell| escape_cell(cell)).collect();
    format!("| {} |\n", cells.join(" | "))
}

fn escape_cell(cell: &str) -> String {
    cell.trim().replace('|', "\\|").replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn renders_header_separator_and_rows() {
        let table = rows(&[&["Service", "Limit"], &["Lambda", "15 min"], &["", ""], &["S3", "5 TB"]]);
        assert_eq!(
            table_to_markdown(&table),
            "| Service | Limit |\n| --- | --- |\n| Lambda | 15 min |\n| S3 | 5 TB |\n"
        );
    }

    #[test]
    fn empty_table_renders_nothing() {
        assert_eq!(table_to_markdown(&[]), "");
        assert_eq!(table_to_markdown(&[Vec::new()]), "");
    }

    #[test]
    fn escapes_pipes_and_newlines() {
        let table = rows(&[&["a|b"], &["line\nbreak"]]);
        assert_eq!(
            table_to_markdown(&table),
            "| a\\|b |\n| --- |\n| line break |\n"
        );
    }
}
