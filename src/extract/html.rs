use scraper::{Html, Selector};
use std::path::Path;

use super::{ExtractError, Extraction, ExtractionDetails, Extractor, text::decode_text};

/// Elements whose text never reaches the output.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Visible text of an HTML page.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let bytes = std::fs::read(path)?;
        let html = decode_text(&bytes);
        Ok(Extraction {
            text: html_to_text(&html)?,
            details: ExtractionDetails::default(),
        })
    }
}

fn html_to_text(html: &str) -> Result<String, ExtractError> {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").map_err(|err| ExtractError::Parse {
        format: "html",
        message: err.to_string(),
    })?;
    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut content = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name().to_string()))
            .is_some_and(|name| SKIPPED_ELEMENTS.contains(&name.as_str()));
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !content.is_empty() {
            content.push(' ');
        }
        content.push_str(trimmed);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_visible_body_text_only() {
        let html = r#"<!doctype html><html><head><title>Ignored</title>
            <style>p { color: red }</style></head>
            <body><h1>Amazon S3</h1><script>var x = 1;</script>
            <p>Buckets hold <b>objects</b>.</p></body></html>"#;
        assert_eq!(html_to_text(html).unwrap(), "Amazon S3 Buckets hold objects .");
    }

    #[test]
    fn fragment_without_body_still_yields_text() {
        assert_eq!(html_to_text("<p>loose text</p>").unwrap(), "loose text");
    }
}
