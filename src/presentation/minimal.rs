//! Last-resort document generator. Plain string building only, so it has
//! nothing that can fail.

use std::fmt::Write as _;

use folio_render_types::PortfolioDocument;

pub fn minimal_document(document: &PortfolioDocument) -> String {
    let name = non_empty(&document.name).unwrap_or("Portfolio");
    let mut html = String::with_capacity(1024);

    html.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>{}</title>", escape(name));
    html.push_str("</head>\n<body data-portfolio-ready>\n<main>\n");

    let _ = writeln!(html, "<h1>{}</h1>", escape(name));
    if let Some(title) = non_empty(&document.title) {
        let _ = writeln!(html, "<p><strong>{}</strong></p>", escape(title));
    }
    if let Some(description) = non_empty(&document.description) {
        let _ = writeln!(html, "<p>{}</p>", escape(description));
    }

    let items: Vec<_> = document
        .items
        .iter()
        .filter_map(|item| non_empty(&item.title).map(|title| (title, non_empty(&item.summary))))
        .collect();
    if !items.is_empty() {
        html.push_str("<ul>\n");
        for (title, summary) in items {
            match summary {
                Some(summary) => {
                    let _ = writeln!(html, "<li>{}: {}</li>", escape(title), escape(summary));
                }
                None => {
                    let _ = writeln!(html, "<li>{}</li>", escape(title));
                }
            }
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</main>\n</body>\n</html>\n");
    html
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_render_types::PortfolioItem;

    #[test]
    fn renders_only_available_fields() {
        let document = PortfolioDocument {
            name: "Grace".to_string(),
            items: vec![
                PortfolioItem {
                    title: "COBOL".to_string(),
                    summary: String::new(),
                    url: None,
                },
                PortfolioItem::default(),
            ],
            ..PortfolioDocument::default()
        };

        let html = minimal_document(&document);
        assert!(html.contains("<h1>Grace</h1>"));
        assert!(html.contains("<li>COBOL</li>"));
        assert_eq!(html.matches("<li>").count(), 1);
        assert!(!html.contains("<strong>"));
    }

    #[test]
    fn empty_document_still_produces_a_page() {
        let html = minimal_document(&PortfolioDocument::default());
        assert!(html.contains("<h1>Portfolio</h1>"));
        assert!(!html.contains("<ul>"));
    }

    #[test]
    fn text_is_escaped() {
        let document = PortfolioDocument {
            name: "A & B <Studio>".to_string(),
            ..PortfolioDocument::default()
        };
        assert!(minimal_document(&document).contains("<h1>A &amp; B &lt;Studio&gt;</h1>"));
    }
}
