//! Placeholder and sentinel detection on generated documents.

use folio_render_types::ContentWarning;

const DEFAULT_MARKERS: &[&str] = &[
    "lorem ipsum",
    "[your name]",
    "your name here",
    "[placeholder]",
    "{{",
    "}}",
    "coming soon",
    "undefined",
    "[object object]",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Case-insensitive scan for markers that indicate unfinished content.
///
/// Only visible text is scanned. Tags, attributes and the bodies of
/// `<script>` and `<style>` elements are skipped.
#[derive(Debug, Clone)]
pub struct ContentCheck {
    markers: Vec<String>,
}

impl Default for ContentCheck {
    fn default() -> Self {
        Self::with_markers(DEFAULT_MARKERS.iter().copied())
    }
}

impl ContentCheck {
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let markers = markers
            .into_iter()
            .map(|marker| marker.as_ref().trim().to_lowercase())
            .filter(|marker| !marker.is_empty())
            .collect();
        Self { markers }
    }

    pub fn inspect(&self, html: &str) -> Vec<ContentWarning> {
        let haystack = visible_text(&html.to_lowercase());
        self.markers
            .iter()
            .filter_map(|marker| {
                let occurrences = haystack.matches(marker.as_str()).count();
                (occurrences > 0).then(|| ContentWarning {
                    marker: marker.clone(),
                    occurrences,
                })
            })
            .collect()
    }
}

/// Text content of already lowercased markup.
fn visible_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        let tag = &rest[start..];

        let body_end = RAW_TEXT_ELEMENTS.iter().find_map(|name| {
            let after_name = tag[1..].strip_prefix(name)?;
            if !after_name.starts_with(|c: char| c == '>' || c == '/' || c.is_ascii_whitespace()) {
                return None;
            }
            let closing = format!("</{name}");
            Some(tag.find(&closing).map_or(tag.len(), |at| at + closing.len()))
        });

        match body_end {
            Some(end) => {
                let after = &tag[end..];
                rest = after.find('>').map_or("", |at| &after[at + 1..]);
            }
            None => match tag.find('>') {
                Some(at) => rest = &tag[at + 1..],
                None => {
                    text.push_str(tag);
                    rest = "";
                }
            },
        }
    }

    text.push_str(rest);
    text
}
