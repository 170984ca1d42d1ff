use askama::Template;
use folio_render_types::PortfolioDocument;

use crate::application::render::{RenderMode, TemplateError, TemplateRenderer};

/// Template ids understood by [`AskamaTemplateRenderer`].
pub const TEMPLATE_IDS: &[&str] = &["classic", "gallery"];

#[derive(Clone)]
pub struct PortfolioItemView {
    pub title: String,
    pub summary: String,
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct PortfolioView {
    pub mode: &'static str,
    pub print: bool,
    pub theme: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub items: Vec<PortfolioItemView>,
}

impl PortfolioView {
    pub fn new(mode: RenderMode, document: &PortfolioDocument) -> Self {
        Self {
            mode: mode.as_str(),
            print: mode.is_print(),
            theme: document
                .theme
                .as_deref()
                .map(str::trim)
                .filter(|theme| !theme.is_empty())
                .unwrap_or("light")
                .to_string(),
            name: document.name.trim().to_string(),
            title: document.title.trim().to_string(),
            description: document.description.trim().to_string(),
            contact_email: non_blank(document.contact_email.as_deref()),
            items: document
                .items
                .iter()
                .map(|item| PortfolioItemView {
                    title: item.title.trim().to_string(),
                    summary: item.summary.trim().to_string(),
                    url: non_blank(item.url.as_deref()),
                })
                .collect(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Template)]
#[template(path = "portfolio/classic.html")]
pub struct ClassicTemplate {
    pub view: PortfolioView,
}

#[derive(Template)]
#[template(path = "portfolio/gallery.html")]
pub struct GalleryTemplate {
    pub view: PortfolioView,
}

/// Renders portfolio documents with the compiled askama templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AskamaTemplateRenderer;

impl TemplateRenderer for AskamaTemplateRenderer {
    fn render(
        &self,
        template: &str,
        mode: RenderMode,
        document: &PortfolioDocument,
    ) -> Result<String, TemplateError> {
        let view = PortfolioView::new(mode, document);
        let rendered = match template.trim().to_ascii_lowercase().as_str() {
            "classic" | "default" => ClassicTemplate { view }.render(),
            "gallery" => GalleryTemplate { view }.render(),
            _ => return Err(TemplateError::UnknownTemplate(template.to_string())),
        };

        rendered.map_err(|err| TemplateError::Render {
            template: template.to_string(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::testing::sample_document;

    #[test]
    fn classic_template_renders_document_fields() {
        let html = AskamaTemplateRenderer
            .render("classic", RenderMode::Site, &sample_document())
            .expect("classic renders");

        assert!(html.contains("data-portfolio-ready"));
        assert!(html.contains("<h1>Ada Lovelace</h1>"));
        assert!(html.contains("href=\"https://example.com/note-g\""));
        assert!(html.contains("mailto:ada@example.com"));
        assert!(!html.contains("@page"));
    }

    #[test]
    fn print_mode_adds_print_styles() {
        let html = AskamaTemplateRenderer
            .render("gallery", RenderMode::Print, &sample_document())
            .expect("gallery renders");
        assert!(html.contains("@page"));
        assert!(html.contains("data-mode=\"print\""));
    }

    #[test]
    fn document_text_is_escaped() {
        let mut document = sample_document();
        document.name = "<script>alert(1)</script>".to_string();
        let html = AskamaTemplateRenderer
            .render("classic", RenderMode::Preview, &document)
            .expect("classic renders");
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        let err = AskamaTemplateRenderer
            .render("brutalist", RenderMode::Site, &sample_document())
            .expect_err("template is unknown");
        assert_eq!(err, TemplateError::UnknownTemplate("brutalist".to_string()));
    }
}
