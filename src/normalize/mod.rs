
mod markdown;

pub use markdown::html_to_markdown;

/// Canonical Markdown rendition of one help center article.
///
/// Produced deterministically from the fetched article; the rendered text
/// (header plus body) is what gets fingerprinted, backed up and chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    pub title: String,
    pub source_url: String,
    /// Markdown body, converted from the article's raw HTML
    pub body: String,
}

impl NormalizedDocument {
    /// Normalize raw article HTML into the canonical document form.
    #[inline]
    pub fn new(title: &str, source_url: &str, body_html: &str) -> Self {
        Self {
            title: title.to_string(),
            source_url: source_url.to_string(),
            body: html_to_markdown(body_html),
        }
    }

    /// Render the full document text: title line, source URL line, body.
    ///
    /// This exact byte sequence is the fingerprint input and the chunker
    /// input, so the header shape here and the chunker's header parsing
    /// must stay in lockstep.
    #[inline]
    pub fn to_markdown(&self) -> String {
        format!(
            "# {}\n\nArticle URL: {}\n\n{}\n",
            self.title, self.source_url, self.body
        )
    }

    /// Artifact base name derived from the title.
    #[inline]
    pub fn slug(&self) -> String {
        self.title.to_lowercase().replace(' ', "-")
    }
}
