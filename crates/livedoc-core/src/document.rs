//! Document identities and the plain-text document variants.

use crate::error::SyncResult;
use crate::sync::SyncDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which family of remote document an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Page,
    Translation,
    Canvas,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Page => "page",
            DocumentKind::Translation => "translation",
            DocumentKind::Canvas => "canvas",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-assigned numeric document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully qualified reference to a remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub kind: DocumentKind,
    pub id: DocumentId,
}

impl DocumentRef {
    pub fn new(kind: DocumentKind, id: u64) -> Self {
        Self {
            kind,
            id: DocumentId(id),
        }
    }

    pub fn page(id: u64) -> Self {
        Self::new(DocumentKind::Page, id)
    }

    pub fn translation(id: u64) -> Self {
        Self::new(DocumentKind::Translation, id)
    }

    pub fn canvas(id: u64) -> Self {
        Self::new(DocumentKind::Canvas, id)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// A point in time as unix seconds, the unit the server reports.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0.0);

    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    pub fn max(self, other: Timestamp) -> Timestamp {
        if other.0 > self.0 { other } else { self }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// A document as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    /// Serialized payload.
    pub content: String,
    /// When the server last saw this content change, if it says.
    pub last_edit_time: Option<Timestamp>,
}

/// A plain-text document with a caret, shared by pages and translations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBuffer {
    content: String,
    /// Byte offset of the caret, always on a char boundary.
    caret: usize,
    changed: bool,
}

impl TextBuffer {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let caret = content.len();
        Self {
            content,
            caret,
            changed: false,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    /// Move the caret, snapping back to the nearest char boundary.
    pub fn set_caret(&mut self, offset: usize) {
        self.caret = floor_char_boundary(&self.content, offset);
    }

    /// Replace the whole text as the user typed it.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.set_caret(self.caret);
        self.changed = true;
    }

    /// Insert `text` at the caret and move the caret past it.
    pub fn insert_at_caret(&mut self, text: &str) {
        self.content.insert_str(self.caret, text);
        self.caret += text.len();
        self.changed = true;
    }

    fn replace(&mut self, content: &str) {
        self.content = content.to_owned();
        self.set_caret(self.caret);
    }

    fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Markdown fragment that embeds an uploaded image.
pub fn markdown_image(url: &str) -> String {
    format!("\n\n![image]({url})\n\n")
}

/// A project page: free markdown text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDocument {
    pub text: TextBuffer,
}

impl PageDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            text: TextBuffer::new(content),
        }
    }
}

/// A translation of a page into another language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationDocument {
    pub text: TextBuffer,
    /// Language the translation is written in.
    pub language: Option<String>,
}

impl TranslationDocument {
    pub fn new(content: impl Into<String>, language: Option<String>) -> Self {
        Self {
            text: TextBuffer::new(content),
            language,
        }
    }
}

/// Access to the text buffer of a text document.
pub trait TextDocument: SyncDocument {
    fn text(&self) -> &TextBuffer;
    fn text_mut(&mut self) -> &mut TextBuffer;
}

macro_rules! text_document {
    ($ty:ty) => {
        impl SyncDocument for $ty {
            fn serialize_content(&self) -> SyncResult<String> {
                Ok(self.text.content.clone())
            }

            fn replace_content(&mut self, content: &str) -> SyncResult<()> {
                self.text.replace(content);
                Ok(())
            }

            fn take_changed(&mut self) -> bool {
                self.text.take_changed()
            }
        }

        impl TextDocument for $ty {
            fn text(&self) -> &TextBuffer {
                &self.text
            }

            fn text_mut(&mut self) -> &mut TextBuffer {
                &mut self.text
            }
        }
    };
}

text_document!(PageDocument);
text_document!(TranslationDocument);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_moves_caret_past_insertion() {
        let mut page = PageDocument::new("hello world");
        page.text.set_caret(5);
        page.text.insert_at_caret(&markdown_image("/api/images/image?id=3"));
        assert_eq!(
            page.text.content(),
            "hello\n\n![image](/api/images/image?id=3)\n\n world"
        );
        assert_eq!(&page.text.content()[page.text.caret()..], " world");
        assert!(page.take_changed());
        assert!(!page.take_changed());
    }

    #[test]
    fn test_caret_snaps_to_char_boundary() {
        let mut buffer = TextBuffer::new("añb");
        buffer.set_caret(2);
        assert_eq!(buffer.caret(), 1);
        buffer.set_caret(100);
        assert_eq!(buffer.caret(), buffer.content().len());
    }

    #[test]
    fn test_replace_is_not_a_local_change() {
        let mut doc = TranslationDocument::new("bonjour", Some("fr".into()));
        doc.replace_content("salut").unwrap();
        assert_eq!(doc.serialize_content().unwrap(), "salut");
        assert!(!doc.take_changed());
        assert_eq!(doc.text.caret(), 5);
    }

    #[test]
    fn test_timestamp_max_and_display() {
        let a = Timestamp::from_secs(10.0);
        let b = Timestamp::from_secs(12.5);
        assert_eq!(a.max(b), b);
        assert_eq!(b.max(a), b);
        assert_eq!(DocumentRef::canvas(7).to_string(), "canvas#7");
    }
}
