//! In-memory structured document produced by a converter.
//!
//! A [`StructuredDocument`] is a flat, ordered sequence of [`DocItem`]s in
//! reading order. Each item carries a stable `self_ref` in the form
//! `#/{collection}/{index}`: text-like items live in `#/texts/…`, pictures in
//! `#/pictures/…`. Indices are 0-based and assigned in push order, so the Nth
//! picture pushed is always `#/pictures/N`. The positional fallback in
//! [`crate::pipeline::rewrite`] depends on that numbering.

use image::DynamicImage;

/// Self-reference prefix for picture items.
pub const PICTURES_REF_PREFIX: &str = "#/pictures/";

/// Self-reference prefix for text-like items.
pub const TEXTS_REF_PREFIX: &str = "#/texts/";

/// Canonical self-reference of the picture at `index`.
pub fn picture_ref(index: usize) -> String {
    format!("{PICTURES_REF_PREFIX}{index}")
}

/// One element of a [`StructuredDocument`].
#[derive(Debug, Clone)]
pub struct DocItem {
    /// Stable identifier, unique within the document.
    pub self_ref: String,
    /// 1-indexed source page, when known.
    pub page_no: Option<usize>,
    pub kind: ItemKind,
}

/// What an item is.
#[derive(Debug, Clone)]
pub enum ItemKind {
    Title(String),
    /// Section heading; `level` 1 is the top level.
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem(String),
    Picture(PictureItem),
}

/// A picture element. `image` is `None` when the converter found the object
/// but could not decode its pixels.
#[derive(Debug, Clone, Default)]
pub struct PictureItem {
    pub image: Option<DynamicImage>,
    pub caption: Option<String>,
}

impl DocItem {
    /// The picture payload, if this item is a picture.
    pub fn as_picture(&self) -> Option<&PictureItem> {
        match &self.kind {
            ItemKind::Picture(p) => Some(p),
            _ => None,
        }
    }
}

/// Ordered document tree flattened to reading order.
#[derive(Debug, Clone, Default)]
pub struct StructuredDocument {
    /// Source name, usually the sanitised upload basename.
    pub name: String,
    items: Vec<DocItem>,
    text_count: usize,
    picture_count: usize,
}

impl StructuredDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn push_title(&mut self, page_no: Option<usize>, text: impl Into<String>) -> &str {
        self.push_text(page_no, ItemKind::Title(text.into()))
    }

    pub fn push_heading(
        &mut self,
        page_no: Option<usize>,
        level: u8,
        text: impl Into<String>,
    ) -> &str {
        self.push_text(
            page_no,
            ItemKind::Heading {
                level,
                text: text.into(),
            },
        )
    }

    pub fn push_paragraph(&mut self, page_no: Option<usize>, text: impl Into<String>) -> &str {
        self.push_text(page_no, ItemKind::Paragraph(text.into()))
    }

    pub fn push_list_item(&mut self, page_no: Option<usize>, text: impl Into<String>) -> &str {
        self.push_text(page_no, ItemKind::ListItem(text.into()))
    }

    /// Append a picture and return its self-reference.
    pub fn push_picture(
        &mut self,
        page_no: Option<usize>,
        image: Option<DynamicImage>,
        caption: Option<String>,
    ) -> &str {
        let self_ref = picture_ref(self.picture_count);
        self.picture_count += 1;
        self.push_item(DocItem {
            self_ref,
            page_no,
            kind: ItemKind::Picture(PictureItem { image, caption }),
        })
    }

    fn push_text(&mut self, page_no: Option<usize>, kind: ItemKind) -> &str {
        let self_ref = format!("{TEXTS_REF_PREFIX}{}", self.text_count);
        self.text_count += 1;
        self.push_item(DocItem {
            self_ref,
            page_no,
            kind,
        })
    }

    fn push_item(&mut self, item: DocItem) -> &str {
        self.items.push(item);
        // Just pushed, so `last()` is always Some.
        self.items.last().map(|i| i.self_ref.as_str()).unwrap_or_default()
    }

    /// All items in document order.
    pub fn iterate_items(&self) -> impl Iterator<Item = &DocItem> {
        self.items.iter()
    }

    /// Picture items in document order.
    pub fn pictures(&self) -> impl Iterator<Item = (&DocItem, &PictureItem)> {
        self.items
            .iter()
            .filter_map(|item| item.as_picture().map(|p| (item, p)))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn picture_count(&self) -> usize {
        self.picture_count
    }
}
