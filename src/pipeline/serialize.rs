//! Markdown serialization of a [`StructuredDocument`].
//!
//! Text items map onto plain Markdown blocks. Pictures are rendered according
//! to [`ImageRefMode`]; see that type for what each mode emits. In
//! `Referenced` mode picture files are written to an artifacts directory and
//! named `image_{index:06}_{token}.png`, where `index` is the picture's
//! position in `#/pictures`. [`crate::pipeline::rewrite`] reads that index
//! back to find the exported URL.

use crate::config::ImageRefMode;
use crate::document::{DocItem, ItemKind, PictureItem, StructuredDocument, PICTURES_REF_PREFIX};
use crate::error::ConvertError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Emitted where a picture cannot or should not be linked.
pub const IMAGE_PLACEHOLDER: &str = "<!-- image -->";

/// Alt text used for pictures without a caption.
pub const DEFAULT_ALT: &str = "Image";

/// Render `document` as Markdown.
///
/// `artifacts_dir` is only touched in [`ImageRefMode::Referenced`]; it is
/// created on the first picture written. Links are relative to the
/// directory containing `artifacts_dir`.
pub fn serialize_markdown(
    document: &StructuredDocument,
    mode: ImageRefMode,
    artifacts_dir: &Path,
) -> Result<String, ConvertError> {
    let mut blocks: Vec<String> = Vec::with_capacity(document.len());

    for item in document.iterate_items() {
        let block = match &item.kind {
            ItemKind::Title(text) => format!("# {}", text.trim()),
            ItemKind::Heading { level, text } => {
                let level = (*level).clamp(1, 6) as usize;
                format!("{} {}", "#".repeat(level), text.trim())
            }
            ItemKind::Paragraph(text) => text.trim().to_string(),
            ItemKind::ListItem(text) => format!("- {}", text.trim()),
            ItemKind::Picture(picture) => picture_block(item, picture, mode, artifacts_dir)?,
        };
        if !block.is_empty() {
            blocks.push(block);
        }
    }

    let mut markdown = blocks.join("\n\n");
    markdown.push('\n');
    Ok(markdown)
}

fn picture_block(
    item: &DocItem,
    picture: &PictureItem,
    mode: ImageRefMode,
    artifacts_dir: &Path,
) -> Result<String, ConvertError> {
    let alt = picture
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_ALT);

    let block = match (mode, picture.image.as_ref()) {
        (ImageRefMode::SelfRef, _) => format!("![{alt}]({})", item.self_ref),
        (ImageRefMode::Placeholder, _) | (_, None) => IMAGE_PLACEHOLDER.to_string(),
        (ImageRefMode::Embedded, Some(img)) => {
            let uri = data_uri(img).map_err(|e| ConvertError::Internal(format!(
                "PNG encoding failed for {}: {e}",
                item.self_ref
            )))?;
            format!("![{alt}]({uri})")
        }
        (ImageRefMode::Referenced, Some(img)) => {
            let index = picture_index(&item.self_ref)?;
            let link = write_artifact(img, index, artifacts_dir)?;
            format!("![{alt}]({link})")
        }
    };
    Ok(block)
}

/// Position of a picture in `#/pictures`, read back from its self-reference.
fn picture_index(self_ref: &str) -> Result<usize, ConvertError> {
    self_ref
        .strip_prefix(PICTURES_REF_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| ConvertError::Internal(format!("'{self_ref}' is not a picture reference")))
}

/// Write one picture into the artifacts directory; return its relative link.
fn write_artifact(
    img: &DynamicImage,
    index: usize,
    artifacts_dir: &Path,
) -> Result<String, ConvertError> {
    std::fs::create_dir_all(artifacts_dir).map_err(|e| ConvertError::ArtifactWriteFailed {
        path: artifacts_dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let token = Uuid::new_v4().simple().to_string();
    let filename = format!("image_{index:06}_{}.png", &token[..16]);
    let path = artifacts_dir.join(&filename);

    img.save_with_format(&path, ImageFormat::Png)
        .map_err(|e| ConvertError::ArtifactWriteFailed {
            path: path.clone(),
            detail: e.to_string(),
        })?;
    debug!("Wrote artifact {}", path.display());

    let dir_name = artifacts_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(if dir_name.is_empty() {
        filename
    } else {
        format!("{dir_name}/{filename}")
    })
}

/// Encode a picture as a `data:image/png;base64,…` URI.
///
/// PNG is lossless, so line art and text inside figures stay crisp.
pub fn data_uri(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(format!("data:image/png;base64,{b64}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rewrite::extract_ordinal;
    use image::{Rgba, RgbaImage};

    fn pixel() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])))
    }

    fn sample() -> StructuredDocument {
        let mut doc = StructuredDocument::new("sample");
        doc.push_title(Some(1), "Report");
        doc.push_heading(Some(1), 2, "Intro");
        doc.push_paragraph(Some(1), "  Body text.  ");
        doc.push_picture(Some(1), Some(pixel()), Some("Figure 1".into()));
        doc.push_list_item(Some(2), "point");
        doc.push_picture(Some(2), None, None);
        doc.push_picture(Some(2), Some(pixel()), None);
        doc
    }

    #[test]
    fn self_ref_mode_links_every_picture() {
        let dir = tempfile::tempdir().unwrap();
        let md = serialize_markdown(&sample(), ImageRefMode::SelfRef, &dir.path().join("a")).unwrap();
        assert_eq!(
            md,
            "# Report\n\n## Intro\n\nBody text.\n\n![Figure 1](#/pictures/0)\n\n- point\n\n\
             ![Image](#/pictures/1)\n\n![Image](#/pictures/2)\n"
        );
        assert!(!dir.path().join("a").exists(), "no artifacts in self-ref mode");
    }

    #[test]
    fn placeholder_mode() {
        let dir = tempfile::tempdir().unwrap();
        let md = serialize_markdown(&sample(), ImageRefMode::Placeholder, dir.path()).unwrap();
        assert_eq!(md.matches(IMAGE_PLACEHOLDER).count(), 3);
        assert!(!md.contains("!["));
    }

    #[test]
    fn embedded_mode_inlines_png() {
        let dir = tempfile::tempdir().unwrap();
        let md = serialize_markdown(&sample(), ImageRefMode::Embedded, dir.path()).unwrap();
        assert_eq!(md.matches("](data:image/png;base64,").count(), 2);
        // The picture without pixels degrades to a placeholder.
        assert_eq!(md.matches(IMAGE_PLACEHOLDER).count(), 1);
    }

    #[test]
    fn referenced_mode_writes_numbered_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = dir.path().join("sample_artifacts");
        let md = serialize_markdown(&sample(), ImageRefMode::Referenced, &artifacts).unwrap();

        let links: Vec<&str> = md
            .lines()
            .filter_map(|l| l.strip_prefix("![").and_then(|r| r.split_once("](")))
            .map(|(_, rest)| rest.trim_end_matches(')'))
            .collect();
        assert_eq!(links.len(), 2);
        assert!(links[0].starts_with("sample_artifacts/image_000000_"));
        assert!(links[1].starts_with("sample_artifacts/image_000002_"));
        assert_eq!(extract_ordinal(links[0]), Some(0));
        assert_eq!(extract_ordinal(links[1]), Some(2));

        assert_eq!(std::fs::read_dir(&artifacts).unwrap().count(), 2);
        assert!(md.contains(IMAGE_PLACEHOLDER));
    }

    #[test]
    fn heading_level_is_clamped() {
        let mut doc = StructuredDocument::new("h");
        doc.push_heading(None, 0, "zero");
        doc.push_heading(None, 9, "nine");
        let dir = tempfile::tempdir().unwrap();
        let md = serialize_markdown(&doc, ImageRefMode::SelfRef, dir.path()).unwrap();
        assert_eq!(md, "# zero\n\n###### nine\n");
    }

    #[test]
    fn empty_document_is_single_newline() {
        let dir = tempfile::tempdir().unwrap();
        let md = serialize_markdown(&StructuredDocument::new("e"), ImageRefMode::SelfRef, dir.path())
            .unwrap();
        assert_eq!(md, "\n");
    }

    #[test]
    fn data_uri_is_valid_base64_png() {
        let uri = data_uri(&pixel()).unwrap();
        let b64 = uri.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = STANDARD.decode(b64).expect("valid base64");
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
