//! Markdown image-reference rewriting.
//!
//! Converts every `![alt](source)` tag whose `source` can be reconciled with
//! an exported picture into `![alt](url)`. The serializer may emit either a
//! document self-reference (`#/pictures/3`) or an artifact file path
//! (`doc_artifacts/image_000003_9f2c.png`) depending on its mode, and this
//! module handles both without being told which one it is looking at:
//!
//! 1. **Exact**: `source` is a key of the [`ReferenceMap`].
//! 2. **Positional**: an ordinal `N` is read from an `image_N` token in
//!    `source` and `#/pictures/N` is looked up instead.
//! 3. **Unresolved**: the tag is left exactly as it was.
//!
//! Only the `source` capture is ever replaced; alt text, every character
//! outside the tags, and the number of tags are preserved.
//!
//! The positional rule assumes artifact ordinal `N` names the Nth entry of
//! `#/pictures`. That holds for [`crate::pipeline::serialize`], but is not
//! something this module can verify.

use crate::document::picture_ref;
use crate::pipeline::export::ReferenceMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

static RE_IMAGE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[(.*?)\]\((.*?)\)").unwrap());

/// `image_<digits>` followed by `_` or `.`, anywhere in the source.
/// ASCII digits only: they are the only ones `usize::from_str` accepts.
static RE_ORDINAL_INFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"image_([0-9]+)[_.]").unwrap());

/// `image_<digits>` closing the extension-less stem.
static RE_ORDINAL_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"image_([0-9]+)$").unwrap());

/// How one tag's source was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Source was a map key.
    Exact(&'a str),
    /// Source carried ordinal `index`, and `#/pictures/{index}` was a map key.
    Positional { index: usize, url: &'a str },
    /// Source carried ordinal `index` but `#/pictures/{index}` is not mapped.
    MissingPicture { index: usize },
    /// Neither a key nor an artifact path.
    Unrecognised,
}

impl<'a> Resolution<'a> {
    /// The replacement URL, if any.
    pub fn url(&self) -> Option<&'a str> {
        match *self {
            Resolution::Exact(url) | Resolution::Positional { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// Rewritten Markdown plus per-rule counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub markdown: String,
    pub exact: usize,
    pub positional: usize,
    pub unresolved: usize,
}

impl RewriteOutcome {
    pub fn total_tags(&self) -> usize {
        self.exact + self.positional + self.unresolved
    }
}

/// Extract the trailing picture ordinal from an artifact-style source.
///
/// Tries `image_N` followed by `_` or `.` first, then `image_N` at the end of
/// the source with its final extension removed. Ordinals too large for
/// `usize` yield `None`.
pub fn extract_ordinal(source: &str) -> Option<usize> {
    let caps = RE_ORDINAL_INFIX.captures(source).or_else(|| {
        let stem = source.rsplit_once('.').map_or(source, |(stem, _)| stem);
        RE_ORDINAL_SUFFIX.captures(stem)
    })?;
    caps[1].parse().ok()
}

/// Resolve one tag source against the reference map.
pub fn resolve_source<'a>(source: &str, refs: &'a ReferenceMap) -> Resolution<'a> {
    if let Some(url) = refs.get(source) {
        return Resolution::Exact(url);
    }
    match extract_ordinal(source) {
        Some(index) => match refs.get(&picture_ref(index)) {
            Some(url) => Resolution::Positional { index, url },
            None => Resolution::MissingPicture { index },
        },
        None => Resolution::Unrecognised,
    }
}

/// Rewrite every resolvable image tag in `markdown`.
pub fn rewrite_image_refs(markdown: &str, refs: &ReferenceMap) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();

    let rewritten = RE_IMAGE_TAG.replace_all(markdown, |caps: &Captures<'_>| {
        let alt = &caps[1];
        let source = &caps[2];
        debug!("Checking image tag: alt='{}', src='{}'", alt, source);

        match resolve_source(source, refs) {
            Resolution::Exact(url) => {
                outcome.exact += 1;
                debug!("Replacing reference '{}' with URL '{}'", source, url);
                format!("![{alt}]({url})")
            }
            Resolution::Positional { index, url } => {
                outcome.positional += 1;
                debug!(
                    "Replacing artifact path '{}' (picture {}) with URL '{}'",
                    source, index, url
                );
                format!("![{alt}]({url})")
            }
            Resolution::MissingPicture { index } => {
                outcome.unresolved += 1;
                warn!(
                    "Mapping failed for artifact '{}': {} not exported",
                    source,
                    picture_ref(index)
                );
                caps[0].to_string()
            }
            Resolution::Unrecognised => {
                outcome.unresolved += 1;
                warn!(
                    "Source '{}' is not a mapped self_ref or a recognised artifact path; leaving link unchanged",
                    source
                );
                caps[0].to_string()
            }
        }
    });

    outcome.markdown = rewritten.into_owned();
    info!(
        "Rewrote image references: {} exact, {} positional, {} unresolved",
        outcome.exact, outcome.positional, outcome.unresolved
    );
    outcome
}

/// Rewrite image tags and return only the Markdown.
pub fn rewrite(markdown: &str, refs: &ReferenceMap) -> String {
    rewrite_image_refs(markdown, refs).markdown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(pairs: &[(&str, &str)]) -> ReferenceMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn mixed_modes_in_one_document() {
        let map = refs(&[
            ("#/pictures/0", "http://h/a.png"),
            ("#/pictures/1", "http://h/b.png"),
        ]);
        let raw = "![x](#/pictures/0) and ![y](page1_image_1.png)";
        assert_eq!(
            rewrite(raw, &map),
            "![x](http://h/a.png) and ![y](http://h/b.png)"
        );
    }

    #[test]
    fn exact_match_replaces_source_only() {
        let map = refs(&[("#/pictures/7", "http://h/seven.png")]);
        let out = rewrite_image_refs("![Figure 7: a *chart*](#/pictures/7)", &map);
        assert_eq!(out.markdown, "![Figure 7: a *chart*](http://h/seven.png)");
        assert_eq!((out.exact, out.positional, out.unresolved), (1, 0, 0));
    }

    #[test]
    fn exact_match_wins_over_positional() {
        // The source is itself a key, even though it also looks like an artifact.
        let map = refs(&[
            ("a/image_2.png", "http://h/exact.png"),
            ("#/pictures/2", "http://h/positional.png"),
        ]);
        assert_eq!(rewrite("![](a/image_2.png)", &map), "![](http://h/exact.png)");
    }

    #[test]
    fn positional_infix_pattern() {
        let map = refs(&[("#/pictures/3", "http://h/3.png")]);
        assert_eq!(rewrite("![a](foo_image_3_bar.png)", &map), "![a](http://h/3.png)");
    }

    #[test]
    fn positional_bare_filename() {
        let map = refs(&[("#/pictures/3", "http://h/3.png")]);
        assert_eq!(rewrite("![a](image_3.png)", &map), "![a](http://h/3.png)");
    }

    #[test]
    fn positional_suffix_without_extension() {
        let map = refs(&[("#/pictures/4", "http://h/4.png")]);
        assert_eq!(rewrite("![a](dir/image_4)", &map), "![a](http://h/4.png)");
    }

    #[test]
    fn non_ascii_digits_are_not_ordinals() {
        let map = refs(&[
            ("#/pictures/3", "http://h/3.png"),
            ("#/pictures/4", "http://h/4.png"),
        ]);
        assert_eq!(extract_ordinal("image_\u{663}.png"), None);
        assert_eq!(extract_ordinal("image_\u{663}_x_image_4.png"), Some(4));
        assert_eq!(
            rewrite("![a](image_\u{663}_x_image_4.png)", &map),
            "![a](http://h/4.png)"
        );
    }

    #[test]
    fn positional_strips_leading_zeros() {
        let map = refs(&[("#/pictures/12", "http://h/12.png")]);
        let raw = "![Image](report_artifacts/image_000012_5f1e2d.png)";
        let out = rewrite_image_refs(raw, &map);
        assert_eq!(out.markdown, "![Image](http://h/12.png)");
        assert_eq!(out.positional, 1);
    }

    #[test]
    fn ordinal_without_mapping_is_left_alone() {
        let map = refs(&[("#/pictures/0", "http://h/0.png")]);
        let raw = "![gone](image_000005_ab.png)";
        let out = rewrite_image_refs(raw, &map);
        assert_eq!(out.markdown, raw);
        assert_eq!(out.unresolved, 1);
    }

    #[test]
    fn unrecognised_sources_pass_through() {
        let map = refs(&[("#/pictures/0", "http://h/0.png")]);
        for raw in [
            "![logo](https://cdn.example.org/logo.svg)",
            "![](data:image/png;base64,iVBORw0KGgo=)",
            "![x](#/pictures/9)",
            "![x](picture_3.png)",
            "![x]()",
            "![](image_.png)",
        ] {
            assert_eq!(rewrite(raw, &map), raw, "should be unchanged: {raw}");
        }
    }

    #[test]
    fn text_outside_tags_is_preserved() {
        let map = refs(&[("#/pictures/0", "http://h/0.png")]);
        let raw = "# Title\n\nSome [link](x) text.\n\n![cap](#/pictures/0)\n\n| a | b |\n|---|---|\ntrailing  \n";
        let out = rewrite(raw, &map);
        assert_eq!(
            out,
            "# Title\n\nSome [link](x) text.\n\n![cap](http://h/0.png)\n\n| a | b |\n|---|---|\ntrailing  \n"
        );
    }

    #[test]
    fn tag_count_is_preserved() {
        let map = refs(&[("#/pictures/0", "http://h/0.png"), ("#/pictures/2", "http://h/2.png")]);
        let raw = "![a](#/pictures/0)![b](#/pictures/1)\n![c](x_image_2.png) ![d](nope)";
        let out = rewrite_image_refs(raw, &map);
        assert_eq!(out.total_tags(), 4);
        assert_eq!(out.markdown.matches("![").count(), 4);
        assert_eq!(
            out.markdown,
            "![a](http://h/0.png)![b](#/pictures/1)\n![c](http://h/2.png) ![d](nope)"
        );
    }

    #[test]
    fn non_greedy_tags_do_not_merge() {
        let map = refs(&[("#/pictures/0", "http://h/0.png"), ("#/pictures/1", "http://h/1.png")]);
        let raw = "![a](#/pictures/0) middle ![b](#/pictures/1)";
        assert_eq!(
            rewrite(raw, &map),
            "![a](http://h/0.png) middle ![b](http://h/1.png)"
        );
    }

    #[test]
    fn tags_do_not_span_lines() {
        let map = refs(&[("#/pictures/0", "http://h/0.png")]);
        let raw = "![broken\n](#/pictures/0)";
        assert_eq!(rewrite(raw, &map), raw);
    }

    #[test]
    fn empty_map_and_empty_input() {
        let map = ReferenceMap::new();
        assert_eq!(rewrite("", &map), "");
        assert_eq!(rewrite("![a](#/pictures/0)", &map), "![a](#/pictures/0)");
    }

    #[test]
    fn extract_ordinal_patterns() {
        assert_eq!(extract_ordinal("foo_image_3_bar.png"), Some(3));
        assert_eq!(extract_ordinal("image_3.png"), Some(3));
        assert_eq!(extract_ordinal("image_000010_hash.png"), Some(10));
        assert_eq!(extract_ordinal("dir/image_7"), Some(7));
        assert_eq!(extract_ordinal("image_7.tar.gz"), Some(7));
        assert_eq!(extract_ordinal("image_x.png"), None);
        assert_eq!(extract_ordinal("myimage3.png"), None);
        assert_eq!(extract_ordinal("#/pictures/3"), None);
        assert_eq!(extract_ordinal("image_99999999999999999999999.png"), None);
    }

    #[test]
    fn resolve_source_reports_rule() {
        let map = refs(&[("#/pictures/1", "http://h/1.png")]);
        assert_eq!(resolve_source("#/pictures/1", &map), Resolution::Exact("http://h/1.png"));
        assert_eq!(
            resolve_source("image_1.png", &map),
            Resolution::Positional {
                index: 1,
                url: "http://h/1.png"
            }
        );
        assert_eq!(
            resolve_source("image_2.png", &map),
            Resolution::MissingPicture { index: 2 }
        );
        assert_eq!(resolve_source("other.png", &map), Resolution::Unrecognised);
        assert_eq!(resolve_source("other.png", &map).url(), None);
    }
}
