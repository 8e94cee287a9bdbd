//! Render loop: keep the last rendered tree, diff each new render against it.

use crate::debug;
use crate::diff::{DiffError, DiffOptions, diff_with};
use crate::parser::{ParseError, parse_str};
use crate::patch::{ApplyError, Backend, PatchSet};
use crate::tree::Tree;

/// Holds the previously rendered tree so each render only ships what changed.
///
/// # Example
///
/// ```rust
/// use reheat::{LiveDocument, Renderer};
///
/// let mut renderer = Renderer::new();
/// let mut doc = LiveDocument::new();
/// renderer.render_into("<p>count: 1</p>", &mut doc).unwrap();
/// let patches = renderer.render_into("<p>count: 2</p>", &mut doc).unwrap();
/// assert_eq!(patches.len(), 1);
/// assert_eq!(doc.to_html(), "<p>count: 2</p>");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    previous: Tree,
    options: DiffOptions,
    renders: u64,
}

impl Renderer {
    /// A renderer whose first render appends every root.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DiffOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// The tree the next render is diffed against.
    pub fn current(&self) -> &Tree {
        &self.previous
    }

    /// Number of successful renders so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// Parse `markup`, diff it against the previous render and keep it.
    pub fn render(&mut self, markup: &str) -> Result<PatchSet, RenderError> {
        let next = parse_str(markup)?;
        let patches = diff_with(&self.previous, &next, &self.options)?;
        self.commit(next, &patches);
        Ok(patches)
    }

    /// Like [`Renderer::render`], and apply the patches to `backend`. The
    /// previous tree is only replaced when every patch applied.
    pub fn render_into<B: Backend>(
        &mut self,
        markup: &str,
        backend: &mut B,
    ) -> Result<PatchSet, RenderError> {
        let next = parse_str(markup)?;
        let patches = diff_with(&self.previous, &next, &self.options)?;
        patches.apply(backend)?;
        self.commit(next, &patches);
        Ok(patches)
    }

    fn commit(&mut self, next: Tree, _patches: &PatchSet) {
        self.renders += 1;
        debug!("render {}: {} patches", self.renders, _patches.len());
        self.previous = next;
    }
}

/// Failure at any stage of a render.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("diff failed: {0}")]
    Diff(#[from] DiffError),

    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::LiveDocument;
    use crate::patch::Patch;
    use crate::tree::Kind;
    use facet_testhelpers::test;

    #[test]
    fn test_first_render_appends_roots() {
        let mut renderer = Renderer::new();
        let patches = renderer.render("<h1>t</h1><p>x</p>").unwrap();
        assert_eq!(patches.len(), 2);
        assert!(patches.iter().all(|p| matches!(p, Patch::Append { .. })));
        assert_eq!(renderer.current().len(), 2);
        assert_eq!(renderer.renders(), 1);
    }

    #[test]
    fn test_unchanged_render_is_empty() {
        let mut renderer = Renderer::new();
        renderer.render("<p>x</p>").unwrap();
        assert!(renderer.render("<p>x</p>").unwrap().is_empty());
    }

    #[test]
    fn test_failed_parse_keeps_previous() {
        let mut renderer = Renderer::new();
        renderer.render("<p>x</p>").unwrap();
        let err = renderer.render("<p>x</div>").unwrap_err();
        assert!(matches!(err, RenderError::Parse(ParseError::MismatchedEndTag { .. })));
        assert_eq!(renderer.current().html(), "<p>x</p>");
    }

    #[test]
    fn test_render_error_keeps_its_cause() {
        use std::error::Error;

        let mut renderer = Renderer::new();
        let err = renderer.render("</p>").unwrap_err();
        let cause = ParseError::UnexpectedEndTag {
            name: "p".to_string(),
        };
        assert_eq!(err, RenderError::from(cause.clone()));
        assert_eq!(err.to_string(), format!("parse failed: {cause}"));
        let source = err.source().expect("render errors expose their cause");
        assert_eq!(source.to_string(), cause.to_string());
    }

    #[test]
    fn test_unsupported_kind_is_a_diff_error() {
        let mut renderer = Renderer::with_options(DiffOptions::html_body());
        let err = renderer.render("<!DOCTYPE html>").unwrap_err();
        assert!(matches!(
            err,
            RenderError::Diff(DiffError::UnsupportedNodeKind {
                kind: Kind::Directive,
                ..
            })
        ));
        assert!(renderer.current().is_empty());
    }

    #[test]
    fn test_render_into_tracks_document() {
        let mut renderer = Renderer::new();
        let mut doc = LiveDocument::new();
        for markup in [
            "<ul><li>a</li></ul>",
            r#"<ul class="x"><li>a</li><li>b</li></ul>"#,
            "<ul><li>b</li></ul><p>done</p>",
            "",
        ] {
            renderer.render_into(markup, &mut doc).unwrap();
            assert_eq!(doc.to_html(), LiveDocument::parse(markup).unwrap().to_html());
        }
    }

    #[test]
    fn test_failed_apply_keeps_previous() {
        let mut renderer = Renderer::new();
        renderer.render("<p>x</p>").unwrap();
        // the backend never saw the first render
        let mut doc = LiveDocument::new();
        let err = renderer.render_into("<p>y</p>", &mut doc).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Apply(ApplyError::TargetNotFound { index: 0, .. })
        ));
        assert_eq!(renderer.current().html(), "<p>x</p>");
    }
}
