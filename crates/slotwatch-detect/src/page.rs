//! Page snapshot model and the query surface used by rules.
//!
//! A renderer hands the classifier a flat list of interactive elements taken
//! from the final DOM. Rules never see the DOM itself; they ask a
//! [`PageQuery`] how many elements match an [`ElementQuery`] and what text
//! those elements carry.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// One element of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Lowercase tag name (`a`, `button`, ...).
    pub tag: String,
    /// Text content, whitespace-trimmed by the renderer.
    #[serde(default)]
    pub text: String,
    /// `href` attribute, when present.
    #[serde(default)]
    pub href: Option<String>,
    /// Whether the element is disabled (`disabled` or `aria-disabled="true"`).
    #[serde(default)]
    pub disabled: bool,
}

impl Element {
    /// Creates an enabled element without an `href`.
    #[must_use]
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
            href: None,
            disabled: false,
        }
    }

    /// Sets the `href` attribute.
    #[must_use]
    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    /// Marks the element as disabled.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// A selector-like description of the elements a rule is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementQuery {
    /// Accepted tag names. Empty accepts any tag.
    pub tags: &'static [&'static str],
    /// Case-insensitive substrings, at least one of which must appear in the
    /// element text (or `href` when `match_href` is set). Empty accepts any.
    pub keywords: &'static [&'static str],
    /// Also look for keywords in the `href` attribute.
    pub match_href: bool,
    /// Skip disabled elements.
    pub enabled_only: bool,
}

impl ElementQuery {
    /// Returns true if `element` satisfies this query.
    #[must_use]
    pub fn matches(&self, element: &Element) -> bool {
        if self.enabled_only && element.disabled {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| t.eq_ignore_ascii_case(&element.tag)) {
            return false;
        }
        if self.keywords.is_empty() {
            return true;
        }

        let text = element.text.to_lowercase();
        let href = element
            .href
            .as_deref()
            .filter(|_| self.match_href)
            .map(str::to_lowercase);

        self.keywords.iter().any(|k| {
            let k = k.to_lowercase();
            text.contains(&k) || href.as_deref().is_some_and(|h| h.contains(&k))
        })
    }
}

/// Query capability a rendered page exposes to the classifier.
///
/// Both operations may fail (a renderer may lose its page mid-check); a
/// failure only disqualifies the rule that asked.
pub trait PageQuery {
    /// Number of elements matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the page cannot be queried.
    fn count(&self, query: &ElementQuery) -> Result<usize, QueryError>;

    /// Text of every element matching `query`, in document order.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the page cannot be queried.
    fn texts(&self, query: &ElementQuery) -> Result<Vec<String>, QueryError>;
}

/// A fully rendered page: final URL after redirects plus its elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// URL the browser ended on.
    pub final_url: String,
    /// Interactive elements in document order.
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Snapshot {
    /// Creates a snapshot.
    #[must_use]
    pub fn new(final_url: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            final_url: final_url.into(),
            elements,
        }
    }
}

impl PageQuery for Snapshot {
    fn count(&self, query: &ElementQuery) -> Result<usize, QueryError> {
        Ok(self.elements.iter().filter(|e| query.matches(e)).count())
    }

    fn texts(&self, query: &ElementQuery) -> Result<Vec<String>, QueryError> {
        Ok(self
            .elements
            .iter()
            .filter(|e| query.matches(e))
            .map(|e| e.text.clone())
            .collect())
    }
}
