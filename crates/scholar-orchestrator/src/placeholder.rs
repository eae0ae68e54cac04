//! Image placeholder substitution.
//!
//! The content prompt asks the model to reference the illustration through a
//! reserved token. Once the document comes back, every occurrence of the token
//! is replaced with the real image data URI.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

/// Token standing in for the image source in generated markup.
pub const IMAGE_PLACEHOLDER: &str = "%%IMAGE_DATA_URI_PLACEHOLDER%%";

static PLACEHOLDER_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(&regex::escape(IMAGE_PLACEHOLDER)).ok());

/// Result of a substitution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// The document after substitution.
    pub html: String,
    /// Number of tokens replaced.
    pub replacements: usize,
}

/// Replaces every placeholder token in `html` with `data_uri`.
///
/// The token is matched literally and the URI is inserted verbatim, so
/// `$` or other template characters in the replacement are never expanded.
/// A document without the token is returned unchanged.
#[must_use]
pub fn substitute_image_placeholder(html: &str, data_uri: &str) -> Substitution {
    let Some(re) = PLACEHOLDER_RE.as_ref() else {
        // An escaped literal always compiles; plain replacement is equivalent.
        return Substitution {
            html: html.replace(IMAGE_PLACEHOLDER, data_uri),
            replacements: html.matches(IMAGE_PLACEHOLDER).count(),
        };
    };

    let replacements = re.find_iter(html).count();
    if replacements == 0 {
        return Substitution {
            html: html.to_string(),
            replacements,
        };
    }
    let html = re.replace_all(html, NoExpand(data_uri)).into_owned();
    Substitution { html, replacements }
}
