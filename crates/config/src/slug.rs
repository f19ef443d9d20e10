//! Provider slug derivation and validation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

/// Maximum slug length.
pub const SLUG_MAX_LEN: usize = 100;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z0-9]+(-[a-z0-9]+)*$").expect("slug regex"));

/// Validate an explicit provider slug.
///
/// Slugs are restricted to `[a-z0-9-]`, with no leading, trailing, or
/// consecutive hyphens, and at most [`SLUG_MAX_LEN`] characters.
pub fn validate_slug(slug: &str) -> Result<(), ConfigError> {
    if slug.is_empty() {
        return Err(ConfigError::InvalidSlug {
            slug: slug.into(),
            message: "slug is empty".into(),
        });
    }
    if slug.len() > SLUG_MAX_LEN {
        return Err(ConfigError::InvalidSlug {
            slug: slug.into(),
            message: format!("longer than {SLUG_MAX_LEN} characters"),
        });
    }
    if !SLUG_RE.is_match(slug) {
        return Err(ConfigError::InvalidSlug {
            slug: slug.into(),
            message: "allowed characters are [a-z0-9-], without leading, trailing, \
                      or consecutive hyphens"
                .into(),
        });
    }
    Ok(())
}

/// Derive a slug from a provider name: lowercase it, then validate.
///
/// Derivation does not transliterate; a provider name that lowercases to
/// anything outside the allowed alphabet is a configuration error and the
/// fleet author must set `provider_slug` explicitly.
pub fn derive_slug(provider: &str) -> Result<String, ConfigError> {
    let slug = provider.to_lowercase();
    validate_slug(&slug)?;
    Ok(slug)
}
