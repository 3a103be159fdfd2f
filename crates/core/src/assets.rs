//! Asset URL normalization.
//!
//! The backend returns result locations either as absolute URLs or as
//! paths relative to an asset host. [`AssetUrls`] turns both into
//! something a client can fetch directly.

/// Resolves backend asset paths against an optional base URL.
///
/// Without a base, relative paths stay relative to the current origin
/// (only the leading slash is normalized). The base may itself be a path
/// such as `/static`, in which case paths already under it are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetUrls {
    base: Option<String>,
}

impl AssetUrls {
    /// Build a normalizer. A blank base is treated as "no base".
    pub fn new(base: Option<&str>) -> Self {
        let base = base
            .map(|b| b.trim().trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty());
        Self { base }
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Normalize a single path or URL.
    ///
    /// - `None`, empty, or whitespace-only input yields `None`.
    /// - `http://` and `https://` URLs are returned unchanged.
    /// - Relative paths are joined onto the base with exactly one `/`.
    /// - Paths already under a path-style base are returned as they are.
    ///
    /// The function is idempotent.
    pub fn normalize(&self, path_or_url: Option<&str>) -> Option<String> {
        let raw = path_or_url.map(str::trim).filter(|s| !s.is_empty())?;

        if is_absolute(raw) {
            return Some(raw.to_string());
        }

        let path = if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{raw}")
        };

        match &self.base {
            Some(base) if !is_under(&path, base) => Some(format!("{base}{path}")),
            _ => Some(path),
        }
    }

    /// Normalize every entry, dropping those that resolve to nothing.
    pub fn normalize_all(&self, paths: &[String]) -> Vec<String> {
        paths
            .iter()
            .filter_map(|p| self.normalize(Some(p)))
            .collect()
    }
}

fn is_absolute(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Whether `path` (with a leading `/`) already sits under `base`.
fn is_under(path: &str, base: &str) -> bool {
    path.strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
