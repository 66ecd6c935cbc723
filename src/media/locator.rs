//! Resource locators passed to `create`.

const FILE_SCHEME: &str = "file://";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    /// http(s) or another network scheme
    Remote,
    /// `file://` URI or absolute path
    File,
    /// Relative to the application bundle
    Relative,
}

pub fn classify(locator: &str) -> LocatorKind {
    let lower = locator.to_ascii_lowercase();
    if lower.starts_with(FILE_SCHEME) || locator.starts_with('/') {
        LocatorKind::File
    } else if lower.contains("://") {
        LocatorKind::Remote
    } else {
        LocatorKind::Relative
    }
}

/// Prepare a locator for the bridge. Some native recorders only accept a
/// bare absolute path, so `file://` can be stripped.
pub fn normalize(locator: &str, strip_file_scheme: bool) -> String {
    let trimmed = locator.trim();
    if strip_file_scheme && trimmed.len() >= FILE_SCHEME.len() {
        let (scheme, rest) = trimmed.split_at(FILE_SCHEME.len());
        if scheme.eq_ignore_ascii_case(FILE_SCHEME) {
            return rest.to_string();
        }
    }
    trimmed.to_string()
}

/// Lowercased file extension, ignoring any query string or fragment.
pub fn extension(locator: &str) -> Option<String> {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
