// Filename and directory resolution helpers.

use std::path::{Path, PathBuf};

/// Derive the destination filename from the tail of the URL path.
/// Percent-escapes are decoded before sanitizing.
pub fn filename_from_url(url: &url::Url) -> String {
    let segment = url.path().rsplit('/').next().unwrap_or("");
    let decoded = match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    };
    sanitize_filename(&decoded)
}

/// Sanitize a filename so it cannot escape the output directory.
///
/// Strips directory components, replaces stray path separators, and removes
/// leading dots. Returns `"download"` if the result would be empty.
pub fn sanitize_filename(name: &str) -> String {
    // file_name() returns None for "..", ".", and empty strings, and drops
    // any leading directory components (including absolute paths).
    let base = Path::new(name)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("");

    // Separators can reappear after percent-decoding (%2F)
    let cleaned = base.replace(['/', '\\'], "_");
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Default destination for downloads: the user's Downloads directory,
/// falling back to the current directory when home cannot be determined.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        let url = url::Url::parse("https://example.com/files/archive.tar.gz?sig=abc").unwrap();
        assert_eq!(filename_from_url(&url), "archive.tar.gz");
    }

    #[test]
    fn test_filename_from_url_percent_encoded() {
        let url = url::Url::parse("https://example.com/files/my%20file.zip").unwrap();
        assert_eq!(filename_from_url(&url), "my file.zip");
    }

    #[test]
    fn test_filename_from_url_empty_tail() {
        let url = url::Url::parse("https://example.com/").unwrap();
        assert_eq!(filename_from_url(&url), "download");
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a/b/c.txt"), "c.txt");
        assert_eq!(sanitize_filename(".."), "download");
    }

    #[test]
    fn test_sanitize_strips_leading_dots() {
        assert_eq!(sanitize_filename(".bashrc"), "bashrc");
        assert_eq!(sanitize_filename("..hidden"), "hidden");
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize_filename(""), "download");
        assert_eq!(sanitize_filename("."), "download");
    }

    #[test]
    fn test_default_download_dir_not_empty() {
        let dir = default_download_dir();
        assert!(!dir.as_os_str().is_empty());
    }
}
