use std::path::PathBuf;

use url::Url;

use crate::error::{MirrorError, Result};

/// File name used when a URL path ends at a directory.
const INDEX_FILE: &str = "index.html";

/// Map an absolute URL onto a relative path inside the output root.
///
/// Only the path component matters: query and fragment are dropped, an empty
/// or `/`-terminated path becomes `index.html` in that directory, and every
/// earlier segment becomes a directory. The result doubles as the dedup key
/// for downloads, so distinct URL paths must stay distinct: segments keep
/// their percent-encoded form, since decoding could produce `/` and collapse
/// two different paths into one. Dot segments are already normalized away by
/// the URL parser.
pub fn to_local_path(url: &Url) -> PathBuf {
    let path = url.path();
    let mut out = PathBuf::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push(segment);
    }
    if path.ends_with('/') || out.as_os_str().is_empty() {
        out.push(INDEX_FILE);
    }
    out
}

/// Canonical key for the visited set: the URL without query or fragment,
/// matching what `to_local_path` looks at.
pub fn dedup_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_query(None);
    key.set_fragment(None);
    key.to_string()
}

/// Parse caller input as an absolute URL we can actually fetch.
pub fn parse_absolute(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| MirrorError::malformed(trimmed, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MirrorError::malformed(
            trimmed,
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn bare_host_maps_to_index_html() {
        assert_eq!(to_local_path(&url("http://example.test")), Path::new("index.html"));
        assert_eq!(to_local_path(&url("http://example.test/")), Path::new("index.html"));
    }

    #[test]
    fn directory_urls_get_index_html_inside() {
        assert_eq!(
            to_local_path(&url("http://example.test/blog/")),
            Path::new("blog/index.html")
        );
    }

    #[test]
    fn nested_segments_become_directories() {
        assert_eq!(
            to_local_path(&url("http://example.test/a/b/c.css")),
            Path::new("a/b/c.css")
        );
    }

    #[test]
    fn query_and_fragment_are_dropped() {
        let plain = to_local_path(&url("http://example.test/style.css"));
        assert_eq!(to_local_path(&url("http://example.test/style.css?v=2")), plain);
        assert_eq!(to_local_path(&url("http://example.test/style.css#top")), plain);
    }

    #[test]
    fn distinct_paths_stay_distinct() {
        let urls = [
            "http://example.test/a",
            "http://example.test/a/",
            "http://example.test/a.html",
            "http://example.test/a/b",
            "http://example.test/b",
        ];
        let mut seen = std::collections::HashSet::new();
        for raw in urls {
            assert!(seen.insert(to_local_path(&url(raw))), "collision for {raw}");
        }
    }

    #[test]
    fn percent_encoding_is_preserved() {
        assert_eq!(
            to_local_path(&url("http://example.test/a%2Fb.png")),
            Path::new("a%2Fb.png")
        );
    }

    #[test]
    fn dot_segments_cannot_escape_the_root() {
        // The parser collapses them before we ever see the path.
        assert_eq!(
            to_local_path(&url("http://example.test/a/../../etc/passwd")),
            Path::new("etc/passwd")
        );
    }

    #[test]
    fn dedup_key_ignores_query_and_fragment() {
        let a = dedup_key(&url("http://example.test/p.html?session=1#frag"));
        let b = dedup_key(&url("http://example.test/p.html"));
        assert_eq!(a, b);
    }

    #[test]
    fn parse_absolute_trims_and_validates() {
        assert!(parse_absolute("  http://example.test/x \n").is_ok());
        assert!(parse_absolute("example.test/x").is_err());
        assert!(parse_absolute("mailto:root@example.test").is_err());
        assert!(parse_absolute("").is_err());
    }
}
