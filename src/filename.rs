//! Display name derived from a URL path

use url::Url;

/// Longest name kept, in characters
pub const MAX_FILENAME_LEN: usize = 255;

/// Name used when the URL yields nothing usable
pub const FALLBACK_FILENAME: &str = "file";

/// Derive the archive entry name from the last path segment of `url`
///
/// The segment is percent-decoded, every character outside `[A-Za-z0-9._-]`
/// becomes `_`, and the result is cut to [`MAX_FILENAME_LEN`] characters.
/// Names made only of `.`, `_` and `-` fall back to [`FALLBACK_FILENAME`].
pub fn filename_hint(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or_default();

    sanitize(segment)
}

/// Sanitize a raw (possibly percent-encoded) path segment
pub fn sanitize(segment: &str) -> String {
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let cleaned: String = decoded
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();

    if cleaned.chars().all(|c| matches!(c, '.' | '_' | '-')) {
        return FALLBACK_FILENAME.to_string();
    }
    cleaned
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn hint(raw: &str) -> String {
        filename_hint(&Url::parse(raw).unwrap())
    }

    #[test]
    fn uses_last_path_segment() {
        assert_eq!(hint("https://example.com/a/b/report.pdf"), "report.pdf");
        assert_eq!(hint("https://example.com/a/b/report.pdf?x=1#top"), "report.pdf");
    }

    #[test]
    fn trailing_slash_uses_previous_segment() {
        assert_eq!(hint("https://example.com/releases/v1.2/"), "v1.2");
    }

    #[test]
    fn empty_path_falls_back() {
        assert_eq!(hint("https://example.com"), "file");
        assert_eq!(hint("https://example.com/"), "file");
    }

    #[test]
    fn percent_encoding_is_decoded_then_sanitized() {
        assert_eq!(hint("https://example.com/my%20file%281%29.txt"), "my_file_1_.txt");
    }

    #[test]
    fn encoded_separators_never_survive() {
        assert_eq!(hint("https://example.com/..%2F..%2Fetc%2Fpasswd"), ".._.._etc_passwd");
        assert_eq!(hint("https://example.com/a%5Cb"), "a_b");
        assert_eq!(hint("https://example.com/%2E%2E"), "file");
    }

    #[test]
    fn dot_only_names_fall_back() {
        assert_eq!(sanitize(".."), "file");
        assert_eq!(sanitize("."), "file");
        assert_eq!(sanitize("-_."), "file");
        assert_eq!(sanitize(""), "file");
    }

    #[test]
    fn non_ascii_is_replaced() {
        assert_eq!(sanitize("r%C3%A9sum%C3%A9.doc"), "r_sum_.doc");
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "a".repeat(400);
        let name = sanitize(&long);
        assert_eq!(name.chars().count(), MAX_FILENAME_LEN);
    }

    #[test]
    fn invalid_utf8_escapes_keep_the_raw_segment() {
        assert_eq!(sanitize("bad%FFname"), "bad_FFname");
    }
}
