//! Normalisation of the ways a caller can point at a post.
//!
//! Accepted forms, checked in order: a full URL (permalink or `redd.it`
//! short link), a `t3_` fullname, a bare path containing `/comments/<id>`,
//! and finally a raw id which passes through unchanged.

use url::Url;

const FULLNAME_PREFIX: &str = "t3_";

pub fn normalize_post_id(input: &str) -> String {
    let trimmed = input.trim();

    if let Some(id) = id_from_url(trimmed) {
        return id;
    }

    if let Some(rest) = trimmed.strip_prefix(FULLNAME_PREFIX) {
        if is_post_id(rest) {
            return rest.to_string();
        }
    }

    if let Some(id) = id_after_comments_segment(trimmed.split('/')) {
        return id;
    }

    trimmed.to_string()
}

fn id_from_url(input: &str) -> Option<String> {
    let url = Url::parse(input).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    if host == "redd.it" || host.ends_with(".redd.it") {
        return segments
            .next()
            .filter(|segment| is_post_id(segment))
            .map(str::to_string);
    }

    if host == "reddit.com" || host.ends_with(".reddit.com") {
        return id_after_comments_segment(segments);
    }

    None
}

fn id_after_comments_segment<'a>(mut segments: impl Iterator<Item = &'a str>) -> Option<String> {
    segments.find(|segment| *segment == "comments")?;
    segments
        .find(|segment| !segment.is_empty())
        .filter(|segment| is_post_id(segment))
        .map(str::to_string)
}

/// Reddit ids are short base-36 strings.
fn is_post_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permalink_url() {
        assert_eq!(
            normalize_post_id("https://www.reddit.com/r/AskReddit/comments/abc123/title/"),
            "abc123"
        );
        assert_eq!(
            normalize_post_id("https://old.reddit.com/r/rust/comments/1a2b3c/some_title/?sort=top"),
            "1a2b3c"
        );
    }

    #[test]
    fn test_fullname() {
        assert_eq!(normalize_post_id("t3_abc123"), "abc123");
    }

    #[test]
    fn test_raw_id_passes_through() {
        assert_eq!(normalize_post_id("abc123"), "abc123");
        assert_eq!(normalize_post_id("  abc123  "), "abc123");
    }

    #[test]
    fn test_short_link() {
        assert_eq!(normalize_post_id("https://redd.it/xyz789"), "xyz789");
    }

    #[test]
    fn test_relative_permalink() {
        assert_eq!(
            normalize_post_id("/r/AskReddit/comments/abc123/title/"),
            "abc123"
        );
    }

    #[test]
    fn test_unrecognised_url_is_left_alone() {
        let input = "https://example.com/posts/abc123";
        assert_eq!(normalize_post_id(input), input);
    }
}
