use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Matches `href` attributes, the only semantic "link" in HTML.
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']*)["']"#).expect("valid regex"));

/// `scheme:` or protocol-relative `//` prefix.
static ABSOLUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[a-zA-Z][a-zA-Z0-9+.\-]*:|//)").expect("valid regex"));

/// Trailing file extension on a path.
static EXTENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[a-zA-Z0-9]+$").expect("valid regex"));

/// True when `href` has neither a scheme nor a `//` host prefix.
pub fn is_relative_url(href: &str) -> bool {
    !ABSOLUTE_RE.is_match(href)
}

/// True for `.html` paths and for paths with no file extension at all.
/// Query strings and fragments are ignored.
pub fn is_html_like(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.ends_with(".html") || !EXTENSION_RE.is_match(path)
}

/// Canonical form used as the graph key: http(s) only, lowercased scheme and
/// host, no fragment, no trailing slash.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = url::Url::parse(raw.trim()).ok()?;
    normalize_parsed(&mut parsed)
}

fn normalize_parsed(parsed: &mut url::Url) -> Option<String> {
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.as_str().trim_end_matches('/').to_string())
}

/// Resolve a relative href against the page it was found on.
pub fn resolve_relative(page_url: &str, href: &str) -> Option<String> {
    let base = url::Url::parse(page_url).ok()?;
    let mut joined = base.join(href).ok()?;
    normalize_parsed(&mut joined)
}

/// In-scope child links of a page, normalised and deduplicated in document
/// order. Relative links are always kept; absolute http(s) links only when
/// `allow_external` is set. Either way the target path must look like HTML.
/// Links back to the page itself are dropped.
pub fn extract_child_links(html: &str, page_url: &str, allow_external: bool) -> Vec<String> {
    let Ok(base) = url::Url::parse(page_url) else {
        return Vec::new();
    };
    let own = normalize_url(page_url);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for cap in HREF_RE.captures_iter(html) {
        let href = cap[1].trim();
        if href.is_empty() || !(is_relative_url(href) || allow_external) {
            continue;
        }
        // Protocol-relative hrefs need the page's scheme, so everything joins.
        let Ok(mut target) = base.join(href) else { continue };
        if !is_html_like(target.path()) {
            continue;
        }
        let Some(link) = normalize_parsed(&mut target) else { continue };
        if own.as_deref() == Some(link.as_str()) {
            continue;
        }
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Classification ---

    #[test]
    fn relative_url_classification() {
        let cases = [
            ("http://example.edu", false),
            ("HTTP://EXAMPLE.EDU", false),
            ("https://www.exmaple.com", false),
            ("ftp://example.edu/file.txt", false),
            ("//cdn.example.edu/lib.js", false),
            ("mailto:someone@example.edu", false),
            ("/myfolder/test.txt", true),
            ("test", true),
        ];
        for (href, expected) in cases {
            assert_eq!(is_relative_url(href), expected, "{href}");
        }
    }

    #[test]
    fn html_like_classification() {
        assert!(is_html_like("/about"));
        assert!(is_html_like("/about.html"));
        assert!(is_html_like("/about?page=2"));
        assert!(is_html_like("test#jg380gj39v"));
        assert!(!is_html_like("/lib.js"));
        assert!(!is_html_like("/files/report.pdf"));
    }

    // --- Normalisation ---

    #[test]
    fn relative_links_resolve_against_root() {
        let cases = [
            ("/myfolder/test", "http://example.edu/myfolder/test"),
            ("test", "http://example.edu/test"),
            ("test/", "http://example.edu/test"),
            ("test#jg380gj39v", "http://example.edu/test"),
        ];
        for (href, expected) in cases {
            assert_eq!(resolve_relative("http://example.edu", href).as_deref(), Some(expected));
        }
    }

    #[test]
    fn normalisation_lowercases_host_and_trims_slash() {
        assert_eq!(
            normalize_url("HTTP://EXAMPLE.EDU/").as_deref(),
            Some("http://example.edu")
        );
        assert_eq!(
            normalize_url("https://example.edu/a/#top").as_deref(),
            Some("https://example.edu/a")
        );
        assert!(normalize_url("ftp://example.edu").is_none());
        assert!(normalize_url("not a url").is_none());
    }

    // --- Extraction ---

    #[test]
    fn extracts_relative_html_links_only() {
        let html = r#"
            <a href="/about">About</a>
            <a href="/about#team">Team</a>
            <a href="contact.html">Contact</a>
            <a href="/style.css">css</a>
            <a href="https://elsewhere.com/page">External</a>
            <img src="/logo.png">
        "#;
        let links = extract_child_links(html, "http://example.edu", false);
        assert_eq!(
            links,
            vec!["http://example.edu/about", "http://example.edu/contact.html"]
        );
    }

    #[test]
    fn external_links_need_opt_in() {
        let html = r#"
            <a href="https://elsewhere.com/page/">x</a>
            <a href="//cdn.example.edu/docs">y</a>
            <a href="https://elsewhere.com">z</a>
            <a href="https://elsewhere.com/app.js">js</a>
            <a href="mailto:someone@example.edu">mail</a>
        "#;
        assert!(extract_child_links(html, "http://example.edu", false).is_empty());
        assert_eq!(
            extract_child_links(html, "http://example.edu", true),
            vec![
                "https://elsewhere.com/page",
                "http://cdn.example.edu/docs",
                "https://elsewhere.com",
            ]
        );
    }

    #[test]
    fn self_links_and_empty_hrefs_are_dropped() {
        let html = r##"<a href="#top">top</a><a href="">empty</a><a href="/">home</a>"##;
        assert!(extract_child_links(html, "http://example.edu", false).is_empty());
    }
}
