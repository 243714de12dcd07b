//! HTML text, title, and link extraction for the crawl stage

use scraper::{Html, Selector};
use url::Url;

/// Tags whose text content never reaches the extracted document.
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Extract readable text from an HTML document.
///
/// Block-level boundaries become newlines so that downstream chunking does
/// not glue unrelated sections together; runs of whitespace collapse.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("static selector");

    let root_text: Vec<String> = match document.select(&body_selector).next() {
        Some(body) => collect_text(body),
        // Fragment without a body tag; fall back to the whole tree
        None => collect_text(document.root_element()),
    };

    let mut out = String::new();
    for line in root_text {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&collapse_whitespace(line));
    }
    out
}

fn collect_text(element: scraper::ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for node in element.descendants() {
        if let Some(el) = scraper::ElementRef::wrap(node) {
            let name = el.value().name();
            if SKIPPED_TAGS.contains(&name) {
                continue;
            }
            if is_block_tag(name) && !current.trim().is_empty() {
                lines.push(std::mem::take(&mut current));
            }
        } else if let Some(text) = node.value().as_text() {
            // Skip text inside scripts/styles
            if node
                .ancestors()
                .filter_map(scraper::ElementRef::wrap)
                .any(|a| SKIPPED_TAGS.contains(&a.value().name()))
            {
                continue;
            }
            current.push_str(text);
            current.push(' ');
        }
    }
    if !current.trim().is_empty() {
        lines.push(current);
    }
    lines
}

fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "br"
            | "li"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "table"
            | "tr"
            | "td"
            | "th"
            | "ul"
            | "ol"
            | "header"
            | "footer"
            | "nav"
            | "section"
            | "article"
    )
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The document `<title>`, if present and non-empty.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").expect("static selector");
    document
        .select(&selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Discover outbound same-host links.
///
/// Relative hrefs resolve against `base`; fragments are stripped; only
/// http(s) URLs whose host matches the base host survive. Duplicates are
/// removed preserving first-seen order.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");
    let base_host = base.host_str();

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if resolved.host_str() != base_host {
            continue;
        }
        if resolved == *base {
            continue;
        }
        if seen.insert(resolved.to_string()) {
            links.push(resolved);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html>
          <head><title>  P0301 Misfire   Guide </title><style>p { color: red }</style></head>
          <body>
            <h1>P0301: Cylinder 1 Misfire</h1>
            <p>Check the spark plug and the ignition coil.</p>
            <script>var tracking = "ignored";</script>
            <ul><li>Step 1: swap coils</li><li>Step 2: check compression</li></ul>
            <a href="/dtc/p0302">P0302</a>
            <a href="https://other-site.example/dtc/p0300">external</a>
            <a href="#section">fragment only</a>
            <a href="mailto:shop@example.com">mail</a>
          </body>
        </html>"##;

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title(PAGE).as_deref(),
            Some("P0301 Misfire Guide")
        );
    }

    #[test]
    fn test_extract_title_missing() {
        assert_eq!(extract_title("<html><body>no title</body></html>"), None);
    }

    #[test]
    fn test_extract_text_skips_script_and_style() {
        let text = extract_text(PAGE);
        assert!(text.contains("P0301: Cylinder 1 Misfire"));
        assert!(text.contains("Check the spark plug and the ignition coil."));
        assert!(text.contains("Step 1: swap coils"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_extract_text_splits_blocks() {
        let text = extract_text(PAGE);
        let heading_line = text
            .lines()
            .find(|l| l.contains("Cylinder 1 Misfire"))
            .unwrap();
        assert!(!heading_line.contains("spark plug"));
    }

    #[test]
    fn test_extract_links_same_host_only() {
        let base = Url::parse("https://dtc.example/dtc/p0301").unwrap();
        let links = extract_links(PAGE, &base);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "https://dtc.example/dtc/p0302");
    }

    #[test]
    fn test_extract_links_dedups_and_strips_fragments() {
        let html = r#"<a href="/a#one">x</a><a href="/a#two">y</a>"#;
        let base = Url::parse("https://dtc.example/").unwrap();
        let links = extract_links(html, &base);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "https://dtc.example/a");
    }
}
