use regex::Regex;
use tracing::trace;

/// One rendered page link. Holds no behavior; links are reparsed after every
/// fragment replacement because the old ones died with the old markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub page: i64,
    pub label: String,
}

/// Extracts the `pagination-link` anchors from a rendered fragment. A
/// `data-page` value that fails to parse dispatches as page 1, matching the
/// forgiving behavior of the original pages.
pub fn parse_page_links(fragment: &str) -> Vec<PageLink> {
    let anchor = Regex::new(r"(?s)<a\b[^>]*>(.*?)</a>").unwrap();
    let page_attr = Regex::new(r#"data-page="([^"]*)""#).unwrap();

    let mut links = Vec::new();
    for capture in anchor.captures_iter(fragment) {
        let tag = &capture[0];
        if !tag.contains("pagination-link") {
            continue;
        }
        let page = page_attr
            .captures(tag)
            .and_then(|c| c[1].parse::<i64>().ok())
            .unwrap_or(1);
        let label = crate::table::strip_tags(&capture[1]).trim().to_string();
        links.push(PageLink { page, label });
    }
    trace!(count = links.len(), "parsed pagination links");
    links
}

/// Invokes the callback with the page number of the clicked link, if any.
pub fn dispatch(links: &[PageLink], index: usize, on_page_change: impl FnOnce(i64)) {
    if let Some(link) = links.get(index) {
        on_page_change(link.page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r##"
        <nav>
          <a class="pagination-link" data-page="1" href="#">1</a>
          <a class="pagination-link active" data-page="2" href="#">2</a>
          <a class="pagination-link" data-page="oops" href="#">next</a>
          <a class="other-link" data-page="9" href="#">elsewhere</a>
        </nav>"##;

    #[test]
    fn parses_links_and_defaults_bad_pages_to_one() {
        let links = parse_page_links(FRAGMENT);
        assert_eq!(links.len(), 3);
        assert_eq!(links[0], PageLink { page: 1, label: "1".into() });
        assert_eq!(links[1].page, 2);
        assert_eq!(links[2], PageLink { page: 1, label: "next".into() });
    }

    #[test]
    fn dispatch_hits_the_callback_with_the_page() {
        let links = parse_page_links(FRAGMENT);
        let mut seen = None;
        dispatch(&links, 1, |page| seen = Some(page));
        assert_eq!(seen, Some(2));

        dispatch(&links, 99, |_| panic!("out of range must not dispatch"));
    }
}
