//! HTML link extraction.

use scraper::{Html, Selector};

use trawl_types::{FoundLink, LinkParser, ParsedPage};

/// Priority hint attached to links that point straight at a PDF, so harvest
/// targets preempt ordinary navigation in the frontier.
const PDF_PRIORITY: i64 = 10;

/// Extracts the page title and every `<a href>` target.
///
/// A `<meta name="robots">` directive containing `nofollow` makes the parser
/// report an empty page, which tells the dispatcher not to follow anything.
#[derive(Debug)]
pub struct LinkExtractor {
    title: Selector,
    anchors: Selector,
    robots_meta: Selector,
}

impl LinkExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            title: Selector::parse("title").expect("valid selector"),
            anchors: Selector::parse("a[href]").expect("valid selector"),
            robots_meta: Selector::parse("meta[name]").expect("valid selector"),
        }
    }

    fn forbids_following(&self, doc: &Html) -> bool {
        doc.select(&self.robots_meta).any(|el| {
            let name = el.value().attr("name").unwrap_or("");
            let content = el.value().attr("content").unwrap_or("");
            name.eq_ignore_ascii_case("robots")
                && content.to_ascii_lowercase().contains("nofollow")
        })
    }
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkParser for LinkExtractor {
    fn parse(&mut self, html: &str) -> ParsedPage {
        let doc = Html::parse_document(html);

        if self.forbids_following(&doc) {
            return ParsedPage::default();
        }

        let title = doc
            .select(&self.title)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let links = doc
            .select(&self.anchors)
            .filter_map(|el| {
                let href = el.value().attr("href")?.trim();
                if href.is_empty() {
                    return None;
                }
                let text = el.text().collect::<String>();
                let text = text.trim();
                Some(FoundLink {
                    url: href.to_string(),
                    text: (!text.is_empty()).then(|| text.to_string()),
                    priority: points_at_pdf(href).then_some(PDF_PRIORITY),
                })
            })
            .collect();

        ParsedPage { title, links }
    }
}

/// Does the href's path component end in `.pdf`?
fn points_at_pdf(href: &str) -> bool {
    let path = href
        .split(['?', '#'])
        .next()
        .unwrap_or(href);
    path.to_ascii_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(html: &str) -> ParsedPage {
        LinkExtractor::new().parse(html)
    }

    #[test]
    fn extracts_title_and_links() {
        let page = parse(
            r#"<html><head><title> Papers </title></head>
               <body><a href="/a">First</a><a href="b.html">Second</a></body></html>"#,
        );
        assert_eq!(page.title.as_deref(), Some("Papers"));
        assert_eq!(
            page.links,
            vec![
                FoundLink {
                    url: "/a".into(),
                    text: Some("First".into()),
                    priority: None,
                },
                FoundLink {
                    url: "b.html".into(),
                    text: Some("Second".into()),
                    priority: None,
                },
            ]
        );
    }

    #[test]
    fn pdf_links_get_a_priority_hint() {
        let page = parse(r#"<a href="/docs/paper.PDF?v=2">paper</a><a href="/docs/">index</a>"#);
        assert_eq!(page.links[0].priority, Some(PDF_PRIORITY));
        assert_eq!(page.links[1].priority, None);
    }

    #[test]
    fn nofollow_meta_reports_empty_page() {
        let page = parse(
            r#"<html><head><title>T</title>
               <meta name="ROBOTS" content="noindex, nofollow"></head>
               <body><a href="/a">a</a></body></html>"#,
        );
        assert_eq!(page, ParsedPage::default());
    }

    #[test]
    fn anchors_without_text_carry_none() {
        let page = parse(r#"<a href="/a"><img src="x.png"></a>"#);
        assert_eq!(page.links[0].text, None);
    }

    #[test]
    fn missing_title_is_none() {
        let page = parse(r#"<body><a href="/a">a</a></body>"#);
        assert_eq!(page.title, None);
    }

    #[test]
    fn empty_href_is_skipped() {
        let page = parse(r#"<a href="">nothing</a><a href="/real">real</a>"#);
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].url, "/real");
    }
}
