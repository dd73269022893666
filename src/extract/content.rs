//! Markup stripping and visible text extraction

use scraper::{Html, Selector};

/// Elements whose text never reaches the extractor
const NON_CONTENT_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Title and visible text of a parsed page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    /// Trimmed text of the first `<title>`, empty when absent
    pub title: String,

    /// Visible text fragments, each trimmed, joined by single spaces
    pub text: String,
}

/// Parse a page and return its title and visible text
///
/// The HTML parser is error tolerant, so any byte soup (including plain text
/// with no markup at all) produces a result.
pub fn parse_page(html: &str) -> PageText {
    let document = Html::parse_document(html);

    PageText {
        title: title(&document),
        text: visible_text(&document),
    }
}

fn title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn visible_text(document: &Html) -> String {
    let mut fragments = Vec::new();

    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| NON_CONTENT_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            fragments.push(trimmed);
        }
    }

    fragments.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passthrough() {
        let page = parse_page("Contact: alice@x.com");
        assert_eq!(page.title, "");
        assert_eq!(page.text, "Contact: alice@x.com");
    }

    #[test]
    fn test_strips_non_content() {
        let page = parse_page(
            "<html><head><title> Adani Group </title><style>p{}</style></head>\
             <body><h1>Welcome</h1><script>track()</script>\
             <noscript>Enable JS</noscript><p>Ports  and\n energy</p></body></html>",
        );

        assert_eq!(page.title, "Adani Group");
        assert_eq!(page.text, "Adani Group Welcome Ports  and\n energy");
    }

    #[test]
    fn test_malformed_markup() {
        let page = parse_page("<div><p>Unclosed <b>tags <title>Late</div>");
        assert!(page.text.contains("Unclosed"));
        assert!(page.text.contains("tags"));
    }
}
