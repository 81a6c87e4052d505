// HTML hydration for the page document model.
//
// scraper's tree is read-only, so parsing copies each element into an owned
// intermediate that the document arena consumes. Only element nodes survive;
// direct text children are flattened onto their parent element.

use indexmap::IndexMap;
use scraper::{ElementRef, Html};

/// An element parsed out of an HTML fragment, ready to be attached to the
/// document arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ParsedNode {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: IndexMap<String, String>,
    pub text: String,
    pub display: Option<String>,
    pub children: Vec<ParsedNode>,
}

/// Parse an HTML fragment into top-level elements.
///
/// Non-element top-level content (stray text, comments) is dropped, matching
/// what a structural mutation observer would report.
pub(super) fn parse_fragment(html: &str) -> Vec<ParsedNode> {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .map(convert)
        .collect()
}

fn convert(element: ElementRef) -> ParsedNode {
    let value = element.value();

    let mut display = None;
    let mut attrs = IndexMap::new();
    for (name, attr_value) in value.attrs() {
        match name {
            // Class list and inline display are first-class node fields.
            "class" => {}
            "style" => display = display_from_style(attr_value),
            _ => {
                attrs.insert(name.to_string(), attr_value.to_string());
            }
        }
    }

    ParsedNode {
        tag: value.name().to_string(),
        classes: value.classes().map(String::from).collect(),
        attrs,
        text: direct_text(element),
        display,
        children: element
            .children()
            .filter_map(ElementRef::wrap)
            .map(convert)
            .collect(),
    }
}

/// Concatenate the element's direct text children (not descendants).
fn direct_text(element: ElementRef) -> String {
    element
        .children()
        .filter_map(|child| match child.value() {
            scraper::Node::Text(text) => Some(&**text),
            _ => None,
        })
        .collect()
}

/// Pull a `display` declaration out of an inline style attribute.
fn display_from_style(style: &str) -> Option<String> {
    style.split(';').find_map(|declaration| {
        let (property, value) = declaration.split_once(':')?;
        if property.trim().eq_ignore_ascii_case("display") {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_element_with_classes() {
        let parsed = parse_fragment(r#"<div class="js-timeline-item comment"></div>"#);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].tag, "div");
        assert_eq!(parsed[0].classes, vec!["js-timeline-item", "comment"]);
        assert!(parsed[0].children.is_empty());
    }

    #[test]
    fn test_parse_nested_elements_and_text() {
        let parsed = parse_fragment(
            r#"<div class="TimelineItem"><a class="author" href="/alice">alice</a></div>"#,
        );
        assert_eq!(parsed.len(), 1);

        let container = &parsed[0];
        assert_eq!(container.children.len(), 1);

        let author = &container.children[0];
        assert_eq!(author.tag, "a");
        assert_eq!(author.classes, vec!["author"]);
        assert_eq!(author.attrs.get("href").map(String::as_str), Some("/alice"));
        assert_eq!(author.text, "alice");
    }

    #[test]
    fn test_parse_multiple_top_level_elements() {
        let parsed = parse_fragment("<div>one</div><span>two</span>");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].tag, "div");
        assert_eq!(parsed[1].tag, "span");
    }

    #[test]
    fn test_inline_display_becomes_node_field() {
        let parsed = parse_fragment(r#"<div style="color: red; display: none"></div>"#);
        assert_eq!(parsed[0].display.as_deref(), Some("none"));

        let parsed = parse_fragment(r#"<div style="color: red"></div>"#);
        assert_eq!(parsed[0].display, None);
    }

    #[test]
    fn test_direct_text_excludes_descendant_text() {
        let parsed = parse_fragment("<div>outer<span>inner</span></div>");
        assert_eq!(parsed[0].text, "outer");
        assert_eq!(parsed[0].children[0].text, "inner");
    }

    #[test]
    fn test_display_from_style_parsing() {
        assert_eq!(display_from_style("display: none;"), Some("none".to_string()));
        assert_eq!(display_from_style("display:flex"), Some("flex".to_string()));
        assert_eq!(display_from_style("color: red"), None);
    }
}
