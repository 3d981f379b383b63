use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Elements whose text never reaches the reader.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "iframe", "svg"];

/// Block-level elements that start a new line in the collected text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "nav", "li", "ul", "ol", "br", "tr",
    "td", "th", "table", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "dd", "dt",
];

/// Text a reader would see in `document`, whitespace-collapsed.
pub fn visible_text(document: &Html) -> String {
    let mut collector = TextCollector::default();
    collector.visit(*document.root_element());
    collector.finish()
}

/// Text of an element subtree, whitespace-collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut collector = TextCollector::default();
    collector.visit(*element);
    collector.finish()
}

/// Strips markup from an HTML fragment.
pub fn html_to_text(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    visible_text(&parsed)
}

#[derive(Default)]
struct TextCollector {
    builder: String,
    last_char: Option<char>,
}

impl TextCollector {
    fn visit(&mut self, node: NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => self.append_text(text),
            Node::Element(element) => {
                let tag = element.name();
                if HIDDEN_TAGS.iter().any(|hidden| tag.eq_ignore_ascii_case(hidden)) {
                    return;
                }
                let block = BLOCK_TAGS.iter().any(|b| tag.eq_ignore_ascii_case(b));
                if block {
                    self.separate();
                }
                for child in node.children() {
                    self.visit(child);
                }
                if block {
                    self.separate();
                }
            }
            _ => {
                for child in node.children() {
                    self.visit(child);
                }
            }
        }
    }

    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.separate();
            } else {
                self.builder.push(ch);
                self.last_char = Some(ch);
            }
        }
    }

    fn separate(&mut self) {
        if self.builder.is_empty() || self.last_char == Some(' ') {
            return;
        }
        self.builder.push(' ');
        self.last_char = Some(' ');
    }

    fn finish(self) -> String {
        self.builder.trim_end().to_string()
    }
}
