//! Deterministic serializer over the pruned tree.
//!
//! The parsed document is never mutated: removal rules are applied while
//! walking, and attributes are emitted in sorted order.

use scraper::{ElementRef, Node};

use crate::rules::{Root, is_removed};

/// Elements that count as content even with no text.
const MEDIA_TAGS: &[&str] = &["img", "br", "hr"];

/// Text directly under these parents keeps its original whitespace.
const PRESERVE_TEXT_PARENTS: &[&str] = &[
    "script", "style", "table", "thead", "tbody", "tfoot", "tr", "td", "th", "ul", "ol", "li",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Maximum consecutive `<br>` siblings kept.
const MAX_BR_RUN: usize = 2;

pub(crate) fn render_root(root: &Root) -> String {
    let mut out = String::new();
    match root {
        Root::Element(el) => render_element(*el, &mut out),
        Root::Children(el) => render_children(*el, &mut out),
    }
    out
}

/// Whether a surviving descendant carries text or media.
fn has_content(el: ElementRef) -> bool {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                if !text.trim().is_empty() {
                    return true;
                }
            }
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_removed(&child_el) {
                    continue;
                }
                if MEDIA_TAGS.contains(&child_el.value().name()) || has_content(child_el) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn render_element(el: ElementRef, out: &mut String) {
    let value = el.value();
    let name = value.name();

    out.push('<');
    out.push_str(name);

    let mut attrs: Vec<(&str, &str)> = value.attrs().filter(|(k, _)| *k != "style").collect();
    attrs.sort_unstable();
    for (key, val) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attr(val, out);
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    render_children(el, out);

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn render_children(parent: ElementRef, out: &mut String) {
    let parent_name = parent.value().name();
    let preserve = PRESERVE_TEXT_PARENTS.contains(&parent_name);
    let mut br_run = 0usize;

    for child in parent.children() {
        match child.value() {
            Node::Text(text) => {
                let raw: &str = text;
                // Whitespace between line breaks does not end a run.
                if !raw.trim().is_empty() {
                    br_run = 0;
                }
                if preserve {
                    escape_text(raw, out);
                } else {
                    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
                    escape_text(&collapsed, out);
                }
            }
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_removed(&child_el) {
                    continue;
                }
                let name = child_el.value().name();
                if name == "br" {
                    br_run += 1;
                    if br_run > MAX_BR_RUN {
                        continue;
                    }
                } else {
                    if !MEDIA_TAGS.contains(&name) && !has_content(child_el) {
                        continue;
                    }
                    br_run = 0;
                }
                render_element(child_el, out);
            }
            // Comments, doctypes and processing instructions are dropped.
            _ => {}
        }
    }
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::select_root;
    use scraper::Html;

    fn render(html: &str) -> String {
        let doc = Html::parse_document(html);
        render_root(&select_root(&doc))
    }

    #[test]
    fn attributes_sorted_and_escaped() {
        let out = render(r#"<main><a title='a"b' href="/x?a=1&amp;b=2" class="link">go</a></main>"#);
        assert_eq!(
            out,
            r#"<main><a class="link" href="/x?a=1&amp;b=2" title="a&quot;b">go</a></main>"#
        );
    }

    #[test]
    fn text_is_escaped() {
        let out = render("<main><p>1 &lt; 2 &amp; 3</p></main>");
        assert_eq!(out, "<main><p>1 &lt; 2 &amp; 3</p></main>");
    }

    #[test]
    fn br_runs_collapse_to_two() {
        assert_eq!(
            render("<main><p>a<br><br><br><br>b</p></main>"),
            "<main><p>a<br><br>b</p></main>"
        );
        assert_eq!(
            render("<main><p>a<br>\n<br>\n<br>\nb</p></main>"),
            "<main><p>a<br><br>b</p></main>"
        );
        assert_eq!(
            render("<main><p>a<br><br>b<br><br>c</p></main>"),
            "<main><p>a<br><br>b<br><br>c</p></main>"
        );
    }

    #[test]
    fn empty_elements_dropped_media_kept() {
        assert_eq!(
            render(r#"<main><div><span> </span></div><p><img src="a.png"></p><hr></main>"#),
            r#"<main><p><img src="a.png"></p><hr></main>"#
        );
    }

    #[test]
    fn table_and_list_text_preserved() {
        assert_eq!(
            render("<main><table><tr><td>  a   b  </td></tr></table></main>"),
            "<main><table><tbody><tr><td>  a   b  </td></tr></tbody></table></main>"
        );
        assert_eq!(
            render("<main><ul><li> one  two </li></ul></main>"),
            "<main><ul><li> one  two </li></ul></main>"
        );
    }
}
