use std::fmt::Write;

use ego_tree::NodeRef;
use scraper::{Html, Node};

/// Elements whose subtrees carry no article content.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "aside", "noscript", "iframe", "button", "head",
];

/// Convert an HTML fragment into ATX-style Markdown.
///
/// Non-content markup (navigation, scripts, styles) is dropped entirely;
/// the rest of the DOM is walked in document order and rendered with
/// fenced code blocks and `-` bullet markers.
#[inline]
pub fn html_to_markdown(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    for child in fragment.tree.root().children() {
        render_node(child, &mut out, 0);
    }
    tidy(&out)
}

fn render_node(node: NodeRef<'_, Node>, out: &mut String, list_depth: usize) {
    match node.value() {
        Node::Text(text) => push_collapsed(out, text),
        Node::Element(element) => {
            let tag = element.name();
            if SKIPPED_TAGS.contains(&tag) {
                return;
            }
            match tag {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let level = tag.as_bytes()[1] - b'0';
                    start_block(out);
                    for _ in 0..level {
                        out.push('#');
                    }
                    out.push(' ');
                    render_inline_children(node, out);
                    end_block(out);
                }
                "p" | "div" | "section" | "article" | "main" | "body" | "html" => {
                    start_block(out);
                    for child in node.children() {
                        render_node(child, out, list_depth);
                    }
                    end_block(out);
                }
                "br" => out.push('\n'),
                "hr" => {
                    start_block(out);
                    out.push_str("---");
                    end_block(out);
                }
                "ul" | "ol" => {
                    start_block(out);
                    let ordered = tag == "ol";
                    let mut position = 1;
                    for child in node.children() {
                        if let Node::Element(el) = child.value() {
                            if el.name() == "li" {
                                render_list_item(child, out, list_depth, ordered, position);
                                position += 1;
                            }
                        }
                    }
                    end_block(out);
                }
                "pre" => {
                    start_block(out);
                    out.push_str("```\n");
                    push_raw_text(node, out);
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str("```");
                    end_block(out);
                }
                "code" => {
                    out.push('`');
                    render_inline_children(node, out);
                    out.push('`');
                }
                "a" => {
                    let href = element.attr("href").unwrap_or_default();
                    out.push('[');
                    render_inline_children(node, out);
                    out.push_str("](");
                    out.push_str(href);
                    out.push(')');
                }
                "img" => {
                    let alt = element.attr("alt").unwrap_or_default();
                    let src = element.attr("src").unwrap_or_default();
                    out.push_str("![");
                    out.push_str(alt);
                    out.push_str("](");
                    out.push_str(src);
                    out.push(')');
                }
                "strong" | "b" => {
                    out.push_str("**");
                    render_inline_children(node, out);
                    out.push_str("**");
                }
                "em" | "i" => {
                    out.push('*');
                    render_inline_children(node, out);
                    out.push('*');
                }
                "tr" => {
                    start_line(out);
                    let mut first = true;
                    for child in node.children() {
                        if let Node::Element(el) = child.value() {
                            if el.name() == "td" || el.name() == "th" {
                                if !first {
                                    out.push_str(" | ");
                                }
                                render_inline_children(child, out);
                                first = false;
                            }
                        }
                    }
                }
                _ => {
                    for child in node.children() {
                        render_node(child, out, list_depth);
                    }
                }
            }
        }
        _ => {}
    }
}

fn render_list_item(
    node: NodeRef<'_, Node>,
    out: &mut String,
    depth: usize,
    ordered: bool,
    position: usize,
) {
    start_line(out);
    for _ in 0..depth {
        out.push_str("  ");
    }
    if ordered {
        let _ = write!(out, "{position}. ");
    } else {
        out.push_str("- ");
    }
    for child in node.children() {
        render_node(child, out, depth + 1);
    }
}

fn render_inline_children(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        render_node(child, out, 0);
    }
}

/// Append text with runs of whitespace collapsed to a single space.
fn push_collapsed(out: &mut String, text: &str) {
    let mut pending_space = out.ends_with(char::is_whitespace) || out.is_empty();
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !pending_space {
                out.push(' ');
                pending_space = true;
            }
        } else {
            out.push(ch);
            pending_space = false;
        }
    }
}

/// Append the raw text of a subtree, preserving whitespace (code blocks).
fn push_raw_text(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => push_raw_text(child, out),
            _ => {}
        }
    }
}

fn start_block(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with("\n\n") {
        while out.ends_with('\n') {
            out.pop();
        }
        out.push_str("\n\n");
    }
}

fn end_block(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.ends_with("\n\n") {
        while out.ends_with('\n') {
            out.pop();
        }
        out.push_str("\n\n");
    }
}

fn start_line(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Collapse excess blank lines and trim the result.
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
