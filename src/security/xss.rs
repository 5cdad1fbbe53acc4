//! Markdown rendering and HTML cleaning for user-authored content
//!
//! Post and comment bodies are stored next to a rendered HTML copy. The
//! markdown output goes through an allow-list sanitizer, so raw HTML in a
//! body can only ever produce the tags listed here.

use ammonia::Builder;
use linkify::{LinkFinder, LinkKind};
use pulldown_cmark::{html, CowStr, Event, LinkType, Parser, Tag, TagEnd, TextMergeStream};
use std::collections::{HashMap, HashSet};

/// Tags kept in rendered posts
const POST_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "b", "blockquote", "code", "em", "i", "li", "ol", "pre", "strong", "ul", "h1",
    "h2", "h3", "p",
];

/// Tags kept in rendered comments
const COMMENT_TAGS: &[&str] = &["a", "abbr", "acronym", "b", "code", "em", "i", "strong"];

/// Render a post body to cleaned HTML
pub fn render_markdown(body: &str) -> String {
    render_with(body, POST_TAGS)
}

/// Render a comment body; block-level markup is reduced to its text
pub fn render_comment_markdown(body: &str) -> String {
    render_with(body, COMMENT_TAGS)
}

fn render_with(body: &str, tags: &[&'static str]) -> String {
    let events = linkify_text(TextMergeStream::new(Parser::new(body)));
    let mut raw = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut raw, events.into_iter());
    clean(&raw, tags)
}

/// Wrap bare URLs in text as links. Text inside links and code blocks is left alone.
fn linkify_text<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);

    let mut out = Vec::new();
    let mut verbatim_depth = 0usize;

    for event in events {
        match event {
            e @ Event::Start(Tag::Link { .. }) | e @ Event::Start(Tag::CodeBlock(_)) => {
                verbatim_depth += 1;
                out.push(e);
            }
            e @ Event::End(TagEnd::Link) | e @ Event::End(TagEnd::CodeBlock) => {
                verbatim_depth = verbatim_depth.saturating_sub(1);
                out.push(e);
            }
            Event::Text(text) if verbatim_depth == 0 => {
                for span in finder.spans(&text) {
                    let piece = span.as_str().to_string();
                    match span.kind() {
                        Some(LinkKind::Url) => {
                            out.push(Event::Start(Tag::Link {
                                link_type: LinkType::Autolink,
                                dest_url: CowStr::from(piece.clone()),
                                title: CowStr::Borrowed(""),
                                id: CowStr::Borrowed(""),
                            }));
                            out.push(Event::Text(CowStr::from(piece)));
                            out.push(Event::End(TagEnd::Link));
                        }
                        _ => out.push(Event::Text(CowStr::from(piece))),
                    }
                }
            }
            other => out.push(other),
        }
    }

    out
}

fn clean(html: &str, tags: &[&'static str]) -> String {
    let titled = || ["title"].into_iter().collect::<HashSet<_>>();
    let mut attributes = HashMap::new();
    attributes.insert("a", ["href", "title"].into_iter().collect::<HashSet<_>>());
    attributes.insert("abbr", titled());
    attributes.insert("acronym", titled());

    Builder::default()
        .tags(tags.iter().copied().collect())
        .tag_attributes(attributes)
        .generic_attributes(HashSet::new())
        .link_rel(Some("nofollow"))
        .clean(html)
        .to_string()
        .trim()
        .to_string()
}

/// Check for patterns commonly used in script injection
pub fn contains_xss_patterns(input: &str) -> bool {
    let lowered = input.to_lowercase();
    ["<script", "javascript:", "onerror=", "onload=", "<iframe", "vbscript:"]
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_keeps_allowed_tags() {
        let html = render_markdown("**bold** and <em>raw</em>\n\n## Heading");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<em>raw</em>"));
        assert!(html.contains("<h2>Heading</h2>"));
    }

    #[test]
    fn test_markdown_strips_everything_else() {
        let html = render_markdown("<script>alert(1)</script>\n\n#### four\n\n<img src=x onerror=alert(2)>");
        assert!(!html.contains("script"));
        assert!(!html.contains("alert"));
        assert!(!html.contains("<h4>"));
        assert!(!html.contains("<img"));
        assert!(html.contains("four"));

        let html = render_markdown("[click](javascript:alert(1))");
        assert!(!html.contains("javascript:"));
    }

    #[test]
    fn test_bare_urls_become_links() {
        let html = render_markdown("see https://example.com/a_b now");
        assert!(html.contains("href=\"https://example.com/a_b\""));
        assert!(html.contains("rel=\"nofollow\""));

        let code = render_markdown("```\nhttps://example.com\n```");
        assert!(!code.contains("<a "));
    }

    #[test]
    fn test_comments_allow_inline_markup_only() {
        let html = render_comment_markdown("# Title\n\n*quiet* `code`");
        assert!(!html.contains("<h1>"));
        assert!(!html.contains("<p>"));
        assert!(html.contains("<em>quiet</em>"));
        assert!(html.contains("<code>code</code>"));
    }

    #[test]
    fn test_contains_xss_patterns() {
        assert!(contains_xss_patterns("<img src=x onerror=alert(1)>"));
        assert!(contains_xss_patterns("JavaScript:alert(1)"));
        assert!(!contains_xss_patterns("plain words about java"));
    }
}
