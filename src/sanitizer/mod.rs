//! Allow-list HTML sanitizer for article bodies.
//!
//! Markup is parsed with html5ever (through `scraper`) and re-serialized
//! keeping only known-safe elements and attributes. Serializing a parsed tree
//! gives well-formed output, which is what makes the sanitizer idempotent.

use std::sync::LazyLock;

use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Node};
use url::Url;

/// Embedded players whose iframes survive sanitizing.
static TRUSTED_IFRAME_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?:)?//(?:www\.youtube(?:-nocookie)?\.com/embed/|player\.vimeo\.com/video/)",
    )
    .expect("trusted iframe pattern")
});

/// Dropped together with everything inside them.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "noscript", "template", "object", "embed", "applet", "iframe", "frame",
    "frameset", "form", "input", "button", "select", "textarea", "link", "meta", "base", "head",
    "title", "svg", "math",
];

const ALLOWED_ELEMENTS: &[&str] = &[
    "a", "abbr", "address", "article", "aside", "audio", "b", "bdi", "bdo", "blockquote", "br",
    "caption", "cite", "code", "col", "colgroup", "dd", "del", "details", "dfn", "div", "dl", "dt",
    "em", "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "i", "img", "ins", "kbd", "li", "mark", "ol", "p", "picture", "pre", "q", "rp", "rt", "ruby",
    "s", "samp", "section", "small", "source", "span", "strike", "strong", "sub", "summary",
    "sup", "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr", "u", "ul", "var",
    "video", "wbr",
];

const VOID_ELEMENTS: &[&str] = &["br", "col", "hr", "img", "source", "wbr"];

/// Attributes with URL values; checked against the allowed schemes.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "poster", "cite"];

const IFRAME_ATTRIBUTES: &[&str] = &["src", "width", "height", "frameborder", "allowfullscreen"];

fn allowed_attributes(element: &str) -> &'static [&'static str] {
    match element {
        "a" => &["href", "title"],
        "img" => &["src", "alt", "title", "width", "height"],
        "audio" => &["src", "controls"],
        "video" => &["src", "controls", "poster", "width", "height"],
        "source" => &["src", "type"],
        "blockquote" | "q" | "del" | "ins" => &["cite"],
        "td" | "th" => &["colspan", "rowspan"],
        "col" | "colgroup" => &["span"],
        "ol" => &["start", "reversed"],
        "time" => &["datetime"],
        "abbr" | "dfn" => &["title"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sanitizer;

impl Sanitizer {
    pub fn new() -> Self {
        Self
    }

    pub fn sanitize(&self, raw: &str) -> String {
        self.clean(raw, None)
    }

    /// Like [`sanitize`](Self::sanitize), resolving relative links and image
    /// sources against `base`.
    pub fn sanitize_with_base(&self, raw: &str, base: &str) -> String {
        let base = Url::parse(base).ok();
        self.clean(raw, base.as_ref())
    }

    fn clean(&self, raw: &str, base: Option<&Url>) -> String {
        let fragment = Html::parse_fragment(raw);
        let mut out = String::with_capacity(raw.len());
        write_children(fragment.root_element(), base, &mut out);
        out
    }
}

fn write_children(parent: ElementRef<'_>, base: Option<&Url>, out: &mut String) {
    for child in parent.children() {
        if let Some(element) = ElementRef::wrap(child) {
            write_element(element, base, out);
        } else if let Node::Text(text) = child.value() {
            out.push_str(&encode_text(&**text));
        }
    }
}

fn write_element(node: ElementRef<'_>, base: Option<&Url>, out: &mut String) {
    let element = node.value();
    let name = element.name();

    if name == "iframe" {
        if let Some(src) = element.attr("src").filter(|s| TRUSTED_IFRAME_SRC.is_match(s)) {
            write_iframe(element, src, out);
        }
        return;
    }

    if DROP_WITH_CONTENT.contains(&name) {
        return;
    }

    if !ALLOWED_ELEMENTS.contains(&name) {
        write_children(node, base, out);
        return;
    }

    out.push('<');
    out.push_str(name);
    for &attribute in allowed_attributes(name) {
        let Some(value) = element.attr(attribute) else {
            continue;
        };
        let value = if URL_ATTRIBUTES.contains(&attribute) {
            match safe_url(value, base) {
                Some(url) => url,
                None => continue,
            }
        } else {
            value.to_string()
        };
        push_attribute(out, attribute, &value);
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    // The parser drops one newline right after `<pre>`; re-emit it so a
    // leading newline in the content survives the next pass.
    if name == "pre" && starts_with_newline(node) {
        out.push('\n');
    }

    write_children(node, base, out);

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn starts_with_newline(node: ElementRef<'_>) -> bool {
    node.first_child().is_some_and(
        |child| matches!(child.value(), Node::Text(text) if text.starts_with('\n')),
    )
}

/// Trusted embeds keep their `src` byte for byte.
fn write_iframe(element: &Element, src: &str, out: &mut String) {
    out.push_str("<iframe");
    for &attribute in IFRAME_ATTRIBUTES {
        let value = if attribute == "src" {
            Some(src)
        } else {
            element.attr(attribute)
        };
        if let Some(value) = value {
            push_attribute(out, attribute, value);
        }
    }
    out.push_str("></iframe>");
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&encode_double_quoted_attribute(value));
    out.push('"');
}

/// Accepts http(s), mailto and relative URLs; relative ones are resolved
/// when a base is known.
fn safe_url(value: &str, base: Option<&Url>) -> Option<String> {
    let value = value.trim();

    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https" | "mailto").then(|| value.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(value).ok().map(String::from),
            None => Some(value.to_string()),
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(raw: &str) -> String {
        Sanitizer::new().sanitize(raw)
    }

    #[test]
    fn test_removes_script_with_content() {
        let clean = sanitize("<p>Hello</p><script>alert('x')</script>");
        assert_eq!(clean, "<p>Hello</p>");
    }

    #[test]
    fn test_strips_class_style_and_handlers() {
        let clean = sanitize(
            r#"<p class="lead" style="color:red" id="x" onclick="evil()">Text</p>"#,
        );
        assert_eq!(clean, "<p>Text</p>");
    }

    #[test]
    fn test_keeps_safe_links_and_images() {
        let clean = sanitize(
            r#"<a href="https://example.com/a" title="A" target="_blank">link</a><img src="https://example.com/i.png" alt="pic">"#,
        );
        assert_eq!(
            clean,
            r#"<a href="https://example.com/a" title="A">link</a><img src="https://example.com/i.png" alt="pic">"#
        );
    }

    #[test]
    fn test_drops_javascript_urls() {
        let clean = sanitize(r#"<a href="javascript:alert(1)">x</a>"#);
        assert_eq!(clean, "<a>x</a>");
    }

    #[test]
    fn test_unwraps_unknown_elements() {
        let clean = sanitize("<custom-tag><em>kept</em></custom-tag>");
        assert_eq!(clean, "<em>kept</em>");
    }

    #[test]
    fn test_escapes_text() {
        let clean = sanitize("1 &lt; 2 &amp; 3");
        assert_eq!(clean, "1 &lt; 2 &amp; 3");
    }

    #[test]
    fn test_trusted_iframes_survive() {
        let youtube = r#"<iframe src="https://www.youtube.com/embed/abc123" width="560" height="315" style="border:0" class="video"></iframe>"#;
        assert_eq!(
            sanitize(youtube),
            r#"<iframe src="https://www.youtube.com/embed/abc123" width="560" height="315"></iframe>"#
        );

        let vimeo = r#"<iframe src="//player.vimeo.com/video/42"></iframe>"#;
        assert_eq!(sanitize(vimeo), vimeo);

        let nocookie = r#"<iframe src="https://www.youtube-nocookie.com/embed/xyz"></iframe>"#;
        assert_eq!(sanitize(nocookie), nocookie);
    }

    #[test]
    fn test_untrusted_iframes_removed() {
        let clean = sanitize(r#"<p>a</p><iframe src="https://evil.example.com/embed/x"></iframe>"#);
        assert_eq!(clean, "<p>a</p>");
    }

    #[test]
    fn test_resolves_relative_urls_against_base() {
        let clean = Sanitizer::new().sanitize_with_base(
            r#"<a href="/post/1">p</a><img src="img/a.png">"#,
            "https://example.com/blog/index.html",
        );
        assert_eq!(
            clean,
            r#"<a href="https://example.com/post/1">p</a><img src="https://example.com/blog/img/a.png">"#
        );
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "<p>Hello <b>world</b></p><script>x()</script>",
            r#"<div class="a"><p style="x">One<br>Two</p><ul><li>i</li></ul></div>"#,
            r#"<iframe src="https://player.vimeo.com/video/1" onload="x"></iframe><p>t &amp; u</p>"#,
            "<table><tr><td>cell</td></tr></table>",
            "<pre>\n\ncode</pre>",
            "<pre>\nfn main() {}\n</pre>",
            "plain text with <unknown>tags</unknown> & ampersands",
        ];

        for input in inputs {
            let once = sanitize(input);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_pre_keeps_leading_newline() {
        assert_eq!(sanitize("<pre>\n\ncode</pre>"), "<pre>\n\ncode</pre>");
        assert_eq!(sanitize("<pre>\ncode</pre>"), "<pre>code</pre>");
    }

    #[test]
    fn test_output_never_contains_script_class_or_style() {
        let inputs = [
            r#"<SCRIPT SRC=//evil.example.com/x.js></SCRIPT>"#,
            r#"<img src=x onerror=alert(1) class=c style=s>"#,
            r#"<div><span class="x"><script>a</script></span></div>"#,
            r#"<svg><script>alert(1)</script></svg>"#,
            r#"<p style="position:fixed">overlay</p>"#,
        ];

        for input in inputs {
            let clean = sanitize(input).to_lowercase();
            assert!(!clean.contains("<script"), "{}", clean);
            assert!(!clean.contains("class="), "{}", clean);
            assert!(!clean.contains("style="), "{}", clean);
        }
    }
}
