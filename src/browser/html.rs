//! HTML fragment to plain text, as returned by `extract_text`.

use regex::Regex;
use std::sync::LazyLock;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<script[^>]*>[\s\S]*?</script>").unwrap());

static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<style[^>]*>[\s\S]*?</style>").unwrap());

/// Only ASCII whitespace may sit inside a break tag
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br[\t\n\f\r ]*/?>").unwrap());

/// Block-level open and close tags become line breaks
static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|h[1-6]|ul|ol|li|blockquote|pre|table|tr|td|th)[^>]*>").unwrap()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Applied in order, so `&amp;lt;` decodes all the way to `<`
const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

pub fn strip_html_tags(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = BR_RE.replace_all(&text, "\n");
    let text = BLOCK_RE.replace_all(&text, "\n");
    let mut text = TAG_RE.replace_all(&text, "").into_owned();

    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }

    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_with_break_and_script() {
        assert_eq!(
            strip_html_tags("<p>Hello<br>World</p><script>x</script>"),
            "Hello\nWorld"
        );
    }

    #[test]
    fn break_tag_whitespace_is_ascii_only() {
        assert_eq!(strip_html_tags("a<BR \t/>b"), "a\nb");
        assert_eq!(strip_html_tags("a<br\n>b"), "a\nb");
        assert_eq!(strip_html_tags("a<br\u{a0}>b"), "ab");
        assert_eq!(strip_html_tags("a<br\u{b}>b"), "ab");
    }

    #[test]
    fn style_and_multiline_script_removed() {
        let html = "<STYLE type=\"text/css\">body { color: red }</STYLE>\
                    <Script>\nvar a = 1;\n</Script><div>Kept</div>";
        assert_eq!(strip_html_tags(html), "Kept");
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(
            strip_html_tags("<span>a &lt;b&gt; &amp; &quot;c&quot; &#39;d&#39;&nbsp;e</span>"),
            "a <b> & \"c\" 'd' e"
        );
        assert_eq!(strip_html_tags("&amp;lt;"), "<");
    }

    #[test]
    fn blank_lines_collapsed() {
        let html = "<ul>\n  <li> one </li>\n\n  <li>two</li>\n</ul><h2>Title</h2><br/>";
        assert_eq!(strip_html_tags(html), "one\ntwo\nTitle");
    }

    #[test]
    fn inline_tags_do_not_break_lines() {
        assert_eq!(strip_html_tags("<b>bold</b> and <a href=\"#\">link</a>"), "bold and link");
    }
}
