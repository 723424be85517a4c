//! Tag scraping for providers that answer in XML-looking text which is not
//! reliably well-formed. Matching is ASCII case-insensitive on tag names and the
//! first occurrence wins.

/// Inner text of the first `<tag>…</tag>` pair, trimmed, with CDATA unwrapped
/// and the common entities decoded. `None` when the tag is absent or unclosed.
pub fn first_tag(raw: &str, tag: &str) -> Option<String> {
    tag_spans(raw, tag).next().map(clean)
}

/// Inner text of every `<tag>…</tag>` block in document order, untrimmed so
/// nested tags can be scraped from each block.
pub fn blocks<'a>(raw: &'a str, tag: &str) -> Vec<&'a str> {
    tag_spans(raw, tag).collect()
}

fn tag_spans<'a>(raw: &'a str, tag: &str) -> impl Iterator<Item = &'a str> + 'a {
    // to_ascii_lowercase keeps byte offsets identical to `raw`
    let haystack = raw.to_ascii_lowercase();
    let open = format!("<{}>", tag.to_ascii_lowercase());
    let close = format!("</{}>", tag.to_ascii_lowercase());

    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some(start) = haystack[cursor..].find(&open) {
        let inner_start = cursor + start + open.len();
        match haystack[inner_start..].find(&close) {
            Some(end) => {
                spans.push((inner_start, inner_start + end));
                cursor = inner_start + end + close.len();
            }
            None => break,
        }
    }

    spans.into_iter().map(move |(from, to)| &raw[from..to])
}

fn clean(inner: &str) -> String {
    let trimmed = inner.trim();
    let unwrapped = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(trimmed);

    unwrapped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Escape a value before it is embedded in an outgoing tag document.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
