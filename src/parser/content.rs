//! Pure content extraction for markdown and code files
//!
//! Everything here is a function of (content, configuration) with no
//! filesystem access, so the parsers and their tests share one code path:
//! BOM and line-ending detection, frontmatter, identifiers, tags, links,
//! headings, and cleaned word/character counts.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::descriptor::Frontmatter;

/// UTF-8 byte-order mark
pub const BOM: &str = "\u{feff}";

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(?:^|\s)#([\w\-/]+)").expect("tag pattern compiles"));

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s{0,3}#\s+(.+)$").expect("heading pattern compiles"));

static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`[^`\n]*`").expect("inline code pattern compiles"));

static HTML_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern compiles"));

static PURE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+$").expect("number pattern compiles"));

static HEX_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("hex pattern compiles")
});

/// Split a leading byte-order mark off `content`.
///
/// Returns the BOM prefix ("" when absent) and the remaining text; the
/// prefix is re-attached verbatim when the file is written back.
pub fn strip_bom(content: &str) -> (String, &str) {
    match content.strip_prefix(BOM) {
        Some(rest) => (BOM.to_string(), rest),
        None => (String::new(), content),
    }
}

/// Detect the dominant line-ending sequence of `content`.
///
/// Recognizes `\n`, `\r`, `\r\n` and the reversed `\n\r`. With mixed
/// endings the majority wins; ties go to the first style encountered.
/// Content without any line break defaults to `\n`.
pub fn detect_linefeed(content: &str) -> String {
    // (count, first occurrence index) per style: lf, cr, crlf, lfcr
    let mut counts = [(0usize, usize::MAX); 4];
    let bytes = content.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let style = match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => Some((2, 2)),
            b'\r' => Some((1, 1)),
            b'\n' if bytes.get(i + 1) == Some(&b'\r') => Some((3, 2)),
            b'\n' => Some((0, 1)),
            _ => None,
        };
        match style {
            Some((idx, width)) => {
                let (count, first) = &mut counts[idx];
                *count += 1;
                if *first == usize::MAX {
                    *first = i;
                }
                i += width;
            }
            None => i += 1,
        }
    }

    let winner = counts
        .iter()
        .enumerate()
        .filter(|(_, (count, _))| *count > 0)
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
        .map(|(idx, _)| idx);

    match winner {
        Some(1) => "\r".to_string(),
        Some(2) => "\r\n".to_string(),
        Some(3) => "\n\r".to_string(),
        _ => "\n".to_string(),
    }
}

/// Split YAML frontmatter off the top of `content`.
///
/// Frontmatter starts with a `---` line at the very beginning and ends at
/// the next `---` or `...` line. Returns the raw YAML (without the fences)
/// and the body after the closing fence. Content without a well-formed
/// block comes back unchanged as the body.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let mut lines = content.split_inclusive('\n');
    let first = match lines.next() {
        Some(line) => line,
        None => return (None, content),
    };
    if first.trim_end() != "---" {
        return (None, content);
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &content[yaml_start..offset];
            let body = &content[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }

    // Unterminated fence: treat the whole thing as body
    (None, content)
}

/// Parse the retained frontmatter subset out of raw YAML.
///
/// `keywords` and `tags` accept either a YAML sequence or a comma/space
/// separated scalar. Unparseable YAML yields `None` — a broken frontmatter
/// block never fails the file parse.
pub fn parse_frontmatter(yaml: &str) -> Option<Frontmatter> {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml).ok()?;
    let map = value.as_mapping()?;

    let title = map
        .get("title")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let fm = Frontmatter {
        title,
        keywords: yaml_string_list(map.get("keywords")),
        tags: yaml_string_list(map.get("tags")),
    };
    if fm.is_empty() {
        None
    } else {
        Some(fm)
    }
}

fn yaml_string_list(value: Option<&serde_yaml::Value>) -> Vec<String> {
    match value {
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| match v {
                serde_yaml::Value::String(s) => Some(s.trim().to_string()),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_yaml::Value::String(s)) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Find the first identifier in the file name, then the body.
///
/// A body match immediately preceded by the link-start delimiter is
/// skipped so `[[20240101120000]]` stays a link, not this file's id.
pub fn extract_id(
    file_name: &str,
    body: &str,
    id_re: &Regex,
    link_start: &str,
) -> Option<String> {
    if let Some(m) = id_re.find(file_name) {
        return Some(m.as_str().to_string());
    }
    for m in id_re.find_iter(body) {
        if !link_start.is_empty() && body[..m.start()].ends_with(link_start) {
            continue;
        }
        return Some(m.as_str().to_string());
    }
    None
}

/// First level-1 heading of the body, if any
pub fn extract_first_heading(body: &str) -> Option<String> {
    HEADING_RE
        .captures(body)
        .map(|caps| caps[1].trim().to_string())
}

/// Collect tags from the body and the frontmatter.
///
/// Body tags are `#word` tokens preceded by whitespace (an escaping
/// backslash therefore disqualifies), excluding pure numbers and 3/6-digit
/// hex-color lookalikes. Frontmatter `keywords` and `tags` are merged in.
/// The result is case-folded and deduplicated, in encounter order.
pub fn extract_tags(body: &str, frontmatter: Option<&Frontmatter>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        let tag = raw.to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    };

    for caps in TAG_RE.captures_iter(body) {
        let word = &caps[1];
        if PURE_NUMBER_RE.is_match(word) || HEX_COLOR_RE.is_match(word) {
            continue;
        }
        push(word);
    }

    if let Some(fm) = frontmatter {
        for word in fm.keywords.iter().chain(fm.tags.iter()) {
            push(word);
        }
    }

    tags
}

/// Extract outgoing internal link targets between the configured delimiters.
///
/// A pipe inside the link separates target from alias; the target is kept.
/// Links never span lines.
pub fn extract_links(content: &str, link_start: &str, link_end: &str) -> Vec<String> {
    let mut links = Vec::new();
    if link_start.is_empty() || link_end.is_empty() {
        return links;
    }

    let mut rest = content;
    while let Some(open) = rest.find(link_start) {
        let after = &rest[open + link_start.len()..];
        match after.find(link_end) {
            Some(close) => {
                let inner = &after[..close];
                if !inner.is_empty() && !inner.contains('\n') {
                    let target = inner.split('|').next().unwrap_or(inner).trim();
                    if !target.is_empty() {
                        links.push(target.to_string());
                    }
                }
                rest = &after[close + link_end.len()..];
            }
            None => break,
        }
    }
    links
}

/// Word and character counts over prose only.
///
/// Fenced code blocks, inline code and HTML comments are removed first;
/// the caller passes the body with frontmatter already stripped.
pub fn count_words_chars(body: &str) -> (usize, usize) {
    let cleaned = strip_non_prose(body);
    let words = cleaned.split_whitespace().count();
    let chars = cleaned.chars().count();
    (words, chars)
}

/// Remove fenced code blocks, inline code spans and HTML comments
fn strip_non_prose(body: &str) -> String {
    let mut kept = String::with_capacity(body.len());
    let mut in_fence = false;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        kept.push_str(line);
        kept.push('\n');
    }
    let kept = INLINE_CODE_RE.replace_all(&kept, " ");
    HTML_COMMENT_RE.replace_all(&kept, " ").into_owned()
}
