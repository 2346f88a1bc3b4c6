//! Input sanitization.
//!
//! # Responsibilities
//! - Map raw input plus a [`FieldType`] to a form safe to render and store
//! - Keep an allow-listed subset of markup for rich-text classes
//! - Never fail: the worst case is an empty string
//!
//! # Design Decisions
//! - Allow-lists are declarative tables ([`MarkupPolicy`]), one per class
//! - Executable elements are removed with their content; other disallowed
//!   tags are removed and their text kept
//! - Markup cleaning repeats to a fixed point, so
//!   `sanitize(sanitize(x, t), t) == sanitize(x, t)` holds for every class

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::security::field::FieldType;

const FILE_NAME_MAX_CHARS: usize = 100;
const MAX_MARKUP_PASSES: usize = 8;
const VOID_TAGS: [&str; 3] = ["br", "hr", "img"];

/// An allowed element and the attributes it may keep.
#[derive(Debug)]
pub struct TagRule {
    pub name: &'static str,
    pub attributes: &'static [&'static str],
}

/// Declarative markup allow-list for a content class.
#[derive(Debug)]
pub struct MarkupPolicy {
    pub tags: &'static [TagRule],
}

impl MarkupPolicy {
    pub fn rule(&self, name: &str) -> Option<&TagRule> {
        self.tags.iter().find(|t| t.name == name)
    }
}

const fn tag(name: &'static str, attributes: &'static [&'static str]) -> TagRule {
    TagRule { name, attributes }
}

const NONE: &[&str] = &[];
const LINK: &[&str] = &["href", "title"];
const IMAGE: &[&str] = &["src", "alt", "width", "height"];
const CELL: &[&str] = &["colspan", "rowspan"];

pub static FREE_TEXT_POLICY: MarkupPolicy = MarkupPolicy {
    tags: &[
        tag("a", LINK),
        tag("b", NONE),
        tag("br", NONE),
        tag("em", NONE),
        tag("i", NONE),
        tag("li", NONE),
        tag("ol", NONE),
        tag("p", NONE),
        tag("strong", NONE),
        tag("u", NONE),
        tag("ul", NONE),
    ],
};

pub static EDUCATIONAL_POLICY: MarkupPolicy = MarkupPolicy {
    tags: &[
        tag("a", LINK),
        tag("b", NONE),
        tag("blockquote", NONE),
        tag("br", NONE),
        tag("code", NONE),
        tag("em", NONE),
        tag("h1", NONE),
        tag("h2", NONE),
        tag("h3", NONE),
        tag("h4", NONE),
        tag("h5", NONE),
        tag("h6", NONE),
        tag("hr", NONE),
        tag("i", NONE),
        tag("img", IMAGE),
        tag("li", NONE),
        tag("ol", NONE),
        tag("p", NONE),
        tag("pre", NONE),
        tag("span", NONE),
        tag("strong", NONE),
        tag("sub", NONE),
        tag("sup", NONE),
        tag("table", NONE),
        tag("tbody", NONE),
        tag("td", CELL),
        tag("th", CELL),
        tag("thead", NONE),
        tag("tr", NONE),
        tag("u", NONE),
        tag("ul", NONE),
    ],
};

/// Allow-list for classes that keep markup.
pub fn policy_for(field_type: FieldType) -> Option<&'static MarkupPolicy> {
    match field_type {
        FieldType::FreeText => Some(&FREE_TEXT_POLICY),
        FieldType::EducationalContent => Some(&EDUCATIONAL_POLICY),
        _ => None,
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern is valid")
}

static COMMENT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<!--.*?(?:-->|\z)"));
static EXECUTABLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?is)<\s*(?:script|style|iframe|object|embed|noscript|template)\b[^>]*>.*?<\s*/\s*(?:script|style|iframe|object|embed|noscript|template)\s*>",
    )
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| compile(r"<\s*(/?)\s*([A-Za-z][A-Za-z0-9]*)([^<>]*)>"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"([A-Za-z][A-Za-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
});
static SQL_BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)/\*.*?\*/"));
static SQL_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(?:select|insert|update|delete|drop|union|alter|create|truncate|exec|execute|declare|grant|revoke)\b",
    )
});
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| compile(r"\s+"));
static DOT_RUN: LazyLock<Regex> = LazyLock::new(|| compile(r"\.{2,}"));

/// Sanitize `raw` for the given content class.
pub fn sanitize(raw: &str, field_type: FieldType) -> String {
    match field_type {
        FieldType::FreeText => sanitize_markup(raw, &FREE_TEXT_POLICY),
        FieldType::EducationalContent => sanitize_markup(raw, &EDUCATIONAL_POLICY),
        FieldType::Email => raw.trim().to_lowercase(),
        FieldType::Phone => keep_chars(&strip_markup(raw), |c| {
            c.is_ascii_digit() || matches!(c, '+' | '(' | ')' | '-' | ' ')
        }),
        FieldType::Name => keep_chars(&strip_markup(raw), |c| {
            c.is_alphabetic() || matches!(c, ' ' | '-' | '\'')
        }),
        FieldType::AlphaNumeric => {
            keep_chars(&strip_markup(raw), |c| c.is_ascii_alphanumeric() || c == ' ')
        }
        FieldType::SqlSensitive => sanitize_sql(raw),
        FieldType::FileName => sanitize_file_name(raw),
        FieldType::Url => sanitize_url(raw),
    }
}

/// Clean rich text against an allow-list.
pub fn sanitize_markup(raw: &str, policy: &MarkupPolicy) -> String {
    let mut current = strip_controls(raw).trim().to_string();
    for _ in 0..MAX_MARKUP_PASSES {
        let next = markup_pass(&current, policy).trim().to_string();
        if next == current {
            return current;
        }
        current = next;
    }

    tracing::debug!("markup did not settle, dropping all angle brackets");
    keep_chars(&current, |c| c != '<' && c != '>')
}

/// Remove every tag, keeping only text.
pub fn strip_markup(raw: &str) -> String {
    let without_comments = COMMENT.replace_all(raw, "");
    let without_blocks = EXECUTABLE_BLOCK.replace_all(&without_comments, "");
    TAG.replace_all(&without_blocks, "").into_owned()
}

fn markup_pass(input: &str, policy: &MarkupPolicy) -> String {
    let without_comments = COMMENT.replace_all(input, "");
    let text = EXECUTABLE_BLOCK.replace_all(&without_comments, "");

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for cap in TAG.captures_iter(&text) {
        let Some(whole) = cap.get(0) else { continue };
        push_escaped(&mut out, &text[last..whole.start()]);
        last = whole.end();

        let name = cap[2].to_ascii_lowercase();
        if let Some(rule) = policy.rule(&name) {
            out.push_str(&render_tag(!cap[1].is_empty(), rule, &cap[3]));
        }
    }
    push_escaped(&mut out, &text[last..]);
    out
}

fn render_tag(closing: bool, rule: &TagRule, attributes: &str) -> String {
    if closing {
        return if VOID_TAGS.contains(&rule.name) {
            String::new()
        } else {
            format!("</{}>", rule.name)
        };
    }

    let mut out = format!("<{}", rule.name);
    let mut kept: Vec<&str> = Vec::new();
    for cap in ATTRIBUTE.captures_iter(attributes) {
        let name = cap[1].to_ascii_lowercase();
        let Some(allowed) = rule.attributes.iter().copied().find(|a| *a == name) else {
            continue;
        };
        if kept.contains(&allowed) {
            continue;
        }
        let raw = cap
            .get(2)
            .or_else(|| cap.get(3))
            .or_else(|| cap.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if let Some(value) = clean_attribute(allowed, raw) {
            out.push_str(&format!(" {}=\"{}\"", allowed, value));
            kept.push(allowed);
        }
    }
    out.push('>');
    out
}

fn clean_attribute(name: &str, raw: &str) -> Option<String> {
    let value = keep_chars(raw, |c| !c.is_control() && !matches!(c, '"' | '<' | '>' | '`'));
    if value.is_empty() {
        return None;
    }
    match name {
        "href" => is_safe_link(&value, true).then_some(value),
        "src" => is_safe_link(&value, false).then_some(value),
        "width" | "height" | "colspan" | "rowspan" => {
            (value.len() <= 4 && value.chars().all(|c| c.is_ascii_digit())).then_some(value)
        }
        _ => Some(value),
    }
}

/// True for http(s), optionally mailto, and relative references.
fn is_safe_link(value: &str, allow_mailto: bool) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    // Entity-encoded schemes cannot be checked without decoding; refuse them.
    if compact.contains("&#") || compact.contains("&colon") {
        return false;
    }

    match compact.find([':', '/', '?', '#']) {
        Some(i) if compact.as_bytes()[i] == b':' => {
            let scheme = &compact[..i];
            scheme == "http" || scheme == "https" || (allow_mailto && scheme == "mailto")
        }
        _ => true,
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn strip_controls(input: &str) -> String {
    keep_chars(input, |c| !c.is_control() || c == '\n' || c == '\t')
}

fn keep_chars(input: &str, keep: impl Fn(char) -> bool) -> String {
    input.chars().filter(|c| keep(*c)).collect::<String>().trim().to_string()
}

fn sanitize_sql(raw: &str) -> String {
    let mut current = strip_controls(raw);
    // Every step only removes characters, so this terminates.
    loop {
        let unquoted: String = current
            .chars()
            .filter(|c| !matches!(c, '\'' | '"' | '`' | '\\'))
            .collect();
        let uncommented = SQL_BLOCK_COMMENT
            .replace_all(&unquoted, "")
            .replace("--", "")
            .replace("/*", "")
            .replace("*/", "");
        let next = SQL_KEYWORD.replace_all(&uncommented, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    WHITESPACE_RUN.replace_all(current.trim(), " ").into_owned()
}

fn sanitize_file_name(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let collapsed = DOT_RUN.replace_all(&filtered, ".");
    let truncated: String = collapsed
        .trim_matches('.')
        .chars()
        .take(FILE_NAME_MAX_CHARS)
        .collect();
    truncated.trim_matches('.').to_string()
}

fn sanitize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
        _ => String::new(),
    }
}
