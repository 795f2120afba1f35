//! Lightweight scan of an assembled document.
//!
//! The isolated context has no HTML parser. This module pulls out what the
//! guest environment needs: inline scripts in document order, the body
//! markup, the title, and a flat list of elements for the `document` stub.
//! It is a tolerant scanner, not a conforming parser; unbalanced markup
//! yields best-effort records instead of errors.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").expect("valid regex")
});

static BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").expect("valid regex")
});

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("valid regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(/?)([A-Za-z][A-Za-z0-9-]*)\b((?:[^>\x22']|\x22[^\x22]*\x22|'[^']*')*?)(/?)>")
        .expect("valid regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:@][-A-Za-z0-9_:.@]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid regex")
});

static SRC_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)src\s*=").expect("valid regex"));

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static ANY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

/// Elements that never have content.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// One element found in the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    /// Lowercase tag name.
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub class_name: String,
    /// Other attributes, lowercase names.
    pub attributes: BTreeMap<String, String>,
    pub inner_html: String,
    pub text_content: String,
}

impl ElementRecord {
    /// Individual class names.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.class_name.split_whitespace()
    }
}

/// What the guest environment learns about a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Markup {
    pub title: String,
    /// Body markup with script blocks removed.
    pub body_html: String,
    pub elements: Vec<ElementRecord>,
    /// Inline script sources in document order.
    #[serde(skip)]
    pub scripts: Vec<String>,
}

impl Markup {
    /// Scan `document`.
    pub fn parse(document: &str) -> Self {
        let scripts = SCRIPT_RE
            .captures_iter(document)
            .filter(|caps| !SRC_ATTR_RE.is_match(&caps[1]))
            .map(|caps| caps[2].to_string())
            .collect();

        let title = TITLE_RE
            .captures(document)
            .map(|caps| decode_entities(caps[1].trim()))
            .unwrap_or_default();

        let body = BODY_RE
            .captures(document)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| document.to_string());
        let body_html = COMMENT_RE
            .replace_all(&SCRIPT_RE.replace_all(&body, ""), "")
            .trim()
            .to_string();
        let elements = scan_elements(&body_html);

        Self {
            title,
            body_html,
            elements,
            scripts,
        }
    }

    /// JSON handed to the guest environment.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn scan_elements(html: &str) -> Vec<ElementRecord> {
    let mut elements: Vec<ElementRecord> = Vec::new();
    // (tag, element index, offset where content starts)
    let mut open: Vec<(String, usize, usize)> = Vec::new();

    for caps in TAG_RE.captures_iter(html) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
        let closing = !caps[1].is_empty();
        let tag = caps[2].to_ascii_lowercase();

        if closing {
            let Some(position) = open.iter().rposition(|(name, _, _)| *name == tag) else {
                continue;
            };
            // Anything opened after the match is implicitly closed here.
            for (_, index, start) in open.drain(position..) {
                finish(&mut elements[index], &html[start..whole.0]);
            }
            continue;
        }

        let mut record = ElementRecord {
            tag: tag.clone(),
            ..Default::default()
        };
        for attr in ATTR_RE.captures_iter(&caps[3]) {
            let name = attr[1].to_ascii_lowercase();
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            match name.as_str() {
                "id" => record.id = Some(value),
                "class" => record.class_name = value,
                _ => {
                    record.attributes.entry(name).or_insert(value);
                }
            }
        }

        let index = elements.len();
        elements.push(record);

        let self_closing = !caps[4].is_empty();
        if !self_closing && !VOID_ELEMENTS.contains(&tag.as_str()) {
            open.push((tag, index, whole.1));
        }
    }

    for (_, index, start) in open {
        finish(&mut elements[index], &html[start..]);
    }

    elements
}

fn finish(record: &mut ElementRecord, inner: &str) {
    record.inner_html = inner.trim().to_string();
    record.text_content = decode_entities(ANY_TAG_RE.replace_all(inner, "").trim());
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
