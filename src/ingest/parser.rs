//! Raw post document -> `ParsedPost`.
//!
//! Only `post_number`, `keyword` and `content` are required. Every other field
//! is optional and degrades to a default (empty, zero, no list) when it is
//! absent or has an unexpected shape.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{IngestError, Result};
use crate::models::actor::RawActor;
use crate::models::comment::CommentTree;
use crate::models::post::PostKey;
use crate::utils::text::{clean_name, collapse_whitespace, leading_number};

/// A raw document decoded into typed fields, before identity resolution.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedPost {
    pub key: PostKey,
    /// `None` when the document has no usable author block.
    pub author: Option<RawActor>,
    pub content: String,
    pub post_url: Option<String>,
    pub raw_timestamp: String,
    pub visibility: Option<String>,
    pub total_likers: i64,
    pub total_comments: i64,
    pub likers: Vec<RawActor>,
    pub comments: CommentTree<ParsedComment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedComment {
    pub author: Option<RawActor>,
    pub content: String,
    pub raw_timestamp: String,
    pub reactions_count: i64,
}

/// Decode one JSON document.
pub fn parse_document(raw: &str) -> Result<ParsedPost> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| IngestError::MalformedRecord(format!("invalid JSON: {e}")))?;
    parse_post(&value)
}

pub fn parse_post(value: &Value) -> Result<ParsedPost> {
    let doc = value
        .as_object()
        .ok_or_else(|| malformed("document is not a JSON object"))?;

    // 1. Required fields
    let post_number = match doc.get("post_number") {
        Some(Value::Number(n)) => n
            .as_i64()
            .filter(|n| *n >= 0)
            .ok_or_else(|| malformed("post_number must be a non-negative integer"))?,
        Some(_) => return Err(malformed("post_number must be an integer")),
        None => return Err(malformed("post_number is missing")),
    };

    let keyword = match doc.get("keyword") {
        Some(Value::String(s)) if !s.trim().is_empty() => collapse_whitespace(s),
        Some(Value::String(_)) => return Err(malformed("keyword is blank")),
        Some(_) => return Err(malformed("keyword must be a string")),
        None => return Err(malformed("keyword is missing")),
    };

    let content = match doc.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(malformed("content must be a string")),
        None => return Err(malformed("content is missing")),
    };

    // 2. Optional blocks
    let author = doc.get("author").and_then(parse_actor);

    let metadata = doc.get("metadata").and_then(Value::as_object);
    let post_url = metadata.and_then(|m| opt_string(m.get("post_url")));
    let raw_timestamp = metadata
        .and_then(|m| opt_string(m.get("timestamp")))
        .unwrap_or_default();
    let visibility = metadata.and_then(|m| opt_string(m.get("visibility")));

    let engagement = doc.get("engagement").and_then(Value::as_object);
    let total_likers = engagement.map_or(0, |e| count(e.get("total_likers")));
    let total_comments = engagement.map_or(0, |e| count(e.get("total_comments")));

    let likers = engagement
        .and_then(|e| e.get("likers"))
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(parse_actor).collect())
        .unwrap_or_default();

    let comments = parse_comments(engagement.and_then(|e| e.get("comments")));

    Ok(ParsedPost {
        key: PostKey::new(keyword, post_number),
        author,
        content,
        post_url,
        raw_timestamp,
        visibility,
        total_likers,
        total_comments,
        likers,
        comments,
    })
}

fn malformed(reason: &str) -> IngestError {
    IngestError::MalformedRecord(reason.to_string())
}

/// Whitespace-collapsed string, or `None` when absent, blank or not a string.
fn opt_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let s = collapse_whitespace(s);
            (!s.is_empty()).then_some(s)
        }
        _ => None,
    }
}

/// Counters arrive as integers or as text such as "12 reactions".
fn count(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(n) => n.max(0),
            // Exports sometimes write counters as floats ("43.0")
            None => n
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map_or(0, |f| f.trunc() as i64),
        },
        Some(Value::String(s)) => leading_number(s).unwrap_or(0),
        _ => 0,
    }
}

/// Author blocks use `profile_url`; liker entries use `url`.
fn parse_actor(value: &Value) -> Option<RawActor> {
    let obj: &Map<String, Value> = value.as_object()?;

    let name = match obj.get("name") {
        Some(Value::String(s)) => clean_name(s),
        _ => String::new(),
    };
    let profile_url = opt_string(obj.get("profile_url")).or_else(|| opt_string(obj.get("url")));

    if name.is_empty() && profile_url.is_none() {
        return None;
    }

    Some(RawActor {
        name,
        profile_url,
        title: opt_string(obj.get("title")),
        image_url: opt_string(obj.get("image_url")),
    })
}

fn parse_comment(obj: &Map<String, Value>) -> ParsedComment {
    ParsedComment {
        author: obj.get("author").and_then(parse_actor),
        content: match obj.get("content") {
            Some(Value::String(s)) => s.trim().to_string(),
            _ => String::new(),
        },
        raw_timestamp: opt_string(obj.get("timestamp")).unwrap_or_default(),
        reactions_count: count(obj.get("reactions_count")),
    }
}

type PendingComment<'a> = (Option<usize>, &'a Map<String, Value>);

/// Queue `list` so that its first element is popped first.
fn push_list<'a>(stack: &mut Vec<PendingComment<'a>>, parent: Option<usize>, list: &'a Value) {
    let Some(items) = list.as_array() else {
        return;
    };
    for item in items.iter().rev() {
        match item.as_object() {
            Some(obj) => stack.push((parent, obj)),
            None => tracing::debug!("Skipping non-object comment entry: {}", item),
        }
    }
}

/// Builds the arena in pre-order with an explicit stack, so sibling order is
/// preserved and parents always precede their replies.
fn parse_comments(list: Option<&Value>) -> CommentTree<ParsedComment> {
    let mut tree = CommentTree::new();
    let mut stack: Vec<PendingComment<'_>> = Vec::new();

    if let Some(list) = list {
        push_list(&mut stack, None, list);
    }

    while let Some((parent, obj)) = stack.pop() {
        let index = tree.push(parent, parse_comment(obj));
        if let Some(replies) = obj.get("replies") {
            push_list(&mut stack, Some(index), replies);
        }
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_document_gets_defaults() {
        let parsed = parse_post(&json!({
            "post_number": 7,
            "keyword": "rust",
            "content": "hello"
        }))
        .unwrap();

        assert_eq!(parsed.key, PostKey::new("rust", 7));
        assert!(parsed.author.is_none());
        assert_eq!(parsed.total_likers, 0);
        assert!(parsed.likers.is_empty());
        assert!(parsed.comments.is_empty());
        assert_eq!(parsed.raw_timestamp, "");
    }

    #[test]
    fn missing_content_is_malformed() {
        let err = parse_post(&json!({"post_number": 7, "keyword": "rust"})).unwrap_err();
        assert!(matches!(err, IngestError::MalformedRecord(_)));
    }

    #[test]
    fn wrong_shapes_are_malformed() {
        for doc in [
            json!({"post_number": "7", "keyword": "rust", "content": ""}),
            json!({"post_number": -1, "keyword": "rust", "content": ""}),
            json!({"post_number": 7, "keyword": "  ", "content": ""}),
            json!({"post_number": 7, "keyword": "rust", "content": 3}),
            json!([1, 2, 3]),
        ] {
            assert!(matches!(
                parse_post(&doc),
                Err(IngestError::MalformedRecord(_))
            ));
        }
    }

    #[test]
    fn replies_keep_order_and_nesting() {
        let parsed = parse_post(&json!({
            "post_number": 1,
            "keyword": "k",
            "content": "c",
            "engagement": {
                "comments": [
                    {"author": {"name": "A"}, "content": "first", "replies": [
                        {"author": {"name": "B"}, "content": "reply one"},
                        {"author": {"name": "C"}, "content": "reply two", "replies": []}
                    ]},
                    {"author": {"name": "D"}, "content": "second", "reactions_count": "4 reactions"}
                ]
            }
        }))
        .unwrap();

        let tree = &parsed.comments;
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots.len(), 2);
        let first = &tree.nodes[tree.roots[0]];
        assert_eq!(first.item.content, "first");
        let replies: Vec<_> = tree
            .children(tree.roots[0])
            .map(|n| n.item.content.as_str())
            .collect();
        assert_eq!(replies, vec!["reply one", "reply two"]);
        let second = &tree.nodes[tree.roots[1]];
        assert_eq!(second.position, 1);
        assert_eq!(second.item.reactions_count, 4);
        assert!(second.children.is_empty());
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_document("{not json"),
            Err(IngestError::MalformedRecord(_))
        ));
    }

    #[test]
    fn float_counters_are_truncated() {
        let parsed = parse_post(&json!({
            "post_number": 1,
            "keyword": "k",
            "content": "c",
            "engagement": { "total_likers": 43.0, "total_comments": 2.7 }
        }))
        .unwrap();

        assert_eq!(parsed.total_likers, 43);
        assert_eq!(parsed.total_comments, 2);
    }
}
