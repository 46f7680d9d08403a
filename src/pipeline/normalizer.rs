//! Event normalization from raw stream events to typed records
//!
//! Payload shapes follow the app.bsky lexicons. Only the fields needed for
//! classification are read; everything else in the payload is ignored.

use super::classifier::classify;
use super::error::{PipelineError, PipelineResult};
use super::types::{
    ContentItem, IncomingEvent, Operation, QuoteGate, Record, RecordKind, ReplyGate, RuleTag,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// One entry of a threadgate `allow` list, tagged by `$type`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "$type")]
pub enum AllowRule {
    #[serde(rename = "app.bsky.feed.threadgate#mentionRule")]
    Mention,
    #[serde(rename = "app.bsky.feed.threadgate#followingRule")]
    Following,
    #[serde(rename = "app.bsky.feed.threadgate#followerRule")]
    Follower,
    #[serde(rename = "app.bsky.feed.threadgate#listRule")]
    List {
        #[serde(default)]
        list: String,
    },
}

impl AllowRule {
    pub fn tag(&self) -> RuleTag {
        match self {
            AllowRule::Mention => RuleTag::Mention,
            AllowRule::Following => RuleTag::Following,
            AllowRule::Follower => RuleTag::Follower,
            AllowRule::List { .. } => RuleTag::List,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostPayload {
    #[serde(rename = "$type")]
    record_type: Option<String>,
    text: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
    reply: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ThreadgatePayload {
    #[serde(rename = "$type")]
    record_type: Option<String>,
    post: Option<String>,
    allow: Option<Vec<AllowRule>>,
    #[serde(rename = "hiddenReplies")]
    hidden_replies: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PostgatePayload {
    #[serde(rename = "$type")]
    record_type: Option<String>,
    post: Option<String>,
}

/// Normalize one stream event into a record ready for upsert
///
/// Unknown kinds, unknown operations, payloads whose `$type` does not match
/// the event kind, and create/update events without a payload are all
/// rejected as `MalformedEvent`. Delete events carry no payload and become
/// tombstone revisions.
pub fn normalize(event: &IncomingEvent) -> PipelineResult<Record> {
    let kind = RecordKind::from_str(&event.kind)
        .ok_or_else(|| PipelineError::malformed(format!("unknown kind '{}'", event.kind)))?;
    let operation = Operation::from_str(&event.operation).ok_or_else(|| {
        PipelineError::malformed(format!("unknown operation '{}'", event.operation))
    })?;

    if event.uri.is_empty() {
        return Err(PipelineError::malformed("missing uri"));
    }

    let payload = match (&event.record_payload, operation) {
        (Some(payload), _) if !payload.is_null() => Some(payload),
        (_, Operation::Delete) => None,
        _ => {
            return Err(PipelineError::malformed(format!(
                "{} {} without record payload",
                kind.as_str(),
                operation.as_str()
            )))
        }
    };

    match kind {
        RecordKind::Content => normalize_content(event, operation, payload),
        RecordKind::ReplyGate => normalize_reply_gate(event, operation, payload),
        RecordKind::QuoteGate => normalize_quote_gate(event, operation, payload),
    }
}

fn normalize_content(
    event: &IncomingEvent,
    operation: Operation,
    payload: Option<&serde_json::Value>,
) -> PipelineResult<Record> {
    let (text, created_at, is_reply) = match payload {
        Some(value) => {
            let post: PostPayload = serde_json::from_value(value.clone())?;
            check_type(RecordKind::Content, post.record_type.as_deref())?;
            let created_at = post
                .created_at
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
            (post.text.unwrap_or_default(), created_at, post.reply.is_some())
        }
        None => (String::new(), micros_to_rfc3339(event.observed_at_micros), false),
    };

    Ok(Record::Content(ContentItem {
        uri: event.uri.clone(),
        content_hash: event.content_hash.clone(),
        author_id: event.author_id.clone(),
        text,
        created_at,
        is_reply,
        operation,
        observed_at_micros: event.observed_at_micros,
    }))
}

fn normalize_reply_gate(
    event: &IncomingEvent,
    operation: Operation,
    payload: Option<&serde_json::Value>,
) -> PipelineResult<Record> {
    let (target_uri, facets) = match payload {
        Some(value) => {
            let gate: ThreadgatePayload = serde_json::from_value(value.clone())?;
            check_type(RecordKind::ReplyGate, gate.record_type.as_deref())?;
            let tags: Option<Vec<RuleTag>> = gate
                .allow
                .as_ref()
                .map(|rules| rules.iter().map(AllowRule::tag).collect());
            let hidden_present = gate
                .hidden_replies
                .as_ref()
                .map_or(false, |replies| !replies.is_empty());
            let facets = classify(tags.as_deref(), hidden_present);
            (gate.post.unwrap_or_default(), facets)
        }
        None => (String::new(), classify(None, false)),
    };

    Ok(Record::ReplyGate(ReplyGate {
        uri: event.uri.clone(),
        content_hash: event.content_hash.clone(),
        author_id: event.author_id.clone(),
        target_uri,
        operation,
        observed_at_micros: event.observed_at_micros,
        facets,
    }))
}

fn normalize_quote_gate(
    event: &IncomingEvent,
    operation: Operation,
    payload: Option<&serde_json::Value>,
) -> PipelineResult<Record> {
    let target_uri = match payload {
        Some(value) => {
            let gate: PostgatePayload = serde_json::from_value(value.clone())?;
            check_type(RecordKind::QuoteGate, gate.record_type.as_deref())?;
            gate.post.unwrap_or_default()
        }
        None => String::new(),
    };

    Ok(Record::QuoteGate(QuoteGate {
        uri: event.uri.clone(),
        content_hash: event.content_hash.clone(),
        author_id: event.author_id.clone(),
        target_uri,
        operation,
        observed_at_micros: event.observed_at_micros,
    }))
}

fn check_type(kind: RecordKind, record_type: Option<&str>) -> PipelineResult<()> {
    match record_type {
        Some(t) if t == kind.collection() => Ok(()),
        Some(t) => Err(PipelineError::malformed(format!(
            "payload $type '{}' does not match {}",
            t,
            kind.collection()
        ))),
        None => Err(PipelineError::malformed("payload missing $type")),
    }
}

fn micros_to_rfc3339(micros: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_event(kind: &str, operation: &str, payload: Option<serde_json::Value>) -> IncomingEvent {
        IncomingEvent {
            uri: "at://did:plc:alice/app.bsky.feed.threadgate/3k2a".to_string(),
            kind: kind.to_string(),
            operation: operation.to_string(),
            author_id: "did:plc:alice".to_string(),
            content_hash: "bafyreia".to_string(),
            observed_at_micros: 1_725_000_000_000_000,
            record_payload: payload,
        }
    }

    fn reply_gate(record: Record) -> ReplyGate {
        match record {
            Record::ReplyGate(gate) => gate,
            other => panic!("expected reply gate, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_top_level_post() {
        let event = make_event(
            "content",
            "create",
            Some(json!({
                "$type": "app.bsky.feed.post",
                "text": "hello",
                "createdAt": "2024-08-30T06:40:00.000Z"
            })),
        );

        match normalize(&event).unwrap() {
            Record::Content(item) => {
                assert_eq!(item.text, "hello");
                assert_eq!(item.created_at, "2024-08-30T06:40:00.000Z");
                assert!(!item.is_reply);
                assert_eq!(item.operation, Operation::Create);
            }
            other => panic!("expected content item, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_reference_marks_reply() {
        let event = make_event(
            "content",
            "create",
            Some(json!({
                "$type": "app.bsky.feed.post",
                "text": "re",
                "createdAt": "2024-08-30T06:40:00.000Z",
                "reply": {"root": {"uri": "at://x", "cid": "y"}, "parent": {"uri": "at://x", "cid": "y"}}
            })),
        );

        match normalize(&event).unwrap() {
            Record::Content(item) => assert!(item.is_reply),
            other => panic!("expected content item, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_text_and_created_at_default() {
        let event = make_event("content", "create", Some(json!({"$type": "app.bsky.feed.post"})));
        match normalize(&event).unwrap() {
            Record::Content(item) => {
                assert_eq!(item.text, "");
                assert!(DateTime::parse_from_rfc3339(&item.created_at).is_ok());
            }
            other => panic!("expected content item, got {:?}", other),
        }
    }

    #[test]
    fn test_null_optional_fields_default() {
        let post = make_event(
            "content",
            "create",
            Some(json!({"$type": "app.bsky.feed.post", "text": null, "createdAt": null})),
        );
        match normalize(&post).unwrap() {
            Record::Content(item) => assert_eq!(item.text, ""),
            other => panic!("expected content item, got {:?}", other),
        }

        let gate = make_event(
            "reply-gate",
            "create",
            Some(json!({
                "$type": "app.bsky.feed.threadgate",
                "post": null,
                "allow": [{"$type": "app.bsky.feed.threadgate#followerRule"}],
                "hiddenReplies": null
            })),
        );
        let gate = reply_gate(normalize(&gate).unwrap());
        assert_eq!(gate.target_uri, "");
        assert!(gate.facets.has_follower_rule);
        assert!(!gate.facets.has_hidden_replies_only);

        let postgate = make_event(
            "quote-gate",
            "create",
            Some(json!({"$type": "app.bsky.feed.postgate", "post": null})),
        );
        match normalize(&postgate).unwrap() {
            Record::QuoteGate(gate) => assert_eq!(gate.target_uri, ""),
            other => panic!("expected quote gate, got {:?}", other),
        }
    }

    #[test]
    fn test_null_hidden_replies_without_allow() {
        let event = make_event(
            "reply-gate",
            "create",
            Some(json!({"$type": "app.bsky.feed.threadgate", "post": "at://p", "hiddenReplies": null})),
        );
        let gate = reply_gate(normalize(&event).unwrap());
        assert_eq!(gate.facets, classify(None, false));
    }

    #[test]
    fn test_threadgate_rules() {
        let event = make_event(
            "reply-gate",
            "create",
            Some(json!({
                "$type": "app.bsky.feed.threadgate",
                "post": "at://did:plc:alice/app.bsky.feed.post/3k2a",
                "allow": [
                    {"$type": "app.bsky.feed.threadgate#mentionRule"},
                    {"$type": "app.bsky.feed.threadgate#listRule", "list": "at://did:plc:alice/app.bsky.graph.list/l1"}
                ],
                "createdAt": "2024-08-30T06:40:00.000Z"
            })),
        );

        let gate = reply_gate(normalize(&event).unwrap());
        assert_eq!(gate.target_uri, "at://did:plc:alice/app.bsky.feed.post/3k2a");
        assert!(gate.facets.has_rules);
        assert!(gate.facets.has_mention_rule);
        assert!(gate.facets.has_list_rule);
        assert!(!gate.facets.has_following_rule);
    }

    #[test]
    fn test_threadgate_empty_allow() {
        let event = make_event(
            "reply-gate",
            "create",
            Some(json!({"$type": "app.bsky.feed.threadgate", "post": "at://p", "allow": []})),
        );
        let gate = reply_gate(normalize(&event).unwrap());
        assert!(gate.facets.has_nobody_can_reply);
        assert_eq!(gate.facets.rule_count(), 0);
    }

    #[test]
    fn test_threadgate_hidden_replies_only() {
        let event = make_event(
            "reply-gate",
            "create",
            Some(json!({
                "$type": "app.bsky.feed.threadgate",
                "post": "at://p",
                "hiddenReplies": ["at://did:plc:bob/app.bsky.feed.post/x"]
            })),
        );
        let gate = reply_gate(normalize(&event).unwrap());
        assert!(gate.facets.has_hidden_replies_only);
        assert!(!gate.facets.has_rules);
        assert!(!gate.facets.has_nobody_can_reply);
    }

    #[test]
    fn test_unknown_rule_tag_is_malformed() {
        let event = make_event(
            "reply-gate",
            "create",
            Some(json!({
                "$type": "app.bsky.feed.threadgate",
                "post": "at://p",
                "allow": [{"$type": "app.bsky.feed.threadgate#mentoinRule"}]
            })),
        );
        assert!(matches!(normalize(&event), Err(PipelineError::MalformedEvent(_))));
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let event = make_event("like", "create", Some(json!({"$type": "app.bsky.feed.like"})));
        assert!(matches!(normalize(&event), Err(PipelineError::MalformedEvent(_))));
    }

    #[test]
    fn test_mismatched_type_is_malformed() {
        let event = make_event("quote-gate", "create", Some(json!({"$type": "app.bsky.feed.post"})));
        assert!(matches!(normalize(&event), Err(PipelineError::MalformedEvent(_))));
    }

    #[test]
    fn test_create_without_payload_is_malformed() {
        let event = make_event("content", "create", None);
        assert!(matches!(normalize(&event), Err(PipelineError::MalformedEvent(_))));
    }

    #[test]
    fn test_delete_becomes_tombstone() {
        let event = make_event("reply-gate", "delete", None);
        let gate = reply_gate(normalize(&event).unwrap());
        assert_eq!(gate.operation, Operation::Delete);
        assert_eq!(gate.target_uri, "");
        assert_eq!(gate.facets, classify(None, false));
    }

    #[test]
    fn test_postgate() {
        let event = make_event(
            "quote-gate",
            "update",
            Some(json!({
                "$type": "app.bsky.feed.postgate",
                "post": "at://did:plc:alice/app.bsky.feed.post/3k2a",
                "embeddingRules": [{"$type": "app.bsky.feed.postgate#disableRule"}]
            })),
        );
        match normalize(&event).unwrap() {
            Record::QuoteGate(gate) => {
                assert_eq!(gate.operation, Operation::Update);
                assert_eq!(gate.target_uri, "at://did:plc:alice/app.bsky.feed.post/3k2a");
            }
            other => panic!("expected quote gate, got {:?}", other),
        }
    }
}
