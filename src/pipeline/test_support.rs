//! Record builders shared by unit tests

use super::classifier::classify;
use super::types::{ContentItem, Operation, QuoteGate, ReplyGate, RuleTag};

pub fn make_post(uri: &str, is_reply: bool, observed_at_micros: i64) -> ContentItem {
    ContentItem {
        uri: uri.to_string(),
        content_hash: format!("bafy-{}", observed_at_micros),
        author_id: "did:plc:tester".to_string(),
        text: "hello".to_string(),
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
        is_reply,
        operation: Operation::Create,
        observed_at_micros,
    }
}

pub fn make_reply_gate(
    uri: &str,
    target_uri: &str,
    allow: Option<&[RuleTag]>,
    hidden_replies: bool,
    observed_at_micros: i64,
) -> ReplyGate {
    ReplyGate {
        uri: uri.to_string(),
        content_hash: format!("bafy-{}", observed_at_micros),
        author_id: "did:plc:tester".to_string(),
        target_uri: target_uri.to_string(),
        operation: Operation::Create,
        observed_at_micros,
        facets: classify(allow, hidden_replies),
    }
}

pub fn make_quote_gate(uri: &str, target_uri: &str, observed_at_micros: i64) -> QuoteGate {
    QuoteGate {
        uri: uri.to_string(),
        content_hash: format!("bafy-{}", observed_at_micros),
        author_id: "did:plc:tester".to_string(),
        target_uri: target_uri.to_string(),
        operation: Operation::Create,
        observed_at_micros,
    }
}
