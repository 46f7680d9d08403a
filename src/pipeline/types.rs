//! Core record types for the content/gate store
//!
//! Three record kinds share one identity model: the AT-URI of the record is
//! the primary key and the upsert key. A later revision with the same URI
//! replaces the earlier one in full.

use serde::{Deserialize, Serialize};

/// Commit operation carried by every stream event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Operation::Create),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// The three record kinds tracked by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "content")]
    Content,
    #[serde(rename = "reply-gate")]
    ReplyGate,
    #[serde(rename = "quote-gate")]
    QuoteGate,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Content => "content",
            RecordKind::ReplyGate => "reply-gate",
            RecordKind::QuoteGate => "quote-gate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "content" => Some(RecordKind::Content),
            "reply-gate" => Some(RecordKind::ReplyGate),
            "quote-gate" => Some(RecordKind::QuoteGate),
            _ => None,
        }
    }

    /// Lexicon collection NSID backing this kind on the firehose
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Content => "app.bsky.feed.post",
            RecordKind::ReplyGate => "app.bsky.feed.threadgate",
            RecordKind::QuoteGate => "app.bsky.feed.postgate",
        }
    }

    pub fn from_collection(collection: &str) -> Option<Self> {
        RecordKind::all()
            .into_iter()
            .find(|kind| kind.collection() == collection)
    }

    /// SQLite table holding this kind
    pub fn table_name(&self) -> &'static str {
        match self {
            RecordKind::Content => "content_items",
            RecordKind::ReplyGate => "reply_gates",
            RecordKind::QuoteGate => "quote_gates",
        }
    }

    pub fn all() -> [RecordKind; 3] {
        [RecordKind::Content, RecordKind::ReplyGate, RecordKind::QuoteGate]
    }
}

/// Closed set of reply-gate allow rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleTag {
    Mention,
    Following,
    Follower,
    List,
}

impl RuleTag {
    /// Display name used in rule-combination labels
    pub fn label(&self) -> &'static str {
        match self {
            RuleTag::Mention => "Mention",
            RuleTag::Following => "Following",
            RuleTag::Follower => "Follower",
            RuleTag::List => "List",
        }
    }

    /// Fixed label order: Mention, Following, Follower, List
    pub fn all() -> [RuleTag; 4] {
        [
            RuleTag::Mention,
            RuleTag::Following,
            RuleTag::Follower,
            RuleTag::List,
        ]
    }
}

/// Classified rule facets of a reply gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facets {
    pub has_rules: bool,
    pub has_nobody_can_reply: bool,
    pub has_mention_rule: bool,
    pub has_following_rule: bool,
    pub has_follower_rule: bool,
    pub has_list_rule: bool,
    pub has_hidden_replies_only: bool,
}

impl Facets {
    pub fn has_rule(&self, tag: RuleTag) -> bool {
        match tag {
            RuleTag::Mention => self.has_mention_rule,
            RuleTag::Following => self.has_following_rule,
            RuleTag::Follower => self.has_follower_rule,
            RuleTag::List => self.has_list_rule,
        }
    }

    /// Number of specific rule facets set (0..=4)
    pub fn rule_count(&self) -> usize {
        RuleTag::all().iter().filter(|tag| self.has_rule(**tag)).count()
    }
}

/// A post revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub uri: String,
    pub content_hash: String,
    pub author_id: String,
    pub text: String,
    pub created_at: String,
    pub is_reply: bool,
    pub operation: Operation,
    pub observed_at_micros: i64,
}

/// A threadgate revision with its classified facets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyGate {
    pub uri: String,
    pub content_hash: String,
    pub author_id: String,
    pub target_uri: String,
    pub operation: Operation,
    pub observed_at_micros: i64,
    pub facets: Facets,
}

/// A postgate revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteGate {
    pub uri: String,
    pub content_hash: String,
    pub author_id: String,
    pub target_uri: String,
    pub operation: Operation,
    pub observed_at_micros: i64,
}

/// A normalized record ready for upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Content(ContentItem),
    ReplyGate(ReplyGate),
    QuoteGate(QuoteGate),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Content(_) => RecordKind::Content,
            Record::ReplyGate(_) => RecordKind::ReplyGate,
            Record::QuoteGate(_) => RecordKind::QuoteGate,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Record::Content(item) => &item.uri,
            Record::ReplyGate(gate) => &gate.uri,
            Record::QuoteGate(gate) => &gate.uri,
        }
    }

    pub fn observed_at_micros(&self) -> i64 {
        match self {
            Record::Content(item) => item.observed_at_micros,
            Record::ReplyGate(gate) => gate.observed_at_micros,
            Record::QuoteGate(gate) => gate.observed_at_micros,
        }
    }
}

/// One event as delivered by the stream transport
///
/// `kind` and `operation` stay as raw strings so that unrecognized values
/// can be rejected by the normalizer instead of failing deserialization
/// somewhere upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    pub uri: String,
    pub kind: String,
    pub operation: String,
    pub author_id: String,
    pub content_hash: String,
    pub observed_at_micros: i64,
    pub record_payload: Option<serde_json::Value>,
}
