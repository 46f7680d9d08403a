//! Reply-gate rule classification
//!
//! Turns a threadgate allow list into the seven boolean facets stored on
//! every `ReplyGate`. The allow field has three distinct states that must
//! not be collapsed:
//!
//! | allow field        | has_rules | has_nobody_can_reply |
//! |--------------------|-----------|----------------------|
//! | absent             | false     | false                |
//! | present, empty     | false     | true                 |
//! | present, non-empty | true      | false                |

use super::types::{Facets, RuleTag};

/// Classify an allow list and hidden-replies flag into facets
///
/// `allow` is `None` when the field is absent from the payload.
pub fn classify(allow: Option<&[RuleTag]>, hidden_replies_present: bool) -> Facets {
    let has_rules = matches!(allow, Some(rules) if !rules.is_empty());
    let has_nobody_can_reply = matches!(allow, Some(rules) if rules.is_empty());

    let present = |tag: RuleTag| has_rules && allow.map_or(false, |rules| rules.contains(&tag));

    Facets {
        has_rules,
        has_nobody_can_reply,
        has_mention_rule: present(RuleTag::Mention),
        has_following_rule: present(RuleTag::Following),
        has_follower_rule: present(RuleTag::Follower),
        has_list_rule: present(RuleTag::List),
        has_hidden_replies_only: hidden_replies_present && !has_rules && !has_nobody_can_reply,
    }
}

/// Label for the rule combination a gate encodes
///
/// Precedence: "Nobody Can Reply", then "None" when no rule facet is set,
/// otherwise the set facet names in fixed order joined by " + ".
pub fn combination_label(facets: &Facets) -> String {
    if facets.has_nobody_can_reply {
        return "Nobody Can Reply".to_string();
    }

    let names: Vec<&str> = RuleTag::all()
        .iter()
        .filter(|tag| facets.has_rule(**tag))
        .map(|tag| tag.label())
        .collect();

    if names.is_empty() {
        "None".to_string()
    } else {
        names.join(" + ")
    }
}

/// Sort key giving every combination label a fixed position
///
/// "Nobody Can Reply" sorts first, then "None", then combinations ordered
/// by facet presence in label order (anything with Mention before anything
/// without, and so on down the list).
pub fn combination_rank(facets: &Facets) -> (u8, [bool; 4]) {
    if facets.has_nobody_can_reply {
        return (0, [false; 4]);
    }
    if facets.rule_count() == 0 {
        return (1, [false; 4]);
    }

    let tags = RuleTag::all();
    let mut absent = [false; 4];
    for (slot, tag) in absent.iter_mut().zip(tags.iter()) {
        *slot = !facets.has_rule(*tag);
    }
    (2, absent)
}
