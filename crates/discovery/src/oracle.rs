//! Oracle request rendering and reply interpretation.
//!
//! The oracle sees each side's remaining items addressed by row index and
//! answers with a JSON object. Replies are parsed leniently: surrounding
//! prose and code fences are ignored, text fields may be strings or lists,
//! and indices may be numbers or numeric strings. The partition rules are
//! strict: every index must have been offered (unique ones on the right
//! side), the common set wins any overlap, and all three partitions must
//! end up non-empty.

use crate::collaborators::{OracleFailure, OracleReply};
use crate::work::Remaining;
use serde::Deserialize;
use serde_json::Value;
use serendipity_protocol::{PathIndices, PathNarrative, RowIndex, RowItem, DEFAULT_PATH_TITLE};
use std::collections::BTreeSet;
use std::fmt::Write;

const INSTRUCTIONS: &str = r#"You will be given two lists of conversations between two users and AI assistants.
Find a serendipitous path between them that links several conversations from each list.

The path must include:
- Common nodes: conversations with closely matching themes that form a shared foundation.
- Unique nodes: complementary branches that diverge into distinct but related areas.

Focus on the users' original questions and what they want to achieve. Assume both users
are experts in their topics: be specific and avoid generalizations.

Answer with a JSON object of this shape:
{
  "title": "Short title of the path, starting with an emoji",
  "common": [IDs from either list with shared themes],
  "unique_1": [IDs from USER 1 CONVERSATIONS absent in USER 2],
  "unique_2": [IDs from USER 2 CONVERSATIONS absent in USER 1],
  "common_background": "The common ground between <USER_1> and <USER_2> in two or three sentences",
  "branches_1": "Bullet points on how <USER_1> branches off from the common ground",
  "branches_2": "Bullet points on how <USER_2> branches off from the common ground",
  "call_to_action_1": "Bullet points on what <USER_1> could ask <USER_2>",
  "call_to_action_2": "Bullet points on what <USER_2> could ask <USER_1>",
  "is_sensitive": true or false (sickness, erotica and similar topics)
}

Refer to the users only as "<USER_1>" and "<USER_2>".
If there is no serendipitous path, answer with an empty object: {}"#;

/// A rendered prompt and the rows it offered per side.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub prompt: String,
    pub offered_current: BTreeSet<RowIndex>,
    pub offered_peer: BTreeSet<RowIndex>,
}

impl OracleRequest {
    /// Render the request for a cluster's unconsumed items.
    pub fn build(remaining: &Remaining<'_>) -> Self {
        let mut prompt = String::with_capacity(INSTRUCTIONS.len() + 256);
        prompt.push_str(INSTRUCTIONS);
        prompt.push_str("\n\nUSER 1 CONVERSATIONS:\n");
        render_items(&mut prompt, &remaining.current);
        prompt.push_str("\nUSER 2 CONVERSATIONS:\n");
        render_items(&mut prompt, &remaining.peer);

        Self {
            prompt,
            offered_current: remaining.current.iter().map(|r| r.row).collect(),
            offered_peer: remaining.peer.iter().map(|r| r.row).collect(),
        }
    }

    fn offered(&self, row: RowIndex) -> bool {
        self.offered_current.contains(&row) || self.offered_peer.contains(&row)
    }
}

fn render_items(out: &mut String, rows: &[&RowItem]) {
    for row in rows {
        let item = &row.item;
        let _ = writeln!(
            out,
            "ID: {}\nTitle: {}\nDate: {}\nSummary: {}\n",
            row.row,
            item.title,
            item.timestamp.as_deref().unwrap_or("Unknown"),
            item.summary
        );
    }
}

/// A validated connection proposed by the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub indices: PathIndices,
    pub narrative: PathNarrative,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The oracle call itself failed
    OracleFailed(OracleFailure),
    /// No JSON object could be read from the completion
    Unparseable(String),
    /// The oracle answered `{}`
    NoPath,
    /// A partition was empty after validation
    IncompletePartition,
}

/// Result of one oracle round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(Proposal),
    Rejected(RejectReason),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireProposal {
    #[serde(alias = "path_title")]
    title: Value,
    #[serde(alias = "common_indices")]
    common: Value,
    #[serde(alias = "user1_unique_indices")]
    unique_1: Value,
    #[serde(alias = "user2_unique_indices")]
    unique_2: Value,
    common_background: Value,
    #[serde(alias = "user_1_unique_branches")]
    branches_1: Value,
    #[serde(alias = "user_2_unique_branches")]
    branches_2: Value,
    #[serde(alias = "user_1_call_to_action")]
    call_to_action_1: Value,
    #[serde(alias = "user_2_call_to_action")]
    call_to_action_2: Value,
    is_sensitive: Value,
}

/// Interpret an oracle reply against the request it answers.
pub fn interpret_reply(reply: OracleReply, request: &OracleRequest) -> Outcome {
    match reply {
        Ok(text) => interpret(&text, request),
        Err(failure) => Outcome::Rejected(RejectReason::OracleFailed(failure)),
    }
}

pub fn interpret(text: &str, request: &OracleRequest) -> Outcome {
    let Some(json) = outermost_object(text) else {
        return Outcome::Rejected(RejectReason::Unparseable(
            "no JSON object in completion".to_string(),
        ));
    };
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => return Outcome::Rejected(RejectReason::Unparseable(e.to_string())),
    };
    if value.as_object().is_some_and(|o| o.is_empty()) {
        return Outcome::Rejected(RejectReason::NoPath);
    }
    let wire: WireProposal = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(e) => return Outcome::Rejected(RejectReason::Unparseable(e.to_string())),
    };

    let common: BTreeSet<RowIndex> = indices(&wire.common)
        .filter(|row| request.offered(*row))
        .collect();
    let unique_current: BTreeSet<RowIndex> = indices(&wire.unique_1)
        .filter(|row| request.offered_current.contains(row) && !common.contains(row))
        .collect();
    let unique_peer: BTreeSet<RowIndex> = indices(&wire.unique_2)
        .filter(|row| {
            request.offered_peer.contains(row)
                && !common.contains(row)
                && !unique_current.contains(row)
        })
        .collect();

    let path = PathIndices {
        common: common.into_iter().collect(),
        unique_current: unique_current.into_iter().collect(),
        unique_peer: unique_peer.into_iter().collect(),
    };
    if !path.is_complete() {
        log::debug!(
            "Rejecting proposal with an empty partition ({} common, {} unique_1, {} unique_2)",
            path.common.len(),
            path.unique_current.len(),
            path.unique_peer.len()
        );
        return Outcome::Rejected(RejectReason::IncompletePartition);
    }

    let title = text_field(&wire.title);
    Outcome::Accepted(Proposal {
        indices: path,
        narrative: PathNarrative {
            title: if title.trim().is_empty() {
                DEFAULT_PATH_TITLE.to_string()
            } else {
                title
            },
            description: text_field(&wire.common_background),
            current_branches: text_field(&wire.branches_1),
            peer_branches: text_field(&wire.branches_2),
            current_call_to_action: text_field(&wire.call_to_action_1),
            peer_call_to_action: text_field(&wire.call_to_action_2),
            is_sensitive: flag(&wire.is_sensitive),
        },
    })
}

/// Slice from the first `{` to the last `}`.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn indices(value: &Value) -> impl Iterator<Item = RowIndex> + '_ {
    let values: Box<dyn Iterator<Item = &Value>> = match value {
        Value::Array(items) => Box::new(items.iter()),
        Value::Null => Box::new(std::iter::empty()),
        other => Box::new(std::iter::once(other)),
    };
    values.filter_map(|v| match v {
        Value::Number(n) => n.as_u64().and_then(|n| RowIndex::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn text_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text_field).collect::<Vec<_>>().join("\n"),
        other => other.to_string(),
    }
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(current: &[RowIndex], peer: &[RowIndex]) -> OracleRequest {
        OracleRequest {
            prompt: String::new(),
            offered_current: current.iter().copied().collect(),
            offered_peer: peer.iter().copied().collect(),
        }
    }

    #[test]
    fn accepts_fenced_reply_with_lists() {
        let reply = r#"Here you go:
```json
{
  "title": "🌱 Gardens",
  "common": [1, 4, 4],
  "unique_1": ["2"],
  "unique_2": [5],
  "common_background": "Both grow things.",
  "branches_1": ["- soil", "- seeds"],
  "branches_2": "- hydroponics",
  "call_to_action_1": "ask",
  "call_to_action_2": null,
  "is_sensitive": "false"
}
```"#;
        let outcome = interpret(reply, &request(&[1, 2, 3], &[4, 5]));
        let Outcome::Accepted(proposal) = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(
            proposal.indices,
            PathIndices {
                common: vec![1, 4],
                unique_current: vec![2],
                unique_peer: vec![5],
            }
        );
        assert_eq!(proposal.narrative.title, "🌱 Gardens");
        assert_eq!(proposal.narrative.current_branches, "- soil\n- seeds");
        assert_eq!(proposal.narrative.peer_call_to_action, "");
        assert!(!proposal.narrative.is_sensitive);
    }

    #[test]
    fn legacy_key_names_and_default_title() {
        let reply = r#"{"common_indices":[1],"user1_unique_indices":[2],"user2_unique_indices":[3],"is_sensitive":true}"#;
        let Outcome::Accepted(proposal) = interpret(reply, &request(&[1, 2], &[3])) else {
            panic!("expected acceptance");
        };
        assert_eq!(proposal.narrative.title, DEFAULT_PATH_TITLE);
        assert!(proposal.narrative.is_sensitive);
    }

    #[test]
    fn common_claim_wins_overlap() {
        let reply = r#"{"common":[1,3],"unique_1":[1,2],"unique_2":[3,4]}"#;
        let Outcome::Accepted(proposal) = interpret(reply, &request(&[1, 2], &[3, 4])) else {
            panic!("expected acceptance");
        };
        assert_eq!(proposal.indices.unique_current, vec![2]);
        assert_eq!(proposal.indices.unique_peer, vec![4]);
    }

    #[test]
    fn unoffered_and_wrong_side_indices_are_dropped() {
        // 9 was never offered; 3 belongs to the peer side.
        let reply = r#"{"common":[9],"unique_1":[3],"unique_2":[4]}"#;
        assert_eq!(
            interpret(reply, &request(&[1, 2], &[3, 4])),
            Outcome::Rejected(RejectReason::IncompletePartition)
        );
    }

    #[test]
    fn empty_object_means_no_path() {
        assert_eq!(
            interpret("```json\n{}\n```", &request(&[1], &[2])),
            Outcome::Rejected(RejectReason::NoPath)
        );
    }

    #[test]
    fn garbage_is_unparseable() {
        assert!(matches!(
            interpret("I could not find anything.", &request(&[1], &[2])),
            Outcome::Rejected(RejectReason::Unparseable(_))
        ));
        assert!(matches!(
            interpret("{ not json }", &request(&[1], &[2])),
            Outcome::Rejected(RejectReason::Unparseable(_))
        ));
    }

    #[test]
    fn failure_reply_is_rejected() {
        assert_eq!(
            interpret_reply(Err(OracleFailure::Timeout), &request(&[1], &[2])),
            Outcome::Rejected(RejectReason::OracleFailed(OracleFailure::Timeout))
        );
    }

    #[test]
    fn prompt_lists_both_sides() {
        use serendipity_protocol::{Item, Side};
        use std::sync::Arc;

        let make = |row, side, id: &str| RowItem {
            row,
            side,
            item: Arc::new(Item {
                id: id.to_string(),
                title: format!("About {id}"),
                summary: "summary".to_string(),
                timestamp: None,
                embedding: vec![1.0],
                category: None,
            }),
        };
        let a = make(7, Side::Current, "a");
        let b = make(11, Side::Peer, "b");
        let remaining = Remaining {
            current: vec![&a],
            peer: vec![&b],
            current_vectors: ndarray::Array2::zeros((1, 1)),
            peer_vectors: ndarray::Array2::zeros((1, 1)),
        };
        let request = OracleRequest::build(&remaining);
        let user_1 = request.prompt.find("USER 1 CONVERSATIONS:\nID: 7").unwrap();
        let user_2 = request.prompt.find("USER 2 CONVERSATIONS:\nID: 11").unwrap();
        assert!(user_1 < user_2);
        assert!(request.prompt.contains("Date: Unknown"));
        assert_eq!(request.offered_current, BTreeSet::from([7]));
        assert_eq!(request.offered_peer, BTreeSet::from([11]));
    }
}
