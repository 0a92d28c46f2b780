//! Pure merge of the local overlay onto the authoritative remote set.
//!
//! The stream keeps two maps: remote-confirmed records and local
//! pending/failed placeholders. Display is always a fresh merge of
//! the two; confirmed entries are never mutated in place.

use std::collections::HashMap;

use cove_shared::{sort_newest_first, Message};
use uuid::Uuid;

/// Union the two sets by id (remote wins on collision) and sort into
/// display order. Inputs are untouched.
pub fn merge_overlay(
    remote: &HashMap<Uuid, Message>,
    local: &HashMap<Uuid, Message>,
) -> Vec<Message> {
    let mut merged: Vec<Message> = remote.values().cloned().collect();
    merged.extend(
        local
            .values()
            .filter(|m| !remote.contains_key(&m.id))
            .cloned(),
    );
    sort_newest_first(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use cove_shared::{MessageStatus, User, UserId};

    fn user() -> User {
        User {
            id: UserId::new("u1"),
            name: "Uno".into(),
        }
    }

    fn msg(ts: i64, status: MessageStatus) -> Message {
        let mut m = Message::draft(&user(), format!("m{ts}"), Vec::new());
        m.timestamp_ms = ts;
        m.status = status;
        m
    }

    fn map(msgs: &[Message]) -> HashMap<Uuid, Message> {
        msgs.iter().map(|m| (m.id, m.clone())).collect()
    }

    #[test]
    fn remote_wins_on_id_collision() {
        let mut local_copy = msg(10, MessageStatus::Sending);
        let mut remote_copy = local_copy.clone();
        remote_copy.status = MessageStatus::Sent;
        local_copy.content = "stale local".into();

        let merged = merge_overlay(&map(&[remote_copy.clone()]), &map(&[local_copy]));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, MessageStatus::Sent);
        assert_eq!(merged[0].content, remote_copy.content);
    }

    #[test]
    fn overlay_entries_interleave_by_timestamp() {
        let remote = map(&[msg(10, MessageStatus::Sent), msg(30, MessageStatus::Sent)]);
        let local = map(&[msg(20, MessageStatus::Sending), msg(40, MessageStatus::Failed)]);

        let merged = merge_overlay(&remote, &local);
        let stamps: Vec<i64> = merged.iter().map(|m| m.timestamp_ms).collect();
        assert_eq!(stamps, vec![40, 30, 20, 10]);
    }

    #[test]
    fn merge_does_not_mutate_inputs() {
        let remote = map(&[msg(1, MessageStatus::Sent)]);
        let local = map(&[msg(2, MessageStatus::Sending)]);
        let remote_before = remote.clone();
        let local_before = local.clone();

        let _ = merge_overlay(&remote, &local);
        assert_eq!(remote, remote_before);
        assert_eq!(local, local_before);
    }

    #[test]
    fn empty_maps_merge_to_empty() {
        assert!(merge_overlay(&HashMap::new(), &HashMap::new()).is_empty());
    }
}
