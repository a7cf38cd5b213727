use crate::types::Username;
use std::collections::HashSet;

/// Tracks which other users are currently online.
///
/// The server always broadcasts the full authoritative membership, so both
/// entry points replace the tracked set wholesale. Nothing is ever merged or
/// inferred locally; a user is online exactly when the latest server event
/// said so.
#[derive(Debug)]
pub struct PresenceTracker {
    local_user: Username,
    online: HashSet<Username>,
}

impl PresenceTracker {
    pub fn new(local_user: impl Into<Username>) -> Self {
        Self {
            local_user: local_user.into(),
            online: HashSet::new(),
        }
    }

    /// Replaces the tracked set with a full snapshot (`online_users` event).
    pub fn apply_snapshot(&mut self, users: impl IntoIterator<Item = Username>) {
        self.online = users
            .into_iter()
            .filter(|user| *user != self.local_user)
            .collect();
    }

    /// Applies a `user_status_changed` event. The server sends the full
    /// membership there too, so this is a snapshot under another name.
    pub fn apply_delta(&mut self, users: impl IntoIterator<Item = Username>) {
        self.apply_snapshot(users);
    }

    pub fn current(&self) -> &HashSet<Username> {
        &self.online
    }

    pub fn is_online(&self, user: &str) -> bool {
        self.online.contains(user)
    }

    /// Forgets everyone. Used when the connection drops: presence is only
    /// meaningful while the server can see us.
    pub fn clear(&mut self) {
        self.online.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tracker: &PresenceTracker) -> Vec<&str> {
        let mut names: Vec<&str> = tracker.current().iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[test]
    fn excludes_the_local_user() {
        let mut tracker = PresenceTracker::new("alice");
        tracker.apply_snapshot(vec!["alice".into(), "bob".into(), "carol".into()]);
        assert_eq!(names(&tracker), vec!["bob", "carol"]);
        assert!(!tracker.is_online("alice"));
    }

    #[test]
    fn snapshot_replaces_instead_of_accumulating() {
        let mut tracker = PresenceTracker::new("alice");
        tracker.apply_snapshot(vec!["bob".into(), "carol".into()]);
        tracker.apply_delta(vec!["dave".into()]);
        assert_eq!(names(&tracker), vec!["dave"]);
    }

    #[test]
    fn reapplying_a_snapshot_is_idempotent() {
        let mut tracker = PresenceTracker::new("alice");
        tracker.apply_snapshot(vec!["bob".into()]);
        tracker.apply_snapshot(vec!["bob".into()]);
        assert_eq!(names(&tracker), vec!["bob"]);
    }

    #[test]
    fn clear_empties_the_set() {
        let mut tracker = PresenceTracker::new("alice");
        tracker.apply_snapshot(vec!["bob".into()]);
        tracker.clear();
        assert!(tracker.current().is_empty());
    }
}
