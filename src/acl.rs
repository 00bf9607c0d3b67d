//! Access control lookups for radio IDs and talkgroups.
//!
//! The tables are immutable snapshots injected by the host at startup. An absent allow
//! list permits every ID; the deny list always wins.

use std::collections::HashSet;

/// Allow/deny rules for unit IDs and talkgroup IDs.
#[derive(Clone, Debug, Default)]
pub struct AccessControl {
    /// Permitted unit IDs, or `None` to permit all.
    rid_allow: Option<HashSet<u16>>,
    /// Rejected unit IDs.
    rid_deny: HashSet<u16>,
    /// Permitted talkgroups, or `None` to permit all.
    tg_allow: Option<HashSet<u16>>,
    /// Rejected talkgroups.
    tg_deny: HashSet<u16>,
}

impl AccessControl {
    /// Create rules that permit everything.
    pub fn permissive() -> AccessControl {
        AccessControl::default()
    }

    /// Restrict unit IDs to the given allow list.
    pub fn with_rid_allow<I: IntoIterator<Item = u16>>(mut self, ids: I) -> AccessControl {
        self.rid_allow = Some(ids.into_iter().collect());
        self
    }

    /// Reject the given unit IDs.
    pub fn with_rid_deny<I: IntoIterator<Item = u16>>(mut self, ids: I) -> AccessControl {
        self.rid_deny = ids.into_iter().collect();
        self
    }

    /// Restrict talkgroups to the given allow list.
    pub fn with_tg_allow<I: IntoIterator<Item = u16>>(mut self, ids: I) -> AccessControl {
        self.tg_allow = Some(ids.into_iter().collect());
        self
    }

    /// Reject the given talkgroups.
    pub fn with_tg_deny<I: IntoIterator<Item = u16>>(mut self, ids: I) -> AccessControl {
        self.tg_deny = ids.into_iter().collect();
        self
    }

    /// Check whether the given unit ID may use the system. ID zero is never valid.
    pub fn validate_rid(&self, id: u16) -> bool {
        if id == 0 || self.rid_deny.contains(&id) {
            return false;
        }

        match self.rid_allow {
            Some(ref allow) => allow.contains(&id),
            None => true,
        }
    }

    /// Check whether the given talkgroup may be used. TG zero is never valid.
    pub fn validate_tg(&self, id: u16) -> bool {
        if id == 0 || self.tg_deny.contains(&id) {
            return false;
        }

        match self.tg_allow {
            Some(ref allow) => allow.contains(&id),
            None => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_permissive() {
        let acl = AccessControl::permissive();
        assert!(acl.validate_rid(1001));
        assert!(acl.validate_tg(7000));
        assert!(!acl.validate_rid(0));
        assert!(!acl.validate_tg(0));
    }

    #[test]
    fn test_allow_list() {
        let acl = AccessControl::permissive().with_rid_allow([1001, 1002]);
        assert!(acl.validate_rid(1001));
        assert!(acl.validate_rid(1002));
        assert!(!acl.validate_rid(1003));
    }

    #[test]
    fn test_deny_wins() {
        let acl = AccessControl::permissive()
            .with_rid_allow([1001, 1002])
            .with_rid_deny([1002]);
        assert!(acl.validate_rid(1001));
        assert!(!acl.validate_rid(1002));
    }

    #[test]
    fn test_tg_rules() {
        let acl = AccessControl::permissive().with_tg_deny([9999]);
        assert!(acl.validate_tg(7000));
        assert!(!acl.validate_tg(9999));
    }
}
