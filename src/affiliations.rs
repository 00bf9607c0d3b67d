//! Dynamic affiliation, registration, and channel-grant state for the trunked site.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, info};

use crate::error::{NxdnError, Result};

/// An active channel grant.
#[derive(Copy, Clone, Debug)]
struct Grant {
    /// Granted RF channel number.
    ch_no: u32,
    /// Requesting unit.
    src_id: u16,
    /// Milliseconds until the grant is reclaimed.
    remaining_ms: u32,
    /// Grant lifetime, restored by [`Affiliations::touch_grant`].
    ttl_ms: u32,
    /// Whether the grant is for a talkgroup.
    group: bool,
    /// Whether the grant is for voice (otherwise data.)
    voice: bool,
}

/// A grant released by expiry or explicit request, reported so the owner can clear any
/// out-of-band permit for the channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GrantRelease {
    /// Channel returned to the pool.
    pub ch_no: u32,
    /// Destination the grant served.
    pub dst_id: u16,
}

/// Group affiliations, unit registrations, the RF channel pool, and the grant table.
///
/// All state is in-memory and owned by the protocol core; nothing here survives a
/// restart.
#[derive(Clone, Debug, Default)]
pub struct Affiliations {
    /// Unit to talkgroup affiliations.
    group_aff: HashMap<u16, u16>,
    /// Registered units.
    unit_reg: HashSet<u16>,
    /// Free RF channel numbers.
    ch_pool: BTreeSet<u32>,
    /// Active grants by destination ID.
    grants: HashMap<u16, Grant>,
}

impl Affiliations {
    /// Create a new empty `Affiliations` table.
    pub fn new() -> Affiliations {
        Affiliations::default()
    }

    /// Affiliate a unit to a talkgroup, returning the talkgroup it was previously
    /// affiliated to, if any.
    pub fn group_aff(&mut self, src_id: u16, dst_id: u16) -> Option<u16> {
        debug!(target: "nxdn", "group affiliation, srcId = {}, dstId = {}", src_id, dst_id);
        self.group_aff.insert(src_id, dst_id)
    }

    /// Remove a unit's group affiliation.
    pub fn group_unaff(&mut self, src_id: u16) -> Option<u16> {
        self.group_aff.remove(&src_id)
    }

    /// Whether the given unit is affiliated to the given talkgroup.
    pub fn is_group_aff(&self, src_id: u16, dst_id: u16) -> bool {
        self.group_aff.get(&src_id) == Some(&dst_id)
    }

    /// Register a unit.
    pub fn unit_reg(&mut self, src_id: u16) {
        debug!(target: "nxdn", "unit registration, srcId = {}", src_id);
        self.unit_reg.insert(src_id);
    }

    /// Deregister a unit.
    pub fn unit_dereg(&mut self, src_id: u16) {
        self.unit_reg.remove(&src_id);
    }

    /// Whether the given unit is registered.
    pub fn is_unit_reg(&self, src_id: u16) -> bool {
        self.unit_reg.contains(&src_id)
    }

    /// Add an RF channel number to the pool of grantable channels.
    pub fn add_rf_channel(&mut self, ch_no: u32) {
        self.ch_pool.insert(ch_no);
    }

    /// Whether any RF channel is free.
    pub fn is_rf_ch_available(&self) -> bool {
        !self.ch_pool.is_empty()
    }

    /// Whether the given channel is held by an active grant.
    pub fn is_ch_busy(&self, ch_no: u32) -> bool {
        self.grants.values().any(|g| g.ch_no == ch_no)
    }

    /// Whether the given destination holds a grant.
    pub fn is_granted(&self, dst_id: u16) -> bool {
        self.grants.contains_key(&dst_id)
    }

    /// Channel granted to the given destination.
    pub fn granted_channel(&self, dst_id: u16) -> Option<u32> {
        self.grants.get(&dst_id).map(|g| g.ch_no)
    }

    /// Source unit the grant for the given destination was issued to.
    pub fn granted_src(&self, dst_id: u16) -> Option<u16> {
        self.grants.get(&dst_id).map(|g| g.src_id)
    }

    /// Grant the lowest free channel to the given destination. An existing grant for
    /// the destination is reused, refreshing its deadline.
    pub fn grant_ch(
        &mut self,
        dst_id: u16,
        src_id: u16,
        ttl_ms: u32,
        group: bool,
        voice: bool,
    ) -> Result<u32> {
        if let Some(grant) = self.grants.get_mut(&dst_id) {
            grant.remaining_ms = grant.ttl_ms;
            return Ok(grant.ch_no);
        }

        let ch_no = *self.ch_pool.iter().next().ok_or(NxdnError::NoChannel)?;
        self.ch_pool.remove(&ch_no);

        self.grants.insert(
            dst_id,
            Grant {
                ch_no,
                src_id,
                remaining_ms: ttl_ms,
                ttl_ms,
                group,
                voice,
            },
        );

        info!(target: "nxdn", "granting chNo = {}, dstId = {}, srcId = {}", ch_no, dst_id, src_id);

        Ok(ch_no)
    }

    /// Refresh the deadline of the grant for the given destination, if one exists.
    pub fn touch_grant(&mut self, dst_id: u16) {
        if let Some(grant) = self.grants.get_mut(&dst_id) {
            grant.remaining_ms = grant.ttl_ms;
        }
    }

    /// Release the grant for the given destination, returning its channel to the pool.
    /// Without `force`, only voice grants are released.
    pub fn release_grant(&mut self, dst_id: u16, force: bool) -> Option<GrantRelease> {
        let grant = *self.grants.get(&dst_id)?;

        if !grant.voice && !force {
            return None;
        }

        self.grants.remove(&dst_id);
        self.ch_pool.insert(grant.ch_no);

        info!(target: "nxdn", "releasing chNo = {}, dstId = {}", grant.ch_no, dst_id);

        Some(GrantRelease {
            ch_no: grant.ch_no,
            dst_id,
        })
    }

    /// Release every grant, returning the released entries.
    pub fn release_all_grants(&mut self) -> Vec<GrantRelease> {
        let dst_ids: Vec<u16> = self.grants.keys().cloned().collect();

        dst_ids
            .into_iter()
            .filter_map(|dst_id| self.release_grant(dst_id, true))
            .collect()
    }

    /// Clear every affiliation and registration.
    pub fn clear_affiliations(&mut self) {
        self.group_aff.clear();
        self.unit_reg.clear();
    }

    /// Advance grant deadlines by the given number of milliseconds, releasing every
    /// grant whose deadline has passed.
    pub fn clock(&mut self, ms: u32) -> Vec<GrantRelease> {
        let expired: Vec<u16> = self
            .grants
            .iter_mut()
            .filter_map(|(&dst_id, grant)| {
                grant.remaining_ms = grant.remaining_ms.saturating_sub(ms);
                if grant.remaining_ms == 0 {
                    Some(dst_id)
                } else {
                    None
                }
            })
            .collect();

        expired
            .into_iter()
            .filter_map(|dst_id| self.release_grant(dst_id, true))
            .collect()
    }

    /// Number of active grants.
    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pool(chans: &[u32]) -> Affiliations {
        let mut aff = Affiliations::new();
        for &ch in chans {
            aff.add_rf_channel(ch);
        }
        aff
    }

    #[test]
    fn test_affiliation() {
        let mut aff = Affiliations::new();

        assert_eq!(aff.group_aff(100, 7000), None);
        assert!(aff.is_group_aff(100, 7000));
        assert!(!aff.is_group_aff(100, 7001));

        assert_eq!(aff.group_aff(100, 7001), Some(7000));
        assert!(aff.is_group_aff(100, 7001));

        assert_eq!(aff.group_unaff(100), Some(7001));
        assert!(!aff.is_group_aff(100, 7001));
    }

    #[test]
    fn test_registration() {
        let mut aff = Affiliations::new();

        assert!(!aff.is_unit_reg(1001));
        aff.unit_reg(1001);
        assert!(aff.is_unit_reg(1001));
        aff.unit_dereg(1001);
        assert!(!aff.is_unit_reg(1001));
    }

    #[test]
    fn test_grant_lowest_channel() {
        let mut aff = pool(&[3, 1, 2]);

        assert_eq!(aff.grant_ch(7000, 100, 15_000, true, true), Ok(1));
        assert_eq!(aff.grant_ch(7001, 101, 15_000, true, true), Ok(2));
        assert_eq!(aff.grant_ch(7002, 102, 15_000, true, true), Ok(3));
        assert_eq!(
            aff.grant_ch(7003, 103, 15_000, true, true),
            Err(NxdnError::NoChannel)
        );

        assert!(aff.is_ch_busy(1));
        assert!(!aff.is_rf_ch_available());
    }

    #[test]
    fn test_grant_reuse() {
        let mut aff = pool(&[1, 2]);

        assert_eq!(aff.grant_ch(7000, 100, 15_000, true, true), Ok(1));
        // A second request for the same destination reuses the channel.
        assert_eq!(aff.grant_ch(7000, 100, 15_000, true, true), Ok(1));
        assert_eq!(aff.grant_count(), 1);
    }

    #[test]
    fn test_release_returns_channel() {
        let mut aff = pool(&[1, 2]);

        aff.grant_ch(7000, 100, 15_000, true, true).unwrap();
        aff.grant_ch(7001, 101, 15_000, true, true).unwrap();

        let rel = aff.release_grant(7000, false).unwrap();
        assert_eq!(rel, GrantRelease { ch_no: 1, dst_id: 7000 });

        // Channel 1 is free again and remains the lowest.
        assert_eq!(aff.grant_ch(7002, 102, 15_000, true, true), Ok(1));
    }

    #[test]
    fn test_data_grant_needs_force() {
        let mut aff = pool(&[1]);

        aff.grant_ch(8000, 100, 15_000, true, false).unwrap();
        assert_eq!(aff.release_grant(8000, false), None);
        assert!(aff.release_grant(8000, true).is_some());
    }

    #[test]
    fn test_clock_expiry() {
        let mut aff = pool(&[1, 2]);

        aff.grant_ch(7000, 100, 1_000, true, true).unwrap();
        aff.grant_ch(7001, 101, 2_000, true, true).unwrap();

        assert!(aff.clock(500).is_empty());

        let released = aff.clock(500);
        assert_eq!(released, vec![GrantRelease { ch_no: 1, dst_id: 7000 }]);
        assert!(aff.is_granted(7001));

        let released = aff.clock(1_000);
        assert_eq!(released, vec![GrantRelease { ch_no: 2, dst_id: 7001 }]);
        assert_eq!(aff.grant_count(), 0);
        assert!(aff.is_rf_ch_available());
    }

    #[test]
    fn test_touch_extends_deadline() {
        let mut aff = pool(&[1]);

        aff.grant_ch(7000, 100, 1_000, true, true).unwrap();
        aff.clock(900);
        aff.touch_grant(7000);
        assert!(aff.clock(900).is_empty());
        assert!(aff.is_granted(7000));
    }

    #[test]
    fn test_release_all() {
        let mut aff = pool(&[1, 2]);
        aff.grant_ch(7000, 100, 15_000, true, true).unwrap();
        aff.grant_ch(8000, 101, 15_000, true, false).unwrap();

        let released = aff.release_all_grants();
        assert_eq!(released.len(), 2);
        assert_eq!(aff.grant_count(), 0);
    }
}
