//! The trunking engine: RCCH request servicing, channel grant arbitration, and the
//! control channel broadcast cadence.

use log::{debug, error, info, warn};

use crate::channel::cac::{self, Cac};
use crate::channel::lich::{Lich, RfChannelType};
use crate::consts::{
    CAUSE_MM_LOC_ACPT_GRP_REFUSE, CAUSE_MM_REG_ACCEPTED, CAUSE_MM_REG_FAILED,
    CAUSE_MM_REG_REFUSED, CAUSE_SVC_UNAVAILABLE, CAUSE_VD_ACCEPTED,
    CAUSE_VD_QUE_CHN_RESOURCE_NOT_AVAIL, CAUSE_VD_QUE_GRP_BUSY, CAUSE_VD_REQ_UNIT_NOT_PERM,
    CAUSE_VD_REQ_UNIT_NOT_REG, CAUSE_VD_TGT_UNIT_NOT_PERM, FRAME_META_BYTES,
    LC_LENGTH_BYTES, LICH_CAC_OUTBOUND, LICH_DATA_COMMON, LICH_DATA_NORMAL,
    SR_RCCH_HEAD_SINGLE, SR_RCCH_SINGLE, TAG_DATA,
};
use crate::control::{CoreState, HostInterface, NetState, RfState, FRAME_BUF_BYTES};
use crate::lc::rcch::{MessageType, RcchLc};
use crate::scramble::scramble;
use crate::sync;

/// Inactivity deadline of a channel grant.
const GRANT_TIMEOUT_MS: u32 = 15_000;

/// Control channel request processor and broadcast generator.
pub struct Trunk {
    /// Last rejected unit, to damp repeated denials.
    last_reject_id: u16,
}

impl Trunk {
    /// Create a new `Trunk`.
    pub fn new() -> Trunk {
        Trunk { last_reject_id: 0 }
    }

    /// Process an RCCH frame from the RF interface.
    pub fn process_rf(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        data: &mut [u8],
    ) -> bool {
        let cac = match Cac::decode(&data[FRAME_META_BYTES..]) {
            Ok(cac) => cac,
            Err(_) => return false,
        };

        if cac.ran != state.config.ran && cac.ran != 0 {
            return false;
        }

        let prev_state = state.rf_state;
        if state.rf_state != RfState::Data {
            state.rf_state = RfState::Data;
        }

        state.queue.clear();

        let rcch = match RcchLc::decode(&cac.data) {
            Ok(rcch) => rcch,
            Err(err) => {
                error!(target: "rf", "NXDN, undecodable RCCH, {}", err);
                state.rf_state = prev_state;
                return false;
            }
        };

        let src_id = rcch.src_id;
        let dst_id = rcch.dst_id;

        match rcch.message_type {
            MessageType::VcallConn => {
                // Make sure control data is supported.
                if !state.config.control {
                    warn!(target: "rf", "NXDN, VCALL_REQ denial, unsupported service, srcId = {}", src_id);
                    self.write_deny(state, host, 0, src_id, CAUSE_SVC_UNAVAILABLE);
                    state.rf_state = RfState::Rejected;
                    return false;
                }

                // Validate the source RID.
                if !state.acl.validate_rid(src_id) {
                    warn!(target: "rf", "NXDN, VCALL_REQ denial, RID rejection, srcId = {}", src_id);
                    self.write_deny(state, host, 0, src_id, CAUSE_VD_REQ_UNIT_NOT_PERM);
                    state.rf_state = RfState::Rejected;
                    return false;
                }

                // Validate the talkgroup.
                if !state.acl.validate_tg(dst_id) {
                    warn!(target: "rf", "NXDN, VCALL_REQ denial, TGID rejection, dstId = {}", dst_id);
                    self.write_deny(state, host, 0, src_id, CAUSE_VD_TGT_UNIT_NOT_PERM);
                    state.rf_state = RfState::Rejected;
                    return false;
                }

                // Verify the source RID is affiliated.
                if state.config.verify_aff && !state.affiliations.is_group_aff(src_id, dst_id) {
                    warn!(
                        target: "rf",
                        "NXDN, VCALL_REQ denial, RID not affiliated to TGID, srcId = {}, dstId = {}",
                        src_id,
                        dst_id
                    );
                    self.write_deny(state, host, 0, src_id, CAUSE_VD_REQ_UNIT_NOT_REG);
                    state.rf_state = RfState::Rejected;
                    return false;
                }

                info!(target: "rf", "NXDN, VCALL_REQ, srcId = {}, dstId = {}", src_id, dst_id);

                let service_options = (rcch.emergency as u8) << 7
                    | (rcch.encrypted as u8) << 6
                    | (rcch.priority & 0x07);

                if state.config.authoritative {
                    self.write_grant(state, host, src_id, dst_id, service_options, true, false);
                } else {
                    host.write_grant_req(src_id, dst_id, false);
                }
            }
            MessageType::Reg => {
                if !state.config.control {
                    warn!(target: "rf", "NXDN, REG_REQ denial, unsupported service, srcId = {}", src_id);
                    self.write_deny(state, host, 0, src_id, CAUSE_SVC_UNAVAILABLE);
                    state.rf_state = RfState::Rejected;
                    return false;
                }

                info!(
                    target: "rf",
                    "NXDN, REG_REQ, srcId = {}, locId = ${:06X}",
                    src_id,
                    rcch.loc_id
                );

                self.write_reg_rsp(state, host, src_id, rcch.loc_id);
            }
            MessageType::RegC => {
                if !state.config.control {
                    warn!(target: "rf", "NXDN, REG_C_REQ denial, unsupported service, srcId = {}", src_id);
                    self.write_deny(state, host, 0, src_id, CAUSE_SVC_UNAVAILABLE);
                    state.rf_state = RfState::Rejected;
                    return false;
                }

                self.write_reg_check_rsp(state, host, src_id, rcch.loc_id);
            }
            MessageType::GrpReg => {
                if !state.config.control {
                    warn!(target: "rf", "NXDN, GRP_REG_REQ denial, unsupported service, srcId = {}", src_id);
                    self.write_deny(state, host, 0, src_id, CAUSE_SVC_UNAVAILABLE);
                    state.rf_state = RfState::Rejected;
                    return false;
                }

                info!(
                    target: "rf",
                    "NXDN, GRP_REG_REQ, srcId = {}, dstId = {}, locId = ${:06X}",
                    src_id,
                    dst_id,
                    rcch.loc_id
                );

                self.write_grp_reg_rsp(state, host, src_id, dst_id, rcch.loc_id);
            }
            other => {
                error!(
                    target: "rf",
                    "NXDN, unhandled message type, messageType = ${:02X}",
                    other.to_bits()
                );
            }
        }

        state.rf_state = prev_state;
        true
    }

    /// Service a grant demand that didn't originate on our RF channel: an upstream
    /// network demand or the administration surface.
    pub fn grant_demand(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        src_id: u16,
        dst_id: u16,
        unit_to_unit: bool,
    ) -> bool {
        if !state.config.control {
            return false;
        }

        if state.affiliations.is_granted(dst_id) {
            return false;
        }

        debug!(
            target: "net",
            "NXDN, network/admin grant demand, srcId = {}, dstId = {}",
            src_id,
            dst_id
        );

        self.write_grant(state, host, src_id, dst_id, 0, !unit_to_unit, true)
    }

    /// Write a grant (or the deny it degrades to) for the given request.
    pub fn write_grant(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        src_id: u16,
        dst_id: u16,
        service_options: u8,
        group: bool,
        net: bool,
    ) -> bool {
        let emergency = service_options & 0x80 == 0x80;
        let encrypted = service_options & 0x40 == 0x40;
        let priority = service_options & 0x07;

        // Busy with another RF call?
        if state.rf_state != RfState::Listening && state.rf_state != RfState::Data {
            if !net {
                warn!(target: "rf", "NXDN, VCALL_REQ denied, traffic in progress, dstId = {}", dst_id);
                self.write_deny(state, host, 0, src_id, CAUSE_VD_QUE_GRP_BUSY);

                info!(
                    target: "activity",
                    "NXDN, RF, group grant request from {} to TG {} denied",
                    src_id,
                    dst_id
                );
                state.rf_state = RfState::Rejected;
            }

            return false;
        }

        // Busy with a network call on the same destination?
        if state.net_state != NetState::Idle && dst_id == state.net_last_dst_id {
            if !net {
                warn!(target: "rf", "NXDN, VCALL_REQ denied, traffic in progress, dstId = {}", dst_id);
                self.write_deny(state, host, 0, src_id, CAUSE_VD_QUE_GRP_BUSY);

                info!(
                    target: "activity",
                    "NXDN, RF, group grant request from {} to TG {} denied",
                    src_id,
                    dst_id
                );
                state.rf_state = RfState::Rejected;
            }

            return false;
        }

        // The talkgroup hang timer pins the channel to the last destination.
        if state.rf_last_dst_id != 0
            && state.rf_last_dst_id != dst_id
            && state.rf_tg_hang.is_running()
            && !state.rf_tg_hang.has_expired()
        {
            if !net {
                self.write_deny(state, host, 0, src_id, CAUSE_VD_QUE_GRP_BUSY);
                state.rf_state = RfState::Rejected;
            }

            return false;
        }

        let ch_no = match state.affiliations.granted_channel(dst_id) {
            Some(ch_no) => ch_no,
            None => {
                if !state.affiliations.is_rf_ch_available() {
                    if !net {
                        warn!(
                            target: "rf",
                            "NXDN, VCALL_REQ queued, no channels available, dstId = {}",
                            dst_id
                        );
                        self.write_deny(
                            state,
                            host,
                            0,
                            src_id,
                            CAUSE_VD_QUE_CHN_RESOURCE_NOT_AVAIL,
                        );

                        info!(
                            target: "activity",
                            "NXDN, RF, group grant request from {} to TG {} queued",
                            src_id,
                            dst_id
                        );
                        state.rf_state = RfState::Rejected;
                    }

                    return false;
                }

                match state
                    .affiliations
                    .grant_ch(dst_id, src_id, GRANT_TIMEOUT_MS, group, true)
                {
                    Ok(ch_no) => ch_no,
                    Err(_) => return false,
                }
            }
        };

        if !net {
            if group {
                info!(
                    target: "activity",
                    "NXDN, RF, group grant request from {} to TG {}",
                    src_id,
                    dst_id
                );
            } else {
                info!(
                    target: "activity",
                    "NXDN, RF, unit-to-unit grant request from {} to {}",
                    src_id,
                    dst_id
                );
            }
        }

        // Permit the granted talkgroup on the payload channel out of band. A refused
        // permit takes the grant back.
        if state.config.authoritative
            && state.config.supervisor
            && ch_no != state.site.channel_no()
            && !host.permit_ch(ch_no, dst_id)
        {
            error!(
                target: if net { "net" } else { "rf" },
                "NXDN, VCALL_RESP, failed to permit TG for use, chNo = {}",
                ch_no
            );
            state.affiliations.release_grant(dst_id, false);

            if !net {
                self.write_deny(state, host, 0, src_id, CAUSE_VD_QUE_GRP_BUSY);
                state.rf_state = RfState::Rejected;
            }

            return false;
        }

        let mut rcch = RcchLc::new(MessageType::VcallConn);
        rcch.grp_vch_no = ch_no as u16;
        rcch.group = group;
        rcch.src_id = src_id;
        rcch.dst_id = dst_id;
        rcch.emergency = emergency;
        rcch.encrypted = encrypted;
        rcch.priority = priority;
        rcch.cause = CAUSE_VD_ACCEPTED;

        info!(
            target: if net { "net" } else { "rf" },
            "NXDN, VCALL_RESP, emerg = {}, encrypt = {}, prio = {}, chNo = {}, srcId = {}, dstId = {}",
            emergency,
            encrypted,
            priority,
            ch_no,
            src_id,
            dst_id
        );

        self.write_message(state, host, &rcch, SR_RCCH_SINGLE, net, true);
        true
    }

    /// Write a deny response for a rejected request.
    fn write_deny(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        src_id: u16,
        dst_id: u16,
        reason: u8,
    ) {
        let mut rcch = RcchLc::new(MessageType::VcallConn);
        rcch.cause = reason;
        rcch.src_id = src_id;
        rcch.dst_id = dst_id;

        if self.last_reject_id == 0 || self.last_reject_id != dst_id {
            debug!(
                target: "rf",
                "NXDN, VCALL_RESP denial, reason = ${:02X}, dstId = {}",
                reason,
                dst_id
            );
            self.last_reject_id = dst_id;
        }

        self.write_message(state, host, &rcch, SR_RCCH_SINGLE, false, false);
    }

    /// Validate and answer a unit registration request.
    fn write_reg_rsp(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        src_id: u16,
        loc_id: u32,
    ) {
        let mut cause = CAUSE_MM_REG_ACCEPTED;

        // Validate the location ID.
        if loc_id != state.site.loc_id() {
            warn!(target: "rf", "NXDN, REG_REQ denial, LOCID rejection, locId = ${:06X}", loc_id);
            info!(target: "activity", "NXDN, RF, unit registration request from {} denied", src_id);
            cause = CAUSE_MM_REG_FAILED;
        }

        // Validate the source RID.
        if !state.acl.validate_rid(src_id) {
            warn!(target: "rf", "NXDN, REG_REQ denial, RID rejection, srcId = {}", src_id);
            info!(target: "activity", "NXDN, RF, unit registration request from {} denied", src_id);
            cause = CAUSE_MM_REG_FAILED;
        }

        if cause == CAUSE_MM_REG_ACCEPTED {
            info!(target: "activity", "NXDN, RF, unit registration request from {}", src_id);

            if !state.affiliations.is_unit_reg(src_id) {
                state.affiliations.unit_reg(src_id);
            }
        }

        let mut rcch = RcchLc::new(MessageType::Reg);
        rcch.cause = cause;
        rcch.loc_id = state.site.loc_id();
        rcch.src_id = src_id;
        rcch.dst_id = src_id;

        self.write_message(state, host, &rcch, SR_RCCH_SINGLE, true, false);
    }

    /// Answer a registration check without touching the registration table.
    fn write_reg_check_rsp(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        src_id: u16,
        loc_id: u32,
    ) {
        let mut cause = CAUSE_MM_REG_ACCEPTED;

        if loc_id != state.site.loc_id() {
            warn!(target: "rf", "NXDN, REG_C_REQ denial, LOCID rejection, locId = ${:06X}", loc_id);
            cause = CAUSE_MM_REG_FAILED;
        } else if !state.affiliations.is_unit_reg(src_id) {
            cause = CAUSE_MM_REG_REFUSED;
        }

        info!(
            target: "rf",
            "NXDN, REG_C_REQ, srcId = {}, causeRsp = ${:02X}",
            src_id,
            cause
        );

        let mut rcch = RcchLc::new(MessageType::RegC);
        rcch.cause = cause;
        rcch.loc_id = state.site.loc_id();
        rcch.src_id = src_id;
        rcch.dst_id = src_id;

        self.write_message(state, host, &rcch, SR_RCCH_SINGLE, true, false);
    }

    /// Validate and answer a group registration request, updating the affiliation
    /// table on acceptance.
    fn write_grp_reg_rsp(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        src_id: u16,
        dst_id: u16,
        loc_id: u32,
    ) -> bool {
        let mut cause = CAUSE_MM_REG_ACCEPTED;

        // Validate the location ID.
        if loc_id != state.site.loc_id() {
            warn!(target: "rf", "NXDN, GRP_REG_REQ denial, LOCID rejection, locId = ${:06X}", loc_id);
            info!(
                target: "activity",
                "NXDN, RF, group affiliation request from {} denied",
                src_id
            );
            cause = CAUSE_MM_REG_FAILED;
        }

        // Validate the source RID.
        if !state.acl.validate_rid(src_id) {
            warn!(target: "rf", "NXDN, GRP_REG_REQ denial, RID rejection, srcId = {}", src_id);
            info!(
                target: "activity",
                "NXDN, RF, group affiliation request from {} to TG {} denied",
                src_id,
                dst_id
            );
            cause = CAUSE_MM_REG_FAILED;
        }

        // Verify the source RID is registered.
        if state.config.verify_reg && !state.affiliations.is_unit_reg(src_id) {
            warn!(target: "rf", "NXDN, GRP_REG_REQ denial, RID not registered, srcId = {}", src_id);
            info!(
                target: "activity",
                "NXDN, RF, group affiliation request from {} to TG {} denied",
                src_id,
                dst_id
            );
            cause = CAUSE_MM_REG_REFUSED;
        }

        // Validate the talkgroup.
        if dst_id == 0 {
            warn!(target: "rf", "NXDN, GRP_REG_REQ, TGID 0, dstId = {}", dst_id);
        } else if !state.acl.validate_tg(dst_id) {
            warn!(target: "rf", "NXDN, GRP_REG_REQ denial, TGID rejection, dstId = {}", dst_id);
            info!(
                target: "activity",
                "NXDN, RF, group affiliation request from {} to TG {} denied",
                src_id,
                dst_id
            );
            cause = CAUSE_MM_LOC_ACPT_GRP_REFUSE;
        }

        let accepted = cause == CAUSE_MM_REG_ACCEPTED;
        if accepted {
            info!(
                target: "activity",
                "NXDN, RF, group affiliation request from {} to TG {}",
                src_id,
                dst_id
            );

            state.affiliations.group_aff(src_id, dst_id);
        }

        let mut rcch = RcchLc::new(MessageType::GrpReg);
        rcch.cause = cause;
        rcch.loc_id = state.site.loc_id();
        rcch.src_id = src_id;
        rcch.dst_id = dst_id;

        self.write_message(state, host, &rcch, SR_RCCH_SINGLE, false, false);
        accepted
    }

    /// Write the CC broadcast frame for the given superframe position: the head slot
    /// carries SITE_INFO, every other slot SRV_INFO.
    pub fn write_cc_frame(&self, state: &mut CoreState, frame_cnt: u8, seq: u8) {
        debug!(target: "nxdn", "writeRF_ControlData, frameCnt = {}, seq = {}", frame_cnt, seq);

        let (rcch, structure, option) = if seq == 0 {
            (
                RcchLc::site_info(&state.site, state.config.superframe),
                SR_RCCH_HEAD_SINGLE,
                LICH_DATA_NORMAL,
            )
        } else {
            (
                RcchLc::srv_info(&state.site),
                SR_RCCH_SINGLE,
                LICH_DATA_NORMAL,
            )
        };

        let frame = build_rcch_frame(state, &rcch, structure, option);

        if state.config.duplex {
            state.add_frame(&frame, false);
        }
    }

    /// Build, queue, and optionally network-forward a single RCCH message frame.
    fn write_message(
        &self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        rcch: &RcchLc,
        structure: u8,
        no_network: bool,
        clear_before_write: bool,
    ) {
        if !state.config.control {
            return;
        }

        let frame = build_rcch_frame(state, rcch, structure, LICH_DATA_COMMON);

        if !no_network {
            host.write_net_frame(&state.rf_lc, &frame);
        }

        if clear_before_write {
            host.clear_modem();
            state.queue.clear();
        }

        if state.config.duplex {
            state.add_frame(&frame, false);
        }
    }
}

impl Default for Trunk {
    fn default() -> Trunk {
        Trunk::new()
    }
}

/// Assemble a complete outbound RCCH frame: sync, LICH, CAC, post field, whitening.
fn build_rcch_frame(
    state: &CoreState,
    rcch: &RcchLc,
    structure: u8,
    option: u8,
) -> [u8; FRAME_BUF_BYTES] {
    let mut data = [0u8; FRAME_BUF_BYTES];

    sync::insert_fsw(&mut data[FRAME_META_BYTES..]);

    Lich::new(RfChannelType::Rcch, LICH_CAC_OUTBOUND, option, true)
        .encode(&mut data[FRAME_META_BYTES..]);

    let mut buffer = [0u8; LC_LENGTH_BYTES];
    rcch.encode(&mut buffer);

    Cac::new(state.config.ran, structure, buffer).encode(&mut data[FRAME_META_BYTES..]);

    data[0] = TAG_DATA;
    data[1] = 0x00;

    scramble(&mut data[FRAME_META_BYTES..]);

    cac::add_post_bits(&mut data[FRAME_META_BYTES..]);

    data
}
