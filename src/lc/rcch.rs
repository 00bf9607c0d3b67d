//! Decode and encode the control channel (RCCH) link control messages carried by the
//! CAC: site and service broadcasts, registration exchanges, and channel grants.

use crate::config::SuperframeCounts;
use crate::consts::{CALLSIGN_LENGTH_BYTES, LC_LENGTH_BYTES};
use crate::error::{NxdnError, Result};
use crate::lc::rtch::CallType;
use crate::site::SiteData;
use crate::util::{slice_u16, slice_u24, split_u16, split_u24};

/// Type of a control channel link control payload.
///
/// `VcallConn` shares its opcode with the traffic channel voice call: the same code
/// point is a request inbound and a response outbound.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MessageType {
    /// Voice call connection request/response.
    VcallConn,
    /// Data call assignment.
    DcallAssgn,
    /// Idle filler.
    Idle,
    /// Site information broadcast.
    SiteInfo,
    /// Service information broadcast.
    SrvInfo,
    /// Control channel information broadcast.
    CchInfo,
    /// Adjacent site information broadcast.
    AdjSiteInfo,
    /// Unit registration request/response.
    Reg,
    /// Unit registration check request/response.
    RegC,
    /// Group registration request/response.
    GrpReg,
    /// Proprietary form.
    PropForm,
}

impl MessageType {
    /// Try to parse an opcode from the given 6 bits.
    pub fn from_bits(bits: u8) -> Option<MessageType> {
        use self::MessageType::*;

        assert!(bits >> 6 == 0);

        match bits {
            0x01 => Some(VcallConn),
            0x0E => Some(DcallAssgn),
            0x10 => Some(Idle),
            0x18 => Some(SiteInfo),
            0x19 => Some(SrvInfo),
            0x1A => Some(CchInfo),
            0x1B => Some(AdjSiteInfo),
            0x20 => Some(Reg),
            0x22 => Some(RegC),
            0x24 => Some(GrpReg),
            0x3F => Some(PropForm),
            _ => None,
        }
    }

    /// Convert the opcode to its 6-bit code.
    pub fn to_bits(self) -> u8 {
        use self::MessageType::*;

        match self {
            VcallConn => 0x01,
            DcallAssgn => 0x0E,
            Idle => 0x10,
            SiteInfo => 0x18,
            SrvInfo => 0x19,
            CchInfo => 0x1A,
            AdjSiteInfo => 0x1B,
            Reg => 0x20,
            RegC => 0x22,
            GrpReg => 0x24,
            PropForm => 0x3F,
        }
    }
}

/// Link control fields of one control channel message. Each opcode carries a subset of
/// the fields; the rest stay at their defaults.
#[derive(Clone, Debug)]
pub struct RcchLc {
    /// Message type.
    pub message_type: MessageType,
    /// Source unit.
    pub src_id: u16,
    /// Destination unit or talkgroup.
    pub dst_id: u16,
    /// 24-bit location ID.
    pub loc_id: u32,
    /// Registration option byte.
    pub reg_option: u8,
    /// Version number.
    pub version: u8,
    /// Cause response.
    pub cause: u8,
    /// Granted voice channel number.
    pub grp_vch_no: u16,
    /// Call type of a grant.
    pub call_type: CallType,
    /// Emergency flag.
    pub emergency: bool,
    /// Encryption flag.
    pub encrypted: bool,
    /// Priority level, 0 to 7.
    pub priority: u8,
    /// Group call flag.
    pub group: bool,
    /// Full duplex flag.
    pub duplex: bool,
    /// Transmission mode.
    pub transmission_mode: u8,
    /// Advertised service class bitmap.
    pub service_class: u8,
    /// Channel ID of the advertised channel.
    pub channel_id: u8,
    /// Channel number of the advertised channel.
    pub channel_no: u16,
    /// Site callsign.
    pub callsign: [u8; CALLSIGN_LENGTH_BYTES],
    /// Superframe counts of a SITE_INFO broadcast.
    pub superframe: SuperframeCounts,
}

impl Default for RcchLc {
    fn default() -> RcchLc {
        RcchLc {
            message_type: MessageType::Idle,
            src_id: 0,
            dst_id: 0,
            loc_id: 0,
            reg_option: 0,
            version: 0,
            cause: 0,
            grp_vch_no: 0,
            call_type: CallType::Unspecified,
            emergency: false,
            encrypted: false,
            priority: 0,
            group: true,
            duplex: false,
            transmission_mode: 0,
            service_class: 0,
            channel_id: 0,
            channel_no: 0,
            callsign: [b' '; CALLSIGN_LENGTH_BYTES],
            superframe: SuperframeCounts::default(),
        }
    }
}

impl RcchLc {
    /// Create a new `RcchLc` with the given message type.
    pub fn new(message_type: MessageType) -> RcchLc {
        RcchLc {
            message_type,
            ..RcchLc::default()
        }
    }

    /// Create a SITE_INFO broadcast from the given site identity and superframe
    /// counts.
    pub fn site_info(site: &SiteData, superframe: SuperframeCounts) -> RcchLc {
        RcchLc {
            message_type: MessageType::SiteInfo,
            loc_id: site.loc_id(),
            service_class: site.service_class(),
            channel_id: site.channel_id(),
            channel_no: site.channel_no() as u16,
            callsign: *site.callsign(),
            superframe,
            ..RcchLc::default()
        }
    }

    /// Create a SRV_INFO broadcast from the given site identity.
    pub fn srv_info(site: &SiteData) -> RcchLc {
        RcchLc {
            message_type: MessageType::SrvInfo,
            loc_id: site.loc_id(),
            service_class: site.service_class(),
            ..RcchLc::default()
        }
    }

    /// Decode a message from a layer-3 buffer.
    pub fn decode(data: &[u8]) -> Result<RcchLc> {
        use self::MessageType::*;

        let mtype = MessageType::from_bits(data[0] & 0x3F)
            .ok_or(NxdnError::UnknownMessageType(data[0] & 0x3F))?;

        let mut lc = RcchLc::new(mtype);

        match mtype {
            VcallConn | DcallAssgn => {
                lc.emergency = data[1] & 0x80 == 0x80;
                lc.encrypted = data[1] & 0x40 == 0x40;
                lc.priority = data[1] & 0x07;
                lc.call_type = CallType::from_bits(data[2] >> 5 & 0x07);
                lc.duplex = data[2] & 0x10 == 0x10;
                lc.transmission_mode = data[2] & 0x07;
                lc.src_id = slice_u16(&data[3..]);
                lc.dst_id = slice_u16(&data[5..]);
                lc.cause = data[7];
                lc.grp_vch_no = slice_u16(&data[8..]) & 0x3FF;
                lc.group = data[10] & 0x80 == 0x80;
            }
            Reg | RegC => {
                lc.loc_id = slice_u24(&data[1..]);
                lc.reg_option = data[4];
                lc.src_id = slice_u16(&data[5..]);
                lc.dst_id = slice_u16(&data[7..]);
                lc.cause = data[9];
                lc.version = data[10];
            }
            GrpReg => {
                lc.reg_option = data[1];
                lc.loc_id = slice_u24(&data[2..]);
                lc.src_id = slice_u16(&data[5..]);
                lc.dst_id = slice_u16(&data[7..]);
                lc.cause = data[9];
            }
            SiteInfo => {
                lc.loc_id = slice_u24(&data[1..]);
                lc.superframe = SuperframeCounts {
                    bcch_cnt: data[4] >> 4,
                    rcch_grouping_cnt: data[4] & 0x0F,
                    ccch_paging_cnt: data[5] >> 4,
                    ccch_multi_cnt: data[5] & 0x0F,
                    rcch_iterate_cnt: data[6] >> 4,
                };
                lc.version = data[6] & 0x0F;
                lc.service_class = data[7];
                let channel = slice_u16(&data[8..]);
                lc.channel_id = (channel >> 12) as u8;
                lc.channel_no = channel & 0x3FF;
                lc.callsign.copy_from_slice(&data[10..10 + CALLSIGN_LENGTH_BYTES]);
            }
            SrvInfo => {
                lc.loc_id = slice_u24(&data[1..]);
                lc.service_class = data[4];
            }
            CchInfo => {
                lc.loc_id = slice_u24(&data[1..]);
                let channel = slice_u16(&data[4..]);
                lc.channel_id = (channel >> 12) as u8;
                lc.channel_no = channel & 0x3FF;
            }
            AdjSiteInfo => {
                lc.loc_id = slice_u24(&data[1..]);
                let channel = slice_u16(&data[4..]);
                lc.channel_id = (channel >> 12) as u8;
                lc.channel_no = channel & 0x3FF;
                lc.service_class = data[6];
            }
            Idle | PropForm => {}
        }

        Ok(lc)
    }

    /// Encode the message into a layer-3 buffer.
    pub fn encode(&self, data: &mut [u8]) {
        use self::MessageType::*;

        data[..LC_LENGTH_BYTES].fill(0);
        data[0] = self.message_type.to_bits();

        match self.message_type {
            VcallConn | DcallAssgn => {
                data[1] = (self.emergency as u8) << 7
                    | (self.encrypted as u8) << 6
                    | (self.priority & 0x07);
                data[2] = self.call_type.to_bits() << 5
                    | (self.duplex as u8) << 4
                    | (self.transmission_mode & 0x07);
                split_u16(self.src_id, &mut data[3..]);
                split_u16(self.dst_id, &mut data[5..]);
                data[7] = self.cause;
                split_u16(self.grp_vch_no & 0x3FF, &mut data[8..]);
                data[10] = (self.group as u8) << 7;
            }
            Reg | RegC => {
                split_u24(self.loc_id, &mut data[1..]);
                data[4] = self.reg_option;
                split_u16(self.src_id, &mut data[5..]);
                split_u16(self.dst_id, &mut data[7..]);
                data[9] = self.cause;
                data[10] = self.version;
            }
            GrpReg => {
                data[1] = self.reg_option;
                split_u24(self.loc_id, &mut data[2..]);
                split_u16(self.src_id, &mut data[5..]);
                split_u16(self.dst_id, &mut data[7..]);
                data[9] = self.cause;
            }
            SiteInfo => {
                split_u24(self.loc_id, &mut data[1..]);
                data[4] = self.superframe.bcch_cnt << 4 | (self.superframe.rcch_grouping_cnt & 0x0F);
                data[5] = self.superframe.ccch_paging_cnt << 4 | (self.superframe.ccch_multi_cnt & 0x0F);
                data[6] = self.superframe.rcch_iterate_cnt << 4 | (self.version & 0x0F);
                data[7] = self.service_class;
                split_u16(
                    (self.channel_id as u16) << 12 | (self.channel_no & 0x3FF),
                    &mut data[8..],
                );
                data[10..10 + CALLSIGN_LENGTH_BYTES].copy_from_slice(&self.callsign);
            }
            SrvInfo => {
                split_u24(self.loc_id, &mut data[1..]);
                data[4] = self.service_class;
            }
            CchInfo => {
                split_u24(self.loc_id, &mut data[1..]);
                split_u16(
                    (self.channel_id as u16) << 12 | (self.channel_no & 0x3FF),
                    &mut data[4..],
                );
            }
            AdjSiteInfo => {
                split_u24(self.loc_id, &mut data[1..]);
                split_u16(
                    (self.channel_id as u16) << 12 | (self.channel_no & 0x3FF),
                    &mut data[4..],
                );
                data[6] = self.service_class;
            }
            Idle | PropForm => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consts::{CAUSE_VD_ACCEPTED, SIF1_GRP_REG_SVC, SIF1_VOICE_CALL_SVC};

    fn roundtrip(lc: &RcchLc) -> RcchLc {
        let mut wire = [0u8; LC_LENGTH_BYTES];
        lc.encode(&mut wire);
        RcchLc::decode(&wire).unwrap()
    }

    #[test]
    fn test_vcall_conn_roundtrip() {
        let mut lc = RcchLc::new(MessageType::VcallConn);
        lc.src_id = 100;
        lc.dst_id = 7000;
        lc.cause = CAUSE_VD_ACCEPTED;
        lc.grp_vch_no = 1;
        lc.emergency = true;
        lc.encrypted = true;
        lc.priority = 5;
        lc.group = true;
        lc.call_type = CallType::Conference;

        let out = roundtrip(&lc);
        assert_eq!(out.message_type, MessageType::VcallConn);
        assert_eq!(out.src_id, 100);
        assert_eq!(out.dst_id, 7000);
        assert_eq!(out.cause, CAUSE_VD_ACCEPTED);
        assert_eq!(out.grp_vch_no, 1);
        assert!(out.emergency);
        assert!(out.encrypted);
        assert_eq!(out.priority, 5);
        assert!(out.group);
        assert_eq!(out.call_type, CallType::Conference);
    }

    #[test]
    fn test_reg_roundtrip() {
        let mut lc = RcchLc::new(MessageType::Reg);
        lc.loc_id = 0x01234;
        lc.reg_option = 0x40;
        lc.src_id = 1001;
        lc.dst_id = 1001;
        lc.cause = 0x01;
        lc.version = 2;

        let out = roundtrip(&lc);
        assert_eq!(out.message_type, MessageType::Reg);
        assert_eq!(out.loc_id, 0x01234);
        assert_eq!(out.reg_option, 0x40);
        assert_eq!(out.src_id, 1001);
        assert_eq!(out.dst_id, 1001);
        assert_eq!(out.cause, 0x01);
        assert_eq!(out.version, 2);
    }

    #[test]
    fn test_grp_reg_roundtrip() {
        let mut lc = RcchLc::new(MessageType::GrpReg);
        lc.loc_id = 0xABCDEF;
        lc.src_id = 100;
        lc.dst_id = 7000;
        lc.cause = 0x05;

        let out = roundtrip(&lc);
        assert_eq!(out.message_type, MessageType::GrpReg);
        assert_eq!(out.loc_id, 0xABCDEF);
        assert_eq!(out.src_id, 100);
        assert_eq!(out.dst_id, 7000);
        assert_eq!(out.cause, 0x05);
    }

    #[test]
    fn test_site_info_roundtrip() {
        let mut site = SiteData::new(
            SiteData::location_id(1, 0x1234, 5),
            3,
            17,
            SIF1_VOICE_CALL_SVC | SIF1_GRP_REG_SVC,
            false,
        );
        site.set_callsign("W1AW");

        let lc = RcchLc::site_info(&site, SuperframeCounts::default());
        let out = roundtrip(&lc);

        assert_eq!(out.message_type, MessageType::SiteInfo);
        assert_eq!(out.loc_id, site.loc_id());
        assert_eq!(out.service_class, SIF1_VOICE_CALL_SVC | SIF1_GRP_REG_SVC);
        assert_eq!(out.channel_id, 3);
        assert_eq!(out.channel_no, 17);
        assert_eq!(&out.callsign, b"W1AW    ");
        assert_eq!(out.superframe.bcch_cnt, 1);
        assert_eq!(out.superframe.ccch_paging_cnt, 2);
        assert_eq!(out.superframe.ccch_multi_cnt, 2);
        assert_eq!(out.superframe.rcch_iterate_cnt, 2);
    }

    #[test]
    fn test_srv_info_roundtrip() {
        let site = SiteData::new(42, 1, 1, SIF1_VOICE_CALL_SVC, false);
        let lc = RcchLc::srv_info(&site);

        let out = roundtrip(&lc);
        assert_eq!(out.message_type, MessageType::SrvInfo);
        assert_eq!(out.loc_id, 42);
        assert_eq!(out.service_class, SIF1_VOICE_CALL_SVC);
    }

    #[test]
    fn test_adj_site_roundtrip() {
        let mut lc = RcchLc::new(MessageType::AdjSiteInfo);
        lc.loc_id = 99;
        lc.channel_id = 7;
        lc.channel_no = 1023;
        lc.service_class = 0x13;

        let out = roundtrip(&lc);
        assert_eq!(out.channel_id, 7);
        assert_eq!(out.channel_no, 1023);
        assert_eq!(out.service_class, 0x13);
    }

    #[test]
    fn test_unknown_rejected() {
        let mut wire = [0u8; LC_LENGTH_BYTES];
        wire[0] = 0x2E;

        assert_eq!(
            RcchLc::decode(&wire).unwrap_err(),
            NxdnError::UnknownMessageType(0x2E)
        );
    }
}
