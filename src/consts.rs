//! Frame geometry, channel codes, message types, and cause values for the NXDN air
//! interface.

/// Bits in one air frame.
pub const FRAME_LENGTH_BITS: usize = 384;
/// Bytes in one air frame.
pub const FRAME_LENGTH_BYTES: usize = FRAME_LENGTH_BITS / 8;

/// Bits in the frame sync word.
pub const FSW_LENGTH_BITS: usize = 20;
/// Frame sync word signature bytes.
pub const FSW_BYTES: [u8; 3] = [0xCD, 0xF5, 0x90];
/// Mask selecting the 20 signature bits within [`FSW_BYTES`].
pub const FSW_BYTES_MASK: [u8; 3] = [0xFF, 0xFF, 0xF0];

/// Bits in the link information channel (air side, after doubling.)
pub const LICH_LENGTH_BITS: usize = 16;

/// Bits in the slow associated control channel (air side, FEC included.)
pub const SACCH_LENGTH_BITS: usize = 60;
/// Bits in one fast associated control channel codeword (air side, FEC included.)
pub const FACCH1_LENGTH_BITS: usize = 144;

/// Bit offset of the SACCH within a frame.
pub const SACCH_OFFSET_BITS: usize = FSW_LENGTH_BITS + LICH_LENGTH_BITS;
/// Bit offset of the first FACCH1 slot (and the voice superblock) within a frame.
pub const FACCH1_OFFSET_BITS: usize = SACCH_OFFSET_BITS + SACCH_LENGTH_BITS;
/// Byte offset of the voice superblock within a frame.
pub const SUPERBLOCK_OFFSET_BYTES: usize = FACCH1_OFFSET_BITS / 8;

/// Bit offset of the 20-bit post field at the tail of a CAC frame.
pub const POST_FIELD_OFFSET_BITS: usize = FRAME_LENGTH_BITS - POST_FIELD_BITS;
/// Bits in the post field.
pub const POST_FIELD_BITS: usize = 20;
/// Preamble pattern carried by the post field.
pub const POST_FIELD_BYTES: [u8; 3] = [0x57, 0x75, 0xF0];

/// Metadata bytes prepended to every frame exchanged with the modem.
pub const FRAME_META_BYTES: usize = 2;

/// Modem tag for a normal data frame.
pub const TAG_DATA: u8 = 0x00;
/// Modem tag for an end-of-transmission frame.
pub const TAG_EOT: u8 = 0x01;
/// Modem tag for a lost carrier.
pub const TAG_LOST: u8 = 0x02;

/// Functional channel type carried by a control channel frame: outbound CAC.
pub const LICH_CAC_OUTBOUND: u8 = 0;
/// Functional channel type: inbound short CAC.
pub const LICH_CAC_INBOUND_SHORT: u8 = 1;
/// Functional channel type: inbound long CAC.
pub const LICH_CAC_INBOUND_LONG: u8 = 2;

/// Functional channel type carried by a traffic channel frame: non-superblock SACCH.
pub const LICH_USC_SACCH_NS: u8 = 0;
/// Functional channel type: user data channel.
pub const LICH_USC_UDCH: u8 = 1;
/// Functional channel type: superblock SACCH.
pub const LICH_USC_SACCH_SS: u8 = 2;
/// Functional channel type: idle superblock SACCH.
pub const LICH_USC_SACCH_SS_IDLE: u8 = 3;

/// Steal option: no slots stolen, all audio.
pub const LICH_STEAL_NONE: u8 = 3;
/// Steal option: second FACCH1 slot stolen.
pub const LICH_STEAL_FACCH1_2: u8 = 2;
/// Steal option: first FACCH1 slot stolen.
pub const LICH_STEAL_FACCH1_1: u8 = 1;
/// Steal option: both slots stolen.
pub const LICH_STEAL_FACCH: u8 = 0;

/// Data option on control channel frames: normal.
pub const LICH_DATA_NORMAL: u8 = 0;
/// Data option on control channel frames: idle.
pub const LICH_DATA_IDLE: u8 = 1;
/// Data option on control channel frames: common.
pub const LICH_DATA_COMMON: u8 = 2;

/// SACCH structure: single (non-superframe) message.
pub const SR_SINGLE: u8 = 0;
/// SACCH structure: fourth quarter of a superframe.
pub const SR_4_4: u8 = 0;
/// SACCH structure: third quarter of a superframe.
pub const SR_3_4: u8 = 1;
/// SACCH structure: second quarter of a superframe.
pub const SR_2_4: u8 = 2;
/// SACCH structure: first quarter of a superframe.
pub const SR_1_4: u8 = 3;

/// CAC structure: single RCCH message.
pub const SR_RCCH_SINGLE: u8 = 0;
/// CAC structure: superframe head carrying a single RCCH message.
pub const SR_RCCH_HEAD_SINGLE: u8 = 1;

/// SACCH payload of an idle frame.
pub const SACCH_IDLE: [u8; 3] = [0x10, 0x00, 0x00];

/// Bytes in a raw layer-3 link control buffer.
pub const LC_LENGTH_BYTES: usize = 22;
/// Bits of link control carried by one FACCH1 codeword.
pub const FACCH1_LC_BITS: usize = 80;
/// Bits of link control carried by a full CAC.
pub const CAC_LC_BITS: usize = LC_LENGTH_BYTES * 8;
/// Bits of layer-3 payload carried by each SACCH superframe quarter.
pub const SACCH_FRAGMENT_BITS: usize = 18;

/// Bytes in a message indicator.
pub const MI_LENGTH_BYTES: usize = 8;
/// Bytes in a packet information field.
pub const PACKET_INFO_LENGTH_BYTES: usize = 3;

/// Cipher type of an unencrypted call.
pub const CIPHER_TYPE_NONE: u8 = 0x00;

/// Default audio error count above which a superblock is silenced.
pub const DEFAULT_SILENCE_THRESHOLD: u32 = 14;
/// Maximum accepted audio error count per superblock.
pub const MAX_VOICE_ERRORS: u32 = 144;

/// Bytes in one AMBE voice subframe.
pub const AMBE_SUBFRAME_BYTES: usize = 9;
/// Silence pattern substituted for an unrecoverable voice subframe.
pub const NULL_AMBE: [u8; 9] = [0xF0, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Bytes in a site callsign.
pub const CALLSIGN_LENGTH_BYTES: usize = 8;

/// Location ID category: global.
pub const LOC_CAT_GLOBAL: u8 = 0;
/// Location ID category: local.
pub const LOC_CAT_LOCAL: u8 = 1;
/// Location ID category: regional.
pub const LOC_CAT_REGIONAL: u8 = 2;

/// Service information: data call service available.
pub const SIF1_DATA_CALL_SVC: u8 = 0x01;
/// Service information: voice call service available.
pub const SIF1_VOICE_CALL_SVC: u8 = 0x02;
/// Service information: control channel shares a payload channel.
pub const SIF1_COMPOSITE_CONTROL: u8 = 0x04;
/// Service information: authentication service available.
pub const SIF1_AUTH_SVC: u8 = 0x08;
/// Service information: group registration service available.
pub const SIF1_GRP_REG_SVC: u8 = 0x10;
/// Service information: location registration service available.
pub const SIF1_LOC_REG_SVC: u8 = 0x20;

/// Cause: requested resource is not available.
pub const CAUSE_RESOURCE_NOT_AVAIL: u8 = 0x05;
/// Cause: requested service is unavailable.
pub const CAUSE_SVC_UNAVAILABLE: u8 = 0x06;
/// Cause: procedure error.
pub const CAUSE_PROC_ERROR: u8 = 0x07;

/// Mobility management cause: registration accepted.
pub const CAUSE_MM_REG_ACCEPTED: u8 = 0x01;
/// Mobility management cause: location accepted, group registration failed.
pub const CAUSE_MM_LOC_ACPT_GRP_FAIL: u8 = 0x04;
/// Mobility management cause: location accepted, group registration refused.
pub const CAUSE_MM_LOC_ACPT_GRP_REFUSE: u8 = 0x05;
/// Mobility management cause: registration failed.
pub const CAUSE_MM_REG_FAILED: u8 = 0x06;
/// Mobility management cause: registration refused.
pub const CAUSE_MM_REG_REFUSED: u8 = 0x08;

/// Voice/data cause: call accepted.
pub const CAUSE_VD_ACCEPTED: u8 = 0x10;
/// Voice/data cause: requesting unit is not permitted.
pub const CAUSE_VD_REQ_UNIT_NOT_PERM: u8 = 0x12;
/// Voice/data cause: target unit or talkgroup is not permitted.
pub const CAUSE_VD_TGT_UNIT_NOT_PERM: u8 = 0x13;
/// Voice/data cause: requesting unit is not registered.
pub const CAUSE_VD_REQ_UNIT_NOT_REG: u8 = 0x1A;
/// Voice/data cause: queued, no channel resource available.
pub const CAUSE_VD_QUE_CHN_RESOURCE_NOT_AVAIL: u8 = 0x30;
/// Voice/data cause: queued, group busy.
pub const CAUSE_VD_QUE_GRP_BUSY: u8 = 0x38;

/// Data response class: acknowledge.
pub const DATA_RSP_CLASS_ACK: u8 = 0x00;
/// Data response class: acknowledge with selective retry.
pub const DATA_RSP_CLASS_ACK_S: u8 = 0x01;
/// Data response class: negative acknowledge.
pub const DATA_RSP_CLASS_NACK: u8 = 0x03;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validate_geometry() {
        // Two FACCH1 slots exactly fill the payload region.
        assert_eq!(FACCH1_OFFSET_BITS + 2 * FACCH1_LENGTH_BITS, FRAME_LENGTH_BITS);
        // Four audio subframes exactly fill the payload region.
        assert_eq!(
            SUPERBLOCK_OFFSET_BYTES + 4 * AMBE_SUBFRAME_BYTES,
            FRAME_LENGTH_BYTES
        );
    }
}
