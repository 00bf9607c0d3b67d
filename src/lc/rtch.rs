//! Decode and encode the traffic channel (RTCH) link control messages.
//!
//! The message buffer persists across partial decodes so a layer-3 record can be
//! reassembled from SACCH superframe quarters before interpretation.

use crate::bits;
use crate::consts::{
    CIPHER_TYPE_NONE, DATA_RSP_CLASS_ACK, LC_LENGTH_BYTES, MI_LENGTH_BYTES,
    PACKET_INFO_LENGTH_BYTES,
};
use crate::error::{NxdnError, Result};
use crate::util::{slice_u16, split_u16};

/// Type of a traffic channel link control payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MessageType {
    /// Idle filler.
    Idle,
    /// Voice call.
    Vcall,
    /// Voice call initialization vector.
    VcallIv,
    /// Transmission release extension.
    TxRelEx,
    /// Transmission release.
    TxRel,
    /// Data call header.
    DcallHdr,
    /// Data call user data.
    DcallData,
    /// Data call acknowledgement.
    DcallAck,
    /// Header delay.
    HeadDly,
    /// Short data call request header.
    SdcallReqHdr,
    /// Short data call request user data.
    SdcallReqData,
    /// Short data call initialization vector.
    SdcallIv,
    /// Short data call response.
    SdcallResp,
}

impl MessageType {
    /// Try to parse an opcode from the given 6 bits.
    pub fn from_bits(bits: u8) -> Option<MessageType> {
        use self::MessageType::*;

        assert!(bits >> 6 == 0);

        match bits {
            0x01 => Some(Vcall),
            0x03 => Some(VcallIv),
            0x07 => Some(TxRelEx),
            0x08 => Some(TxRel),
            0x09 => Some(DcallHdr),
            0x0B => Some(DcallData),
            0x0C => Some(DcallAck),
            0x0F => Some(HeadDly),
            0x10 => Some(Idle),
            0x38 => Some(SdcallReqHdr),
            0x39 => Some(SdcallReqData),
            0x3A => Some(SdcallIv),
            0x3B => Some(SdcallResp),
            _ => None,
        }
    }

    /// Convert the opcode to its 6-bit code.
    pub fn to_bits(self) -> u8 {
        use self::MessageType::*;

        match self {
            Vcall => 0x01,
            VcallIv => 0x03,
            TxRelEx => 0x07,
            TxRel => 0x08,
            DcallHdr => 0x09,
            DcallData => 0x0B,
            DcallAck => 0x0C,
            HeadDly => 0x0F,
            Idle => 0x10,
            SdcallReqHdr => 0x38,
            SdcallReqData => 0x39,
            SdcallIv => 0x3A,
            SdcallResp => 0x3B,
        }
    }
}

/// Call type of a voice or data call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CallType {
    Broadcast,
    Conference,
    Unspecified,
    Individual,
    Interconnect,
    SpeedDial,
    /// Reserved code point.
    Other(u8),
}

impl CallType {
    /// Parse 3 bits into a call type.
    pub fn from_bits(bits: u8) -> CallType {
        use self::CallType::*;

        assert!(bits >> 3 == 0);

        match bits {
            0 => Broadcast,
            1 => Conference,
            2 => Unspecified,
            4 => Individual,
            6 => Interconnect,
            7 => SpeedDial,
            b => Other(b),
        }
    }

    /// Convert the call type to its 3-bit code.
    pub fn to_bits(self) -> u8 {
        use self::CallType::*;

        match self {
            Broadcast => 0,
            Conference => 1,
            Unspecified => 2,
            Individual => 4,
            Interconnect => 6,
            SpeedDial => 7,
            Other(b) => b,
        }
    }
}

/// Packet information attached to data call headers, and the response field of a data
/// call acknowledgement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketInfo {
    /// Delivery confirmation requested.
    pub delivery: bool,
    /// Selective retry supported.
    pub selective_retry: bool,
    /// Number of data blocks following the header.
    pub block_count: u8,
    /// Pad octets in the final block.
    pub pad_count: u8,
    /// First fragment of a sequence.
    pub start: bool,
    /// Circular fragment counting.
    pub circular: bool,
    /// Fragment count (9 bits.)
    pub fragment_count: u16,
    /// Response class of an acknowledgement.
    pub rsp_class: u8,
    /// Response type of an acknowledgement.
    pub rsp_type: u8,
}

impl Default for PacketInfo {
    fn default() -> PacketInfo {
        PacketInfo {
            delivery: false,
            selective_retry: false,
            block_count: 0,
            pad_count: 0,
            start: true,
            circular: false,
            fragment_count: 0,
            rsp_class: DATA_RSP_CLASS_ACK,
            rsp_type: 1,
        }
    }
}

impl PacketInfo {
    /// Decode the 3-byte header form.
    fn decode_header(data: &[u8]) -> PacketInfo {
        PacketInfo {
            delivery: data[0] & 0x80 == 0x80,
            selective_retry: data[0] & 0x20 == 0x20,
            block_count: data[0] & 0x0F,
            pad_count: data[1] >> 4 & 0x0F,
            start: data[1] & 0x08 == 0x08,
            circular: data[1] & 0x04 == 0x04,
            fragment_count: ((data[1] as u16 & 0x01) << 8) | data[2] as u16,
            ..PacketInfo::default()
        }
    }

    /// Encode the 3-byte header form.
    fn encode_header(&self, data: &mut [u8]) {
        data[..PACKET_INFO_LENGTH_BYTES].fill(0);

        data[0] = (self.delivery as u8) << 7
            | (self.selective_retry as u8) << 5
            | (self.block_count & 0x0F);
        data[1] = (self.pad_count & 0x0F) << 4
            | (self.start as u8) << 3
            | (self.circular as u8) << 2
            | (self.fragment_count >> 8 & 0x01) as u8;
        data[2] = self.fragment_count as u8;
    }

    /// Decode the 2-byte response form.
    fn decode_response(data: &[u8]) -> PacketInfo {
        PacketInfo {
            rsp_class: data[0] >> 4 & 0x03,
            rsp_type: data[0] >> 1 & 0x07,
            fragment_count: ((data[0] as u16 & 0x01) << 8) | data[1] as u16,
            ..PacketInfo::default()
        }
    }

    /// Encode the 2-byte response form.
    fn encode_response(&self, data: &mut [u8]) {
        data[0] = (self.rsp_class & 0x03) << 4
            | (self.rsp_type & 0x07) << 1
            | (self.fragment_count >> 8 & 0x01) as u8;
        data[1] = self.fragment_count as u8;
    }
}

/// Link control state of one traffic channel call.
#[derive(Clone, Debug)]
pub struct RtchLc {
    /// Raw layer-3 bits, persisted across partial decodes.
    buf: [u8; LC_LENGTH_BYTES],
    /// Message type.
    pub message_type: MessageType,
    /// Call type.
    pub call_type: CallType,
    /// Source unit.
    pub src_id: u16,
    /// Destination unit or talkgroup.
    pub dst_id: u16,
    /// Emergency flag.
    pub emergency: bool,
    /// Priority flag.
    pub priority: bool,
    /// Group call flag, derived from the call type.
    pub group: bool,
    /// Full duplex flag.
    pub duplex: bool,
    /// Transmission mode (4800/9600/9600-EFR.)
    pub transmission_mode: u8,
    /// Encryption flag, derived from the cipher fields.
    pub encrypted: bool,
    /// Cipher algorithm ID.
    pub alg_id: u8,
    /// Cipher key ID.
    pub key_id: u8,
    /// Message indicator of an encrypted call.
    pub mi: [u8; MI_LENGTH_BYTES],
    /// Packet information of a data call header.
    pub packet_info: PacketInfo,
    /// Response field of a data call acknowledgement.
    pub rsp: PacketInfo,
    /// Frame number of a data block.
    pub data_frame_number: u8,
    /// Block number of a data block.
    pub data_block_number: u8,
    /// Header delay count.
    pub delay_count: u16,
    /// Cause of a short data response.
    pub cause: u8,
}

impl Default for RtchLc {
    fn default() -> RtchLc {
        RtchLc {
            buf: [0; LC_LENGTH_BYTES],
            message_type: MessageType::Idle,
            call_type: CallType::Unspecified,
            src_id: 0,
            dst_id: 0,
            emergency: false,
            priority: false,
            group: true,
            duplex: false,
            transmission_mode: 0,
            encrypted: false,
            alg_id: CIPHER_TYPE_NONE,
            key_id: 0,
            mi: [0; MI_LENGTH_BYTES],
            packet_info: PacketInfo::default(),
            rsp: PacketInfo::default(),
            data_frame_number: 0,
            data_block_number: 0,
            delay_count: 0,
            cause: 0,
        }
    }
}

impl RtchLc {
    /// Create a new `RtchLc` in the reset state.
    pub fn new() -> RtchLc {
        RtchLc::default()
    }

    /// Reset all fields and the raw buffer to defaults.
    pub fn reset(&mut self) {
        *self = RtchLc::default();
    }

    /// Accumulate `nbits` of raw layer-3 data into the persistent buffer at the given
    /// bit offset, without interpreting it.
    pub fn decode_fragment(&mut self, src: &[u8], nbits: usize, offset: usize) {
        bits::copy_bits(&mut self.buf, offset, src, 0, nbits);
    }

    /// Opcode bits currently sitting in the accumulation buffer, readable before the
    /// full record has been reassembled.
    pub fn raw_message_type(&self) -> u8 {
        self.buf[0] & 0x3F
    }

    /// Decode a complete link control message from the head of `src`.
    pub fn decode(&mut self, src: &[u8], nbits: usize) -> Result<()> {
        self.decode_fragment(src, nbits, 0);
        self.interpret()
    }

    /// Decode a complete link control message from `src` starting at the given source
    /// bit offset.
    pub fn decode_at(&mut self, src: &[u8], nbits: usize, src_offset: usize) -> Result<()> {
        for i in 0..nbits {
            let b = bits::read_bit(src, src_offset + i);
            bits::write_bit(&mut self.buf, i, b);
        }

        self.interpret()
    }

    /// Interpret the accumulated buffer according to its message type.
    pub fn interpret(&mut self) -> Result<()> {
        use self::MessageType::*;

        let data = self.buf;

        let mtype = MessageType::from_bits(data[0] & 0x3F)
            .ok_or(NxdnError::UnknownMessageType(data[0] & 0x3F))?;
        self.message_type = mtype;

        match mtype {
            Vcall => {
                self.decode_call_options(&data);
                self.decode_addresses(&data);
                self.decode_cipher(&data);
            }
            VcallIv | SdcallIv => {
                if self.alg_id != CIPHER_TYPE_NONE && self.key_id > 0 {
                    self.mi.copy_from_slice(&data[1..1 + MI_LENGTH_BYTES]);
                }
            }
            TxRel | TxRelEx => {
                self.call_type = CallType::from_bits(data[2] >> 5 & 0x07);
                self.emergency = data[1] & 0x80 == 0x80;
                self.priority = data[1] & 0x20 == 0x20;
                self.decode_addresses(&data);
            }
            DcallHdr => {
                self.decode_call_options(&data);
                self.decode_addresses(&data);
                self.decode_cipher(&data);

                self.packet_info = PacketInfo::decode_header(&data[8..]);

                if self.alg_id != CIPHER_TYPE_NONE && self.key_id > 0 {
                    self.mi.copy_from_slice(&data[11..11 + MI_LENGTH_BYTES]);
                }
            }
            DcallData | SdcallReqData => {
                self.data_frame_number = data[1] >> 4 & 0x0F;
                self.data_block_number = data[1] & 0x0F;
            }
            DcallAck => {
                self.decode_call_options(&data);
                self.decode_addresses(&data);
                self.rsp = PacketInfo::decode_response(&data[7..]);
            }
            HeadDly => {
                self.call_type = CallType::from_bits(data[2] >> 5 & 0x07);
                self.emergency = data[1] & 0x80 == 0x80;
                self.priority = data[1] & 0x20 == 0x20;
                self.decode_addresses(&data);
                self.delay_count = slice_u16(&data[7..]);
            }
            SdcallReqHdr => {
                self.decode_call_options(&data);
                self.decode_addresses(&data);
                self.decode_cipher(&data);
                self.packet_info = PacketInfo::decode_header(&data[8..]);
            }
            SdcallResp => {
                self.decode_call_options(&data);
                self.decode_addresses(&data);
                self.cause = data[7];
            }
            Idle => {}
        }

        self.group = self.call_type != CallType::Individual;
        self.encrypted = self.alg_id != CIPHER_TYPE_NONE && self.key_id != 0;

        Ok(())
    }

    /// Serialize the fields and write `nbits` of the result into `dst` starting at the
    /// given bit offset.
    pub fn encode(&mut self, dst: &mut [u8], nbits: usize, offset: usize) {
        use self::MessageType::*;

        let mut data = [0u8; LC_LENGTH_BYTES];
        data[0] = self.message_type.to_bits();

        match self.message_type {
            Vcall => {
                self.encode_call_options(&mut data);
                self.encode_addresses(&mut data);
                self.encode_cipher(&mut data);
            }
            VcallIv | SdcallIv => {
                if self.alg_id != CIPHER_TYPE_NONE && self.key_id > 0 {
                    data[1..1 + MI_LENGTH_BYTES].copy_from_slice(&self.mi);
                }
            }
            TxRel | TxRelEx => {
                data[1] = (self.emergency as u8) << 7 | (self.priority as u8) << 5;
                data[2] = self.call_type.to_bits() << 5;
                self.encode_addresses(&mut data);
            }
            DcallHdr => {
                self.encode_call_options(&mut data);
                self.encode_addresses(&mut data);
                self.encode_cipher(&mut data);

                self.packet_info.encode_header(&mut data[8..]);

                if self.alg_id != CIPHER_TYPE_NONE && self.key_id > 0 {
                    data[11..11 + MI_LENGTH_BYTES].copy_from_slice(&self.mi);
                }
            }
            DcallData | SdcallReqData => {
                data[1] = (self.data_frame_number & 0x0F) << 4 | (self.data_block_number & 0x0F);
            }
            DcallAck => {
                self.encode_call_options(&mut data);
                self.encode_addresses(&mut data);
                self.rsp.encode_response(&mut data[7..]);
            }
            HeadDly => {
                data[1] = (self.emergency as u8) << 7 | (self.priority as u8) << 5;
                data[2] = self.call_type.to_bits() << 5;
                self.encode_addresses(&mut data);
                split_u16(self.delay_count, &mut data[7..]);
            }
            SdcallReqHdr => {
                self.encode_call_options(&mut data);
                self.encode_addresses(&mut data);
                self.encode_cipher(&mut data);
                self.packet_info.encode_header(&mut data[8..]);
            }
            SdcallResp => {
                self.encode_call_options(&mut data);
                self.encode_addresses(&mut data);
                data[7] = self.cause;
            }
            Idle => {}
        }

        self.buf = data;
        bits::copy_bits(dst, offset, &data, 0, nbits);
    }

    fn decode_call_options(&mut self, data: &[u8]) {
        self.call_type = CallType::from_bits(data[2] >> 5 & 0x07);
        self.emergency = data[1] & 0x80 == 0x80;
        self.priority = data[1] & 0x20 == 0x20;
        self.duplex = data[2] & 0x10 == 0x10;
        self.transmission_mode = data[2] & 0x07;
    }

    fn encode_call_options(&self, data: &mut [u8]) {
        data[1] = (self.emergency as u8) << 7 | (self.priority as u8) << 5;
        data[2] = self.call_type.to_bits() << 5
            | (self.duplex as u8) << 4
            | (self.transmission_mode & 0x07);
    }

    fn decode_addresses(&mut self, data: &[u8]) {
        self.src_id = slice_u16(&data[3..]);
        self.dst_id = slice_u16(&data[5..]);
    }

    fn encode_addresses(&self, data: &mut [u8]) {
        split_u16(self.src_id, &mut data[3..]);
        split_u16(self.dst_id, &mut data[5..]);
    }

    fn decode_cipher(&mut self, data: &[u8]) {
        self.alg_id = data[7] >> 6 & 0x03;
        self.key_id = data[7] & 0x3F;
    }

    fn encode_cipher(&self, data: &mut [u8]) {
        data[7] = (self.alg_id & 0x03) << 6 | (self.key_id & 0x3F);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(lc: &mut RtchLc) -> RtchLc {
        let mut wire = [0u8; LC_LENGTH_BYTES];
        lc.encode(&mut wire, LC_LENGTH_BYTES * 8, 0);

        let mut out = RtchLc::new();
        out.decode(&wire, LC_LENGTH_BYTES * 8).unwrap();
        out
    }

    #[test]
    fn test_vcall_roundtrip() {
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::Vcall;
        lc.call_type = CallType::Conference;
        lc.src_id = 100;
        lc.dst_id = 7000;
        lc.emergency = true;
        lc.priority = true;
        lc.duplex = true;
        lc.transmission_mode = 2;
        lc.alg_id = 1;
        lc.key_id = 0x2A;

        let out = roundtrip(&mut lc);

        assert_eq!(out.message_type, MessageType::Vcall);
        assert_eq!(out.call_type, CallType::Conference);
        assert_eq!(out.src_id, 100);
        assert_eq!(out.dst_id, 7000);
        assert!(out.emergency);
        assert!(out.priority);
        assert!(out.duplex);
        assert_eq!(out.transmission_mode, 2);
        assert_eq!(out.alg_id, 1);
        assert_eq!(out.key_id, 0x2A);
        assert!(out.encrypted);
        assert!(out.group);
    }

    #[test]
    fn test_group_derivation() {
        for (ct, group) in [
            (CallType::Broadcast, true),
            (CallType::Conference, true),
            (CallType::Unspecified, true),
            (CallType::Individual, false),
            (CallType::Interconnect, true),
            (CallType::SpeedDial, true),
        ] {
            let mut lc = RtchLc::new();
            lc.message_type = MessageType::Vcall;
            lc.call_type = ct;
            lc.src_id = 1;
            lc.dst_id = 2;

            assert_eq!(roundtrip(&mut lc).group, group);
        }
    }

    #[test]
    fn test_encryption_derivation() {
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::Vcall;
        lc.alg_id = CIPHER_TYPE_NONE;
        lc.key_id = 5;
        assert!(!roundtrip(&mut lc).encrypted);

        lc.alg_id = 2;
        lc.key_id = 0;
        assert!(!roundtrip(&mut lc).encrypted);

        lc.key_id = 5;
        assert!(roundtrip(&mut lc).encrypted);
    }

    #[test]
    fn test_iv_requires_cipher() {
        // A clear call's IV message must leave the MI untouched.
        let mut enc = RtchLc::new();
        enc.message_type = MessageType::VcallIv;
        enc.alg_id = 2;
        enc.key_id = 1;
        enc.mi = [1, 2, 3, 4, 5, 6, 7, 8];

        let mut wire = [0u8; LC_LENGTH_BYTES];
        enc.encode(&mut wire, LC_LENGTH_BYTES * 8, 0);

        let mut clear = RtchLc::new();
        clear.decode(&wire, LC_LENGTH_BYTES * 8).unwrap();
        assert_eq!(clear.mi, [0; 8]);

        // The same frame against an encrypted call context captures the MI.
        let mut cipher = RtchLc::new();
        cipher.alg_id = 2;
        cipher.key_id = 1;
        cipher.decode(&wire, LC_LENGTH_BYTES * 8).unwrap();
        assert_eq!(cipher.mi, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_tx_rel_roundtrip() {
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::TxRel;
        lc.call_type = CallType::Individual;
        lc.src_id = 0xDEAD;
        lc.dst_id = 0xBEEF;
        lc.emergency = true;

        let out = roundtrip(&mut lc);
        assert_eq!(out.message_type, MessageType::TxRel);
        assert_eq!(out.src_id, 0xDEAD);
        assert_eq!(out.dst_id, 0xBEEF);
        assert!(out.emergency);
        assert!(!out.group);
    }

    #[test]
    fn test_dcall_hdr_roundtrip() {
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::DcallHdr;
        lc.call_type = CallType::Individual;
        lc.src_id = 3;
        lc.dst_id = 4;
        lc.transmission_mode = 2;
        lc.alg_id = 3;
        lc.key_id = 9;
        lc.mi = [9, 8, 7, 6, 5, 4, 3, 2];
        lc.packet_info.delivery = true;
        lc.packet_info.block_count = 5;
        lc.packet_info.pad_count = 3;
        lc.packet_info.start = true;
        lc.packet_info.circular = true;
        lc.packet_info.fragment_count = 0x17F;

        let out = roundtrip(&mut lc);

        assert_eq!(out.message_type, MessageType::DcallHdr);
        assert_eq!(out.mi, [9, 8, 7, 6, 5, 4, 3, 2]);
        assert!(out.packet_info.delivery);
        assert_eq!(out.packet_info.block_count, 5);
        assert_eq!(out.packet_info.pad_count, 3);
        assert!(out.packet_info.start);
        assert!(out.packet_info.circular);
        assert_eq!(out.packet_info.fragment_count, 0x17F);
    }

    #[test]
    fn test_dcall_data_precedence() {
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::DcallData;
        lc.data_frame_number = 0x0D;
        lc.data_block_number = 0x06;

        let mut wire = [0u8; LC_LENGTH_BYTES];
        lc.encode(&mut wire, LC_LENGTH_BYTES * 8, 0);

        // Frame number in the high nibble, block number in the low nibble.
        assert_eq!(wire[1], 0xD6);

        let out = roundtrip(&mut lc);
        assert_eq!(out.data_frame_number, 0x0D);
        assert_eq!(out.data_block_number, 0x06);
    }

    #[test]
    fn test_dcall_ack_roundtrip() {
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::DcallAck;
        lc.src_id = 11;
        lc.dst_id = 12;
        lc.rsp.rsp_class = DATA_RSP_CLASS_ACK;
        lc.rsp.rsp_type = 5;
        lc.rsp.fragment_count = 0x101;

        let out = roundtrip(&mut lc);
        assert_eq!(out.rsp.rsp_class, DATA_RSP_CLASS_ACK);
        assert_eq!(out.rsp.rsp_type, 5);
        assert_eq!(out.rsp.fragment_count, 0x101);
    }

    #[test]
    fn test_head_dly_roundtrip() {
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::HeadDly;
        lc.src_id = 21;
        lc.dst_id = 22;
        lc.delay_count = 0x1234;

        assert_eq!(roundtrip(&mut lc).delay_count, 0x1234);
    }

    #[test]
    fn test_sdcall_resp_roundtrip() {
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::SdcallResp;
        lc.src_id = 31;
        lc.dst_id = 32;
        lc.cause = 0x06;

        assert_eq!(roundtrip(&mut lc).cause, 0x06);
    }

    #[test]
    fn test_unknown_rejected() {
        let mut wire = [0u8; LC_LENGTH_BYTES];
        wire[0] = 0x2F;

        let mut lc = RtchLc::new();
        assert_eq!(
            lc.decode(&wire, LC_LENGTH_BYTES * 8),
            Err(NxdnError::UnknownMessageType(0x2F))
        );
    }

    #[test]
    fn test_fragment_reassembly() {
        // Encode a VCALL, then feed its 72 bits back in 18-bit quarters.
        let mut lc = RtchLc::new();
        lc.message_type = MessageType::Vcall;
        lc.call_type = CallType::Conference;
        lc.src_id = 100;
        lc.dst_id = 7000;

        let mut wire = [0u8; LC_LENGTH_BYTES];
        lc.encode(&mut wire, LC_LENGTH_BYTES * 8, 0);

        let mut out = RtchLc::new();
        for quarter in 0..4 {
            let mut frag = [0u8; 3];
            bits::copy_bits(&mut frag, 0, &wire, quarter * 18, 18);
            out.decode_fragment(&frag, 18, quarter * 18);
        }
        out.interpret().unwrap();

        assert_eq!(out.message_type, MessageType::Vcall);
        assert_eq!(out.src_id, 100);
        assert_eq!(out.dst_id, 7000);
    }
}
