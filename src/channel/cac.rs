//! Decode and encode the Common Access Channel (CAC), the body of a control channel
//! frame. The CAC carries a one-byte header (structure code and RAN), a 22-byte
//! layer-3 payload, and a 16-bit CRC, followed by the fixed post field at the frame
//! tail.

use crate::bits;
use crate::coding::crc::Crc16;
use crate::consts::{
    CAC_LC_BITS, FSW_LENGTH_BITS, LC_LENGTH_BYTES, LICH_LENGTH_BITS, POST_FIELD_BITS,
    POST_FIELD_BYTES, POST_FIELD_OFFSET_BITS, SR_RCCH_SINGLE,
};
use crate::error::{NxdnError, Result};

/// Bit offset of the CAC within a frame.
const CAC_OFFSET_BITS: usize = FSW_LENGTH_BITS + LICH_LENGTH_BITS;

/// Header bits preceding the payload.
const HEADER_BITS: usize = 8;

/// One common access channel message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Cac {
    /// Radio Access Number, 0 to 63 with 0 as the wildcard.
    pub ran: u8,
    /// Structure code.
    pub structure: u8,
    /// Layer-3 RCCH payload.
    pub data: [u8; LC_LENGTH_BYTES],
}

impl Default for Cac {
    fn default() -> Cac {
        Cac {
            ran: 0,
            structure: SR_RCCH_SINGLE,
            data: [0; LC_LENGTH_BYTES],
        }
    }
}

impl Cac {
    /// Create a new `Cac` with the given RAN, structure code, and payload.
    pub fn new(ran: u8, structure: u8, data: [u8; LC_LENGTH_BYTES]) -> Cac {
        assert!(ran >> 6 == 0);
        assert!(structure >> 2 == 0);

        Cac {
            ran,
            structure,
            data,
        }
    }

    /// Decode the CAC from a frame, verifying the CRC.
    pub fn decode(frame: &[u8]) -> Result<Cac> {
        let mut header = [0u8; 1];
        bits::copy_bits(&mut header, 0, frame, CAC_OFFSET_BITS, HEADER_BITS);

        let mut data = [0u8; LC_LENGTH_BYTES];
        bits::copy_bits(&mut data, 0, frame, CAC_OFFSET_BITS + HEADER_BITS, CAC_LC_BITS);

        let mut received_crc = 0u64;
        let crc_off = CAC_OFFSET_BITS + HEADER_BITS + CAC_LC_BITS;
        for i in 0..16 {
            received_crc = received_crc << 1 | bits::read_bit(frame, crc_off + i) as u64;
        }

        let calculated = Crc16::new()
            .feed_bits(header[0], 8)
            .feed_bytes(data.iter().cloned())
            .finish();

        if calculated != received_crc {
            return Err(NxdnError::CrcMismatch);
        }

        Ok(Cac {
            ran: header[0] & 0x3F,
            structure: header[0] >> 6,
            data,
        })
    }

    /// Encode the CAC into a frame, appending the CRC.
    pub fn encode(&self, frame: &mut [u8]) {
        let header = [(self.structure & 0x03) << 6 | (self.ran & 0x3F)];

        bits::copy_bits(frame, CAC_OFFSET_BITS, &header, 0, HEADER_BITS);
        bits::copy_bits(frame, CAC_OFFSET_BITS + HEADER_BITS, &self.data, 0, CAC_LC_BITS);

        let crc = Crc16::new()
            .feed_bits(header[0], 8)
            .feed_bytes(self.data.iter().cloned())
            .finish();

        let crc_off = CAC_OFFSET_BITS + HEADER_BITS + CAC_LC_BITS;
        for i in 0..16 {
            bits::write_bit(frame, crc_off + i, crc >> (15 - i) & 1 == 1);
        }
    }
}

/// Write the fixed preamble pattern into the 20-bit post field at the frame tail.
pub fn add_post_bits(frame: &mut [u8]) {
    for i in 0..POST_FIELD_BITS {
        let b = bits::read_bit(&POST_FIELD_BYTES, i);
        bits::write_bit(frame, POST_FIELD_OFFSET_BITS + i, b);
    }
}
