//! Decode and encode the Fast Associated Control Channel (FACCH1), the 144-bit
//! codeword that replaces half of a voice superblock when signalling is stolen.
//!
//! The codeword carries an 80-bit link control payload closed by a 12-bit CRC,
//! convolutionally encoded with 4 tail bits to 192 bits, punctured to 144, and bit
//! interleaved. A frame carries up to two slots: the first directly after the SACCH
//! and the second one codeword later.

use collect_slice::CollectSlice;

use crate::bits;
use crate::coding::{conv, crc::Crc12};
use crate::consts::FACCH1_LC_BITS;
use crate::error::{NxdnError, Result};

/// Information bits in one FACCH1 codeword.
const INFO_BITS: usize = FACCH1_LC_BITS;
/// Information plus CRC bits.
const CHECKED_BITS: usize = INFO_BITS + 12;
/// Coded bits before puncturing.
const CODED_BITS: usize = 2 * (CHECKED_BITS + conv::TAIL_BITS);

/// Air position within the FACCH1 of punctured-stream bit `i`.
fn interleave(i: usize) -> usize {
    i % 16 * 9 + i / 16
}

/// Whether coded bit `i` is punctured (not transmitted.)
fn punctured(i: usize) -> bool {
    i % 4 == 1
}

/// One fast associated control channel codeword.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Facch1 {
    /// 10-byte link control payload.
    pub data: [u8; 10],
}

impl Facch1 {
    /// Create a new `Facch1` carrying the given payload.
    pub fn new(data: [u8; 10]) -> Facch1 {
        Facch1 { data }
    }

    /// Decode a FACCH1 slot starting at the given frame bit offset, correcting errors
    /// and verifying the CRC.
    pub fn decode(frame: &[u8], offset: usize) -> Result<Facch1> {
        let mut received = [None; CODED_BITS];

        let mut air = 0;
        for (i, slot) in received.iter_mut().enumerate() {
            if punctured(i) {
                continue;
            }

            let pos = offset + interleave(air);
            *slot = Some(bits::read_bit(frame, pos));
            air += 1;
        }

        let mut pairs = [(None, None); CODED_BITS / 2];
        received
            .chunks(2)
            .map(|c| (c[0], c[1]))
            .collect_slice(&mut pairs[..]);

        let mut decoded = [0u8; (CHECKED_BITS + conv::TAIL_BITS + 7) / 8];
        conv::decode(&pairs, &mut decoded);

        let mut crc = Crc12::new();
        for i in 0..INFO_BITS {
            crc.feed_bit(bits::read_bit(&decoded, i));
        }

        let mut received_crc = 0u64;
        for i in INFO_BITS..CHECKED_BITS {
            received_crc = received_crc << 1 | bits::read_bit(&decoded, i) as u64;
        }

        if crc.finish() != received_crc {
            return Err(NxdnError::CrcMismatch);
        }

        let mut data = [0u8; 10];
        data.copy_from_slice(&decoded[..10]);

        Ok(Facch1 { data })
    }

    /// Encode the FACCH1 into a frame slot starting at the given bit offset.
    pub fn encode(&self, frame: &mut [u8], offset: usize) {
        let mut info = [0u8; (CHECKED_BITS + 7) / 8];
        info[..10].copy_from_slice(&self.data);

        let mut crc = Crc12::new();
        for i in 0..INFO_BITS {
            crc.feed_bit(bits::read_bit(&info, i));
        }

        let word = crc.finish();
        for i in 0..12 {
            bits::write_bit(&mut info, INFO_BITS + i, word >> (11 - i) & 1 == 1);
        }

        let mut coded = [0u8; (CODED_BITS + 7) / 8];
        conv::encode(&info, CHECKED_BITS, &mut coded);

        let mut air = 0;
        for i in 0..CODED_BITS {
            if punctured(i) {
                continue;
            }

            let pos = offset + interleave(air);
            bits::write_bit(frame, pos, bits::read_bit(&coded, i));
            air += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consts::{FACCH1_LENGTH_BITS, FACCH1_OFFSET_BITS};

    #[test]
    fn test_interleave_bijective() {
        let mut seen = [false; FACCH1_LENGTH_BITS];
        for i in 0..FACCH1_LENGTH_BITS {
            let pos = interleave(i);
            assert!(!seen[pos]);
            seen[pos] = true;
        }
    }

    #[test]
    fn test_puncture_count() {
        let count = (0..CODED_BITS).filter(|&i| punctured(i)).count();
        assert_eq!(CODED_BITS - count, FACCH1_LENGTH_BITS);
    }

    #[test]
    fn test_roundtrip_both_slots() {
        let mut frame = [0u8; 48];

        let first = Facch1::new([0x01, 0x80, 0x20, 0x03, 0xE8, 0x1B, 0x58, 0x00, 0x00, 0x00]);
        let second = Facch1::new([0x08, 0x00, 0x20, 0x03, 0xE8, 0x1B, 0x58, 0x00, 0x00, 0x00]);

        first.encode(&mut frame, FACCH1_OFFSET_BITS);
        second.encode(&mut frame, FACCH1_OFFSET_BITS + FACCH1_LENGTH_BITS);

        assert_eq!(Facch1::decode(&frame, FACCH1_OFFSET_BITS).unwrap(), first);
        assert_eq!(
            Facch1::decode(&frame, FACCH1_OFFSET_BITS + FACCH1_LENGTH_BITS).unwrap(),
            second
        );
    }

    #[test]
    fn test_corrects_errors() {
        let mut frame = [0u8; 48];

        let facch = Facch1::new([0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]);
        facch.encode(&mut frame, FACCH1_OFFSET_BITS);

        let idx = FACCH1_OFFSET_BITS + 40;
        let b = bits::read_bit(&frame, idx);
        bits::write_bit(&mut frame, idx, !b);

        assert_eq!(Facch1::decode(&frame, FACCH1_OFFSET_BITS).unwrap(), facch);
    }

    #[test]
    fn test_bad_crc_rejected() {
        // Encode by hand with a corrupted CRC field.
        let mut info = [0u8; (CHECKED_BITS + 7) / 8];
        info[0] = 0x08;

        let mut crc = Crc12::new();
        for i in 0..INFO_BITS {
            crc.feed_bit(bits::read_bit(&info, i));
        }

        let word = crc.finish() ^ 0x800;
        for i in 0..12 {
            bits::write_bit(&mut info, INFO_BITS + i, word >> (11 - i) & 1 == 1);
        }

        let mut coded = [0u8; (CODED_BITS + 7) / 8];
        conv::encode(&info, CHECKED_BITS, &mut coded);

        let mut frame = [0u8; 48];
        let mut air = 0;
        for i in 0..CODED_BITS {
            if punctured(i) {
                continue;
            }

            let pos = FACCH1_OFFSET_BITS + interleave(air);
            bits::write_bit(&mut frame, pos, bits::read_bit(&coded, i));
            air += 1;
        }

        assert_eq!(
            Facch1::decode(&frame, FACCH1_OFFSET_BITS),
            Err(NxdnError::CrcMismatch)
        );
    }
}
