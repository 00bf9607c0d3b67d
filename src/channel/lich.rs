//! Decode and encode the Link Information Channel (LICH), the one-byte header that
//! classifies every frame.

use crate::bits;
use crate::consts::FSW_LENGTH_BITS;
use crate::error::{NxdnError, Result};

/// RF channel type carried in the LICH.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RfChannelType {
    /// Control channel.
    Rcch,
    /// Traffic channel.
    Rtch,
    /// Data channel.
    Rdch,
    /// Composite traffic/control channel.
    RtchC,
}

impl RfChannelType {
    /// Parse 2 bits into an RF channel type.
    pub fn from_bits(bits: u8) -> RfChannelType {
        use self::RfChannelType::*;

        assert!(bits >> 2 == 0);

        match bits {
            0 => Rcch,
            1 => Rtch,
            2 => Rdch,
            3 => RtchC,
            _ => unreachable!(),
        }
    }

    /// Convert the RF channel type to its 2-bit code.
    pub fn to_bits(self) -> u8 {
        use self::RfChannelType::*;

        match self {
            Rcch => 0,
            Rtch => 1,
            Rdch => 2,
            RtchC => 3,
        }
    }
}

/// Link information channel of one frame.
///
/// The functional channel type and option fields are interpreted against the RF
/// channel type by the dispatch layer, so they stay raw here.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Lich {
    /// RF channel type.
    pub rfct: RfChannelType,
    /// Functional channel type (2 bits.)
    pub fct: u8,
    /// Channel option / steal field (2 bits.)
    pub option: u8,
    /// Direction: true for outbound (site to subscriber.)
    pub outbound: bool,
}

impl Default for Lich {
    fn default() -> Lich {
        Lich {
            rfct: RfChannelType::Rcch,
            fct: 0,
            option: 0,
            outbound: true,
        }
    }
}

impl Lich {
    /// Create a new `Lich` from the given fields.
    pub fn new(rfct: RfChannelType, fct: u8, option: u8, outbound: bool) -> Lich {
        assert!(fct >> 2 == 0);
        assert!(option >> 2 == 0);

        Lich {
            rfct,
            fct,
            option,
            outbound,
        }
    }

    /// Decode the LICH from a frame, verifying its parity. The air form carries each
    /// info bit followed by a companion bit which is ignored on receive.
    pub fn decode(frame: &[u8]) -> Result<Lich> {
        let mut info = [0u8; 1];

        let mut offset = FSW_LENGTH_BITS;
        for i in 0..8 {
            let b = bits::read_bit(frame, offset);
            bits::write_bit(&mut info, i, b);
            offset += 2;
        }

        let lich = info[0];

        let recomputed = parity(lich);
        let received = lich & 0x01 == 0x01;

        if received != recomputed {
            return Err(NxdnError::InvalidParity);
        }

        Ok(Lich {
            rfct: RfChannelType::from_bits(lich >> 6 & 0x03),
            fct: lich >> 4 & 0x03,
            option: lich >> 2 & 0x03,
            outbound: lich >> 1 & 0x01 == 0x01,
        })
    }

    /// Pack the info byte, recomputing parity.
    pub fn to_byte(&self) -> u8 {
        let mut lich = self.rfct.to_bits() << 6;
        lich |= (self.fct & 0x03) << 4;
        lich |= (self.option & 0x03) << 2;
        lich |= (self.outbound as u8) << 1;

        if parity(lich) {
            lich |= 0x01;
        }

        lich
    }

    /// Encode the LICH into a frame, emitting each info bit followed by a fixed `1`
    /// companion bit.
    pub fn encode(&self, frame: &mut [u8]) {
        let info = [self.to_byte()];

        let mut offset = FSW_LENGTH_BITS;
        for i in 0..8 {
            let b = bits::read_bit(&info, i);
            bits::write_bit(frame, offset, b);
            offset += 1;
            bits::write_bit(frame, offset, true);
            offset += 1;
        }
    }
}

/// Parity of a LICH info byte: set exactly when the upper nibble is 0x8 or 0xB.
fn parity(lich: u8) -> bool {
    matches!(lich & 0xF0, 0x80 | 0xB0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parity_rule() {
        assert!(parity(0x80));
        assert!(parity(0xB0));
        assert!(parity(0x8F));
        assert!(!parity(0x90));
        assert!(!parity(0xA0));
        assert!(!parity(0x00));
        assert!(!parity(0xC0));
    }

    #[test]
    fn test_roundtrip() {
        let mut frame = [0u8; 48];

        for rfct_bits in 0..4u8 {
            for fct in 0..4u8 {
                for option in 0..4u8 {
                    for outbound in [false, true] {
                        let lich = Lich::new(
                            RfChannelType::from_bits(rfct_bits),
                            fct,
                            option,
                            outbound,
                        );

                        lich.encode(&mut frame);
                        let decoded = Lich::decode(&frame).unwrap();

                        assert_eq!(decoded, lich);
                    }
                }
            }
        }
    }

    #[test]
    fn test_byte_roundtrip_iff_parity() {
        // Re-packing the fields of an arbitrary info byte reproduces it exactly when
        // its parity bit was already consistent.
        for b in 0..=255u8 {
            let lich = Lich::new(
                RfChannelType::from_bits(b >> 6 & 0x03),
                b >> 4 & 0x03,
                b >> 2 & 0x03,
                b >> 1 & 0x01 == 0x01,
            );

            let roundtrips = lich.to_byte() == b;
            let parity_consistent = parity(b) == (b & 0x01 == 0x01);

            assert_eq!(roundtrips, parity_consistent, "byte {:#04X}", b);
        }
    }

    #[test]
    fn test_parity_reject() {
        let mut frame = [0u8; 48];

        let lich = Lich::new(RfChannelType::Rdch, 2, 3, true);
        lich.encode(&mut frame);

        // Flip the parity bit (info bit 7 lives at air offset 20 + 14.)
        let idx = FSW_LENGTH_BITS + 14;
        let b = bits::read_bit(&frame, idx);
        bits::write_bit(&mut frame, idx, !b);

        assert_eq!(Lich::decode(&frame), Err(NxdnError::InvalidParity));
    }

    #[test]
    fn test_companion_bits_fixed() {
        let mut frame = [0u8; 48];
        Lich::new(RfChannelType::Rcch, 0, 0, false).encode(&mut frame);

        for i in 0..8 {
            assert!(bits::read_bit(&frame, FSW_LENGTH_BITS + 2 * i + 1));
        }
    }

    #[test]
    fn test_info_byte_fields() {
        // RTCH, SACCH-SS, steal none, outbound: 0b01_10_11_1_0 with parity clear.
        let lich = Lich::new(RfChannelType::Rtch, 2, 3, true);
        assert_eq!(lich.to_byte(), 0b01101110);

        // RDCH upper nibble 0x8 family sets parity: 0b10_00_00_0_0 -> 0x80 | 1.
        let lich = Lich::new(RfChannelType::Rdch, 0, 0, false);
        assert_eq!(lich.to_byte(), 0x81);
    }
}
