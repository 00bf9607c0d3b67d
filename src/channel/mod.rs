//! Codecs for the physical channels multiplexed into each air frame.

pub mod cac;
pub mod facch1;
pub mod lich;
pub mod sacch;

pub use self::cac::Cac;
pub use self::facch1::Facch1;
pub use self::lich::Lich;
pub use self::sacch::Sacch;
