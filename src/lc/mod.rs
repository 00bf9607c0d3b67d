//! Link control codecs for the traffic and control channels.

pub mod rcch;
pub mod rtch;

pub use self::rcch::RcchLc;
pub use self::rtch::RtchLc;
