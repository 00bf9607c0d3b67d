//! Standard errors that may occur when working with the NXDN air interface.

use thiserror::Error;

/// NXDN runtime errors.
///
/// Decode errors stay local to the offending frame; policy and resource errors are
/// surfaced to the caller so a deny response can be generated.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum NxdnError {
    /// The LICH parity check failed.
    #[error("LICH parity mismatch")]
    InvalidParity,
    /// An RTCH or RCCH opcode is unknown or unimplemented.
    #[error("unknown message type ${0:02X}")]
    UnknownMessageType(u8),
    /// A channel codec CRC check failed.
    #[error("channel CRC mismatch")]
    CrcMismatch,
    /// The received RAN is neither ours nor the wildcard.
    #[error("RAN mismatch")]
    RanMismatch,
    /// A new call collided with traffic already in progress.
    #[error("traffic collision")]
    TrafficCollision,
    /// No RF channel is free in the pool.
    #[error("no channel available")]
    NoChannel,
    /// The destination group is already busy.
    #[error("group busy")]
    GroupBusy,
    /// An access control lookup rejected the source or destination.
    #[error("not permitted")]
    NotPermitted,
    /// The source is not affiliated to the requested talkgroup.
    #[error("not affiliated")]
    NotAffiliated,
    /// The source is not registered with the site.
    #[error("not registered")]
    NotRegistered,
    /// A registration carried a foreign location ID.
    #[error("location ID mismatch")]
    LocIdMismatch,
    /// The outbound frame queue is full.
    #[error("frame queue full")]
    QueueFull,
    /// The network watchdog expired.
    #[error("network watchdog expired")]
    WatchdogExpired,
    /// An RF or network call timed out.
    #[error("call timeout")]
    Timeout,
    /// A frame was too short or otherwise unusable.
    #[error("malformed frame")]
    MalformedFrame,
}

/// Standard result using `NxdnError`.
pub type Result<T> = std::result::Result<T, NxdnError>;
