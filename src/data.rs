//! The data packet handler: UDCH frame repeat and the data call lifecycle.
//!
//! Data calls stay shallow here: the core tracks the header/data/ack lifecycle for
//! state and logging purposes and repeats frames as-is; payload reassembly belongs to
//! the receiving application.

use log::{info, warn};

use crate::channel::lich::{Lich, RfChannelType};
use crate::consts::{
    FRAME_META_BYTES, LICH_USC_UDCH, SACCH_OFFSET_BITS, TAG_DATA, TAG_EOT,
};
use crate::control::{CoreState, HostInterface, NetState, RfState, FRAME_BUF_BYTES};
use crate::lc::rtch::{MessageType, RtchLc};
use crate::scramble::scramble;
use crate::sync;

/// Bits of link control carried at the head of a UDCH.
const UDCH_LC_BITS: usize = 176;

/// Data call handler for both the RF and network sides.
pub struct DataHandler {
    /// Frames seen in the RF data call in progress.
    pub rf_frames: u32,
}

impl DataHandler {
    /// Create a new `DataHandler`.
    pub fn new() -> DataHandler {
        DataHandler { rf_frames: 0 }
    }

    /// Reset the per-call statistics for the RF side.
    pub fn reset_rf(&mut self) {
        self.rf_frames = 0;
    }

    /// Process a UDCH frame from the RF interface.
    pub fn process_rf(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        option: u8,
        data: &mut [u8],
    ) -> bool {
        let mut lc = RtchLc::new();
        if lc
            .decode_at(&data[FRAME_META_BYTES..], UDCH_LC_BITS, SACCH_OFFSET_BITS)
            .is_err()
        {
            if state.rf_state == RfState::Listening {
                return false;
            }

            // Mid-call, repeat the frame on the last known link control.
            self.repeat_rf(state, host, option, false, data);
            self.rf_frames += 1;
            return true;
        }

        let src_id = lc.src_id;
        let dst_id = lc.dst_id;

        let mut is_release = false;

        match lc.message_type {
            MessageType::DcallHdr | MessageType::SdcallReqHdr => {
                if state.rf_state == RfState::Listening {
                    if !state.acl.validate_rid(src_id) {
                        warn!(target: "rf", "NXDN, DCALL denial, RID rejection, srcId = {}", src_id);
                        state.rf_state = RfState::Rejected;
                        return false;
                    }

                    let dst_ok = if lc.group {
                        state.acl.validate_tg(dst_id)
                    } else {
                        state.acl.validate_rid(dst_id)
                    };

                    if !dst_ok {
                        warn!(target: "rf", "NXDN, DCALL denial, TGID rejection, dstId = {}", dst_id);
                        state.rf_state = RfState::Rejected;
                        return false;
                    }

                    self.rf_frames = 0;
                    state.rf_timeout.start();
                    state.rf_state = RfState::Data;
                    state.rf_last_dst_id = dst_id;
                    state.rf_lc = lc;

                    info!(
                        target: "activity",
                        "NXDN, RF, data transmission from {} to {}{}",
                        src_id,
                        if state.rf_lc.group { "TG " } else { "" },
                        dst_id
                    );
                }
            }
            MessageType::DcallData | MessageType::SdcallReqData | MessageType::DcallAck
            | MessageType::SdcallResp | MessageType::SdcallIv | MessageType::HeadDly
            | MessageType::Idle => {
                if state.rf_state != RfState::Data {
                    return false;
                }
            }
            MessageType::TxRel | MessageType::TxRelEx => {
                if state.rf_state != RfState::Data {
                    return false;
                }

                is_release = true;
            }
            _ => return false,
        }

        self.repeat_rf(state, host, option, is_release, data);
        self.rf_frames += 1;

        if is_release {
            info!(
                target: "activity",
                "NXDN, RF, data end of transmission, duration = {:.1}s",
                self.rf_frames as f32 / 12.5
            );

            state.end_rf(host);
        }

        true
    }

    /// Process a UDCH frame from the network.
    pub fn process_net(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        option: u8,
        net_lc: &RtchLc,
        data: &mut [u8],
    ) -> bool {
        if state.net_state == NetState::Idle {
            state.queue.clear();
        }

        let is_release = matches!(
            net_lc.message_type,
            MessageType::TxRel | MessageType::TxRelEx
        );

        match net_lc.message_type {
            MessageType::DcallHdr | MessageType::SdcallReqHdr => {
                if state.net_state == NetState::Idle {
                    state.net_state = NetState::Data;
                    state.net_timeout.start();
                    state.net_last_dst_id = net_lc.dst_id;
                    state.net_lc = net_lc.clone();

                    info!(
                        target: "activity",
                        "NXDN, NET, data transmission from {} to {}{}",
                        net_lc.src_id,
                        if net_lc.group { "TG " } else { "" },
                        net_lc.dst_id
                    );
                }
            }
            MessageType::TxRel | MessageType::TxRelEx => {
                if state.net_state != NetState::Data {
                    return false;
                }
            }
            _ => {
                if state.net_state != NetState::Data {
                    return false;
                }
            }
        }

        // Repeat onto RF.
        sync::insert_fsw(&mut data[FRAME_META_BYTES..]);

        Lich::new(RfChannelType::Rdch, LICH_USC_UDCH, option, true)
            .encode(&mut data[FRAME_META_BYTES..]);

        data[0] = if is_release { TAG_EOT } else { TAG_DATA };
        data[1] = 0x00;

        scramble(&mut data[FRAME_META_BYTES..]);

        if state.config.duplex {
            state.add_frame(&data[..FRAME_BUF_BYTES], true);
        }

        if is_release {
            info!(target: "activity", "NXDN, NET, data end of transmission");
            state.end_net(host);
        }

        true
    }

    /// Rebuild and queue an RF data frame.
    fn repeat_rf(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        option: u8,
        is_release: bool,
        data: &mut [u8],
    ) {
        sync::insert_fsw(&mut data[FRAME_META_BYTES..]);

        Lich::new(
            RfChannelType::Rdch,
            LICH_USC_UDCH,
            option,
            state.config.duplex,
        )
        .encode(&mut data[FRAME_META_BYTES..]);

        data[0] = if is_release { TAG_EOT } else { TAG_DATA };
        data[1] = 0x00;

        scramble(&mut data[FRAME_META_BYTES..]);

        host.write_net_frame(&state.rf_lc, &data[..FRAME_BUF_BYTES]);

        if state.config.duplex {
            state.add_frame(&data[..FRAME_BUF_BYTES], false);
        }
    }
}

impl Default for DataHandler {
    fn default() -> DataHandler {
        DataHandler::new()
    }
}
