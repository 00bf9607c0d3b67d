//! The voice packet handler: call setup and teardown on both sides, SACCH superframe
//! reassembly for late entry, and audio superblock regeneration.

use log::{info, warn};

use crate::ambe::AmbeFec;
use crate::channel::lich::{Lich, RfChannelType};
use crate::channel::{Facch1, Sacch};
use crate::consts::{
    AMBE_SUBFRAME_BYTES, DEFAULT_SILENCE_THRESHOLD, FACCH1_LC_BITS, FACCH1_LENGTH_BITS,
    FACCH1_OFFSET_BITS, FRAME_META_BYTES, LICH_STEAL_FACCH, LICH_STEAL_FACCH1_1,
    LICH_STEAL_FACCH1_2, LICH_STEAL_NONE, LICH_USC_SACCH_NS, LICH_USC_SACCH_SS,
    MAX_VOICE_ERRORS, NULL_AMBE, SACCH_FRAGMENT_BITS, SACCH_IDLE, SR_1_4, SR_2_4, SR_3_4,
    SR_4_4, SR_SINGLE, SUPERBLOCK_OFFSET_BYTES, TAG_DATA, TAG_EOT,
};
use crate::control::{CoreState, HostInterface, NetState, RfState, FRAME_BUF_BYTES};
use crate::lc::rtch::{MessageType, RtchLc};
use crate::scramble::scramble;
use crate::sync;

/// Bit offset of the second FACCH1 slot.
const FACCH1_SLOT2_BITS: usize = FACCH1_OFFSET_BITS + FACCH1_LENGTH_BITS;

/// Voice call handler for both the RF and network sides.
pub struct Voice {
    /// Frames seen in the RF call in progress.
    pub rf_frames: u32,
    /// Audio bits checked in the RF call in progress.
    pub rf_bits: u32,
    /// Audio bit errors corrected in the RF call in progress.
    pub rf_errs: u32,
    /// Link control codewords that failed to decode.
    pub rf_undecodable_lc: u32,
    /// Frames seen in the network call in progress.
    pub net_frames: u32,
    /// Frames lost from the network call in progress.
    pub net_lost: u32,
    /// Last rejected unit, to damp repeated denials.
    last_reject_id: u16,
    /// Audio error count above which a superblock is silenced.
    silence_threshold: u32,
    /// Injected AMBE FEC regenerator.
    ambe: Box<dyn AmbeFec>,
}

impl Voice {
    /// Create a new `Voice` around the given AMBE regenerator. An out-of-range
    /// silence threshold falls back to a sane default.
    pub fn new(ambe: Box<dyn AmbeFec>, silence_threshold: u32) -> Voice {
        let silence_threshold = match silence_threshold {
            0 => MAX_VOICE_ERRORS,
            t if t > MAX_VOICE_ERRORS => DEFAULT_SILENCE_THRESHOLD,
            t => t,
        };

        Voice {
            rf_frames: 0,
            rf_bits: 1,
            rf_errs: 0,
            rf_undecodable_lc: 0,
            net_frames: 0,
            net_lost: 0,
            last_reject_id: 0,
            silence_threshold,
            ambe,
        }
    }

    /// Reset the per-call statistics for the RF side.
    pub fn reset_rf(&mut self) {
        self.rf_frames = 0;
        self.rf_errs = 0;
        self.rf_bits = 1;
        self.rf_undecodable_lc = 0;
    }

    /// Reset the per-call statistics for the network side.
    pub fn reset_net(&mut self) {
        self.net_frames = 0;
        self.net_lost = 0;
    }

    /// Process a voice-bearing frame from the RF interface.
    pub fn process_rf(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        fct: u8,
        option: u8,
        data: &mut [u8],
    ) -> bool {
        let sacch = match Sacch::decode(&data[FRAME_META_BYTES..]) {
            Ok(sacch) => {
                if sacch.ran != state.config.ran && sacch.ran != 0 {
                    return false;
                }
                Some(sacch)
            }
            Err(_) => {
                if state.rf_state == RfState::Listening {
                    return false;
                }
                None
            }
        };

        if fct == LICH_USC_SACCH_NS {
            return self.process_rf_sacch_ns(state, host, data);
        }

        if state.rf_state == RfState::Listening
            && !self.try_rf_late_entry(state, host, option, sacch, data)
        {
            return false;
        }

        if state.rf_state == RfState::Audio {
            self.repeat_rf_audio(state, host, option, sacch, data);
        }

        true
    }

    /// Handle a non-superblock frame: the FACCH1 carries the call setup or teardown.
    fn process_rf_sacch_ns(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        data: &mut [u8],
    ) -> bool {
        let facch = match Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_OFFSET_BITS)
            .or_else(|_| Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_SLOT2_BITS))
        {
            Ok(facch) => facch,
            Err(_) => return false,
        };

        let mut lc = RtchLc::new();
        if lc.decode(&facch.data, FACCH1_LC_BITS).is_err() {
            self.rf_undecodable_lc += 1;
            return false;
        }

        let src_id = lc.src_id;
        let dst_id = lc.dst_id;
        let group = lc.group;
        let encrypted = lc.encrypted;

        // Don't process RF frames if this host isn't authoritative for the TG.
        if !state.config.authoritative
            && state.permitted_dst_id != dst_id
            && state.rf_state != RfState::Audio
        {
            warn!(target: "rf", "NXDN, ignoring RF traffic, destination not permitted, dstId = {}", dst_id);
            state.rf_state = RfState::Listening;
            state.rf_mask = 0;
            state.rf_lc.reset();
            return false;
        }

        match lc.message_type {
            MessageType::TxRel => {
                if state.rf_state != RfState::Audio {
                    state.rf_state = RfState::Listening;
                    state.rf_mask = 0;
                    state.rf_lc.reset();
                    return false;
                }
            }
            MessageType::Vcall => {
                if self.check_rf_collision(state, host, src_id, dst_id) {
                    return false;
                }
                if !self.validate_rf_access(state, src_id, dst_id, group) {
                    return false;
                }
            }
            _ => return false,
        }

        let is_release = lc.message_type == MessageType::TxRel;

        state.rf_last_dst_id = dst_id;
        state.rf_lc = lc;

        // Rebuild the burst for downstream receivers.
        sync::insert_fsw(&mut data[FRAME_META_BYTES..]);

        Lich::new(
            RfChannelType::Rdch,
            LICH_USC_SACCH_NS,
            LICH_STEAL_FACCH,
            state.config.duplex,
        )
        .encode(&mut data[FRAME_META_BYTES..]);

        Sacch::new(state.config.ran, SR_SINGLE, SACCH_IDLE).encode(&mut data[FRAME_META_BYTES..]);

        let mut lc_buf = [0u8; 10];
        state.rf_lc.encode(&mut lc_buf, FACCH1_LC_BITS, 0);

        let facch = Facch1::new(lc_buf);
        facch.encode(&mut data[FRAME_META_BYTES..], FACCH1_OFFSET_BITS);
        facch.encode(&mut data[FRAME_META_BYTES..], FACCH1_SLOT2_BITS);

        data[0] = if is_release { TAG_EOT } else { TAG_DATA };
        data[1] = 0x00;

        scramble(&mut data[FRAME_META_BYTES..]);

        host.write_net_frame(&state.rf_lc, &data[..FRAME_BUF_BYTES]);

        if state.config.duplex {
            state.add_frame(&data[..FRAME_BUF_BYTES], false);
        }

        if is_release {
            self.rf_frames += 1;
            self.log_rf_end(state, "end of transmission");

            if state.config.control {
                if let Some(release) = state.affiliations.release_grant(dst_id, false) {
                    state.notify_releases(host, &[release]);
                }
            }

            state.end_rf(host);
        } else {
            self.rf_frames = 0;
            self.rf_errs = 0;
            self.rf_bits = 1;
            state.rf_timeout.start();
            state.rf_tg_hang.start();
            state.rf_state = RfState::Audio;

            state.min_rssi = state.rssi;
            state.max_rssi = state.rssi;
            state.ave_rssi = state.rssi;
            state.rssi_count = 1;

            info!(
                target: "rf",
                "NXDN, VCALL, srcId = {}, dstId = {}, group = {}, emerg = {}, encrypt = {}, algo = ${:02X}, kid = ${:02X}",
                src_id,
                dst_id,
                group,
                state.rf_lc.emergency,
                encrypted,
                state.rf_lc.alg_id,
                state.rf_lc.key_id
            );

            info!(
                target: "activity",
                "NXDN, RF, {}voice transmission from {} to {}{}",
                if encrypted { "encrypted " } else { "" },
                src_id,
                if group { "TG " } else { "" },
                dst_id
            );
        }

        true
    }

    /// Attempt to open a call from a superblock frame alone: either a stolen FACCH1
    /// carries the link control, or it is reassembled from SACCH quarters. Returns
    /// whether a call was started.
    fn try_rf_late_entry(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        option: u8,
        sacch: Option<Sacch>,
        data: &mut [u8],
    ) -> bool {
        let facch = match option {
            LICH_STEAL_FACCH => Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_OFFSET_BITS)
                .or_else(|_| Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_SLOT2_BITS))
                .ok(),
            LICH_STEAL_FACCH1_1 => {
                Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_OFFSET_BITS).ok()
            }
            LICH_STEAL_FACCH1_2 => Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_SLOT2_BITS).ok(),
            _ => None,
        };

        let mut has_info = false;
        if let Some(facch) = facch {
            let mut lc = RtchLc::new();
            if lc.decode(&facch.data, FACCH1_LC_BITS).is_ok()
                && lc.message_type == MessageType::Vcall
            {
                state.rf_lc = lc;
                has_info = true;
            } else {
                return false;
            }
        }

        if !has_info {
            let sacch = match sacch {
                Some(sacch) => sacch,
                None => return false,
            };

            // Quarters must arrive in order; an out-of-order first quarter restarts
            // the reassembly.
            match sacch.structure {
                SR_1_4 => {
                    state.rf_lc.decode_fragment(&sacch.data, SACCH_FRAGMENT_BITS, 0);
                    state.rf_mask =
                        if state.rf_lc.raw_message_type() == MessageType::Vcall.to_bits() {
                            0x01
                        } else {
                            0x00
                        };
                }
                SR_2_4 => {
                    state.rf_mask |= 0x02;
                    state
                        .rf_lc
                        .decode_fragment(&sacch.data, SACCH_FRAGMENT_BITS, 18);
                }
                SR_3_4 => {
                    state.rf_mask |= 0x04;
                    state
                        .rf_lc
                        .decode_fragment(&sacch.data, SACCH_FRAGMENT_BITS, 36);
                }
                SR_4_4 => {
                    state.rf_mask |= 0x08;
                    state
                        .rf_lc
                        .decode_fragment(&sacch.data, SACCH_FRAGMENT_BITS, 54);
                }
                _ => {}
            }

            if state.rf_mask != 0x0F {
                return false;
            }

            if state.rf_lc.interpret().is_err() {
                self.rf_undecodable_lc += 1;
                return false;
            }

            if state.rf_lc.message_type != MessageType::Vcall {
                return false;
            }
        }

        let src_id = state.rf_lc.src_id;
        let dst_id = state.rf_lc.dst_id;
        let group = state.rf_lc.group;
        let encrypted = state.rf_lc.encrypted;

        if self.check_rf_collision(state, host, src_id, dst_id) {
            return false;
        }
        if !self.validate_rf_access(state, src_id, dst_id, group) {
            return false;
        }

        state.rf_last_dst_id = dst_id;
        self.rf_frames = 0;
        self.rf_errs = 0;
        self.rf_bits = 1;
        state.rf_timeout.start();
        state.rf_tg_hang.start();
        state.rf_state = RfState::Audio;

        state.min_rssi = state.rssi;
        state.max_rssi = state.rssi;
        state.ave_rssi = state.rssi;
        state.rssi_count = 1;

        info!(
            target: "activity",
            "NXDN, RF, {}late entry from {} to {}{}",
            if encrypted { "encrypted " } else { "" },
            src_id,
            if group { "TG " } else { "" },
            dst_id
        );

        // Synthesize a header burst so downstream receivers get the link control they
        // missed.
        let mut start = [0u8; FRAME_BUF_BYTES];
        sync::insert_fsw(&mut start[FRAME_META_BYTES..]);

        Lich::new(
            RfChannelType::Rdch,
            LICH_USC_SACCH_NS,
            LICH_STEAL_FACCH,
            state.config.duplex,
        )
        .encode(&mut start[FRAME_META_BYTES..]);

        Sacch::new(state.config.ran, SR_SINGLE, SACCH_IDLE)
            .encode(&mut start[FRAME_META_BYTES..]);

        let mut lc_buf = [0u8; 10];
        state.rf_lc.encode(&mut lc_buf, FACCH1_LC_BITS, 0);

        let facch = Facch1::new(lc_buf);
        facch.encode(&mut start[FRAME_META_BYTES..], FACCH1_OFFSET_BITS);
        facch.encode(&mut start[FRAME_META_BYTES..], FACCH1_SLOT2_BITS);

        start[0] = TAG_DATA;
        start[1] = 0x00;

        scramble(&mut start[FRAME_META_BYTES..]);

        host.write_net_frame(&state.rf_lc, &start);

        if state.config.duplex {
            state.add_frame(&start, false);
        }

        true
    }

    /// Regenerate and repeat an audio superblock on the RF side.
    fn repeat_rf_audio(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        option: u8,
        sacch: Option<Sacch>,
        data: &mut [u8],
    ) {
        sync::insert_fsw(&mut data[FRAME_META_BYTES..]);

        Lich::new(
            RfChannelType::Rdch,
            LICH_USC_SACCH_SS,
            option,
            state.config.duplex,
        )
        .encode(&mut data[FRAME_META_BYTES..]);

        // Regenerate the SACCH with our RAN when it decoded cleanly.
        if let Some(mut sacch) = sacch {
            sacch.ran = state.config.ran;
            sacch.encode(&mut data[FRAME_META_BYTES..]);
        }

        match option {
            LICH_STEAL_NONE => {
                let mut errors = 0;
                for subframe in [0usize, 9, 18, 27] {
                    errors += self.regenerate(data, subframe);
                }

                // Replace the audio with silence when the error rate exceeds the
                // configured threshold.
                if errors > self.silence_threshold {
                    for subframe in [0usize, 9, 18, 27] {
                        silence(data, subframe);
                    }

                    warn!(target: "rf", "NXDN, VCALL, exceeded lost audio threshold, filling in");
                }

                self.rf_errs += errors;
                self.rf_bits += 188;
            }
            LICH_STEAL_FACCH1_1 => {
                self.repeat_facch(data, FACCH1_OFFSET_BITS);

                let mut errors = 0;
                for subframe in [18usize, 27] {
                    errors += self.regenerate(data, subframe);
                }

                if errors > self.silence_threshold / 2 {
                    for subframe in [18usize, 27] {
                        silence(data, subframe);
                    }

                    warn!(target: "rf", "NXDN, VCALL, exceeded lost audio threshold, filling in");
                }

                self.rf_errs += errors;
                self.rf_bits += 94;
            }
            LICH_STEAL_FACCH1_2 => {
                let mut errors = 0;
                for subframe in [0usize, 9] {
                    errors += self.regenerate(data, subframe);
                }

                if errors > self.silence_threshold / 2 {
                    for subframe in [0usize, 9] {
                        silence(data, subframe);
                    }

                    warn!(target: "rf", "NXDN, VCALL, exceeded lost audio threshold, filling in");
                }

                self.rf_errs += errors;
                self.rf_bits += 94;

                self.repeat_facch(data, FACCH1_SLOT2_BITS);
            }
            _ => {
                self.repeat_facch(data, FACCH1_OFFSET_BITS);
                self.repeat_facch(data, FACCH1_SLOT2_BITS);
            }
        }

        data[0] = TAG_DATA;
        data[1] = 0x00;

        scramble(&mut data[FRAME_META_BYTES..]);

        host.write_net_frame(&state.rf_lc, &data[..FRAME_BUF_BYTES]);

        if state.config.duplex {
            state.add_frame(&data[..FRAME_BUF_BYTES], false);
        }

        self.rf_frames += 1;
    }

    /// Process a voice-bearing frame from the network.
    pub fn process_net(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        fct: u8,
        option: u8,
        net_lc: &RtchLc,
        data: &mut [u8],
    ) -> bool {
        if state.net_state == NetState::Idle && state.rf_state == RfState::Listening {
            state.queue.clear();

            self.reset_rf();
            self.reset_net();
        }

        let sacch = Sacch::decode(&data[FRAME_META_BYTES..]).ok();

        if fct == LICH_USC_SACCH_NS {
            return self.process_net_sacch_ns(state, host, net_lc, data);
        }

        if state.net_state == NetState::Idle
            && !self.try_net_late_entry(state, option, sacch, data)
        {
            return false;
        }

        if state.net_state == NetState::Audio {
            self.repeat_net_audio(state, option, sacch, data);
        }

        true
    }

    /// Handle a non-superblock network frame carrying call setup or teardown.
    fn process_net_sacch_ns(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        _net_lc: &RtchLc,
        data: &mut [u8],
    ) -> bool {
        let facch = match Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_OFFSET_BITS)
            .or_else(|_| Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_SLOT2_BITS))
        {
            Ok(facch) => facch,
            Err(_) => {
                warn!(target: "net", "NXDN, invalid network frame, undecodable FACCH1");
                state.end_net(host);
                return false;
            }
        };

        let mut lc = RtchLc::new();
        if lc.decode(&facch.data, FACCH1_LC_BITS).is_err() {
            warn!(target: "net", "NXDN, invalid network frame, undecodable LC");
            state.end_net(host);
            return false;
        }

        let src_id = lc.src_id;
        let dst_id = lc.dst_id;
        let group = lc.group;
        let encrypted = lc.encrypted;

        // Don't process network frames if this host isn't authoritative for the TG.
        if !state.config.authoritative
            && state.permitted_dst_id != dst_id
            && state.net_state != NetState::Audio
        {
            state.net_state = NetState::Idle;
            state.net_mask = 0;
            state.net_lc.reset();
            return false;
        }

        match lc.message_type {
            MessageType::TxRel => {
                if state.net_state != NetState::Audio {
                    state.net_state = NetState::Idle;
                    state.net_mask = 0;
                    state.net_lc.reset();
                    return false;
                }
            }
            MessageType::Vcall => {
                if self.check_net_collision(state, src_id, dst_id) {
                    return false;
                }
                if !self.validate_net_access(state, src_id, dst_id, group) {
                    return false;
                }
            }
            _ => return false,
        }

        let is_release = lc.message_type == MessageType::TxRel;

        state.net_last_dst_id = dst_id;
        state.net_lc = lc;

        sync::insert_fsw(&mut data[FRAME_META_BYTES..]);

        Lich::new(
            RfChannelType::Rdch,
            LICH_USC_SACCH_NS,
            LICH_STEAL_FACCH,
            true,
        )
        .encode(&mut data[FRAME_META_BYTES..]);

        Sacch::new(state.config.ran, SR_SINGLE, SACCH_IDLE).encode(&mut data[FRAME_META_BYTES..]);

        let facch_out = Facch1::new(facch.data);
        facch_out.encode(&mut data[FRAME_META_BYTES..], FACCH1_OFFSET_BITS);
        facch_out.encode(&mut data[FRAME_META_BYTES..], FACCH1_SLOT2_BITS);

        data[0] = if is_release { TAG_EOT } else { TAG_DATA };
        data[1] = 0x00;

        scramble(&mut data[FRAME_META_BYTES..]);

        if state.config.duplex {
            state.add_frame(&data[..FRAME_BUF_BYTES], true);
        }

        if is_release {
            self.net_frames += 1;
            info!(
                target: "activity",
                "NXDN, NET, end of transmission, duration = {:.1}s",
                self.net_frames as f32 / 12.5
            );

            if state.config.control {
                if let Some(release) = state.affiliations.release_grant(dst_id, false) {
                    state.notify_releases(host, &[release]);
                }
            }

            state.end_net(host);
        } else {
            self.net_frames = 0;
            state.net_timeout.start();
            state.net_state = NetState::Audio;

            info!(
                target: "activity",
                "NXDN, NET, {}voice transmission from {} to {}{}",
                if encrypted { "encrypted " } else { "" },
                src_id,
                if group { "TG " } else { "" },
                dst_id
            );
        }

        true
    }

    /// Attempt to open a network call from a superblock frame alone.
    fn try_net_late_entry(
        &mut self,
        state: &mut CoreState,
        option: u8,
        sacch: Option<Sacch>,
        data: &mut [u8],
    ) -> bool {
        let facch = match option {
            LICH_STEAL_FACCH => Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_OFFSET_BITS)
                .or_else(|_| Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_SLOT2_BITS))
                .ok(),
            LICH_STEAL_FACCH1_1 => {
                Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_OFFSET_BITS).ok()
            }
            LICH_STEAL_FACCH1_2 => Facch1::decode(&data[FRAME_META_BYTES..], FACCH1_SLOT2_BITS).ok(),
            _ => None,
        };

        let mut has_info = false;
        if let Some(facch) = facch {
            let mut lc = RtchLc::new();
            if lc.decode(&facch.data, FACCH1_LC_BITS).is_ok()
                && lc.message_type == MessageType::Vcall
            {
                state.net_lc = lc;
                has_info = true;
            } else {
                return false;
            }
        }

        if !has_info {
            let sacch = match sacch {
                Some(sacch) => sacch,
                None => return false,
            };

            match sacch.structure {
                SR_1_4 => {
                    state
                        .net_lc
                        .decode_fragment(&sacch.data, SACCH_FRAGMENT_BITS, 0);
                    state.net_mask =
                        if state.net_lc.raw_message_type() == MessageType::Vcall.to_bits() {
                            0x01
                        } else {
                            0x00
                        };
                }
                SR_2_4 => {
                    state.net_mask |= 0x02;
                    state
                        .net_lc
                        .decode_fragment(&sacch.data, SACCH_FRAGMENT_BITS, 18);
                }
                SR_3_4 => {
                    state.net_mask |= 0x04;
                    state
                        .net_lc
                        .decode_fragment(&sacch.data, SACCH_FRAGMENT_BITS, 36);
                }
                SR_4_4 => {
                    state.net_mask |= 0x08;
                    state
                        .net_lc
                        .decode_fragment(&sacch.data, SACCH_FRAGMENT_BITS, 54);
                }
                _ => {}
            }

            if state.net_mask != 0x0F {
                return false;
            }

            if state.net_lc.interpret().is_err() {
                return false;
            }

            if state.net_lc.message_type != MessageType::Vcall {
                return false;
            }
        }

        let src_id = state.net_lc.src_id;
        let dst_id = state.net_lc.dst_id;
        let group = state.net_lc.group;
        let encrypted = state.net_lc.encrypted;

        if self.check_net_collision(state, src_id, dst_id) {
            return false;
        }
        if !self.validate_net_access(state, src_id, dst_id, group) {
            return false;
        }

        state.net_last_dst_id = dst_id;
        self.net_frames = 0;
        state.net_timeout.start();
        state.net_state = NetState::Audio;

        info!(
            target: "activity",
            "NXDN, NET, {}late entry from {} to {}{}",
            if encrypted { "encrypted " } else { "" },
            src_id,
            if group { "TG " } else { "" },
            dst_id
        );

        let mut start = [0u8; FRAME_BUF_BYTES];
        sync::insert_fsw(&mut start[FRAME_META_BYTES..]);

        Lich::new(
            RfChannelType::Rdch,
            LICH_USC_SACCH_NS,
            LICH_STEAL_FACCH,
            true,
        )
        .encode(&mut start[FRAME_META_BYTES..]);

        Sacch::new(state.config.ran, SR_SINGLE, SACCH_IDLE)
            .encode(&mut start[FRAME_META_BYTES..]);

        let mut lc_buf = [0u8; 10];
        state.net_lc.encode(&mut lc_buf, FACCH1_LC_BITS, 0);

        let facch = Facch1::new(lc_buf);
        facch.encode(&mut start[FRAME_META_BYTES..], FACCH1_OFFSET_BITS);
        facch.encode(&mut start[FRAME_META_BYTES..], FACCH1_SLOT2_BITS);

        start[0] = TAG_DATA;
        start[1] = 0x00;

        scramble(&mut start[FRAME_META_BYTES..]);

        if state.config.duplex {
            state.add_frame(&start, true);
        }

        true
    }

    /// Regenerate and repeat an audio superblock arriving from the network.
    fn repeat_net_audio(
        &mut self,
        state: &mut CoreState,
        option: u8,
        sacch: Option<Sacch>,
        data: &mut [u8],
    ) {
        sync::insert_fsw(&mut data[FRAME_META_BYTES..]);

        Lich::new(RfChannelType::Rdch, LICH_USC_SACCH_SS, option, true)
            .encode(&mut data[FRAME_META_BYTES..]);

        if let Some(mut sacch) = sacch {
            sacch.ran = state.config.ran;
            sacch.encode(&mut data[FRAME_META_BYTES..]);
        }

        match option {
            LICH_STEAL_NONE => {
                for subframe in [0usize, 9, 18, 27] {
                    self.regenerate(data, subframe);
                }
            }
            LICH_STEAL_FACCH1_1 => {
                self.repeat_facch(data, FACCH1_OFFSET_BITS);
                for subframe in [18usize, 27] {
                    self.regenerate(data, subframe);
                }
            }
            LICH_STEAL_FACCH1_2 => {
                for subframe in [0usize, 9] {
                    self.regenerate(data, subframe);
                }
                self.repeat_facch(data, FACCH1_SLOT2_BITS);
            }
            _ => {
                self.repeat_facch(data, FACCH1_OFFSET_BITS);
                self.repeat_facch(data, FACCH1_SLOT2_BITS);
            }
        }

        data[0] = TAG_DATA;
        data[1] = 0x00;

        scramble(&mut data[FRAME_META_BYTES..]);

        if state.config.duplex {
            state.add_frame(&data[..FRAME_BUF_BYTES], true);
        }

        self.net_frames += 1;
    }

    /// Check a new RF call against network traffic in progress. Returns true when the
    /// RF frame must be dropped; a network call on a different destination is
    /// preempted instead.
    fn check_rf_collision(
        &mut self,
        state: &mut CoreState,
        host: &mut dyn HostInterface,
        src_id: u16,
        dst_id: u16,
    ) -> bool {
        if state.net_state == NetState::Idle {
            return false;
        }

        if dst_id == state.net_last_dst_id {
            warn!(
                target: "rf",
                "NXDN, traffic collision, rejecting new RF traffic for existing network traffic, srcId = {}, dstId = {}",
                src_id,
                dst_id
            );
            info!(
                target: "activity",
                "NXDN, RF, traffic collision, srcId = {}, dstId = {}",
                src_id,
                dst_id
            );
            self.reset_rf();
            return true;
        }

        warn!(
            target: "rf",
            "NXDN, traffic collision, preempting existing network traffic for new RF traffic, rfDstId = {}, netDstId = {}",
            dst_id,
            state.net_last_dst_id
        );
        state.end_net(host);
        self.reset_net();

        false
    }

    /// Check a new network call against RF traffic and the talkgroup hang timer.
    /// Returns true when the network frame must be dropped.
    fn check_net_collision(&mut self, state: &mut CoreState, src_id: u16, dst_id: u16) -> bool {
        if state.rf_last_dst_id != 0
            && state.rf_tg_hang.is_running()
            && !state.rf_tg_hang.has_expired()
        {
            if state.rf_last_dst_id != dst_id {
                self.reset_net();
                return true;
            }

            // Same destination keeps the hang alive.
            state.rf_tg_hang.start();
        }

        if state.rf_state != RfState::Listening {
            if state.rf_lc.src_id == src_id && state.rf_lc.dst_id == dst_id {
                warn!(
                    target: "net",
                    "NXDN, traffic collision, are we in a voting condition? srcId = {}, dstId = {}",
                    src_id,
                    dst_id
                );
            } else {
                warn!(
                    target: "net",
                    "NXDN, traffic collision, rejecting network traffic for existing RF traffic, rfDstId = {}, netDstId = {}",
                    state.rf_lc.dst_id,
                    dst_id
                );
                info!(
                    target: "activity",
                    "NXDN, NET, traffic collision, srcId = {}, dstId = {}",
                    src_id,
                    dst_id
                );
            }

            self.reset_net();
            return true;
        }

        false
    }

    /// Validate an RF call against the access control rules, moving to the rejected
    /// state on a failure.
    fn validate_rf_access(
        &mut self,
        state: &mut CoreState,
        src_id: u16,
        dst_id: u16,
        group: bool,
    ) -> bool {
        if !state.acl.validate_rid(src_id) {
            if self.last_reject_id == 0 || self.last_reject_id != src_id {
                warn!(target: "rf", "NXDN, VCALL denial, RID rejection, srcId = {}", src_id);
                info!(
                    target: "activity",
                    "NXDN, RF, voice rejection from {} to {}{}",
                    src_id,
                    if group { "TG " } else { "" },
                    dst_id
                );
                self.last_reject_id = src_id;
            }

            state.rf_last_dst_id = 0;
            state.rf_tg_hang.stop();
            state.rf_state = RfState::Rejected;
            return false;
        }

        let dst_ok = if group {
            state.acl.validate_tg(dst_id)
        } else {
            state.acl.validate_rid(dst_id)
        };

        if !dst_ok {
            if self.last_reject_id == 0 || self.last_reject_id != dst_id {
                warn!(target: "rf", "NXDN, VCALL denial, TGID rejection, dstId = {}", dst_id);
                info!(
                    target: "activity",
                    "NXDN, RF, voice rejection from {} to {}{}",
                    src_id,
                    if group { "TG " } else { "" },
                    dst_id
                );
                self.last_reject_id = dst_id;
            }

            state.rf_last_dst_id = 0;
            state.rf_tg_hang.stop();
            state.rf_state = RfState::Rejected;
            return false;
        }

        true
    }

    /// Validate a network call against the access control rules; failures drop the
    /// call without disturbing the RF side.
    fn validate_net_access(
        &mut self,
        state: &mut CoreState,
        src_id: u16,
        dst_id: u16,
        group: bool,
    ) -> bool {
        let dst_ok = if group {
            state.acl.validate_tg(dst_id)
        } else {
            state.acl.validate_rid(dst_id)
        };

        if !state.acl.validate_rid(src_id) || !dst_ok {
            warn!(
                target: "net",
                "NXDN, VCALL denial, network rejection, srcId = {}, dstId = {}",
                src_id,
                dst_id
            );

            state.net_state = NetState::Idle;
            state.net_mask = 0;
            state.net_lc.reset();
            self.reset_net();
            return false;
        }

        true
    }

    /// Emit the end-of-transmission activity record for the RF side.
    fn log_rf_end(&self, state: &CoreState, what: &str) {
        let ber = self.rf_errs as f32 * 100.0 / self.rf_bits as f32;

        if state.rssi != 0 && state.rssi_count > 0 {
            info!(
                target: "activity",
                "NXDN, RF, {}, duration = {:.1}s, BER = {:.1}%, RSSI = -{}/-{}/-{} dBm",
                what,
                self.rf_frames as f32 / 12.5,
                ber,
                state.min_rssi,
                state.max_rssi,
                state.ave_rssi / state.rssi_count
            );
        } else {
            info!(
                target: "activity",
                "NXDN, RF, {}, duration = {:.1}s, BER = {:.1}%",
                what,
                self.rf_frames as f32 / 12.5,
                ber
            );
        }

        info!(
            target: "rf",
            "NXDN, TX_REL, total frames: {}, bits: {}, undecodable LC: {}, errors: {}",
            self.rf_frames,
            self.rf_bits,
            self.rf_undecodable_lc,
            self.rf_errs
        );
    }

    /// Run the AMBE regenerator over one 9-byte subframe of the superblock.
    fn regenerate(&mut self, data: &mut [u8], subframe: usize) -> u32 {
        let off = FRAME_META_BYTES + SUPERBLOCK_OFFSET_BYTES + subframe;

        let mut buf = [0u8; AMBE_SUBFRAME_BYTES];
        buf.copy_from_slice(&data[off..off + AMBE_SUBFRAME_BYTES]);

        let errors = self.ambe.regenerate(&mut buf);

        data[off..off + AMBE_SUBFRAME_BYTES].copy_from_slice(&buf);
        errors
    }

    /// Re-encode a stolen FACCH1 slot when it decodes cleanly.
    fn repeat_facch(&mut self, data: &mut [u8], offset: usize) {
        if let Ok(facch) = Facch1::decode(&data[FRAME_META_BYTES..], offset) {
            facch.encode(&mut data[FRAME_META_BYTES..], offset);
        }
    }
}

/// Overwrite one audio subframe with the silence pattern.
fn silence(data: &mut [u8], subframe: usize) {
    let off = FRAME_META_BYTES + SUPERBLOCK_OFFSET_BYTES + subframe;
    data[off..off + AMBE_SUBFRAME_BYTES].copy_from_slice(&NULL_AMBE);
}
