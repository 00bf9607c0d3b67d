//! The protocol core: RF-side and network-side call state machines, frame dispatch,
//! collision policy, and the timer fan-out.
//!
//! The core is synchronous and single-threaded: the modem ingress loop calls
//! [`Control::process_rf`], the network ingress loop calls [`Control::process_net`],
//! and a fixed-rate timer calls [`Control::clock`]. The three must not run
//! concurrently on the same instance, and nothing in here blocks on I/O; everything
//! the core needs from the outside world goes through [`HostInterface`].

use log::{debug, info, warn};

use crate::acl::AccessControl;
use crate::affiliations::{Affiliations, GrantRelease};
use crate::ambe::AmbeFec;
use crate::channel::lich::{Lich, RfChannelType};
use crate::config::Config;
use crate::consts::{
    FRAME_LENGTH_BYTES, FRAME_META_BYTES, LICH_CAC_INBOUND_LONG, LICH_CAC_INBOUND_SHORT,
    LICH_USC_UDCH, TAG_LOST,
};
use crate::data::DataHandler;
use crate::lc::RtchLc;
use crate::ring::FrameRing;
use crate::rssi::RssiInterpolator;
use crate::scramble::scramble;
use crate::site::SiteData;
use crate::sync;
use crate::timer::Timer;
use crate::trunk::Trunk;
use crate::voice::Voice;

/// Length of a modem buffer carrying a frame without RSSI bytes.
pub const FRAME_BUF_BYTES: usize = FRAME_META_BYTES + FRAME_LENGTH_BYTES;
/// Length of a modem buffer carrying a frame with trailing raw RSSI.
pub const FRAME_BUF_RSSI_BYTES: usize = FRAME_BUF_BYTES + 2;

/// Milliseconds of network silence before the watchdog fires.
const NET_WATCHDOG_MS: u32 = 1_500;
/// Interval between control channel broadcast frames.
const CC_INTERVAL_MS: u32 = 80;

/// State of the RF receive side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RfState {
    /// Waiting for traffic.
    Listening,
    /// Repeating a voice call.
    Audio,
    /// Repeating a data call or servicing an RCCH exchange.
    Data,
    /// A request was rejected; cleared on the next clock tick.
    Rejected,
}

/// State of the network receive side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NetState {
    /// No network call in progress.
    Idle,
    /// Relaying a network voice call.
    Audio,
    /// Relaying a network data call.
    Data,
}

/// Everything the core needs from its host: the peer network writer, the out-of-band
/// channel permit, and modem housekeeping.
///
/// `permit_ch` is called while servicing a grant and must be fire-and-forget or
/// bounded-timeout; a `false` return releases the grant and denies the call. A permit
/// with `dst_id` 0 clears a previous permit for the channel.
pub trait HostInterface {
    /// Forward a repeated frame to the peer network.
    fn write_net_frame(&mut self, lc: &RtchLc, data: &[u8]);
    /// Forward a grant request upstream (non-authoritative operation.)
    fn write_grant_req(&mut self, src_id: u16, dst_id: u16, unit_to_unit: bool);
    /// Permit (or, with `dst_id` 0, un-permit) a talkgroup on a payload channel.
    fn permit_ch(&mut self, ch_no: u32, dst_id: u16) -> bool;
    /// Drop any frame the modem is still holding.
    fn clear_modem(&mut self);
    /// Reset the network-side call state of the transport.
    fn reset_net(&mut self);
    /// Whether the peer network connection is up.
    fn net_active(&self) -> bool;
}

/// Core state shared between the dispatch layer and the packet handlers.
pub struct CoreState {
    /// Immutable configuration snapshot.
    pub config: Config,
    /// Local site identity.
    pub site: SiteData,
    /// Access control rules.
    pub acl: AccessControl,
    /// Affiliation, registration, and grant state.
    pub affiliations: Affiliations,
    /// Outbound frame queue drained by the modem.
    pub queue: FrameRing,
    /// RSSI calibration.
    pub rssi_map: RssiInterpolator,

    /// RF receive state.
    pub rf_state: RfState,
    /// Network receive state.
    pub net_state: NetState,
    /// Most recent valid LICH.
    pub rf_last_lich: Lich,
    /// Link control of the RF call in progress.
    pub rf_lc: RtchLc,
    /// Link control of the network call in progress.
    pub net_lc: RtchLc,
    /// SACCH superframe reassembly mask, RF side.
    pub rf_mask: u8,
    /// SACCH superframe reassembly mask, network side.
    pub net_mask: u8,
    /// Destination of the last RF call, pinned by the talkgroup hang timer.
    pub rf_last_dst_id: u16,
    /// Destination of the last network call.
    pub net_last_dst_id: u16,
    /// Talkgroup permitted on a non-authoritative host.
    pub permitted_dst_id: u16,

    /// RF call timeout.
    pub rf_timeout: Timer,
    /// Network call timeout.
    pub net_timeout: Timer,
    /// Talkgroup hang timer.
    pub rf_tg_hang: Timer,
    /// Network silence watchdog.
    pub network_watchdog: Timer,
    /// Control channel broadcast pacing.
    pub cc_packet_interval: Timer,

    /// Whether the CC broadcast is enabled by the host.
    pub cc_running: bool,
    /// CC running state at the previous tick.
    pub cc_prev_running: bool,
    /// Whether inbound traffic paused the CC broadcast.
    pub cc_halted: bool,
    /// CC superframe counter, wraps at 254.
    pub cc_frame_cnt: u8,
    /// Position within the CC superframe.
    pub cc_seq: u8,

    /// Most recent RSSI magnitude (positive dBm loss.)
    pub rssi: u32,
    /// Weakest signal seen this call.
    pub min_rssi: u32,
    /// Strongest signal seen this call.
    pub max_rssi: u32,
    /// Accumulated RSSI for averaging.
    pub ave_rssi: u32,
    /// Number of RSSI samples this call.
    pub rssi_count: u32,
}

impl CoreState {
    fn new(
        config: Config,
        site: SiteData,
        acl: AccessControl,
        rssi_map: RssiInterpolator,
    ) -> CoreState {
        let queue = FrameRing::new(config.queue_size);
        let rf_timeout = Timer::new(config.timeout_ms);
        let net_timeout = Timer::new(config.timeout_ms);
        let rf_tg_hang = Timer::new(config.tg_hang_ms);

        CoreState {
            config,
            site,
            acl,
            affiliations: Affiliations::new(),
            queue,
            rssi_map,
            rf_state: RfState::Listening,
            net_state: NetState::Idle,
            rf_last_lich: Lich::default(),
            rf_lc: RtchLc::new(),
            net_lc: RtchLc::new(),
            rf_mask: 0,
            net_mask: 0,
            rf_last_dst_id: 0,
            net_last_dst_id: 0,
            permitted_dst_id: 0,
            rf_timeout,
            net_timeout,
            rf_tg_hang,
            network_watchdog: Timer::new(NET_WATCHDOG_MS),
            cc_packet_interval: Timer::new(CC_INTERVAL_MS),
            cc_running: false,
            cc_prev_running: false,
            cc_halted: false,
            cc_frame_cnt: 0,
            cc_seq: 0,
            rssi: 0,
            min_rssi: 0,
            max_rssi: 0,
            ave_rssi: 0,
            rssi_count: 0,
        }
    }

    /// Queue an outbound frame for the modem, dropping it once the owning side has
    /// timed out. An RF-origin overflow grows the queue once and drops the frame; a
    /// network-origin overflow only drops.
    pub fn add_frame(&mut self, data: &[u8], net: bool) {
        if !net {
            if self.rf_timeout.is_running() && self.rf_timeout.has_expired() {
                return;
            }
        } else if self.net_timeout.is_running() && self.net_timeout.has_expired() {
            return;
        }

        let space = self.queue.free_space();
        if space < data.len() + 1 {
            if !net {
                let capacity = self.queue.capacity();
                self.queue.resize(capacity + FRAME_LENGTH_BYTES);
                log::error!(
                    target: "nxdn",
                    "overflow in the frame queue while writing data; free was {}, needed {}, capacity now {}",
                    space,
                    data.len() + 1,
                    self.queue.capacity()
                );
            } else {
                log::error!(
                    target: "nxdn",
                    "overflow in the frame queue while writing network data; free is {}, needed {}",
                    space,
                    data.len() + 1
                );
            }

            return;
        }

        let _ = self.queue.add(data);
    }

    /// Tear down the RF side and return to listening.
    pub fn end_rf(&mut self, host: &mut dyn HostInterface) {
        self.rf_state = RfState::Listening;
        self.rf_mask = 0;
        self.rf_lc.reset();
        self.rf_timeout.stop();
        self.rf_tg_hang.start();

        host.reset_net();
    }

    /// Tear down the network side and return to idle.
    pub fn end_net(&mut self, host: &mut dyn HostInterface) {
        self.net_state = NetState::Idle;
        self.net_mask = 0;
        self.net_lc.reset();
        self.net_timeout.stop();
        self.network_watchdog.stop();

        host.reset_net();
    }

    /// Clear any out-of-band permits for the given released grants.
    pub fn notify_releases(
        &mut self,
        host: &mut dyn HostInterface,
        releases: &[GrantRelease],
    ) {
        if !(self.config.authoritative && self.config.supervisor) {
            return;
        }

        for release in releases {
            if release.ch_no != self.site.channel_no() {
                host.permit_ch(release.ch_no, 0);
            }
        }
    }
}

/// The NXDN protocol core.
pub struct Control {
    state: CoreState,
    voice: Voice,
    data: DataHandler,
    trunk: Trunk,
}

impl Control {
    /// Create a new `Control` from the given configuration snapshots and AMBE
    /// regenerator.
    pub fn new(
        config: Config,
        site: SiteData,
        acl: AccessControl,
        rssi_map: RssiInterpolator,
        ambe: Box<dyn AmbeFec>,
    ) -> Control {
        let silence_threshold = config.silence_threshold;

        Control {
            state: CoreState::new(config, site, acl, rssi_map),
            voice: Voice::new(ambe, silence_threshold),
            data: DataHandler::new(),
            trunk: Trunk::new(),
        }
    }

    /// Shared core state, exposed for host status surfaces and tests.
    pub fn state(&self) -> &CoreState {
        &self.state
    }

    /// Mutable core state, exposed for host configuration of the channel pool.
    pub fn state_mut(&mut self) -> &mut CoreState {
        &mut self.state
    }

    /// Process one frame delivered by the modem. The buffer layout is
    /// `[tag, flag, payload[48], rssi[0..2]]`; the payload is descrambled in place.
    pub fn process_rf(&mut self, data: &mut [u8], host: &mut dyn HostInterface) -> bool {
        let state = &mut self.state;

        if data.is_empty() {
            return false;
        }

        let tag = data[0];

        if tag == TAG_LOST && state.rf_state == RfState::Audio {
            let frames = self.voice.rf_frames.max(1);
            let ber = self.voice.rf_errs as f32 * 100.0 / self.voice.rf_bits as f32;

            if state.rssi != 0 && state.rssi_count > 0 {
                info!(
                    target: "activity",
                    "NXDN, RF, transmission lost, duration = {:.1}s, BER = {:.1}%, RSSI = -{}/-{}/-{} dBm",
                    frames as f32 / 12.5,
                    ber,
                    state.min_rssi,
                    state.max_rssi,
                    state.ave_rssi / state.rssi_count
                );
            } else {
                info!(
                    target: "activity",
                    "NXDN, RF, transmission lost, duration = {:.1}s, BER = {:.1}%",
                    frames as f32 / 12.5,
                    ber
                );
            }

            if state.config.control {
                let dst_id = state.rf_lc.dst_id;
                if let Some(release) = state.affiliations.release_grant(dst_id, false) {
                    state.notify_releases(host, &[release]);
                }
            }

            state.end_rf(host);
            return false;
        }

        if tag == TAG_LOST && state.rf_state == RfState::Data {
            state.end_rf(host);
            return false;
        }

        if tag == TAG_LOST {
            state.rf_state = RfState::Listening;
            state.rf_mask = 0;
            state.rf_lc.reset();
            return false;
        }

        if data.len() < FRAME_BUF_BYTES {
            warn!(target: "rf", "NXDN, malformed frame, len = {}", data.len());
            return false;
        }

        // Raw RSSI bytes on the end?
        if data.len() == FRAME_BUF_RSSI_BYTES {
            let raw = (data[FRAME_BUF_BYTES] as u16) << 8 | data[FRAME_BUF_BYTES + 1] as u16;
            let dbm = state.rssi_map.interpolate(raw);

            // RSSI is tracked as a positive magnitude.
            state.rssi = dbm.unsigned_abs();

            if state.rssi > state.min_rssi {
                state.min_rssi = state.rssi;
            }
            if state.rssi < state.max_rssi {
                state.max_rssi = state.rssi;
            }

            state.ave_rssi += state.rssi;
            state.rssi_count += 1;
        }

        // When the modem didn't flag sync while we're listening, scrutinize the sync
        // word bit for bit.
        let synced = data[1] == 0x01;
        if !synced && state.rf_state == RfState::Listening {
            let errs = sync::fsw_errors(&data[FRAME_META_BYTES..]);
            if errs > 0 {
                warn!(target: "rf", "NXDN, possible sync word rejected, errs = {}", errs);
                return false;
            }
        }

        scramble(&mut data[FRAME_META_BYTES..]);

        match Lich::decode(&data[FRAME_META_BYTES..]) {
            Ok(lich) => state.rf_last_lich = lich,
            Err(_) if state.rf_state == RfState::Listening => {
                debug!(target: "rf", "NXDN, invalid LICH while listening, dropping frame");
                return false;
            }
            // Mid-call, fall back to the last valid LICH.
            Err(_) => {}
        }

        let lich = state.rf_last_lich;

        // Inbound traffic other than a CAC pauses a running CC broadcast.
        if state.cc_running
            && lich.fct != LICH_CAC_INBOUND_SHORT
            && lich.fct != LICH_CAC_INBOUND_LONG
        {
            state.cc_halted = true;
        }

        match lich.rfct {
            RfChannelType::Rcch => self.trunk.process_rf(state, host, data),
            RfChannelType::Rtch | RfChannelType::Rdch => {
                let repeat_allowed = !state.config.dedicated_control
                    || (state.config.voice_on_control
                        && state.affiliations.is_ch_busy(state.site.channel_no()));

                if !repeat_allowed {
                    return false;
                }

                if lich.fct == LICH_USC_UDCH {
                    self.data.process_rf(state, host, lich.option, data)
                } else {
                    self.voice
                        .process_rf(state, host, lich.fct, lich.option, data)
                }
            }
            RfChannelType::RtchC => false,
        }
    }

    /// Process one pre-demodulated frame delivered by the peer network, along with the
    /// link control the network layer decoded for it.
    pub fn process_net(
        &mut self,
        lc: &RtchLc,
        data: &mut [u8],
        host: &mut dyn HostInterface,
    ) -> bool {
        let state = &mut self.state;

        // An RF call owns the repeater; queue nothing from the network.
        if state.rf_state != RfState::Listening && state.net_state == NetState::Idle {
            return false;
        }

        if data.len() < FRAME_BUF_BYTES {
            warn!(target: "net", "NXDN, invalid network frame, len = {}", data.len());
            state.end_net(host);
            return false;
        }

        state.network_watchdog.start();

        scramble(&mut data[FRAME_META_BYTES..]);

        match Lich::decode(&data[FRAME_META_BYTES..]) {
            Ok(lich) => state.rf_last_lich = lich,
            Err(_) => {
                warn!(target: "net", "NXDN, invalid network frame, undecodable LICH");
                state.end_net(host);
                return false;
            }
        }

        let lich = state.rf_last_lich;

        if lich.fct == LICH_USC_UDCH {
            self.data.process_net(state, host, lich.option, lc, data)
        } else {
            self.voice
                .process_net(state, host, lich.fct, lich.option, lc, data)
        }
    }

    /// Advance all timers by the given number of milliseconds and service the control
    /// channel cadence.
    pub fn clock(&mut self, ms: u32, host: &mut dyn HostInterface) {
        let state = &mut self.state;

        state.site.set_net_active(host.net_active());

        // Clock the CC broadcast cadence.
        if state.config.control {
            if state.cc_running && !state.cc_packet_interval.is_running() {
                state.cc_packet_interval.start();
            }

            if state.cc_halted {
                if !state.cc_running {
                    state.cc_halted = false;
                    state.cc_prev_running = state.cc_running;
                }

                // A halted CC resumes once both sides are quiet again.
                if state.rf_state == RfState::Listening && state.net_state == NetState::Idle {
                    state.cc_halted = false;
                }
            } else {
                state.cc_packet_interval.clock(ms);

                if state.cc_packet_interval.has_expired() {
                    if state.cc_running {
                        self.write_control_data();
                    }

                    self.state.cc_packet_interval.start();
                }
            }

            let state = &mut self.state;
            if state.cc_prev_running && !state.cc_running {
                state.queue.clear();
                state.cc_packet_interval.stop();
                state.cc_prev_running = state.cc_running;
            }
        }

        let state = &mut self.state;

        // Call timeouts.
        state.rf_timeout.clock(ms);
        state.net_timeout.clock(ms);

        if state.rf_timeout.has_expired() && state.rf_state == RfState::Audio {
            warn!(target: "rf", "NXDN, call timeout, dstId = {}", state.rf_lc.dst_id);
            info!(
                target: "activity",
                "NXDN, RF, transmission timed out, duration = {:.1}s",
                self.voice.rf_frames as f32 / 12.5
            );

            if state.config.control {
                let dst_id = state.rf_lc.dst_id;
                if let Some(release) = state.affiliations.release_grant(dst_id, false) {
                    state.notify_releases(host, &[release]);
                }
            }

            state.end_rf(host);
        }

        let state = &mut self.state;
        if state.net_timeout.has_expired() && state.net_state == NetState::Audio {
            warn!(target: "net", "NXDN, call timeout, dstId = {}", state.net_lc.dst_id);
            state.end_net(host);
        }

        // Talkgroup hang.
        let state = &mut self.state;
        if state.rf_tg_hang.is_running() {
            state.rf_tg_hang.clock(ms);

            if state.rf_tg_hang.has_expired() {
                state.rf_tg_hang.stop();
                debug!(
                    target: "rf",
                    "talkgroup hang has expired, lastDstId = {}",
                    state.rf_last_dst_id
                );
                state.rf_last_dst_id = 0;

                if !state.config.authoritative && state.permitted_dst_id != 0 {
                    state.permitted_dst_id = 0;
                }
            }
        }

        // Network watchdog.
        if state.net_state == NetState::Audio {
            state.network_watchdog.clock(ms);

            if state.network_watchdog.has_expired() {
                let frames = self.voice.net_frames;
                let loss = if frames > 0 {
                    self.voice.net_lost * 100 / frames
                } else {
                    0
                };

                info!(
                    target: "activity",
                    "NXDN, NET, network watchdog expired, duration = {:.1}s, loss = {}%",
                    frames as f32 / 50.0,
                    loss
                );

                state.network_watchdog.stop();

                if state.config.control {
                    let dst_id = state.net_lc.dst_id;
                    if let Some(release) = state.affiliations.release_grant(dst_id, false) {
                        state.notify_releases(host, &[release]);
                    }
                }

                state.end_net(host);
            }
        }

        // Recover from a rejected request.
        let state = &mut self.state;
        if state.rf_state == RfState::Rejected {
            state.queue.clear();

            self.voice.reset_rf();
            self.voice.reset_net();
            self.data.reset_rf();

            host.reset_net();

            state.rf_state = RfState::Listening;
        }

        // Grant expiry.
        let state = &mut self.state;
        if state.config.control {
            let releases = state.affiliations.clock(ms);
            state.notify_releases(host, &releases);
        }
    }

    /// Write the next control channel broadcast frame when the channel is quiet.
    /// Returns whether a frame was queued.
    pub fn write_control_data(&mut self) -> bool {
        let state = &mut self.state;

        if !state.config.control {
            return false;
        }

        if state.cc_frame_cnt == 254 {
            state.cc_frame_cnt = 0;
        }

        // Don't add any frames if the queue is full.
        if state.queue.free_space() < FRAME_BUF_BYTES + 1 {
            return false;
        }

        let max_seq = state.config.superframe.max_seq();
        if state.cc_seq >= max_seq {
            state.cc_seq = 0;
        }

        if state.net_state == NetState::Idle && state.rf_state == RfState::Listening {
            let frame_cnt = state.cc_frame_cnt;
            let seq = state.cc_seq;
            self.trunk.write_cc_frame(state, frame_cnt, seq);

            state.cc_seq += 1;
            if state.cc_seq == max_seq {
                state.cc_frame_cnt = state.cc_frame_cnt.wrapping_add(1);
            }

            return true;
        }

        false
    }

    /// Pop the next outbound frame into `data`, returning its length (zero when the
    /// queue is empty.)
    pub fn get_frame(&mut self, data: &mut [u8]) -> usize {
        self.state.queue.get(data).unwrap_or(0)
    }

    /// Whether either side is busy with a call.
    pub fn is_busy(&self) -> bool {
        self.state.rf_state != RfState::Listening || self.state.net_state != NetState::Idle
    }

    /// Enable or disable the control channel broadcast.
    pub fn set_cc_running(&mut self, running: bool) {
        self.state.cc_prev_running = self.state.cc_running;
        self.state.cc_running = running;
    }

    /// Issue a grant for a network or administrative demand.
    pub fn grant_tg(
        &mut self,
        src_id: u16,
        dst_id: u16,
        unit_to_unit: bool,
        host: &mut dyn HostInterface,
    ) -> bool {
        self.trunk
            .grant_demand(&mut self.state, host, src_id, dst_id, unit_to_unit)
    }

    /// Permit a talkgroup on a non-authoritative host.
    pub fn permit_tg(&mut self, dst_id: u16) {
        if self.state.config.authoritative {
            return;
        }

        self.state.permitted_dst_id = dst_id;
    }

    /// Change the supervisor flag (admin surface.)
    pub fn set_supervisor(&mut self, supervisor: bool) {
        self.state.config.supervisor = supervisor;
    }

    /// Release every channel grant (admin surface.)
    pub fn release_grants(&mut self, host: &mut dyn HostInterface) {
        let releases = self.state.affiliations.release_all_grants();
        self.state.notify_releases(host, &releases);
    }

    /// Drop every affiliation and registration (admin surface.)
    pub fn release_affiliations(&mut self) {
        self.state.affiliations.clear_affiliations();
    }

    /// Reset both sides of the core to their idle states.
    pub fn reset(&mut self) {
        let state = &mut self.state;

        state.rf_state = RfState::Listening;
        state.cc_halted = false;

        self.voice.reset_rf();
        self.data.reset_rf();

        state.queue.clear();
        state.rf_mask = 0;
        state.rf_lc.reset();

        state.net_state = NetState::Idle;
        state.net_mask = 0;
        state.net_lc.reset();
    }
}
