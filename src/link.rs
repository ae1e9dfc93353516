//! Packet layer: frame transmission with the ACK/NAK handshake and frame reception.
//!
//! A transfer has three phases:
//!
//! ```text
//! Channel analysis   Transmission                            Response
//!     _____           _____________________________           _____
//!    | C-A |         | ID | LENGTH | CONTENT | CRC |         | ACK |
//! <--|-----|---------|----|--------|---------|-----|--> <----|-----|
//!    |  0  |         | 12 |   5    |   HI    |  8  |         |  6  |
//!    |_____|         |____|________|_________|_____|         |_____|
//! ```
//!
//! Broadcast frames and simplex links skip the response phase.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Vec;

use crate::cipher::Cipher;
use crate::config::BusConfig;
use crate::consts::{ACK, BROADCAST_ADDRESS, MAX_FRAME_LEN, NAK};
use crate::frame::{FrameReader, ReadProgress, build_frame};
use crate::modem::Modem;
use crate::timer::{MicrosClock, elapsed_us};

/// Outcome of a single frame transmission or reception.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Response {
    /// Delivered and acknowledged, or sent where no acknowledgement is expected.
    Ack,
    /// The receiver saw a checksum mismatch.
    Nak,
    /// No valid frame or response.
    Fail,
    /// The channel was occupied, or the frame was addressed elsewhere.
    Busy,
}

impl Response {
    /// Maps a response byte read off the line.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ACK => Some(Self::Ack),
            NAK => Some(Self::Nak),
            _ => None,
        }
    }
}

/// Running counters kept by a [`Link`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct LinkStats {
    /// Frames acknowledged, or sent without an acknowledgement being expected.
    pub tx_ack: u16,
    /// Frames the receiver rejected with `NAK`.
    pub tx_nak: u16,
    /// Frames that got no response in time.
    pub tx_fail: u16,
    /// Transmissions skipped because the channel was busy.
    pub tx_busy: u16,
    /// Frames received with a valid checksum.
    pub rx_good: u16,
    /// Frames dropped for a bad checksum, a bad length or a missing byte.
    pub rx_bad: u16,
}

/// Anything the send queue can hand a frame to.
pub trait Transmit {
    /// Sends one frame and reports what happened.
    fn transmit(&mut self, destination: u8, payload: &[u8]) -> Response;

    /// Reads the microsecond counter used for scheduling.
    fn now_us(&mut self) -> u32;
}

/// Frame-level endpoint on top of a [`Modem`].
#[derive(Debug)]
pub struct Link<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    /// Physical layer
    pub modem: Modem<TX, RX, CLK, D>,
    config: BusConfig,
    stats: LinkStats,
}

impl<TX, RX, CLK, D> Link<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    /// Wraps `modem`, applying the timing from `config`.
    pub fn new(mut modem: Modem<TX, RX, CLK, D>, config: BusConfig) -> Self {
        modem.set_timing(config.timing);
        Self {
            modem,
            config,
            stats: LinkStats::default(),
        }
    }

    /// Active settings.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Replaces the settings.
    pub fn set_config(&mut self, config: BusConfig) {
        self.modem.set_timing(config.timing);
        self.config = config;
    }

    /// Changes this node's address.
    pub fn set_address(&mut self, address: u8) {
        self.config.address = address;
    }

    /// Counters since creation.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn cipher(&self) -> Cipher<'static> {
        Cipher::new(self.config.key)
    }

    fn expects_response(&self, destination: u8) -> bool {
        destination != BROADCAST_ADDRESS && self.config.is_acknowledged()
    }

    /// Checks whether the channel is idle, see [`Modem::can_start`].
    pub fn can_start(&mut self) -> bool {
        self.modem.can_start()
    }

    /// Sends `payload` to `destination` and waits for the response when one is expected.
    ///
    /// The payload is copied and enciphered in a scratch buffer, so every call
    /// draws a fresh IV and the caller's bytes are never touched.
    ///
    /// # Returns
    /// - [`Response::Busy`]: collision avoidance found the channel occupied, nothing was sent
    /// - [`Response::Ack`]: acknowledged, or broadcast, or simplex link
    /// - [`Response::Nak`]: the receiver saw a corrupted frame
    /// - [`Response::Fail`]: no response in time, or the payload does not fit a frame
    pub fn send_frame(&mut self, destination: u8, payload: &[u8]) -> Response {
        if self.config.collision_avoidance && !self.modem.can_start() {
            debug!("channel busy, frame to {} deferred", destination);
            self.stats.tx_busy = self.stats.tx_busy.wrapping_add(1);
            return Response::Busy;
        }

        let Ok(mut body) = Vec::<u8, MAX_FRAME_LEN>::from_slice(payload) else {
            warn!("payload of {} bytes does not fit a frame", payload.len());
            return Response::Fail;
        };
        if self.config.encryption {
            let cipher = self.cipher();
            if let Err(error) = cipher.encode(&mut body, &mut self.modem.clock) {
                warn!("cannot encipher frame: {}", error);
                return Response::Fail;
            }
        }
        let frame = match build_frame(destination, &body) {
            Ok(frame) => frame,
            Err(error) => {
                warn!("cannot build frame: {}", error);
                return Response::Fail;
            }
        };

        for byte in frame.iter() {
            self.modem.send_byte(*byte);
        }
        self.modem.release();

        if !self.expects_response(destination) {
            self.stats.tx_ack = self.stats.tx_ack.wrapping_add(1);
            return Response::Ack;
        }

        let response = self.await_response();
        match response {
            Response::Ack => self.stats.tx_ack = self.stats.tx_ack.wrapping_add(1),
            Response::Nak => {
                debug!("frame to {} rejected", destination);
                self.stats.tx_nak = self.stats.tx_nak.wrapping_add(1);
            }
            _ => {
                debug!("no response from {}", destination);
                self.stats.tx_fail = self.stats.tx_fail.wrapping_add(1);
            }
        }
        response
    }

    fn await_response(&mut self) -> Response {
        let window = self.config.timing.response_window_us();
        let start = self.modem.now_us();
        while elapsed_us(start, self.modem.now_us()) < window {
            if let Some(response) = self.modem.receive_byte().and_then(Response::from_byte) {
                return response;
            }
        }
        Response::Fail
    }

    /// Calls [`send_frame()`](Link::send_frame) until it returns `Ack`, at most `count` times.
    pub fn send_with_retries(&mut self, destination: u8, payload: &[u8], count: u8) -> Response {
        let mut response = Response::Fail;
        for _ in 0..count {
            response = self.send_frame(destination, payload);
            if response == Response::Ack {
                break;
            }
        }
        response
    }

    fn respond(&mut self, byte: u8) {
        self.modem.send_byte(byte);
        self.modem.release();
    }

    fn reject(&mut self) -> Response {
        self.stats.rx_bad = self.stats.rx_bad.wrapping_add(1);
        Response::Fail
    }

    /// Tries to receive one frame.
    ///
    /// Returns as soon as the outcome is known: `Busy` right after the address byte
    /// of a frame meant for another node, `Fail` on the first byte that does not
    /// arrive. A valid frame is deciphered, acknowledged when expected and handed to
    /// `on_receive` before this returns `Ack`. A corrupted one is answered with `NAK`
    /// when expected and returns `Nak`.
    pub fn receive_frame<F>(&mut self, mut on_receive: F) -> Response
    where
        F: FnMut(&[u8]),
    {
        let mut reader = FrameReader::new(self.config.address, self.config.frame_overhead());
        loop {
            let Some(byte) = self.modem.receive_byte() else {
                return if reader.bytes().is_empty() {
                    Response::Fail
                } else {
                    debug!("frame truncated after {} bytes", reader.bytes().len());
                    self.reject()
                };
            };
            match reader.push(byte) {
                ReadProgress::Pending => {}
                ReadProgress::Foreign => return Response::Busy,
                ReadProgress::Malformed => {
                    debug!("frame with impossible length dropped");
                    return self.reject();
                }
                ReadProgress::Corrupted => {
                    warn!("checksum mismatch in a {} byte frame", reader.bytes().len());
                    self.stats.rx_bad = self.stats.rx_bad.wrapping_add(1);
                    if !reader.is_broadcast() && self.config.is_acknowledged() {
                        self.respond(NAK);
                    }
                    return Response::Nak;
                }
                ReadProgress::Complete => break,
            }
        }

        let Ok(mut payload) = Vec::<u8, MAX_FRAME_LEN>::from_slice(reader.body()) else {
            return self.reject();
        };
        if self.config.encryption && self.cipher().decode(&mut payload).is_none() {
            return self.reject();
        }
        if !reader.is_broadcast() && self.config.is_acknowledged() {
            self.respond(ACK);
        }
        self.stats.rx_good = self.stats.rx_good.wrapping_add(1);
        on_receive(payload.as_slice());
        Response::Ack
    }

    /// Calls [`receive_frame()`](Link::receive_frame) until a frame is accepted or
    /// `duration_us` has passed, and returns the last outcome.
    pub fn receive_for<F>(&mut self, duration_us: u32, mut on_receive: F) -> Response
    where
        F: FnMut(&[u8]),
    {
        let mut response = Response::Fail;
        let start = self.modem.now_us();
        while elapsed_us(start, self.modem.now_us()) < duration_us {
            response = self.receive_frame(&mut on_receive);
            if response == Response::Ack {
                break;
            }
        }
        response
    }
}

impl<TX, RX, CLK, D> Transmit for Link<TX, RX, CLK, D>
where
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
    D: DelayNs,
{
    fn transmit(&mut self, destination: u8, payload: &[u8]) -> Response {
        self.send_frame(destination, payload)
    }

    fn now_us(&mut self) -> u32 {
        self.modem.now_us()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::testing::{SimAir, SimModem, decode_wave};

    type SimLink = Link<
        crate::testing::WaveTx,
        crate::testing::WaveRx,
        crate::testing::TickClock,
        crate::testing::SimDelay,
    >;

    fn link(air: &SimAir, config: BusConfig) -> SimLink {
        Link::new(air.modem(config.timing), config)
    }

    fn quiet(address: u8) -> BusConfig {
        let mut config = BusConfig::new(address);
        config.collision_avoidance = false;
        config
    }

    fn encrypted(mut config: BusConfig) -> BusConfig {
        config.encryption = true;
        config
    }

    /// TX records written by a collision-avoiding sender before it starts listening:
    /// the initial release, the flush pulse, ten per byte and the final release.
    fn records_for(frame_len: usize) -> usize {
        1 + 1 + frame_len * 10 + 1
    }

    fn receive(air: &SimAir, config: BusConfig) -> (Response, std::vec::Vec<u8>, SimLink) {
        let mut receiver = link(air, config);
        let mut delivered = std::vec::Vec::new();
        let response = receiver.receive_frame(|payload| delivered.extend_from_slice(payload));
        (response, delivered, receiver)
    }

    #[test]
    fn test_response_bytes() {
        assert_eq!(Response::from_byte(ACK), Some(Response::Ack));
        assert_eq!(Response::from_byte(NAK), Some(Response::Nak));
        assert_eq!(Response::from_byte(0), None);
    }

    #[test]
    fn test_unicast_frame_is_delivered_and_acknowledged() {
        let air = SimAir::new();
        let mut sender = link(&air, BusConfig::new(1));
        // nobody answers the sender
        assert_eq!(sender.send_frame(12, b"HI"), Response::Fail);
        assert_eq!(sender.stats().tx_fail, 1);

        let rx_air = air.replay();
        let (response, delivered, receiver) = receive(&rx_air, BusConfig::new(12));
        assert_eq!(response, Response::Ack);
        assert_eq!(delivered, b"HI");
        assert_eq!(receiver.stats().rx_good, 1);
        assert_eq!(decode_wave(rx_air.outgoing()), [ACK]);
    }

    #[test]
    fn test_sender_reads_ack() {
        let air = SimAir::new().respond_with(&[ACK], records_for(5), 120);
        let mut sender = link(&air, BusConfig::new(1));
        assert_eq!(sender.send_frame(12, b"HI"), Response::Ack);
        assert_eq!(sender.stats().tx_ack, 1);
    }

    #[test]
    fn test_sender_reads_nak() {
        let air = SimAir::new().respond_with(&[NAK], records_for(5), 120);
        let mut sender = link(&air, BusConfig::new(1));
        assert_eq!(sender.send_frame(12, b"HI"), Response::Nak);
        assert_eq!(sender.stats().tx_nak, 1);
    }

    #[test]
    fn test_response_after_window_is_ignored() {
        let window = Timing::default().response_window_us();
        let air = SimAir::new().respond_with(&[ACK], records_for(5), window + 400);
        let mut sender = link(&air, BusConfig::new(1));
        assert_eq!(sender.send_frame(12, b"HI"), Response::Fail);
    }

    #[test]
    fn test_busy_channel_defers_transmission() {
        let air = SimAir::new();
        air.drive(0, true);
        let mut sender = link(&air, BusConfig::new(1));
        assert_eq!(sender.send_frame(12, b"HI"), Response::Busy);
        assert_eq!(air.outgoing().first_rise(), None);
        assert_eq!(sender.stats().tx_busy, 1);
    }

    #[test]
    fn test_corrupted_frame_is_answered_with_nak() {
        let air = SimAir::new();
        let mut frame = build_frame(12, b"HI").unwrap();
        frame[2] ^= 0b0000_0100;
        transmit_raw(&air, &frame);

        let rx_air = air.replay();
        let (response, delivered, receiver) = receive(&rx_air, BusConfig::new(12));
        assert_eq!(response, Response::Nak);
        assert!(delivered.is_empty());
        assert_eq!(receiver.stats().rx_bad, 1);
        assert_eq!(decode_wave(rx_air.outgoing()), [NAK]);
    }

    #[test]
    fn test_foreign_frame_releases_channel() {
        let air = SimAir::new();
        let mut sender = link(&air, quiet(1));
        let _ = sender.send_frame(40, b"elsewhere");

        let rx_air = air.replay();
        let (response, delivered, _) = receive(&rx_air, BusConfig::new(41));
        assert_eq!(response, Response::Busy);
        assert!(delivered.is_empty());
        assert!(decode_wave(rx_air.outgoing()).is_empty());
    }

    #[test]
    fn test_broadcast_is_not_acknowledged() {
        let air = SimAir::new();
        let mut sender = link(&air, BusConfig::new(1));
        assert_eq!(sender.send_frame(BROADCAST_ADDRESS, b"all"), Response::Ack);

        let rx_air = air.replay();
        let (response, delivered, _) = receive(&rx_air, BusConfig::new(77));
        assert_eq!(response, Response::Ack);
        assert_eq!(delivered, b"all");
        assert!(decode_wave(rx_air.outgoing()).is_empty());
    }

    #[test]
    fn test_encrypted_broadcast_round_trip() {
        let air = SimAir::new();
        let mut sender = link(&air, encrypted(BusConfig::new(1)));
        assert_eq!(sender.send_frame(BROADCAST_ADDRESS, b"secret"), Response::Ack);

        let wire = decode_wave(air.outgoing());
        // address, length, six payload bytes, IV, CRC
        assert_eq!(wire.len(), 10);
        assert_eq!(wire[1], 10);
        assert_ne!(&wire[2..8], b"secret");

        let rx_air = air.replay();
        let (response, delivered, _) = receive(&rx_air, encrypted(BusConfig::new(9)));
        assert_eq!(response, Response::Ack);
        assert_eq!(delivered, b"secret");
        assert!(decode_wave(rx_air.outgoing()).is_empty());
    }

    #[test]
    fn test_encrypted_unicast_round_trip() {
        let air = SimAir::new();
        let mut sender = link(&air, encrypted(quiet(1)));
        let _ = sender.send_frame(5, b"key material");

        let rx_air = air.replay();
        let (response, delivered, _) = receive(&rx_air, encrypted(BusConfig::new(5)));
        assert_eq!(response, Response::Ack);
        assert_eq!(delivered, b"key material");
        assert_eq!(decode_wave(rx_air.outgoing()), [ACK]);
    }

    #[test]
    fn test_simplex_sends_and_receives_without_response() {
        let air = SimAir::new();
        let mut sender = link(&air, BusConfig::simplex(1));
        assert_eq!(sender.send_frame(12, b"one way"), Response::Ack);

        let rx_air = air.replay();
        let (response, delivered, _) = receive(&rx_air, BusConfig::simplex(12));
        assert_eq!(response, Response::Ack);
        assert_eq!(delivered, b"one way");
        assert!(decode_wave(rx_air.outgoing()).is_empty());
    }

    #[test]
    fn test_receive_on_idle_line_fails_quickly() {
        let air = SimAir::new();
        let (response, _, receiver) = receive(&air, BusConfig::new(12));
        assert_eq!(response, Response::Fail);
        assert_eq!(receiver.stats().rx_bad, 0);
    }

    fn transmit_raw(air: &SimAir, bytes: &[u8]) {
        let mut raw: SimModem = air.modem(Timing::default());
        for byte in bytes {
            raw.send_byte(*byte);
        }
        raw.release();
    }

    #[test]
    fn test_truncated_frame_is_counted_as_bad() {
        let air = SimAir::new();
        let frame = build_frame(12, b"HELLO").unwrap();
        transmit_raw(&air, &frame[..4]);

        let rx_air = air.replay();
        let (response, delivered, receiver) = receive(&rx_air, BusConfig::new(12));
        assert_eq!(response, Response::Fail);
        assert!(delivered.is_empty());
        assert_eq!(receiver.stats().rx_bad, 1);
        assert!(decode_wave(rx_air.outgoing()).is_empty());
    }

    #[test]
    fn test_impossible_length_is_dropped() {
        let air = SimAir::new();
        transmit_raw(&air, &[12, 2, 0]);

        let rx_air = air.replay();
        let (response, delivered, receiver) = receive(&rx_air, BusConfig::new(12));
        assert_eq!(response, Response::Fail);
        assert!(delivered.is_empty());
        assert_eq!(receiver.stats().rx_bad, 1);
        assert!(decode_wave(rx_air.outgoing()).is_empty());
    }

    #[test]
    fn test_corrupted_broadcast_is_not_answered() {
        let air = SimAir::new();
        let mut frame = build_frame(BROADCAST_ADDRESS, b"HELLO").unwrap();
        frame[3] ^= 1;
        transmit_raw(&air, &frame);

        let rx_air = air.replay();
        let (response, delivered, receiver) = receive(&rx_air, BusConfig::new(12));
        assert_eq!(response, Response::Nak);
        assert!(delivered.is_empty());
        assert_eq!(receiver.stats().rx_bad, 1);
        assert!(decode_wave(rx_air.outgoing()).is_empty());
    }

    #[test]
    fn test_receive_for_waits_out_the_duration() {
        let air = SimAir::new();
        let mut receiver = link(&air, BusConfig::new(12));
        let start = air.now();
        let response = receiver.receive_for(5_000, |_| panic!("nothing was sent"));
        assert_eq!(response, Response::Fail);
        assert!(air.now() - start >= 5_000);
    }

    #[test]
    fn test_receive_for_returns_on_first_frame() {
        let air = SimAir::new();
        let mut sender = link(&air, BusConfig::new(1));
        let _ = sender.send_frame(BROADCAST_ADDRESS, b"first");
        let _ = sender.send_frame(BROADCAST_ADDRESS, b"second");

        let rx_air = air.replay();
        let mut receiver = link(&rx_air, BusConfig::new(3));
        let mut count = 0;
        let response = receiver.receive_for(1_000_000, |_| count += 1);
        assert_eq!(response, Response::Ack);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_send_with_retries_counts_attempts() {
        let air = SimAir::new();
        let mut sender = link(&air, quiet(1));
        assert_eq!(sender.send_with_retries(12, b"HI", 3), Response::Fail);
        assert_eq!(sender.stats().tx_fail, 3);
        assert_eq!(sender.send_with_retries(BROADCAST_ADDRESS, b"HI", 3), Response::Ack);
        assert_eq!(sender.stats().tx_ack, 1);
    }

    #[test]
    fn test_oversized_payload_fails_without_transmitting() {
        let air = SimAir::new();
        let mut sender = link(&air, quiet(1));
        let payload = [0u8; MAX_FRAME_LEN];
        assert_eq!(sender.send_frame(12, &payload), Response::Fail);
        assert_eq!(air.outgoing().first_rise(), None);
    }
}
