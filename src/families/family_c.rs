//! Family C: 9-byte XOR-checksummed control frames plus an independent
//! 1 Hz heartbeat, and an RTSP video feed decoded by an external backend.

use std::time::Duration;

use crate::stick::{StickModel, StickRange};
use crate::video::VideoFrame;

pub const STICK_RANGE: StickRange = StickRange { min: 50.0, mid: 128.0, max: 200.0 };

const PREFIX: u8 = 0x03;
const START_MARKER: u8 = 0x66;
const END_MARKER: u8 = 0x99;

const FLAG_TAKEOFF: u8 = 0x01;
const FLAG_LAND: u8 = 0x02;
const FLAG_STOP: u8 = 0x04;
const FLAG_FLIP: u8 = 0x08;
const FLAG_HEADLESS: u8 = 0x10;
const FLAG_CALIBRATE: u8 = 0x80;

pub const HEARTBEAT: [u8; 2] = [0x01, 0x01];
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Encodes a 9-byte control frame and clears the model's one-shot flags.
pub fn encode_control(model: &mut StickModel) -> [u8; 9] {
    let (throttle, yaw, pitch, roll) = model.raw();

    let mut flags = 0u8;
    if model.flags.takeoff {
        flags |= FLAG_TAKEOFF;
    }
    if model.flags.land {
        flags |= FLAG_LAND;
    }
    if model.flags.emergency_stop {
        flags |= FLAG_STOP;
    }
    if model.flags.flip {
        flags |= FLAG_FLIP;
    }
    if model.headless() {
        flags |= FLAG_HEADLESS;
    }
    if model.flags.calibrate {
        flags |= FLAG_CALIBRATE;
    }

    let mut pkt = [0u8; 9];
    pkt[0] = PREFIX;
    pkt[1] = START_MARKER;
    // cast truncates toward zero, matching the reference encoder's `int(...)`
    pkt[2] = roll.clamp(0.0, 255.0) as u8;
    pkt[3] = pitch.clamp(0.0, 255.0) as u8;
    pkt[4] = throttle.clamp(0.0, 255.0) as u8;
    pkt[5] = yaw.clamp(0.0, 255.0) as u8;
    pkt[6] = flags;
    pkt[7] = pkt[2..7].iter().fold(0u8, |acc, b| acc ^ b);
    pkt[8] = END_MARKER;

    model.clear_one_shots();
    pkt
}

/// Decoded-and-re-encoded JPEG frames arrive through this capability.
/// Demuxing and H.264/RTSP decoding are delegated outside this crate (an
/// explicit non-goal); re-encoding an already-decoded frame to JPEG is the
/// in-scope bookkeeping step this trait's implementor performs.
pub trait RtspBackend: Send {
    fn open(&mut self, url: &str) -> bool;
    fn read_jpeg_frame(&mut self) -> Option<Vec<u8>>;
    fn close(&mut self);
}

pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

pub fn rtsp_url(drone_ip: &str, video_port: u16) -> String {
    format!("rtsp://{drone_ip}:{video_port}/webcam")
}

/// Wraps a raw JPEG byte buffer from the backend with a monotonic id; the
/// backend already performs the real reassembly work (demux + decode).
pub fn wrap_frame(frame_id: u16, jpeg_bytes: Vec<u8>) -> VideoFrame {
    VideoFrame::new(frame_id, jpeg_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> StickModel {
        StickModel::new(STICK_RANGE)
    }

    #[test]
    fn neutral_heartbeat_packet_matches_reference_bytes() {
        let mut m = model();
        let pkt = encode_control(&mut m);
        assert_eq!(pkt, [0x03, 0x66, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00, 0x99]);
    }

    #[test]
    fn flags_byte_combines_active_commands() {
        let mut m = model();
        m.flip();
        m.toggle_headless();
        let pkt = encode_control(&mut m);
        assert_eq!(pkt[6], FLAG_FLIP | FLAG_HEADLESS);
        assert!(!m.flags.flip);
        assert!(m.headless(), "headless persists across packets");
    }

    #[test]
    fn checksum_covers_bytes_2_through_6() {
        let mut m = model();
        m.takeoff();
        let pkt = encode_control(&mut m);
        let expected = pkt[2..7].iter().fold(0u8, |acc, b| acc ^ b);
        assert_eq!(pkt[7], expected);
        assert_eq!(pkt[0], 0x03);
        assert_eq!(pkt[8], 0x99);
    }

    #[test]
    fn rtsp_url_uses_webcam_path() {
        assert_eq!(rtsp_url("192.168.1.1", 7070), "rtsp://192.168.1.1:7070/webcam");
    }
}
