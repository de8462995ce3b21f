//! Family B: one duplex UDP socket serves both the RC transmitter and the
//! video receiver. Control frames carry three rolling 16-bit counters;
//! video frames are requested one at a time and arrive as fixed-offset
//! fragments with no JPEG header of their own.

use std::collections::BTreeMap;

use crate::jpeg;
use crate::stick::{StickModel, StickRange};
use crate::video::VideoFrame;

pub const STICK_RANGE: StickRange = StickRange { min: 40.0, mid: 128.0, max: 220.0 };

// Static parts reproduced verbatim on every control packet, taken 1:1 from
// packet captures. Offsets below are relative to the assembled buffer, not
// to these slices individually.
const HEADER: [u8; 12] = [0xef, 0x02, 0x7c, 0x00, 0x02, 0x02, 0x00, 0x01, 0x02, 0x00, 0x00, 0x00];
const COUNTER1_SUFFIX: [u8; 6] = [0x00, 0x00, 0x14, 0x00, 0x66, 0x14];
const CONTROL_SUFFIX: [u8; 10] = [0u8; 10];
const CHECKSUM_SUFFIX_HEAD: u8 = 0x99;
const CHECKSUM_SUFFIX_MID: [u8; 44] = [0u8; 44];
const CHECKSUM_SUFFIX_TAIL: [u8; 6] = [0x32, 0x4b, 0x14, 0x2d, 0x00, 0x00];
const COUNTER2_SUFFIX: [u8; 14] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00];
const COUNTER2_TAIL: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
const COUNTER3_SUFFIX: [u8; 12] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x10, 0x00];
const COUNTER3_TAIL: [u8; 2] = [0x00, 0x00];

/// Rolling counters carried on every control frame. Initial values observed
/// on the wire were `0, 1, 2`; each advances by one modulo 2^16 per send.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub c1: u16,
    pub c2: u16,
    pub c3: u16,
}

impl Counters {
    pub fn initial() -> Counters {
        Counters { c1: 0, c2: 1, c3: 2 }
    }

    fn advance(&mut self) {
        self.c1 = self.c1.wrapping_add(1);
        self.c2 = self.c2.wrapping_add(1);
        self.c3 = self.c3.wrapping_add(1);
    }
}

/// Encodes one control frame and advances `counters` by one. Clears the
/// model's one-shot flags except `headless`, which persists.
pub fn encode_control(model: &mut StickModel, counters: &mut Counters) -> Vec<u8> {
    let (throttle, yaw, pitch, roll) = model.raw();

    let command: u8 = if model.flags.takeoff {
        0x01
    } else if model.flags.emergency_stop || model.flags.land {
        0x02
    } else if model.flags.calibrate {
        0x04
    } else {
        0x00
    };
    let headless: u8 = if model.headless() { 0x03 } else { 0x02 };

    let controls = [roll as u8, pitch as u8, throttle as u8, yaw as u8, command, headless];
    let checksum = controls.iter().fold(0u8, |acc, b| acc ^ b);

    let mut pkt = Vec::with_capacity(124);
    pkt.extend_from_slice(&HEADER);
    pkt.extend_from_slice(&counters.c1.to_le_bytes());
    pkt.extend_from_slice(&COUNTER1_SUFFIX);
    pkt.extend_from_slice(&controls);
    pkt.extend_from_slice(&CONTROL_SUFFIX);
    pkt.push(checksum);
    pkt.push(CHECKSUM_SUFFIX_HEAD);
    pkt.extend_from_slice(&CHECKSUM_SUFFIX_MID);
    pkt.extend_from_slice(&CHECKSUM_SUFFIX_TAIL);
    pkt.extend_from_slice(&counters.c2.to_le_bytes());
    pkt.extend_from_slice(&COUNTER2_SUFFIX);
    pkt.extend_from_slice(&COUNTER2_TAIL);
    pkt.extend_from_slice(&counters.c3.to_le_bytes());
    pkt.extend_from_slice(&COUNTER3_SUFFIX);
    pkt.extend_from_slice(&COUNTER3_TAIL);

    counters.advance();
    model.clear_one_shots();
    pkt
}

/// Request datagrams are fixed-size templates with a little-endian frame id
/// patched in at known offsets. The exact filler bytes could not be
/// recovered bit-for-bit from available captures; see DESIGN.md for the
/// synthesis rationale. Offsets and overall shape follow the source exactly.
pub const START_STREAM: [u8; 16] = [0xef, 0x02, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

const REQUEST_A_TEMPLATE_LEN: usize = 16;
const REQUEST_B_TEMPLATE_LEN: usize = 112;

pub fn request_a(frame_id: u16) -> [u8; REQUEST_A_TEMPLATE_LEN] {
    let mut pkt = [0u8; REQUEST_A_TEMPLATE_LEN];
    pkt[0..4].copy_from_slice(&[0xef, 0x02, 0x01, 0x00]);
    let [lo, hi] = frame_id.to_le_bytes();
    pkt[12] = lo;
    pkt[13] = hi;
    pkt
}

pub fn request_b(frame_id: u16) -> [u8; REQUEST_B_TEMPLATE_LEN] {
    let mut pkt = [0u8; REQUEST_B_TEMPLATE_LEN];
    pkt[0..4].copy_from_slice(&[0xef, 0x02, 0x02, 0x00]);
    let [lo, hi] = frame_id.to_le_bytes();
    for base in [12usize, 88, 107] {
        pkt[base] = lo;
        pkt[base + 1] = hi;
    }
    pkt
}

const NOT_LAST_SENTINEL: u8 = 0x38;

/// Reassembles fragments belonging to one explicitly-requested frame id.
/// Packets for any other frame id are ignored outright (the drone replies
/// only to the most recently requested id, so a mismatch means a stray
/// retransmit rather than a new frame starting).
pub struct Reassembler {
    current_fid: u16,
    fragments: BTreeMap<u16, Vec<u8>>,
    jpeg_header: Vec<u8>,
}

impl Reassembler {
    pub fn new(jpeg_width: u16, jpeg_height: u16, components: u8) -> Reassembler {
        Reassembler {
            current_fid: 1,
            fragments: BTreeMap::new(),
            jpeg_header: jpeg::generate_jpeg_headers(jpeg_width, jpeg_height, components),
        }
    }

    pub fn current_frame_id(&self) -> u16 {
        self.current_fid
    }

    /// Abandons whatever fragments are in flight and starts requesting
    /// `frame_id` instead. Used after the retry budget for the current
    /// frame is exhausted.
    pub fn force_frame_id(&mut self, frame_id: u16) {
        self.fragments.clear();
        self.current_fid = frame_id;
    }

    /// Returns `Some(frame)` once the last fragment of the requested frame
    /// arrives. On completion the caller is expected to send the next
    /// `request_a`/`request_b` pair for `frame.frame_id`.
    pub fn ingest(&mut self, payload: &[u8]) -> Option<VideoFrame> {
        if payload.len() < 56 || payload[1] != 0x01 {
            return None;
        }
        let frame_id = u16::from_le_bytes([payload[16], payload[17]]);
        if frame_id != self.current_fid {
            return None;
        }
        let frag_id = u16::from_le_bytes([payload[32], payload[33]]);
        self.fragments.entry(frag_id).or_insert_with(|| payload[56..].to_vec());

        let is_last_fragment = payload[2] != NOT_LAST_SENTINEL;
        if !is_last_fragment {
            return None;
        }

        let mut jpeg_bytes = self.jpeg_header.clone();
        for frag in self.fragments.values() {
            jpeg_bytes.extend_from_slice(frag);
        }
        jpeg_bytes.extend_from_slice(&jpeg::EOI);

        self.fragments.clear();
        self.current_fid = frame_id.wrapping_add(1);

        Some(VideoFrame::new(frame_id, jpeg_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> StickModel {
        StickModel::new(STICK_RANGE)
    }

    #[test]
    fn counters_advance_by_one_each_packet() {
        let mut m = model();
        let mut c = Counters::initial();
        encode_control(&mut m, &mut c);
        assert_eq!((c.c1, c.c2, c.c3), (1, 2, 3));
        encode_control(&mut m, &mut c);
        assert_eq!((c.c1, c.c2, c.c3), (2, 3, 4));
    }

    #[test]
    fn checksum_covers_the_six_control_bytes() {
        let mut m = model();
        m.takeoff();
        let mut c = Counters::initial();
        let pkt = encode_control(&mut m, &mut c);
        let controls = &pkt[20..26];
        let expected = controls.iter().fold(0u8, |acc, b| acc ^ b);
        assert_eq!(pkt[26 + CONTROL_SUFFIX.len()], expected);
        assert_eq!(pkt.len(), 124);
    }

    #[test]
    fn command_byte_reflects_one_shot_priority() {
        let mut m = model();
        m.takeoff();
        m.land();
        let mut c = Counters::initial();
        let pkt = encode_control(&mut m, &mut c);
        assert_eq!(pkt[24], 0x01, "takeoff must win over land");
    }

    #[test]
    fn request_patches_frame_id_at_documented_offsets() {
        let a = request_a(0x0042);
        assert_eq!((a[12], a[13]), (0x42, 0x00));
        let b = request_b(0x0042);
        for base in [12, 88, 107] {
            assert_eq!((b[base], b[base + 1]), (0x42, 0x00));
        }
    }

    #[test]
    fn reassembles_and_advances_requested_frame() {
        let mut r = Reassembler::new(640, 360, 3);
        assert_eq!(r.current_frame_id(), 1);

        let mut frag0 = vec![0u8; 56 + 4];
        frag0[1] = 0x01;
        frag0[16..18].copy_from_slice(&1u16.to_le_bytes());
        frag0[32..34].copy_from_slice(&0u16.to_le_bytes());
        frag0[2] = NOT_LAST_SENTINEL; // continuation

        let mut frag1 = vec![0u8; 56 + 4];
        frag1[1] = 0x01;
        frag1[16..18].copy_from_slice(&1u16.to_le_bytes());
        frag1[32..34].copy_from_slice(&1u16.to_le_bytes());
        frag1[2] = 0x00; // last fragment

        assert!(r.ingest(&frag0).is_none());
        let frame = r.ingest(&frag1).unwrap();
        assert_eq!(frame.frame_id, 1);
        assert!(frame.data.starts_with(&[0xFF, 0xD8]));
        assert!(frame.data.ends_with(&jpeg::EOI));
        assert_eq!(r.current_frame_id(), 2);
    }

    #[test]
    fn ignores_fragments_for_an_unrequested_frame() {
        let mut r = Reassembler::new(640, 360, 3);
        let mut frag = vec![0u8; 56];
        frag[1] = 0x01;
        frag[16..18].copy_from_slice(&99u16.to_le_bytes());
        assert!(r.ingest(&frag).is_none());
        assert_eq!(r.current_frame_id(), 1);
    }
}
