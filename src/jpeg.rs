//! Synthesizes a minimal JPEG header (SOI, DQT, SOF0, SOS) for wire formats
//! whose vendor firmware omits it and ships bare entropy-coded scan data.

pub const EOI: [u8; 2] = [0xFF, 0xD9];

const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

const STD_LUMINANCE_QTABLE: [u8; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104, 113,
    92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

const STD_CHROMINANCE_QTABLE: [u8; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
];

fn zigzag_order(natural: &[u8; 64]) -> [u8; 64] {
    let mut out = [0u8; 64];
    for (k, &natural_index) in ZIGZAG.iter().enumerate() {
        out[k] = natural[natural_index];
    }
    out
}

fn push_dqt(out: &mut Vec<u8>, table_id: u8, table: &[u8; 64]) {
    out.extend_from_slice(&[0xFF, 0xDB]);
    out.extend_from_slice(&(67u16).to_be_bytes()); // 2 (length) + 1 (Pq/Tq) + 64
    out.push(table_id); // Pq=0 (8-bit precision) in high nibble, Tq in low nibble
    out.extend_from_slice(&zigzag_order(table));
}

fn push_sof0(out: &mut Vec<u8>, width: u16, height: u16, components: u8) {
    let len = 8 + 3 * components as u16;
    out.extend_from_slice(&[0xFF, 0xC0]);
    out.extend_from_slice(&len.to_be_bytes());
    out.push(8); // precision
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.push(components);
    for ci in 1..=components {
        let qtable = if ci == 1 { 0 } else { 1 }; // Y -> 0, Cb/Cr -> 1
        out.push(ci);
        out.push(0x11); // 4:4:4 sampling
        out.push(qtable);
    }
}

fn push_sos(out: &mut Vec<u8>, components: u8) {
    let len = 6 + 2 * components as u16;
    out.extend_from_slice(&[0xFF, 0xDA]);
    out.extend_from_slice(&len.to_be_bytes());
    out.push(components);
    for ci in 1..=components {
        let selector = if ci == 1 { 0x00 } else { 0x11 }; // Y -> DC0/AC0, Cb/Cr -> DC1/AC1
        out.push(ci);
        out.push(selector);
    }
    out.extend_from_slice(&[0x00, 0x3F, 0x00]); // Ss, Se, AhAl
}

/// Builds the full header to prepend to bare entropy-coded JPEG scan data:
/// SOI, luminance + chrominance DQT, SOF0, SOS.
pub fn generate_jpeg_headers(width: u16, height: u16, components: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(160);
    out.extend_from_slice(&[0xFF, 0xD8]); // SOI
    push_dqt(&mut out, 0x00, &STD_LUMINANCE_QTABLE);
    if components > 1 {
        push_dqt(&mut out, 0x01, &STD_CHROMINANCE_QTABLE);
    }
    push_sof0(&mut out, width, height, components);
    push_sos(&mut out, components);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_starts_with_soi_and_ends_with_sos() {
        let header = generate_jpeg_headers(640, 360, 3);
        assert_eq!(&header[..2], &[0xFF, 0xD8]);
        // SOS marker appears somewhere near the tail
        assert!(header.windows(2).any(|w| w == [0xFF, 0xDA]));
    }

    #[test]
    fn sof0_encodes_dimensions_big_endian() {
        let header = generate_jpeg_headers(640, 360, 3);
        let sof_pos = header.windows(2).position(|w| w == [0xFF, 0xC0]).unwrap();
        let height = u16::from_be_bytes([header[sof_pos + 5], header[sof_pos + 6]]);
        let width = u16::from_be_bytes([header[sof_pos + 7], header[sof_pos + 8]]);
        assert_eq!(height, 360);
        assert_eq!(width, 640);
    }
}
