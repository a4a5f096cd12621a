//! Frame checksums: CRC16 (Modbus polynomial) and LRC
//!
//! Both functions are pure and operate on byte slices; callers pass
//! sub-slices instead of offset/count pairs.

/// Half-byte lookup table for CRC16/MODBUS (polynomial 0xA001 reflected)
const CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
    0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
];

/// Calculate CRC16/MODBUS over `data`
///
/// Initial value 0xFFFF; each byte is folded in as two 4-bit table
/// lookups, low nibble first.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc = CRC_TABLE[((u16::from(byte) ^ crc) & 0x0F) as usize] ^ (crc >> 4);
        crc = CRC_TABLE[(((u16::from(byte) >> 4) ^ crc) & 0x0F) as usize] ^ (crc >> 4);
    }

    crc
}

/// Calculate LRC over `data`: two's complement of the byte sum
///
/// Used only by the ASCII transport.
pub fn lrc(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}
