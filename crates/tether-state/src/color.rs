//! Sender color selection.
//!
//! Colors must be stable across reconnects and restarts, so the index is a
//! pure function of the nick: trailing underscores are stripped, the rest is
//! ASCII case-folded, narrowed to Latin-1 bytes and run through the core's
//! 16-bit checksum (CRC-16/X-25). The low nibble picks one of 16 palette
//! slots.

/// Number of palette slots.
pub const PALETTE_SIZE: usize = 16;

/// Byte substituted for characters outside Latin-1.
const UNMAPPABLE: u8 = b'?';

/// 16-entry RGB palette indexed by [`color_index_for_nick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette(pub [u32; PALETTE_SIZE]);

/// Sender colors used when no theme overrides them.
pub const DEFAULT_PALETTE: Palette = Palette([
    0x00cc_0000,
    0x0000_6cad,
    0x004d_9900,
    0x0066_00cc,
    0x00a6_7d00,
    0x0000_9927,
    0x0000_30c0,
    0x00cc_009a,
    0x00b9_4600,
    0x0086_9900,
    0x0014_9900,
    0x0000_9960,
    0x0000_6cad,
    0x0000_99cc,
    0x00b3_00cc,
    0x00cc_004d,
]);

impl Default for Palette {
    fn default() -> Self {
        DEFAULT_PALETTE
    }
}

impl Palette {
    /// RGB color for a slot. Indices wrap modulo the palette size.
    pub fn color(&self, index: u8) -> u32 {
        self.0[usize::from(index) % PALETTE_SIZE]
    }

    /// RGB color for a nick.
    pub fn color_for_nick(&self, nick: &str) -> u32 {
        self.color(color_index_for_nick(nick))
    }
}

/// Palette index in `0..16` for a nick.
///
/// `"Foo"`, `"foo_"` and `"FOO___"` all map to the same index.
pub fn color_index_for_nick(nick: &str) -> u8 {
    (q_checksum(&nick_color_bytes(nick)) & 0xf) as u8
}

/// Normalized bytes the checksum is computed over.
///
/// Trailing `_` stripped, ASCII lower-cased, one byte per character.
pub fn nick_color_bytes(nick: &str) -> Vec<u8> {
    nick.trim_end_matches('_')
        .chars()
        .map(|c| u8::try_from(u32::from(c.to_ascii_lowercase())).unwrap_or(UNMAPPABLE))
        .collect()
}

/// CRC-16/X-25 as computed by the core's `qChecksum`.
///
/// Each input byte is reflected and shifted in MSB-first against polynomial
/// `0x1021` starting from `0xffff`; the final register is reflected and
/// complemented.
pub fn q_checksum(data: &[u8]) -> u16 {
    const HIGH_BIT: u16 = 0x8000;
    const POLY: u16 = 0x1021;

    let mut crc: u16 = 0xffff;
    for &byte in data {
        let c = byte.reverse_bits();
        let mut mask: u8 = 0x80;
        while mask > 0 {
            let mut high = crc & HIGH_BIT;
            crc <<= 1;
            if c & mask != 0 {
                high ^= HIGH_BIT;
            }
            if high != 0 {
                crc ^= POLY;
            }
            mask >>= 1;
        }
    }

    !crc.reverse_bits()
}
