//! The internet checksum of RFC 1071.
//!
//! A sum of big-endian 16-bit words with end-around carry whose complement is transmitted. The
//! functions here work on partial sums (not complemented) so that several ranges, such as a
//! pseudo-header borrowed from an enclosing layer and the covered bytes of the packet itself, can
//! be added up before the final complement.
use byteorder::{ByteOrder, NetworkEndian};

fn propagate_carries(word: u32) -> u16 {
    let sum = (word >> 16) + (word & 0xffff);
    ((sum >> 16) as u16) + (sum as u16)
}

/// Compute an RFC 1071 compliant checksum (without the final complement).
///
/// An odd trailing byte is padded with a zero octet.
pub fn data(mut data: &[u8]) -> u16 {
    let mut accum = 0;

    // For each 32-byte chunk...
    const CHUNK_SIZE: usize = 32;
    while data.len() >= CHUNK_SIZE {
        let mut d = &data[..CHUNK_SIZE];
        // ... take by 2 bytes and sum them.
        while d.len() >= 2 {
            accum += NetworkEndian::read_u16(d) as u32;
            d = &d[2..];
        }

        data = &data[CHUNK_SIZE..];
        // Keep the accumulator small for arbitrarily long input.
        accum = propagate_carries(accum) as u32;
    }

    // Sum the rest that does not fit the last 32-byte chunk,
    // taking by 2 bytes.
    while data.len() >= 2 {
        accum += NetworkEndian::read_u16(data) as u32;
        data = &data[2..];
    }

    // Add the last remaining odd byte, if any.
    if let Some(&value) = data.first() {
        accum += (value as u32) << 8;
    }

    propagate_carries(accum)
}

/// Combine several RFC 1071 compliant checksums.
pub fn combine(checksums: &[u16]) -> u16 {
    let mut accum: u32 = 0;
    for &word in checksums {
        accum += word as u32;
    }
    propagate_carries(accum)
}

/// The checksum to transmit for `bytes`, that is the complemented sum.
pub fn internet(bytes: &[u8]) -> u16 {
    !data(bytes)
}

/// Check a range that contains its own checksum.
pub fn verify(bytes: &[u8]) -> bool {
    data(bytes) == !0
}

/// An incremental checksum over several ranges.
///
/// The ranges are summed as if they were concatenated. This matters when a range has odd length:
/// its last byte forms a word with the first byte of the next range instead of being padded.
///
/// ```
/// use stackwire::wire::checksum::{self, Accumulator};
///
/// let mut accum = Accumulator::new();
/// accum.add(&[0x45, 0x00, 0x00]);
/// accum.add(&[0x1c, 0x12]);
/// assert_eq!(accum.finish(), checksum::internet(&[0x45, 0x00, 0x00, 0x1c, 0x12]));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accumulator {
    sum: u16,
    odd: Option<u8>,
}

impl Accumulator {
    /// An empty sum.
    pub fn new() -> Self {
        Accumulator::default()
    }

    /// Add a range of bytes.
    pub fn add(&mut self, mut bytes: &[u8]) {
        if let Some(high) = self.odd.take() {
            match bytes.split_first() {
                Some((&low, rest)) => {
                    self.sum = combine(&[self.sum, u16::from_be_bytes([high, low])]);
                    bytes = rest;
                },
                None => {
                    self.odd = Some(high);
                    return;
                },
            }
        }

        let even = bytes.len() & !1;
        self.sum = combine(&[self.sum, data(&bytes[..even])]);
        self.odd = bytes.get(even).copied();
    }

    /// Add a big-endian 16-bit word.
    pub fn add_u16(&mut self, word: u16) {
        self.add(&word.to_be_bytes())
    }

    /// Add a big-endian 32-bit word.
    pub fn add_u32(&mut self, word: u32) {
        self.add(&word.to_be_bytes())
    }

    /// If an odd number of bytes was added so far.
    pub fn is_odd(&self) -> bool {
        self.odd.is_some()
    }

    /// The sum so far, without the final complement.
    pub fn sum(&self) -> u16 {
        match self.odd {
            Some(high) => combine(&[self.sum, u16::from(high) << 8]),
            None => self.sum,
        }
    }

    /// The complemented sum, ready to be transmitted.
    pub fn finish(&self) -> u16 {
        !self.sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // An IPv4 header with a correct checksum of 0xb861.
    static HEADER_BYTES: [u8; 20] =
        [0x45, 0x00, 0x00, 0x73,
         0x00, 0x00, 0x40, 0x00,
         0x40, 0x11, 0xb8, 0x61,
         0xc0, 0xa8, 0x00, 0x01,
         0xc0, 0xa8, 0x00, 0xc7];

    #[test]
    fn known_header() {
        assert!(verify(&HEADER_BYTES));

        let mut bytes = HEADER_BYTES;
        bytes[10] = 0;
        bytes[11] = 0;
        assert_eq!(internet(&bytes), 0xb861);
    }

    #[test]
    fn odd_length_is_padded() {
        assert_eq!(data(&[0x12, 0x34, 0x56]), 0x1234 + 0x5600);
        assert_eq!(data(&[0xff]), 0xff00);
    }

    #[test]
    fn carries_wrap_around() {
        assert_eq!(data(&[0xff, 0xff, 0x00, 0x01]), 0x0001);
        assert_eq!(combine(&[0xffff, 0x0002]), 0x0002);
        // Long input exercises the chunked path.
        let ones = [0xff; 100];
        assert_eq!(data(&ones), 0xffff);
        assert!(verify(&ones));
    }

    #[test]
    fn accumulator_matches_concatenation() {
        let whole = data(&HEADER_BYTES);
        for split in 0..HEADER_BYTES.len() {
            let mut accum = Accumulator::new();
            accum.add(&HEADER_BYTES[..split]);
            accum.add(&[]);
            accum.add(&HEADER_BYTES[split..]);
            assert_eq!(accum.sum(), whole, "split at {}", split);
        }
    }

    #[test]
    fn accumulator_parity() {
        let mut accum = Accumulator::new();
        assert!(!accum.is_odd());
        accum.add(&[1, 2, 3]);
        assert!(accum.is_odd());
        accum.add(&[4]);
        assert!(!accum.is_odd());
    }

    #[test]
    fn accumulator_words() {
        let mut accum = Accumulator::new();
        accum.add_u32(0xc0a8_0001);
        accum.add_u16(0x0011);
        assert_eq!(accum.sum(), data(&[0xc0, 0xa8, 0x00, 0x01, 0x00, 0x11]));
    }
}
