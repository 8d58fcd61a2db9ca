//! Human readable output of packets and raw bytes.
//!
//! * `Display` of a [`Packet`] prints a single layer on one line, only with the fields that
//!   differ from their default.
//! * [`PrettyPrinter`] prints a whole chain, one indented line per layer, and marks layers whose
//!   checksums do not match their bytes.
//! * [`Hexdump`] prints bytes in the usual offset, hex and text columns.
//!
//! ```
//! use stackwire::schema::{Field, LengthSource, Protocol, Schema};
//!
//! static TLV: Protocol = Protocol::new("tlv", Schema::new(&[
//!     Field::uint("type", 1),
//!     Field::uint("len", 2),
//!     Field::variable("value", LengthSource::Field("len")),
//! ]));
//!
//! let mut packet = TLV.new_packet();
//! packet.set("type", 7u8)?;
//! packet.set("value", b"hi")?;
//! assert_eq!(packet.to_string(), "tlv type=7 len=2 value=0x6869");
//! # Ok::<(), stackwire::wire::Error>(())
//! ```
//!
//! [`Packet`]: ../packet/struct.Packet.html
//! [`PrettyPrinter`]: struct.PrettyPrinter.html
//! [`Hexdump`]: struct.Hexdump.html
use core::fmt;

use crate::packet::Packet;

/// Prints a packet chain, one line per layer.
pub struct PrettyPrinter<'a> {
    packet: &'a Packet,
}

/// Prints bytes as a classic hexdump.
pub struct Hexdump<'a> {
    bytes: &'a [u8],
    width: usize,
}

/// Indentation of nested layers.
struct PrettyIndent {
    level: usize,
}

impl Packet {
    /// Print the chain starting at this layer.
    pub fn pretty(&self) -> PrettyPrinter<'_> {
        PrettyPrinter { packet: self }
    }
}

impl<'a> Hexdump<'a> {
    /// Sixteen bytes per line.
    pub fn new(bytes: &'a [u8]) -> Self {
        Hexdump {
            bytes,
            width: 16,
        }
    }

    /// Change the number of bytes per line.
    pub fn width(self, width: usize) -> Self {
        Hexdump {
            width: width.max(1),
            ..self
        }
    }
}

impl fmt::Display for PrettyIndent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for _ in 0..self.level {
            write!(f, "  ")?;
        }
        if self.level > 0 {
            write!(f, "\\ ")?;
        }
        Ok(())
    }
}

fn format_checksum(f: &mut fmt::Formatter, correct: bool) -> fmt::Result {
    if !correct {
        write!(f, " (checksum incorrect)")
    } else {
        Ok(())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let schema = self.protocol().schema();
        write!(f, "{}", self.name())?;

        for (field, value) in schema.fields().iter().zip(self.values()) {
            let bits: Vec<_> = schema.bits()
                .iter()
                .filter(|bits| bits.field() == field.name())
                .collect();

            if bits.is_empty() {
                if *value != field.default_value() {
                    write!(f, " {}={}", field.name(), value)?;
                }
                continue;
            }

            // Integers split into bit fields are shown by their parts.
            let raw = value.as_uint().unwrap_or(0);
            let preset = field.default_value().as_uint().unwrap_or(0);
            for bits in bits {
                if bits.extract(raw) != bits.extract(preset) {
                    write!(f, " {}={}", bits.name(), bits.extract(raw))?;
                }
            }
        }

        match self.trailing().len() {
            0 => Ok(()),
            len => write!(f, " trailing={}", len),
        }
    }
}

impl fmt::Display for PrettyPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // A chain that fails to encode shows no marker.
        let verdicts = self.packet.verdicts().unwrap_or_default();

        for (level, layer) in self.packet.layers().enumerate() {
            let correct = verdicts.iter()
                .filter(|verdict| verdict.depth == level)
                .all(|verdict| verdict.valid);
            if level > 0 {
                writeln!(f)?;
            }
            write!(f, "{}{}", PrettyIndent { level }, layer)?;
            format_checksum(f, correct)?;
        }

        Ok(())
    }
}

impl fmt::Display for Hexdump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (line, chunk) in self.bytes.chunks(self.width).enumerate() {
            if line > 0 {
                writeln!(f)?;
            }

            write!(f, "{:04x} ", line * self.width)?;
            for byte in chunk {
                write!(f, " {:02x}", byte)?;
            }
            for _ in chunk.len()..self.width {
                write!(f, "   ")?;
            }

            write!(f, "  ")?;
            for &byte in chunk {
                let shown = match byte {
                    0x20..=0x7e => char::from(byte),
                    _ => '.',
                };
                write!(f, "{}", shown)?;
            }
        }

        Ok(())
    }
}
