//! A declarative codec for layered binary packets.
//!
//! ## Table of contents
//!
//! 1. [Design](#design)
//! 2. [The wire module](wire/index.html): cursors, checksums, errors
//! 3. [Declaring protocols](schema/index.html)
//! 4. [Registries and layer chaining](registry/index.html)
//! 5. [Packets, decoding and encoding](packet/index.html)
//! 6. [Printing](pretty/index.html)
//!
//! ## Design
//!
//! A protocol header is declared once as a constant table of fields. There is no code per
//! protocol: one codec reads such tables to turn bytes into a [`Packet`] and back. Fields are
//! integers in either byte order, fixed byte strings, a trailing variable length byte string, or
//! values computed during encoding such as internet checksums and length fields.
//!
//! Packets nest. A header may name the field that selects the protocol of its body (an
//! ethertype, an IP protocol number) and a [`Registry`] that maps the values of that field to
//! protocol definitions. Decoding then continues with the body as long as the registry knows the
//! discriminant and the body decodes, otherwise the bytes are kept as trailing data. Only the
//! outermost layer can fail to decode.
//!
//! Encoding walks the chain in the other direction. Inner layers are written first so that the
//! lengths and checksums of enclosing layers can cover them, and checksums with a pseudo-header
//! can read the fields of their enclosing layers.
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
//! let packet = TLV.decode(&[0x07, 0x00, 0x03, 0xaa, 0xbb, 0xcc, 0xff])?;
//! assert_eq!(packet.uint("type")?, 7);
//! assert_eq!(packet.bytes("value")?, &[0xaa, 0xbb, 0xcc]);
//! assert_eq!(packet.trailing(), &[0xff]);
//! # Ok::<(), stackwire::wire::Error>(())
//! ```
//!
//! Decoding and encoding never panic on malformed input, all failures are reported as a
//! [`wire::Error`]. With the `log` feature, decisions of the decoder that do not surface as
//! errors, such as a body that is kept as trailing data, are logged through the `log` crate.
//!
//! [`Packet`]: packet/struct.Packet.html
//! [`Registry`]: registry/struct.Registry.html
//! [`wire::Error`]: wire/enum.Error.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[macro_use] mod macros;
pub mod wire;
pub mod schema;
pub mod registry;
pub mod packet;
pub mod pretty;
