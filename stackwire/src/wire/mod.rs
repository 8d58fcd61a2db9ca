/*! Low-level octet access.

The `wire` module is the lowest layer of the codec. It provides:

 * The [`Reader`] and [`Writer`] cursors, the only code which indexes into buffers. Every read
   and write is bounds checked and fails with an [`Error`] instead of panicking.
 * The RFC 1071 [`checksum`] functions, including an accumulator for checksums that span a
   pseudo-header and the packet itself.
 * The [`Endian`] of integer fields and the [`Checksum`] policy for emitting packets.

Nothing in here knows about schemas or packets, see the [`schema`] and [`packet`] modules for
those.

[`Reader`]: cursor/struct.Reader.html
[`Writer`]: cursor/struct.Writer.html
[`Error`]: enum.Error.html
[`checksum`]: checksum/index.html
[`Endian`]: enum.Endian.html
[`Checksum`]: enum.Checksum.html
[`schema`]: ../schema/index.html
[`packet`]: ../packet/index.html

# Examples

```rust
use stackwire::wire::{Endian, Reader, Writer};

let mut writer = Writer::new();
writer.write_uint(0x0800, 2, Endian::Big)?;
writer.write_uint(0x0800, 2, Endian::Little)?;
assert_eq!(writer.as_slice(), &[0x08, 0x00, 0x00, 0x08]);

let mut reader = Reader::new(writer.as_slice());
assert_eq!(reader.read_uint(2, Endian::Big)?, 0x0800);
assert_eq!(reader.read_uint(2, Endian::Little)?, 0x0800);
# Ok::<(), stackwire::wire::Error>(())
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// The checksum routines are in large parts from `smoltcp` originally distributed under 0-clause
// BSD.

pub mod checksum;
pub mod cursor;
mod error;

pub use self::cursor::{Reader, Writer};
pub use self::error::{Error, Result};

/// The byte order of an integer field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Most significant byte first, the network byte order.
    Big,

    /// Least significant byte first.
    ///
    /// Occasionally used by payload defined substructures.
    Little,
}

impl Endian {
    /// The conventional byte order of network protocols.
    pub const NETWORK: Endian = Endian::Big;
}

/// Describes how to handle checksums when emitting packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Checksum {
    /// Checksums are computed by the library.
    Manual,

    /// The checksum field is filled by the NIC.
    ///
    /// Checksums that would need to be computed are emitted as zero instead.
    Ignored,
}

impl Checksum {
    /// Check if a checksum should be calculated by the library.
    ///
    /// Otherwise it is ignored due to the assumption that it was offloaded or is otherwise
    /// undesirable to compute.
    pub fn manual(self) -> bool {
        match self {
            Checksum::Manual => true,
            Checksum::Ignored => false,
        }
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Checksum::Manual
    }
}
