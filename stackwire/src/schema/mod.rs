/*! Declaring packet layouts.

A protocol is declared once, as a constant table of [`Field`] descriptors wrapped in a
[`Schema`] and a named [`Protocol`]. The codec in the [`packet`] module interprets this table for
every decode and encode, there is no generated code and no reflection.

[`Field`]: struct.Field.html
[`Schema`]: struct.Schema.html
[`Protocol`]: struct.Protocol.html
[`packet`]: ../packet/index.html

# Field kinds

 * Integers of one to eight octets, signed or unsigned, in either byte order.
 * Fixed width byte strings, e.g. hardware addresses.
 * At most one variable length byte string at the end of the header. Its length is either
   everything that remains, stored in a sibling field, or derived from a sibling field holding
   the length of the whole header.
 * Computed fields: internet checksums and lengths of a part of the packet. These are filled in
   by the encoder unless a value was pinned manually.

Integer fields can additionally be split into [`BitField`]s, named ranges of bits that are read
and written like fields but do not occupy bytes of their own.

[`BitField`]: struct.BitField.html

# Example

A header with a type byte, a length and the data the length describes:

```rust
use stackwire::schema::{Field, LengthSource, Protocol, Schema};

static TLV: Protocol = Protocol::new("tlv", Schema::new(&[
    Field::uint("type", 1),
    Field::uint("len", 2),
    Field::variable("value", LengthSource::Field("len")),
]));

let mut packet = TLV.new_packet();
packet.set("type", 7u8)?;
packet.set("value", vec![0xaa, 0xbb, 0xcc])?;
assert_eq!(packet.uint("len")?, 3);
assert_eq!(packet.encode()?, [0x07, 0x00, 0x03, 0xaa, 0xbb, 0xcc]);
# Ok::<(), stackwire::wire::Error>(())
```
*/
use core::fmt;

use crate::packet::{Ancestors, Options, Packet};
use crate::registry::Registry;
use crate::wire::{Endian, Error, Result};
use crate::wire::checksum::Accumulator;
use crate::wire::cursor::fits_uint;

mod value;

pub use self::value::{Preset, Value};

/// Adds the pseudo-header of an enclosing layer to a checksum.
///
/// Called with the layers enclosing the packet whose checksum is computed, nearest first, and the
/// number of bytes the checksum covers. Returns `false` if no suitable enclosing layer was found,
/// the checksum then only covers the packet itself.
pub type PseudoHeader = fn(&Ancestors<'_>, usize, &mut Accumulator) -> bool;

/// The layout of an integer field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Int {
    /// The width in octets, between one and eight.
    pub width: u8,
    /// Whether the value is two's complement.
    pub signed: bool,
    /// The byte order on the wire.
    pub order: Endian,
}

/// What a field is made of.
#[derive(Clone, Copy, Debug)]
pub enum Kind {
    /// An integer.
    Int(Int),
    /// A byte string of fixed width.
    Bytes(usize),
    /// A byte string whose length is determined while decoding.
    Variable(LengthSource),
    /// An integer filled in by the encoder.
    Computed(Computed),
}

/// How the length of a variable field is determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LengthSource {
    /// The field takes all remaining bytes.
    Remaining,

    /// A preceding field or bit field holds the length of the variable field in bytes.
    Field(&'static str),

    /// A preceding field or bit field holds the length of the whole header in multiples of
    /// `unit` bytes.
    ///
    /// The variable field takes whatever the fixed fields leave over, such as the options of
    /// an IPv4 header.
    HeaderLength {
        /// The name of the field or bit field.
        field: &'static str,
        /// The number of bytes of one unit of the length.
        unit: u8,
    },
}

/// The part of a packet a computed field describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Coverage {
    /// The header of the packet, all of its fields.
    Header,
    /// Everything after the header, the next layer or the trailing bytes.
    Body,
    /// Header and body.
    Packet,
}

/// A value that the encoder computes.
#[derive(Clone, Copy, Debug)]
pub enum Computed {
    /// An RFC 1071 internet checksum, always two octets in network byte order.
    Checksum(ChecksumSpec),
    /// The length of a part of the packet.
    Length(LengthSpec),
}

/// The parameters of a computed checksum.
#[derive(Clone, Copy)]
pub struct ChecksumSpec {
    /// The bytes that are summed.
    pub covers: Coverage,
    /// Bytes of enclosing layers that are summed first.
    pub pseudo: Option<PseudoHeader>,
    /// A transmitted zero means no checksum was computed.
    ///
    /// A computed checksum of zero is then sent as all ones, which is arithmetically
    /// equivalent. UDP over IPv4 is the typical example.
    pub zero_means_absent: bool,
}

/// The parameters of a computed length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LengthSpec {
    /// The integer layout of the length field, always unsigned.
    pub int: Int,
    /// The bytes that are counted.
    pub covers: Coverage,
    /// The number of bytes counted as one.
    pub unit: u8,
}

/// The descriptor of a single field of a header.
#[derive(Clone, Copy, Debug)]
pub struct Field {
    name: &'static str,
    kind: Kind,
    preset: Preset,
}

/// A named range of bits within an unsigned integer field.
///
/// The bits are counted from the least significant bit of the decoded integer, independent of
/// its byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitField {
    name: &'static str,
    field: &'static str,
    shift: u8,
    width: u8,
}

/// Selects the definition of the next layer.
#[derive(Clone, Copy)]
pub struct Dispatch {
    field: &'static str,
    registry: fn() -> &'static Registry,
}

/// The ordered layout of a header.
#[derive(Clone, Copy, Debug)]
pub struct Schema {
    fields: &'static [Field],
    bits: &'static [BitField],
    next: Option<Dispatch>,
}

/// A named protocol definition.
///
/// These are meant to be declared as `static` items so that packets and registries can refer to
/// them for the whole runtime of the program. Two definitions are the same protocol only if they
/// are the same item.
#[derive(Debug)]
pub struct Protocol {
    name: &'static str,
    schema: Schema,
}

/// The location of a value named in a schema.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Slot {
    /// A field at an index.
    Field(usize),
    /// A bit field within the field at an index.
    Bits(usize, BitField),
}

impl Field {
    /// An unsigned integer of `width` octets in network byte order, defaulting to zero.
    pub const fn uint(name: &'static str, width: u8) -> Self {
        Field {
            name,
            kind: Kind::Int(Int { width, signed: false, order: Endian::Big }),
            preset: Preset::Uint(0),
        }
    }

    /// A signed integer of `width` octets in network byte order, defaulting to zero.
    pub const fn int(name: &'static str, width: u8) -> Self {
        Field {
            name,
            kind: Kind::Int(Int { width, signed: true, order: Endian::Big }),
            preset: Preset::Int(0),
        }
    }

    /// A byte string of `width` octets, defaulting to zeroes.
    pub const fn bytes(name: &'static str, width: usize) -> Self {
        Field {
            name,
            kind: Kind::Bytes(width),
            preset: Preset::Bytes(&[]),
        }
    }

    /// A byte string of variable length, defaulting to empty.
    pub const fn variable(name: &'static str, length: LengthSource) -> Self {
        Field {
            name,
            kind: Kind::Variable(length),
            preset: Preset::Empty,
        }
    }

    /// An internet checksum over some part of the packet.
    pub const fn checksum(name: &'static str, covers: Coverage) -> Self {
        Field {
            name,
            kind: Kind::Computed(Computed::Checksum(ChecksumSpec {
                covers,
                pseudo: None,
                zero_means_absent: false,
            })),
            preset: Preset::Uint(0),
        }
    }

    /// The length in bytes of some part of the packet, as an unsigned integer of `width` octets.
    pub const fn length(name: &'static str, width: u8, covers: Coverage) -> Self {
        Field {
            name,
            kind: Kind::Computed(Computed::Length(LengthSpec {
                int: Int { width, signed: false, order: Endian::Big },
                covers,
                unit: 1,
            })),
            preset: Preset::Uint(0),
        }
    }

    /// Store an integer or computed length in little endian byte order.
    pub const fn little_endian(self) -> Self {
        let kind = match self.kind {
            Kind::Int(int) => Kind::Int(Int { order: Endian::Little, ..int }),
            Kind::Computed(Computed::Length(length)) => Kind::Computed(Computed::Length(
                LengthSpec { int: Int { order: Endian::Little, ..length.int }, ..length })),
            other => other,
        };
        Field { kind, ..self }
    }

    /// Count a computed length in multiples of `unit` bytes.
    pub const fn in_units(self, unit: u8) -> Self {
        let kind = match self.kind {
            Kind::Computed(Computed::Length(length)) => Kind::Computed(Computed::Length(
                LengthSpec { unit, ..length })),
            other => other,
        };
        Field { kind, ..self }
    }

    /// Add a pseudo-header of enclosing layers to a checksum.
    pub const fn with_pseudo_header(self, pseudo: PseudoHeader) -> Self {
        let kind = match self.kind {
            Kind::Computed(Computed::Checksum(checksum)) => Kind::Computed(Computed::Checksum(
                ChecksumSpec { pseudo: Some(pseudo), ..checksum })),
            other => other,
        };
        Field { kind, ..self }
    }

    /// Treat a transmitted zero checksum as absent.
    pub const fn zero_means_absent(self) -> Self {
        let kind = match self.kind {
            Kind::Computed(Computed::Checksum(checksum)) => Kind::Computed(Computed::Checksum(
                ChecksumSpec { zero_means_absent: true, ..checksum })),
            other => other,
        };
        Field { kind, ..self }
    }

    /// Default to an unsigned value.
    pub const fn with_default(self, value: u64) -> Self {
        Field { preset: Preset::Uint(value), ..self }
    }

    /// Default to a signed value.
    pub const fn with_default_signed(self, value: i64) -> Self {
        Field { preset: Preset::Int(value), ..self }
    }

    /// Default to a byte string.
    pub const fn with_default_bytes(self, value: &'static [u8]) -> Self {
        Field { preset: Preset::Bytes(value), ..self }
    }

    /// The unique name of the field.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The kind of the field.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The default value.
    pub fn preset(&self) -> Preset {
        self.preset
    }

    /// The number of bytes, if fixed.
    pub fn width(&self) -> Option<usize> {
        self.kind.width()
    }

    /// The value of a freshly constructed packet.
    pub fn default_value(&self) -> Value {
        let value = self.preset.value(self.width());
        match self.kind.int() {
            // Presets are validated, fall back to the raw value for invalid schemas.
            Some(int) => int.normalize(value.clone()).unwrap_or(value),
            None => value,
        }
    }

    /// Check a value for this field and bring it into canonical form.
    pub fn normalize(&self, value: Value) -> Result<Value> {
        match self.kind {
            Kind::Int(int) => int.normalize(value),
            Kind::Computed(Computed::Length(length)) => length.int.normalize(value),
            Kind::Computed(Computed::Checksum(_)) => CHECKSUM.normalize(value),
            Kind::Bytes(width) => match value {
                Value::Bytes(bytes) if bytes.len() == width => Ok(Value::Bytes(bytes)),
                _ => Err(Error::InvalidFieldValue),
            },
            Kind::Variable(_) => match value {
                Value::Bytes(bytes) => Ok(Value::Bytes(bytes)),
                _ => Err(Error::InvalidFieldValue),
            },
        }
    }
}

/// The integer layout of every checksum field.
pub(crate) const CHECKSUM: Int = Int { width: 2, signed: false, order: Endian::Big };

impl Kind {
    /// The number of bytes, if fixed.
    pub fn width(&self) -> Option<usize> {
        match self {
            Kind::Int(int) => Some(int.width.into()),
            Kind::Bytes(width) => Some(*width),
            Kind::Variable(_) => None,
            Kind::Computed(Computed::Checksum(_)) => Some(CHECKSUM.width.into()),
            Kind::Computed(Computed::Length(length)) => Some(length.int.width.into()),
        }
    }

    /// The integer layout, if the kind is stored as an integer.
    pub fn int(&self) -> Option<Int> {
        match self {
            Kind::Int(int) => Some(*int),
            Kind::Computed(Computed::Checksum(_)) => Some(CHECKSUM),
            Kind::Computed(Computed::Length(length)) => Some(length.int),
            Kind::Bytes(_) | Kind::Variable(_) => None,
        }
    }

    /// If the field is filled in by the encoder.
    pub fn is_computed(&self) -> bool {
        match self {
            Kind::Computed(_) => true,
            _ => false,
        }
    }
}

impl BitField {
    /// The bits `shift..shift + width` of the field named `field`.
    pub const fn new(name: &'static str, field: &'static str, shift: u8, width: u8) -> Self {
        BitField { name, field, shift, width }
    }

    /// The unique name of the bit field.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The name of the field containing the bits.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The position of the least significant bit.
    pub fn shift(&self) -> u8 {
        self.shift
    }

    /// The number of bits.
    pub fn width(&self) -> u8 {
        self.width
    }

    /// The largest value of the bit field.
    pub fn max(&self) -> u64 {
        if self.width >= 64 {
            !0
        } else {
            (1 << self.width) - 1
        }
    }

    /// Extract the bits from the containing integer.
    pub fn extract(&self, raw: u64) -> u64 {
        raw.checked_shr(self.shift.into()).unwrap_or(0) & self.max()
    }

    /// Replace the bits within the containing integer.
    ///
    /// Surplus bits of `value` are cut off.
    pub fn insert(&self, raw: u64, value: u64) -> u64 {
        let mask = self.max().checked_shl(self.shift.into()).unwrap_or(0);
        let bits = (value & self.max()).checked_shl(self.shift.into()).unwrap_or(0);
        (raw & !mask) | bits
    }
}

impl Dispatch {
    /// Dispatch on the value of a field or bit field.
    ///
    /// The registry is only requested while decoding so it may be built lazily.
    pub const fn new(field: &'static str, registry: fn() -> &'static Registry) -> Self {
        Dispatch { field, registry }
    }

    /// The name of the field holding the discriminant.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The registry to look the discriminant up in.
    pub fn registry(&self) -> &'static Registry {
        (self.registry)()
    }
}

impl Schema {
    /// A schema of the given fields, without bit fields or next layer.
    pub const fn new(fields: &'static [Field]) -> Self {
        Schema {
            fields,
            bits: &[],
            next: None,
        }
    }

    /// Declare bit fields within the integer fields.
    pub const fn with_bits(self, bits: &'static [BitField]) -> Self {
        Schema { bits, ..self }
    }

    /// Decode the body as the next layer chosen by a discriminant.
    pub const fn with_next(self, next: Dispatch) -> Self {
        Schema { next: Some(next), ..self }
    }

    /// All fields in order.
    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// All bit fields.
    pub fn bits(&self) -> &'static [BitField] {
        self.bits
    }

    /// The next layer dispatch, if any.
    pub fn next(&self) -> Option<&Dispatch> {
        self.next.as_ref()
    }

    /// Find a field and its index.
    pub fn field(&self, name: &str) -> Option<(usize, &'static Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
    }

    /// Find a bit field.
    pub fn bit(&self, name: &str) -> Option<&'static BitField> {
        self.bits
            .iter()
            .find(|bits| bits.name == name)
    }

    /// The minimum number of bytes of a header, the sum of all fixed widths.
    pub fn min_len(&self) -> usize {
        self.fields
            .iter()
            .filter_map(Field::width)
            .sum()
    }

    /// The offset of a field within the header.
    ///
    /// Only fixed width fields may precede it, as the variable field is the last one. An index
    /// past the last field gives the length of the fixed fields.
    pub fn offset_of(&self, index: usize) -> usize {
        self.fields
            .get(..index)
            .unwrap_or(self.fields)
            .iter()
            .filter_map(Field::width)
            .sum()
    }

    /// The variable length field with its index, if there is one.
    pub fn variable(&self) -> Option<(usize, &'static Field, LengthSource)> {
        self.fields
            .iter()
            .enumerate()
            .find_map(|(index, field)| match field.kind {
                Kind::Variable(source) => Some((index, field, source)),
                _ => None,
            })
    }

    pub(crate) fn resolve(&self, name: &str) -> Result<Slot> {
        if let Some((index, _)) = self.field(name) {
            return Ok(Slot::Field(index));
        }

        let bits = self.bit(name).ok_or(Error::UnknownField)?;
        match self.field(bits.field) {
            Some((index, _)) => Ok(Slot::Bits(index, *bits)),
            None => Err(Error::InvalidSchema),
        }
    }

    /// Check a field that holds a length or discriminant.
    ///
    /// It must be a plain unsigned integer or bit field declared before `before`.
    fn check_source(&self, name: &str, before: usize) -> Result<Slot> {
        let slot = self.resolve(name).map_err(|_| Error::InvalidSchema)?;
        let index = match slot {
            Slot::Field(index) | Slot::Bits(index, _) => index,
        };

        match self.fields[index].kind {
            Kind::Int(Int { signed: false, .. }) if index < before => Ok(slot),
            _ => Err(Error::InvalidSchema),
        }
    }

    /// The largest value a length source can hold.
    fn source_max(&self, slot: Slot) -> u64 {
        match slot {
            Slot::Bits(_, bits) => bits.max(),
            Slot::Field(index) => match self.fields[index].kind.width() {
                Some(width) if width < 8 => (1 << (8 * width)) - 1,
                _ => !0,
            },
        }
    }

    /// Check the invariants of the declaration.
    ///
    /// * Names of fields and bit fields are unique.
    /// * Integers are one to eight octets wide, computed lengths count in units of at least one.
    /// * Defaults fit their fields.
    /// * A variable field may only appear as the last field. Its length source must be an
    ///   unsigned integer or bit field declared before it and, for a header length, the fixed
    ///   fields must fill whole units that the source can express.
    /// * Bit fields lie within an unsigned integer field.
    /// * The discriminant is an unsigned integer or bit field.
    ///
    /// Returns `Err(Error::InvalidSchema)` on the first violation.
    pub fn validate(&self) -> Result<()> {
        let names = self.fields.iter().map(|field| field.name)
            .chain(self.bits.iter().map(|bits| bits.name));
        for (index, name) in names.clone().enumerate() {
            if names.clone().skip(index + 1).any(|other| other == name) {
                return Err(Error::InvalidSchema);
            }
        }

        for (index, field) in self.fields.iter().enumerate() {
            match field.kind {
                Kind::Int(int) if !(1..=8).contains(&int.width) => {
                    return Err(Error::InvalidSchema)
                },
                Kind::Computed(Computed::Length(length))
                    if !(1..=8).contains(&length.int.width)
                        || length.int.signed
                        || length.unit == 0 =>
                {
                    return Err(Error::InvalidSchema)
                },
                Kind::Variable(_) if index + 1 != self.fields.len() => {
                    return Err(Error::InvalidSchema)
                },
                _ => (),
            }

            let preset = field.preset.value(field.width());
            if field.normalize(preset).is_err() {
                return Err(Error::InvalidSchema);
            }
        }

        for bits in self.bits {
            let width = match self.field(bits.field) {
                Some((_, Field { kind: Kind::Int(Int { signed: false, width, .. }), .. })) => *width,
                _ => return Err(Error::InvalidSchema),
            };

            let end = u32::from(bits.shift) + u32::from(bits.width);
            if bits.width == 0 || end > 8 * u32::from(width) {
                return Err(Error::InvalidSchema);
            }
        }

        if let Some((index, _, source)) = self.variable() {
            match source {
                LengthSource::Remaining => (),
                LengthSource::Field(name) => {
                    self.check_source(name, index)?;
                },
                LengthSource::HeaderLength { field, unit } => {
                    let slot = self.check_source(field, index)?;
                    let prefix = self.offset_of(index);
                    let unit = usize::from(unit);
                    if unit == 0 || prefix % unit != 0 {
                        return Err(Error::InvalidSchema);
                    }
                    let units = u64::try_from(prefix / unit).map_err(|_| Error::InvalidSchema)?;
                    if units > self.source_max(slot) {
                        return Err(Error::InvalidSchema);
                    }
                },
            }
        }

        if let Some(next) = &self.next {
            self.check_source(next.field, self.fields.len())?;
        }

        Ok(())
    }
}

impl Protocol {
    /// Name a schema.
    pub const fn new(name: &'static str, schema: Schema) -> Self {
        Protocol { name, schema }
    }

    /// The name, used for layer lookup and printing.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The layout of the header.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Construct a packet of this protocol with all fields at their defaults.
    pub fn new_packet(&'static self) -> Packet {
        Packet::new(self)
    }

    /// Decode a packet of this protocol and all layers within.
    pub fn decode(&'static self, bytes: &[u8]) -> Result<Packet> {
        Packet::decode(self, bytes)
    }

    /// Decode with explicit options, see [`Packet::decode_with`].
    ///
    /// [`Packet::decode_with`]: ../packet/struct.Packet.html#method.decode_with
    pub fn decode_with(&'static self, bytes: &[u8], options: &Options) -> Result<Packet> {
        Packet::decode_with(self, bytes, options)
    }

    /// Check if two references denote the same definition.
    pub fn same(&self, other: &Protocol) -> bool {
        core::ptr::eq(self, other)
    }
}

impl fmt::Debug for ChecksumSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ChecksumSpec")
            .field("covers", &self.covers)
            .field("pseudo", &self.pseudo.is_some())
            .field("zero_means_absent", &self.zero_means_absent)
            .finish()
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("field", &self.field)
            .finish()
    }
}

/// Fits a derived length into the field or bit field holding it.
pub(crate) fn fits_source(schema: &Schema, slot: Slot, value: u64) -> bool {
    match slot {
        Slot::Bits(_, bits) => value <= bits.max(),
        Slot::Field(index) => match schema.fields[index].kind.width() {
            Some(width) => fits_uint(value, width),
            None => false,
        },
    }
}
