//! Packet instances and the codec.
//!
//! A [`Packet`] holds one value per field of its protocol's schema and a body: either the next
//! layer or the bytes that were not decoded further. Decoding fills a packet chain from bytes,
//! encoding turns it back into bytes and fills in computed fields along the way.
//!
//! Setters keep the packet consistent. Setting a variable length field rewrites the field that
//! stores its length, and any change marks the computed fields of the layer and every layer
//! within it as outdated so that the next encode recomputes them.
//!
//! [`Packet`]: struct.Packet.html
use core::{fmt, mem};

use crate::schema::{LengthSource, Protocol, Slot, Value, fits_source};
use crate::wire::{Checksum, Error, Result};

mod decode;
mod encode;

/// The configuration of decode and encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Options {
    /// Whether checksums are computed or left to an offloading device.
    pub checksum: Checksum,

    /// The maximum number of layers of a decoded chain.
    ///
    /// Decoding stops chaining at this depth and keeps the remaining bytes as trailing data of
    /// the innermost layer. The outermost layer is always decoded.
    pub max_depth: usize,

    /// A hard limit on the number of encoded bytes.
    pub capacity: Option<usize>,
}

/// A decoded or constructed protocol header with its body.
#[derive(Clone)]
pub struct Packet {
    protocol: &'static Protocol,
    values: Vec<Value>,
    /// Computed fields with a manual value.
    pinned: Vec<bool>,
    /// The computed values still describe the packet, as after decoding.
    fresh: bool,
    body: Body,
}

/// Everything after the header of a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Bytes that are not decoded further.
    Trailing(Vec<u8>),
    /// The next layer.
    Next(Box<Packet>),
}

/// The layers enclosing a packet while it is encoded, nearest first.
///
/// Pseudo-header hooks use this to read the fields of enclosing layers.
#[derive(Clone, Copy)]
pub struct Ancestors<'a> {
    packet: &'a Packet,
    parent: Option<&'a Ancestors<'a>>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            checksum: Checksum::Manual,
            max_depth: 32,
            capacity: None,
        }
    }
}

impl<'a> Ancestors<'a> {
    /// The directly enclosing layer.
    pub fn packet(&self) -> &'a Packet {
        self.packet
    }

    /// The layers enclosing the directly enclosing one.
    pub fn parent(&self) -> Option<&'a Ancestors<'a>> {
        self.parent
    }

    /// All enclosing layers, nearest first.
    pub fn iter(&self) -> impl Iterator<Item=&'a Packet> + 'a {
        let mut next = Some(*self);
        core::iter::from_fn(move || {
            let current = next?;
            next = current.parent.copied();
            Some(current.packet)
        })
    }

    /// The nearest enclosing layer of a protocol.
    pub fn find(&self, name: &str) -> Option<&'a Packet> {
        self.iter().find(|packet| packet.name() == name)
    }
}

impl Packet {
    /// A packet with every field at its default and no body.
    ///
    /// Length fields already describe the default content so that encoding yields a well formed
    /// minimal header.
    pub fn new(protocol: &'static Protocol) -> Self {
        let fields = protocol.schema().fields();
        let mut packet = Packet {
            protocol,
            values: fields.iter().map(|field| field.default_value()).collect(),
            pinned: vec![false; fields.len()],
            fresh: false,
            body: Body::Trailing(Vec::new()),
        };

        if let Err(err) = packet.sync_length() {
            net_debug!("{}: defaults disagree with their length field: {}", protocol.name(), err);
        }

        packet
    }

    /// The protocol definition.
    pub fn protocol(&self) -> &'static Protocol {
        self.protocol
    }

    /// The name of the protocol.
    pub fn name(&self) -> &'static str {
        self.protocol.name()
    }

    /// The value of a field or bit field.
    pub fn get(&self, name: &str) -> Result<Value> {
        let slot = self.protocol.schema().resolve(name)?;
        Ok(self.load(slot))
    }

    /// The value of an unsigned integer field, bit field or computed field.
    pub fn uint(&self, name: &str) -> Result<u64> {
        match self.get(name)? {
            Value::Uint(value) => Ok(value),
            _ => Err(Error::InvalidFieldValue),
        }
    }

    /// The value of a signed integer field.
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.get(name)? {
            Value::Int(value) => Ok(value),
            _ => Err(Error::InvalidFieldValue),
        }
    }

    /// The value of a fixed or variable byte field.
    pub fn bytes(&self, name: &str) -> Result<&[u8]> {
        match self.protocol.schema().resolve(name)? {
            Slot::Field(index) => self.values[index]
                .as_bytes()
                .ok_or(Error::InvalidFieldValue),
            Slot::Bits(..) => Err(Error::InvalidFieldValue),
        }
    }

    /// Change the value of a field or bit field.
    ///
    /// Integers must fit the field and fixed byte fields take exactly their width. Setting the
    /// variable field also updates the field holding its length, while setting that length field
    /// directly to a value that disagrees with the variable field fails. Setting a computed field
    /// pins it to the value, see [`pin`].
    ///
    /// Returns `Err(Error::UnknownField)` for names the schema does not declare and
    /// `Err(Error::InvalidFieldValue)` if the value is rejected. The packet is unchanged on error.
    ///
    /// [`pin`]: #method.pin
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let schema = self.protocol.schema();
        let value = value.into();

        match schema.resolve(name)? {
            Slot::Field(index) => {
                let field = &schema.fields()[index];
                let value = field.normalize(value)?;
                if field.kind().is_computed() {
                    self.values[index] = value;
                    self.pinned[index] = true;
                } else {
                    self.assign(name, index, value)?;
                }
            },
            Slot::Bits(index, bits) => {
                let value = value.as_uint()
                    .filter(|&value| value <= bits.max())
                    .ok_or(Error::InvalidFieldValue)?;
                let raw = self.values[index].as_uint().unwrap_or(0);
                self.assign(name, index, Value::Uint(bits.insert(raw, value)))?;
            },
        }

        self.touch();
        Ok(())
    }

    /// Fix a computed field to a manual value that encoding does not overwrite.
    ///
    /// Returns `Err(Error::InvalidFieldValue)` if the field is not computed.
    pub fn pin(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.computed(name)?;
        self.set(name, value)
    }

    /// Let encoding compute a field again.
    pub fn unpin(&mut self, name: &str) -> Result<()> {
        let index = self.computed(name)?;
        self.pinned[index] = false;
        self.touch();
        Ok(())
    }

    /// If a computed field has a manual value.
    pub fn is_pinned(&self, name: &str) -> Result<bool> {
        let index = self.computed(name)?;
        Ok(self.pinned[index])
    }

    /// The body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The bytes after the header that were not decoded as a next layer.
    ///
    /// Empty if there is a next layer.
    pub fn trailing(&self) -> &[u8] {
        match &self.body {
            Body::Trailing(bytes) => bytes,
            Body::Next(_) => &[],
        }
    }

    /// Replace the body with raw bytes, discarding the next layer.
    pub fn set_trailing(&mut self, bytes: impl Into<Vec<u8>>) {
        self.body = Body::Trailing(bytes.into());
        self.touch();
    }

    /// The next layer, if the body was decoded or set as one.
    pub fn next_layer(&self) -> Option<&Packet> {
        match &self.body {
            Body::Next(packet) => Some(packet.as_ref()),
            Body::Trailing(_) => None,
        }
    }

    /// Mutable access to the next layer.
    ///
    /// Computed fields of this layer are recomputed on the next encode since they may cover the
    /// body.
    pub fn next_layer_mut(&mut self) -> Option<&mut Packet> {
        match &mut self.body {
            Body::Next(packet) => {
                self.fresh = false;
                Some(packet.as_mut())
            },
            Body::Trailing(_) => None,
        }
    }

    /// Replace the body with a next layer.
    ///
    /// If the protocol of `next` is registered in this layer's dispatch registry, the
    /// discriminant field is set to the lowest discriminant it is registered under. Otherwise the
    /// discriminant stays as it is.
    ///
    /// Returns `Err(Error::InvalidFieldValue)` if that discriminant does not fit its field, the
    /// packet is unchanged then.
    pub fn set_next_layer(&mut self, next: Packet) -> Result<()> {
        if let Some(dispatch) = self.protocol.schema().next() {
            if let Some(discriminant) = dispatch.registry().discriminant_of(next.protocol) {
                let slot = self.protocol.schema().resolve(dispatch.field())?;
                if !fits_source(self.protocol.schema(), slot, discriminant) {
                    return Err(Error::InvalidFieldValue);
                }
                self.store(slot, discriminant);
            }
        }

        self.body = Body::Next(Box::new(next));
        self.touch();
        Ok(())
    }

    /// Remove the next layer, leaving an empty body.
    pub fn take_next_layer(&mut self) -> Option<Packet> {
        match mem::replace(&mut self.body, Body::Trailing(Vec::new())) {
            Body::Next(packet) => {
                self.touch();
                Some(*packet)
            },
            trailing => {
                self.body = trailing;
                None
            },
        }
    }

    /// This layer and all layers within, outermost first.
    pub fn layers(&self) -> impl Iterator<Item=&Packet> + '_ {
        let mut next = Some(self);
        core::iter::from_fn(move || {
            let current = next?;
            next = current.next_layer();
            Some(current)
        })
    }

    /// The outermost layer of a protocol, by name.
    pub fn layer(&self, name: &str) -> Option<&Packet> {
        self.layers().find(|packet| packet.name() == name)
    }

    /// The number of layers, including this one.
    pub fn depth(&self) -> usize {
        self.layers().count()
    }

    /// The number of header bytes of this layer.
    pub fn header_len(&self) -> usize {
        self.protocol.schema()
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(field, value)| match field.width() {
                Some(width) => width,
                None => value.as_bytes().map_or(0, <[u8]>::len),
            })
            .sum()
    }

    /// The number of bytes of the encoded packet, including all layers within.
    pub fn len(&self) -> usize {
        self.layers()
            .map(|layer| layer.header_len() + layer.trailing().len())
            .sum()
    }

    /// If the encoded packet has no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }

    /// The index of a computed field.
    fn computed(&self, name: &str) -> Result<usize> {
        let schema = self.protocol.schema();
        match schema.resolve(name)? {
            Slot::Field(index) if schema.fields()[index].kind().is_computed() => Ok(index),
            _ => Err(Error::InvalidFieldValue),
        }
    }

    fn load(&self, slot: Slot) -> Value {
        match slot {
            Slot::Field(index) => self.values[index].clone(),
            Slot::Bits(index, bits) => {
                Value::Uint(bits.extract(self.values[index].as_uint().unwrap_or(0)))
            },
        }
    }

    fn store(&mut self, slot: Slot, value: u64) {
        match slot {
            Slot::Field(index) => self.values[index] = Value::Uint(value),
            Slot::Bits(index, bits) => {
                let raw = self.values[index].as_uint().unwrap_or(0);
                self.values[index] = Value::Uint(bits.insert(raw, value));
            },
        }
    }

    /// Store a normalized value and keep the length of the variable field consistent.
    fn assign(&mut self, name: &str, index: usize, value: Value) -> Result<()> {
        let previous = mem::replace(&mut self.values[index], value);
        let checked = match self.required_length() {
            Ok(Some((source, slot, length))) if source == name => {
                match self.load(slot).as_uint() {
                    Some(current) if current == length => Ok(()),
                    _ => Err(Error::InvalidFieldValue),
                }
            },
            Ok(Some((_, slot, length))) => {
                self.store(slot, length);
                Ok(())
            },
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };

        if checked.is_err() {
            self.values[index] = previous;
        }
        checked
    }

    /// Rewrite the length source of the variable field.
    fn sync_length(&mut self) -> Result<()> {
        if let Some((_, slot, length)) = self.required_length()? {
            self.store(slot, length);
        }
        Ok(())
    }

    /// The value the length source must hold for the current variable field.
    fn required_length(&self) -> Result<Option<(&'static str, Slot, u64)>> {
        let schema = self.protocol.schema();
        let (index, _, source) = match schema.variable() {
            Some(variable) => variable,
            None => return Ok(None),
        };

        let len = self.values[index].as_bytes().map_or(0, <[u8]>::len);
        let (name, length) = match source {
            LengthSource::Remaining => return Ok(None),
            LengthSource::Field(name) => (name, len),
            LengthSource::HeaderLength { field, unit } => {
                let total = schema.offset_of(index) + len;
                let unit = usize::from(unit);
                if unit == 0 || total % unit != 0 {
                    return Err(Error::InvalidFieldValue);
                }
                (field, total / unit)
            },
        };

        let slot = schema.resolve(name)?;
        let length = u64::try_from(length).map_err(|_| Error::InvalidFieldValue)?;
        if !fits_source(schema, slot, length) {
            return Err(Error::InvalidFieldValue);
        }

        Ok(Some((name, slot, length)))
    }

    /// Mark computed values of this layer and all layers within as outdated.
    fn touch(&mut self) {
        let mut layer = Some(self);
        while let Some(packet) = layer {
            packet.fresh = false;
            layer = match &mut packet.body {
                Body::Next(next) => Some(&mut **next),
                Body::Trailing(_) => None,
            };
        }
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Packet) -> bool {
        self.protocol.same(other.protocol)
            && self.values == other.values
            && self.body == other.body
    }
}

impl Eq for Packet { }

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut debug = f.debug_struct("Packet");
        debug.field("protocol", &self.protocol.name());
        for (field, value) in self.protocol.schema().fields().iter().zip(&self.values) {
            debug.field(field.name(), value);
        }
        debug.field("body", &self.body).finish()
    }
}

impl fmt::Debug for Ancestors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(Packet::name))
            .finish()
    }
}

#[cfg(test)]
mod tests;
