use crate::schema::{Int, Kind, LengthSource, Protocol, Schema, Slot, Value};
use crate::wire::{Error, Reader, Result};

use super::{Body, Options, Packet};

impl Packet {
    /// Decode a packet and every layer within it that a registry knows.
    ///
    /// Uses the default [`Options`].
    ///
    /// [`Options`]: struct.Options.html
    pub fn decode(protocol: &'static Protocol, bytes: &[u8]) -> Result<Packet> {
        Packet::decode_with(protocol, bytes, &Options::default())
    }

    /// Decode a packet with explicit options.
    ///
    /// The fields are read in order. The bytes after the header become the body: if the schema
    /// dispatches on a discriminant that its registry knows, they are decoded as the next layer.
    /// Errors of the next layer are not errors of this one, the bytes then stay trailing data.
    ///
    /// Returns `Err(Error::Truncated)` if `bytes` ends within a field of this layer and
    /// `Err(Error::Malformed)` if a header length is shorter than the fixed fields. Checksums are
    /// never checked here, see [`verify_checksums`].
    ///
    /// [`verify_checksums`]: #method.verify_checksums
    pub fn decode_with(protocol: &'static Protocol, bytes: &[u8], options: &Options)
        -> Result<Packet>
    {
        decode_layer(protocol, bytes, options, 1)
    }
}

fn decode_layer(protocol: &'static Protocol, bytes: &[u8], options: &Options, depth: usize)
    -> Result<Packet>
{
    let schema = protocol.schema();
    let mut reader = Reader::new(bytes);
    let mut values = Vec::with_capacity(schema.fields().len());

    for (index, field) in schema.fields().iter().enumerate() {
        let value = match field.kind() {
            Kind::Int(int) => read_int(&mut reader, int)?,
            Kind::Bytes(width) => Value::Bytes(reader.read(width)?.to_vec()),
            Kind::Variable(source) => {
                let len = variable_len(schema, &values, index, source, reader.remaining())?;
                Value::Bytes(reader.read(len)?.to_vec())
            },
            Kind::Computed(_) => match field.kind().int() {
                Some(int) => read_int(&mut reader, int)?,
                None => return Err(Error::InvalidSchema),
            },
        };
        values.push(value);
    }

    let header = reader.position();
    let rest = reader.rest();
    let mut body = Body::Trailing(rest.to_vec());

    if let Some(dispatch) = schema.next() {
        let discriminant = raw(&values, schema.resolve(dispatch.field())?)?;
        if header == 0 {
            net_debug!("{}: empty header, not decoding the body", protocol.name());
        } else if depth >= options.max_depth {
            net_debug!("{}: depth limit {} reached", protocol.name(), options.max_depth);
        } else {
            let registry = dispatch.registry();
            match registry.lookup(discriminant) {
                Some(next) => match decode_layer(next, rest, options, depth + 1) {
                    Ok(packet) => body = Body::Next(Box::new(packet)),
                    Err(err) => {
                        net_debug!("{}: body is no valid {}: {}",
                            protocol.name(), next.name(), err);
                    },
                },
                None => {
                    net_trace!("{}: {:#x} not in registry {}",
                        protocol.name(), discriminant, registry.name());
                },
            }
        }
    }

    Ok(Packet {
        protocol,
        pinned: vec![false; values.len()],
        values,
        fresh: true,
        body,
    })
}

fn read_int(reader: &mut Reader, int: Int) -> Result<Value> {
    let width = usize::from(int.width);
    if int.signed {
        Ok(Value::Int(reader.read_int(width, int.order)?))
    } else {
        Ok(Value::Uint(reader.read_uint(width, int.order)?))
    }
}

/// The unsigned value of an already decoded field or bit field.
fn raw(values: &[Value], slot: Slot) -> Result<u64> {
    let (index, bits) = match slot {
        Slot::Field(index) => (index, None),
        Slot::Bits(index, bits) => (index, Some(bits)),
    };

    let value = values.get(index)
        .and_then(Value::as_uint)
        .ok_or(Error::InvalidSchema)?;
    Ok(match bits {
        Some(bits) => bits.extract(value),
        None => value,
    })
}

fn variable_len(
    schema: &Schema,
    values: &[Value],
    index: usize,
    source: LengthSource,
    remaining: usize,
) -> Result<usize> {
    match source {
        LengthSource::Remaining => Ok(remaining),
        LengthSource::Field(name) => {
            let len = raw(values, schema.resolve(name)?)?;
            // A length beyond the address space is beyond the input as well.
            usize::try_from(len).map_err(|_| Error::Truncated)
        },
        LengthSource::HeaderLength { field, unit } => {
            let units = raw(values, schema.resolve(field)?)?;
            let total = usize::try_from(units).ok()
                .and_then(|units| units.checked_mul(usize::from(unit)))
                .ok_or(Error::Truncated)?;
            let prefix = schema.offset_of(index);
            total.checked_sub(prefix).ok_or(Error::Malformed)
        },
    }
}
