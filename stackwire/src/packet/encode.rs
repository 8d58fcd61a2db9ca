use core::ops::Range;

use crate::schema::{CHECKSUM, ChecksumSpec, Computed, Coverage, Int, Kind, LengthSpec, Value};
use crate::wire::{Checksum, Error, Result, Writer};
use crate::wire::checksum::Accumulator;

use super::{Ancestors, Body, Options, Packet};

/// How computed fields are treated while emitting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Recompute whatever is neither pinned nor fresh.
    Compute(Checksum),
    /// Write the stored values and check each checksum against the bytes.
    Verify,
}

/// The outcome of checking one stored checksum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Verdict {
    /// The layer, counted from the emitted packet starting at zero.
    pub(crate) depth: usize,
    pub(crate) field: &'static str,
    pub(crate) valid: bool,
}

#[derive(Default)]
struct Report {
    /// Values written for computed fields, by layer and field index.
    computed: Vec<(usize, usize, u64)>,
    verdicts: Vec<Verdict>,
}

/// Where the parts of one layer ended up in the output.
struct Layout {
    offsets: Vec<usize>,
    start: usize,
    header_end: usize,
    end: usize,
}

impl Packet {
    /// Encode the packet and all layers within it.
    ///
    /// Uses the default [`Options`]: unbounded output, checksums computed.
    ///
    /// [`Options`]: struct.Options.html
    pub fn encode(&mut self) -> Result<Vec<u8>> {
        self.encode_with(&Options::default())
    }

    /// Encode with explicit options.
    ///
    /// Fields are written in declaration order followed by the body. Computed fields are filled
    /// in last, lengths before checksums, unless they were pinned or the packet is unchanged since
    /// it was decoded. A decoded packet thus encodes to the bytes it was decoded from, even if
    /// those carry an incorrect checksum.
    ///
    /// The values written for computed fields are stored, so that the getters return them and
    /// decoding the output yields a packet equal to this one.
    ///
    /// Returns `Err(Error::CapacityExceeded)` if the output would exceed `options.capacity` and
    /// `Err(Error::InvalidFieldValue)` if a computed length does not fit its field. The packet is
    /// unchanged on error.
    pub fn encode_with(&mut self, options: &Options) -> Result<Vec<u8>> {
        let mut writer = match options.capacity {
            Some(limit) => Writer::with_limit(limit),
            None => Writer::new(),
        };
        self.emit(&mut writer, options)?;
        Ok(writer.into_inner())
    }

    /// Append the encoded packet to a writer.
    ///
    /// The capacity of `options` is ignored, the writer carries its own limit.
    pub fn emit(&mut self, writer: &mut Writer, options: &Options) -> Result<()> {
        let mut report = Report::default();
        self.emit_layer(writer, None, Mode::Compute(options.checksum), 0, &mut report)?;
        // Zeroes left for an offloading device are recomputed by the next encode.
        self.record(&report, options.checksum.manual());
        Ok(())
    }

    /// Compute all computed fields of the chain and store them.
    ///
    /// Like `encode` without output, except that values of a decoded and unchanged chain are
    /// recomputed as well. Pinned values are kept.
    pub fn refresh(&mut self) -> Result<()> {
        self.touch();
        self.emit(&mut Writer::new(), &Options::default())
    }

    /// Check a checksum field of this layer against the encoded bytes.
    ///
    /// Layers enclosing this one are unknown here. A checksum over a pseudo-header of those can
    /// only be checked through [`verify_checksums`] on the outermost layer.
    ///
    /// Returns `Err(Error::InvalidFieldValue)` if the field is no checksum and
    /// `Err(Error::Unverifiable)` if it includes a pseudo-header.
    ///
    /// [`verify_checksums`]: #method.verify_checksums
    pub fn verify_checksum(&self, name: &str) -> Result<bool> {
        let index = self.computed(name)?;
        match self.protocol.schema().fields()[index].kind() {
            Kind::Computed(Computed::Checksum(checksum)) if checksum.pseudo.is_some() => {
                return Err(Error::Unverifiable)
            },
            Kind::Computed(Computed::Checksum(_)) => (),
            _ => return Err(Error::InvalidFieldValue),
        }

        let verdicts = self.verdicts()?;
        Ok(verdicts.iter()
            .filter(|verdict| verdict.depth == 0 && verdict.field == name)
            .all(|verdict| verdict.valid))
    }

    /// Check every checksum in the chain.
    ///
    /// A stored zero is accepted for checksums where zero means that none was computed. A chain
    /// that can not be encoded at all does not verify.
    pub fn verify_checksums(&self) -> bool {
        match self.verdicts() {
            Ok(verdicts) => verdicts.iter().all(|verdict| verdict.valid),
            Err(_) => false,
        }
    }

    /// The check of every stored checksum in the chain.
    pub(crate) fn verdicts(&self) -> Result<Vec<Verdict>> {
        let mut writer = Writer::new();
        let mut report = Report::default();
        self.emit_layer(&mut writer, None, Mode::Verify, 0, &mut report)?;
        Ok(report.verdicts)
    }

    fn emit_layer(
        &self,
        writer: &mut Writer,
        ancestors: Option<&Ancestors>,
        mode: Mode,
        depth: usize,
        report: &mut Report,
    ) -> Result<()> {
        let fields = self.protocol.schema().fields();
        let start = writer.position();
        let mut offsets = Vec::with_capacity(fields.len());

        for (index, field) in fields.iter().enumerate() {
            offsets.push(writer.position());
            let value = &self.values[index];
            match field.kind() {
                Kind::Int(int) => write_int(writer, int, value)?,
                Kind::Bytes(_) | Kind::Variable(_) => {
                    writer.write(value.as_bytes().ok_or(Error::InvalidFieldValue)?)?
                },
                Kind::Computed(_) => {
                    let int = field.kind().int().ok_or(Error::InvalidSchema)?;
                    if self.keeps(index, mode) {
                        write_int(writer, int, value)?
                    } else {
                        write_int(writer, int, &Value::Uint(0))?
                    }
                },
            }
        }

        let header_end = writer.position();
        match &self.body {
            Body::Next(next) => {
                let here = Ancestors { packet: self, parent: ancestors };
                next.emit_layer(writer, Some(&here), mode, depth + 1, report)?;
            },
            Body::Trailing(bytes) => writer.write(bytes)?,
        }

        let layout = Layout {
            offsets,
            start,
            header_end,
            end: writer.position(),
        };

        for (index, field) in fields.iter().enumerate() {
            if let Kind::Computed(Computed::Length(length)) = field.kind() {
                if !self.keeps(index, mode) {
                    let value = self.length(&length, &layout)?;
                    let int = length.int;
                    writer.patch_uint(layout.offsets[index], value, int.width.into(), int.order)?;
                    report.computed.push((depth, index, value));
                }
            }
        }

        for (index, field) in fields.iter().enumerate() {
            if let Kind::Computed(Computed::Checksum(checksum)) = field.kind() {
                let at = layout.offsets[index];
                match mode {
                    Mode::Verify => {
                        let stored = self.values[index].as_uint().unwrap_or(0);
                        let valid = (checksum.zero_means_absent && stored == 0)
                            || compute(&checksum, writer, &layout, at, ancestors)? == stored;
                        report.verdicts.push(Verdict {
                            depth,
                            field: field.name(),
                            valid,
                        });
                    },
                    Mode::Compute(_) if self.keeps(index, mode) => (),
                    Mode::Compute(policy) => {
                        let value = if policy.manual() {
                            compute(&checksum, writer, &layout, at, ancestors)?
                        } else {
                            0
                        };
                        writer.patch_uint(at, value, CHECKSUM.width.into(), CHECKSUM.order)?;
                        report.computed.push((depth, index, value));
                    },
                }
            }
        }

        Ok(())
    }

    /// Store the computed values of an emit in the chain.
    fn record(&mut self, report: &Report, settled: bool) {
        let mut layer = Some(self);
        let mut depth = 0;
        while let Some(packet) = layer {
            for &(at, index, value) in &report.computed {
                if at == depth {
                    packet.values[index] = Value::Uint(value);
                }
            }
            if settled {
                packet.fresh = true;
            }
            depth += 1;
            layer = match &mut packet.body {
                Body::Next(next) => Some(next.as_mut()),
                Body::Trailing(_) => None,
            };
        }
    }

    /// If a computed field is written as stored.
    fn keeps(&self, index: usize, mode: Mode) -> bool {
        match mode {
            Mode::Verify => true,
            Mode::Compute(_) => self.fresh || self.pinned[index],
        }
    }

    fn length(&self, length: &LengthSpec, layout: &Layout) -> Result<u64> {
        let covered = layout.covered(length.covers).len();
        let unit = usize::from(length.unit);
        if unit == 0 || covered % unit != 0 {
            net_debug!("{}: length {} is not a multiple of {}", self.name(), covered, unit);
            return Err(Error::InvalidFieldValue);
        }
        u64::try_from(covered / unit).map_err(|_| Error::InvalidFieldValue)
    }
}

impl Layout {
    fn covered(&self, covers: Coverage) -> Range<usize> {
        match covers {
            Coverage::Header => self.start..self.header_end,
            Coverage::Body => self.header_end..self.end,
            Coverage::Packet => self.start..self.end,
        }
    }
}

fn write_int(writer: &mut Writer, int: Int, value: &Value) -> Result<()> {
    let width = usize::from(int.width);
    if int.signed {
        let value = value.as_int().ok_or(Error::InvalidFieldValue)?;
        writer.write_int(value, width, int.order)
    } else {
        let value = value.as_uint().ok_or(Error::InvalidFieldValue)?;
        writer.write_uint(value, width, int.order)
    }
}

/// The checksum over the covered bytes, with the checksum field itself counted as zero.
fn compute(
    checksum: &ChecksumSpec,
    writer: &Writer,
    layout: &Layout,
    at: usize,
    ancestors: Option<&Ancestors>,
) -> Result<u64> {
    let range = layout.covered(checksum.covers);
    let bytes = writer.slice(range.clone())?;

    let mut accum = Accumulator::new();
    if let (Some(pseudo), Some(ancestors)) = (checksum.pseudo, ancestors) {
        pseudo(ancestors, bytes.len(), &mut accum);
    }

    // A field on an odd position straddles two words of the sum, its value is stored swapped.
    let mut swapped = false;
    if range.contains(&at) && at + 2 <= range.end {
        let field = at - range.start;
        accum.add(&bytes[..field]);
        swapped = accum.is_odd();
        accum.add(&[0, 0]);
        accum.add(&bytes[field + 2..]);
    } else {
        accum.add(bytes);
    }

    let sum = if swapped {
        accum.finish().swap_bytes()
    } else {
        accum.finish()
    };
    if checksum.zero_means_absent && sum == 0 {
        Ok(0xffff)
    } else {
        Ok(sum.into())
    }
}
