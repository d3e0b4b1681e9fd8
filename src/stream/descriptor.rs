//! Endpoint descriptors and the units (beats) they describe

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::bits::fits;
use crate::{Result, SataError};

/// Widest single field a descriptor may declare
pub const MAX_FIELD_WIDTH: u32 = 64;

/// One named field of an endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDesc {
    pub name: String,
    pub width: u32,
}

/// Ordered field layout of a stream endpoint
///
/// Fields are concatenated left to right: the first field occupies the least
/// significant bits of the flattened unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointDescriptor {
    fields: Vec<FieldDesc>,
    packetized: bool,
}

impl EndpointDescriptor {
    /// Build a descriptor, rejecting duplicate names and out-of-range widths
    pub fn new<I, S>(layout: I, packetized: bool) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for (name, width) in layout {
            let name = name.into();
            if width == 0 || width > MAX_FIELD_WIDTH {
                return Err(SataError::InvalidWidth(width));
            }
            if !seen.insert(name.clone()) {
                return Err(SataError::DuplicateField(name));
            }
            fields.push(FieldDesc { name, width });
        }
        Ok(Arc::new(Self { fields, packetized }))
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Stream carries start/end-of-packet markers
    pub fn is_packetized(&self) -> bool {
        self.packetized
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn width_of(&self, name: &str) -> Option<u32> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.width)
    }

    /// Sum of all field widths
    pub fn total_width(&self) -> u32 {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// Bit position of a field inside the flattened unit
    pub fn offset_of(&self, name: &str) -> Option<u32> {
        let idx = self.index_of(name)?;
        Some(self.fields[..idx].iter().map(|f| f.width).sum())
    }

    /// Structural comparison used before two endpoints are connected
    pub fn check_compatible(&self, other: &EndpointDescriptor) -> Result<()> {
        if self.packetized != other.packetized {
            return Err(SataError::DescriptorMismatch(format!(
                "packetized {} vs {}",
                self.packetized, other.packetized
            )));
        }
        if self.fields.len() != other.fields.len() {
            return Err(SataError::DescriptorMismatch(format!(
                "{} fields vs {}",
                self.fields.len(),
                other.fields.len()
            )));
        }
        for (a, b) in self.fields.iter().zip(&other.fields) {
            if a != b {
                return Err(SataError::DescriptorMismatch(format!(
                    "{}({}) vs {}({})",
                    a.name, a.width, b.name, b.width
                )));
            }
        }
        Ok(())
    }

    /// Empty unit with every field zero and no packet markers
    pub fn beat(self: &Arc<Self>) -> Beat {
        Beat {
            values: vec![0; self.fields.len()],
            desc: Arc::clone(self),
            first: false,
            last: false,
        }
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", field.name, field.width)?;
        }
        write!(f, "]{}", if self.packetized { " packetized" } else { "" })
    }
}

/// One unit transferred over a stream endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beat {
    desc: Arc<EndpointDescriptor>,
    values: Vec<u64>,
    /// Start of packet
    pub first: bool,
    /// End of packet
    pub last: bool,
}

impl Beat {
    pub fn descriptor(&self) -> &Arc<EndpointDescriptor> {
        &self.desc
    }

    /// Field values in descriptor order
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Result<u64> {
        self.desc
            .index_of(name)
            .map(|idx| self.values[idx])
            .ok_or_else(|| SataError::UnknownField(name.to_string()))
    }

    /// Read a field as a flag (non-zero is set)
    pub fn flag(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)? != 0)
    }

    /// Write a field; values wider than the field are rejected
    pub fn set(&mut self, name: &str, value: u64) -> Result<()> {
        let idx = self
            .desc
            .index_of(name)
            .ok_or_else(|| SataError::UnknownField(name.to_string()))?;
        let width = self.desc.fields[idx].width;
        if !fits(value, width) {
            return Err(SataError::FieldOverflow {
                field: name.to_string(),
                value,
                width,
            });
        }
        self.values[idx] = value;
        Ok(())
    }

    pub fn with(mut self, name: &str, value: u64) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn with_markers(mut self, first: bool, last: bool) -> Self {
        self.first = first;
        self.last = last;
        self
    }
}
