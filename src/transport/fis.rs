//! FIS (Frame Information Structure) layouts and codec
//!
//! Each layout maps field names to a (dword, bit offset, bit width) location.
//! The generic codec works strictly per declared field; values split over
//! several fields (48-bit LBA, 16-bit features) are joined by the typed
//! frames further down.

use std::collections::BTreeMap;
use std::fmt;

use crate::bits::{fits, mask};
use crate::command::StatusFlags;
use crate::{Result, SataError};

/// Largest FIS, header included, in dwords
pub const FIS_MAX_DWORDS: usize = 2048;

/// FIS types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FisType {
    /// Register FIS - host to device
    RegH2d = 0x27,
    /// Register FIS - device to host
    RegD2h = 0x34,
    /// DMA activate FIS - device to host
    DmaActivateD2h = 0x39,
    /// PIO setup FIS - device to host
    PioSetupD2h = 0x5F,
    /// Data FIS - bidirectional
    Data = 0x46,
}

impl FisType {
    pub const ALL: [FisType; 5] = [
        FisType::RegH2d,
        FisType::RegD2h,
        FisType::DmaActivateD2h,
        FisType::PioSetupD2h,
        FisType::Data,
    ];

    /// Type byte in bits 7:0 of dword 0
    pub const fn byte(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            FisType::RegH2d => "REG_H2D",
            FisType::RegD2h => "REG_D2H",
            FisType::DmaActivateD2h => "DMA_ACTIVATE_D2H",
            FisType::PioSetupD2h => "PIO_SETUP_D2H",
            FisType::Data => "DATA",
        }
    }

    pub fn layout(self) -> &'static FisLayout {
        match self {
            FisType::RegH2d => &REG_H2D_LAYOUT,
            FisType::RegD2h => &REG_D2H_LAYOUT,
            FisType::DmaActivateD2h => &DMA_ACTIVATE_D2H_LAYOUT,
            FisType::PioSetupD2h => &PIO_SETUP_D2H_LAYOUT,
            FisType::Data => &DATA_LAYOUT,
        }
    }
}

impl TryFrom<u8> for FisType {
    type Error = SataError;

    fn try_from(byte: u8) -> Result<Self> {
        FisType::ALL
            .iter()
            .copied()
            .find(|t| t.byte() == byte)
            .ok_or(SataError::UnknownFisType(byte))
    }
}

impl fmt::Display for FisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Location of one field inside a FIS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FisField {
    pub dword: usize,
    pub offset: u32,
    pub width: u32,
}

impl FisField {
    pub const fn new(dword: usize, offset: u32, width: u32) -> Self {
        Self { dword, offset, width }
    }

    /// Bits covered by the field within its dword
    pub const fn dword_mask(self) -> u32 {
        (mask(self.width) as u32) << self.offset
    }

    fn extract(self, dwords: &[u32]) -> u64 {
        ((dwords[self.dword] >> self.offset) as u64) & mask(self.width)
    }

    fn insert(self, dwords: &mut [u32], value: u64) {
        let word = &mut dwords[self.dword];
        *word = (*word & !self.dword_mask()) | ((value as u32) << self.offset);
    }
}

/// Field layout of one FIS type
#[derive(Debug)]
pub struct FisLayout {
    pub fis_type: FisType,
    /// Dwords of a typical command (DATA: header only)
    pub cmd_len: usize,
    pub fields: &'static [(&'static str, FisField)],
}

pub static REG_H2D_LAYOUT: FisLayout = FisLayout {
    fis_type: FisType::RegH2d,
    cmd_len: 5,
    fields: &[
        ("type", FisField::new(0, 0, 8)),
        ("pm_port", FisField::new(0, 8, 4)),
        ("c", FisField::new(0, 15, 1)),
        ("command", FisField::new(0, 16, 8)),
        ("features_lsb", FisField::new(0, 24, 8)),
        ("lba_lsb", FisField::new(1, 0, 24)),
        ("device", FisField::new(1, 24, 8)),
        ("lba_msb", FisField::new(2, 0, 24)),
        ("features_msb", FisField::new(2, 24, 8)),
        ("count", FisField::new(3, 0, 16)),
        ("icc", FisField::new(3, 16, 8)),
        ("control", FisField::new(3, 24, 8)),
    ],
};

pub static REG_D2H_LAYOUT: FisLayout = FisLayout {
    fis_type: FisType::RegD2h,
    cmd_len: 5,
    fields: &[
        ("type", FisField::new(0, 0, 8)),
        ("pm_port", FisField::new(0, 8, 4)),
        ("i", FisField::new(0, 14, 1)),
        ("status", FisField::new(0, 16, 8)),
        ("error", FisField::new(0, 24, 8)),
        ("lba_lsb", FisField::new(1, 0, 24)),
        ("device", FisField::new(1, 24, 8)),
        ("lba_msb", FisField::new(2, 0, 24)),
        ("count", FisField::new(3, 0, 16)),
    ],
};

pub static DMA_ACTIVATE_D2H_LAYOUT: FisLayout = FisLayout {
    fis_type: FisType::DmaActivateD2h,
    cmd_len: 1,
    fields: &[
        ("type", FisField::new(0, 0, 8)),
        ("pm_port", FisField::new(0, 8, 4)),
    ],
};

pub static PIO_SETUP_D2H_LAYOUT: FisLayout = FisLayout {
    fis_type: FisType::PioSetupD2h,
    cmd_len: 5,
    fields: &[
        ("type", FisField::new(0, 0, 8)),
        ("pm_port", FisField::new(0, 8, 4)),
        ("d", FisField::new(0, 13, 1)),
        ("i", FisField::new(0, 14, 1)),
        ("status", FisField::new(0, 16, 8)),
        ("error", FisField::new(0, 24, 8)),
        ("lba_lsb", FisField::new(1, 0, 24)),
        ("lba_msb", FisField::new(2, 0, 24)),
        ("count", FisField::new(3, 0, 16)),
        ("transfer_count", FisField::new(4, 0, 16)),
    ],
};

pub static DATA_LAYOUT: FisLayout = FisLayout {
    fis_type: FisType::Data,
    cmd_len: 1,
    fields: &[("type", FisField::new(0, 0, 8))],
};

impl FisLayout {
    pub fn field(&self, name: &str) -> Option<FisField> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, field)| *field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    /// Record with the type byte filled in and every other field zero
    pub fn new_record(&self) -> FisRecord {
        let mut record = FisRecord::new();
        for (name, _) in self.fields {
            record.set(name, 0);
        }
        record.set("type", self.fis_type.byte() as u64);
        record
    }

    /// Check field placement: inside a dword, below `cmd_len`, no overlaps
    pub fn validate(&self) -> Result<()> {
        let mut used = vec![0u32; self.cmd_len];
        for (name, field) in self.fields {
            if field.width == 0 || field.offset + field.width > 32 {
                return Err(SataError::FieldOutOfRange {
                    field: name.to_string(),
                    detail: format!("bits {}..{} of a dword", field.offset, field.offset + field.width),
                });
            }
            let slot = used
                .get_mut(field.dword)
                .ok_or_else(|| SataError::FieldOutOfRange {
                    field: name.to_string(),
                    detail: format!("dword {} of {}", field.dword, self.cmd_len),
                })?;
            if *slot & field.dword_mask() != 0 {
                return Err(SataError::OverlappingField(name.to_string()));
            }
            *slot |= field.dword_mask();
        }
        Ok(())
    }

    /// Encode a record into `cmd_len` dwords
    pub fn encode(&self, record: &FisRecord) -> Result<Vec<u32>> {
        self.encode_with_payload(record, &[])
    }

    /// Encode a record followed by payload dwords
    pub fn encode_with_payload(&self, record: &FisRecord, payload: &[u32]) -> Result<Vec<u32>> {
        let total = self.cmd_len + payload.len();
        if total > FIS_MAX_DWORDS {
            return Err(SataError::FisTooLarge {
                dwords: total,
                max: FIS_MAX_DWORDS,
            });
        }

        let mut dwords = vec![0u32; self.cmd_len];
        let type_field = FisField::new(0, 0, 8);
        type_field.insert(&mut dwords, self.fis_type.byte() as u64);

        for (name, value) in record.iter() {
            let field = self
                .field(name)
                .ok_or_else(|| SataError::UnknownField(name.to_string()))?;
            if !fits(value, field.width) {
                return Err(SataError::FieldOverflow {
                    field: name.to_string(),
                    value,
                    width: field.width,
                });
            }
            if name == "type" && value != self.fis_type.byte() as u64 {
                return Err(SataError::FisTypeMismatch {
                    expected: self.fis_type.byte(),
                    found: value as u8,
                });
            }
            field.insert(&mut dwords, value);
        }

        dwords.extend_from_slice(payload);
        Ok(dwords)
    }

    /// Decode the declared fields of a FIS
    ///
    /// Dwords beyond `cmd_len` are left to the caller (see [`FisLayout::payload`]).
    pub fn decode(&self, dwords: &[u32]) -> Result<FisRecord> {
        if dwords.len() > FIS_MAX_DWORDS {
            return Err(SataError::FisTooLarge {
                dwords: dwords.len(),
                max: FIS_MAX_DWORDS,
            });
        }
        if dwords.len() < self.cmd_len {
            return Err(SataError::FisTruncated {
                got: dwords.len(),
                need: self.cmd_len,
            });
        }
        let found = (dwords[0] & 0xFF) as u8;
        if found != self.fis_type.byte() {
            return Err(SataError::FisTypeMismatch {
                expected: self.fis_type.byte(),
                found,
            });
        }

        let mut record = FisRecord::new();
        for (name, field) in self.fields {
            record.set(name, field.extract(dwords));
        }
        Ok(record)
    }

    /// Dwords following the fixed part
    pub fn payload<'a>(&self, dwords: &'a [u32]) -> &'a [u32] {
        dwords.get(self.cmd_len..).unwrap_or(&[])
    }
}

/// Field values of one FIS, by name
///
/// Width-1 fields are flags; use [`FisRecord::flag`] and [`FisRecord::set_flag`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FisRecord {
    values: BTreeMap<String, u64>,
}

impl FisRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: u64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.set(name, value as u64);
    }

    pub fn with(mut self, name: &str, value: u64) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }

    /// Field value, failing when absent
    pub fn value(&self, name: &str) -> Result<u64> {
        self.get(name)
            .ok_or_else(|| SataError::UnknownField(name.to_string()))
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        Ok(self.value(name)? != 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn narrow<T: TryFrom<u64>>(&self, name: &str) -> Result<T> {
        let value = self.value(name)?;
        T::try_from(value).map_err(|_| SataError::FieldOverflow {
            field: name.to_string(),
            value,
            width: (std::mem::size_of::<T>() * 8) as u32,
        })
    }

    /// Join two 24-bit halves into a 48-bit LBA
    fn lba(&self) -> Result<u64> {
        Ok(self.value("lba_lsb")? | (self.value("lba_msb")? << 24))
    }
}

fn set_lba(record: &mut FisRecord, lba: u64) {
    record.set("lba_lsb", lba & mask(24));
    record.set("lba_msb", lba >> 24);
}

// ============================================================================
// Typed frames
// ============================================================================

/// Typed view of one FIS kind
pub trait FisFrame: Sized {
    const TYPE: FisType;

    /// Field values; multi-field values are split here
    fn to_record(&self) -> FisRecord;

    /// Rebuild from a decoded record and the dwords following the fixed part
    fn from_record(record: &FisRecord, payload: &[u32]) -> Result<Self>;

    fn payload(&self) -> &[u32] {
        &[]
    }

    fn encode(&self) -> Result<Vec<u32>> {
        Self::TYPE
            .layout()
            .encode_with_payload(&self.to_record(), self.payload())
    }

    fn decode(dwords: &[u32]) -> Result<Self> {
        let layout = Self::TYPE.layout();
        let record = layout.decode(dwords)?;
        Self::from_record(&record, layout.payload(dwords))
    }
}

/// Register FIS - host to device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegH2d {
    pub pm_port: u8,
    /// Command (set) or device control (clear) update
    pub c: bool,
    pub command: u8,
    pub features: u16,
    pub lba: u64,
    pub device: u8,
    pub count: u16,
    pub icc: u8,
    pub control: u8,
}

impl FisFrame for RegH2d {
    const TYPE: FisType = FisType::RegH2d;

    fn to_record(&self) -> FisRecord {
        let mut r = Self::TYPE.layout().new_record();
        r.set("pm_port", self.pm_port as u64);
        r.set_flag("c", self.c);
        r.set("command", self.command as u64);
        r.set("features_lsb", (self.features & 0xFF) as u64);
        r.set("features_msb", (self.features >> 8) as u64);
        set_lba(&mut r, self.lba);
        r.set("device", self.device as u64);
        r.set("count", self.count as u64);
        r.set("icc", self.icc as u64);
        r.set("control", self.control as u64);
        r
    }

    fn from_record(r: &FisRecord, _payload: &[u32]) -> Result<Self> {
        let features_lsb: u8 = r.narrow("features_lsb")?;
        let features_msb: u8 = r.narrow("features_msb")?;
        Ok(Self {
            pm_port: r.narrow("pm_port")?,
            c: r.flag("c")?,
            command: r.narrow("command")?,
            features: u16::from_le_bytes([features_lsb, features_msb]),
            lba: r.lba()?,
            device: r.narrow("device")?,
            count: r.narrow("count")?,
            icc: r.narrow("icc")?,
            control: r.narrow("control")?,
        })
    }
}

/// Register FIS - device to host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegD2h {
    pub pm_port: u8,
    /// Interrupt
    pub i: bool,
    pub status: u8,
    pub error: u8,
    pub lba: u64,
    pub device: u8,
    pub count: u16,
}

impl RegD2h {
    pub fn status_flags(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.status)
    }
}

impl FisFrame for RegD2h {
    const TYPE: FisType = FisType::RegD2h;

    fn to_record(&self) -> FisRecord {
        let mut r = Self::TYPE.layout().new_record();
        r.set("pm_port", self.pm_port as u64);
        r.set_flag("i", self.i);
        r.set("status", self.status as u64);
        r.set("error", self.error as u64);
        set_lba(&mut r, self.lba);
        r.set("device", self.device as u64);
        r.set("count", self.count as u64);
        r
    }

    fn from_record(r: &FisRecord, _payload: &[u32]) -> Result<Self> {
        Ok(Self {
            pm_port: r.narrow("pm_port")?,
            i: r.flag("i")?,
            status: r.narrow("status")?,
            error: r.narrow("error")?,
            lba: r.lba()?,
            device: r.narrow("device")?,
            count: r.narrow("count")?,
        })
    }
}

/// DMA activate FIS - device to host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmaActivateD2h {
    pub pm_port: u8,
}

impl FisFrame for DmaActivateD2h {
    const TYPE: FisType = FisType::DmaActivateD2h;

    fn to_record(&self) -> FisRecord {
        Self::TYPE
            .layout()
            .new_record()
            .with("pm_port", self.pm_port as u64)
    }

    fn from_record(r: &FisRecord, _payload: &[u32]) -> Result<Self> {
        Ok(Self {
            pm_port: r.narrow("pm_port")?,
        })
    }
}

/// PIO setup FIS - device to host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PioSetupD2h {
    pub pm_port: u8,
    /// Transfer direction, set for device to host
    pub d: bool,
    pub i: bool,
    pub status: u8,
    pub error: u8,
    pub lba: u64,
    pub count: u16,
    /// Bytes in the following DATA FIS
    pub transfer_count: u16,
}

impl PioSetupD2h {
    pub fn status_flags(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.status)
    }
}

impl FisFrame for PioSetupD2h {
    const TYPE: FisType = FisType::PioSetupD2h;

    fn to_record(&self) -> FisRecord {
        let mut r = Self::TYPE.layout().new_record();
        r.set("pm_port", self.pm_port as u64);
        r.set_flag("d", self.d);
        r.set_flag("i", self.i);
        r.set("status", self.status as u64);
        r.set("error", self.error as u64);
        set_lba(&mut r, self.lba);
        r.set("count", self.count as u64);
        r.set("transfer_count", self.transfer_count as u64);
        r
    }

    fn from_record(r: &FisRecord, _payload: &[u32]) -> Result<Self> {
        Ok(Self {
            pm_port: r.narrow("pm_port")?,
            d: r.flag("d")?,
            i: r.flag("i")?,
            status: r.narrow("status")?,
            error: r.narrow("error")?,
            lba: r.lba()?,
            count: r.narrow("count")?,
            transfer_count: r.narrow("transfer_count")?,
        })
    }
}

/// Data FIS - header dword followed by payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFis {
    pub payload: Vec<u32>,
}

impl DataFis {
    /// Most payload dwords one DATA FIS can carry
    pub const MAX_PAYLOAD_DWORDS: usize = FIS_MAX_DWORDS - 1;

    pub fn new(payload: Vec<u32>) -> Self {
        Self { payload }
    }
}

impl FisFrame for DataFis {
    const TYPE: FisType = FisType::Data;

    fn to_record(&self) -> FisRecord {
        Self::TYPE.layout().new_record()
    }

    fn from_record(_record: &FisRecord, payload: &[u32]) -> Result<Self> {
        Ok(Self {
            payload: payload.to_vec(),
        })
    }

    fn payload(&self) -> &[u32] {
        &self.payload
    }
}

/// Any supported FIS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fis {
    RegH2d(RegH2d),
    RegD2h(RegD2h),
    DmaActivateD2h(DmaActivateD2h),
    PioSetupD2h(PioSetupD2h),
    Data(DataFis),
}

impl Fis {
    pub fn fis_type(&self) -> FisType {
        match self {
            Fis::RegH2d(_) => FisType::RegH2d,
            Fis::RegD2h(_) => FisType::RegD2h,
            Fis::DmaActivateD2h(_) => FisType::DmaActivateD2h,
            Fis::PioSetupD2h(_) => FisType::PioSetupD2h,
            Fis::Data(_) => FisType::Data,
        }
    }

    pub fn encode(&self) -> Result<Vec<u32>> {
        match self {
            Fis::RegH2d(f) => f.encode(),
            Fis::RegD2h(f) => f.encode(),
            Fis::DmaActivateD2h(f) => f.encode(),
            Fis::PioSetupD2h(f) => f.encode(),
            Fis::Data(f) => f.encode(),
        }
    }

    /// Decode any FIS, dispatching on the type byte of dword 0
    pub fn decode(dwords: &[u32]) -> Result<Self> {
        let first = dwords.first().ok_or(SataError::FisTruncated { got: 0, need: 1 })?;
        Ok(match FisType::try_from((first & 0xFF) as u8)? {
            FisType::RegH2d => Fis::RegH2d(RegH2d::decode(dwords)?),
            FisType::RegD2h => Fis::RegD2h(RegD2h::decode(dwords)?),
            FisType::DmaActivateD2h => Fis::DmaActivateD2h(DmaActivateD2h::decode(dwords)?),
            FisType::PioSetupD2h => Fis::PioSetupD2h(PioSetupD2h::decode(dwords)?),
            FisType::Data => Fis::Data(DataFis::decode(dwords)?),
        })
    }
}
