//! SATA link primitives
//!
//! Primitives are 32-bit control words exchanged at the link layer for flow
//! control and synchronization. Every primitive starts with a K-character in
//! its least significant byte (K28.5 for ALIGN, K28.3 for the rest).

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// Named SATA primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Align,
    Cont,
    Sync,
    RRdy,
    ROk,
    RErr,
    RIp,
    XRdy,
    Wtrm,
    Sof,
    Eof,
    Hold,
    Holda,
}

impl Primitive {
    /// Every primitive, in table order
    pub const ALL: [Primitive; 13] = [
        Primitive::Align,
        Primitive::Cont,
        Primitive::Sync,
        Primitive::RRdy,
        Primitive::ROk,
        Primitive::RErr,
        Primitive::RIp,
        Primitive::XRdy,
        Primitive::Wtrm,
        Primitive::Sof,
        Primitive::Eof,
        Primitive::Hold,
        Primitive::Holda,
    ];

    /// 32-bit word as seen on the wire (dword 0 transmitted LSB first)
    pub const fn value(self) -> u32 {
        match self {
            Primitive::Align => 0x7B4A_4ABC,
            Primitive::Cont => 0x9999_AA7C,
            Primitive::Sync => 0xB5B5_957C,
            Primitive::RRdy => 0x4A4A_957C,
            Primitive::ROk => 0x3535_B57C,
            Primitive::RErr => 0x5656_B57C,
            Primitive::RIp => 0x5555_B57C,
            Primitive::XRdy => 0x5757_B57C,
            Primitive::Wtrm => 0x5858_B57C,
            Primitive::Sof => 0x3737_B57C,
            Primitive::Eof => 0xD5D5_B57C,
            Primitive::Hold => 0xD5D5_AA7C,
            Primitive::Holda => 0x9595_AA7C,
        }
    }

    /// Canonical upper-case name
    pub const fn name(self) -> &'static str {
        match self {
            Primitive::Align => "ALIGN",
            Primitive::Cont => "CONT",
            Primitive::Sync => "SYNC",
            Primitive::RRdy => "R_RDY",
            Primitive::ROk => "R_OK",
            Primitive::RErr => "R_ERR",
            Primitive::RIp => "R_IP",
            Primitive::XRdy => "X_RDY",
            Primitive::Wtrm => "WTRM",
            Primitive::Sof => "SOF",
            Primitive::Eof => "EOF",
            Primitive::Hold => "HOLD",
            Primitive::Holda => "HOLDA",
        }
    }

    /// Control-character marker for the primitive word: only byte 0 is a K-character
    pub const fn charisk(self) -> u8 {
        0b0001
    }

    /// Look up a primitive by its canonical name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Reverse lookup by wire value
    pub fn from_word(word: u32) -> Option<Self> {
        PRIMITIVES_BY_VALUE.get(&word).copied()
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

lazy_static! {
    static ref PRIMITIVES_BY_VALUE: HashMap<u32, Primitive> =
        Primitive::ALL.iter().map(|p| (p.value(), *p)).collect();
}

/// Check whether a dword is one of the known primitives
pub fn is_primitive(word: u32) -> bool {
    PRIMITIVES_BY_VALUE.contains_key(&word)
}

/// Decode a dword into a primitive; ordinary payload words yield `None`
pub fn decode_primitive(word: u32) -> Option<Primitive> {
    Primitive::from_word(word)
}
