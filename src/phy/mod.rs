//! Physical layer definitions
//!
//! Only the word-level view is modelled here: a 32-bit data word and one
//! control-character flag per byte. 8b10b coding and the serializer live
//! outside this crate.

pub mod primitives;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::stream::{Beat, EndpointDescriptor};
use crate::Result;
pub use primitives::{decode_primitive, is_primitive, Primitive};

/// SATA link generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SataGeneration {
    #[serde(rename = "SATA1")]
    Sata1,
    #[serde(rename = "SATA2")]
    Sata2,
    #[serde(rename = "SATA3")]
    Sata3,
}

impl SataGeneration {
    /// Link-layer clock in MHz for a 32-bit data path
    pub const fn link_frequency_mhz(self) -> f64 {
        match self {
            SataGeneration::Sata1 => 37.5,
            SataGeneration::Sata2 => 75.0,
            SataGeneration::Sata3 => 150.0,
        }
    }

    /// Line rate in Gbit/s
    pub const fn line_rate_gbps(self) -> f64 {
        match self {
            SataGeneration::Sata1 => 1.5,
            SataGeneration::Sata2 => 3.0,
            SataGeneration::Sata3 => 6.0,
        }
    }
}

impl Default for SataGeneration {
    fn default() -> Self {
        SataGeneration::Sata3
    }
}

/// One 32-bit word at the PHY boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyWord {
    pub data: u32,
    /// Bit n set: byte n of `data` is a K-character
    pub charisk: u8,
}

impl PhyWord {
    /// Plain data word, no control characters
    pub const fn data(data: u32) -> Self {
        Self { data, charisk: 0 }
    }

    /// Word carrying a primitive
    pub const fn primitive(p: Primitive) -> Self {
        Self {
            data: p.value(),
            charisk: p.charisk(),
        }
    }

    /// Primitive carried by this word, if any
    ///
    /// A word only counts as a primitive when its K-character marker is set,
    /// payload words that happen to equal a primitive value are data.
    pub fn as_primitive(&self) -> Option<Primitive> {
        if self.charisk & 0b0001 == 0 {
            return None;
        }
        decode_primitive(self.data)
    }

    /// Build a PHY stream unit for a 32-bit PHY descriptor
    pub fn to_beat(self, desc: &Arc<EndpointDescriptor>) -> Result<Beat> {
        let mut beat = desc.beat();
        beat.set("data", self.data as u64)?;
        beat.set("charisk", self.charisk as u64)?;
        Ok(beat)
    }

    /// Read a PHY word back from a stream unit
    pub fn from_beat(beat: &Beat) -> Result<Self> {
        Ok(Self {
            data: beat.get("data")? as u32,
            charisk: beat.get("charisk")? as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::descriptors;

    #[test]
    fn test_generation_frequencies() {
        assert_eq!(SataGeneration::Sata1.link_frequency_mhz(), 37.5);
        assert_eq!(SataGeneration::Sata2.link_frequency_mhz(), 75.0);
        assert_eq!(SataGeneration::Sata3.link_frequency_mhz(), 150.0);
        assert_eq!(SataGeneration::default(), SataGeneration::Sata3);
    }

    #[test]
    fn test_primitive_word_needs_marker() {
        let sync = PhyWord::primitive(Primitive::Sync);
        assert_eq!(sync.as_primitive(), Some(Primitive::Sync));

        let data = PhyWord::data(Primitive::Sync.value());
        assert_eq!(data.as_primitive(), None);
    }

    #[test]
    fn test_phy_beat() {
        let desc = descriptors::phy(32).unwrap();
        let word = PhyWord::primitive(Primitive::XRdy);
        let beat = word.to_beat(&desc).unwrap();
        assert_eq!(beat.get("charisk").unwrap(), 1);
        assert_eq!(PhyWord::from_beat(&beat).unwrap(), word);
    }
}
