//! nexa-sata - SATA protocol stack data model
//!
//! Shared definitions for every layer of a SATA host stack: PHY primitives,
//! FIS layouts and their codec, typed stream endpoints with ready/valid
//! handshaking, elastic endpoint buffering, and step counters.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  command    AtaCommand / StatusFlags / CommandRequest         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  transport  FisLayout tables, FisRecord codec, typed frames   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  link       d + error units, packet framing                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  phy        Primitive table, PhyWord, SataGeneration          │
//! └──────────────────────────────────────────────────────────────┘
//!   stream     EndpointDescriptor, StreamConnection, Stage,
//!              BufferedEndpoints, Simulator (spans every layer)
//!   timer      Counter, Timeout
//!   units      sector / dword conversions
//! ```
//!
//! All components advance in lockstep: one [`stream::Simulator::step`] is
//! one clock edge.

pub(crate) mod bits;
pub mod command;
pub mod config;
pub mod error;
pub mod phy;
pub mod stream;
pub mod timer;
pub mod transport;
pub mod units;

pub use command::{status_bit, AtaCommand, CommandRequest, CommandResponse, StatusFlags};
pub use config::{load_config, save_config, SataConfig};
pub use error::{FramingError, HandshakeError, LinkFault, Result, SataError};
pub use phy::{PhyWord, Primitive, SataGeneration};
pub use stream::{
    Beat, BufferedEndpoints, DescriptorSet, EndpointDescriptor, Simulator, Stage, StreamConnection,
};
pub use timer::{Counter, CounterControls, CounterInputs, Timeout};
pub use transport::{Fis, FisFrame, FisLayout, FisRecord, FisType, FIS_MAX_DWORDS};
pub use units::{
    data_fis_count, dwords_to_bytes, dwords_to_sectors, sectors_to_dwords, DWORDS_PER_SECTOR,
    LOGICAL_SECTOR_SIZE,
};
