//! ATA command layer
//!
//! Register opcodes, the REG_D2H status byte, and the host-side command
//! request/response records carried on the command streams.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::bits::fits;
use crate::stream::{Beat, EndpointDescriptor};
use crate::transport::RegH2d;
use crate::{Result, SataError};

/// Device register value selecting LBA addressing
pub const DEVICE_LBA_MODE: u8 = 0x40;

/// Widest sector address a command can carry
pub const SECTOR_WIDTH: u32 = 48;

/// Supported ATA commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AtaCommand {
    WriteDmaExt = 0x35,
    ReadDmaExt = 0x25,
    IdentifyDevice = 0xEC,
}

impl AtaCommand {
    pub const ALL: [AtaCommand; 3] = [
        AtaCommand::WriteDmaExt,
        AtaCommand::ReadDmaExt,
        AtaCommand::IdentifyDevice,
    ];

    pub const fn opcode(self) -> u8 {
        self as u8
    }

    /// Name of the one-bit selector field on command streams
    pub const fn selector(self) -> &'static str {
        match self {
            AtaCommand::WriteDmaExt => "write",
            AtaCommand::ReadDmaExt => "read",
            AtaCommand::IdentifyDevice => "identify",
        }
    }

    /// Data phase, if any, flows device to host
    pub const fn reads_data(self) -> bool {
        !matches!(self, AtaCommand::WriteDmaExt)
    }

    /// Command selected by exactly one raised selector of a command-stream unit
    pub fn from_selectors(beat: &Beat) -> Result<Self> {
        let mut found = None;
        let mut raised = 0u8;
        for (i, cmd) in Self::ALL.iter().enumerate() {
            if beat.flag(cmd.selector())? {
                raised |= 1 << i;
                found = Some(*cmd);
            }
        }
        match found {
            Some(cmd) if raised.count_ones() == 1 => Ok(cmd),
            _ => Err(SataError::InvalidSelector(raised)),
        }
    }
}

impl TryFrom<u8> for AtaCommand {
    type Error = SataError;

    fn try_from(opcode: u8) -> Result<Self> {
        AtaCommand::ALL
            .iter()
            .copied()
            .find(|c| c.opcode() == opcode)
            .ok_or(SataError::UnknownCommand(opcode))
    }
}

impl fmt::Display for AtaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AtaCommand::WriteDmaExt => "WRITE_DMA_EXT",
            AtaCommand::ReadDmaExt => "READ_DMA_EXT",
            AtaCommand::IdentifyDevice => "IDENTIFY_DEVICE",
        };
        write!(f, "{} ({:#04x})", name, self.opcode())
    }
}

bitflags! {
    /// REG_D2H status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const BSY = 1 << 7;
        const DRDY = 1 << 6;
        const DF = 1 << 5;
        const SE = 1 << 5;
        const DWE = 1 << 4;
        const DRQ = 1 << 3;
        const AE = 1 << 2;
        const SNS = 1 << 1;
        const CC = 1 << 0;
        const ERR = 1 << 0;
    }
}

/// Bit position of a status flag, by any of its names
pub fn status_bit(name: &str) -> Option<u32> {
    match name.to_ascii_lowercase().as_str() {
        "bsy" => Some(7),
        "drdy" => Some(6),
        "df" | "se" => Some(5),
        "dwe" => Some(4),
        "drq" => Some(3),
        "ae" => Some(2),
        "sns" => Some(1),
        "cc" | "err" => Some(0),
        _ => None,
    }
}

/// Host command request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: AtaCommand,
    pub sector: u64,
    pub count: u16,
}

impl CommandRequest {
    pub fn new(command: AtaCommand, sector: u64, count: u16) -> Self {
        Self {
            command,
            sector,
            count,
        }
    }

    fn check_sector(&self) -> Result<()> {
        if !fits(self.sector, SECTOR_WIDTH) {
            return Err(SataError::FieldOverflow {
                field: "sector".to_string(),
                value: self.sector,
                width: SECTOR_WIDTH,
            });
        }
        Ok(())
    }

    /// Register FIS issuing this command
    pub fn to_reg_h2d(&self) -> Result<RegH2d> {
        self.check_sector()?;
        Ok(RegH2d {
            c: true,
            command: self.command.opcode(),
            lba: self.sector,
            device: DEVICE_LBA_MODE,
            count: self.count,
            ..Default::default()
        })
    }

    /// Command-stream packet: one unit per payload dword, or a single unit without payload
    pub fn to_beats(&self, desc: &Arc<EndpointDescriptor>, payload: &[u32]) -> Result<Vec<Beat>> {
        self.check_sector()?;
        let mut header = desc.beat();
        header.set(self.command.selector(), 1)?;
        header.set("sector", self.sector)?;
        header.set("count", self.count as u64)?;

        if payload.is_empty() {
            return Ok(vec![header.with_markers(true, true)]);
        }
        let n = payload.len();
        payload
            .iter()
            .enumerate()
            .map(|(i, dw)| -> Result<Beat> {
                Ok(header
                    .clone()
                    .with("data", *dw as u64)?
                    .with_markers(i == 0, i + 1 == n))
            })
            .collect()
    }

    /// Request carried by a command-stream unit
    pub fn from_beat(beat: &Beat) -> Result<Self> {
        Ok(Self {
            command: AtaCommand::from_selectors(beat)?,
            sector: beat.get("sector")?,
            count: beat.get("count")? as u16,
        })
    }
}

/// Command completion as reported on the response stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResponse {
    pub command: AtaCommand,
    pub last: bool,
    pub success: bool,
    pub failed: bool,
}

impl CommandResponse {
    pub fn to_beat(&self, desc: &Arc<EndpointDescriptor>) -> Result<Beat> {
        let mut beat = desc.beat();
        beat.set(self.command.selector(), 1)?;
        beat.set("last", self.last as u64)?;
        beat.set("success", self.success as u64)?;
        beat.set("failed", self.failed as u64)?;
        Ok(beat)
    }

    pub fn from_beat(beat: &Beat) -> Result<Self> {
        Ok(Self {
            command: AtaCommand::from_selectors(beat)?,
            last: beat.flag("last")?,
            success: beat.flag("success")?,
            failed: beat.flag("failed")?,
        })
    }
}
