//! Canonical endpoint descriptors of the PHY, link, transport and command layers
//!
//! Every family is parameterized by the data width `dw` of its payload field.

use std::sync::Arc;

use super::EndpointDescriptor;
use crate::{Result, SataError};

/// Raw PHY words plus one K-character flag per byte; continuous
pub fn phy(dw: u32) -> Result<Arc<EndpointDescriptor>> {
    if dw % 8 != 0 {
        return Err(SataError::InvalidWidth(dw));
    }
    EndpointDescriptor::new([("data", dw), ("charisk", dw / 8)], false)
}

/// Decoded link payload with an error flag
pub fn link(dw: u32) -> Result<Arc<EndpointDescriptor>> {
    EndpointDescriptor::new([("d", dw), ("error", 1)], true)
}

/// Host to device FIS fields and payload
pub fn transport_tx(dw: u32) -> Result<Arc<EndpointDescriptor>> {
    EndpointDescriptor::new(
        [
            ("type", 8),
            ("pm_port", 4),
            ("c", 1),
            ("command", 8),
            ("features", 16),
            ("lba", 48),
            ("device", 8),
            ("count", 16),
            ("icc", 8),
            ("control", 8),
            ("data", dw),
        ],
        true,
    )
}

/// Device to host FIS fields and payload
///
/// `error` is the FIS error register, `transport_error` flags a frame the
/// transport layer could not receive cleanly.
pub fn transport_rx(dw: u32) -> Result<Arc<EndpointDescriptor>> {
    EndpointDescriptor::new(
        [
            ("type", 8),
            ("pm_port", 4),
            ("r", 1),
            ("d", 1),
            ("i", 1),
            ("status", 8),
            ("error", 8),
            ("lba", 48),
            ("device", 8),
            ("count", 16),
            ("transfer_count", 16),
            ("data", dw),
            ("transport_error", 1),
        ],
        true,
    )
}

/// Host command requests
pub fn command_tx(dw: u32) -> Result<Arc<EndpointDescriptor>> {
    EndpointDescriptor::new(
        [
            ("write", 1),
            ("read", 1),
            ("identify", 1),
            ("sector", 48),
            ("count", 16),
            ("data", dw),
        ],
        true,
    )
}

/// Command responses with payload
pub fn command_rx(dw: u32) -> Result<Arc<EndpointDescriptor>> {
    EndpointDescriptor::new(
        [
            ("write", 1),
            ("read", 1),
            ("identify", 1),
            ("last", 1),
            ("success", 1),
            ("failed", 1),
            ("data", dw),
        ],
        true,
    )
}

/// Command completion status only; continuous
pub fn command_rx_cmd() -> Result<Arc<EndpointDescriptor>> {
    EndpointDescriptor::new(
        [
            ("write", 1),
            ("read", 1),
            ("identify", 1),
            ("last", 1),
            ("success", 1),
            ("failed", 1),
        ],
        false,
    )
}

/// Command response payload only
pub fn command_rx_data(dw: u32) -> Result<Arc<EndpointDescriptor>> {
    EndpointDescriptor::new([("data", dw)], true)
}

/// Every descriptor family instantiated for one data width
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    pub dw: u32,
    pub phy: Arc<EndpointDescriptor>,
    pub link: Arc<EndpointDescriptor>,
    pub transport_tx: Arc<EndpointDescriptor>,
    pub transport_rx: Arc<EndpointDescriptor>,
    pub command_tx: Arc<EndpointDescriptor>,
    pub command_rx: Arc<EndpointDescriptor>,
    pub command_rx_cmd: Arc<EndpointDescriptor>,
    pub command_rx_data: Arc<EndpointDescriptor>,
}

impl DescriptorSet {
    pub fn new(dw: u32) -> Result<Self> {
        Ok(Self {
            dw,
            phy: phy(dw)?,
            link: link(dw)?,
            transport_tx: transport_tx(dw)?,
            transport_rx: transport_rx(dw)?,
            command_tx: command_tx(dw)?,
            command_rx: command_rx(dw)?,
            command_rx_cmd: command_rx_cmd()?,
            command_rx_data: command_rx_data(dw)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phy_widths() {
        let desc = phy(32).unwrap();
        assert_eq!(desc.width_of("charisk"), Some(4));
        assert!(!desc.is_packetized());
        assert!(matches!(phy(12), Err(SataError::InvalidWidth(12))));
    }

    #[test]
    fn test_transport_widths() {
        let tx = transport_tx(32).unwrap();
        assert_eq!(tx.total_width(), 8 + 4 + 1 + 8 + 16 + 48 + 8 + 16 + 8 + 8 + 32);
        assert_eq!(tx.width_of("lba"), Some(48));

        let rx = transport_rx(32).unwrap();
        assert_eq!(rx.width_of("error"), Some(8));
        assert_eq!(rx.width_of("transport_error"), Some(1));
        assert_eq!(rx.offset_of("transport_error"), Some(rx.total_width() - 1));
    }

    #[test]
    fn test_command_families() {
        assert!(command_tx(32).unwrap().is_packetized());
        assert!(!command_rx_cmd().unwrap().is_packetized());
        assert_eq!(command_rx_data(16).unwrap().total_width(), 16);
        assert_eq!(command_rx(32).unwrap().total_width(), 38);
    }

    #[test]
    fn test_descriptor_set() {
        let set = DescriptorSet::new(32).unwrap();
        assert_eq!(set.link.width_of("d"), Some(32));
        assert!(set.transport_tx.check_compatible(&transport_tx(32).unwrap()).is_ok());
        assert!(DescriptorSet::new(0).is_err());
    }
}
