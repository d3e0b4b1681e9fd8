//! Ready/valid handshake between two endpoints
//!
//! A unit moves from producer to consumer in exactly the step where the
//! producer offers it (valid) and the consumer is ready. An offered unit is
//! held unchanged until it has been accepted.

use std::sync::Arc;

use super::{Beat, EndpointDescriptor};
use crate::error::{FramingError, HandshakeError, LinkFault};
use crate::{Result, SataError};

/// Outcome of one handshake step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transfer {
    /// Unit handed to the consumer
    pub delivered: Option<Beat>,
    /// Protocol fault seen in this step
    pub fault: Option<LinkFault>,
}

impl Transfer {
    /// The producer's offer was taken this step
    pub fn is_taken(&self) -> bool {
        self.delivered.is_some()
    }
}

/// Protocol checker for one producer/consumer pair
#[derive(Debug, Clone)]
pub struct StreamConnection {
    name: String,
    desc: Arc<EndpointDescriptor>,
    /// Unit offered in the previous step and not yet accepted
    pending: Option<Beat>,
    in_packet: bool,
    transfers: u64,
    packets: u64,
}

impl StreamConnection {
    /// Bind two endpoints; their descriptors must agree field for field
    pub fn new(
        name: impl Into<String>,
        source: &Arc<EndpointDescriptor>,
        sink: &Arc<EndpointDescriptor>,
    ) -> Result<Self> {
        source.check_compatible(sink)?;
        Ok(Self {
            name: name.into(),
            desc: Arc::clone(source),
            pending: None,
            in_packet: false,
            transfers: 0,
            packets: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<EndpointDescriptor> {
        &self.desc
    }

    /// A start marker has been accepted without its end marker
    pub fn in_packet(&self) -> bool {
        self.in_packet
    }

    /// Units accepted so far
    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    /// Complete packets accepted so far
    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.in_packet = false;
        self.transfers = 0;
        self.packets = 0;
    }

    /// Evaluate one step of the handshake
    ///
    /// When `offer` is `Some` and `ready` is set the unit is delivered, even
    /// if it breaks packet framing or replaced a pending offer; the fault is
    /// reported next to it. `Err` is reserved for units whose layout does
    /// not match the link, which are never taken.
    pub fn step(&mut self, offer: Option<&Beat>, ready: bool) -> Result<Transfer> {
        let mut transfer = Transfer::default();

        if let Some(prev) = self.pending.take() {
            match offer {
                None => {
                    transfer.fault = Some(self.fault(HandshakeError::Retracted.into()));
                    return Ok(transfer);
                }
                Some(beat) if *beat != prev => {
                    transfer.fault = Some(self.fault(HandshakeError::Changed.into()));
                }
                Some(_) => {}
            }
        }

        let beat = match offer {
            Some(beat) => beat,
            None => return Ok(transfer),
        };

        if !Arc::ptr_eq(beat.descriptor(), &self.desc) {
            beat.descriptor().check_compatible(&self.desc)?;
        }

        if !ready {
            self.pending = Some(beat.clone());
            return Ok(transfer);
        }

        if let Err(error) = self.check_framing(beat) {
            let fault = self.fault(error.into());
            transfer.fault.get_or_insert(fault);
        }
        self.transfers += 1;
        if beat.last && self.desc.is_packetized() {
            self.packets += 1;
        }
        log::trace!(
            "{}: transfer #{} first={} last={}",
            self.name,
            self.transfers,
            beat.first,
            beat.last
        );
        transfer.delivered = Some(beat.clone());
        Ok(transfer)
    }

    /// Error for a fault seen on this link
    pub fn error(&self, fault: &LinkFault) -> SataError {
        fault.clone().into_error(self.name.as_str())
    }

    fn check_framing(&mut self, beat: &Beat) -> std::result::Result<(), FramingError> {
        if !self.desc.is_packetized() {
            if beat.first || beat.last {
                return Err(FramingError::MarkersOnContinuous);
            }
            return Ok(());
        }

        if beat.first {
            let reopened = self.in_packet;
            // Resynchronize on the new start so the next packet is checked cleanly
            self.in_packet = !beat.last;
            if reopened {
                return Err(FramingError::StartWithoutEnd);
            }
        } else if !self.in_packet {
            return Err(FramingError::MissingStart);
        } else if beat.last {
            self.in_packet = false;
        }
        Ok(())
    }

    fn fault(&self, fault: LinkFault) -> LinkFault {
        log::warn!("{}: {}", self.name, fault);
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::descriptors;

    fn link_conn() -> (StreamConnection, Arc<EndpointDescriptor>) {
        let desc = descriptors::link(32).unwrap();
        (StreamConnection::new("test", &desc, &desc).unwrap(), desc)
    }

    fn unit(desc: &Arc<EndpointDescriptor>, d: u64, first: bool, last: bool) -> Beat {
        desc.beat().with("d", d).unwrap().with_markers(first, last)
    }

    #[test]
    fn test_transfer_needs_valid_and_ready() {
        let (mut conn, desc) = link_conn();
        let b = unit(&desc, 1, true, true);

        assert_eq!(conn.step(None, true).unwrap(), Transfer::default());
        assert!(!conn.step(Some(&b), false).unwrap().is_taken());
        let t = conn.step(Some(&b), true).unwrap();
        assert_eq!(t.delivered, Some(b));
        assert_eq!(t.fault, None);
        assert_eq!(conn.transfers(), 1);
        assert_eq!(conn.packets(), 1);
    }

    #[test]
    fn test_retract_is_reported() {
        let (mut conn, desc) = link_conn();
        let b = unit(&desc, 1, true, true);
        conn.step(Some(&b), false).unwrap();
        let t = conn.step(None, true).unwrap();
        assert_eq!(t.fault, Some(LinkFault::Handshake(HandshakeError::Retracted)));
        assert!(matches!(
            conn.error(&t.fault.unwrap()),
            SataError::Handshake { error: HandshakeError::Retracted, .. }
        ));
    }

    #[test]
    fn test_change_while_pending_is_reported() {
        let (mut conn, desc) = link_conn();
        conn.step(Some(&unit(&desc, 1, true, true)), false).unwrap();
        let t = conn.step(Some(&unit(&desc, 2, true, true)), false).unwrap();
        assert_eq!(t.fault, Some(LinkFault::Handshake(HandshakeError::Changed)));
        assert!(!t.is_taken());
    }

    #[test]
    fn test_changed_unit_still_delivered() {
        let (mut conn, desc) = link_conn();
        conn.step(Some(&unit(&desc, 1, true, true)), false).unwrap();
        let replacement = unit(&desc, 2, true, true);
        let t = conn.step(Some(&replacement), true).unwrap();
        assert_eq!(t.fault, Some(LinkFault::Handshake(HandshakeError::Changed)));
        assert_eq!(t.delivered, Some(replacement));
        assert_eq!(conn.transfers(), 1);
    }

    #[test]
    fn test_framing_faults_keep_the_unit() {
        let (mut conn, desc) = link_conn();

        let t = conn.step(Some(&unit(&desc, 1, false, false)), true).unwrap();
        assert_eq!(t.fault, Some(LinkFault::Framing(FramingError::MissingStart)));
        assert_eq!(t.delivered.unwrap().get("d").unwrap(), 1);

        let t = conn.step(Some(&unit(&desc, 1, false, true)), true).unwrap();
        assert_eq!(t.fault, Some(LinkFault::Framing(FramingError::MissingStart)));

        conn.step(Some(&unit(&desc, 1, true, false)), true).unwrap();
        assert!(conn.in_packet());
        let second = unit(&desc, 2, true, false);
        let t = conn.step(Some(&second), true).unwrap();
        assert_eq!(t.fault, Some(LinkFault::Framing(FramingError::StartWithoutEnd)));
        assert_eq!(t.delivered, Some(second));

        // resynchronized on the second start
        let t = conn.step(Some(&unit(&desc, 3, false, true)), true).unwrap();
        assert_eq!(t.fault, None);
        assert!(t.is_taken());
        assert!(!conn.in_packet());
        assert_eq!(conn.transfers(), 5);
    }

    #[test]
    fn test_markers_on_continuous_stream() {
        let desc = descriptors::phy(32).unwrap();
        let mut conn = StreamConnection::new("phy", &desc, &desc).unwrap();
        let plain = desc.beat();
        assert_eq!(conn.step(Some(&plain), true).unwrap().fault, None);
        let marked = desc.beat().with_markers(true, false);
        let t = conn.step(Some(&marked), true).unwrap();
        assert_eq!(t.fault, Some(LinkFault::Framing(FramingError::MarkersOnContinuous)));
        assert!(t.is_taken());
        assert!(matches!(
            conn.error(&t.fault.unwrap()),
            SataError::Framing { link, .. } if link == "phy"
        ));
        assert_eq!(conn.packets(), 0);
    }

    #[test]
    fn test_mismatched_descriptors() {
        let a = descriptors::link(32).unwrap();
        let b = descriptors::link(16).unwrap();
        assert!(matches!(
            StreamConnection::new("x", &a, &b),
            Err(SataError::DescriptorMismatch(_))
        ));

        let mut conn = StreamConnection::new("x", &a, &a).unwrap();
        assert!(conn.step(Some(&b.beat().with_markers(true, true)), true).is_err());
        assert_eq!(conn.transfers(), 0);
    }
}
