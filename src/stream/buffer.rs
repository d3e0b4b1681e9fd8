//! Elastic buffering of stage endpoints
//!
//! `BufferedEndpoints` wraps a stage and places a one-unit slot in front of
//! (sinks) or behind (sources) the selected endpoints. The slot registers
//! both the data/valid path and the ready path, so a unit crosses the slot
//! one step later than it would without it. Values, packet markers and
//! ordering are unchanged.

use super::{Beat, Direction, Endpoint, Stage, StepIo, StreamConnection};
use crate::error::LinkFault;
use crate::{Result, SataError};

/// One-unit storage slot bound to an endpoint of the wrapped stage
#[derive(Debug)]
struct Slot {
    endpoint: Endpoint,
    beat: Option<Beat>,
    /// Fault reported with the unit in `beat`
    fault: Option<LinkFault>,
    /// Checker for the side between the slot and the wrapped stage
    inner_link: StreamConnection,
}

/// Stage wrapper inserting a one-unit buffer on selected endpoints
pub struct BufferedEndpoints<S: Stage> {
    inner: S,
    slots: Vec<Slot>,
}

impl<S: Stage> BufferedEndpoints<S> {
    /// Buffer the named endpoints of `inner`, or all of them when `selected` is empty
    pub fn new(inner: S, selected: &[&str]) -> Result<Self> {
        let endpoints = inner.endpoints();
        for name in selected {
            if !endpoints.iter().any(|ep| ep.name == *name) {
                return Err(SataError::UnknownEndpoint(name.to_string()));
            }
        }

        let mut slots = Vec::new();
        for endpoint in endpoints {
            if !selected.is_empty() && !selected.contains(&endpoint.name.as_str()) {
                continue;
            }
            let link_name = format!("{}.{} (buffer)", inner.name(), endpoint.name);
            let inner_link =
                StreamConnection::new(link_name, &endpoint.descriptor, &endpoint.descriptor)?;
            log::debug!(
                "buffering {} endpoint '{}' of '{}'",
                endpoint.direction,
                endpoint.name,
                inner.name()
            );
            slots.push(Slot {
                endpoint,
                beat: None,
                fault: None,
                inner_link,
            });
        }

        Ok(Self { inner, slots })
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Check whether an endpoint goes through a slot
    pub fn is_buffered(&self, endpoint: &str) -> bool {
        self.slot(endpoint).is_some()
    }

    /// Unit currently held for an endpoint
    pub fn occupancy(&self, endpoint: &str) -> Option<&Beat> {
        self.slot(endpoint).and_then(|slot| slot.beat.as_ref())
    }

    fn slot(&self, endpoint: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.endpoint.name == endpoint)
    }
}

impl<S: Stage> Stage for BufferedEndpoints<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.inner.endpoints()
    }

    fn offer(&self, endpoint: &str) -> Option<Beat> {
        match self.slot(endpoint) {
            Some(slot) if slot.endpoint.direction == Direction::Source => slot.beat.clone(),
            _ => self.inner.offer(endpoint),
        }
    }

    fn ready(&self, endpoint: &str) -> bool {
        match self.slot(endpoint) {
            Some(slot) if slot.endpoint.direction == Direction::Sink => slot.beat.is_none(),
            _ => self.inner.ready(endpoint),
        }
    }

    fn commit(&mut self, io: &StepIo) -> Result<()> {
        let mut inner_io = StepIo::default();
        for name in &io.accepted {
            if !self.is_buffered(name) {
                inner_io.accepted.push(name.clone());
            }
        }
        for (name, beat) in &io.received {
            if !self.is_buffered(name) {
                inner_io.received.push((name.clone(), beat.clone()));
            }
        }

        let mut first_error = None;
        for slot in &mut self.slots {
            let name = slot.endpoint.name.as_str();
            match slot.endpoint.direction {
                Direction::Sink => {
                    let offer = slot.beat.clone();
                    let ready = self.inner.ready(name);
                    match slot.inner_link.step(offer.as_ref(), ready) {
                        Ok(transfer) => {
                            let carried = if transfer.is_taken() {
                                slot.beat = None;
                                slot.fault.take()
                            } else {
                                None
                            };
                            if let Some(beat) = transfer.delivered {
                                inner_io.received.push((name.to_string(), beat));
                            }
                            // A fault seen on the way in travels with its unit and
                            // was already returned when the slot took it.
                            match (carried, transfer.fault) {
                                (Some(fault), _) => inner_io.faults.push((name.to_string(), fault)),
                                (None, Some(fault)) => {
                                    first_error.get_or_insert_with(|| slot.inner_link.error(&fault));
                                    inner_io.faults.push((name.to_string(), fault));
                                }
                                (None, None) => {}
                            }
                        }
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                    // Ready was only offered while empty, so this never overwrites
                    match (io.received(name), io.fault(name)) {
                        (Some(beat), fault) => {
                            slot.beat = Some(beat.clone());
                            slot.fault = fault.cloned();
                        }
                        (None, Some(fault)) => {
                            inner_io.faults.push((name.to_string(), fault.clone()));
                        }
                        (None, None) => {}
                    }
                }
                Direction::Source => {
                    let offer = self.inner.offer(name);
                    let ready = slot.beat.is_none();
                    if io.accepted(name) {
                        slot.beat = None;
                    }
                    match slot.inner_link.step(offer.as_ref(), ready) {
                        Ok(transfer) => {
                            if transfer.is_taken() {
                                inner_io.accepted.push(name.to_string());
                            }
                            if let Some(beat) = transfer.delivered {
                                slot.beat = Some(beat);
                            }
                            if let Some(fault) = transfer.fault {
                                first_error.get_or_insert_with(|| slot.inner_link.error(&fault));
                            }
                        }
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
        }

        self.inner.commit(&inner_io)?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.beat = None;
            slot.fault = None;
            slot.inner_link.reset();
        }
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FramingError;
    use crate::stream::descriptors;
    use crate::stream::sim::{CollectingSink, ScriptedSource, Throttle};

    #[test]
    fn test_unknown_endpoint_rejected() {
        let desc = descriptors::link(32).unwrap();
        let sink = CollectingSink::new("sink", desc, Throttle::Always);
        assert!(matches!(
            BufferedEndpoints::new(sink, &["nope"]),
            Err(SataError::UnknownEndpoint(_))
        ));
    }

    #[test]
    fn test_selection() {
        let desc = descriptors::link(32).unwrap();
        let sink = CollectingSink::new("sink", desc, Throttle::Always);
        let all = BufferedEndpoints::new(sink, &[]).unwrap();
        assert!(all.is_buffered(CollectingSink::ENDPOINT));
        assert!(!all.is_buffered("other"));
        assert_eq!(all.name(), "sink");
    }

    #[test]
    fn test_sink_slot_delays_one_step() {
        let desc = descriptors::link(32).unwrap();
        let sink = CollectingSink::new("sink", desc.clone(), Throttle::Always);
        let mut buffered = BufferedEndpoints::new(sink, &[]).unwrap();
        let ep = CollectingSink::ENDPOINT;

        let beat = desc.beat().with("d", 7).unwrap().with_markers(true, true);
        assert!(buffered.ready(ep));

        let io = StepIo {
            received: vec![(ep.to_string(), beat.clone())],
            ..Default::default()
        };
        buffered.commit(&io).unwrap();
        assert_eq!(buffered.occupancy(ep), Some(&beat));
        assert!(!buffered.ready(ep));
        assert!(buffered.inner().received().is_empty());

        buffered.commit(&StepIo::default()).unwrap();
        assert_eq!(buffered.occupancy(ep), None);
        assert_eq!(buffered.inner().received(), &[beat]);
    }

    #[test]
    fn test_fault_travels_with_unit() {
        let desc = descriptors::link(32).unwrap();
        let sink = CollectingSink::new("sink", desc.clone(), Throttle::Always);
        let mut buffered = BufferedEndpoints::new(sink, &[]).unwrap();
        let ep = CollectingSink::ENDPOINT;
        let fault = LinkFault::Framing(FramingError::StartWithoutEnd);

        let beat = desc.beat().with("d", 2).unwrap().with_markers(true, false);
        let io = StepIo {
            received: vec![(ep.to_string(), beat.clone())],
            faults: vec![(ep.to_string(), fault.clone())],
            ..Default::default()
        };
        buffered.commit(&io).unwrap();
        assert!(buffered.inner().faults().is_empty());

        // the inner link sees a clean start; only the carried fault is reported
        buffered.commit(&StepIo::default()).unwrap();
        assert_eq!(buffered.inner().received(), &[beat]);
        assert_eq!(buffered.inner().faults(), &[(0, fault)]);
    }

    #[test]
    fn test_source_slot() {
        let desc = descriptors::link(32).unwrap();
        let mut source = ScriptedSource::new("src", desc.clone(), Throttle::Always);
        source
            .push(desc.beat().with("d", 1).unwrap().with_markers(true, true))
            .unwrap();
        let mut buffered = BufferedEndpoints::new(source, &[]).unwrap();
        let ep = ScriptedSource::ENDPOINT;

        // nothing visible until the slot has captured the unit
        assert_eq!(buffered.offer(ep), None);
        buffered.commit(&StepIo::default()).unwrap();
        let offered = buffered.offer(ep).unwrap();
        assert_eq!(offered.get("d").unwrap(), 1);
        assert_eq!(buffered.inner().remaining(), 0);

        let io = StepIo {
            accepted: vec![ep.to_string()],
            ..Default::default()
        };
        buffered.commit(&io).unwrap();
        assert_eq!(buffered.offer(ep), None);
    }
}
