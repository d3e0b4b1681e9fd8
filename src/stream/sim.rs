//! Synchronous-step scheduler
//!
//! Every `step()` is one clock edge: offers and readiness of all stages are
//! sampled first, every link evaluates its handshake, then all transfers are
//! committed together. No stage observes another stage's update from the
//! same step.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Beat, Direction, Endpoint, EndpointDescriptor, Stage, StepIo, StreamConnection};
use crate::error::LinkFault;
use crate::{Result, SataError};

/// Handle to a stage registered with a simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub usize);

/// Shared stage handle
pub type StageRef = Arc<Mutex<dyn Stage>>;

struct Link {
    source: (usize, String),
    sink: (usize, String),
    conn: StreamConnection,
}

/// Simulator - owns the stages and the links between them
pub struct Simulator {
    stages: Vec<StageRef>,
    links: Vec<Link>,
    cycle: u64,
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            links: Vec::new(),
            cycle: 0,
        }
    }

    /// Register a stage
    pub fn add_stage(&mut self, stage: StageRef) -> StageId {
        let id = StageId(self.stages.len());
        log::debug!("stage {} = '{}'", id.0, stage.lock().name());
        self.stages.push(stage);
        id
    }

    /// Connect a source endpoint to a sink endpoint
    pub fn connect(
        &mut self,
        source: StageId,
        source_ep: &str,
        sink: StageId,
        sink_ep: &str,
    ) -> Result<()> {
        let (src_name, src) = self.lookup(source, source_ep, Direction::Source)?;
        let (dst_name, dst) = self.lookup(sink, sink_ep, Direction::Sink)?;

        for link in &self.links {
            if link.source == (source.0, source_ep.to_string()) {
                return Err(SataError::AlreadyConnected(format!("{}.{}", src_name, source_ep)));
            }
            if link.sink == (sink.0, sink_ep.to_string()) {
                return Err(SataError::AlreadyConnected(format!("{}.{}", dst_name, sink_ep)));
            }
        }

        let name = format!("{}.{} -> {}.{}", src_name, source_ep, dst_name, sink_ep);
        let conn = StreamConnection::new(name.clone(), &src.descriptor, &dst.descriptor)?;
        log::debug!("link {}: {}", name, src.descriptor);
        self.links.push(Link {
            source: (source.0, source_ep.to_string()),
            sink: (sink.0, sink_ep.to_string()),
            conn,
        });
        Ok(())
    }

    fn lookup(&self, id: StageId, endpoint: &str, expected: Direction) -> Result<(String, Endpoint)> {
        let stage = self.stages.get(id.0).ok_or(SataError::UnknownStage(id.0))?;
        let stage = stage.lock();
        let ep = stage
            .endpoint(endpoint)
            .ok_or_else(|| SataError::UnknownEndpoint(format!("{}.{}", stage.name(), endpoint)))?;
        if ep.direction != expected {
            return Err(SataError::WrongDirection {
                endpoint: format!("{}.{}", stage.name(), endpoint),
                expected: match expected {
                    Direction::Sink => "sink",
                    Direction::Source => "source",
                },
            });
        }
        Ok((stage.name().to_string(), ep))
    }

    /// Advance every stage by one step
    ///
    /// All stages are committed even when a link reports an error; the first
    /// error is returned afterwards. A unit that breaks framing or the
    /// handshake is still delivered, and its fault reaches the sink.
    pub fn step(&mut self) -> Result<()> {
        let mut samples = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let offer = self.stages[link.source.0].lock().offer(&link.source.1);
            let ready = self.stages[link.sink.0].lock().ready(&link.sink.1);
            samples.push((offer, ready));
        }

        let mut ios = vec![StepIo::default(); self.stages.len()];
        let mut first_error = None;
        for (link, (offer, ready)) in self.links.iter_mut().zip(samples) {
            let transfer = match link.conn.step(offer.as_ref(), ready) {
                Ok(transfer) => transfer,
                Err(e) => {
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            if transfer.is_taken() {
                ios[link.source.0].accepted.push(link.source.1.clone());
            }
            if let Some(beat) = transfer.delivered {
                ios[link.sink.0].received.push((link.sink.1.clone(), beat));
            }
            if let Some(fault) = transfer.fault {
                first_error.get_or_insert_with(|| link.conn.error(&fault));
                ios[link.sink.0].faults.push((link.sink.1.clone(), fault));
            }
        }

        if cfg!(feature = "debug_verbose") {
            for (idx, io) in ios.iter().enumerate() {
                if !io.is_empty() {
                    log::debug!("cycle {} stage {}: {:?}", self.cycle, idx, io);
                }
            }
        }

        for (stage, io) in self.stages.iter().zip(&ios) {
            if let Err(e) = stage.lock().commit(io) {
                first_error.get_or_insert(e);
            }
        }
        self.cycle += 1;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run a fixed number of steps
    pub fn run(&mut self, steps: u64) -> Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Steps completed so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Connection checker of a link, by its "a.x -> b.y" name
    pub fn connection(&self, name: &str) -> Option<&StreamConnection> {
        self.links.iter().map(|l| &l.conn).find(|c| c.name() == name)
    }

    pub fn connections(&self) -> impl Iterator<Item = &StreamConnection> {
        self.links.iter().map(|l| &l.conn)
    }

    /// Reset every stage and link
    pub fn reset(&mut self) {
        for stage in &self.stages {
            stage.lock().reset();
        }
        for link in &mut self.links {
            link.conn.reset();
        }
        self.cycle = 0;
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Scripted stages
// ============================================================================

/// Per-step enable pattern for producers (valid) and consumers (ready)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Throttle {
    Always,
    Never,
    /// Repeating pattern, indexed by step
    Pattern(Vec<bool>),
}

impl Throttle {
    pub fn allows(&self, step: u64) -> bool {
        match self {
            Throttle::Always => true,
            Throttle::Never => false,
            Throttle::Pattern(p) if p.is_empty() => true,
            Throttle::Pattern(p) => p[(step % p.len() as u64) as usize],
        }
    }
}

/// Producer replaying a queue of units
pub struct ScriptedSource {
    name: String,
    desc: Arc<EndpointDescriptor>,
    queue: VecDeque<Beat>,
    throttle: Throttle,
    step: u64,
    /// Head unit was offered and not taken yet; it must stay valid
    holding: bool,
    sent: usize,
}

impl ScriptedSource {
    pub const ENDPOINT: &'static str = "source";

    pub fn new(name: impl Into<String>, desc: Arc<EndpointDescriptor>, throttle: Throttle) -> Self {
        Self {
            name: name.into(),
            desc,
            queue: VecDeque::new(),
            throttle,
            step: 0,
            holding: false,
            sent: 0,
        }
    }

    /// Queue one unit as-is
    pub fn push(&mut self, beat: Beat) -> Result<()> {
        beat.descriptor().check_compatible(&self.desc)?;
        self.queue.push_back(beat);
        Ok(())
    }

    /// Queue units as one packet, setting the start and end markers
    pub fn push_packet(&mut self, beats: Vec<Beat>) -> Result<()> {
        let n = beats.len();
        for (i, beat) in beats.into_iter().enumerate() {
            self.push(beat.with_markers(i == 0, i + 1 == n))?;
        }
        Ok(())
    }

    /// Units still queued
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Units accepted by the consumer
    pub fn sent(&self) -> usize {
        self.sent
    }

    fn offering(&self) -> bool {
        !self.queue.is_empty() && (self.holding || self.throttle.allows(self.step))
    }
}

impl Stage for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![Endpoint::source(Self::ENDPOINT, Arc::clone(&self.desc))]
    }

    fn offer(&self, endpoint: &str) -> Option<Beat> {
        if endpoint == Self::ENDPOINT && self.offering() {
            self.queue.front().cloned()
        } else {
            None
        }
    }

    fn commit(&mut self, io: &StepIo) -> Result<()> {
        let offered = self.offering();
        if io.accepted(Self::ENDPOINT) {
            self.queue.pop_front();
            self.sent += 1;
            self.holding = false;
        } else {
            self.holding = offered;
        }
        self.step += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.step = 0;
        self.holding = false;
        self.sent = 0;
    }
}

/// Consumer recording every unit it accepts
pub struct CollectingSink {
    name: String,
    desc: Arc<EndpointDescriptor>,
    throttle: Throttle,
    step: u64,
    received: Vec<Beat>,
    /// Faults with the number of units received before the faulty one
    faults: Vec<(usize, LinkFault)>,
}

impl CollectingSink {
    pub const ENDPOINT: &'static str = "sink";

    pub fn new(name: impl Into<String>, desc: Arc<EndpointDescriptor>, throttle: Throttle) -> Self {
        Self {
            name: name.into(),
            desc,
            throttle,
            step: 0,
            received: Vec::new(),
            faults: Vec::new(),
        }
    }

    pub fn received(&self) -> &[Beat] {
        &self.received
    }

    pub fn faults(&self) -> &[(usize, LinkFault)] {
        &self.faults
    }

    /// Received units grouped by packet markers
    ///
    /// A start marker closes any open packet; a trailing open packet is included.
    pub fn packets(&self) -> Vec<Vec<Beat>> {
        let mut packets = Vec::new();
        let mut current = Vec::new();
        for beat in &self.received {
            if beat.first && !current.is_empty() {
                packets.push(std::mem::take(&mut current));
            }
            current.push(beat.clone());
            if beat.last {
                packets.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            packets.push(current);
        }
        packets
    }
}

impl Stage for CollectingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![Endpoint::sink(Self::ENDPOINT, Arc::clone(&self.desc))]
    }

    fn ready(&self, endpoint: &str) -> bool {
        endpoint == Self::ENDPOINT && self.throttle.allows(self.step)
    }

    fn commit(&mut self, io: &StepIo) -> Result<()> {
        if let Some(fault) = io.fault(Self::ENDPOINT) {
            self.faults.push((self.received.len(), fault.clone()));
        }
        if let Some(beat) = io.received(Self::ENDPOINT) {
            self.received.push(beat.clone());
        }
        self.step += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.step = 0;
        self.received.clear();
        self.faults.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::descriptors;

    fn words(desc: &Arc<EndpointDescriptor>, values: &[u64]) -> Vec<Beat> {
        values
            .iter()
            .map(|v| desc.beat().with("d", *v).unwrap())
            .collect()
    }

    #[test]
    fn test_throttle_pattern() {
        let t = Throttle::Pattern(vec![true, false, false]);
        assert!(t.allows(0));
        assert!(!t.allows(1));
        assert!(t.allows(3));
        assert!(Throttle::Pattern(vec![]).allows(5));
        assert!(!Throttle::Never.allows(0));
    }

    #[test]
    fn test_source_holds_offer_until_taken() {
        let desc = descriptors::link(32).unwrap();
        let mut src = ScriptedSource::new("src", desc.clone(), Throttle::Pattern(vec![true, false]));
        src.push_packet(words(&desc, &[1, 2])).unwrap();

        assert!(src.offer(ScriptedSource::ENDPOINT).is_some());
        src.commit(&StepIo::default()).unwrap();
        // step 1 is throttled, but the unit was already offered
        assert!(src.offer(ScriptedSource::ENDPOINT).is_some());
    }

    #[test]
    fn test_simple_pipeline() {
        let desc = descriptors::link(32).unwrap();
        let src = Arc::new(Mutex::new(ScriptedSource::new("src", desc.clone(), Throttle::Always)));
        let sink = Arc::new(Mutex::new(CollectingSink::new("sink", desc.clone(), Throttle::Always)));
        src.lock().push_packet(words(&desc, &[10, 20, 30])).unwrap();

        let mut sim = Simulator::new();
        let s = sim.add_stage(src.clone());
        let k = sim.add_stage(sink.clone());
        sim.connect(s, ScriptedSource::ENDPOINT, k, CollectingSink::ENDPOINT).unwrap();
        sim.run(5).unwrap();

        let got: Vec<u64> = sink.lock().received().iter().map(|b| b.get("d").unwrap()).collect();
        assert_eq!(got, vec![10, 20, 30]);
        assert_eq!(sink.lock().packets().len(), 1);
        assert_eq!(sim.cycle(), 5);

        let conn = sim.connection("src.source -> sink.sink").unwrap();
        assert_eq!(conn.transfers(), 3);
        assert_eq!(conn.packets(), 1);
    }

    #[test]
    fn test_connect_errors() {
        let desc = descriptors::link(32).unwrap();
        let other = descriptors::link(16).unwrap();
        let mut sim = Simulator::new();
        let s = sim.add_stage(Arc::new(Mutex::new(ScriptedSource::new("src", desc.clone(), Throttle::Always))));
        let k = sim.add_stage(Arc::new(Mutex::new(CollectingSink::new("sink", desc.clone(), Throttle::Always))));
        let narrow = sim.add_stage(Arc::new(Mutex::new(CollectingSink::new("narrow", other, Throttle::Always))));

        assert!(matches!(
            sim.connect(s, "nope", k, CollectingSink::ENDPOINT),
            Err(SataError::UnknownEndpoint(_))
        ));
        assert!(matches!(
            sim.connect(k, CollectingSink::ENDPOINT, s, ScriptedSource::ENDPOINT),
            Err(SataError::WrongDirection { .. })
        ));
        assert!(matches!(
            sim.connect(s, ScriptedSource::ENDPOINT, narrow, CollectingSink::ENDPOINT),
            Err(SataError::DescriptorMismatch(_))
        ));
        assert!(matches!(
            sim.connect(s, ScriptedSource::ENDPOINT, StageId(9), CollectingSink::ENDPOINT),
            Err(SataError::UnknownStage(9))
        ));

        sim.connect(s, ScriptedSource::ENDPOINT, k, CollectingSink::ENDPOINT).unwrap();
        assert!(matches!(
            sim.connect(s, ScriptedSource::ENDPOINT, k, CollectingSink::ENDPOINT),
            Err(SataError::AlreadyConnected(_))
        ));
    }

    #[test]
    fn test_framing_error_surfaces() {
        let desc = descriptors::link(32).unwrap();
        let src = Arc::new(Mutex::new(ScriptedSource::new("src", desc.clone(), Throttle::Always)));
        let sink = Arc::new(Mutex::new(CollectingSink::new("sink", desc.clone(), Throttle::Always)));
        // middle of a packet with no start marker
        src.lock().push(desc.beat().with("d", 1).unwrap()).unwrap();

        let mut sim = Simulator::new();
        let s = sim.add_stage(src.clone());
        let k = sim.add_stage(sink.clone());
        sim.connect(s, ScriptedSource::ENDPOINT, k, CollectingSink::ENDPOINT).unwrap();

        assert!(matches!(sim.step(), Err(SataError::Framing { .. })));
        // the faulty unit is delivered together with its fault
        assert_eq!(sink.lock().received().len(), 1);
        assert_eq!(
            sink.lock().faults(),
            &[(0, LinkFault::Framing(crate::FramingError::MissingStart))]
        );
        assert_eq!(src.lock().remaining(), 0);
    }
}
