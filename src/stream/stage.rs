//! Pipeline stage framework
//!
//! Stages expose named endpoints and advance once per simulation step.
//! Offers and readiness are read from state committed in the previous step,
//! transfers are then committed to every stage at once.

use std::fmt;
use std::sync::Arc;

use super::{Beat, EndpointDescriptor};
use crate::error::LinkFault;
use crate::Result;

/// Data direction of an endpoint, seen from the stage that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Consumes units
    Sink,
    /// Produces units
    Source,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sink => f.write_str("sink"),
            Direction::Source => f.write_str("source"),
        }
    }
}

/// Named endpoint of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub direction: Direction,
    pub descriptor: Arc<EndpointDescriptor>,
}

impl Endpoint {
    pub fn sink(name: impl Into<String>, descriptor: Arc<EndpointDescriptor>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Sink,
            descriptor,
        }
    }

    pub fn source(name: impl Into<String>, descriptor: Arc<EndpointDescriptor>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Source,
            descriptor,
        }
    }
}

/// Transfers that completed on a stage's endpoints during one step
#[derive(Debug, Clone, Default)]
pub struct StepIo {
    /// Source endpoints whose offered unit was taken
    pub accepted: Vec<String>,
    /// Units delivered to sink endpoints
    pub received: Vec<(String, Beat)>,
    /// Protocol faults seen on links into sink endpoints
    pub faults: Vec<(String, LinkFault)>,
}

impl StepIo {
    pub fn accepted(&self, endpoint: &str) -> bool {
        self.accepted.iter().any(|name| name == endpoint)
    }

    pub fn received(&self, endpoint: &str) -> Option<&Beat> {
        self.received
            .iter()
            .find(|(name, _)| name == endpoint)
            .map(|(_, beat)| beat)
    }

    /// Fault reported on a sink endpoint, alongside any unit it received
    pub fn fault(&self, endpoint: &str) -> Option<&LinkFault> {
        self.faults
            .iter()
            .find(|(name, _)| name == endpoint)
            .map(|(_, fault)| fault)
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.received.is_empty() && self.faults.is_empty()
    }
}

/// Stage trait - every pipeline element with named endpoints implements this
pub trait Stage: Send {
    /// Human-readable name
    fn name(&self) -> &str;

    /// All endpoints, in a stable order
    fn endpoints(&self) -> Vec<Endpoint>;

    /// Unit currently offered on a source endpoint (valid when `Some`)
    fn offer(&self, endpoint: &str) -> Option<Beat> {
        let _ = endpoint;
        None
    }

    /// Readiness of a sink endpoint
    fn ready(&self, endpoint: &str) -> bool {
        let _ = endpoint;
        false
    }

    /// Commit the transfers of one step and advance internal state
    fn commit(&mut self, io: &StepIo) -> Result<()>;

    /// Reset to initial state
    fn reset(&mut self);

    /// Find an endpoint by name
    fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.endpoints().into_iter().find(|ep| ep.name == name)
    }
}
