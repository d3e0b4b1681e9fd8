//! Stream endpoints
//!
//! Pipeline stages exchange fixed-layout units over ready/valid connections.
//! A descriptor declares the layout, a `StreamConnection` enforces the
//! handshake and packet framing, and `BufferedEndpoints` adds elasticity
//! without changing what flows through.

mod buffer;
mod connection;
mod descriptor;
pub mod descriptors;
pub mod sim;
mod stage;

pub use buffer::BufferedEndpoints;
pub use connection::{StreamConnection, Transfer};
pub use descriptor::{Beat, EndpointDescriptor, FieldDesc, MAX_FIELD_WIDTH};
pub use descriptors::DescriptorSet;
pub use sim::{CollectingSink, ScriptedSource, Simulator, StageId, StageRef, Throttle};
pub use stage::{Direction, Endpoint, Stage, StepIo};
