//! Per-connection duplex frame queues and the periodic delivery loop.

pub mod delivery;
pub mod queue;
pub mod registry;

pub use delivery::DeliveryLoop;
pub use queue::{Frame, FrameState, InboundQueue, OutboundQueue, QueueError};
pub use registry::{Connection, ConnectionId, ConnectionRegistry};
