//! Typed graph model
//!
//! Plans, steps, tool calls, and messages are recorded as tagged nodes
//! connected by a closed set of edge kinds. The graph is authoritative for
//! plan structure and for tool-call results.

mod edge;
mod node;
mod store;

pub use edge::{EdgeKind, GraphEdge};
pub use node::{GraphNode, NodeKind};
pub use store::{EdgeFilter, GraphStore};
