//! Store implementations
//!
//! In-memory graph store plus two session-store providers (ephemeral and
//! file-backed), and the per-session serialized writer shared by the
//! processor and executor.

mod graph_memory;
mod session_file;
mod session_memory;
mod session_writer;

pub use graph_memory::InMemoryGraphStore;
pub use session_file::FileSessionStore;
pub use session_memory::InMemorySessionStore;
pub use session_writer::SessionWriter;
