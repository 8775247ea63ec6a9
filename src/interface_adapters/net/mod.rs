// Network adapter modules: the line-based transport, the process-wide
// connection set, and the per-connection session state machine.

pub mod connections;
pub mod session;
pub mod transport;
