//! Raw TCP bot server: accept loop, worker pool and per-connection handling.

pub mod connection;
pub mod dispatcher;
pub mod pool;

pub use connection::{ConnectionHandler, ConnectionState};
pub use dispatcher::{bind_listener, ConnectionDispatcher};
pub use pool::{PoolClosed, WorkerPool, WorkerSlot};
