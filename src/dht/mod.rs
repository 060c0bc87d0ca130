//! DHT Module
//!
//! A key/value table partitioned over a fixed set of nodes.
//!
//! ## Core Concepts
//! - **Ownership**: Each key lives on exactly one node, picked by the `Partitioner`.
//! - **Server**: Every node runs one background `Server` task that owns its shard and answers
//!   `Put`, `Get` and `SizeRequest` from any node, including itself.
//! - **Client**: `DhtNode` is the blocking facade (`put`, `get`, `size`, `sync`, `destroy`).
//!   Put confirmations reach it through a `PendingConfirmation` fed by the local server;
//!   `get` and `size` replies are received directly from the client mailbox.
//! - **Lifecycle**: `init` on every node, any number of calls, then `destroy` on every node.

pub mod confirm;
pub mod node;
pub mod protocol;
pub mod server;

pub use confirm::PendingConfirmation;
pub use node::DhtNode;
pub use protocol::{Message, MessageKind, NOT_FOUND};
pub use server::Server;
