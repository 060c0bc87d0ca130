//! Workload Module
//!
//! Drives nodes from a small line-based script.
//!
//! ## Core Concepts
//! - **Script**: One command per line (`put <key> <value>`, `get <key>`, `size`, `sync`), with
//!   `#` comments. A leading `@<id>` restricts a line to one node; `sync` is collective and can
//!   not be restricted.
//! - **Runner**: Executes the steps meant for one node and collects an `Outcome` per step.
//! - **Scenario**: The built-in script used when none is given.

pub mod runner;
pub mod script;

pub use runner::{Outcome, run};
pub use script::{Command, Script, Step};
