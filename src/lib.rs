//! Demand paging for a fixed table of physical frames shared by many
//! address spaces: address translation, page faults with eviction and
//! swap, and page pinning for in-flight I/O.

pub mod config;
pub mod error;
pub mod fault;
pub mod frame_table;
pub mod meta_commands;
pub mod mmu;
pub mod page_lock;
pub mod page_table;
pub mod repl;
pub mod sched;
pub mod sim;
pub mod swap;
mod types;

pub use config::MmuConfig;
pub use error::MmuError;
pub use mmu::Mmu;
pub use types::*;
