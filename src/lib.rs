pub mod config;
pub mod content;
pub mod context;
pub mod dates;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod journal;
pub mod mcp;
pub mod model;
pub mod network;
pub mod query;
pub mod relations;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{BridgeError, Result};
pub use gateway::{GraphGateway, LogseqApi};
pub use network::{traversal_for, ConceptNetwork, NetworkTraversal, Strategy};
