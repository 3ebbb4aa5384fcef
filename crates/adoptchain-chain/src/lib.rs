//! Adoption settlement: alloy-backed adoption contract gateway.
//!
//! Encodes domain calls against the adoption contract's ABI, decodes its
//! logs into domain events, and talks to a node over a websocket.

pub mod abi;
pub mod rpc_gateway;

pub use rpc_gateway::RpcChainGateway;
