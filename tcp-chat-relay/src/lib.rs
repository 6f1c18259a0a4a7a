//! Multi-client TCP chat relay.
//!
//! Every byte one client sends is forwarded, unframed, to every other
//! connected client. Joins and departures are announced as plain-text
//! notices carrying the client's address. Each module has one job:
//!
//! - [`connection`] wraps the write half of one client's stream and tracks
//!   whether it is still active.
//! - [`registry`] is the shared set of live connections.
//! - [`relay`] fans a payload out to everyone but its sender and drops
//!   clients whose writes fail.
//! - [`message`] holds relayed payloads and the join/leave notice text.
//! - [`server`] binds the listener, accepts clients, and runs one read loop
//!   per client.
//! - [`cli`] parses the command line for server and client modes.
//! - [`client`] is a small terminal client for talking to a server.
//!
//! Unit tests live next to each module; `tests/` drives the server over
//! loopback TCP and through the compiled binary.

pub mod cli;
pub mod client;
pub mod connection;
pub mod error;
pub mod message;
pub mod registry;
pub mod relay;
pub mod server;
