//! Token-authenticated broadcast chat over TCP.
//!
//! Clients connect, present a username and a shared access token as their
//! first message, and from then on every message they send is fanned out
//! to all connected clients, the sender included.
//!
//! - [`server`] accepts TCP connections and handles shutdown.
//! - [`connection`] walks one connection through its lifecycle, pairing an
//!   [`ingress`] read loop with an [`egress`] write task.
//! - [`session`] holds the per-client outbound queue and cancellation
//!   signal; [`registry`] is the shared set of active sessions and
//!   [`fanout`] delivers a message to all of them.
//! - [`message`] is the JSON line protocol, [`auth`] the token set.
//! - [`cli`], [`config`] and [`client`] cover the command-line surface.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod egress;
pub mod error;
pub mod fanout;
pub mod ingress;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
