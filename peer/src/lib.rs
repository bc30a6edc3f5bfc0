//! # Volley Peer Library
//!
//! This library implements one participant in a decentralized ball-passing
//! game. Players stand in a line ordered by numeric id; each player's table
//! has a left and a right door, and a ball leaving through a door lands on
//! the adjacent player's table. A separate master process can join the same
//! group to broadcast settings and fire balls, without taking part in the
//! line itself.
//!
//! ## Core Responsibilities
//!
//! ### Membership
//! Every player registers a name in a shared [`directory::Directory`], finds
//! the players that are already there, and tells each of them hello. On the
//! way out it tells each of them goodbye. There is no central server: each
//! peer keeps its own sorted [`roster::Roster`] of everyone else.
//!
//! ### Doors
//! Whether a door is open is derived from the roster alone:
//! - Nobody else around: both doors closed
//! - Everyone else has a larger id: only the right door is open
//! - Everyone else has a smaller id: only the left door is open
//! - Otherwise both doors are open
//!
//! Changes are reported to the local table through a bounded channel, and
//! only actual changes are reported.
//!
//! ### Ball Handoff
//! The local table asks for a ball to be thrown left or right, and the
//! coordinator delivers it to the neighbor on that side.
//!
//! ### Control Plane
//! Pause duration, gravity, named master commands, kicks and quits are fanned
//! out to the roster, and a master can fire fresh balls at every player.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! [`coordinator::Coordinator::run`] is the only code that touches the roster
//! or the door state. Inbound RPCs are turned into events by the
//! [`relay::Relay`] and queued; outbound work (ball throws, broadcasts,
//! stop and drain requests) arrives over channels as well. Events are
//! handled one at a time, in the order the loop picks them up.
//!
//! ### Length-Prefixed TCP RPC
//! Each call opens a TCP connection to the target's registered address and
//! exchanges one `bincode` frame each way. Names are resolved through the
//! directory on every call.
//!
//! ### Failure Model
//! Failures carry a [`error::Severity`]. Fatal ones end the event loop, which
//! stops the coordinator and hands the error back to the caller. Recoverable
//! ones (a peer that cannot be told goodbye, a directory that cannot be
//! read) are logged and otherwise ignored.
//!
//! ## Module Organization
//!
//! ### Coordinator Module (`coordinator`)
//! Lifecycle, the event loop and the [`coordinator::CoordinatorHandle`]
//! used to drive it from other tasks.
//!
//! ### Transport Modules (`transport`, `endpoint`, `relay`)
//! - Frame codec and typed [`transport::PeerClient`]
//! - TCP listener serving inbound frames
//! - Dispatch of inbound requests onto channels
//!
//! ### Game Logic Modules (`roster`, `doors`, `handoff`, `broadcast`)
//! Pure or nearly pure building blocks the event loop is assembled from.
//!
//! ### Group Modules (`directory`, `discovery`, `membership`)
//! Name registration and lookup, discovery of existing players, and the
//! hello/goodbye protocol.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use peer::config::Config;
//! use peer::coordinator::Coordinator;
//! use peer::directory::{Directory, FileDirectory};
//! use peer::transport::TcpConnector;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let directory: Arc<dyn Directory> =
//!         Arc::new(FileDirectory::new(config.directory_root.clone()));
//!     let connector = Arc::new(TcpConnector::new(Arc::clone(&directory)));
//!
//!     let mut coordinator = Coordinator::new(config, directory, connector);
//!     let mut doors = coordinator.take_door_commands().expect("fresh coordinator");
//!     tokio::spawn(async move { while doors.recv().await.is_some() {} });
//!
//!     if coordinator.initialize(false).await? {
//!         coordinator.run_prep(None).await?;
//!         coordinator.run().await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod discovery;
pub mod doors;
pub mod endpoint;
pub mod error;
pub mod handoff;
pub mod membership;
pub mod relay;
pub mod roster;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorHandle, Lifecycle};
pub use error::{PeerError, Severity};
