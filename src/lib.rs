//! On-device playback coordinator for a digital-signage endpoint.
//!
//! Five collaborating pieces, wired together in `main`:
//! [`auth`] signs requests, [`fetcher`] pages through the billboard API,
//! [`cache`] downloads and evicts assets on disk, [`player`] drives the
//! external media process over its IPC socket, and [`playlist`] ties it all
//! together in a bootstrap/play/swap/refetch state machine.

pub mod auth;
pub mod cache;
pub mod config;
pub mod device;
pub mod errors;
pub mod fetcher;
pub mod player;
pub mod playlist;
