pub mod cell;
pub mod connection;

pub use cell::StateCell;
pub use connection::{ConnectionPhase, ConnectionState, StatusCode};
