//! hodl-core
//!
//! Shared vocabulary of the ShareHODL state machine: addresses and amounts,
//! the fixed-point [`dec::Dec`], coins and denom rules, the [`msg::Msg`]
//! message set, the signed [`tx::Tx`] envelope, typed [`events::Event`]s,
//! the protocol [`error::Error`] enum, constants, and governance-tunable
//! [`params::Params`].
//!
//! This crate holds no state and performs no I/O; every other crate in the
//! workspace depends on it.

pub mod coin;
pub mod constants;
pub mod dec;
pub mod error;
pub mod events;
pub mod msg;
pub mod params;
pub mod tier;
pub mod tx;
pub mod types;

pub use coin::Coin;
pub use dec::Dec;
pub use error::{Error, ErrorKind};
pub use events::{Event, EventManager};
pub use msg::Msg;
pub use params::Params;
pub use tier::Tier;
pub use types::{Address, Amount, Height, Sequence, Timestamp, TxHash};
