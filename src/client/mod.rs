//! Client runtime: talks to the panel service and keeps page state.

pub mod http;
pub mod optimistic;
pub mod remote;
pub mod session;
pub mod views;

pub use http::HttpRemote;
pub use optimistic::{Confirm, Liveness, Pending, Revert, Settled};
pub use remote::{ClientError, Remote};
pub use session::{Gate, SessionCache, SessionState, Subscription};
