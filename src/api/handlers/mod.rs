//! Route handlers served alongside the gate.
//!
//! `health` and `signout` are answered locally; every other path falls through to
//! `proxy`, which relays the (gated) request to the dashboard frontend.

pub mod health;
pub mod proxy;
pub mod signout;

pub use self::health::health;
pub use self::proxy::{proxy, Upstream};
pub use self::signout::{signout, SignoutConfig};
