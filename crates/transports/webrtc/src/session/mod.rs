//! Session state machine
//!
//! [`SessionController`] is the only component the control surface talks
//! to. It sequences transport setup, the synthesis session and the
//! compositor, and tears them down again on disconnect.

pub mod controller;
pub mod phase;

pub use controller::{SessionController, SessionControllerBuilder};
pub use phase::Phase;
