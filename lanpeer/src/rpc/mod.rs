//! Request/response over discovery
//!
//! A [`Requester`] sends `{ID, Path, Data}` requests and waits for the
//! correlated `{ID, Path, Status, Error, Data}` reply; a [`Responder`] maps
//! paths to handlers and answers point-to-point.

pub mod requester;
pub mod responder;

pub use requester::*;
pub use responder::*;
