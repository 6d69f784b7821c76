//! HTTP surface for the nomusic service, exposed as a library so
//! integration tests can drive the router in-process.

pub mod api;
pub mod state;
