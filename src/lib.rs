pub mod cli;
pub mod config;
pub mod error;
pub mod ident;
pub mod orchestrator;
pub mod rtp;
pub mod sdp;
pub mod sink;
pub mod sip;
pub mod stats;
pub mod transport;
pub mod uac;

#[cfg(test)]
pub mod testutil;
