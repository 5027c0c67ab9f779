//! # Audio Extraction
//!
//! Resolves a YouTube video id to a direct, playable audio URL.
//!
//! ## Overview
//!
//! Several independent third-party services can do this, each with its own
//! request and response shape. Every service instance is wrapped in an
//! [`ExtractionBackend`] adapter that turns its raw response into a
//! [`BackendOutcome`]. The [`ExtractionChain`] tries the backends strictly in
//! order and stops at the first success:
//!
//! ```text
//! cobalt #1 ─skip─▶ cobalt #2 ─skip─▶ piped #1 ─ok─▶ AudioResult
//! ```
//!
//! A chain that runs out of backends returns `None`; the transport engine
//! treats that as "play the video embed instead".
//!
//! [`RemoteExtractor`] is the alternative: it asks a hosted function that
//! runs the same chain server-side.

pub mod backend;
pub mod chain;
pub mod cobalt;
pub mod error;
pub mod piped;
pub mod remote;

pub use backend::{AudioExtractor, AudioResult, BackendOutcome, ExtractionBackend, SkipReason};
pub use chain::{build_extractor, ExtractionChain};
pub use cobalt::CobaltBackend;
pub use error::{ExtractionError, Result};
pub use piped::PipedBackend;
pub use remote::RemoteExtractor;
