//! Verifier engine for ISO/IEC 18013-5 and 18013-7 mobile documents.
//!
//! The crate builds reader-authenticated device requests, derives the session
//! transcripts used by the W3C Digital Credentials and OpenID4VP transports,
//! validates certificate chains against configured trust points and drives a
//! verifier session from request to extracted claims.
pub mod cbor;
pub mod cose;
pub mod crypto;
pub mod definitions;
pub mod presentation;
pub mod verifier;

pub use verifier::{
    Protocol, ResultLine, SessionState, VerifierConfig, VerifierSessionCoordinator,
};
