//! Verifier-side handling of presentations: building device requests and reading the
//! responses returned by a holder.
pub mod reader;
