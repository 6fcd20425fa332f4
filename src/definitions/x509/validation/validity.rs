use time::OffsetDateTime;
use x509_cert::Certificate;

use crate::definitions::x509::util::{not_after, not_before};

/// Check certificate validity period against a specific time.
pub fn check_validity_period_at(certificate: &Certificate, at: OffsetDateTime) -> Option<Error> {
    if not_before(certificate) > at {
        return Some(Error::NotYetValid);
    }
    if not_after(certificate) < at {
        return Some(Error::Expired);
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expired")]
    Expired,
    #[error("not yet valid")]
    NotYetValid,
}
