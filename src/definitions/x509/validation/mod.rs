mod signature;
mod validity;

pub use signature::issuer_signed_subject;
pub use validity::{check_validity_period_at, Error as ValidityError};

use x509_cert::Certificate;

/// Check that every certificate in a walked chain was signed by its successor.
///
/// The last certificate must either be self-signed or is accepted as is, since it is
/// the trust point that terminates the chain.
pub fn verify_chain_signatures(chain: &[Certificate]) -> Result<(), String> {
    for (index, pair) in chain.windows(2).enumerate() {
        if !issuer_signed_subject(&pair[0], &pair[1]) {
            return Err(format!(
                "certificate at position {index} is not signed by its issuer"
            ));
        }
    }
    Ok(())
}
