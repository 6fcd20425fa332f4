use const_oid::db::rfc5912::{ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384};
use der::Encode;
use ecdsa::signature::Verifier;
use p256::NistP256;
use p384::NistP384;
use x509_cert::Certificate;

use crate::definitions::x509::util::public_key;

/// Check that the issuer certificate signed the subject certificate.
pub fn issuer_signed_subject(subject: &Certificate, issuer: &Certificate) -> bool {
    let tbs = match subject.tbs_certificate.to_der() {
        Ok(tbs) => tbs,
        Err(e) => {
            tracing::error!("failed to encode subject tbs: {e:?}");
            return false;
        }
    };
    let signature = subject.signature.raw_bytes();
    let algorithm = subject.signature_algorithm.oid;

    if algorithm == ECDSA_WITH_SHA_256 {
        check(
            public_key::<NistP256>(issuer),
            p256::ecdsa::Signature::from_der(signature),
            &tbs,
        )
    } else if algorithm == ECDSA_WITH_SHA_384 {
        check(
            public_key::<NistP384>(issuer),
            p384::ecdsa::Signature::from_der(signature),
            &tbs,
        )
    } else {
        tracing::info!("unsupported certificate signature algorithm: {algorithm}");
        false
    }
}

fn check<K, S>(key: anyhow::Result<K>, sig: Result<S, ecdsa::Error>, tbs: &[u8]) -> bool
where
    K: Verifier<S>,
{
    let key = match key {
        Ok(pk) => pk,
        Err(e) => {
            tracing::error!("failed to decode issuer public key: {e:?}");
            return false;
        }
    };

    let sig = match sig {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!("failed to parse subject signature: {e:?}");
            return false;
        }
    };

    match key.verify(tbs, &sig) {
        Ok(()) => true,
        Err(e) => {
            tracing::info!("subject certificate signature could not be validated: {e:?}");
            false
        }
    }
}
