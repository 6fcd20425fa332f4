pub mod issue;
pub mod trust;
pub mod util;
pub mod validation;
pub mod x5chain;

pub use trust::{TrustError, TrustManager, TrustPoint, TrustVerificationResult};
pub use x5chain::{Builder, CertificateWithDer, X5Chain};

#[cfg(test)]
pub(crate) mod test {
    use std::time::Duration;

    use p256::ecdsa::SigningKey;

    use super::issue::{self_signed_certificate, CertificateParams};
    use super::X5Chain;

    /// A fresh P-256 key with a self-signed certificate valid around now.
    pub(crate) fn self_signed(subject: &str) -> (SigningKey, X5Chain) {
        let key = SigningKey::random(&mut rand::thread_rng());
        let certificate = self_signed_certificate(
            &CertificateParams::around_now(
                subject,
                Duration::from_secs(600),
                Duration::from_secs(600),
            ),
            &key,
        )
        .unwrap();
        let x5chain = X5Chain::builder()
            .with_certificate(certificate)
            .unwrap()
            .build()
            .unwrap();
        (key, x5chain)
    }
}
