pub mod sign1;

use coset::iana;

pub use sign1::CoseSign1;

/// Trait to represent the signature algorithm of a signer or verifier.
pub trait SignatureAlgorithm {
    fn algorithm(&self) -> iana::Algorithm;
}

mod p256 {
    use crate::cose::SignatureAlgorithm;
    use coset::iana;
    use p256::ecdsa::{SigningKey, VerifyingKey};

    impl SignatureAlgorithm for SigningKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::ES256
        }
    }

    impl SignatureAlgorithm for VerifyingKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::ES256
        }
    }
}

mod p384 {
    use crate::cose::SignatureAlgorithm;
    use coset::iana;
    use p384::ecdsa::{SigningKey, VerifyingKey};

    impl SignatureAlgorithm for SigningKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::ES384
        }
    }

    impl SignatureAlgorithm for VerifyingKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::ES384
        }
    }
}
