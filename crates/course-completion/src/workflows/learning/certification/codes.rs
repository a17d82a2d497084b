use rand::Rng;

use super::super::domain::CertificateId;

/// Unambiguous characters for codes people read aloud or type (no 0/O, 1/I).
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Source of certificate identifiers. Uniqueness is enforced by storage; generators only
/// make collisions unlikely.
pub trait IdentifierSource: Send + Sync {
    fn certificate_id(&self, year: i32) -> CertificateId;
    fn verification_code(&self, year: i32) -> String;
}

#[derive(Debug, Clone)]
pub struct RandomIdentifiers {
    certificate_prefix: String,
    verification_prefix: String,
}

impl RandomIdentifiers {
    pub fn new(certificate_prefix: impl Into<String>, verification_prefix: impl Into<String>) -> Self {
        Self {
            certificate_prefix: certificate_prefix.into(),
            verification_prefix: verification_prefix.into(),
        }
    }
}

impl Default for RandomIdentifiers {
    fn default() -> Self {
        Self::new("CERT", "VC")
    }
}

impl IdentifierSource for RandomIdentifiers {
    fn certificate_id(&self, year: i32) -> CertificateId {
        CertificateId(format!(
            "{}-{year}-{}",
            self.certificate_prefix,
            random_suffix(8)
        ))
    }

    fn verification_code(&self, year: i32) -> String {
        format!(
            "{}-{year}-{}-{}",
            self.verification_prefix,
            random_suffix(4),
            random_suffix(4)
        )
    }
}

fn random_suffix(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}
