// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document integrity — SHA-256 fingerprints of stored document revisions.
//
// Every revision the job engine writes back is fingerprinted, and a job
// re-checks its input against the recorded fingerprint before it runs.

use docforge_core::error::ForgeError;
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Check a stored revision against the fingerprint recorded when it was
/// written. Case is ignored; a recorded value that is not a full hex digest
/// never matches.
pub fn verify_revision(bytes: &[u8], recorded: &str) -> Result<(), ForgeError> {
    let actual = hash_bytes(bytes);
    let well_formed =
        recorded.len() == DIGEST_HEX_LEN && recorded.bytes().all(|b| b.is_ascii_hexdigit());
    if well_formed && actual.eq_ignore_ascii_case(recorded) {
        Ok(())
    } else {
        Err(ForgeError::IntegrityMismatch {
            expected: recorded.to_owned(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_PDF: &[u8] = b"%PDF-1.7\n%%EOF\n";

    #[test]
    fn fingerprint_of_a_known_revision() {
        assert_eq!(
            hash_bytes(MINIMAL_PDF),
            "1e7313ace78f0fb481a486939b4885902663102818090805515553d84e0bbfd3"
        );
    }

    #[test]
    fn one_byte_edit_changes_the_fingerprint() {
        let mut edited = MINIMAL_PDF.to_vec();
        edited[7] = b'6';
        let recorded = hash_bytes(MINIMAL_PDF);
        assert_ne!(hash_bytes(&edited), recorded);

        match verify_revision(&edited, &recorded) {
            Err(ForgeError::IntegrityMismatch { expected, actual }) => {
                assert_eq!(expected, recorded);
                assert_eq!(actual, hash_bytes(&edited));
            }
            other => panic!("edited revision accepted: {other:?}"),
        }
    }

    #[test]
    fn recorded_fingerprint_matches_in_either_case() {
        let recorded = hash_bytes(MINIMAL_PDF);
        assert!(verify_revision(MINIMAL_PDF, &recorded).is_ok());
        assert!(verify_revision(MINIMAL_PDF, &recorded.to_uppercase()).is_ok());
    }

    #[test]
    fn malformed_fingerprints_never_match() {
        let recorded = hash_bytes(MINIMAL_PDF);
        let extended = format!("{recorded}00");
        let not_hex = recorded.replace('e', "g");
        for bad in ["", &recorded[..32], extended.as_str(), not_hex.as_str()] {
            assert!(matches!(
                verify_revision(MINIMAL_PDF, bad),
                Err(ForgeError::IntegrityMismatch { .. })
            ));
        }
    }
}
