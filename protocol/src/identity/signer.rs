//! Signer attestations and verified signer sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::crypto::keys::{Keypair, PublicKey, Signature};

/// Errors during signature verification.
///
/// Intentionally terse; we don't tell attackers why verification failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature verification failed for signer {0}")]
    VerificationFailed(PublicKey),

    #[error("signer {0} attested more than once")]
    DuplicateSigner(PublicKey),
}

/// One signer's claim over a message: "I, `signer`, authorize these bytes".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub signer: PublicKey,
    pub signature: Signature,
}

impl Attestation {
    /// Sign `message` with `keypair`.
    pub fn sign(keypair: &Keypair, message: &[u8]) -> Self {
        Self {
            signer: keypair.public_key(),
            signature: keypair.sign(message),
        }
    }

    /// Check this attestation against `message`.
    pub fn verify(&self, message: &[u8]) -> bool {
        self.signer.verify(message, &self.signature)
    }
}

/// The set of identities that authorized a transition.
///
/// Not deserializable: only [`verify_attestations`], or a host that checked
/// signatures itself via [`SignerSet::from_verified`], builds one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerSet {
    signers: BTreeSet<PublicKey>,
}

impl SignerSet {
    /// An empty signer set. Nothing requiring a signature will pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a signer set from identities that have already been verified
    /// by the host environment.
    pub fn from_verified<I>(signers: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        Self {
            signers: signers.into_iter().collect(),
        }
    }

    /// Add an already-verified identity.
    pub fn insert(&mut self, signer: PublicKey) -> bool {
        self.signers.insert(signer)
    }

    /// Returns `true` if `identity` signed.
    pub fn contains(&self, identity: &PublicKey) -> bool {
        self.signers.contains(identity)
    }

    /// Returns `true` if any signer is a member of `candidates`.
    pub fn intersects<'a, I>(&self, candidates: I) -> bool
    where
        I: IntoIterator<Item = &'a PublicKey>,
    {
        candidates.into_iter().any(|c| self.signers.contains(c))
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.signers.iter()
    }
}

impl FromIterator<PublicKey> for SignerSet {
    fn from_iter<T: IntoIterator<Item = PublicKey>>(iter: T) -> Self {
        Self::from_verified(iter)
    }
}

/// Verify every attestation against `message` and collect the signers.
///
/// All-or-nothing: a single bad signature rejects the whole batch, and an
/// identity may attest only once.
pub fn verify_attestations(
    message: &[u8],
    attestations: &[Attestation],
) -> Result<SignerSet, SignatureError> {
    let mut set = SignerSet::new();
    for attestation in attestations {
        if !attestation.verify(message) {
            tracing::debug!(signer = %attestation.signer, "attestation rejected");
            return Err(SignatureError::VerificationFailed(attestation.signer));
        }
        if !set.insert(attestation.signer) {
            return Err(SignatureError::DuplicateSigner(attestation.signer));
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_attestations_form_signer_set() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let msg = b"close escrow";

        let set = verify_attestations(
            msg,
            &[Attestation::sign(&alice, msg), Attestation::sign(&bob, msg)],
        )
        .unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains(&alice.public_key()));
        assert!(set.contains(&bob.public_key()));
    }

    #[test]
    fn forged_attestation_rejects_batch() {
        let alice = Keypair::generate();
        let mallory = Keypair::generate();
        let msg = b"transfer";

        // Mallory signs but claims to be Alice.
        let forged = Attestation {
            signer: alice.public_key(),
            signature: mallory.sign(msg),
        };

        let err = verify_attestations(msg, &[Attestation::sign(&mallory, msg), forged]).unwrap_err();
        assert_eq!(err, SignatureError::VerificationFailed(alice.public_key()));
    }

    #[test]
    fn signature_over_other_message_rejected() {
        let alice = Keypair::generate();
        let att = Attestation::sign(&alice, b"approve 10");
        assert!(verify_attestations(b"approve 1000", &[att]).is_err());
    }

    #[test]
    fn duplicate_signer_rejected() {
        let alice = Keypair::generate();
        let msg = b"m";
        let att = Attestation::sign(&alice, msg);
        assert_eq!(
            verify_attestations(msg, &[att.clone(), att]).unwrap_err(),
            SignatureError::DuplicateSigner(alice.public_key())
        );
    }

    #[test]
    fn no_attestations_yields_empty_set() {
        let set = verify_attestations(b"m", &[]).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn intersects_checks_membership() {
        let a = Keypair::generate().public_key();
        let b = Keypair::generate().public_key();
        let c = Keypair::generate().public_key();
        let set = SignerSet::from_verified([a]);
        assert!(set.intersects([&b, &a]));
        assert!(!set.intersects([&b, &c]));
    }
}
