//! Messaging-layer verifier committee.
//!
//! Stands in for the transport's verifier network: each member signs the
//! digest of every message it sees, and a proof carries `quorum` of those
//! signatures.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use treasury_types::{DeliveryProof, LedgerId, OutboundMessage, Result, TreasuryError, VaultConfig, VerifierSignature};

pub struct VerifierCommittee {
    members: Vec<SigningKey>,
    quorum: usize,
}

impl VerifierCommittee {
    /// # Errors
    /// Returns `Configuration` if `quorum` is zero or exceeds the members.
    pub fn new(members: Vec<SigningKey>, quorum: usize) -> Result<Self> {
        if quorum == 0 || quorum > members.len() {
            return Err(TreasuryError::Configuration(format!(
                "quorum {quorum} must be between 1 and {}",
                members.len()
            )));
        }
        Ok(Self { members, quorum })
    }

    /// Fresh random committee of `size` members.
    ///
    /// # Errors
    /// As [`VerifierCommittee::new`].
    pub fn generate(size: usize, quorum: usize) -> Result<Self> {
        let members = (0..size).map(|_| SigningKey::generate(&mut OsRng)).collect();
        Self::new(members, quorum)
    }

    #[must_use]
    pub fn public_keys(&self) -> Vec<VerifyingKey> {
        self.members.iter().map(SigningKey::verifying_key).collect()
    }

    #[must_use]
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Vault configuration trusting this committee.
    #[must_use]
    pub fn vault_config(&self, accepted_sources: Vec<LedgerId>) -> VaultConfig {
        VaultConfig {
            verifiers: self
                .public_keys()
                .iter()
                .map(|k| hex::encode(k.to_bytes()))
                .collect(),
            threshold: self.quorum,
            accepted_sources,
            destination: None,
        }
    }

    /// Quorum-signed proof for `message`.
    #[must_use]
    pub fn prove(&self, message: &OutboundMessage) -> DeliveryProof {
        let digest = message.digest();
        let signed = DeliveryProof::signing_bytes(&digest);
        DeliveryProof {
            message_digest: digest,
            signatures: self.members[..self.quorum]
                .iter()
                .map(|key| VerifierSignature {
                    verifier: key.verifying_key().to_bytes(),
                    signature: key.sign(&signed).to_bytes().to_vec(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use treasury_settlement::{ProofVerifier, ThresholdSignatureVerifier};
    use treasury_types::{Address, BatchId, DestinationId, InvoiceId, Nonce, SourceRef};

    use super::*;

    fn message() -> OutboundMessage {
        OutboundMessage {
            source: SourceRef {
                ledger: LedgerId(1),
                batch_id: BatchId::new(),
                owner: Address::random(),
                nonce: Nonce(3),
            },
            destination: DestinationId(2),
            recipient: Address::random(),
            token: "ETH".into(),
            amount: 5,
            invoice_id: InvoiceId::random(),
            intent: "test".into(),
            fee_quoted: 0,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn proofs_satisfy_a_vault_trusting_the_committee() {
        let committee = VerifierCommittee::generate(4, 3).unwrap();
        let verifier = ThresholdSignatureVerifier::from_config(&committee.vault_config(vec![LedgerId(1)])).unwrap();
        let msg = message();
        let proof = committee.prove(&msg);
        assert_eq!(proof.signatures.len(), 3);
        verifier.verify(&msg, &proof).unwrap();
    }

    #[test]
    fn bad_quorum_rejected() {
        assert!(VerifierCommittee::generate(2, 3).is_err());
        assert!(VerifierCommittee::generate(2, 0).is_err());
    }
}
