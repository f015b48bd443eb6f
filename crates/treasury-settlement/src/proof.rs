//! Delivery-proof verification.
//!
//! The messaging layer attests to a message by having its verifier set sign
//! the message digest. A proof is accepted when at least `threshold`
//! distinct verifiers from the configured set produced valid signatures,
//! the digest matches the message, and the source ledger is one this vault
//! settles for.

use std::collections::HashSet;

use ed25519_dalek::{Signature, VerifyingKey};
use treasury_types::{DeliveryProof, LedgerId, OutboundMessage, Result, TreasuryError, VaultConfig};

/// Authenticates delivered messages.
pub trait ProofVerifier: Send + Sync {
    /// # Errors
    /// Returns `InvalidProof` if the proof does not authenticate `message`.
    fn verify(&self, message: &OutboundMessage, proof: &DeliveryProof) -> Result<()>;
}

/// k-of-n ed25519 verifier set.
#[derive(Debug, Clone)]
pub struct ThresholdSignatureVerifier {
    verifiers: Vec<VerifyingKey>,
    threshold: usize,
    accepted_sources: HashSet<LedgerId>,
}

impl ThresholdSignatureVerifier {
    /// # Errors
    /// Returns `Configuration` if the threshold is zero or exceeds the set.
    pub fn new(
        verifiers: Vec<VerifyingKey>,
        threshold: usize,
        accepted_sources: impl IntoIterator<Item = LedgerId>,
    ) -> Result<Self> {
        if threshold == 0 || threshold > verifiers.len() {
            return Err(TreasuryError::Configuration(format!(
                "threshold {threshold} must be between 1 and {}",
                verifiers.len()
            )));
        }
        Ok(Self {
            verifiers,
            threshold,
            accepted_sources: accepted_sources.into_iter().collect(),
        })
    }

    /// # Errors
    /// Returns `Configuration` for bad keys or threshold.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        Self::new(
            config.verifier_keys()?,
            config.threshold,
            config.accepted_sources.iter().copied(),
        )
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl ProofVerifier for ThresholdSignatureVerifier {
    fn verify(&self, message: &OutboundMessage, proof: &DeliveryProof) -> Result<()> {
        let invalid = |reason: String| TreasuryError::InvalidProof { reason };

        if !self.accepted_sources.contains(&message.source.ledger) {
            return Err(invalid(format!("source {} not accepted", message.source.ledger)));
        }
        let digest = message.digest();
        if proof.message_digest != digest {
            return Err(invalid("digest does not match message".to_string()));
        }

        let signed = DeliveryProof::signing_bytes(&digest);
        let mut valid: HashSet<[u8; 32]> = HashSet::new();
        for sig in &proof.signatures {
            let Some(key) = self.verifiers.iter().find(|k| k.as_bytes() == &sig.verifier) else {
                tracing::debug!(verifier = %hex::encode(sig.verifier), "Signature from unknown verifier ignored");
                continue;
            };
            let Ok(signature) = Signature::from_slice(&sig.signature) else {
                continue;
            };
            if key.verify_strict(&signed, &signature).is_ok() {
                valid.insert(sig.verifier);
            }
        }

        if valid.len() < self.threshold {
            return Err(invalid(format!(
                "{} valid verifier signatures, {} required",
                valid.len(),
                self.threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ed25519_dalek::{Signer, SigningKey};
    use treasury_types::{Address, BatchId, DestinationId, InvoiceId, Nonce, SourceRef, VerifierSignature};

    use super::*;

    fn keys() -> Vec<SigningKey> {
        (1..=3u8).map(|i| SigningKey::from_bytes(&[i; 32])).collect()
    }

    fn verifier() -> ThresholdSignatureVerifier {
        ThresholdSignatureVerifier::new(
            keys().iter().map(SigningKey::verifying_key).collect(),
            2,
            [LedgerId(1)],
        )
        .unwrap()
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            source: SourceRef {
                ledger: LedgerId(1),
                batch_id: BatchId::new(),
                owner: Address([3; 20]),
                nonce: Nonce(9),
            },
            destination: DestinationId(2),
            recipient: Address([4; 20]),
            token: "ETH".into(),
            amount: 100,
            invoice_id: InvoiceId::from_label("INV-9"),
            intent: "hosting".into(),
            fee_quoted: 1,
            created_at: Utc::now(),
        }
    }

    fn sign(digest: [u8; 32], signers: &[SigningKey]) -> DeliveryProof {
        let bytes = DeliveryProof::signing_bytes(&digest);
        DeliveryProof {
            message_digest: digest,
            signatures: signers
                .iter()
                .map(|k| VerifierSignature {
                    verifier: k.verifying_key().to_bytes(),
                    signature: k.sign(&bytes).to_bytes().to_vec(),
                })
                .collect(),
        }
    }

    #[test]
    fn threshold_met() {
        let msg = message();
        let proof = sign(msg.digest(), &keys()[..2]);
        verifier().verify(&msg, &proof).unwrap();
    }

    #[test]
    fn below_threshold_rejected() {
        let msg = message();
        let proof = sign(msg.digest(), &keys()[..1]);
        let err = verifier().verify(&msg, &proof).unwrap_err();
        assert!(matches!(err, TreasuryError::InvalidProof { .. }));
    }

    #[test]
    fn repeated_signer_counts_once() {
        let msg = message();
        let k = &keys()[0];
        let proof = sign(msg.digest(), &[k.clone(), k.clone()]);
        assert!(verifier().verify(&msg, &proof).is_err());
    }

    #[test]
    fn outsiders_do_not_count() {
        let msg = message();
        let outsider = SigningKey::from_bytes(&[99; 32]);
        let proof = sign(msg.digest(), &[keys()[0].clone(), outsider]);
        assert!(verifier().verify(&msg, &proof).is_err());
    }

    #[test]
    fn tampered_message_rejected() {
        let msg = message();
        let proof = sign(msg.digest(), &keys());
        let mut forged = msg.clone();
        forged.amount = 1_000_000;
        let err = verifier().verify(&forged, &proof).unwrap_err();
        assert!(err.to_string().contains("digest"));
    }

    #[test]
    fn unaccepted_source_rejected() {
        let mut msg = message();
        msg.source.ledger = LedgerId(77);
        let proof = sign(msg.digest(), &keys());
        let err = verifier().verify(&msg, &proof).unwrap_err();
        assert!(err.to_string().contains("not accepted"));
    }

    #[test]
    fn bad_threshold_is_configuration_error() {
        let vks: Vec<VerifyingKey> = keys().iter().map(SigningKey::verifying_key).collect();
        assert!(ThresholdSignatureVerifier::new(vks.clone(), 0, [LedgerId(1)]).is_err());
        assert!(ThresholdSignatureVerifier::new(vks, 4, [LedgerId(1)]).is_err());
    }
}
