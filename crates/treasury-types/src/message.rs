//! Cross-chain message and delivery-proof types.
//!
//! An [`OutboundMessage`] is created exactly once per successful dispatch and
//! handed to the messaging collaborator. The relay may deliver it any number
//! of times, in any order, each time with a [`DeliveryProof`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Address, Amount, BatchId, DestinationId, InvoiceId, LedgerId, Nonce, Token, constants};

/// Where a message came from: the source ledger, the batch that escrowed
/// its funds, and the (owner, nonce) that authorized it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub ledger: LedgerId,
    pub batch_id: BatchId,
    pub owner: Address,
    pub nonce: Nonce,
}

/// The payload handed to the messaging layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub source: SourceRef,
    pub destination: DestinationId,
    pub recipient: Address,
    pub token: Token,
    pub amount: Amount,
    pub invoice_id: InvoiceId,
    pub intent: String,
    /// Messaging fee quoted at dispatch time.
    pub fee_quoted: Amount,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// SHA-256 digest over the canonical encoding. Every field is bound,
    /// `created_at` included, since the vault records it.
    ///
    /// Format: `"treasury:message:v1:" || ledger || batch_id || owner || nonce
    /// || destination || recipient || len(token) || token || amount || invoice_id
    /// || len(intent) || intent || fee_quoted || created_at.secs || created_at.nanos`
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(constants::MESSAGE_DOMAIN);
        hasher.update(self.source.ledger.0.to_le_bytes());
        hasher.update(self.source.batch_id.0.as_bytes());
        hasher.update(self.source.owner.0);
        hasher.update(self.source.nonce.0.to_le_bytes());
        hasher.update(self.destination.0.to_le_bytes());
        hasher.update(self.recipient.0);
        hasher.update((self.token.len() as u64).to_le_bytes());
        hasher.update(self.token.as_bytes());
        hasher.update(self.amount.to_le_bytes());
        hasher.update(self.invoice_id.0);
        hasher.update((self.intent.len() as u64).to_le_bytes());
        hasher.update(self.intent.as_bytes());
        hasher.update(self.fee_quoted.to_le_bytes());
        hasher.update(self.created_at.timestamp().to_le_bytes());
        hasher.update(self.created_at.timestamp_subsec_nanos().to_le_bytes());
        hasher.finalize().into()
    }
}

/// One verifier's signature over a message digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierSignature {
    /// Ed25519 public key of the verifier.
    pub verifier: [u8; 32],
    pub signature: Vec<u8>,
}

/// Evidence from the messaging layer that a message really originated on the
/// claimed source ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryProof {
    /// Digest the signatures commit to; must equal `message.digest()`.
    pub message_digest: [u8; 32],
    pub signatures: Vec<VerifierSignature>,
}

impl DeliveryProof {
    /// Bytes each verifier signs for a given digest.
    #[must_use]
    pub fn signing_bytes(digest: &[u8; 32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(constants::DELIVERY_PROOF_DOMAIN.len() + 32);
        bytes.extend_from_slice(constants::DELIVERY_PROOF_DOMAIN);
        bytes.extend_from_slice(digest);
        bytes
    }
}
