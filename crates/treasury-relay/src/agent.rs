//! Payment agent: the authorized dispatcher's client loop.
//!
//! Each attempt starts from scratch with a fresh nonce, a fresh attestation
//! for gated routes and a fresh fee quote, so a retry never depends on state
//! from a failed attempt. Nonces consumed by failed attempts stay consumed.

use std::sync::Arc;

use tokio::task::JoinSet;
use treasury_ledger::{DispatchReceipt, PaymentDispatcher, generate_nonce};
use treasury_types::{Address, Amount, DestinationId, InvoiceId, PaymentIntent, Result, TreasuryError};

use crate::{oracle::OracleSource, retry::RetryPolicy};

/// What the agent is asked to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub destination: DestinationId,
    pub recipient: Address,
    pub amount: Amount,
    pub invoice_id: InvoiceId,
    pub intent: String,
}

#[derive(Clone)]
pub struct PaymentAgent {
    identity: Address,
    dispatcher: Arc<PaymentDispatcher>,
    oracle: Arc<dyn OracleSource>,
    retry: RetryPolicy,
}

impl PaymentAgent {
    #[must_use]
    pub fn new(
        identity: Address,
        dispatcher: Arc<PaymentDispatcher>,
        oracle: Arc<dyn OracleSource>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            identity,
            dispatcher,
            oracle,
            retry,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Address {
        self.identity
    }

    /// Dispatch one payment, retrying transient failures.
    ///
    /// # Errors
    /// The last dispatch error once retries are exhausted or on a permanent error.
    pub async fn pay(&self, request: &PaymentRequest) -> Result<DispatchReceipt> {
        self.retry
            .run_if("dispatch", retry_dispatch, |attempt| async move {
                let intent = self.prepare(request, request.recipient).await?;
                tracing::debug!(attempt, nonce = %intent.nonce, invoice = %request.invoice_id.short(), "Dispatch attempt");
                self.dispatcher.dispatch(self.identity, intent)
            })
            .await
    }

    /// Dispatch to a named payee. The name is resolved on every attempt,
    /// before the fee is quoted for the resolved address; `request.recipient`
    /// is ignored.
    ///
    /// # Errors
    /// `NameNotFound` without consuming a nonce, otherwise as [`PaymentAgent::pay`].
    pub async fn pay_by_name(&self, name: &str, request: &PaymentRequest) -> Result<DispatchReceipt> {
        self.retry
            .run_if("dispatch_by_name", retry_dispatch, |_| async move {
                let recipient = self.dispatcher.resolve_name(name)?;
                tracing::debug!(name, recipient = %recipient, "Payee resolved");
                let intent = self.prepare(request, recipient).await?;
                self.dispatcher.dispatch(self.identity, intent)
            })
            .await
    }

    /// Dispatch all requests concurrently. Results come back in request order.
    pub async fn pay_all(&self, requests: Vec<PaymentRequest>) -> Vec<Result<DispatchReceipt>> {
        let mut tasks = JoinSet::new();
        for (i, request) in requests.into_iter().enumerate() {
            let agent = self.clone();
            tasks.spawn(async move { (i, agent.pay(&request).await) });
        }

        let mut results: Vec<(usize, Result<DispatchReceipt>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => results.push(done),
                Err(e) => tracing::error!(error = %e, "Payment task aborted"),
            }
        }
        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, r)| r).collect()
    }

    async fn prepare(&self, request: &PaymentRequest, recipient: Address) -> Result<PaymentIntent> {
        let route = self
            .dispatcher
            .route(request.destination)
            .ok_or(TreasuryError::UnknownRoute(request.destination))?;
        let attestation = match &route.price_gate {
            Some(gate) => Some(self.oracle.fetch(gate.feed_id).await?),
            None => None,
        };
        let attached_fee = self
            .dispatcher
            .quote_fee(request.destination, recipient, request.amount)?;

        Ok(PaymentIntent {
            destination: request.destination,
            recipient,
            amount: request.amount,
            invoice_id: request.invoice_id,
            intent: request.intent.clone(),
            nonce: generate_nonce(),
            attestation,
            attached_fee,
        })
    }
}

/// Transient for the agent: the usual retryable errors, plus a nonce
/// collision, which a fresh nonce resolves.
fn retry_dispatch(e: &TreasuryError) -> bool {
    e.is_retryable() || matches!(e, TreasuryError::NonceReused { .. })
}
