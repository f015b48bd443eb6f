//! Double-entry account ledger.
//!
//! Every change to balances is a [`Batch`] of postings whose debits equal
//! its credits per token. A batch commits entirely or not at all; a failed
//! batch leaves no trace. Committed batches are never edited; mistakes are
//! undone by a compensating batch with every side reversed.
//!
//! External deposits and withdrawals are the only operations that change
//! total supply, and they are mirrored into [`SupplyConservation`] so the
//! invariant can be checked at any time.
//!
//! All mutations take a single lock on the book, which is what makes
//! "check funds, then apply" atomic across concurrent dispatches.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::Mutex;
use treasury_types::{
    Address, Amount, BalanceEntry, Batch, BatchId, BatchMeta, LedgerConfig, LedgerId, Posting,
    PostingSide, Result, SupplyConservation, Token, TreasuryError, check_balanced, checked_add,
};

/// Owner and dispatcher roles of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub owner: Address,
    pub authorized_dispatcher: Address,
}

#[derive(Debug)]
struct Book {
    balances: HashMap<(Address, Token), Amount>,
    batches: Vec<Batch>,
    index: HashMap<BatchId, usize>,
    compensated: HashSet<BatchId>,
    supply: SupplyConservation,
    authorization: Authorization,
}

impl Book {
    fn balance(&self, account: Address, token: &str) -> Amount {
        self.balances
            .get(&(account, token.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Compute post-batch balances of every touched (account, token),
    /// applying postings in order. Nothing is written.
    fn stage(&self, postings: &[Posting]) -> Result<HashMap<(Address, Token), Amount>> {
        let mut staged: HashMap<(Address, Token), Amount> = HashMap::new();
        for posting in postings {
            let key = (posting.account, posting.token.clone());
            let current = match staged.get(&key) {
                Some(amount) => *amount,
                None => self.balance(posting.account, &posting.token),
            };
            let next = match posting.side {
                PostingSide::Credit => checked_add(current, posting.amount)?,
                PostingSide::Debit => current.checked_sub(posting.amount).ok_or_else(|| {
                    TreasuryError::InsufficientFunds {
                        account: posting.account,
                        token: posting.token.clone(),
                        needed: posting.amount,
                        available: current,
                    }
                })?,
            };
            staged.insert(key, next);
        }
        Ok(staged)
    }

    fn commit(
        &mut self,
        staged: HashMap<(Address, Token), Amount>,
        postings: Vec<Posting>,
        meta: BatchMeta,
        compensates: Option<BatchId>,
    ) -> BatchId {
        self.balances.extend(staged);
        let id = BatchId::new();
        let sequence = self.batches.len() as u64;
        self.index.insert(id, self.batches.len());
        self.batches.push(Batch {
            id,
            sequence,
            postings,
            meta,
            compensates,
            committed_at: Utc::now(),
        });
        id
    }

    fn total_supply(&self, token: &str) -> Result<Amount> {
        self.balances
            .iter()
            .filter(|((_, t), _)| t == token)
            .try_fold(0, |acc, (_, amount)| checked_add(acc, *amount))
    }
}

/// The source-side ledger.
#[derive(Debug)]
pub struct AccountLedger {
    ledger_id: LedgerId,
    book: Mutex<Book>,
}

impl AccountLedger {
    #[must_use]
    pub fn new(ledger_id: LedgerId, authorization: Authorization) -> Self {
        Self {
            ledger_id,
            book: Mutex::new(Book {
                balances: HashMap::new(),
                batches: Vec::new(),
                index: HashMap::new(),
                compensated: HashSet::new(),
                supply: SupplyConservation::new(),
                authorization,
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(
            config.ledger_id,
            Authorization {
                owner: config.owner,
                authorized_dispatcher: config.authorized_dispatcher,
            },
        )
    }

    #[must_use]
    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    // ---- Authorization ----

    #[must_use]
    pub fn authorization(&self) -> Authorization {
        self.book.lock().authorization
    }

    /// Replace the authorized dispatcher. Owner only.
    ///
    /// # Errors
    /// Returns `NotOwner` if `caller` is not the owner.
    pub fn set_authorized_dispatcher(&self, caller: Address, dispatcher: Address) -> Result<()> {
        let mut book = self.book.lock();
        if caller != book.authorization.owner {
            return Err(TreasuryError::NotOwner { caller });
        }
        let previous = book.authorization.authorized_dispatcher;
        book.authorization.authorized_dispatcher = dispatcher;
        tracing::info!(previous = %previous, dispatcher = %dispatcher, "Authorized dispatcher changed");
        Ok(())
    }

    /// # Errors
    /// Returns `UnauthorizedDispatcher` unless `caller` is the current
    /// authorized dispatcher.
    pub fn ensure_dispatcher(&self, caller: Address) -> Result<()> {
        if self.book.lock().authorization.authorized_dispatcher == caller {
            Ok(())
        } else {
            Err(TreasuryError::UnauthorizedDispatcher { caller })
        }
    }

    // ---- Batches ----

    /// Validate and commit a batch atomically.
    ///
    /// # Errors
    /// - `InvalidAmount` for an empty batch, a zero posting or overflow
    /// - `UnbalancedBatch` if debits ≠ credits for some token
    /// - `InsufficientFunds` if a debit would overdraw an account
    pub fn post_batch(&self, postings: Vec<Posting>, meta: BatchMeta) -> Result<BatchId> {
        self.post_batch_guarded(postings, meta, || Ok(()))
    }

    /// Like [`AccountLedger::post_batch`], but `guard` runs after the batch
    /// has been validated against current balances and before it is applied,
    /// under the same lock. If the guard fails, nothing is committed.
    ///
    /// # Errors
    /// As [`AccountLedger::post_batch`], plus whatever `guard` returns.
    pub fn post_batch_guarded<F>(&self, postings: Vec<Posting>, meta: BatchMeta, guard: F) -> Result<BatchId>
    where
        F: FnOnce() -> Result<()>,
    {
        check_balanced(&postings)?;

        let mut book = self.book.lock();
        let staged = book.stage(&postings)?;
        guard()?;

        let count = postings.len();
        let intent = meta.intent.clone();
        let id = book.commit(staged, postings, meta, None);
        tracing::info!(
            ledger = %self.ledger_id,
            batch = %id,
            postings = count,
            intent = %intent,
            "Batch committed"
        );
        Ok(id)
    }

    /// Commit the exact reversal of a committed batch.
    ///
    /// # Errors
    /// - `UnknownBatch` if no batch has this id
    /// - `AlreadyCompensated` if it was compensated before
    /// - `InsufficientFunds` if reversing would overdraw an account
    pub fn compensate(&self, batch_id: BatchId, meta: BatchMeta) -> Result<BatchId> {
        let mut book = self.book.lock();
        let position = *book
            .index
            .get(&batch_id)
            .ok_or(TreasuryError::UnknownBatch(batch_id))?;
        if book.compensated.contains(&batch_id) {
            return Err(TreasuryError::AlreadyCompensated(batch_id));
        }

        let original = &book.batches[position];
        let reversed: Vec<Posting> = original.postings.iter().map(Posting::reversed).collect();
        let meta = match (meta.invoice_id, original.meta.invoice_id) {
            (None, Some(invoice)) => meta.with_invoice(invoice),
            _ => meta,
        };

        let staged = book.stage(&reversed)?;
        let id = book.commit(staged, reversed, meta, Some(batch_id));
        book.compensated.insert(batch_id);
        tracing::warn!(ledger = %self.ledger_id, batch = %batch_id, compensation = %id, "Batch compensated");
        Ok(id)
    }

    #[must_use]
    pub fn batch(&self, batch_id: BatchId) -> Option<Batch> {
        let book = self.book.lock();
        book.index.get(&batch_id).map(|&i| book.batches[i].clone())
    }

    /// All committed batches in commit order.
    #[must_use]
    pub fn batches(&self) -> Vec<Batch> {
        self.book.lock().batches.clone()
    }

    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.book.lock().batches.len()
    }

    #[must_use]
    pub fn is_compensated(&self, batch_id: BatchId) -> bool {
        self.book.lock().compensated.contains(&batch_id)
    }

    // ---- Balances ----

    /// Current balance; zero for accounts never touched.
    #[must_use]
    pub fn get_balance(&self, account: Address, token: &str) -> Amount {
        self.book.lock().balance(account, token)
    }

    /// Non-zero balances, sorted by account then token.
    #[must_use]
    pub fn balances(&self) -> Vec<BalanceEntry> {
        let book = self.book.lock();
        let mut entries: Vec<BalanceEntry> = book
            .balances
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|((account, token), amount)| BalanceEntry {
                account: *account,
                token: token.clone(),
                amount: *amount,
            })
            .collect();
        entries.sort_by(|a, b| (a.account, &a.token).cmp(&(b.account, &b.token)));
        entries
    }

    /// External inflow. Increases supply.
    ///
    /// # Errors
    /// `InvalidAmount` for zero or overflow.
    pub fn deposit(&self, account: Address, token: &str, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(TreasuryError::InvalidAmount {
                reason: "deposit amount must be positive".to_string(),
            });
        }
        let mut book = self.book.lock();
        let next = checked_add(book.balance(account, token), amount)?;
        book.supply.record_deposit(token, amount)?;
        book.balances.insert((account, token.to_string()), next);
        tracing::info!(account = %account, token, amount, "Deposit");
        Ok(())
    }

    /// External outflow. Decreases supply.
    ///
    /// # Errors
    /// `InvalidAmount` for zero, `InsufficientFunds` if the account is short.
    pub fn withdraw(&self, account: Address, token: &str, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(TreasuryError::InvalidAmount {
                reason: "withdrawal amount must be positive".to_string(),
            });
        }
        let mut book = self.book.lock();
        let available = book.balance(account, token);
        let next = available
            .checked_sub(amount)
            .ok_or_else(|| TreasuryError::InsufficientFunds {
                account,
                token: token.to_string(),
                needed: amount,
                available,
            })?;
        book.supply.record_withdrawal(token, amount)?;
        book.balances.insert((account, token.to_string()), next);
        tracing::info!(account = %account, token, amount, "Withdrawal");
        Ok(())
    }

    /// Sum of all balances of a token.
    ///
    /// # Errors
    /// `InvalidAmount` on overflow.
    pub fn total_supply(&self, token: &str) -> Result<Amount> {
        self.book.lock().total_supply(token)
    }

    /// Check Σ balances == deposits − withdrawals for every token seen.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` naming the first broken token.
    pub fn verify_supply(&self) -> Result<()> {
        let book = self.book.lock();
        for token in book.supply.tracked_tokens() {
            let actual = book.total_supply(&token)?;
            if let Err(e) = book.supply.verify(&token, actual) {
                tracing::error!(ledger = %self.ledger_id, error = %e, "Supply invariant broken");
                return Err(e);
            }
        }
        Ok(())
    }
}
