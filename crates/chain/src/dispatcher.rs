//! Transaction dispatcher: routes authenticated transactions to the ledger,
//! AMM and staking engines and maintains per-sender nonces.
//!
//! Transactions are applied one at a time; the nonce table lock is held for the
//! whole application so a sender's nonce check and increment cannot interleave.
//! A fatal error latches the dispatcher into a halted state.

use dujyo_amm::{LiquidityReceipt, PoolEngine, SwapResult};
use dujyo_ledger::LedgerRegistry;
use dujyo_primitives::{
    Address, Amount, Bps, ChainError, PositionId, Result, TokenSymbol, Transaction, TxKind,
};
use dujyo_staking::{StakingEngine, UnstakeReceipt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Engine-level result of a successfully applied transaction.
///
/// Externally tagged: amounts are full `u128`s and must not go through serde's
/// buffered representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    Transferred { token: TokenSymbol, amount: Amount },
    Minted { token: TokenSymbol, to: Address, amount: Amount },
    Burned { token: TokenSymbol, amount: Amount },
    Staked { position_id: PositionId, amount: Amount },
    Unstaked(UnstakeReceipt),
    RewardsClaimed { position_id: PositionId, amount: Amount },
    Swapped(SwapResult),
    LiquidityAdded(LiquidityReceipt),
    LiquidityRemoved(LiquidityReceipt),
    RewardsFunded { token: TokenSymbol, amount: Amount },
    RewardRateUpdated { apy_bps: Bps },
    /// A pause or resume control took effect.
    ControlApplied { kind: TxKind, target: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub kind: TxKind,
    pub from: Address,
    pub nonce: u64,
    pub outcome: TxOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFailure {
    pub index: usize,
    pub tx_hash: String,
    pub error: ChainError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: Vec<TxReceipt>,
    pub failed: Vec<TxFailure>,
    /// Set when the batch stopped on a fatal error; later transactions were not attempted.
    pub halted: bool,
}

pub struct Dispatcher {
    ledgers: Arc<LedgerRegistry>,
    amm: Arc<PoolEngine>,
    staking: Arc<StakingEngine>,
    default_token: TokenSymbol,
    nonces: Mutex<HashMap<Address, u64>>,
    halted: RwLock<Option<String>>,
}

impl Dispatcher {
    pub fn new(
        ledgers: Arc<LedgerRegistry>,
        amm: Arc<PoolEngine>,
        staking: Arc<StakingEngine>,
        default_token: TokenSymbol,
    ) -> Self {
        Self {
            ledgers,
            amm,
            staking,
            default_token,
            nonces: Mutex::new(HashMap::new()),
            halted: RwLock::new(None),
        }
    }

    /// Next nonce `address` must use.
    pub fn next_nonce(&self, address: &Address) -> u64 {
        self.nonces.lock().get(address).copied().unwrap_or(0)
    }

    pub fn nonces(&self) -> BTreeMap<Address, u64> {
        self.nonces
            .lock()
            .iter()
            .map(|(address, nonce)| (address.clone(), *nonce))
            .collect()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.read().is_some()
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.halted.read().clone()
    }

    /// Latch the halted state. Every later `apply` fails with `Halted`.
    pub fn halt(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(target: "dispatcher", reason = %reason, "Dispatcher halted");
        let mut halted = self.halted.write();
        if halted.is_none() {
            *halted = Some(reason);
        }
    }

    pub fn apply(&self, tx: &Transaction) -> Result<TxReceipt> {
        if self.is_halted() {
            return Err(ChainError::Halted);
        }
        let mut nonces = self.nonces.lock();
        let tx_hash = tx.hash();

        let result = self.check_sender(tx, &nonces).and_then(|()| self.route(tx));
        match result {
            Ok(outcome) => {
                nonces.insert(tx.from.clone(), tx.nonce.saturating_add(1));
                debug!(
                    target: "dispatcher",
                    tx = %tx_hash,
                    kind = %tx.kind,
                    from = %tx.from,
                    nonce = tx.nonce,
                    "Transaction applied"
                );
                Ok(TxReceipt {
                    tx_hash,
                    kind: tx.kind,
                    from: tx.from.clone(),
                    nonce: tx.nonce,
                    outcome,
                })
            }
            Err(err) if err.is_fatal() => {
                drop(nonces);
                self.halt(format!("transaction {tx_hash}: {err}"));
                Err(err)
            }
            Err(err) => {
                warn!(
                    target: "dispatcher",
                    tx = %tx_hash,
                    kind = %tx.kind,
                    from = %tx.from,
                    error = %err,
                    error_kind = err.kind(),
                    "Transaction rejected"
                );
                Err(err)
            }
        }
    }

    /// Apply in order, continuing past recoverable failures and stopping at a fatal one.
    pub fn apply_batch<'a, I>(&self, txs: I) -> BatchOutcome
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut outcome = BatchOutcome::default();
        for (index, tx) in txs.into_iter().enumerate() {
            match self.apply(tx) {
                Ok(receipt) => outcome.applied.push(receipt),
                Err(error) => {
                    let fatal = error.is_fatal();
                    outcome.failed.push(TxFailure {
                        index,
                        tx_hash: tx.hash(),
                        error,
                    });
                    if fatal {
                        outcome.halted = true;
                        break;
                    }
                }
            }
        }
        outcome
    }

    fn check_sender(&self, tx: &Transaction, nonces: &HashMap<Address, u64>) -> Result<()> {
        if tx.from.is_empty() {
            return Err(ChainError::MissingField("from"));
        }
        if tx.from.is_system() {
            return Err(ChainError::Unauthorized { caller: tx.from.clone() });
        }
        let expected = nonces.get(&tx.from).copied().unwrap_or(0);
        if tx.nonce != expected {
            return Err(ChainError::InvalidNonce {
                address: tx.from.clone(),
                expected,
                got: tx.nonce,
            });
        }
        Ok(())
    }

    fn route(&self, tx: &Transaction) -> Result<TxOutcome> {
        let p = &tx.payload;
        match tx.kind {
            TxKind::Transfer => {
                let token = self.token_or_default(tx);
                if tx.to.is_empty() {
                    return Err(ChainError::MissingField("to"));
                }
                if tx.to.is_system() {
                    return Err(ChainError::InvalidParameter("transfer into a protocol account"));
                }
                self.ledgers.ledger(&token)?.transfer(&tx.from, &tx.to, tx.amount)?;
                Ok(TxOutcome::Transferred {
                    token,
                    amount: tx.amount,
                })
            }
            TxKind::Mint => {
                let token = self.token_or_default(tx);
                let ledger = self.ledgers.ledger(&token)?;
                self.ensure_owner(&token, &tx.from)?;
                let to = if tx.to.is_empty() { tx.from.clone() } else { tx.to.clone() };
                if to.is_system() {
                    return Err(ChainError::InvalidParameter("mint into a protocol account"));
                }
                ledger.mint(&to, tx.amount)?;
                Ok(TxOutcome::Minted {
                    token,
                    to,
                    amount: tx.amount,
                })
            }
            TxKind::Burn => {
                let token = self.token_or_default(tx);
                self.ledgers.ledger(&token)?.burn(&tx.from, tx.amount)?;
                Ok(TxOutcome::Burned {
                    token,
                    amount: tx.amount,
                })
            }
            TxKind::Stake => {
                let position = self.staking.stake(&tx.from, tx.amount)?;
                Ok(TxOutcome::Staked {
                    position_id: position.id,
                    amount: position.principal,
                })
            }
            TxKind::Unstake => {
                let id = p.position_id.ok_or(ChainError::MissingField("position_id"))?;
                Ok(TxOutcome::Unstaked(self.staking.unstake(&tx.from, id)?))
            }
            TxKind::ClaimRewards => {
                let id = p.position_id.ok_or(ChainError::MissingField("position_id"))?;
                let amount = self.staking.claim_rewards(&tx.from, id)?;
                Ok(TxOutcome::RewardsClaimed {
                    position_id: id,
                    amount,
                })
            }
            TxKind::Swap => {
                let (from_token, to_token) = pair(tx)?;
                let min_amount_out = p.min_amount_out.ok_or(ChainError::MissingField("min_amount_out"))?;
                let result = self.amm.swap(
                    &tx.from,
                    &from_token,
                    &to_token,
                    tx.amount,
                    min_amount_out,
                    p.max_slippage_bps,
                )?;
                Ok(TxOutcome::Swapped(result))
            }
            TxKind::AddLiquidity => {
                let (token_a, token_b) = pair(tx)?;
                let amount_b = p.amount_b.ok_or(ChainError::MissingField("amount_b"))?;
                let receipt = self
                    .amm
                    .add_liquidity(&tx.from, &token_a, &token_b, tx.amount, amount_b)?;
                Ok(TxOutcome::LiquidityAdded(receipt))
            }
            TxKind::RemoveLiquidity => {
                let (token_a, token_b) = pair(tx)?;
                let receipt = self
                    .amm
                    .remove_liquidity(&tx.from, &token_a, &token_b, tx.amount)?;
                Ok(TxOutcome::LiquidityRemoved(receipt))
            }
            TxKind::FundRewards => {
                let token = self.staking.config().token.clone();
                self.ensure_owner(&token, &tx.from)?;
                self.staking.add_rewards(&tx.from, tx.amount)?;
                Ok(TxOutcome::RewardsFunded {
                    token,
                    amount: tx.amount,
                })
            }
            TxKind::PauseStaking | TxKind::ResumeStaking => {
                let token = self.staking.config().token.clone();
                self.ensure_owner(&token, &tx.from)?;
                if tx.kind == TxKind::PauseStaking {
                    self.staking.pause_staking();
                } else {
                    self.staking.resume_staking();
                }
                Ok(self.control_applied(tx, "staking"))
            }
            TxKind::UpdateRewardRate => {
                self.ensure_owner(&self.staking.config().token, &tx.from)?;
                let apy_bps = p.rate_bps.ok_or(ChainError::MissingField("rate_bps"))?;
                self.staking.update_reward_rate(apy_bps)?;
                Ok(TxOutcome::RewardRateUpdated { apy_bps })
            }
            TxKind::PauseToken | TxKind::UnpauseToken => {
                let token = self.token_or_default(tx);
                self.ensure_owner(&token, &tx.from)?;
                let ledger = self.ledgers.ledger(&token)?;
                if tx.kind == TxKind::PauseToken {
                    ledger.pause();
                } else {
                    ledger.unpause();
                }
                Ok(self.control_applied(tx, token.as_str()))
            }
            TxKind::PausePools | TxKind::ResumePools => {
                self.ensure_owner(&self.default_token, &tx.from)?;
                if tx.kind == TxKind::PausePools {
                    self.amm.pause(format!("paused by {}", tx.from));
                } else {
                    self.amm.resume();
                }
                Ok(self.control_applied(tx, "pools"))
            }
            TxKind::Unknown => Err(ChainError::UnknownTransactionKind(tx.kind.to_string())),
        }
    }

    /// Admin kinds are reserved to the owner of the token they govern.
    fn ensure_owner(&self, token: &TokenSymbol, caller: &Address) -> Result<()> {
        let ledger = self.ledgers.ledger(token)?;
        if ledger.read().config().owner != *caller {
            return Err(ChainError::Unauthorized { caller: caller.clone() });
        }
        Ok(())
    }

    fn control_applied(&self, tx: &Transaction, scope: &str) -> TxOutcome {
        info!(target: "dispatcher", kind = %tx.kind, by = %tx.from, scope, "Control applied");
        TxOutcome::ControlApplied {
            kind: tx.kind,
            target: scope.to_string(),
        }
    }

    fn token_or_default(&self, tx: &Transaction) -> TokenSymbol {
        tx.payload
            .token
            .clone()
            .unwrap_or_else(|| self.default_token.clone())
    }
}

fn pair(tx: &Transaction) -> Result<(TokenSymbol, TokenSymbol)> {
    let from = tx.payload.from_token.clone().ok_or(ChainError::MissingField("from_token"))?;
    let to = tx.payload.to_token.clone().ok_or(ChainError::MissingField("to_token"))?;
    Ok((from, to))
}
