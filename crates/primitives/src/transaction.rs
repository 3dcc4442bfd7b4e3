//! Authenticated transactions consumed by the dispatcher.
//!
//! Signature and authentication checks happen before a transaction reaches the
//! core; here a transaction is a plain value routed by its `kind`.

use crate::{Address, Amount, Bps, PositionId, TokenSymbol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction kinds understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Transfer,
    Mint,
    Burn,
    Stake,
    Unstake,
    ClaimRewards,
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    /// Admin: move `amount` from the sender into the staking reward reserve.
    FundRewards,
    PauseStaking,
    ResumeStaking,
    /// Admin: set the staking APY to `payload.rate_bps`.
    UpdateRewardRate,
    PauseToken,
    UnpauseToken,
    PausePools,
    ResumePools,
    /// Any kind this node does not recognise. Skipped by the dispatcher.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxKind::Transfer => "TRANSFER",
            TxKind::Mint => "MINT",
            TxKind::Burn => "BURN",
            TxKind::Stake => "STAKE",
            TxKind::Unstake => "UNSTAKE",
            TxKind::ClaimRewards => "CLAIM_REWARDS",
            TxKind::Swap => "SWAP",
            TxKind::AddLiquidity => "ADD_LIQUIDITY",
            TxKind::RemoveLiquidity => "REMOVE_LIQUIDITY",
            TxKind::FundRewards => "FUND_REWARDS",
            TxKind::PauseStaking => "PAUSE_STAKING",
            TxKind::ResumeStaking => "RESUME_STAKING",
            TxKind::UpdateRewardRate => "UPDATE_REWARD_RATE",
            TxKind::PauseToken => "PAUSE_TOKEN",
            TxKind::UnpauseToken => "UNPAUSE_TOKEN",
            TxKind::PausePools => "PAUSE_POOLS",
            TxKind::ResumePools => "RESUME_POOLS",
            TxKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Kind-specific fields. Which ones are required depends on the kind:
///
/// | kind               | fields                                                   |
/// |--------------------|----------------------------------------------------------|
/// | TRANSFER/MINT/BURN | `token` (defaults to the native token)                   |
/// | SWAP               | `from_token`, `to_token`, `min_amount_out`, optional `max_slippage_bps` |
/// | ADD_LIQUIDITY      | `from_token`, `to_token`, `amount_b`                     |
/// | REMOVE_LIQUIDITY   | `from_token`, `to_token` (`amount` carries the shares)   |
/// | UNSTAKE/CLAIM      | `position_id`                                            |
/// | UPDATE_REWARD_RATE | `rate_bps`                                               |
/// | PAUSE/UNPAUSE_TOKEN| `token` (defaults to the native token)                   |
///
/// Admin kinds (`FUND_REWARDS`, staking, token and pool controls) are only
/// accepted from the owner of the token they govern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxPayload {
    pub token: Option<TokenSymbol>,
    pub from_token: Option<TokenSymbol>,
    pub to_token: Option<TokenSymbol>,
    pub amount_b: Option<Amount>,
    pub min_amount_out: Option<Amount>,
    pub max_slippage_bps: Option<Bps>,
    pub position_id: Option<PositionId>,
    pub rate_bps: Option<Bps>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TxKind,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    #[serde(default)]
    pub payload: TxPayload,
    pub nonce: u64,
}

impl Transaction {
    pub fn new(kind: TxKind, from: impl Into<Address>, to: impl Into<Address>, amount: Amount, nonce: u64) -> Self {
        Self {
            kind,
            from: from.into(),
            to: to.into(),
            amount,
            payload: TxPayload::default(),
            nonce,
        }
    }

    pub fn with_payload(mut self, payload: TxPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Deterministic content hash (hex-encoded BLAKE3).
    pub fn hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"DUJYO_TX_V1");
        hasher.update(self.kind.to_string().as_bytes());
        hash_str(&mut hasher, self.from.as_str());
        hash_str(&mut hasher, self.to.as_str());
        hasher.update(&self.amount.to_le_bytes());
        hasher.update(&self.nonce.to_le_bytes());

        let p = &self.payload;
        for symbol in [&p.token, &p.from_token, &p.to_token] {
            hash_str(&mut hasher, symbol.as_ref().map(|s| s.as_str()).unwrap_or(""));
        }
        hasher.update(&p.amount_b.unwrap_or_default().to_le_bytes());
        hasher.update(&p.min_amount_out.unwrap_or_default().to_le_bytes());
        hasher.update(&p.max_slippage_bps.unwrap_or_default().to_le_bytes());
        hasher.update(&p.position_id.unwrap_or_default().to_le_bytes());
        hasher.update(&p.rate_bps.unwrap_or_default().to_le_bytes());

        hex::encode(hasher.finalize().as_bytes())
    }
}

fn hash_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_deserializes() {
        let json = r#"{"kind":"NFT_MINT","from":"alice","to":"bob","amount":1,"nonce":0}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.kind, TxKind::Unknown);
        assert_eq!(tx.payload, TxPayload::default());
    }

    #[test]
    fn test_kind_wire_names() {
        let json = r#"{"kind":"REMOVE_LIQUIDITY","from":"a","to":"a","amount":5,"nonce":3,
            "payload":{"from_token":"dyo","to_token":"DYS"}}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.kind, TxKind::RemoveLiquidity);
        assert_eq!(tx.payload.from_token, Some(TokenSymbol::new("DYO")));
    }

    #[test]
    fn test_admin_kind_wire_names() {
        let json = r#"{"kind":"UPDATE_REWARD_RATE","from":"treasury","to":"","amount":0,"nonce":0,
            "payload":{"rate_bps":800}}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.kind, TxKind::UpdateRewardRate);
        assert_eq!(tx.payload.rate_bps, Some(800));
        assert_eq!(TxKind::FundRewards.to_string(), "FUND_REWARDS");
    }

    #[test]
    fn test_hash_is_deterministic_and_sensitive() {
        let tx = Transaction::new(TxKind::Transfer, "alice", "bob", 10, 0);
        assert_eq!(tx.hash(), tx.clone().hash());
        assert_eq!(tx.hash().len(), 64);

        let mut other = tx.clone();
        other.nonce = 1;
        assert_ne!(tx.hash(), other.hash());
    }
}
