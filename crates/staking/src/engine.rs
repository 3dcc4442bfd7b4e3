//! Staking engine. Lock order: engine state, then the staking token's ledger.

use crate::config::StakingConfig;
use crate::position::StakingPosition;
use dujyo_ledger::{LedgerRegistry, LedgerState, TokenLedger};
use dujyo_primitives::math::{self, BPS_DENOM};
use dujyo_primitives::{Address, Amount, Bps, ChainError, Clock, PositionId, Result, TokenSymbol};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeReceipt {
    pub position_id: PositionId,
    pub principal: Amount,
    pub fee: Amount,
    /// Reward paid now.
    pub reward: Amount,
    /// Reward the reserve could not cover; claimable once it is refunded.
    pub owed: Amount,
    /// `principal - fee + reward`, credited to the owner.
    pub payout: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingStats {
    pub token: TokenSymbol,
    pub total_staked: Amount,
    pub active_positions: usize,
    pub total_positions: usize,
    pub reward_reserve: Amount,
    pub total_rewards_paid: Amount,
    pub total_rewards_funded: Amount,
    pub total_rewards_owed: Amount,
    pub total_fees_collected: Amount,
    pub apy_bps: Bps,
    pub paused: bool,
}

#[derive(Debug)]
struct StakingState {
    positions: BTreeMap<PositionId, StakingPosition>,
    next_id: PositionId,
    apy_bps: Bps,
    paused: bool,
    total_staked: Amount,
    total_rewards_paid: Amount,
    total_rewards_funded: Amount,
    total_rewards_owed: Amount,
    total_fees_collected: Amount,
}

pub struct StakingEngine {
    config: StakingConfig,
    ledger: Arc<TokenLedger>,
    clock: Arc<dyn Clock>,
    custody: Address,
    reserve: Address,
    state: RwLock<StakingState>,
}

impl StakingEngine {
    pub fn new(config: StakingConfig, ledgers: &LedgerRegistry, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.apy_bps > BPS_DENOM || config.unstake_fee_bps > BPS_DENOM {
            return Err(ChainError::InvalidParameter("staking rate above 100%"));
        }
        if config.max_stake.is_some_and(|max| max < config.min_stake) {
            return Err(ChainError::InvalidParameter("max_stake below min_stake"));
        }
        let ledger = ledgers.ledger(&config.token)?;
        let state = StakingState {
            positions: BTreeMap::new(),
            next_id: 1,
            apy_bps: config.apy_bps,
            paused: false,
            total_staked: 0,
            total_rewards_paid: 0,
            total_rewards_funded: 0,
            total_rewards_owed: 0,
            total_fees_collected: 0,
        };
        Ok(Self {
            config,
            ledger,
            clock,
            custody: Address::staking_custody(),
            reserve: Address::staking_rewards(),
            state: RwLock::new(state),
        })
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Lock `amount` in custody and open a position.
    pub fn stake(&self, owner: &Address, amount: Amount) -> Result<StakingPosition> {
        let mut state = self.state.write();
        if state.paused {
            return Err(ChainError::StakingPaused);
        }
        if amount == 0 {
            return Err(ChainError::InvalidAmount);
        }
        let max = self.config.max_stake.unwrap_or(Amount::MAX);
        if amount < self.config.min_stake || amount > max {
            return Err(ChainError::StakeOutOfRange {
                amount,
                min: self.config.min_stake,
                max,
            });
        }
        let total_staked = math::checked_add(state.total_staked, amount, "total staked")?;

        self.ledger.write().transfer(owner, &self.custody, amount)?;

        let now = self.clock.now_secs();
        let id = state.next_id;
        let position = StakingPosition {
            id,
            owner: owner.clone(),
            principal: amount,
            start_time: now,
            end_time: now.saturating_add(self.config.lock_period_secs),
            last_accrual_at: now,
            accrued_rewards: 0,
            owed_rewards: 0,
            active: true,
        };
        state.next_id += 1;
        state.total_staked = total_staked;
        state.positions.insert(id, position.clone());

        info!(
            target: "staking",
            position = id,
            owner = %owner,
            amount,
            unlock_at = position.end_time,
            "Stake opened"
        );
        Ok(position)
    }

    /// Close an unlocked position: principal minus fee plus accrued reward.
    ///
    /// Principal is always released. When the reserve (topped up by this
    /// unstake's fee) cannot cover the reward, the remainder stays owed on the
    /// position and is paid by a later `claim_rewards`.
    pub fn unstake(&self, caller: &Address, id: PositionId) -> Result<UnstakeReceipt> {
        let now = self.clock.now_secs();
        let mut state = self.state.write();
        let apy_bps = state.apy_bps;
        let position = owned_active(&mut state.positions, caller, id)?;
        if position.is_locked(now) {
            return Err(ChainError::PositionLocked {
                id,
                unlock_at: position.end_time,
            });
        }

        let principal = position.principal;
        let reward = position.pending_reward(apy_bps, now)?;
        let fee = math::bps_of(principal, self.config.unstake_fee_bps)?;
        let returned = principal - fee;

        let mut ledger = self.ledger.write();
        let custody_held = ledger.balance_of(&self.custody);
        if custody_held < principal {
            return Err(ChainError::InvariantViolation(format!(
                "staking custody holds {custody_held}, position {id} needs {principal}"
            )));
        }
        if returned > 0 {
            ledger.check_transfer(&self.custody, caller, returned)?;
        }
        if fee > 0 {
            ledger.check_transfer(&self.custody, &self.reserve, fee)?;
        }
        // The fee reaches the reserve before the reward is drawn from it.
        let available = ledger.balance_of(&self.reserve).saturating_add(fee);
        let paid = reward.min(available);
        let owed = reward - paid;

        if returned > 0 {
            ledger.commit_transfer(&self.custody, caller, returned)?;
        }
        if fee > 0 {
            ledger.commit_transfer(&self.custody, &self.reserve, fee)?;
        }
        if paid > 0 {
            ledger.commit_transfer(&self.reserve, caller, paid)?;
        }
        drop(ledger);

        position.active = false;
        position.last_accrual_at = now;
        position.accrued_rewards = position.accrued_rewards.saturating_add(paid);
        position.owed_rewards = position.owed_rewards.saturating_add(owed);

        state.total_staked = state.total_staked.checked_sub(principal).ok_or_else(|| {
            ChainError::InvariantViolation(format!("total staked underflow closing position {id}"))
        })?;
        state.total_rewards_paid = state.total_rewards_paid.saturating_add(paid);
        state.total_rewards_owed = state.total_rewards_owed.saturating_add(owed);
        state.total_fees_collected = state.total_fees_collected.saturating_add(fee);

        let payout = returned.saturating_add(paid);
        if owed > 0 {
            warn!(
                target: "staking",
                position = id,
                owner = %caller,
                paid,
                owed,
                "Reward reserve short at unstake; remainder left owed"
            );
        }
        info!(
            target: "staking",
            position = id,
            owner = %caller,
            principal,
            fee,
            reward = paid,
            payout,
            "Stake closed"
        );
        Ok(UnstakeReceipt {
            position_id: id,
            principal,
            fee,
            reward: paid,
            owed,
            payout,
        })
    }

    /// Pay out rewards accrued since the last claim; the position stays open.
    /// On a closed position, pays the reward left owed at unstake.
    pub fn claim_rewards(&self, caller: &Address, id: PositionId) -> Result<Amount> {
        let now = self.clock.now_secs();
        let mut state = self.state.write();
        let apy_bps = state.apy_bps;
        let position = owned(&mut state.positions, caller, id)?;

        let active = position.active;
        let reward = match (active, position.owed_rewards) {
            (true, _) => position.pending_reward(apy_bps, now)?,
            (false, 0) => return Err(ChainError::PositionInactive(id)),
            (false, owed) => owed,
        };
        if reward == 0 {
            debug!(target: "staking", position = id, "Nothing to claim");
            return Ok(0);
        }
        {
            let mut ledger = self.ledger.write();
            self.ensure_reserve(&ledger, reward)?;
            ledger.transfer(&self.reserve, caller, reward)?;
        }

        if active {
            position.last_accrual_at = now;
        } else {
            position.owed_rewards = 0;
        }
        position.accrued_rewards = position.accrued_rewards.saturating_add(reward);
        state.total_rewards_paid = state.total_rewards_paid.saturating_add(reward);
        if !active {
            state.total_rewards_owed = state.total_rewards_owed.saturating_sub(reward);
        }

        info!(target: "staking", position = id, owner = %caller, reward, "Rewards claimed");
        Ok(reward)
    }

    /// Block new stakes. Claims and unstakes keep working so funds never get stuck.
    pub fn pause_staking(&self) {
        self.state.write().paused = true;
        warn!(target: "staking", "Staking paused");
    }

    pub fn resume_staking(&self) {
        self.state.write().paused = false;
        info!(target: "staking", "Staking resumed");
    }

    /// Set the annual yield. Applies to all unpaid accrual from the next claim on.
    pub fn update_reward_rate(&self, apy_bps: Bps) -> Result<()> {
        if apy_bps > BPS_DENOM {
            return Err(ChainError::InvalidParameter("apy_bps must be within [0, 10000]"));
        }
        let mut state = self.state.write();
        let previous = state.apy_bps;
        state.apy_bps = apy_bps;
        info!(target: "staking", previous, apy_bps, "Reward rate updated");
        Ok(())
    }

    /// Move `amount` from `funder` into the reward reserve.
    pub fn add_rewards(&self, funder: &Address, amount: Amount) -> Result<()> {
        let mut state = self.state.write();
        let funded = math::checked_add(state.total_rewards_funded, amount, "rewards funded")?;
        self.ledger.write().transfer(funder, &self.reserve, amount)?;
        state.total_rewards_funded = funded;
        info!(target: "staking", funder = %funder, amount, "Reward reserve funded");
        Ok(())
    }

    pub fn position(&self, id: PositionId) -> Result<StakingPosition> {
        self.state
            .read()
            .positions
            .get(&id)
            .cloned()
            .ok_or(ChainError::PositionNotFound(id))
    }

    pub fn positions_of(&self, owner: &Address) -> Vec<StakingPosition> {
        self.state
            .read()
            .positions
            .values()
            .filter(|p| p.owner == *owner)
            .cloned()
            .collect()
    }

    /// Every position ever opened, in id order.
    pub fn positions(&self) -> Vec<StakingPosition> {
        self.state.read().positions.values().cloned().collect()
    }

    /// Reward claimable right now, including any left owed at unstake.
    pub fn pending_rewards(&self, id: PositionId) -> Result<Amount> {
        let state = self.state.read();
        let position = state.positions.get(&id).ok_or(ChainError::PositionNotFound(id))?;
        let accrued = position.pending_reward(state.apy_bps, self.clock.now_secs())?;
        Ok(accrued.saturating_add(position.owed_rewards))
    }

    pub fn stats(&self) -> StakingStats {
        let state = self.state.read();
        let reward_reserve = self.ledger.balance_of(&self.reserve);
        StakingStats {
            token: self.config.token.clone(),
            total_staked: state.total_staked,
            active_positions: state.positions.values().filter(|p| p.active).count(),
            total_positions: state.positions.len(),
            reward_reserve,
            total_rewards_paid: state.total_rewards_paid,
            total_rewards_funded: state.total_rewards_funded,
            total_rewards_owed: state.total_rewards_owed,
            total_fees_collected: state.total_fees_collected,
            apy_bps: state.apy_bps,
            paused: state.paused,
        }
    }

    /// Custody must hold at least the principal of every open position.
    pub fn verify_custody(&self) -> Result<()> {
        let state = self.state.read();
        let open: Amount = state
            .positions
            .values()
            .filter(|p| p.active)
            .map(|p| p.principal)
            .sum();
        let held = self.ledger.balance_of(&self.custody);
        if open != state.total_staked || held < open {
            return Err(ChainError::InvariantViolation(format!(
                "staking custody holds {held}, open principal {open}, recorded {}",
                state.total_staked
            )));
        }
        Ok(())
    }

    fn ensure_reserve(&self, ledger: &LedgerState, required: Amount) -> Result<()> {
        let available = ledger.balance_of(&self.reserve);
        if available < required {
            return Err(ChainError::RewardReserveExhausted { available, required });
        }
        Ok(())
    }
}

fn owned<'a>(
    positions: &'a mut BTreeMap<PositionId, StakingPosition>,
    caller: &Address,
    id: PositionId,
) -> Result<&'a mut StakingPosition> {
    let position = positions.get_mut(&id).ok_or(ChainError::PositionNotFound(id))?;
    if position.owner != *caller {
        return Err(ChainError::Unauthorized { caller: caller.clone() });
    }
    Ok(position)
}

fn owned_active<'a>(
    positions: &'a mut BTreeMap<PositionId, StakingPosition>,
    caller: &Address,
    id: PositionId,
) -> Result<&'a mut StakingPosition> {
    let position = owned(positions, caller, id)?;
    if !position.active {
        return Err(ChainError::PositionInactive(id));
    }
    Ok(position)
}
