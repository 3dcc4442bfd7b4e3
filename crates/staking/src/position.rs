use dujyo_primitives::math::{self, BPS_DENOM, SECONDS_PER_YEAR};
use dujyo_primitives::{Address, Amount, Bps, PositionId, Result, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPosition {
    pub id: PositionId,
    pub owner: Address,
    pub principal: Amount,
    pub start_time: Timestamp,
    /// `start_time + lock_period`; principal is locked until then.
    pub end_time: Timestamp,
    /// Rewards are owed from here on.
    pub last_accrual_at: Timestamp,
    /// Rewards paid out so far.
    pub accrued_rewards: Amount,
    /// Earned at close but not yet paid because the reserve ran short.
    #[serde(default)]
    pub owed_rewards: Amount,
    pub active: bool,
}

impl StakingPosition {
    pub fn is_locked(&self, now: Timestamp) -> bool {
        now < self.end_time
    }

    /// Reward owed for `[last_accrual_at, now)` at `apy_bps`.
    pub fn pending_reward(&self, apy_bps: Bps, now: Timestamp) -> Result<Amount> {
        if !self.active {
            return Ok(0);
        }
        let elapsed = now.saturating_sub(self.last_accrual_at) as Amount;
        math::mul_div(
            self.principal,
            apy_bps as Amount * elapsed,
            BPS_DENOM as Amount * SECONDS_PER_YEAR as Amount,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(principal: Amount) -> StakingPosition {
        StakingPosition {
            id: 1,
            owner: Address::new("alice"),
            principal,
            start_time: 0,
            end_time: 100,
            last_accrual_at: 0,
            accrued_rewards: 0,
            owed_rewards: 0,
            active: true,
        }
    }

    #[test]
    fn test_one_year_at_twelve_percent() {
        let p = position(1_000);
        assert_eq!(p.pending_reward(1_200, SECONDS_PER_YEAR).unwrap(), 120);
        assert_eq!(p.pending_reward(1_200, SECONDS_PER_YEAR / 2).unwrap(), 60);
    }

    #[test]
    fn test_accrual_starts_at_last_accrual() {
        let mut p = position(1_000);
        p.last_accrual_at = SECONDS_PER_YEAR;
        assert_eq!(p.pending_reward(1_200, SECONDS_PER_YEAR).unwrap(), 0);
        assert_eq!(p.pending_reward(1_200, 2 * SECONDS_PER_YEAR).unwrap(), 120);
    }

    #[test]
    fn test_inactive_position_accrues_nothing() {
        let mut p = position(1_000);
        p.active = false;
        assert_eq!(p.pending_reward(1_200, SECONDS_PER_YEAR).unwrap(), 0);
        assert!(p.is_locked(99));
        assert!(!p.is_locked(100));
    }
}
