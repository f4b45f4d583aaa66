use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// One purchasable plan and what it pays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanReward {
    /// Deposit amount in USD that selects this plan.
    pub price: f64,
    /// Paid once per completed daily task round.
    pub daily_profit: f64,
    /// Paid once to the referrer when the referred user's deposit is approved.
    pub referral_profit: f64,
}

const DEFAULT_PLANS: [PlanReward; 7] = [
    PlanReward { price: 15.0, daily_profit: 1.0, referral_profit: 3.0 },
    PlanReward { price: 25.0, daily_profit: 1.5, referral_profit: 4.0 },
    PlanReward { price: 35.0, daily_profit: 1.75, referral_profit: 5.0 },
    PlanReward { price: 50.0, daily_profit: 2.0, referral_profit: 6.0 },
    PlanReward { price: 75.0, daily_profit: 3.75, referral_profit: 7.0 },
    PlanReward { price: 150.0, daily_profit: 5.0, referral_profit: 10.0 },
    PlanReward { price: 250.0, daily_profit: 8.0, referral_profit: 20.0 },
];

/// Exact-match lookup from plan price to payouts. Amounts that are not a plan
/// price earn nothing.
#[derive(Debug, Clone)]
pub struct RewardRules {
    plans: Vec<PlanReward>,
}

impl Default for RewardRules {
    fn default() -> Self {
        RewardRules {
            plans: DEFAULT_PLANS.to_vec(),
        }
    }
}

impl RewardRules {
    pub fn new(plans: Vec<PlanReward>) -> anyhow::Result<Self> {
        for (i, plan) in plans.iter().enumerate() {
            let values = [plan.price, plan.daily_profit, plan.referral_profit];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                bail!("plan {} has a negative or non-finite value", plan.price);
            }
            if plans[..i].iter().any(|p| p.price == plan.price) {
                bail!("plan price {} is listed twice", plan.price);
            }
        }
        Ok(RewardRules { plans })
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let plans: Vec<PlanReward> =
            serde_json::from_str(json).context("reward rules must be a JSON array of plans")?;
        Self::new(plans)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read reward rules from {}", path.display()))?;
        Self::from_json(&data)
    }

    pub fn plans(&self) -> &[PlanReward] {
        &self.plans
    }

    fn plan_for(&self, amount: f64) -> Option<&PlanReward> {
        self.plans.iter().find(|p| p.price == amount)
    }

    pub fn profit_for(&self, plan_amount: f64) -> Option<f64> {
        self.plan_for(plan_amount).map(|p| p.daily_profit)
    }

    pub fn referral_profit_for(&self, plan_amount: f64) -> Option<f64> {
        self.plan_for(plan_amount).map(|p| p.referral_profit)
    }
}
