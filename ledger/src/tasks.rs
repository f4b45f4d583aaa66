use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use common::{models::DailyTaskRound, utils::DepositStatus};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{credit_balance, Ledger, LedgerError, Result};

pub const TOTAL_STEPS: i64 = 5;

/// Real-world offsets span UTC-12..UTC+14.
const MAX_TZ_OFFSET_MINUTES: i32 = 14 * 60;

/// Parses the client's `x-tz-offset-minutes` value (minutes to add to local
/// time to get UTC). Missing, malformed or out-of-range values mean UTC.
pub fn parse_tz_offset(raw: Option<&str>) -> i32 {
    raw.and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|v| v.abs() <= MAX_TZ_OFFSET_MINUTES)
        .unwrap_or(0)
}

fn local_clock(now: DateTime<Utc>, tz_offset_minutes: i32) -> DateTime<Utc> {
    now - Duration::minutes(i64::from(tz_offset_minutes))
}

/// `YYYY-MM-DD` of the user's local calendar day at `now`.
pub fn date_key(now: DateTime<Utc>, tz_offset_minutes: i32) -> String {
    local_clock(now, tz_offset_minutes)
        .format("%Y-%m-%d")
        .to_string()
}

/// The UTC instant of the user's next local midnight.
pub fn next_local_midnight(now: DateTime<Utc>, tz_offset_minutes: i32) -> DateTime<Utc> {
    let tomorrow = local_clock(now, tz_offset_minutes)
        .date_naive()
        .succ_opt()
        .unwrap_or(NaiveDate::MAX);
    let local_midnight = Utc.from_utc_datetime(&tomorrow.and_time(NaiveTime::MIN));
    local_midnight + Duration::minutes(i64::from(tz_offset_minutes))
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub date_key: String,
    pub round: DailyTaskRound,
    /// True only for the call that completed the round and credited it.
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub date_key: String,
    pub available: bool,
    pub completed_today: bool,
    pub next_available_at: DateTime<Utc>,
    pub reward_amount: f64,
    pub round: Option<DailyTaskRound>,
}

impl Ledger {
    pub(crate) async fn latest_completed_plan(&self, user_id: &str) -> Result<Option<f64>> {
        let amount = sqlx::query_scalar(
            "SELECT amount FROM deposits WHERE user_id = ? AND status = ?
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(DepositStatus::COMPLETED)
        .fetch_optional(&self.pool)
        .await?;
        Ok(amount)
    }

    /// Advances today's round by one step; the step that reaches
    /// `TOTAL_STEPS` also pays the round's reward in the same transaction.
    /// Calls after completion return the finished round unchanged.
    pub async fn advance_step(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        tz_offset_minutes: i32,
    ) -> Result<StepOutcome> {
        let date_key = date_key(now, tz_offset_minutes);

        let Some(plan_amount) = self.latest_completed_plan(user_id).await? else {
            return Err(LedgerError::DepositRequired);
        };
        let reward_amount = self.rules.profit_for(plan_amount).unwrap_or(0.0);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO daily_task_rounds (id, user_id, date_key, total_steps, current_step, reward_amount, paid_out, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, 0, ?, ?)
             ON CONFLICT (user_id, date_key) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&date_key)
        .bind(TOTAL_STEPS)
        .bind(reward_amount)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let round: DailyTaskRound =
            sqlx::query_as("SELECT * FROM daily_task_rounds WHERE user_id = ? AND date_key = ?")
                .bind(user_id)
                .bind(&date_key)
                .fetch_one(&mut *tx)
                .await?;

        if round.is_completed() {
            tx.commit().await?;
            debug!("Round {} for {} already completed", date_key, user_id);
            return Ok(StepOutcome {
                date_key,
                round,
                paid: false,
            });
        }

        // compare-and-set on the step we read
        let advanced: Option<DailyTaskRound> = sqlx::query_as(
            "UPDATE daily_task_rounds
             SET current_step = current_step + 1,
                 completed_at = CASE WHEN current_step + 1 >= total_steps THEN ? ELSE NULL END,
                 updated_at = ?
             WHERE id = ? AND current_step = ? AND completed_at IS NULL
             RETURNING *",
        )
        .bind(now)
        .bind(now)
        .bind(&round.id)
        .bind(round.current_step)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut round) = advanced else {
            let round: DailyTaskRound = sqlx::query_as("SELECT * FROM daily_task_rounds WHERE id = ?")
                .bind(&round.id)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(StepOutcome {
                date_key,
                round,
                paid: false,
            });
        };

        let mut paid = false;
        if round.is_completed() && !round.paid_out {
            let marked = sqlx::query(
                "UPDATE daily_task_rounds SET paid_out = 1, paid_out_at = ?, updated_at = ?
                 WHERE id = ? AND paid_out = 0",
            )
            .bind(now)
            .bind(now)
            .bind(&round.id)
            .execute(&mut *tx)
            .await?;

            if marked.rows_affected() == 1 {
                credit_balance(&mut tx, user_id, round.reward_amount, now).await?;
                round.paid_out = true;
                round.paid_out_at = Some(now);
                paid = true;
                info!(
                    "Task round {} completed for {}, paid {}",
                    date_key, user_id, round.reward_amount
                );
            }
        }

        tx.commit().await?;
        Ok(StepOutcome {
            date_key,
            round,
            paid,
        })
    }

    pub async fn task_status(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        tz_offset_minutes: i32,
    ) -> Result<TaskStatus> {
        let date_key = date_key(now, tz_offset_minutes);
        let plan_amount = self.latest_completed_plan(user_id).await?;

        let round: Option<DailyTaskRound> =
            sqlx::query_as("SELECT * FROM daily_task_rounds WHERE user_id = ? AND date_key = ?")
                .bind(user_id)
                .bind(&date_key)
                .fetch_optional(&self.pool)
                .await?;

        let completed_today = round.as_ref().is_some_and(DailyTaskRound::is_completed);
        let available = plan_amount.is_some_and(|amount| amount > 0.0) && !completed_today;
        let reward_amount = match &round {
            Some(round) => round.reward_amount,
            None => plan_amount
                .and_then(|amount| self.rules.profit_for(amount))
                .unwrap_or(0.0),
        };

        Ok(TaskStatus {
            next_available_at: next_local_midnight(now, tz_offset_minutes),
            date_key,
            available,
            completed_today,
            reward_amount,
            round,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{balance, completed_deposit, file_ledger, ledger, register};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn date_key_follows_local_day() {
        let now = at(2026, 10, 18, 23, 30);
        assert_eq!(date_key(now, 0), "2026-10-18");
        // UTC+2 is reported as -120
        assert_eq!(date_key(now, -120), "2026-10-19");
        // UTC-5 is reported as 300
        assert_eq!(date_key(at(2026, 10, 18, 3, 0), 300), "2026-10-17");
    }

    #[test]
    fn next_midnight_is_after_now_on_another_day() {
        let instants = [
            at(2026, 10, 18, 0, 0),
            at(2026, 10, 18, 23, 59),
            at(2026, 12, 31, 22, 15),
            at(2028, 2, 28, 12, 0),
        ];
        for now in instants {
            for offset in [-840, -330, -60, 0, 45, 300, 720] {
                let next = next_local_midnight(now, offset);
                assert!(next > now, "{} {}", now, offset);
                assert_ne!(date_key(next, offset), date_key(now, offset));
                assert!(next - now <= Duration::hours(24));
            }
        }
        assert_eq!(next_local_midnight(at(2026, 10, 18, 23, 30), -120), at(2026, 10, 19, 22, 0));
    }

    #[test]
    fn tz_offset_header_parsing() {
        assert_eq!(parse_tz_offset(Some("-120")), -120);
        assert_eq!(parse_tz_offset(Some(" 300 ")), 300);
        assert_eq!(parse_tz_offset(Some("abc")), 0);
        assert_eq!(parse_tz_offset(Some("5000")), 0);
        assert_eq!(parse_tz_offset(None), 0);
    }

    #[tokio::test]
    async fn steps_require_completed_deposit() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;

        let err = ledger.advance_step(&user.id, Utc::now(), 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::DepositRequired));

        let status = ledger.task_status(&user.id, Utc::now(), 0).await.unwrap();
        assert!(!status.available);
        assert!(status.round.is_none());
        assert_eq!(status.reward_amount, 0.0);
    }

    #[tokio::test]
    async fn five_steps_pay_once() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;
        completed_deposit(&ledger, &user.id, 50.0).await;
        let now = at(2026, 10, 18, 10, 0);

        for step in 1..TOTAL_STEPS {
            let outcome = ledger.advance_step(&user.id, now, 0).await.unwrap();
            assert_eq!(outcome.round.current_step, step);
            assert!(!outcome.paid);
            assert!(outcome.round.completed_at.is_none());
        }
        assert_eq!(balance(&ledger, &user.id).await, 0.0);

        let last = ledger.advance_step(&user.id, now, 0).await.unwrap();
        assert!(last.paid);
        assert_eq!(last.round.current_step, TOTAL_STEPS);
        assert!(last.round.completed_at.is_some());
        assert!(last.round.paid_out);
        assert_eq!(balance(&ledger, &user.id).await, 2.0);

        let extra = ledger.advance_step(&user.id, now, 0).await.unwrap();
        assert!(!extra.paid);
        assert_eq!(extra.round.current_step, TOTAL_STEPS);
        assert_eq!(balance(&ledger, &user.id).await, 2.0);

        let status = ledger.task_status(&user.id, now, 0).await.unwrap();
        assert!(status.completed_today);
        assert!(!status.available);
        assert_eq!(status.next_available_at, at(2026, 10, 19, 0, 0));
    }

    #[tokio::test]
    async fn concurrent_steps_never_double_pay() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;
        completed_deposit(&ledger, &user.id, 150.0).await;
        let now = at(2026, 10, 18, 10, 0);

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..12 {
            let ledger = ledger.clone();
            let user_id = user.id.clone();
            set.spawn(async move { ledger.advance_step(&user_id, now, 0).await });
        }
        let mut payouts = 0;
        while let Some(res) = set.join_next().await {
            if res.unwrap().unwrap().paid {
                payouts += 1;
            }
        }

        assert_eq!(payouts, 1);
        assert_eq!(balance(&ledger, &user.id).await, 5.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn steps_across_connections_pay_once() {
        let (_dir, ledger) = file_ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;
        completed_deposit(&ledger, &user.id, 150.0).await;
        let now = at(2026, 10, 18, 10, 0);

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            let user_id = user.id.clone();
            set.spawn(async move { ledger.advance_step(&user_id, now, 0).await });
        }
        let mut payouts = 0;
        while let Some(res) = set.join_next().await {
            if res.unwrap().unwrap().paid {
                payouts += 1;
            }
        }

        assert_eq!(payouts, 1);
        assert_eq!(balance(&ledger, &user.id).await, 5.0);
        let status = ledger.task_status(&user.id, now, 0).await.unwrap();
        assert!(status.completed_today);
    }

    #[tokio::test]
    async fn new_local_day_starts_a_new_round() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;
        completed_deposit(&ledger, &user.id, 15.0).await;
        let day_one = at(2026, 10, 18, 10, 0);

        for _ in 0..TOTAL_STEPS {
            ledger.advance_step(&user.id, day_one, 0).await.unwrap();
        }
        let next = ledger
            .advance_step(&user.id, day_one + Duration::days(1), 0)
            .await
            .unwrap();
        assert_eq!(next.date_key, "2026-10-19");
        assert_eq!(next.round.current_step, 1);
        assert_eq!(balance(&ledger, &user.id).await, 1.0);
    }

    #[tokio::test]
    async fn round_reward_is_fixed_at_creation() {
        let ledger = ledger().await;
        let user = register(&ledger, "alice@example.com", None).await;
        completed_deposit(&ledger, &user.id, 25.0).await;
        let now = at(2026, 10, 18, 10, 0);

        let first = ledger.advance_step(&user.id, now, 0).await.unwrap();
        assert_eq!(first.round.reward_amount, 1.5);

        completed_deposit(&ledger, &user.id, 250.0).await;
        for _ in 1..TOTAL_STEPS {
            ledger.advance_step(&user.id, now, 0).await.unwrap();
        }
        assert_eq!(balance(&ledger, &user.id).await, 1.5);

        let tomorrow = ledger.task_status(&user.id, now + Duration::days(1), 0).await.unwrap();
        assert!(tomorrow.available);
        assert_eq!(tomorrow.reward_amount, 8.0);
    }
}
