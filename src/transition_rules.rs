//! Pure pool-transition predicate (spec §4.6). Given a domain snapshot,
//! decides whether and where to transition. No side effects, no I/O —
//! `PoolManager` is the only caller that acts on the decision.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::models::domain::Domain;
use crate::models::pool::PoolType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionDecision {
    pub should_transition: bool,
    pub target_pool: Option<PoolType>,
    pub reason: String,
}

impl TransitionDecision {
    fn none(reason: impl Into<String>) -> Self {
        Self {
            should_transition: false,
            target_pool: None,
            reason: reason.into(),
        }
    }

    fn to(target: PoolType, reason: impl Into<String>) -> Self {
        Self {
            should_transition: true,
            target_pool: Some(target),
            reason: reason.into(),
        }
    }
}

/// Evaluate the transition rule for a domain's current pool. `now` and
/// `config` are explicit so the function stays deterministic and
/// side-effect free (spec §8 idempotence law).
pub fn evaluate(domain: &Domain, now: DateTime<Utc>, config: &Config) -> TransitionDecision {
    match domain.pool_type {
        PoolType::InitialWarming => evaluate_initial_warming(domain, now, config),
        PoolType::ReadyWaiting => evaluate_ready_waiting(domain, config),
        PoolType::Active => evaluate_active(domain, config),
        PoolType::Recovery => evaluate_recovery(domain, now, config),
    }
}

fn evaluate_initial_warming(
    domain: &Domain,
    now: DateTime<Utc>,
    config: &Config,
) -> TransitionDecision {
    let days = domain.days_in_pool(now);
    if days < config.graduation_days {
        return TransitionDecision::none(format!(
            "days-in-pool {days} < required {}",
            config.graduation_days
        ));
    }
    let mean = match domain.mean_of_last(config.min_tests) {
        Some(m) => m,
        None => {
            return TransitionDecision::none(format!(
                "fewer than {} test scores available",
                config.min_tests
            ))
        }
    };
    if mean < config.min_score as f64 {
        return TransitionDecision::none(format!(
            "mean score {mean:.2} below threshold {}",
            config.min_score
        ));
    }
    TransitionDecision::to(
        PoolType::ReadyWaiting,
        "Met graduation criteria from Initial Warming",
    )
}

fn evaluate_ready_waiting(domain: &Domain, config: &Config) -> TransitionDecision {
    let mean = match domain.mean_of_last(config.min_tests) {
        Some(m) => m,
        None => {
            return TransitionDecision::none(format!(
                "fewer than {} test scores available",
                config.min_tests
            ))
        }
    };
    if mean < config.min_score as f64 {
        return TransitionDecision::none(format!(
            "mean score {mean:.2} below threshold {}",
            config.min_score
        ));
    }
    if !domain.has_active_campaign() {
        return TransitionDecision::none("no active campaign assigned");
    }
    TransitionDecision::to(PoolType::Active, "Ready for active sending")
}

fn evaluate_active(domain: &Domain, config: &Config) -> TransitionDecision {
    if domain.consecutive_low_scores >= config.max_consec_low {
        return TransitionDecision::to(
            PoolType::Recovery,
            format!(
                "consecutive low scores {} >= {}",
                domain.consecutive_low_scores, config.max_consec_low
            ),
        );
    }
    TransitionDecision::none(format!(
        "consecutive low scores {} below {}",
        domain.consecutive_low_scores, config.max_consec_low
    ))
}

fn evaluate_recovery(domain: &Domain, now: DateTime<Utc>, config: &Config) -> TransitionDecision {
    let days = domain.days_in_pool(now);
    if days < config.recovery_days {
        return TransitionDecision::none(format!(
            "days-in-pool {days} < required {}",
            config.recovery_days
        ));
    }
    let scores = domain.last_scores(config.min_tests);
    if scores.len() < config.min_tests {
        return TransitionDecision::none(format!(
            "fewer than {} test scores available",
            config.min_tests
        ));
    }
    if !scores.iter().all(|&s| s >= config.min_score) {
        return TransitionDecision::none("not every recent score meets the threshold");
    }
    TransitionDecision::to(PoolType::ReadyWaiting, "Recovered to Ready Waiting")
}
