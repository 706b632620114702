//! Per-(mailbox class, pool) defaults and settings validation (spec §4.7).

use crate::error::EngineError;
use crate::models::domain::{RandomizeRange, SendingSettings, WarmupSettings};
use crate::models::pool::{MailboxClass, PoolType};

/// Returns the documented preset for `(mailbox_class, pool_type)`. Presets
/// not explicitly enumerated in spec.md fall back to the Standard-Active
/// shape, matching the teacher's habit of a sane default row rather than an
/// exhaustive table (see `WarmupService::calculate_target_volume`'s ramp,
/// which similarly keys off a handful of named bands).
pub fn defaults_for(
    mailbox_class: MailboxClass,
    pool_type: PoolType,
) -> (SendingSettings, WarmupSettings) {
    use MailboxClass::*;
    use PoolType::*;

    match (mailbox_class, pool_type) {
        (StandardMs, InitialWarming) | (StandardMs, ReadyWaiting) | (StandardMs, Recovery) => (
            SendingSettings {
                daily_limit: 1,
                min_time_gap_seconds: 600,
            },
            WarmupSettings {
                daily_emails: 40,
                ramp_up: true,
                ramp_up_value: 3,
                randomize: RandomizeRange { min: 25, max: 40 },
                reply_rate: 80,
                weekdays_only: true,
            },
        ),
        (StandardMs, Active) => (
            SendingSettings {
                daily_limit: 20,
                min_time_gap_seconds: 15,
            },
            WarmupSettings {
                daily_emails: 20,
                ramp_up: false,
                ramp_up_value: 0,
                randomize: RandomizeRange { min: 10, max: 20 },
                reply_rate: 50,
                weekdays_only: false,
            },
        ),
        (SpecialMs, Active) => (
            SendingSettings {
                daily_limit: 8,
                min_time_gap_seconds: 60,
            },
            WarmupSettings {
                daily_emails: 40,
                ramp_up: false,
                ramp_up_value: 0,
                randomize: RandomizeRange { min: 20, max: 40 },
                reply_rate: 50,
                weekdays_only: false,
            },
        ),
        (SpecialMs, _) => (
            SendingSettings {
                daily_limit: 1,
                min_time_gap_seconds: 600,
            },
            WarmupSettings {
                daily_emails: 30,
                ramp_up: true,
                ramp_up_value: 3,
                randomize: RandomizeRange { min: 20, max: 35 },
                reply_rate: 70,
                weekdays_only: true,
            },
        ),
        (Custom, _) => (
            SendingSettings {
                daily_limit: 10,
                min_time_gap_seconds: 30,
            },
            WarmupSettings {
                daily_emails: 25,
                ramp_up: false,
                ramp_up_value: 0,
                randomize: RandomizeRange { min: 15, max: 25 },
                reply_rate: 60,
                weekdays_only: false,
            },
        ),
    }
}

/// Validates a (sending, warmup) pair; fails fast with `InvalidInput`
/// (spec §4.7).
pub fn validate(
    sending: &SendingSettings,
    warmup: &WarmupSettings,
) -> Result<(), EngineError> {
    if sending.daily_limit <= 0 {
        return Err(EngineError::invalid_input("dailyLimit must be > 0"));
    }
    if sending.min_time_gap_seconds < 15 {
        return Err(EngineError::invalid_input("minTimeGap must be >= 15"));
    }
    if warmup.randomize.max <= warmup.randomize.min {
        return Err(EngineError::invalid_input(
            "randomize.max must be greater than randomize.min",
        ));
    }
    if warmup.ramp_up && !(3..=40).contains(&warmup.ramp_up_value) {
        return Err(EngineError::invalid_input(
            "rampUpValue must be in [3, 40] when rampUp is enabled",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_ms_initial_warming_matches_spec() {
        let (sending, warmup) = defaults_for(MailboxClass::StandardMs, PoolType::InitialWarming);
        assert_eq!(sending.daily_limit, 1);
        assert_eq!(sending.min_time_gap_seconds, 600);
        assert_eq!(warmup.daily_emails, 40);
        assert!(warmup.ramp_up);
        assert_eq!(warmup.ramp_up_value, 3);
        assert_eq!(warmup.randomize.min, 25);
        assert_eq!(warmup.randomize.max, 40);
        assert_eq!(warmup.reply_rate, 80);
        assert!(warmup.weekdays_only);
    }

    #[test]
    fn standard_ms_active_matches_spec() {
        let (sending, warmup) = defaults_for(MailboxClass::StandardMs, PoolType::Active);
        assert_eq!(sending.daily_limit, 20);
        assert_eq!(sending.min_time_gap_seconds, 15);
        assert_eq!(warmup.daily_emails, 20);
        assert!(!warmup.ramp_up);
    }

    #[test]
    fn special_ms_active_matches_spec() {
        let (sending, warmup) = defaults_for(MailboxClass::SpecialMs, PoolType::Active);
        assert_eq!(sending.daily_limit, 8);
        assert_eq!(sending.min_time_gap_seconds, 60);
        assert_eq!(warmup.daily_emails, 40);
    }

    #[test]
    fn rejects_inverted_randomize_range() {
        let sending = SendingSettings {
            daily_limit: 10,
            min_time_gap_seconds: 30,
        };
        let warmup = WarmupSettings {
            daily_emails: 10,
            ramp_up: false,
            ramp_up_value: 0,
            randomize: RandomizeRange { min: 40, max: 25 },
            reply_rate: 50,
            weekdays_only: false,
        };
        let err = validate(&sending, &warmup).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_non_positive_daily_limit() {
        let sending = SendingSettings {
            daily_limit: 0,
            min_time_gap_seconds: 30,
        };
        let warmup = WarmupSettings {
            daily_emails: 10,
            ramp_up: false,
            ramp_up_value: 0,
            randomize: RandomizeRange { min: 10, max: 20 },
            reply_rate: 50,
            weekdays_only: false,
        };
        assert!(validate(&sending, &warmup).is_err());
    }
}
