//! Property-Based Tests for Lockout Counters
//!
//! Properties:
//! - Generated thresholds always validate and survive `define` unchanged
//! - A dimension locks exactly on its `count`-th event within the period
//! - `reset` lifts a lock only for resettable dimensions; `force_reset` always does

use std::sync::Arc;

use corral_core::{CounterConfig, MemoryCache};
use corral_lockout::{Counter, CounterOverrides, Locker, Lockout, LockoutGuard};
use corral_test_utils::assertions::assert_ok;
use corral_test_utils::fixtures::locker_config;
use corral_test_utils::generators::*;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn lockout(config: &CounterConfig) -> Lockout<MemoryCache, String, bool> {
    Locker::new(Arc::new(MemoryCache::new()), locker_config(), |_: &String| false)
        .unwrap()
        .with_counter(
            "by_user",
            Counter::new(|user: &String| user.clone(), CounterConfig::default()),
        )
        .define(
            "login",
            [(
                "by_user",
                CounterOverrides::new()
                    .count(config.count)
                    .period(config.period)
                    .duration(config.duration)
                    .reset(config.reset),
            )],
        )
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_define_keeps_overrides(config in arb_counter_config()) {
        assert_ok(&config.validate("login.by_user"));

        let lockout = lockout(&config);
        let (name, counter) = lockout.dimensions().next().unwrap();
        prop_assert_eq!(name, "by_user");
        prop_assert_eq!(counter.config(), &config);
    }

    #[test]
    fn prop_locks_on_threshold(config in arb_counter_config(), user in arb_key()) {
        let rt = runtime();
        rt.block_on(async {
            let lockout = lockout(&config);
            for _ in 1..config.count {
                lockout.incr(&user).await.unwrap();
            }
            prop_assert!(!lockout.is_locked(&user).await.unwrap());

            lockout.incr(&user).await.unwrap();
            prop_assert!(lockout.is_locked(&user).await.unwrap());
            let allowed = lockout.forbid_locked(&user, || async { true }).await.unwrap();
            prop_assert!(!allowed);
            Ok(())
        })?;
    }

    #[test]
    fn prop_reset_follows_flag(config in arb_counter_config(), user in arb_key()) {
        let rt = runtime();
        rt.block_on(async {
            let lockout = lockout(&config);
            for _ in 0..config.count {
                lockout.incr(&user).await.unwrap();
            }
            prop_assert!(lockout.is_locked(&user).await.unwrap());

            lockout.reset(&user).await.unwrap();
            prop_assert_eq!(lockout.is_locked(&user).await.unwrap(), !config.reset);

            lockout.force_reset(&user).await.unwrap();
            prop_assert!(!lockout.is_locked(&user).await.unwrap());
            Ok(())
        })?;
    }
}
