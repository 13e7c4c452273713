#![cfg(not(loom))]
//! Exactly-once firing of [`CallbackJoin`] under concurrent completions.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use proptest::prelude::*;
use relaycore::{
    join::{CallbackJoin, JoinError},
    pipeline::{Executor, LanePool, LaneToken},
};

fn run_members(members: usize, failing: &[usize], stagger: &[u8]) -> (usize, bool, Option<usize>) {
    let fired = Arc::new(AtomicUsize::new(0));
    let outcome = Arc::new(std::sync::Mutex::new(None));
    let join = {
        let fired = Arc::clone(&fired);
        let outcome = Arc::clone(&outcome);
        Arc::new(CallbackJoin::<usize, usize>::new(move |result| {
            fired.fetch_add(1, Ordering::SeqCst);
            *outcome.lock().expect("outcome lock") = Some(result);
        }))
    };
    let handles: Vec<_> = (0..members)
        .map(|n| {
            let member = join.register();
            let fail = failing.contains(&n);
            let spins = stagger.get(n).copied().unwrap_or_default();
            thread::spawn(move || {
                for _ in 0..spins {
                    thread::yield_now();
                }
                member
                    .complete(if fail { Err(n) } else { Ok(n) })
                    .expect("registered member");
            })
        })
        .collect();
    join.set_blocked(false);
    for handle in handles {
        handle.join().expect("member thread");
    }
    let outcome = outcome
        .lock()
        .expect("outcome lock")
        .take()
        .expect("join fired");
    (fired.load(Ordering::SeqCst), outcome.success, outcome.error)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fires_exactly_once_with_every_completion(
        members in 1_usize..24,
        failing in prop::collection::vec(0_usize..24, 0..4),
        stagger in prop::collection::vec(0_u8..16, 24),
    ) {
        let (fired, success, error) = run_members(members, &failing, &stagger);
        prop_assert_eq!(fired, 1);
        let any_failed = failing.iter().any(|&n| n < members);
        prop_assert_eq!(success, !any_failed);
        prop_assert_eq!(error.is_some(), any_failed);
        if let Some(n) = error {
            prop_assert!(failing.contains(&n));
        }
    }
}

#[test]
fn extra_completion_is_an_overrun() {
    let (join, _rx) = CallbackJoin::<(), ()>::with_channel();
    join.set_number_callbacks(1);
    assert_eq!(join.done(Ok(())), Ok(()));
    assert_eq!(join.done(Ok(())), Err(JoinError::Overrun));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn members_on_pool_lanes_report_through_channel() {
    let pool = LanePool::current().expect("inside a runtime");
    let (join, rx) = CallbackJoin::<u32, String>::with_channel();
    for n in 0..64_u32 {
        let member = join.register();
        let lane = LaneToken::from(format!("member-{}", n % 5));
        pool.dispatch(
            Box::new(move || {
                let completion = if n == 17 { Err(format!("member {n} failed")) } else { Ok(n) };
                member.complete(completion).expect("registered member");
            }),
            &lane,
        );
    }
    join.set_blocked(false);

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("join fired in time")
        .expect("sender kept");
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("member 17 failed"));
    assert!(outcome.result.is_some());
    assert!(join.has_fired());
}
