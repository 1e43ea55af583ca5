use booking::{collector, config::BookingConfig, engine::BookingEngine};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("build tokio runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn every_user_gets_exactly_one_outcome(
        tickets in 0..=300u64,
        users in 0..=300u64,
        workers in 1..=64usize,
    ) {
        let rt = runtime();
        let engine = BookingEngine::new(BookingConfig::new(tickets, users, workers)).unwrap();
        let out = rt.block_on(engine.run()).unwrap();
        let r = &out.report;

        prop_assert!(r.is_clean(), "violations: {:?}", r.violations);
        prop_assert_eq!(r.booked + r.failed, users);
        prop_assert_eq!(r.booked, tickets.min(users));
        prop_assert_eq!(r.booked_users.len() as u64, r.booked);

        let snap = engine.ledger().snapshot();
        prop_assert!(snap.per_user.values().all(|c| *c == 1));

        // auditing the final state again changes nothing but run metadata
        let collected = collector::Collected {
            results: out.results.clone(),
            tally: out
                .results
                .iter()
                .filter(|res| res.outcome.is_booked())
                .map(|res| (res.user_id, 1))
                .collect(),
        };
        let mut again = collector::audit(&snap, &collected, users);
        prop_assert_eq!(again.total_users, users);
        again.cancelled = r.cancelled;
        again.elapsed_ms = r.elapsed_ms;
        prop_assert_eq!(&again, r);
    }
}
