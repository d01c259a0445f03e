use super::*;
use proptest::{collection::vec, prop_oneof, proptest, strategy::Strategy};
use std::collections::BTreeSet;

#[derive(Clone, Debug)]
enum Op {
    Add { delay_ms: u32, periodic: bool },
    Delete(usize),
    Advance(u32),
    Run,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u32..50, proptest::bool::ANY)
            .prop_map(|(delay_ms, periodic)| Op::Add { delay_ms, periodic }),
        2 => (0usize..64).prop_map(Op::Delete),
        2 => (0u32..30).prop_map(Op::Advance),
        1 => proptest::strategy::Just(Op::Run),
    ]
}

/// Periodic tasks return 1, one-shot tasks return 0.
fn fire(periodic: &bool) -> i32 {
    i32::from(*periodic)
}

proptest! {
    #[test]
    fn heap_and_index_agree(ops in vec(op(), 0..128)) {
        let time = ManualClock::new();
        let sched = test_sched::<bool>(&time);
        let mut issued = Vec::new();
        let mut live = BTreeSet::new();
        let mut high_water = 0;

        for op in ops {
            match op {
                Op::Add { delay_ms, periodic } => {
                    let id = sched
                        .add(Duration::from_millis(u64::from(delay_ms)), fire, periodic)
                        .unwrap();
                    assert!(live.insert(id), "id {id} was handed out twice");
                    issued.push(id);
                }
                Op::Delete(i) if !issued.is_empty() => {
                    let id = issued[i % issued.len()];
                    let deleted = sched.delete(id).is_ok();
                    assert_eq!(deleted, live.remove(&id));
                }
                Op::Delete(_) => {}
                Op::Advance(ms) => time.advance(Duration::from_millis(u64::from(ms))),
                Op::Run => {
                    sched.run_queue();
                    live.retain(|&id| sched.find_data(id).is_some());
                }
            }

            sched.assert_consistent();
            let stats = sched.stats();
            assert_eq!(stats.outstanding, live.len());
            assert!(stats.high_water >= high_water, "high water mark went down");
            high_water = high_water.max(stats.outstanding);
            assert_eq!(stats.high_water, high_water);
        }
    }

    #[test]
    fn fires_in_deadline_order(delays in vec(0u64..1000, 1..64)) {
        struct Entry {
            delay: u64,
            log: Arc<Mutex<Vec<u64>>>,
        }

        let time = ManualClock::new();
        let sched = Scheduler::<Entry>::with_settings(Settings {
            clock: time.clock(),
            batch_window: Duration::ZERO,
            ..Settings::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        for &delay in &delays {
            let entry = Entry { delay, log: log.clone() };
            sched
                .add(
                    Duration::from_millis(delay),
                    |entry| {
                        entry.log.lock().unwrap().push(entry.delay);
                        0
                    },
                    entry,
                )
                .unwrap();
        }

        time.advance(Duration::from_millis(1000));
        assert_eq!(sched.run_queue(), delays.len());

        let mut expected = delays;
        expected.sort_unstable();
        assert_eq!(*log.lock().unwrap(), expected);
    }
}
