#![cfg(not(loom))]

mod util;
use shimeji::{Error, Scheduler};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

#[derive(Default)]
struct Slow {
    running: AtomicBool,
    finished: AtomicUsize,
}

fn sleep_then_reschedule(slow: &Slow) -> i32 {
    slow.running.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(200));
    slow.running.store(false, Ordering::SeqCst);
    slow.finished.fetch_add(1, Ordering::SeqCst);
    1
}

#[test]
fn delete_blocks_until_callback_returns() {
    util::trace_init();

    let sched = Scheduler::<Slow>::builder()
        .name("slow")
        .start_thread(true)
        .build()
        .unwrap();
    let slow = Arc::new(Slow::default());
    let start = Instant::now();
    let id = sched
        .add(Duration::from_millis(50), sleep_then_reschedule, slow.clone())
        .unwrap();

    thread::sleep(Duration::from_millis(60));
    assert!(
        slow.running.load(Ordering::SeqCst),
        "callback should be running by now"
    );

    sched.delete(id).unwrap();
    assert!(
        start.elapsed() >= Duration::from_millis(250),
        "delete returned after {:?}, before the callback finished",
        start.elapsed()
    );
    assert!(!slow.running.load(Ordering::SeqCst));
    assert_eq!(slow.finished.load(Ordering::SeqCst), 1);

    // the task is gone, and was not rescheduled
    assert!(sched.find_data(id).is_none());
    assert_eq!(sched.when(id), None);
    assert_eq!(sched.stats().outstanding, 0);
    assert!(matches!(sched.delete(id), Err(Error::NotFound(_))));

    // and its data is no longer held by the scheduler
    assert_eq!(Arc::strong_count(&slow), 1);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(slow.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn shared_between_threads() {
    util::trace_init();

    let sched = Arc::new(
        Scheduler::<AtomicUsize>::builder()
            .name("shared")
            .start_thread(true)
            .build()
            .unwrap(),
    );
    let hits = Arc::new(AtomicUsize::new(0));

    let threads = (0..4)
        .map(|_| {
            let sched = sched.clone();
            let hits = hits.clone();
            thread::spawn(move || {
                let mut slot = None;
                for i in 0..50 {
                    sched
                        .replace(
                            &mut slot,
                            Duration::from_millis(i % 3),
                            |hits| {
                                hits.fetch_add(1, Ordering::SeqCst);
                                0
                            },
                            hits.clone(),
                        )
                        .unwrap();
                }
                slot
            })
        })
        .collect::<Vec<_>>();
    let last = threads
        .into_iter()
        .map(|thread| thread.join().unwrap())
        .collect::<Vec<_>>();
    assert!(last.iter().all(Option::is_some));

    // wait for whatever survived replacement to fire
    let deadline = Instant::now() + Duration::from_secs(5);
    while sched.stats().outstanding > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let stats = sched.stats();
    assert_eq!(stats.outstanding, 0);
    assert_eq!(stats.added, 200);
    assert_eq!(stats.fired as usize, hits.load(Ordering::SeqCst));
}
