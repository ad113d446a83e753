use super::*;
use crate::util::test::{assert_send_sync, trace_init};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

#[test]
fn signal_is_send_and_sync() {
    assert_send_sync::<Signal>();
    assert_send_sync::<Registration>();
}

#[test]
fn fire_is_idempotent() {
    let _trace = trace_init();
    let signal = Signal::new();
    assert!(!signal.is_fired());
    assert!(signal.fire());
    assert!(signal.is_fired());
    assert!(!signal.fire(), "second fire must be a no-op");
    assert!(signal.clone().is_fired(), "clones share the same state");
}

#[test]
fn registration_is_removed_on_drop() {
    let _trace = trace_init();
    let signal = Signal::new();
    let waker = park::thread_waker();

    let reg1 = signal.register(&waker);
    let reg2 = signal.register(&waker);
    assert_eq!(signal.registered(), 2);

    drop(reg1);
    assert_eq!(signal.registered(), 1);
    drop(reg2);
    assert_eq!(signal.registered(), 0);
}

#[test]
fn register_after_fire_stores_nothing() {
    let _trace = trace_init();
    let signal = Signal::new();
    signal.fire();
    let _reg = signal.register(&park::thread_waker());
    assert_eq!(signal.registered(), 0);
}

#[test]
fn fire_wakes_all_waiters() {
    const THREADS: usize = 8;
    let _trace = trace_init();

    let signal = Signal::new();
    let woken = Arc::new(AtomicUsize::new(0));
    let threads = (0..THREADS)
        .map(|_| {
            let signal = signal.clone();
            let woken = woken.clone();
            thread::spawn(move || {
                signal.wait();
                woken.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect::<Vec<_>>();

    thread::sleep(Duration::from_millis(20));
    assert_eq!(woken.load(Ordering::SeqCst), 0, "nobody wakes before fire");

    signal.fire();
    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::SeqCst), THREADS);
}

#[test]
fn wait_deadline_times_out() {
    let _trace = trace_init();
    let signal = Signal::new();
    let deadline = Instant::now() + Duration::from_millis(10);
    assert!(!signal.wait_deadline(deadline));
    assert!(Instant::now() >= deadline);
    assert_eq!(signal.registered(), 0, "timed out waiter must deregister");
}

#[test]
fn wait_deadline_fired() {
    let _trace = trace_init();
    let signal = Signal::new();
    let t = thread::spawn({
        let signal = signal.clone();
        move || {
            thread::sleep(Duration::from_millis(5));
            signal.fire();
        }
    });
    assert!(signal.wait_deadline(Instant::now() + Duration::from_secs(10)));
    t.join().unwrap();
}
