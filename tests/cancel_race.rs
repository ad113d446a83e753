use cancel_sync::{context, CondVar, Error, Mutex};
use std::{sync::Arc, thread, time::Duration};

mod util;

const ITERS: usize = 2_000;

/// Canceling a blocked `lock` at nearly the same moment the holder releases
/// the lock must never panic, and must leave the mutex usable.
#[test]
fn cancel_races_with_unlock() {
    util::trace_init();
    let mutex = Arc::new(Mutex::new());
    let bg = context::background();

    for i in 0..ITERS {
        mutex.lock(&bg).unwrap();
        let (cx, cancel) = context::with_cancel(&bg);

        let waiter = thread::spawn({
            let mutex = mutex.clone();
            move || {
                let res = mutex.lock(&cx);
                if res.is_ok() {
                    mutex.unlock();
                }
                res
            }
        });

        if i % 2 == 0 {
            thread::yield_now();
        }
        let canceler = thread::spawn(move || cancel.cancel());
        mutex.unlock();

        canceler.join().unwrap();
        match waiter.join().unwrap() {
            Ok(()) | Err(Error::Canceled) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert!(!mutex.is_locked());
    assert!(mutex.try_lock());
    mutex.unlock();
}

/// Many waiters canceled while the lock changes hands must all leave the
/// queue; afterwards, the lock is still reachable by a fresh caller.
#[test]
fn mass_cancellation() {
    const WAITERS: usize = 16;

    util::trace_init();
    let mutex = Arc::new(Mutex::new());
    let bg = context::background();

    for _ in 0..ITERS / 100 {
        let (cx, cancel) = context::with_cancel(&bg);
        mutex.lock(&bg).unwrap();

        let waiters = (0..WAITERS)
            .map(|_| {
                let mutex = mutex.clone();
                let cx = cx.clone();
                thread::spawn(move || {
                    if mutex.lock(&cx).is_ok() {
                        mutex.unlock();
                    }
                })
            })
            .collect::<Vec<_>>();

        thread::sleep(Duration::from_micros(200));
        cancel.cancel();
        mutex.unlock();

        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    let (cx, _cancel) = context::with_timeout(&bg, Duration::from_secs(10));
    mutex.lock(&cx).unwrap();
    mutex.unlock();
}

/// Canceling a `wait` while the condition variable is signaled must neither
/// panic nor leave a stale waiter behind.
#[test]
fn cancel_races_with_signal() {
    util::trace_init();
    let cond = Arc::new(CondVar::new(Mutex::new()));
    let bg = context::background();

    for _ in 0..ITERS {
        let (cx, cancel) = context::with_cancel(&bg);
        let waiter = thread::spawn({
            let cond = cond.clone();
            move || {
                cond.locker().lock(&cx).unwrap();
                match cond.wait(&cx) {
                    Ok(()) => {
                        cond.locker().unlock();
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        });

        while cond.waiters() == 0 && !waiter.is_finished() {
            thread::yield_now();
        }
        let canceler = thread::spawn(move || cancel.cancel());
        cond.signal();

        canceler.join().unwrap();
        match waiter.join().unwrap() {
            Ok(()) | Err(Error::Canceled) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
        assert_eq!(cond.waiters(), 0);
        assert!(!cond.locker().is_locked());
    }
}
