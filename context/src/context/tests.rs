use super::*;
use crate::util::test::{assert_send_sync, trace_init};

#[test]
fn contexts_are_send_and_sync() {
    assert_send_sync::<Background>();
    assert_send_sync::<CancelContext>();
    assert_send_sync::<CancelHandle>();
}

#[test]
fn background_is_never_done() {
    let ctx = background();
    assert!(!ctx.is_done());
    assert_eq!(ctx.err(), None);
    assert_eq!(ctx.deadline(), None);
}

#[test]
fn cancel() {
    let _trace = trace_init();
    let (ctx, cancel) = with_cancel(&background());
    assert!(!ctx.is_done());
    assert_eq!(ctx.err(), None);

    cancel.cancel();
    assert!(ctx.is_done());
    assert_eq!(ctx.err(), Some(Error::Canceled));

    // canceling again changes nothing
    cancel.cancel();
    assert_eq!(ctx.err(), Some(Error::Canceled));
}

#[test]
fn dropping_handle_does_not_cancel() {
    let (ctx, cancel) = with_cancel(&background());
    drop(cancel);
    assert!(!ctx.is_done());
}

#[test]
fn parent_cancels_children() {
    let _trace = trace_init();
    let (parent, cancel_parent) = with_cancel(&background());
    let (child, _cancel_child) = with_cancel(&parent);
    let (grandchild, _cancel_grandchild) = with_cancel(&child);

    cancel_parent.cancel();
    assert_eq!(child.err(), Some(Error::Canceled));
    assert_eq!(grandchild.err(), Some(Error::Canceled));
    assert!(grandchild.done().is_fired());
}

#[test]
fn child_does_not_cancel_parent() {
    let (parent, _cancel_parent) = with_cancel(&background());
    let (child, cancel_child) = with_cancel(&parent);

    cancel_child.cancel();
    assert!(child.is_done());
    assert!(!parent.is_done());
}

#[test]
fn child_of_canceled_parent_is_canceled() {
    let (parent, cancel_parent) = with_cancel(&background());
    cancel_parent.cancel();
    let (child, _cancel_child) = with_cancel(&parent);
    assert_eq!(child.err(), Some(Error::Canceled));
}

#[test]
fn canceled_child_releases_parent_registration() {
    let parent = background();
    let (_child, cancel_child) = with_cancel(&parent);
    assert_eq!(parent.done().registered(), 1);
    cancel_child.cancel();
    assert_eq!(parent.done().registered(), 0);
}

#[test]
fn timeout_expires() {
    let _trace = trace_init();
    let (ctx, _cancel) = with_timeout(&background(), Duration::from_millis(10));
    assert!(ctx.deadline().is_some());
    assert_eq!(wait(&ctx), Error::DeadlineExceeded);
    assert_eq!(ctx.err(), Some(Error::DeadlineExceeded));
}

#[test]
fn dropping_context_releases_deadline_timer() {
    let _trace = trace_init();
    for _ in 0..100 {
        let (ctx, cancel) = with_timeout(&background(), Duration::from_secs(60));
        let done = ctx.done().clone();

        // wait for the timer thread to park on `done`
        let deadline = Instant::now() + Duration::from_secs(10);
        while done.registered() == 0 {
            assert!(Instant::now() < deadline, "timer never started waiting");
            thread::yield_now();
        }

        drop(ctx);
        drop(cancel);
        assert!(done.is_fired(), "dropping the last handle fires `done`");

        let deadline = Instant::now() + Duration::from_secs(10);
        while done.registered() != 0 {
            assert!(
                Instant::now() < deadline,
                "timer thread must exit long before its deadline"
            );
            thread::yield_now();
        }
    }
}

#[test]
fn deadline_in_the_past() {
    let (ctx, _cancel) = with_deadline(&background(), Instant::now());
    assert_eq!(ctx.err(), Some(Error::DeadlineExceeded));
}

#[test]
fn cancel_before_deadline() {
    let (ctx, cancel) = with_timeout(&background(), Duration::from_secs(60));
    cancel.cancel();
    assert_eq!(ctx.err(), Some(Error::Canceled));
}

#[test]
fn deadline_propagates_reason() {
    let _trace = trace_init();
    let (parent, _cancel_parent) = with_timeout(&background(), Duration::from_millis(5));
    let (child, _cancel_child) = with_cancel(&parent);
    assert_eq!(child.deadline(), parent.deadline());
    assert_eq!(wait(&child), Error::DeadlineExceeded);
}

#[test]
fn earlier_parent_deadline_wins() {
    let (parent, _cancel_parent) = with_timeout(&background(), Duration::from_secs(1));
    let (child, _cancel_child) = with_timeout(&parent, Duration::from_secs(60));
    assert_eq!(child.deadline(), parent.deadline());
}

#[test]
fn wait_from_another_thread() {
    let _trace = trace_init();
    let (ctx, cancel) = with_cancel(&background());
    let waiter = thread::spawn(move || wait(&ctx));
    thread::sleep(Duration::from_millis(10));
    cancel.cancel();
    assert_eq!(waiter.join().unwrap(), Error::Canceled);
}

#[test]
fn error_messages() {
    assert_eq!(Error::Canceled.to_string(), "context canceled");
    assert_eq!(
        Error::DeadlineExceeded.to_string(),
        "context deadline exceeded"
    );
}
