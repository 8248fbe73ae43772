use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use empire_core::codec::{Dialect, Packet};
use empire_core::dispatcher::{Dispatcher, Predicate};
use empire_core::ClientError;
use serde_json::{json, Value};
use tokio_test::{assert_pending, assert_ready};

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(command: &str) -> Packet {
        Packet {
            dialect: Dialect::Extension,
            command: command.to_string(),
            zone: Some("EmpireEx_21".to_string()),
            seq: Some("1".to_string()),
            r: None,
            error_code: 0,
            payload: Value::Object(Default::default()),
        }
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        dispatcher.subscribe("gam", Arc::new(move |_: &Packet| o1.lock().unwrap().push(1)));
        let o2 = order.clone();
        dispatcher.subscribe("gam", Arc::new(move |_: &Packet| o2.lock().unwrap().push(2)));

        dispatcher.dispatch(&packet("gam"));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn subscribe_all_runs_for_every_command() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatcher.subscribe_all(Arc::new(move |_: &Packet| {
            h.fetch_add(1, Ordering::Relaxed);
        }));

        dispatcher.dispatch(&packet("gam"));
        dispatcher.dispatch(&packet("mov"));
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn a_panicking_handler_does_not_stop_other_handlers_or_waiters() {
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe("gam", Arc::new(|_: &Packet| panic!("boom")));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatcher.subscribe("gam", Arc::new(move |_: &Packet| {
            h.fetch_add(1, Ordering::Relaxed);
        }));

        dispatcher.dispatch(&packet("gam"));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn wait_for_resolves_once_a_matching_packet_is_dispatched() {
        let dispatcher = Arc::new(Dispatcher::new());
        let d = dispatcher.clone();
        let waiter = tokio::spawn(async move { d.wait_for("lli", None, Duration::from_secs(1)).await });

        // Registration happens before this task gets to run, same as the
        // real race-avoidance pattern: register wait_for, then send.
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.dispatch(&packet("lli"));

        let result = waiter.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(result.unwrap().command, "lli");
    }

    #[tokio::test]
    async fn wait_for_times_out_when_nothing_arrives() {
        let dispatcher = Dispatcher::new();
        let result = dispatcher
            .wait_for("joinOK", None, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(ClientError::Timeout { .. })));
    }

    #[tokio::test]
    async fn cancel_all_waiters_fails_every_outstanding_waiter() {
        let dispatcher = Arc::new(Dispatcher::new());
        let d = dispatcher.clone();
        let waiter = tokio::spawn(async move { d.wait_for("rlu", None, Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.cancel_all_waiters();

        let result = waiter.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wait_for_first_match_wins_among_predicate_filtered_waiters_on_one_command() {
        let dispatcher = Dispatcher::new();

        let odd: Predicate = Arc::new(|p: &Packet| {
            p.field("MID")
                .and_then(Value::as_i64)
                .map(|mid| mid % 2 == 1)
                .unwrap_or(false)
        });
        let even: Predicate = Arc::new(|p: &Packet| {
            p.field("MID")
                .and_then(Value::as_i64)
                .map(|mid| mid % 2 == 0)
                .unwrap_or(false)
        });

        // tokio_test polls each waiter by hand so registration order is
        // pinned without racing a real sleep: first() is in the waiter list
        // before second(), yet it must NOT win just because it registered
        // first — only a matching predicate may resolve it.
        let mut first = tokio_test::task::spawn(dispatcher.wait_for(
            "gam",
            Some(odd),
            Duration::from_secs(5),
        ));
        let mut second = tokio_test::task::spawn(dispatcher.wait_for(
            "gam",
            Some(even),
            Duration::from_secs(5),
        ));
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        let mut even_packet = packet("gam");
        even_packet.payload = json!({"MID": 4});
        dispatcher.dispatch(&even_packet);

        assert_pending!(first.poll());
        let resolved = assert_ready!(second.poll());
        let resolved = resolved.expect("even waiter resolves");
        assert_eq!(resolved.field("MID").and_then(Value::as_i64), Some(4));
    }

    #[test]
    fn unsubscribe_removes_the_handler() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handle = dispatcher.subscribe("gam", Arc::new(move |_: &Packet| {
            h.fetch_add(1, Ordering::Relaxed);
        }));

        dispatcher.unsubscribe(&handle);
        dispatcher.dispatch(&packet("gam"));
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }
}
