mod common;

use handlerq::{DEFAULT_IDLE_SLEEP, Dispatcher, DispatcherBuilder, IdleStrategy};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_builder_creation() {
    let dispatcher = DispatcherBuilder::new().build();
    assert_eq!(dispatcher.pending(), 0);
    assert!(!dispatcher.is_running());
    drop(dispatcher);
}

#[test]
fn test_default_idle_strategy_is_notify() {
    assert_eq!(
        IdleStrategy::default(),
        IdleStrategy::Notify(DEFAULT_IDLE_SLEEP)
    );
}

#[test]
fn test_polling_dispatcher_preserves_order() {
    let dispatcher = Dispatcher::builder()
        .poll_every(Duration::from_millis(1))
        .build();
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let log = log.clone();
        dispatcher.post(move || log.lock().unwrap().push(i));
    }
    let d = dispatcher.clone();
    dispatcher.post(move || d.stop());

    assert!(common::run_with_deadline(&dispatcher, Duration::from_secs(5)));
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_polling_dispatcher_picks_up_late_posts() {
    let dispatcher = DispatcherBuilder::new()
        .idle_strategy(IdleStrategy::Sleep(Duration::from_millis(1)))
        .build();
    let ran = Arc::new(Mutex::new(false));

    let producer = {
        let dispatcher = dispatcher.clone();
        let ran = ran.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            let d = dispatcher.clone();
            dispatcher.post(move || {
                *ran.lock().unwrap() = true;
                d.stop();
            });
        })
    };

    assert!(common::run_with_deadline(&dispatcher, Duration::from_secs(5)));
    producer.join().unwrap();
    assert!(*ran.lock().unwrap());
}

#[test]
fn test_notify_dispatcher_wakes_promptly() {
    let dispatcher = DispatcherBuilder::new()
        .idle_strategy(IdleStrategy::Notify(Duration::from_secs(1)))
        .build();
    let latency = Arc::new(Mutex::new(None));

    let producer = {
        let dispatcher = dispatcher.clone();
        let latency = latency.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let posted = Instant::now();
            let d = dispatcher.clone();
            dispatcher.post(move || {
                *latency.lock().unwrap() = Some(posted.elapsed());
                d.stop();
            });
        })
    };

    assert!(common::run_with_deadline(&dispatcher, Duration::from_secs(5)));
    producer.join().unwrap();

    let latency = latency.lock().unwrap().expect("handler ran");
    assert!(
        latency < Duration::from_millis(500),
        "enqueue should wake the idle loop, took {:?}",
        latency
    );
}

#[test]
fn test_multiple_dispatchers_are_independent() {
    let first = Dispatcher::new();
    let second = Dispatcher::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    let d = first.clone();
    first.post(move || {
        l.lock().unwrap().push("first");
        d.stop();
    });

    let l = log.clone();
    let d = second.clone();
    second.post(move || {
        l.lock().unwrap().push("second");
        d.stop();
    });

    assert!(common::run_with_deadline(&second, Duration::from_secs(5)));
    assert_eq!(first.pending(), 1);
    assert!(common::run_with_deadline(&first, Duration::from_secs(5)));

    assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
}
