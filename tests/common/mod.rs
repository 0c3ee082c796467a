#![allow(dead_code)]

use handlerq::Dispatcher;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Runs the dispatcher on the current thread, stopping it from a watchdog
/// thread if nothing else has after `deadline`.
///
/// Returns true when the run ended before the deadline.
pub fn run_with_deadline(dispatcher: &Dispatcher, deadline: Duration) -> bool {
    let (cancel, cancelled) = mpsc::channel::<()>();
    let fired = Arc::new(AtomicBool::new(false));

    let watchdog = {
        let dispatcher = dispatcher.clone();
        let fired = fired.clone();
        thread::spawn(move || {
            if cancelled.recv_timeout(deadline).is_err() {
                fired.store(true, Ordering::SeqCst);
                dispatcher.stop();
            }
        })
    };

    dispatcher.run().expect("dispatcher run");
    let _ = cancel.send(());
    watchdog.join().unwrap();

    !fired.load(Ordering::SeqCst)
}
