mod common;

use handlerq::{Dispatcher, LineReader};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn collect(reader: LineReader, lines: Arc<Mutex<Vec<String>>>, d: Dispatcher) {
    let next = reader.clone();
    reader
        .read(move || {
            if next.is_eof() {
                d.stop();
                return;
            }
            lines.lock().unwrap().push(next.line());
            collect(next, lines, d);
        })
        .expect("read");
}

#[test]
fn test_reads_lines_until_end_of_input() {
    let dispatcher = Dispatcher::new();
    let reader = LineReader::new(&dispatcher, Cursor::new("first\nsecond\r\n\nlast"));
    let lines = Arc::new(Mutex::new(Vec::new()));

    collect(reader.clone(), lines.clone(), dispatcher.clone());
    assert!(common::run_with_deadline(&dispatcher, Duration::from_secs(5)));

    assert_eq!(*lines.lock().unwrap(), vec!["first", "second", "", "last"]);
    assert!(reader.is_eof());
    assert_eq!(reader.line(), "");
}

#[test]
fn test_empty_input_is_eof_immediately() {
    let dispatcher = Dispatcher::new();
    let reader = LineReader::new(&dispatcher, Cursor::new(Vec::<u8>::new()));
    let lines = Arc::new(Mutex::new(Vec::new()));

    collect(reader.clone(), lines.clone(), dispatcher.clone());
    assert!(common::run_with_deadline(&dispatcher, Duration::from_secs(5)));

    assert!(lines.lock().unwrap().is_empty());
    assert!(reader.is_eof());
}
