//! Unconnected variables fall back to synthesised constants.

use serial_test::serial;
use sf_runtime::{Application, UpdateMode};

#[test]
#[serial]
fn unconnected_consumer_reads_zero_once() {
    let mut app = Application::new("orphans").unwrap();
    app.enable_unconnected_warnings();
    let module = app.add_module(app.root(), "lonely", "").unwrap();
    let inp = app
        .input::<u32>(module, "x", "", "", UpdateMode::Push, 1)
        .unwrap();

    app.initialise().unwrap();

    // the synthesised constant delivers zero exactly once
    inp.read().unwrap();
    assert_eq!(inp.value().unwrap(), 0);
    assert!(!inp.read_non_blocking().unwrap());
    assert!(!inp.read_non_blocking().unwrap());
}

#[test]
#[serial]
fn unconnected_output_accepts_writes() {
    let mut app = Application::new("orphan_out").unwrap();
    let module = app.add_module(app.root(), "lonely", "").unwrap();
    let out = app.output::<i64>(module, "y", "", "", 2).unwrap();

    app.initialise().unwrap();

    // writes go to the synthesised constant consumer and are ignored
    out.set_all(&[5, 6]).unwrap();
    assert!(!out.write().unwrap());
}

#[test]
#[serial]
fn constant_node_feeds_application_consumer() {
    let mut app = Application::new("const_fed").unwrap();
    let module = app.add_module(app.root(), "reader", "").unwrap();
    let inp = app
        .input::<f64>(module, "limit", "", "", UpdateMode::Push, 1)
        .unwrap();
    let constant = app.constant(2.5_f64, 1).unwrap();
    app.connect(constant, inp.node()).unwrap();

    app.initialise().unwrap();

    inp.read().unwrap();
    assert_eq!(inp.value().unwrap(), 2.5);
    assert!(!inp.read_non_blocking().unwrap());
}
