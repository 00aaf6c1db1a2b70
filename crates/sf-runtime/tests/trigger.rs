//! Trigger fan-out semantics with a scripted device and a control-system
//! tick variable.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use sf_runtime::{Application, MemoryBackend, TestAdapter, UpdateMode, ValueType};

#[test]
#[serial]
fn one_device_read_per_trigger_tick() {
    let _ = tracing_subscriber::fmt::try_init();
    let adapter = Arc::new(TestAdapter::new());
    let backend = Arc::new(MemoryBackend::new());
    backend.set_sequence("/ADC/raw", &[10.0, 20.0, 30.0]);

    let mut app = Application::new("triggered").unwrap();
    app.set_control_system_adapter(adapter.clone());
    app.register_device_backend("board", backend.clone());

    let daq = app.add_module(app.root(), "daq", "").unwrap();
    let raw = app
        .input::<i16>(daq, "raw", "", "", UpdateMode::Push, 16)
        .unwrap();
    let device = app
        .device_register("board", "/ADC/raw", UpdateMode::Poll, Some(ValueType::Int16), 16)
        .unwrap();
    let tick = app
        .control_system_variable("/tick", Some(ValueType::Int32), 1)
        .unwrap();
    app.connect(device, raw.node()).unwrap();
    app.set_external_trigger(device, tick).unwrap();

    let (values_tx, values_rx) = mpsc::channel();
    app.add_worker(daq, move || loop {
        raw.read()?;
        let _ = values_tx.send(raw.values()?);
    });

    app.run().unwrap();

    for _ in 0..3 {
        adapter.feed_value("/tick", 1_i32).unwrap();
    }

    let timeout = Duration::from_secs(5);
    for expected in [10_i16, 20, 30] {
        let values = values_rx.recv_timeout(timeout).unwrap();
        assert_eq!(values, vec![expected; 16]);
    }
    // exactly one device read per tick
    assert_eq!(backend.read_count("/ADC/raw"), 3);

    app.shutdown();
}

#[test]
#[serial]
fn one_trigger_fan_out_is_shared_between_networks() {
    let adapter = Arc::new(TestAdapter::new());
    let backend = Arc::new(MemoryBackend::new());
    backend.set_value("/ADC/a", 1.0);
    backend.set_value("/ADC/b", 2.0);

    let mut app = Application::new("shared_trigger").unwrap();
    app.set_control_system_adapter(adapter.clone());
    app.register_device_backend("board", backend.clone());

    let daq = app.add_module(app.root(), "daq", "").unwrap();
    let in_a = app
        .input::<f64>(daq, "a", "", "", UpdateMode::Push, 1)
        .unwrap();
    let in_b = app
        .input::<f64>(daq, "b", "", "", UpdateMode::Push, 1)
        .unwrap();
    let dev_a = app
        .device_register("board", "/ADC/a", UpdateMode::Poll, Some(ValueType::Float64), 1)
        .unwrap();
    let dev_b = app
        .device_register("board", "/ADC/b", UpdateMode::Poll, Some(ValueType::Float64), 1)
        .unwrap();
    let tick = app
        .control_system_variable("/tick", Some(ValueType::Int32), 1)
        .unwrap();
    app.connect(dev_a, in_a.node()).unwrap();
    app.connect(dev_b, in_b.node()).unwrap();
    app.set_external_trigger(dev_a, tick).unwrap();
    app.set_external_trigger(dev_b, tick).unwrap();

    let (pairs_tx, pairs_rx) = mpsc::channel();
    app.add_worker(daq, move || loop {
        in_a.read()?;
        in_b.read()?;
        let _ = pairs_tx.send((in_a.value()?, in_b.value()?));
    });

    app.run().unwrap();
    adapter.feed_value("/tick", 1_i32).unwrap();

    let (a, b) = pairs_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((a, b), (1.0, 2.0));
    // both feeders were read exactly once, in the same pass
    assert_eq!(backend.read_count("/ADC/a"), 1);
    assert_eq!(backend.read_count("/ADC/b"), 1);

    app.shutdown();
}
