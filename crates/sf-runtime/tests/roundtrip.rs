//! Round-trip behaviour of application-to-application wiring.

use std::sync::mpsc;
use std::time::Duration;

use serial_test::serial;
use sf_runtime::{Application, UpdateMode};

#[test]
#[serial]
fn single_pair_preserves_order_and_versions() {
    let mut app = Application::new("roundtrip").unwrap();
    let producer = app.add_module(app.root(), "producer", "").unwrap();
    let consumer = app.add_module(app.root(), "consumer", "").unwrap();

    let out = app.output::<i32>(producer, "x", "", "", 1).unwrap();
    let inp = app
        .input::<i32>(consumer, "x", "", "", UpdateMode::Push, 1)
        .unwrap();
    app.connect(out.node(), inp.node()).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    app.add_worker(producer, move || {
        for value in [1, 2, 3] {
            out.write_value(value)?;
        }
        Ok(())
    });
    app.add_worker(consumer, move || {
        let mut values = Vec::new();
        let mut versions = Vec::new();
        for _ in 0..3 {
            inp.read()?;
            values.push(inp.value()?);
            versions.push(inp.version()?);
        }
        let _ = done_tx.send((values, versions));
        Ok(())
    });

    app.run().unwrap();
    let (values, versions) = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(values, vec![1, 2, 3]);
    assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
    app.shutdown();
}

#[test]
#[serial]
fn feeding_fan_out_delivers_the_same_vector_to_both_consumers() {
    let mut app = Application::new("fanout").unwrap();
    let producer = app.add_module(app.root(), "producer", "").unwrap();
    let left = app.add_module(app.root(), "left", "").unwrap();
    let right = app.add_module(app.root(), "right", "").unwrap();

    let out = app.output::<f32>(producer, "vec", "", "", 4).unwrap();
    let in_left = app
        .input::<f32>(left, "vec", "", "", UpdateMode::Push, 4)
        .unwrap();
    let in_right = app
        .input::<f32>(right, "vec", "", "", UpdateMode::Push, 4)
        .unwrap();
    app.connect(out.node(), in_left.node()).unwrap();
    app.connect(out.node(), in_right.node()).unwrap();

    let (writer_tx, writer_rx) = mpsc::channel();
    let (left_tx, left_rx) = mpsc::channel();
    let (right_tx, right_rx) = mpsc::channel();

    app.add_worker(producer, move || {
        out.set_all(&[1.0, 2.0, 3.0, 4.0])?;
        out.write()?;
        // the writer's buffer must still be observable after the write
        let _ = writer_tx.send(out.values()?);
        Ok(())
    });
    app.add_worker(left, move || {
        in_left.read()?;
        let _ = left_tx.send(in_left.values()?);
        Ok(())
    });
    app.add_worker(right, move || {
        in_right.read()?;
        let _ = right_tx.send(in_right.values()?);
        Ok(())
    });

    app.run().unwrap();
    let timeout = Duration::from_secs(5);
    assert_eq!(
        writer_rx.recv_timeout(timeout).unwrap(),
        vec![1.0, 2.0, 3.0, 4.0]
    );
    assert_eq!(
        left_rx.recv_timeout(timeout).unwrap(),
        vec![1.0, 2.0, 3.0, 4.0]
    );
    assert_eq!(
        right_rx.recv_timeout(timeout).unwrap(),
        vec![1.0, 2.0, 3.0, 4.0]
    );
    app.shutdown();
}

#[test]
#[serial]
fn second_application_instance_is_rejected() {
    let app = Application::new("first").unwrap();
    assert!(Application::new("second").is_err());
    drop(app);
    // after dropping the first, a new one may be created
    let app = Application::new("third").unwrap();
    drop(app);
}
