//! The exported variable list and its XML rendering.

use serial_test::serial;
use sf_runtime::{Application, SyncDirection, UpdateMode, ValueType};

#[test]
#[serial]
fn variable_list_is_sorted_and_typed() {
    let mut app = Application::new("exported").unwrap();
    let module = app.add_module(app.root(), "ctrl", "").unwrap();

    let out = app
        .output::<f64>(module, "reading", "V", "measured value", 1)
        .unwrap();
    let inp = app
        .input::<i32>(module, "setpoint", "", "", UpdateMode::Push, 1)
        .unwrap();
    // wildcard-typed control-system endpoints pick up their peers' types
    let cs_out = app.control_system_variable("/b/reading", None, 0).unwrap();
    let cs_in = app.control_system_variable("/a/setpoint", None, 0).unwrap();
    app.connect(out.node(), cs_out).unwrap();
    app.connect(cs_in, inp.node()).unwrap();

    let entries = app.variable_list().unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["/a/setpoint", "/b/reading"]);

    assert_eq!(entries[0].value_type, ValueType::Int32);
    assert_eq!(entries[0].direction, SyncDirection::ControlSystemToDevice);
    assert_eq!(entries[1].value_type, ValueType::Float64);
    assert_eq!(entries[1].direction, SyncDirection::DeviceToControlSystem);
    assert_eq!(entries[1].unit, "V");
    assert_eq!(entries[1].n_elements, 1);
}

#[test]
#[serial]
fn generated_xml_is_stable() {
    let mut app = Application::new("xml_app").unwrap();
    let module = app.add_module(app.root(), "ctrl", "").unwrap();
    let out = app.output::<u16>(module, "status", "", "", 1).unwrap();
    let cs_out = app.control_system_variable("/status", None, 0).unwrap();
    app.connect(out.node(), cs_out).unwrap();

    let path = std::env::temp_dir().join("sf_runtime_variable_list_test.xml");
    app.generate_xml(&path).unwrap();
    let first = std::fs::read_to_string(&path).unwrap();
    app.generate_xml(&path).unwrap();
    let second = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(first, second);
    assert!(first.contains("<variables application=\"xml_app\">"));
    assert!(first.contains(
        "<variable name=\"/status\" type=\"uint16\" direction=\"application_to_control_system\""
    ));
}
