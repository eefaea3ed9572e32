// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use wlan_sentry_rs::models::{
    elements::{
        Element, FieldRegistry, FieldSpec, RenameMap, SerializeFormat, from_json,
        structurally_eq, summarize, to_json,
    },
    mac::MacAddr,
};

fn device_tree(reg: &FieldRegistry) -> Element {
    let name = reg.register("device.name", "name");
    let mac = reg.register("device.mac", "mac");
    let signal = reg.register("device.signal", "signal block");
    let last = reg.register("signal.last", "last signal");
    let min = reg.register("signal.min", "min signal");

    let mut sig = Element::map();
    sig.insert(last, Element::I32(-40));
    sig.insert(min, Element::I32(-88));

    let mut el = Element::map();
    el.insert(name, Element::String("lab-ap".into()));
    el.insert(
        mac,
        Element::Mac("AA:BB:CC:DD:EE:01".parse::<MacAddr>().expect("mac")),
    );
    el.insert(signal, sig);
    el
}

#[test]
fn test_registry_interns_stable_ids() {
    let reg = FieldRegistry::new();
    let a = reg.register("x.one", "first");
    let b = reg.register("x.two", "second");

    assert_ne!(a, b);
    assert_eq!(reg.register("x.one", "ignored"), a);
    assert_eq!(reg.name_of(a).as_deref(), Some("x.one"));
    assert_eq!(reg.id_of("x.two"), Some(b));
}

#[test]
fn test_json_round_trip_structural() {
    let reg = FieldRegistry::new();
    let tree = device_tree(&reg);

    let json = to_json(&tree, &reg, &RenameMap::new());
    let back = from_json(&json, &reg);

    assert!(structurally_eq(&tree, &back));
}

#[test]
fn test_summarize_paths_and_rename() {
    let reg = FieldRegistry::new();
    let tree = device_tree(&reg);

    let specs = vec![
        FieldSpec { path: "device.name".into(), rename: Some("name".into()) },
        FieldSpec { path: "device.signal/signal.last".into(), rename: None },
    ];

    let (view, renames) = summarize(&tree, &specs, &reg);
    let json = to_json(&view, &reg, &renames);

    assert_eq!(json["name"], "lab-ap");
    // nested selection flattens under its dotted path
    assert_eq!(json["device.signal.signal.last"], -40);
    assert!(json.get("device.mac").is_none());
}

#[test]
fn test_summarize_vector_applies_per_item() {
    let reg = FieldRegistry::new();
    let items = Element::Vector(vec![device_tree(&reg), device_tree(&reg)]);

    let specs =
        vec![FieldSpec { path: "device.name".into(), rename: Some("n".into()) }];

    let (view, renames) = summarize(&items, &specs, &reg);
    let json = to_json(&view, &reg, &renames);

    let arr = json.as_array().expect("array");
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["n"], "lab-ap");
}

#[test]
fn test_missing_summarize_path_is_skipped() {
    let reg = FieldRegistry::new();
    let tree = device_tree(&reg);

    let specs = vec![
        FieldSpec { path: "device.name".into(), rename: None },
        FieldSpec { path: "no.such.field".into(), rename: None },
    ];

    let (view, renames) = summarize(&tree, &specs, &reg);
    let json = to_json(&view, &reg, &renames);

    let obj = json.as_object().expect("object");
    assert_eq!(obj.len(), 1);
}

#[test]
fn test_formats() {
    let reg = FieldRegistry::new();
    let f = reg.register("v", "value");

    let mut a = Element::map();
    a.insert(f, Element::U32(1));
    let mut b = Element::map();
    b.insert(f, Element::U32(2));
    let vec = Element::Vector(vec![a, b]);

    let renames = RenameMap::new();

    let plain = SerializeFormat::Json.render(&vec, &reg, &renames);
    assert_eq!(plain, r#"[{"v":1},{"v":2}]"#);

    let ek = SerializeFormat::EkJson.render(&vec, &reg, &renames);
    let lines: Vec<&str> = ek.lines().collect();
    assert_eq!(lines, vec![r#"{"v":1}"#, r#"{"v":2}"#]);

    let pretty = SerializeFormat::PrettyJson.render(&vec, &reg, &renames);
    assert!(pretty.contains('\n'));

    assert_eq!(
        SerializeFormat::from_extension("ekjson"),
        SerializeFormat::EkJson
    );
    assert_eq!(SerializeFormat::from_extension("json"), SerializeFormat::Json);
}

#[test]
fn test_fieldspec_wire_forms() {
    let simple = FieldSpec::from_json(&serde_json::json!("a/b")).expect("spec");
    assert_eq!(simple.path, "a/b");
    assert!(simple.rename.is_none());

    let renamed =
        FieldSpec::from_json(&serde_json::json!(["a/b", "short"])).expect("spec");
    assert_eq!(renamed.rename.as_deref(), Some("short"));

    assert!(FieldSpec::from_json(&serde_json::json!(42)).is_err());
}
