mod common;

use common::run_harness;

#[tokio::test]
async fn test_json_get_walks_into_the_captured_document() {
    let (vm, result) = run_harness(
        r#"
        cli.raw("sh", "-c", [[echo '[{"id":"7","name":"Acme","attributes":{"time-zone":"UTC"}}]']])

        name, name_found = json_get(".[0].name")
        zone, zone_found = json_get('.[0].attributes["time-zone"]')
        id, id_found = json_get(".[0].id")
    "#,
    )
    .await;
    result.unwrap();

    let globals = vm.lua.globals();
    assert_eq!(globals.get::<String>("name").unwrap(), "Acme");
    assert!(globals.get::<bool>("name_found").unwrap());
    assert_eq!(globals.get::<String>("zone").unwrap(), "UTC");
    assert!(globals.get::<bool>("zone_found").unwrap());
    assert_eq!(globals.get::<String>("id").unwrap(), "7");
    assert!(globals.get::<bool>("id_found").unwrap());
}

#[tokio::test]
async fn test_json_get_reports_null_as_found() {
    let (vm, result) = run_harness(
        r#"
        cli.raw("sh", "-c", [[echo '{"deleted_at":null}']])

        value, found = json_get(".deleted_at")
        missing, missing_found = json_get(".archived_at")
    "#,
    )
    .await;
    result.unwrap();

    let globals = vm.lua.globals();
    assert!(globals.get::<mlua::Value>("value").unwrap().is_nil());
    assert!(globals.get::<bool>("found").unwrap());
    assert!(globals.get::<mlua::Value>("missing").unwrap().is_nil());
    assert!(!globals.get::<bool>("missing_found").unwrap());
}

#[tokio::test]
async fn test_json_get_without_a_json_capture() {
    let (vm, result) = run_harness(
        r#"
        no_capture, no_capture_found = json_get(".id")
        cli.raw("sh", "-c", "echo plain text")
        not_json, not_json_found = json_get(".id")
    "#,
    )
    .await;
    result.unwrap();

    let globals = vm.lua.globals();
    assert!(!globals.get::<bool>("no_capture_found").unwrap());
    assert!(!globals.get::<bool>("not_json_found").unwrap());
    assert!(globals.get::<mlua::Value>("no_capture").unwrap().is_nil());
    assert!(globals.get::<mlua::Value>("not_json").unwrap().is_nil());
}

#[tokio::test]
async fn test_json_get_root_path_returns_whole_document() {
    let (vm, result) = run_harness(
        r#"
        cli.raw("sh", "-c", [[echo '{"data":[1,2,3]}']])
        doc, found = json_get(".")
        count = #doc.data
    "#,
    )
    .await;
    result.unwrap();

    let globals = vm.lua.globals();
    assert!(globals.get::<bool>("found").unwrap());
    assert_eq!(globals.get::<i64>("count").unwrap(), 3);
}

#[tokio::test]
async fn test_json_get_index_out_of_range_is_not_found() {
    let (vm, result) = run_harness(
        r#"
        cli.raw("sh", "-c", [[echo '[{"id":"1"}]']])
        _, found = json_get(".[5].id")
    "#,
    )
    .await;
    result.unwrap();

    assert!(!vm.lua.globals().get::<bool>("found").unwrap());
}

#[tokio::test]
async fn test_json_get_raises_on_malformed_path() {
    let (vm, result) = run_harness(
        r#"
        cli.raw("sh", "-c", [[echo '{"id":"1"}']])
        ok, err = pcall(function() return json_get(".data[") end)
        message = tostring(err)
    "#,
    )
    .await;
    result.unwrap();

    let globals = vm.lua.globals();
    assert!(!globals.get::<bool>("ok").unwrap());
    let message = globals.get::<String>("message").unwrap();
    assert!(message.contains("json_get:"), "message: {message}");
    assert!(message.contains("unclosed bracket"), "message: {message}");
}
