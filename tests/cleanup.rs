mod common;

use common::{logged_calls, run_harness_with, stub_bin, stub_target};

#[tokio::test]
async fn test_run_cleanup_deletes_in_reverse_registration_order() {
    let stub = stub_bin(r#"echo "$@" >> {LOG}"#);
    let (_vm, result) = run_harness_with(
        stub_target(&stub),
        r#"
        register_cleanup("brokers", "1")
        register_cleanup("posts", "2")
        register_cleanup("widgets", "3")
        run_cleanup()
    "#,
    )
    .await;
    result.unwrap();

    assert_eq!(
        logged_calls(&stub),
        vec![
            "do widgets delete 3 --confirm",
            "do posts delete 2 --confirm",
            "do brokers delete 1 --confirm",
        ]
    );
}

#[tokio::test]
async fn test_drain_continues_past_a_failed_delete() {
    let stub = stub_bin(
        r#"echo "$@" >> {LOG}
if [ "$2" = "flaky" ]; then exit 1; fi"#,
    );
    let (_vm, result) = run_harness_with(
        stub_target(&stub),
        r#"
        register_cleanup("widgets", "1")
        register_cleanup("flaky", "2")
        register_cleanup("posts", "3")
        run_cleanup()
    "#,
    )
    .await;
    result.unwrap();

    // The flaky delete fails but the ones registered before it still run.
    assert_eq!(
        logged_calls(&stub),
        vec![
            "do posts delete 3 --confirm",
            "do flaky delete 2 --confirm",
            "do widgets delete 1 --confirm",
        ]
    );
}

#[tokio::test]
async fn test_each_registration_is_deleted_exactly_once() {
    let stub = stub_bin(r#"echo "$@" >> {LOG}"#);
    let (_vm, result) = run_harness_with(
        stub_target(&stub),
        r#"
        register_cleanup("widgets", "99")
        run_cleanup()
        run_cleanup()
    "#,
    )
    .await;
    result.unwrap();

    assert_eq!(logged_calls(&stub), vec!["do widgets delete 99 --confirm"]);
}

#[tokio::test]
async fn test_callbacks_interleave_with_resource_deletes() {
    let stub = stub_bin(r#"echo "$@" >> {LOG}"#);
    let script = format!(
        r#"
        register_cleanup("brokers", "1")
        defer_cleanup(function()
            cli.raw([[{path}]], "callback", "ran")
        end)
        register_cleanup("widgets", "2")
        run_cleanup()
    "#,
        path = stub.path
    );
    let (_vm, result) = run_harness_with(stub_target(&stub), &script).await;
    result.unwrap();

    assert_eq!(
        logged_calls(&stub),
        vec![
            "do widgets delete 2 --confirm",
            "callback ran",
            "do brokers delete 1 --confirm",
        ]
    );
}

#[tokio::test]
async fn test_numeric_ids_are_coerced_to_strings() {
    let stub = stub_bin(r#"echo "$@" >> {LOG}"#);
    let (_vm, result) = run_harness_with(
        stub_target(&stub),
        r#"
        register_cleanup("widgets", 42)
        run_cleanup()
    "#,
    )
    .await;
    result.unwrap();

    assert_eq!(logged_calls(&stub), vec!["do widgets delete 42 --confirm"]);
}

#[tokio::test]
async fn test_table_id_is_rejected() {
    let (vm, result) = common::run_harness(
        r#"
        ok, err = pcall(function() register_cleanup("widgets", {}) end)
        message = tostring(err)
    "#,
    )
    .await;
    result.unwrap();

    let globals = vm.lua.globals();
    assert!(!globals.get::<bool>("ok").unwrap());
    let message = globals.get::<String>("message").unwrap();
    assert!(
        message.contains("id must be a string or number"),
        "message: {message}"
    );
}

#[tokio::test]
async fn test_registrations_after_a_drain_are_picked_up_by_the_next() {
    let stub = stub_bin(r#"echo "$@" >> {LOG}"#);
    let (_vm, result) = run_harness_with(
        stub_target(&stub),
        r#"
        register_cleanup("widgets", "1")
        run_cleanup()
        register_cleanup("posts", "2")
        run_cleanup()
    "#,
    )
    .await;
    result.unwrap();

    assert_eq!(
        logged_calls(&stub),
        vec!["do widgets delete 1 --confirm", "do posts delete 2 --confirm"]
    );
}

#[tokio::test]
async fn test_drain_leaves_the_capture_untouched() {
    let stub = stub_bin(r#"if [ "$1" = "boom" ]; then exit 7; fi; echo "$@" >> {LOG}"#);
    let script = format!(
        r#"
        test_name("failure survives cleanup")
        cli.raw([[{path}]], "boom")
        register_cleanup("widgets", "1")
        run_cleanup()
        held = assert_failure()
        pass()
        "#,
        path = stub.path
    );
    let (vm, result) = run_harness_with(stub_target(&stub), &script).await;
    result.unwrap();

    assert!(vm.lua.globals().get::<bool>("held").unwrap());
    assert_eq!(vm.ctx.borrow().summary().passed, 1);
}
