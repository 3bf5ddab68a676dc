mod common;

use common::{eval_lua, run_harness, run_lua};

#[tokio::test]
async fn test_jsonapi_attr_and_rel_id() {
    let (name, broker_id): (String, String) = eval_lua(
        r#"
        local jsonapi = require("gauntlet.jsonapi")
        local doc = json.parse([[{
            "data": {
                "id": "7",
                "attributes": {"name": "Acme", "active": true},
                "relationships": {"broker": {"data": {"id": "31", "type": "brokers"}}}
            }
        }]])
        return jsonapi.attr(doc, "name"), jsonapi.rel_id(doc, "broker")
    "#,
    )
    .await;
    assert_eq!(name, "Acme");
    assert_eq!(broker_id, "31");
}

#[tokio::test]
async fn test_jsonapi_attr_is_nil_on_malformed_documents() {
    let all_nil: bool = eval_lua(
        r#"
        local jsonapi = require("gauntlet.jsonapi")
        return jsonapi.attr(nil, "name") == nil
            and jsonapi.attr({}, "name") == nil
            and jsonapi.rel_id({ data = {} }, "broker") == nil
    "#,
    )
    .await;
    assert!(all_nil);
}

#[tokio::test]
async fn test_jsonapi_ids_accepts_both_list_shapes() {
    let (wrapped, bare): (Vec<String>, Vec<String>) = eval_lua(
        r#"
        local jsonapi = require("gauntlet.jsonapi")
        local wrapped = jsonapi.ids(json.parse([[{"data":[{"id":"1"},{"id":"2"}]}]]))
        local bare = jsonapi.ids(json.parse([=[[{"id":42},{"id":43}]]=]))
        return wrapped, bare
    "#,
    )
    .await;
    assert_eq!(wrapped, vec!["1", "2"]);
    assert_eq!(bare, vec!["42", "43"]);
}

#[tokio::test]
async fn test_jsonapi_errors_helpers() {
    let (count, title, empty): (i64, String, bool) = eval_lua(
        r#"
        local jsonapi = require("gauntlet.jsonapi")
        local doc = json.parse([[{"errors":[{"status":"422","title":"Unprocessable"}]}]])
        local errors = jsonapi.errors(doc)
        local first = jsonapi.first_error(doc)
        return #errors, first.title, #jsonapi.errors({}) == 0
    "#,
    )
    .await;
    assert_eq!(count, 1);
    assert_eq!(title, "Unprocessable");
    assert!(empty);
}

#[tokio::test]
async fn test_jsonapi_find_by_attr_checks_flattened_and_nested_rows() {
    let (flat_id, nested_id, missing): (String, String, bool) = eval_lua(
        r#"
        local jsonapi = require("gauntlet.jsonapi")
        local flat = json.parse([=[[{"id":"1","name":"one"},{"id":"2","name":"two"}]]=])
        local nested = json.parse([[{"data":[{"id":"9","attributes":{"name":"two"}}]}]])
        local a = jsonapi.find_by_attr(flat, "name", "two")
        local b = jsonapi.find_by_attr(nested, "name", "two")
        local c = jsonapi.find_by_attr(flat, "name", "three")
        return a.id, b.id, c == nil
    "#,
    )
    .await;
    assert_eq!(flat_id, "2");
    assert_eq!(nested_id, "9");
    assert!(missing);
}

#[tokio::test]
async fn test_retry_until_true_stops_at_first_truthy_result() {
    let (result, attempts): (String, i64) = eval_lua(
        r#"
        local retry = require("gauntlet.retry")
        local attempts = 0
        local result = retry.until_true(function()
            attempts = attempts + 1
            if attempts >= 3 then return "ready" end
        end, { attempts = 10, delay = 0 })
        return result, attempts
    "#,
    )
    .await;
    assert_eq!(result, "ready");
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn test_retry_until_true_gives_up_after_the_budget() {
    let (result_is_nil, attempts): (bool, i64) = eval_lua(
        r#"
        local retry = require("gauntlet.retry")
        local attempts = 0
        local result = retry.until_true(function()
            attempts = attempts + 1
            return nil
        end, { attempts = 4, delay = 0 })
        return result == nil, attempts
    "#,
    )
    .await;
    assert!(result_is_nil);
    assert_eq!(attempts, 4);
}

#[tokio::test]
async fn test_retry_until_ok_swallows_errors_until_one_succeeds() {
    let (ok, result): (bool, String) = eval_lua(
        r#"
        local retry = require("gauntlet.retry")
        local attempts = 0
        return retry.until_ok(function()
            attempts = attempts + 1
            if attempts < 3 then error("not yet") end
            return "done"
        end, { attempts = 5, delay = 0 })
    "#,
    )
    .await;
    assert!(ok);
    assert_eq!(result, "done");
}

#[tokio::test]
async fn test_retry_until_ok_reports_the_last_error() {
    let (ok, message): (bool, String) = eval_lua(
        r#"
        local retry = require("gauntlet.retry")
        local ok, err = retry.until_ok(function()
            error("still broken")
        end, { attempts = 2, delay = 0 })
        return ok, tostring(err)
    "#,
    )
    .await;
    assert!(!ok);
    assert!(message.contains("still broken"), "message: {message}");
}

#[tokio::test]
async fn test_require_caches_the_module_table() {
    let cached: bool = eval_lua(
        r#"
        local a = require("gauntlet.jsonapi")
        local b = require("gauntlet.jsonapi")
        a.marker = "cached"
        return b.marker == "cached"
    "#,
    )
    .await;
    assert!(cached);
}

#[tokio::test]
async fn test_require_rejects_unprefixed_names() {
    let (vm, result) = run_harness(
        r#"
        ok, err = pcall(require, "jsonapi")
        message = tostring(err)
    "#,
    )
    .await;
    result.unwrap();

    let globals = vm.lua.globals();
    assert!(!globals.get::<bool>("ok").unwrap());
    assert!(
        globals.get::<String>("message").unwrap().contains("module not found"),
        "unprefixed names must not resolve"
    );
}

#[tokio::test]
async fn test_require_names_the_search_locations_when_missing() {
    let result = run_lua(r#"require("gauntlet.no_such_helper")"#).await;
    let message = result.unwrap_err().to_string();
    assert!(message.contains("no_such_helper"), "message: {message}");
}
