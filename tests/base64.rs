mod common;

use common::eval_lua;

#[tokio::test]
async fn test_encode_decode_round_trip() {
    let (encoded, decoded): (String, String) = eval_lua(
        r#"
        local encoded = base64.encode("hello world")
        return encoded, base64.decode(encoded)
    "#,
    )
    .await;
    assert_eq!(encoded, "aGVsbG8gd29ybGQ=");
    assert_eq!(decoded, "hello world");
}

#[tokio::test]
async fn test_empty_string() {
    let (encoded, decoded): (String, String) = eval_lua(
        r#"
        return base64.encode(""), base64.decode("")
    "#,
    )
    .await;
    assert_eq!(encoded, "");
    assert_eq!(decoded, "");
}

#[tokio::test]
async fn test_decode_rejects_invalid_input() {
    let (ok, message): (bool, String) = eval_lua(
        r#"
        local ok, err = pcall(base64.decode, "not valid base64!!!")
        return ok, tostring(err)
    "#,
    )
    .await;
    assert!(!ok);
    assert!(message.contains("base64.decode"), "message: {message}");
}

#[tokio::test]
async fn test_unicode_round_trip() {
    let decoded: String = eval_lua(
        r#"
        return base64.decode(base64.encode("héllo wörld 日本"))
    "#,
    )
    .await;
    assert_eq!(decoded, "héllo wörld 日本");
}
