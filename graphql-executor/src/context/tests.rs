use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::json;

use crate::graphql;
use crate::json_ext::Path;
use crate::Context;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Viewer {
    id: String,
    roles: Vec<String>,
}

#[test]
fn entries_are_shared_between_clones() {
    let context = Context::new();
    let viewer = Viewer {
        id: "1".to_string(),
        roles: vec!["admin".to_string()],
    };
    context.clone().insert("viewer", &viewer).unwrap();

    assert!(context.contains_key("viewer"));
    assert_eq!(context.get::<Viewer>("viewer").unwrap(), Some(viewer));
    assert_eq!(context.get::<Viewer>("missing").unwrap(), None);
}

#[test]
fn entries_are_replaced() {
    let context = Context::new();
    context.insert("attempts", 1).unwrap();
    context.insert("attempts", 2).unwrap();
    assert_eq!(context.get::<u32>("attempts").unwrap(), Some(2));
}

#[test]
fn entries_of_another_shape_fail_to_read() {
    let context = Context::new();
    context.insert("viewer", "anonymous").unwrap();
    assert!(context.get::<Viewer>("viewer").is_err());
}

#[test]
fn errors_are_shared_between_clones_in_order() {
    let c = Context::new();
    let clone = c.clone();
    c.add_error(graphql::Error::builder().message("first").build());
    clone.add_error_at(Path::from("user/name"), "second");

    let messages: Vec<_> = c.errors().into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["first", "second"]);
    assert_eq!(clone.error_count(), 2);
    assert_eq!(c.errors()[1].path, Some(Path::from("user/name")));
}

#[test]
fn response_extensions() {
    let c = Context::new();
    c.clone()
        .insert_response_extension("cost", json!({ "requested": 3 }));
    assert_eq!(
        c.response_extensions().get("cost"),
        Some(&json!({ "requested": 3 }))
    );
}

#[tokio::test]
async fn cancellation_is_shared() {
    let c = Context::new();
    let clone = c.clone();
    assert!(!c.is_cancelled());
    clone.cancel();
    c.cancelled().await;
    assert!(c.is_cancelled());
}
