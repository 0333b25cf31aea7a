use std::sync::{Arc, Once};

use docrest::{
    bson::Bson,
    memory::InMemoryStore,
    prelude::*,
    serde_json::{Value, json},
};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn user_schema() -> DocumentSchema {
    DocumentSchema::builder("User", "users")
        .scalar("nick", ScalarType::String)
        .scalar("age", ScalarType::Int)
        .scalar("active", ScalarType::Bool)
        .field("friend", FieldKind::reference("users"))
        .index("nick", true)
        .build()
}

fn users(pagination: PaginationPolicy) -> ResourceSpec {
    ResourceSpec::builder("users", user_schema())
        .rename("age", "years")
        .filter("nick", [Operator::exact(), Operator::starts_with()])
        .filter("years", [Operator::exact(), Operator::gt().negatable(), Operator::lte()])
        .filter("active", [Operator::boolean()])
        .allowed_ordering(["nick", "years"])
        .pagination(pagination)
        .validator(RequiredFields::new(["nick"]))
        .build()
        .unwrap()
}

fn list(query: &[(&str, &str)]) -> RequestContext {
    RequestContext::builder(Method::List)
        .query(query.iter().copied())
        .build()
        .unwrap()
}

fn payload(method: Method, body: Value) -> RequestContext {
    RequestContext::builder(method)
        .content_type("application/json")
        .body(body.to_string())
        .build()
        .unwrap()
}

async fn create(resource: &ResourceSpec, store: DynDocumentStoreRef<'_>, body: Value) -> MutationResult {
    let ctx = payload(Method::Create, body);
    let cleaned = resource.validate_request(&ctx, None).unwrap();
    resource.create_object(store, &ctx, cleaned, true).await.unwrap()
}

/// Five users aged 20, 25, 30, 35 and 40, every other one active.
async fn seeded() -> (DocumentStore<InMemoryStore>, ResourceSpec) {
    init_tracing();
    let store = DocumentStore::new(InMemoryStore::new());
    let resource = users(PaginationPolicy::default());
    for i in 0..5 {
        create(
            &resource,
            store.as_dyn(),
            json!({ "nick": format!("user{i}"), "years": 20 + i * 5, "active": i % 2 == 0 }),
        )
        .await;
    }
    (store, resource)
}

fn nicks(page: &Page<Object>) -> Vec<String> {
    page.items
        .iter()
        .filter_map(|object| object.get("nick").and_then(Bson::as_str).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn list_filters_orders_and_projects() {
    let (store, users) = seeded().await;
    let ctx = list(&[
        ("years__not__gt", "30"),
        ("_order_by", "-years"),
        ("_limit", "2"),
        ("_fields", "nick,years"),
    ]);

    let page = users.get_objects(store.as_dyn(), &ctx).await.unwrap();
    assert_eq!(nicks(&page), vec!["user2", "user1"]);
    assert_eq!(page.count, 3);
    assert_eq!(page.has_more, Some(true));

    let page = users.serialize_page(&page, &ctx, &RelatedObjects::new()).unwrap();
    assert_eq!(
        page.items,
        vec![
            json!({ "nick": "user2", "years": 30 }).as_object().cloned().unwrap(),
            json!({ "nick": "user1", "years": 25 }).as_object().cloned().unwrap(),
        ]
    );
}

#[tokio::test]
async fn filters_combine_with_and() {
    let (store, users) = seeded().await;

    let page = users
        .get_objects(store.as_dyn(), &list(&[("active", "true"), ("years__lte", "30"), ("_order_by", "nick")]))
        .await
        .unwrap();
    assert_eq!(nicks(&page), vec!["user0", "user2"]);

    let page = users
        .get_objects(store.as_dyn(), &list(&[("nick__startswith", "user3")]))
        .await
        .unwrap();
    assert_eq!(nicks(&page), vec!["user3"]);
    assert_eq!(page.has_more, Some(false));
}

#[tokio::test]
async fn limit_above_maximum_is_a_validation_error() {
    let (store, users) = seeded().await;

    let err = users
        .get_objects(store.as_dyn(), &list(&[("_limit", "10000")]))
        .await
        .unwrap_err();
    assert_eq!(
        serde_json_value(err.as_validation().unwrap()),
        json!({ "error": "The limit you set is larger than the maximum limit for this resource (max_limit = 100)." })
    );
}

fn serde_json_value(error: &ValidationError) -> Value {
    docrest::serde_json::to_value(error).unwrap()
}

#[tokio::test]
async fn unpaginated_resources_return_every_row() {
    let (store, _) = seeded().await;
    let users = users(PaginationPolicy::disabled());

    let page = users
        .get_objects(store.as_dyn(), &list(&[("_skip", "3"), ("_limit", "1")]))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.count, 5);
    assert_eq!(page.has_more, None);
}

#[tokio::test]
async fn updates_report_only_changed_fields() {
    let (store, users) = seeded().await;
    let object = users
        .get_objects(store.as_dyn(), &list(&[("nick", "user1")]))
        .await
        .unwrap()
        .items
        .remove(0);

    let ctx = payload(Method::Update, json!({ "nick": "user1", "years": 26 }));
    let cleaned = users.validate_request(&ctx, Some(&object)).unwrap();
    let updated = users.update_object(store.as_dyn(), &ctx, object, cleaned, true).await.unwrap();
    assert_eq!(updated.changed.into_iter().collect::<Vec<_>>(), vec!["age"]);
    assert_eq!(updated.object.get("age"), Some(&Bson::Int64(26)));

    let reloaded = users
        .get_object(store.as_dyn(), &updated.object.id().to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.get("age"), Some(&Bson::Int64(26)));
    assert_eq!(reloaded.get("active"), Some(&Bson::Boolean(false)));
}

#[tokio::test]
async fn missing_required_field_is_reported_per_field() {
    init_tracing();
    let users = users(PaginationPolicy::default());
    let ctx = payload(Method::Create, json!({ "years": 3 }));

    let err = users.validate_request(&ctx, None).unwrap_err();
    assert_eq!(
        serde_json_value(err.as_validation().unwrap()),
        json!({ "field-errors": { "nick": ["This field is required."] } })
    );
}

#[tokio::test]
async fn bulk_update_is_capped_and_writes_nothing_over_the_cap() {
    let (store, _) = seeded().await;
    let capped = users(PaginationPolicy { bulk_update_limit: 3, ..PaginationPolicy::default() });

    let ctx = payload(Method::BulkUpdate, json!({ "active": true, "_params": { "years__gt": "20" } }));
    let err = capped.bulk_update(store.as_dyn(), &ctx).await.unwrap_err();
    assert_eq!(
        err.as_validation().unwrap().errors,
        vec!["It's not allowed to update more than 3 objects at once"]
    );

    let active = capped
        .get_objects(store.as_dyn(), &list(&[("active", "true")]))
        .await
        .unwrap();
    assert_eq!(active.count, 3);

    let ctx = payload(Method::BulkUpdate, json!({ "active": true, "_params": { "years__gt": "30" } }));
    let results = capped.bulk_update(store.as_dyn(), &ctx).await.unwrap();
    let changed: Vec<_> = results.iter().filter(|r| !r.changed.is_empty()).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].object.get("nick"), Some(&Bson::from("user3")));
}

#[tokio::test]
async fn subtypes_are_created_and_served_by_their_child_resource() {
    init_tracing();
    let store = DocumentStore::new(InMemoryStore::new());
    let admin_schema = DocumentSchema::subtype("Admin", &user_schema())
        .scalar("level", ScalarType::Int)
        .build();
    let admins = Arc::new(
        ResourceSpec::builder("admins", admin_schema)
            .filter("level", [Operator::exact()])
            .build()
            .unwrap(),
    );
    let users = ResourceSpec::builder("users", user_schema())
        .child(admins.clone())
        .build()
        .unwrap();

    create(&users, store.as_dyn(), json!({ "nick": "alice" })).await;
    let root = create(&users, store.as_dyn(), json!({ "_cls": "Admin", "nick": "root", "level": 3 })).await;
    assert_eq!(root.object.doc_type(), "Admin");

    let everyone = users.get_objects(store.as_dyn(), &list(&[])).await.unwrap();
    assert_eq!(everyone.count, 2);

    let only_admins = admins.get_objects(store.as_dyn(), &list(&[])).await.unwrap();
    assert_eq!(nicks(&only_admins), vec!["root"]);

    let ctx = list(&[("_fields", "nick,level")]);
    let serialized = users.serialize(Some(&root.object), &ctx).unwrap();
    assert_eq!(Value::Object(serialized), json!({ "nick": "root", "level": 3 }));

    let alice = everyone.items.iter().find(|o| o.doc_type() == "User").unwrap();
    assert!(admins.get_object(store.as_dyn(), &alice.id().to_string()).await.unwrap().is_none());
}

#[tokio::test]
async fn references_serialize_as_uris_or_prefetched_objects() {
    init_tracing();
    let store = DocumentStore::new(InMemoryStore::new());
    let friends = Arc::new(
        ResourceSpec::builder("friends", user_schema())
            .fields(["nick"])
            .uri_prefix("/users/")
            .build()
            .unwrap(),
    );
    let users = ResourceSpec::builder("users", user_schema())
        .filter("nick", [Operator::exact()])
        .related("friend", friends)
        .build()
        .unwrap();

    let bob = create(&users, store.as_dyn(), json!({ "nick": "bob" })).await;
    let bob_id = bob.object.id().to_string();
    create(&users, store.as_dyn(), json!({ "nick": "alice", "friend": format!("/users/{bob_id}/") })).await;

    let ctx = list(&[("nick", "alice"), ("_fields", "friend")]);
    let page = users.get_objects(store.as_dyn(), &ctx).await.unwrap();

    let plain = users.serialize_page(&page, &ctx, &RelatedObjects::new()).unwrap();
    assert_eq!(plain.items[0]["friend"], json!(format!("/users/{bob_id}")));

    let related = users.fetch_related(store.as_dyn(), &page.items).await.unwrap();
    let expanded = users.serialize_page(&page, &ctx, &related).unwrap();
    assert_eq!(expanded.items[0]["friend"], json!({ "nick": "bob" }));
}

#[tokio::test]
async fn deleted_objects_are_no_longer_found() {
    let (store, users) = seeded().await;
    let page = users.get_objects(store.as_dyn(), &list(&[("nick", "user4")])).await.unwrap();
    let object = &page.items[0];

    users.delete_object(store.as_dyn(), object).await.unwrap();

    assert!(users.get_object(store.as_dyn(), &object.id().to_string()).await.unwrap().is_none());
    assert_eq!(users.get_objects(store.as_dyn(), &list(&[])).await.unwrap().count, 4);
}

#[tokio::test]
async fn resources_load_from_configuration() {
    let (store, _) = seeded().await;
    let config = ResourceConfig::from_json(
        r#"{
            "pagination": { "enabled": true, "default_limit": 2, "max_limit": 3 },
            "rename_fields": { "age": "years" },
            "filters": { "years": ["exact", { "op": "gt", "negatable": true }] },
            "allowed_ordering": ["years"],
            "filter_policy": "strict"
        }"#,
    )
    .unwrap();
    let users = ResourceSpec::builder("users", user_schema())
        .with_config(config, &OperatorRegistry::standard())
        .unwrap()
        .build()
        .unwrap();

    let page = users
        .get_objects(store.as_dyn(), &list(&[("years__gt", "20"), ("_order_by", "years")]))
        .await
        .unwrap();
    assert_eq!(nicks(&page), vec!["user1", "user2"]);
    assert_eq!(page.has_more, Some(true));

    let err = users
        .get_objects(store.as_dyn(), &list(&[("nick", "user1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::InvalidFilter(_)));
}
