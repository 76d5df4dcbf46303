//! Query planning, index ranges, search and pagination through the harness.

use docsim_core::{
    v, CoreError, ModuleRegistry, Order, Schema, TableDefinition, TestHarness, Value,
};
use docsim_testkit::prelude::*;
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// A harness whose only table has a three-field index.
fn grid_harness() -> TestHarness {
    init_tracing();
    let schema = Schema::new().table(
        "grid",
        TableDefinition::new(v::object([
            ("f0", v::number()),
            ("f1", v::number()),
            ("f2", v::number()),
        ]))
        .index("by_f", ["f0", "f1", "f2"]),
    );
    TestHarness::new(Some(schema), ModuleRegistry::new())
}

async fn seed(t: &TestHarness, batch: &[(&str, &str)]) -> Vec<String> {
    let owned: Vec<(String, String)> = batch
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
    send_messages(t, &owned).await.unwrap()
}

#[tokio::test]
async fn range_on_index_orders_by_key_then_creation() {
    let t = app_harness();
    let ids = seed(
        &t,
        &[("lee", "1"), ("ana", "2"), ("michal", "3"), ("lee", "4"), ("sarah", "5")],
    )
    .await;

    let found = t
        .run(|ctx| async move {
            ctx.db
                .query("messages")
                .with_index("by_author", |q| q.gte("author", "b").lt("author", "n"))
                .collect()
        })
        .await
        .unwrap();
    let found: Vec<&str> = found.iter().map(|d| d.id().as_str()).collect();
    assert_eq!(found, vec![ids[0].as_str(), ids[3].as_str(), ids[2].as_str()]);
}

#[tokio::test]
async fn descending_scan_and_filters() {
    let t = app_harness();
    let ids = seed(&t, &[("lee", "a"), ("ana", "b"), ("lee", "c")]).await;

    let (desc, lees, first, unique) = t
        .run(|ctx| async move {
            let desc = ctx.db.query("messages").order(Order::Desc).collect()?;
            let lees = ctx
                .db
                .query("messages")
                .filter(|q| q.eq(q.field("author"), "lee"))
                .collect()?;
            let first = ctx.db.query("messages").first()?;
            let unique = ctx
                .db
                .query("messages")
                .filter(|q| q.eq(q.field("author"), "ana"))
                .unique()?;
            Ok::<_, CoreError>((desc, lees, first, unique))
        })
        .await
        .unwrap();

    let desc: Vec<&str> = desc.iter().map(|d| d.id().as_str()).collect();
    assert_eq!(desc, vec![ids[2].as_str(), ids[1].as_str(), ids[0].as_str()]);
    assert_eq!(lees.len(), 2);
    assert_eq!(first.map(|d| d.id().to_string()), Some(ids[0].clone()));
    assert_eq!(unique.map(|d| d.id().to_string()), Some(ids[1].clone()));
}

#[tokio::test]
async fn unique_fails_on_several_matches() {
    let t = app_harness();
    seed(&t, &[("lee", "a"), ("lee", "b")]).await;
    let err = t
        .run(|ctx| async move { ctx.db.query("messages").unique() })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery { .. }), "{err}");
}

#[tokio::test]
async fn order_twice_is_rejected() {
    let t = app_harness();
    let err = t
        .run(|ctx| async move {
            ctx.db
                .query("messages")
                .order(Order::Asc)
                .order(Order::Desc)
                .collect()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery { .. }), "{err}");
}

#[tokio::test]
async fn unknown_index_is_reported() {
    let t = app_harness();
    let err = t
        .run(|ctx| async move {
            ctx.db
                .query("messages")
                .with_index("by_body", |q| q)
                .collect()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::IndexNotFound { .. }), "{err}");
}

#[tokio::test]
async fn search_matches_prefixes_and_filters() {
    let t = app_harness();
    let ids = seed(
        &t,
        &[("sarah", "hello world"), ("lee", "help me"), ("sarah", "goodbye")],
    )
    .await;

    let all = t
        .query("messages:search", Value::object([("query", Value::from("hel"))]))
        .await
        .unwrap();
    let mut found = docsim_testkit::ids(&all);
    found.sort();
    let mut expected = vec![ids[0].clone(), ids[1].clone()];
    expected.sort();
    assert_eq!(found, expected);

    let sarah = t
        .query(
            "messages:search",
            Value::object([
                ("query", Value::from("HEL")),
                ("author", Value::from("sarah")),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(docsim_testkit::ids(&sarah), vec![ids[0].clone()]);

    let none = t
        .query("messages:search", Value::object([("query", Value::from("hello mars"))]))
        .await
        .unwrap();
    assert!(docsim_testkit::ids(&none).is_empty());
}

#[tokio::test]
async fn pagination_rejects_empty_pages_and_ends_on_unknown_cursor() {
    let t = app_harness();
    seed(&t, &[("lee", "a")]).await;

    let err = t
        .query("messages:page", Value::object([("numItems", Value::Float64(0.0))]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery { .. }), "{err}");

    let page = t
        .query(
            "messages:page",
            Value::object([
                ("numItems", Value::Float64(5.0)),
                ("cursor", Value::from("999;messages")),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(page.get("isDone"), Some(&Value::Boolean(true)));
    assert!(docsim_testkit::ids(page.get("page").unwrap()).is_empty());
}

#[tokio::test]
async fn query_calls_are_counted_per_function() {
    let t = app_harness();
    t.query("messages:list", Value::empty_object()).await.unwrap();
    t.query("messages:list", Value::empty_object()).await.unwrap();
    t.query("jobs:logs", Value::empty_object()).await.unwrap();

    assert_eq!(t.query_call_count("messages:list").unwrap(), 2);
    assert_eq!(t.query_call_count("jobs:logs").unwrap(), 1);
    assert_eq!(t.query_call_count("messages:byAuthor").unwrap(), 0);

    t.reset_query_call_counts();
    assert_eq!(t.query_call_count("messages:list").unwrap(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pagination_visits_every_document_once(
        batch in message_batch_strategy(20),
        page_size in page_size_strategy(),
    ) {
        let (sent, paged) = block_on(async {
            let t = app_harness();
            let sent = send_messages(&t, &batch).await.unwrap();
            let paged = collect_all_pages(&t, page_size).await.unwrap();
            (sent, paged)
        });
        prop_assert_eq!(paged, sent);
    }

    #[test]
    fn index_chains_are_accepted_exactly_when_well_formed(
        steps in prop_oneof![range_chain_strategy(3), valid_range_chain_strategy(3)],
    ) {
        let chain = steps.clone();
        let accepted = block_on(async move {
            let t = grid_harness();
            t.run(|ctx| async move {
                ctx.db
                    .query("grid")
                    .with_index("by_f", |_| build_chain(&chain))
                    .collect()
            })
            .await
            .is_ok()
        });
        prop_assert_eq!(accepted, is_valid_chain(&steps, 3), "{:?}", steps);
    }
}
