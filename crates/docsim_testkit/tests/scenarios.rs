//! End-to-end scenarios over the sample app.

use docsim_core::{JobState, Value};
use docsim_testkit::prelude::*;
use std::time::Duration;
use tokio::task::JoinSet;

#[tokio::test]
async fn index_equality_returns_matching_documents_in_insertion_order() {
    let t = app_harness();
    let first = t.mutation("messages:send", message("sarah", "hello1")).await.unwrap();
    t.mutation("messages:send", message("michal", "boo")).await.unwrap();
    let second = t.mutation("messages:send", message("sarah", "hello2")).await.unwrap();

    let docs = t
        .query(
            "messages:byAuthor",
            Value::object([("author", Value::from("sarah"))]),
        )
        .await
        .unwrap();

    assert_eq!(
        ids(&docs),
        vec![first.as_str().unwrap(), second.as_str().unwrap()]
    );
    assert_eq!(
        field_values(&docs, "body"),
        vec![Value::from("hello1"), Value::from("hello2")]
    );
}

#[tokio::test]
async fn unset_field_is_absent_but_null_field_is_present() {
    let t = app_harness();
    let cleared = t.mutation("messages:send", message("sarah", "a")).await.unwrap();
    let nulled = t.mutation("messages:send", message("sarah", "b")).await.unwrap();

    t.mutation("messages:clearBody", id_args(&cleared)).await.unwrap();
    t.mutation("messages:nullBody", id_args(&nulled)).await.unwrap();

    let cleared = t.query("messages:get", id_args(&cleared)).await.unwrap();
    let nulled = t.query("messages:get", id_args(&nulled)).await.unwrap();
    assert!(cleared.get("body").is_none());
    assert!(cleared.get("author").is_some());
    assert_eq!(nulled.get("body"), Some(&Value::Null));
}

#[tokio::test(start_paused = true)]
async fn delayed_job_stays_pending_until_its_time() {
    let t = app_harness();
    let job = t
        .mutation(
            "jobs:scheduleLog",
            Value::object([
                ("delayMs", Value::Float64(10_000.0)),
                ("message", Value::from("later")),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(job_state(&t, &job).await.unwrap(), JobState::Pending);

    t.advance_timers(Duration::from_millis(5_000)).await;
    t.finish_in_progress_scheduled_functions().await;
    assert_eq!(job_state(&t, &job).await.unwrap(), JobState::Pending);
    assert!(logs(&t).await.unwrap().is_empty());

    t.advance_timers(Duration::from_millis(5_000)).await;
    t.finish_in_progress_scheduled_functions().await;
    assert_eq!(job_state(&t, &job).await.unwrap(), JobState::Success);
    assert_eq!(logs(&t).await.unwrap(), vec!["later"]);

    let finished = find_job(&t, &job).await.unwrap().unwrap();
    assert_eq!(finished.name, "jobs:log");
    assert!(finished.completed_time.is_some());
}

#[tokio::test]
async fn concurrent_mutations_do_not_lose_updates() {
    let t = app_harness();
    let id = t.mutation("messages:send", message("sarah", "hello")).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let t = t.clone();
        let args = id_args(&id);
        tasks.spawn(async move { t.mutation("messages:appendBang", args).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let doc = t.query("messages:get", id_args(&id)).await.unwrap();
    assert_eq!(doc.get("body"), Some(&Value::from("hello!!!!!!!!!!")));
}

#[tokio::test]
async fn vector_search_ranks_by_similarity_with_stable_ties() {
    let t = app_harness();
    let mut inserted = Vec::new();
    for (label, vector) in [
        ("a", [1.0, 1.0, 1.0]),
        ("b", [0.0, 0.0, 0.0]),
        ("c", [1.0, 1.0, 0.0]),
        ("d", [1.0, 1.0, 0.0]),
    ] {
        inserted.push(
            t.mutation("vectors:insert", embedding(label, vector))
                .await
                .unwrap(),
        );
    }

    let results = t
        .action(
            "vectors:search",
            Value::object([
                (
                    "vector",
                    Value::Array(vec![Value::Float64(1.0); 3]),
                ),
                ("limit", Value::Float64(3.0)),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(
        ids(&results),
        vec![
            inserted[0].as_str().unwrap(),
            inserted[2].as_str().unwrap(),
            inserted[3].as_str().unwrap(),
        ]
    );
    let scores: Vec<f64> = field_values(&results, "_score")
        .iter()
        .filter_map(Value::as_f64)
        .collect();
    assert!((scores[0] - 1.0).abs() < 1e-9);
    assert!((scores[1] - scores[2]).abs() < 1e-12);
    assert!(scores[1] < scores[0]);
}

#[tokio::test]
async fn vector_search_applies_filter_fields() {
    let t = app_harness();
    t.mutation("vectors:insert", embedding("keep", [1.0, 0.0, 0.0]))
        .await
        .unwrap();
    let other = t
        .mutation("vectors:insert", embedding("other", [1.0, 0.0, 0.0]))
        .await
        .unwrap();

    let results = t
        .action(
            "vectors:search",
            Value::object([
                (
                    "vector",
                    Value::Array(vec![
                        Value::Float64(1.0),
                        Value::Float64(0.0),
                        Value::Float64(0.0),
                    ]),
                ),
                ("label", Value::from("other")),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(ids(&results), vec![other.as_str().unwrap()]);
}

#[tokio::test]
async fn vector_search_rejects_wrong_dimensions() {
    let t = app_harness();
    let err = t
        .action(
            "vectors:search",
            Value::object([("vector", Value::Array(vec![Value::Float64(1.0)]))]),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dimensions"), "{err}");
}
