//! Test fixtures: a sample app schema, its modules and harness helpers.
//!
//! The app has four tables:
//! - `messages` (`author`, optional `body`), indexed on `author` and
//!   searchable on `body`
//! - `logs`, written by scheduled functions
//! - `embeddings`, with a 3-dimensional vector index
//! - `counters`, only in the `counter` component

use docsim_core::{
    action, http_action, mutation, query, v, CoreError, CoreResult, DatabaseReader, DocumentId,
    FilterBuilder, FunctionReference, HttpResponse, HttpRouter, Method, Module, ModuleRegistry,
    PaginationOptions, Patch, Schema, TableDefinition, TestHarness, UserIdentity, Value,
    VectorSearchQuery, SCHEDULED_FUNCTIONS_TABLE,
};
use std::time::Duration;

/// Path the counter component is registered under.
pub const COUNTER_COMPONENT: &str = "counter";

/// Schema of the root component.
pub fn app_schema() -> Schema {
    Schema::new()
        .table(
            "messages",
            TableDefinition::new(v::object([
                ("author", v::string()),
                ("body", v::optional(v::union([v::string(), v::null()]))),
            ]))
            .index("by_author", ["author"])
            .search_index("search_body", "body", ["author"]),
        )
        .table("logs", TableDefinition::new(v::object([("message", v::string())])))
        .table(
            "embeddings",
            TableDefinition::new(v::object([
                ("label", v::string()),
                ("vector", v::array(v::number())),
            ]))
            .vector_index("by_vector", "vector", 3, ["label"]),
        )
}

/// Schema of the counter component.
pub fn counter_schema() -> Schema {
    Schema::new().table(
        "counters",
        TableDefinition::new(v::object([("count", v::number())])),
    )
}

fn arg_str<'a>(args: &'a Value, key: &str) -> CoreResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::handler(format!("missing string argument `{key}`")))
}

fn arg_f64(args: &Value, key: &str) -> CoreResult<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| CoreError::handler(format!("missing number argument `{key}`")))
}

fn arg_id(db: &DatabaseReader, args: &Value, table: &str) -> CoreResult<DocumentId> {
    let raw = arg_str(args, "id")?;
    db.normalize_id(table, raw)
        .ok_or_else(|| CoreError::handler(format!("`{raw}` is not an id of `{table}`")))
}

fn documents(docs: Vec<docsim_core::Document>) -> Value {
    Value::Array(docs.iter().map(Value::from).collect())
}

fn messages_module() -> Module {
    Module::new()
        .export(
            "send",
            mutation(|ctx, args| async move {
                Ok(Value::from(ctx.db.insert("messages", args)?))
            })
            .args(v::object([("author", v::string()), ("body", v::string())])),
        )
        .export(
            "list",
            query(|ctx, _args| async move {
                Ok(documents(ctx.db.query("messages").collect()?))
            }),
        )
        .export(
            "byAuthor",
            query(|ctx, args| async move {
                let author = arg_str(&args, "author")?.to_string();
                let docs = ctx
                    .db
                    .query("messages")
                    .with_index("by_author", |q| q.eq("author", author))
                    .collect()?;
                Ok(documents(docs))
            })
            .args(v::object([("author", v::string())])),
        )
        .export(
            "search",
            query(|ctx, args| async move {
                let text = arg_str(&args, "query")?.to_string();
                let author = args.get("author").and_then(Value::as_str).map(str::to_string);
                let docs = ctx
                    .db
                    .query("messages")
                    .with_search_index("search_body", |q| {
                        let q = q.search("body", text);
                        match author {
                            Some(author) => q.eq("author", author),
                            None => q,
                        }
                    })
                    .collect()?;
                Ok(documents(docs))
            })
            .args(v::object([
                ("query", v::string()),
                ("author", v::optional(v::string())),
            ])),
        )
        .export(
            "page",
            query(|ctx, args| async move {
                let num_items = arg_f64(&args, "numItems")? as usize;
                let options = match args.get("cursor").and_then(Value::as_str) {
                    Some(cursor) => PaginationOptions::after(cursor, num_items),
                    None => PaginationOptions::first(num_items),
                };
                Ok(ctx.db.query("messages").paginate(options)?.to_value())
            })
            .args(v::object([
                ("numItems", v::number()),
                ("cursor", v::optional(v::union([v::string(), v::null()]))),
            ])),
        )
        .export(
            "get",
            query(|ctx, args| async move {
                let id = arg_id(&ctx.db, &args, "messages")?;
                Ok(ctx.db.get(&id)?.map_or(Value::Null, Value::from))
            }),
        )
        .export(
            "clearBody",
            mutation(|ctx, args| async move {
                let id = arg_id(&ctx.db, &args, "messages")?;
                ctx.db.patch(&id, &Patch::new().unset("body"))?;
                Ok(Value::Null)
            }),
        )
        .export(
            "nullBody",
            mutation(|ctx, args| async move {
                let id = arg_id(&ctx.db, &args, "messages")?;
                ctx.db.patch(&id, &Patch::new().set("body", Value::Null))?;
                Ok(Value::Null)
            }),
        )
        .export(
            "appendBang",
            mutation(|ctx, args| async move {
                let id = arg_id(&ctx.db, &args, "messages")?;
                let doc = ctx
                    .db
                    .get(&id)?
                    .ok_or_else(|| CoreError::document_not_found(&id))?;
                let body = doc.get_str("body").unwrap_or_default().to_string();
                // let other callers run between the read and the write
                tokio::task::yield_now().await;
                ctx.db.patch(&id, &Patch::new().set("body", format!("{body}!")))?;
                Ok(Value::Null)
            }),
        )
        .export(
            "sendThenFail",
            mutation(|ctx, args| async move {
                ctx.db.insert("messages", args)?;
                Err(CoreError::handler("failed after insert"))
            }),
        )
        .export(
            "sendAndCount",
            mutation(|ctx, args| async move {
                ctx.db.insert("messages", args)?;
                let listed = ctx.run_query("messages:list", Value::empty_object()).await?;
                let count = listed.as_array().map_or(0, <[Value]>::len);
                Ok(Value::Float64(count as f64))
            }),
        )
        .export(
            "sendPair",
            action(|ctx, args| async move {
                let author = arg_str(&args, "author")?.to_string();
                let first = Value::object([
                    ("author", Value::from(author.as_str())),
                    ("body", Value::from(arg_str(&args, "first")?)),
                ]);
                let second = Value::object([
                    ("author", Value::from(author.as_str())),
                    ("body", Value::from(arg_str(&args, "second")?)),
                ]);
                let (a, b) = tokio::try_join!(
                    ctx.run_mutation("messages:send", first),
                    ctx.run_mutation("messages:send", second),
                )?;
                Ok(Value::Array(vec![a, b]))
            }),
        )
        .export(
            "sendThenFailInAction",
            action(|ctx, args| async move {
                ctx.run_mutation("messages:send", args).await?;
                Err(CoreError::handler("action failed"))
            }),
        )
}

fn jobs_module() -> Module {
    Module::new()
        .export(
            "log",
            mutation(|ctx, args| async move {
                ctx.db.insert("logs", args)?;
                Ok(Value::Null)
            })
            .args(v::object([("message", v::string())])),
        )
        .export(
            "fail",
            mutation(|_ctx, _args| async move { Err(CoreError::handler("job failed")) }),
        )
        .export(
            "scheduleLog",
            mutation(|ctx, args| async move {
                let delay = Duration::from_millis(arg_f64(&args, "delayMs")? as u64);
                let message = arg_str(&args, "message")?;
                let job = ctx.scheduler.run_after(
                    delay,
                    "jobs:log",
                    Value::object([("message", Value::from(message))]),
                )?;
                Ok(Value::from(job))
            }),
        )
        .export(
            "scheduleLogAt",
            mutation(|ctx, args| async move {
                let at = arg_f64(&args, "timestampMs")?;
                let message = arg_str(&args, "message")?;
                let job = ctx.scheduler.run_at(
                    at,
                    "jobs:log",
                    Value::object([("message", Value::from(message))]),
                )?;
                Ok(Value::from(job))
            }),
        )
        .export(
            "scheduleFailure",
            mutation(|ctx, _args| async move {
                let job = ctx
                    .scheduler
                    .run_after(Duration::ZERO, "jobs:fail", Value::empty_object())?;
                Ok(Value::from(job))
            }),
        )
        .export(
            "scheduleThenFail",
            mutation(|ctx, _args| async move {
                ctx.scheduler.run_after(
                    Duration::ZERO,
                    "jobs:log",
                    Value::object([("message", Value::from("never"))]),
                )?;
                Err(CoreError::handler("rolled back"))
            }),
        )
        .export(
            "cancel",
            mutation(|ctx, args| async move {
                let raw = arg_str(&args, "id")?;
                let id = DocumentId::parse(raw)?;
                ctx.scheduler.cancel(&id)?;
                Ok(Value::Null)
            }),
        )
        .export(
            "chain",
            mutation(|ctx, args| async move {
                let remaining = arg_f64(&args, "remaining")?;
                ctx.db.insert(
                    "logs",
                    Value::object([("message", Value::from(format!("chain {remaining}")))]),
                )?;
                if remaining > 0.0 {
                    ctx.scheduler.run_after(
                        Duration::from_secs(1),
                        "jobs:chain",
                        Value::object([("remaining", Value::Float64(remaining - 1.0))]),
                    )?;
                }
                Ok(Value::Null)
            }),
        )
        .export(
            "forever",
            mutation(|ctx, _args| async move {
                ctx.scheduler
                    .run_after(Duration::from_secs(1), "jobs:forever", Value::empty_object())?;
                Ok(Value::Null)
            }),
        )
        .export(
            "scheduleQuery",
            mutation(|ctx, _args| async move {
                let job = ctx
                    .scheduler
                    .run_after(Duration::ZERO, "jobs:logs", Value::empty_object())?;
                Ok(Value::from(job))
            }),
        )
        .export(
            "scheduleFromAction",
            action(|ctx, args| async move {
                let delay = Duration::from_millis(arg_f64(&args, "delayMs")? as u64);
                let job = ctx.scheduler.run_after(
                    delay,
                    "jobs:log",
                    Value::object([("message", Value::from("from action"))]),
                )?;
                Ok(Value::from(job))
            }),
        )
        .export(
            "logs",
            query(|ctx, _args| async move {
                let docs = ctx.db.query("logs").collect()?;
                Ok(Value::Array(
                    docs.iter()
                        .filter_map(|d| d.get("message"))
                        .collect(),
                ))
            }),
        )
        .export(
            "jobs",
            query(|ctx, _args| async move {
                Ok(documents(
                    ctx.db.system().query(SCHEDULED_FUNCTIONS_TABLE).collect()?,
                ))
            }),
        )
}

fn vectors_module() -> Module {
    Module::new()
        .export(
            "insert",
            mutation(|ctx, args| async move {
                Ok(Value::from(ctx.db.insert("embeddings", args)?))
            }),
        )
        .export(
            "search",
            action(|ctx, args| async move {
                let vector: Vec<f64> = args
                    .get("vector")
                    .and_then(Value::as_array)
                    .ok_or_else(|| CoreError::handler("missing `vector`"))?
                    .iter()
                    .filter_map(Value::as_f64)
                    .collect();
                let mut request = VectorSearchQuery::new(vector);
                if let Some(limit) = args.get("limit").and_then(Value::as_f64) {
                    request = request.limit(limit as usize);
                }
                if let Some(label) = args.get("label").and_then(Value::as_str) {
                    request = request.filter(FilterBuilder.eq(FilterBuilder.field("label"), label));
                }
                let results = ctx.vector_search("embeddings", "by_vector", request).await?;
                Ok(Value::Array(
                    results
                        .into_iter()
                        .map(|r| {
                            Value::object([
                                ("_id", Value::from(r.id)),
                                ("_score", Value::Float64(r.score)),
                            ])
                        })
                        .collect(),
                ))
            }),
        )
}

fn files_module() -> Module {
    Module::new()
        .export(
            "store",
            action(|ctx, args| async move {
                let text = arg_str(&args, "text")?;
                let content_type = args.get("contentType").and_then(Value::as_str);
                Ok(Value::from(ctx.storage.store(text.as_bytes(), content_type)?))
            }),
        )
        .export(
            "read",
            action(|ctx, args| async move {
                let id = arg_str(&args, "id")?;
                Ok(ctx
                    .storage
                    .get(id)
                    .map_or(Value::Null, |bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned())))
            }),
        )
        .export(
            "storeThenFail",
            action(|ctx, args| async move {
                ctx.storage.store(arg_str(&args, "text")?.as_bytes(), None)?;
                Err(CoreError::handler("upload aborted"))
            }),
        )
        .export(
            "url",
            query(|ctx, args| async move {
                Ok(ctx
                    .storage
                    .get_url(arg_str(&args, "id")?)
                    .map_or(Value::Null, Value::from))
            }),
        )
        .export(
            "metadata",
            query(|ctx, args| async move {
                Ok(ctx
                    .storage
                    .get_metadata(arg_str(&args, "id")?)
                    .map_or(Value::Null, |m| {
                        Value::object([
                            ("storageId", Value::from(m.storage_id)),
                            ("sha256", Value::from(m.sha256)),
                            ("size", Value::Float64(m.size as f64)),
                            (
                                "contentType",
                                m.content_type.map_or(Value::Null, Value::from),
                            ),
                        ])
                    }))
            }),
        )
        .export(
            "remove",
            mutation(|ctx, args| async move {
                ctx.storage.delete(arg_str(&args, "id")?)?;
                Ok(Value::Null)
            }),
        )
}

fn identity_value(identity: Option<&UserIdentity>) -> CoreResult<Value> {
    match identity {
        Some(identity) => serde_json::to_value(identity)
            .map(Value::from_json)
            .map_err(|e| CoreError::handler(e.to_string())),
        None => Ok(Value::Null),
    }
}

fn users_module() -> Module {
    Module::new()
        .export(
            "whoami",
            query(|ctx, _args| async move { identity_value(ctx.auth.get_user_identity()) }),
        )
        .export(
            "whoamiNested",
            action(|ctx, _args| async move {
                ctx.run_query("users:whoami", Value::empty_object()).await
            }),
        )
        .export(
            "scheduleWhoami",
            mutation(|ctx, _args| async move {
                ctx.scheduler
                    .run_after(Duration::ZERO, "users:recordIdentity", Value::empty_object())?;
                Ok(Value::Null)
            }),
        )
        .export(
            "recordIdentity",
            mutation(|ctx, _args| async move {
                let seen = match ctx.auth.get_user_identity() {
                    Some(_) => "someone",
                    None => "nobody",
                };
                ctx.db
                    .insert("logs", Value::object([("message", Value::from(seen))]))?;
                Ok(Value::Null)
            }),
        )
}

fn components_module() -> Module {
    Module::new()
        .export(
            "addToCounter",
            action(|ctx, args| async move {
                ctx.run_mutation(FunctionReference::component(COUNTER_COMPONENT, "lib:add"), args)
                    .await?;
                ctx.run_query(
                    FunctionReference::component(COUNTER_COMPONENT, "lib:total"),
                    Value::empty_object(),
                )
                .await
            }),
        )
        .export(
            "counterHandle",
            action(|ctx, _args| async move {
                let handle = ctx
                    .create_function_handle(FunctionReference::component(COUNTER_COMPONENT, "lib:add"))?;
                Ok(Value::from(handle))
            }),
        )
        .export(
            "callHandle",
            action(|ctx, args| async move {
                let handle = arg_str(&args, "handle")?.to_string();
                ctx.run_mutation(
                    FunctionReference::handle(handle),
                    Value::object([("count", Value::Float64(1.0))]),
                )
                .await
            }),
        )
        .export(
            "countMessages",
            query(|ctx, _args| async move {
                let docs = ctx.db.query("messages").collect()?;
                Ok(Value::Float64(docs.len() as f64))
            }),
        )
}

/// Modules of the counter component.
pub fn counter_modules() -> ModuleRegistry {
    ModuleRegistry::new().module("lib", || {
        Module::new()
            .export(
                "add",
                mutation(|ctx, args| async move {
                    ctx.db.insert("counters", args)?;
                    Ok(Value::Null)
                })
                .args(v::object([("count", v::number())])),
            )
            .export(
                "total",
                query(|ctx, _args| async move {
                    let total: f64 = ctx
                        .db
                        .query("counters")
                        .collect()?
                        .iter()
                        .filter_map(|d| d.get("count").and_then(|c| c.as_f64()))
                        .sum();
                    Ok(Value::Float64(total))
                }),
            )
            .export(
                "countMessages",
                query(|ctx, _args| async move {
                    let docs = ctx.db.query("messages").collect()?;
                    Ok(Value::Float64(docs.len() as f64))
                }),
            )
    })
}

fn http_router() -> CoreResult<HttpRouter> {
    HttpRouter::new()
        .route(
            Method::Get,
            "/hello",
            http_action(|_ctx, _request| async move { Ok(HttpResponse::text("hello")) }),
        )?
        .route_prefix(
            Method::Post,
            "/echo/",
            http_action(|_ctx, request| async move {
                Ok(HttpResponse::text(request.text()).header("x-path", request.route_path()))
            }),
        )?
        .route(
            Method::Get,
            "/messages",
            http_action(|ctx, _request| async move {
                let messages = ctx.run_query("messages:list", Value::empty_object()).await?;
                Ok(HttpResponse::json(&messages.to_json()))
            }),
        )?
        .route(
            Method::Post,
            "/messages",
            http_action(|ctx, request| async move {
                let body = Value::from_json(request.json()?);
                let id = ctx.run_mutation("messages:send", body).await?;
                Ok(HttpResponse::new(201).with_body(id.as_str().unwrap_or_default().to_string()))
            }),
        )
}

/// Modules of the root component, with its HTTP router.
pub fn app_modules() -> CoreResult<ModuleRegistry> {
    Ok(ModuleRegistry::new()
        .module("messages", messages_module)
        .module("jobs", jobs_module)
        .module("vectors", vectors_module)
        .module("files", files_module)
        .module("users", users_module)
        .module("components", components_module)
        .http_router(http_router()?))
}

/// A harness over the sample app, with tracing installed.
pub fn app_harness() -> TestHarness {
    crate::init_tracing();
    let modules = app_modules().expect("fixture router is valid");
    TestHarness::new(Some(app_schema()), modules)
}

/// [`app_harness`] plus the counter component.
pub fn app_harness_with_counter() -> TestHarness {
    let t = app_harness();
    t.register_component(COUNTER_COMPONENT, Some(counter_schema()), counter_modules())
        .expect("no transaction is open");
    t
}

/// Builds a `messages` document value.
pub fn message(author: &str, body: &str) -> Value {
    Value::object([("author", Value::from(author)), ("body", Value::from(body))])
}

/// Builds an `embeddings` document value.
pub fn embedding(label: &str, vector: [f64; 3]) -> Value {
    Value::object([
        ("label", Value::from(label)),
        (
            "vector",
            Value::Array(vector.iter().map(|x| Value::Float64(*x)).collect()),
        ),
    ])
}

/// Builds `{id}` arguments.
pub fn id_args(id: &Value) -> Value {
    Value::object([("id", id.clone())])
}
