//! Integration helpers for driving the sample app.

use docsim_core::{CoreError, CoreResult, JobState, ScheduledJob, TestHarness, Value, END_CURSOR};

use crate::fixtures::message;

const MAX_PAGES: usize = 10_000;

/// Sends every `(author, body)` pair and returns the new ids in order.
pub async fn send_messages(t: &TestHarness, batch: &[(String, String)]) -> CoreResult<Vec<String>> {
    let mut ids = Vec::with_capacity(batch.len());
    for (author, body) in batch {
        let id = t.mutation("messages:send", message(author, body)).await?;
        ids.push(id.as_str().unwrap_or_default().to_string());
    }
    Ok(ids)
}

/// Walks `messages:page` from the start until `isDone`, returning the ids
/// of every document seen, page by page.
pub async fn collect_all_pages(t: &TestHarness, page_size: usize) -> CoreResult<Vec<String>> {
    let mut cursor = Value::Null;
    let mut seen = Vec::new();
    for _ in 0..MAX_PAGES {
        let result = t
            .query(
                "messages:page",
                Value::object([
                    ("numItems", Value::Float64(page_size as f64)),
                    ("cursor", cursor.clone()),
                ]),
            )
            .await?;
        let page = result.get("page").cloned().unwrap_or(Value::Array(vec![]));
        if page.as_array().map_or(0, <[Value]>::len) > page_size {
            return Err(CoreError::handler("page larger than requested"));
        }
        seen.extend(ids(&page));

        let done = result.get("isDone").and_then(Value::as_bool).unwrap_or(true);
        let next = result
            .get("continueCursor")
            .cloned()
            .unwrap_or(Value::Null);
        if done {
            if next.as_str() != Some(END_CURSOR) {
                return Err(CoreError::handler("finished page without the end cursor"));
            }
            return Ok(seen);
        }
        cursor = next;
    }
    Err(CoreError::handler("pagination did not finish"))
}

/// `_id` of every document in an array value.
pub fn ids(documents: &Value) -> Vec<String> {
    field_values(documents, "_id")
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Values of `field` in every document of an array value; documents without
/// the field are skipped.
pub fn field_values(documents: &Value, field: &str) -> Vec<Value> {
    documents
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|doc| doc.get(field).cloned())
        .collect()
}

/// The scheduled job with id `job`, from any component.
pub async fn find_job(t: &TestHarness, job: &Value) -> CoreResult<Option<ScheduledJob>> {
    let wanted = job.as_str().unwrap_or_default();
    Ok(t
        .scheduled_jobs()
        .await?
        .into_iter()
        .find(|j| j.id.as_str() == wanted))
}

/// The state of the scheduled job with id `job`.
pub async fn job_state(t: &TestHarness, job: &Value) -> CoreResult<JobState> {
    find_job(t, job)
        .await?
        .map(|j| j.state)
        .ok_or_else(|| CoreError::document_not_found(job))
}

/// Messages written to the `logs` table by scheduled functions.
pub async fn logs(t: &TestHarness) -> CoreResult<Vec<String>> {
    let logs = t.query("jobs:logs", Value::empty_object()).await?;
    Ok(logs
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}
