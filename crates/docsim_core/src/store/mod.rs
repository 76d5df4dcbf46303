//! Per-component document storage with nested write layers.
//!
//! A [`DocumentStore`] keeps committed documents per table plus a stack of
//! uncommitted [`WriteLayer`]s. Reads look through the layers innermost first,
//! so a transaction always sees its own writes. Committing the innermost layer
//! folds it into its parent, or into committed state when it is the last one.

mod layer;

pub use layer::{LayerStack, PendingWrite, WriteLayer};

use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use crate::types::{Document, Patch};
use docsim_values::identifier::{
    is_system_table, validate_field_name, validate_nested_fields, validate_table_name,
};
use docsim_values::{DocumentId, Value, CREATION_TIME_FIELD, ID_FIELD};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Who is performing a write. System writes skip naming rules and schema
/// validation and may target `_`-prefixed tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    System,
}

#[derive(Debug, Default)]
struct StoreState {
    committed: BTreeMap<String, BTreeMap<DocumentId, Document>>,
    layers: LayerStack,
    next_sequence: u64,
    last_creation_time: f64,
}

impl StoreState {
    fn lookup(&self, id: &DocumentId) -> Option<Document> {
        match self.layers.lookup(id) {
            Some(PendingWrite::Put(doc)) => Some(doc.clone()),
            Some(PendingWrite::Delete) => None,
            None => self
                .committed
                .get(id.table())
                .and_then(|docs| docs.get(id))
                .cloned(),
        }
    }

    fn next_id(&mut self, table: &str) -> DocumentId {
        self.next_sequence += 1;
        DocumentId::new(self.next_sequence, table)
    }

    /// Wall-clock milliseconds, nudged forward so creation times are strictly
    /// increasing within a store.
    fn next_creation_time(&mut self) -> f64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or_default();
        let time = if now > self.last_creation_time {
            now
        } else {
            self.last_creation_time + 0.001
        };
        self.last_creation_time = time;
        time
    }

    fn apply(&mut self, layer: WriteLayer) {
        for (id, write) in layer.into_writes() {
            let table = self.committed.entry(id.table().to_string()).or_default();
            match write {
                PendingWrite::Put(doc) => {
                    table.insert(id, doc);
                }
                PendingWrite::Delete => {
                    table.remove(&id);
                }
            }
        }
    }
}

/// Document storage for one component.
#[derive(Debug)]
pub struct DocumentStore {
    schema: Option<Arc<Schema>>,
    state: Mutex<StoreState>,
}

impl DocumentStore {
    /// Creates an empty store, validating writes against `schema` if given.
    #[must_use]
    pub fn new(schema: Option<Arc<Schema>>) -> Self {
        Self {
            schema,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Returns the schema, if any.
    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    /// Opens a new innermost write layer.
    pub fn begin(&self) {
        self.state.lock().layers.push();
    }

    /// Commits the innermost write layer.
    pub fn commit(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        if let Some(outermost) = state.layers.commit()? {
            state.apply(outermost);
        }
        Ok(())
    }

    /// Discards the innermost write layer.
    pub fn rollback(&self) -> CoreResult<()> {
        self.state.lock().layers.pop().map(drop)
    }

    /// Number of open write layers.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.lock().layers.depth()
    }

    /// Drops every document and open layer.
    pub fn reset(&self) {
        *self.state.lock() = StoreState::default();
    }

    /// Reads a document as seen by the innermost layer.
    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.state.lock().lookup(id)
    }

    /// Returns every live document of a table, in id order.
    #[must_use]
    pub fn table_documents(&self, table: &str) -> Vec<Document> {
        let state = self.state.lock();
        let mut docs: BTreeMap<DocumentId, Document> =
            state.committed.get(table).cloned().unwrap_or_default();
        for layer in state.layers.iter() {
            for (id, write) in layer.for_table(table) {
                match write {
                    PendingWrite::Put(doc) => {
                        docs.insert(id.clone(), doc.clone());
                    }
                    PendingWrite::Delete => {
                        docs.remove(id);
                    }
                }
            }
        }
        docs.into_values().collect()
    }

    /// Parses `id` and checks that it belongs to `table`.
    #[must_use]
    pub fn normalize_id(&self, table: &str, id: &str) -> Option<DocumentId> {
        DocumentId::parse(id).ok().filter(|id| id.table() == table)
    }

    /// Inserts a user document.
    pub fn insert(&self, table: &str, value: Value) -> CoreResult<DocumentId> {
        validate_table_name(table)?;
        let fields = value
            .into_object()
            .ok_or_else(|| CoreError::invalid_operation("document must be an object"))?;
        self.insert_fields(table, fields, Origin::User)
    }

    /// Inserts a document into a system table.
    pub fn insert_system(&self, table: &str, fields: BTreeMap<String, Value>) -> CoreResult<DocumentId> {
        self.insert_fields(table, fields, Origin::System)
    }

    fn insert_fields(
        &self,
        table: &str,
        fields: BTreeMap<String, Value>,
        origin: Origin,
    ) -> CoreResult<DocumentId> {
        if origin == Origin::User {
            check_user_fields(&fields)?;
        }
        self.validate(table, &fields, origin)?;

        let mut state = self.state.lock();
        let id = state.next_id(table);
        let creation_time = state.next_creation_time();
        let doc = Document::new(id.clone(), creation_time, fields);
        state.layers.record(id.clone(), PendingWrite::Put(doc))?;
        Ok(id)
    }

    /// Shallow-merges `patch` into a user document.
    pub fn patch(&self, id: &DocumentId, patch: &Patch) -> CoreResult<()> {
        self.patch_with(id, patch, Origin::User)
    }

    /// Shallow-merges `patch` into a system document.
    pub fn patch_system(&self, id: &DocumentId, patch: &Patch) -> CoreResult<()> {
        self.patch_with(id, patch, Origin::System)
    }

    fn patch_with(&self, id: &DocumentId, patch: &Patch, origin: Origin) -> CoreResult<()> {
        check_origin(id, origin)?;
        let current = self.get(id).ok_or_else(|| CoreError::document_not_found(id))?;
        let creation_time = current.creation_time();
        let mut fields = current.into_fields();

        for (field, value) in patch.iter() {
            if field == ID_FIELD || field == CREATION_TIME_FIELD {
                check_system_field(id, creation_time, field, value.as_ref())?;
                continue;
            }
            if origin == Origin::User {
                validate_field_name(field, true)?;
                if let Some(value) = value {
                    validate_nested_fields(value)?;
                }
            }
            match value {
                Some(value) => fields.insert(field.clone(), value.clone()),
                None => fields.remove(field),
            };
        }

        self.validate(id.table(), &fields, origin)?;
        self.stage(Document::new(id.clone(), creation_time, fields))
    }

    /// Replaces all user fields of a document.
    pub fn replace(&self, id: &DocumentId, value: Value) -> CoreResult<()> {
        check_origin(id, Origin::User)?;
        let current = self.get(id).ok_or_else(|| CoreError::document_not_found(id))?;
        let creation_time = current.creation_time();
        let mut fields = value
            .into_object()
            .ok_or_else(|| CoreError::invalid_operation("document must be an object"))?;

        for system_field in [ID_FIELD, CREATION_TIME_FIELD] {
            if let Some(value) = fields.remove(system_field) {
                check_system_field(id, creation_time, system_field, Some(&value))?;
            }
        }
        check_user_fields(&fields)?;
        self.validate(id.table(), &fields, Origin::User)?;
        self.stage(Document::new(id.clone(), creation_time, fields))
    }

    /// Deletes a user document.
    pub fn delete(&self, id: &DocumentId) -> CoreResult<()> {
        self.delete_with(id, Origin::User)
    }

    /// Deletes a system document.
    pub fn delete_system(&self, id: &DocumentId) -> CoreResult<()> {
        self.delete_with(id, Origin::System)
    }

    fn delete_with(&self, id: &DocumentId, origin: Origin) -> CoreResult<()> {
        check_origin(id, origin)?;
        let mut state = self.state.lock();
        if state.lookup(id).is_none() {
            return Err(CoreError::document_not_found(id));
        }
        state.layers.record(id.clone(), PendingWrite::Delete)
    }

    fn stage(&self, doc: Document) -> CoreResult<()> {
        let id = doc.id().clone();
        self.state.lock().layers.record(id, PendingWrite::Put(doc))
    }

    fn validate(&self, table: &str, fields: &BTreeMap<String, Value>, origin: Origin) -> CoreResult<()> {
        match (&self.schema, origin) {
            (Some(schema), Origin::User) => schema.validate_document(table, fields),
            _ => Ok(()),
        }
    }
}

fn check_origin(id: &DocumentId, origin: Origin) -> CoreResult<()> {
    if origin == Origin::User && is_system_table(id.table()) {
        return Err(CoreError::invalid_operation(format!(
            "system table `{}` cannot be written directly",
            id.table()
        )));
    }
    Ok(())
}

fn check_user_fields(fields: &BTreeMap<String, Value>) -> CoreResult<()> {
    for (name, value) in fields {
        validate_field_name(name, true)?;
        validate_nested_fields(value)?;
    }
    Ok(())
}

/// `_id` and `_creationTime` may appear in a write only with their current value.
fn check_system_field(
    id: &DocumentId,
    creation_time: f64,
    field: &str,
    value: Option<&Value>,
) -> CoreResult<()> {
    let unchanged = match (field, value) {
        (ID_FIELD, Some(Value::String(s))) => s == id.as_str(),
        (CREATION_TIME_FIELD, Some(Value::Float64(t))) => *t == creation_time,
        _ => false,
    };
    if unchanged {
        Ok(())
    } else {
        Err(CoreError::SystemFieldMismatch {
            field: field.to_string(),
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableDefinition;
    use docsim_values::v;
    use serde_json::json;
    use proptest::prelude::*;

    fn obj(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    fn open_store() -> DocumentStore {
        let store = DocumentStore::new(None);
        store.begin();
        store
    }

    #[test]
    fn insert_then_read_own_write() {
        let store = open_store();
        let id = store.insert("messages", obj(json!({"body": "hi"}))).unwrap();
        assert_eq!(id.table(), "messages");
        let doc = store.get(&id).unwrap();
        assert_eq!(doc.get_str("body"), Some("hi"));
    }

    #[test]
    fn write_outside_transaction_fails() {
        let store = DocumentStore::new(None);
        assert!(store.insert("messages", obj(json!({}))).is_err());
    }

    #[test]
    fn creation_times_strictly_increase() {
        let store = open_store();
        let a = store.insert("t", obj(json!({}))).unwrap();
        let b = store.insert("t", obj(json!({}))).unwrap();
        assert!(store.get(&b).unwrap().creation_time() > store.get(&a).unwrap().creation_time());
    }

    #[test]
    fn rollback_discards_layer() {
        let store = open_store();
        let id = store.insert("t", obj(json!({"a": 1}))).unwrap();
        store.rollback().unwrap();
        assert!(store.get(&id).is_none());
        assert_eq!(store.depth(), 0);
    }

    #[test]
    fn nested_commit_then_outer_rollback() {
        let store = open_store();
        store.begin();
        let id = store.insert("t", obj(json!({"a": 1}))).unwrap();
        store.commit().unwrap();
        assert!(store.get(&id).is_some());
        store.rollback().unwrap();
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn nested_rollback_keeps_outer_writes() {
        let store = open_store();
        let outer = store.insert("t", obj(json!({"a": 1}))).unwrap();
        store.begin();
        store.insert("t", obj(json!({"a": 2}))).unwrap();
        store.rollback().unwrap();
        store.commit().unwrap();
        assert_eq!(store.table_documents("t").len(), 1);
        assert!(store.get(&outer).is_some());
    }

    #[test]
    fn patch_merges_and_unsets() {
        let store = open_store();
        let id = store.insert("t", obj(json!({"a": 1, "b": 2}))).unwrap();
        store
            .patch(&id, &Patch::new().set("c", 3.0).unset("b"))
            .unwrap();
        let doc = store.get(&id).unwrap();
        assert_eq!(doc.get("a"), Some(Value::Float64(1.0)));
        assert_eq!(doc.get("b"), None);
        assert_eq!(doc.get("c"), Some(Value::Float64(3.0)));
    }

    #[test]
    fn patch_allows_unchanged_system_fields() {
        let store = open_store();
        let id = store.insert("t", obj(json!({}))).unwrap();
        let time = store.get(&id).unwrap().creation_time();
        let ok = Patch::new().set("_id", id.as_str()).set("_creationTime", time);
        assert!(store.patch(&id, &ok).is_ok());

        let bad = Patch::new().set("_id", "99;t");
        assert!(matches!(
            store.patch(&id, &bad),
            Err(CoreError::SystemFieldMismatch { .. })
        ));
    }

    #[test]
    fn replace_substitutes_fields() {
        let store = open_store();
        let id = store.insert("t", obj(json!({"a": 1}))).unwrap();
        store.replace(&id, obj(json!({"b": 2}))).unwrap();
        let doc = store.get(&id).unwrap();
        assert_eq!(doc.get("a"), None);
        assert_eq!(doc.get("b"), Some(Value::Float64(2.0)));
    }

    #[test]
    fn replace_allows_unchanged_system_fields() {
        let store = open_store();
        let id = store.insert("t", obj(json!({"a": 1}))).unwrap();
        let time = store.get(&id).unwrap().creation_time();

        let same = Value::object([
            ("_id", Value::from(id.as_str())),
            ("_creationTime", Value::from(time)),
            ("b", Value::Float64(2.0)),
        ]);
        store.replace(&id, same).unwrap();
        let doc = store.get(&id).unwrap();
        assert_eq!(doc.id(), &id);
        assert_eq!(doc.creation_time(), time);
        assert_eq!(doc.get("a"), None);
        assert_eq!(doc.get("b"), Some(Value::Float64(2.0)));

        let moved = Value::object([("_id", Value::from("99;t")), ("b", Value::Float64(3.0))]);
        assert!(matches!(
            store.replace(&id, moved),
            Err(CoreError::SystemFieldMismatch { .. })
        ));
        let older = Value::object([("_creationTime", Value::from(time - 1.0))]);
        assert!(matches!(
            store.replace(&id, older),
            Err(CoreError::SystemFieldMismatch { .. })
        ));
        assert_eq!(store.get(&id).unwrap().get("b"), Some(Value::Float64(2.0)));
    }

    #[test]
    fn delete_hides_document() {
        let store = open_store();
        let id = store.insert("t", obj(json!({}))).unwrap();
        store.delete(&id).unwrap();
        assert!(store.get(&id).is_none());
        assert!(store.table_documents("t").is_empty());
        assert!(matches!(store.delete(&id), Err(CoreError::DocumentNotFound { .. })));
    }

    #[test]
    fn user_writes_to_system_tables_rejected() {
        let store = open_store();
        assert!(store.insert("_storage", obj(json!({}))).is_err());
        let id = store.insert_system("_storage", BTreeMap::new()).unwrap();
        assert!(store.delete(&id).is_err());
        assert!(store.delete_system(&id).is_ok());
    }

    #[test]
    fn reserved_field_names_rejected() {
        let store = open_store();
        assert!(store.insert("t", obj(json!({"_secret": 1}))).is_err());
        assert!(store.insert("t", obj(json!({"a": {"$b": 1}}))).is_err());
    }

    #[test]
    fn schema_validation_applies_to_user_writes() {
        let schema = Schema::new().table(
            "messages",
            TableDefinition::new(v::object([("body", v::string())])),
        );
        let store = DocumentStore::new(Some(Arc::new(schema)));
        store.begin();
        assert!(store.insert("messages", obj(json!({"body": "x"}))).is_ok());
        assert!(store.insert("messages", obj(json!({"body": 1}))).is_err());
        assert!(store.insert("other", obj(json!({}))).is_err());
        assert!(store.insert_system("_scheduled_functions", BTreeMap::new()).is_ok());
    }

    #[test]
    fn normalize_id_checks_table() {
        let store = DocumentStore::new(None);
        assert!(store.normalize_id("t", "4;t").is_some());
        assert!(store.normalize_id("u", "4;t").is_none());
        assert!(store.normalize_id("t", "garbage").is_none());
    }

    #[test]
    fn commit_applies_to_committed_state() {
        let store = open_store();
        let id = store.insert("t", obj(json!({}))).unwrap();
        store.commit().unwrap();
        assert_eq!(store.depth(), 0);
        assert!(store.get(&id).is_some());
        assert!(matches!(store.commit(), Err(CoreError::TransactionFinished)));
    }

    #[derive(Debug, Clone)]
    enum LayerOp {
        Begin,
        Insert,
        Commit,
        Rollback,
    }

    fn layer_op() -> impl Strategy<Value = LayerOp> {
        prop_oneof![
            Just(LayerOp::Begin),
            Just(LayerOp::Insert),
            Just(LayerOp::Commit),
            Just(LayerOp::Rollback),
        ]
    }

    proptest! {
        #[test]
        fn layers_match_a_stack_of_counters(ops in proptest::collection::vec(layer_op(), 0..40)) {
            let store = DocumentStore::new(None);
            let mut committed = 0usize;
            let mut open: Vec<usize> = Vec::new();

            for op in ops {
                match op {
                    LayerOp::Begin => {
                        store.begin();
                        open.push(0);
                    }
                    LayerOp::Insert if !open.is_empty() => {
                        store.insert("t", obj(json!({}))).unwrap();
                        *open.last_mut().unwrap() += 1;
                    }
                    LayerOp::Commit if !open.is_empty() => {
                        store.commit().unwrap();
                        let inner = open.pop().unwrap();
                        match open.last_mut() {
                            Some(parent) => *parent += inner,
                            None => committed += inner,
                        }
                    }
                    LayerOp::Rollback if !open.is_empty() => {
                        store.rollback().unwrap();
                        open.pop();
                    }
                    _ => {}
                }
                prop_assert_eq!(store.depth(), open.len());
                prop_assert_eq!(
                    store.table_documents("t").len(),
                    committed + open.iter().sum::<usize>()
                );
            }

            while !open.is_empty() {
                store.rollback().unwrap();
                open.pop();
            }
            prop_assert_eq!(store.table_documents("t").len(), committed);
        }
    }
}
