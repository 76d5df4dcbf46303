//! Write layers: the stack of uncommitted changes.

use crate::error::{CoreError, CoreResult};
use crate::types::Document;
use docsim_values::DocumentId;
use std::collections::BTreeMap;

/// A pending change to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// The document now has this content.
    Put(Document),
    /// The document was deleted.
    Delete,
}

/// Changes made by one (possibly nested) transaction.
#[derive(Debug, Default)]
pub struct WriteLayer {
    writes: BTreeMap<DocumentId, PendingWrite>,
}

impl WriteLayer {
    /// Returns the pending write for an id, if any.
    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<&PendingWrite> {
        self.writes.get(id)
    }

    /// Number of documents touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn record(&mut self, id: DocumentId, write: PendingWrite) {
        self.writes.insert(id, write);
    }

    /// Folds `inner` into this layer; later writes win.
    pub(crate) fn absorb(&mut self, inner: WriteLayer) {
        self.writes.extend(inner.writes);
    }

    /// Pending writes touching `table`.
    pub(crate) fn for_table<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = (&'a DocumentId, &'a PendingWrite)> + 'a {
        self.writes.iter().filter(move |(id, _)| id.table() == table)
    }

    pub(crate) fn into_writes(self) -> impl Iterator<Item = (DocumentId, PendingWrite)> {
        self.writes.into_iter()
    }
}

/// A stack of write layers, outermost first.
#[derive(Debug, Default)]
pub struct LayerStack {
    layers: Vec<WriteLayer>,
}

impl LayerStack {
    /// Number of open layers.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Opens a new innermost layer.
    pub fn push(&mut self) {
        self.layers.push(WriteLayer::default());
    }

    /// Closes the innermost layer and returns it.
    pub fn pop(&mut self) -> CoreResult<WriteLayer> {
        self.layers.pop().ok_or(CoreError::TransactionFinished)
    }

    /// Records a write in the innermost layer.
    pub fn record(&mut self, id: DocumentId, write: PendingWrite) -> CoreResult<()> {
        let layer = self
            .layers
            .last_mut()
            .ok_or_else(|| CoreError::invalid_operation("write outside of a transaction"))?;
        layer.record(id, write);
        Ok(())
    }

    /// Finds the most recent pending write for an id, innermost first.
    #[must_use]
    pub fn lookup(&self, id: &DocumentId) -> Option<&PendingWrite> {
        self.layers.iter().rev().find_map(|layer| layer.get(id))
    }

    /// Closes the innermost layer, folding it into its parent.
    ///
    /// Returns the layer when it was the outermost, so the caller can apply
    /// it to committed state.
    pub fn commit(&mut self) -> CoreResult<Option<WriteLayer>> {
        let inner = self.pop()?;
        match self.layers.last_mut() {
            Some(parent) => {
                parent.absorb(inner);
                Ok(None)
            }
            None => Ok(Some(inner)),
        }
    }

    /// Layers from outermost to innermost.
    pub fn iter(&self) -> impl Iterator<Item = &WriteLayer> {
        self.layers.iter()
    }
}
