//! Scoped conversion context.
//!
//! Documents are converted against ambient session state: the entity type
//! being materialized and the property receiving the document key. Each lazy
//! operation pushes its own frame while its response is handled, and the
//! returned [`ContextGuard`] pops it again on every exit path.

use crate::error::{ClientError, ClientResult};
use crate::operation::OperationId;
use crate::tracker::{DocumentTracker, TrackedDocument};
use docket_protocol::{document_collection, document_etag, document_id, METADATA_KEY};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Conversion settings of the operation whose response is being handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionFrame {
    /// Operation that entered the scope.
    pub operation: OperationId,
    /// Entity type documents are converted for.
    pub entity_type: String,
    /// Property that receives the document key.
    pub identity_property: Option<String>,
}

/// Session-scoped stack of conversion frames.
#[derive(Debug)]
pub struct ConversionContext {
    frames: Mutex<Vec<ConversionFrame>>,
    tracker: Arc<DocumentTracker>,
}

impl ConversionContext {
    /// Creates a context that records converted documents in `tracker`.
    pub fn new(tracker: Arc<DocumentTracker>) -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            tracker,
        }
    }

    /// Pushes `frame` and returns the guard that pops it.
    pub fn enter(self: &Arc<Self>, frame: ConversionFrame) -> ContextGuard {
        let operation = frame.operation;
        self.frames.lock().push(frame);
        tracing::trace!(operation = %operation, "entered conversion scope");
        ContextGuard {
            context: Arc::clone(self),
            operation,
        }
    }

    /// Returns the innermost frame.
    pub fn active(&self) -> Option<ConversionFrame> {
        self.frames.lock().last().cloned()
    }

    /// Number of frames currently entered.
    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Returns the document tracker.
    pub fn tracker(&self) -> &Arc<DocumentTracker> {
        &self.tracker
    }

    /// Converts a raw server document for the active frame.
    ///
    /// Strips `@metadata`, copies the document key into the identity property
    /// and tracks the document. `null` converts to `null`.
    pub fn convert_document(&self, document: &Value) -> ClientResult<Value> {
        self.convert(document, false)
    }

    /// Converts a document pulled in through an include path.
    ///
    /// Includes are tracked under the collection named in their metadata, not
    /// under the entity type of the operation that asked for them.
    pub fn convert_include(&self, document: &Value) -> ClientResult<Value> {
        self.convert(document, true)
    }

    fn convert(&self, document: &Value, include: bool) -> ClientResult<Value> {
        let frame = self.active().ok_or(ClientError::ContextNotActive)?;

        let mut body = match document {
            Value::Null => return Ok(Value::Null),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ClientError::deserialization(
                    format!("{} ({})", frame.operation, frame.entity_type),
                    format!("expected a document object, found {}", other),
                ))
            }
        };

        let key = document_id(document).map(str::to_string);
        let etag = document_etag(document);
        body.remove(METADATA_KEY);

        if let (Some(property), Some(key)) = (&frame.identity_property, &key) {
            body.insert(property.clone(), Value::String(key.clone()));
        }
        let converted = Value::Object(body);

        if let Some(key) = key {
            let entity_type = match document_collection(document) {
                Some(collection) if include => collection.to_string(),
                _ => frame.entity_type,
            };
            self.tracker.track(TrackedDocument {
                key,
                etag,
                entity_type,
                document: converted.clone(),
            });
        }
        Ok(converted)
    }

    fn exit(&self, operation: OperationId) {
        let mut frames = self.frames.lock();
        if let Some(pos) = frames.iter().rposition(|f| f.operation == operation) {
            frames.remove(pos);
        }
    }
}

/// Pops its frame from the context when dropped.
#[must_use = "the conversion scope ends when the guard is dropped"]
#[derive(Debug)]
pub struct ContextGuard {
    context: Arc<ConversionContext>,
    operation: OperationId,
}

impl ContextGuard {
    /// Operation whose scope this guard holds.
    pub fn operation(&self) -> OperationId {
        self.operation
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.context.exit(self.operation);
        tracing::trace!(operation = %self.operation, "left conversion scope");
    }
}

/// The conversion settings an operation carries until its scope is entered.
#[derive(Debug, Clone)]
pub struct ScopeBinding {
    context: Arc<ConversionContext>,
    entity_type: String,
    identity_property: Option<String>,
}

impl ScopeBinding {
    /// Binds conversion settings to a session context.
    pub fn new(
        context: Arc<ConversionContext>,
        entity_type: impl Into<String>,
        identity_property: Option<String>,
    ) -> Self {
        Self {
            context,
            entity_type: entity_type.into(),
            identity_property,
        }
    }

    /// Enters the scope for `operation`.
    pub fn enter(&self, operation: OperationId) -> ContextGuard {
        self.context.enter(ConversionFrame {
            operation,
            entity_type: self.entity_type.clone(),
            identity_property: self.identity_property.clone(),
        })
    }

    /// Returns the bound context.
    pub fn context(&self) -> &ConversionContext {
        &self.context
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Arc<ConversionContext> {
        Arc::new(ConversionContext::new(Arc::new(DocumentTracker::new())))
    }

    fn frame(id: u64) -> ConversionFrame {
        ConversionFrame {
            operation: OperationId::new(id),
            entity_type: "User".to_string(),
            identity_property: Some("id".to_string()),
        }
    }

    #[test]
    fn convert_requires_scope() {
        let ctx = context();
        let err = ctx.convert_document(&json!({})).unwrap_err();
        assert_eq!(err, ClientError::ContextNotActive);
    }

    #[test]
    fn convert_strips_metadata_and_tracks() {
        let ctx = context();
        let _guard = ctx.enter(frame(1));

        let raw = json!({
            "name": "Alice",
            "@metadata": {"@id": "users/1", "@etag": 4, "Entity-Name": "users"}
        });
        let converted = ctx.convert_document(&raw).unwrap();

        assert_eq!(converted, json!({"name": "Alice", "id": "users/1"}));
        let tracked = ctx.tracker().get("users/1").unwrap();
        assert_eq!(tracked.etag, Some(4));
        assert_eq!(tracked.entity_type, "User");
    }

    #[test]
    fn includes_keep_their_collection() {
        let ctx = context();
        let _guard = ctx.enter(frame(1));

        ctx.convert_include(&json!({
            "name": "Acme",
            "@metadata": {"@id": "companies/1", "Entity-Name": "companies"}
        }))
        .unwrap();
        ctx.convert_include(&json!({"name": "Bare", "@metadata": {"@id": "misc/1"}}))
            .unwrap();

        assert_eq!(ctx.tracker().get("companies/1").unwrap().entity_type, "companies");
        assert_eq!(ctx.tracker().get("misc/1").unwrap().entity_type, "User");
    }

    #[test]
    fn convert_without_identity_property() {
        let ctx = context();
        let _guard = ctx.enter(ConversionFrame {
            identity_property: None,
            ..frame(1)
        });
        let converted = ctx
            .convert_document(&json!({"n": 1, "@metadata": {"@id": "a/1"}}))
            .unwrap();
        assert_eq!(converted, json!({"n": 1}));
    }

    #[test]
    fn convert_rejects_non_objects() {
        let ctx = context();
        let _guard = ctx.enter(frame(1));
        assert_eq!(ctx.convert_document(&Value::Null).unwrap(), Value::Null);
        assert!(matches!(
            ctx.convert_document(&json!([1])),
            Err(ClientError::Deserialization { .. })
        ));
    }

    #[test]
    fn guard_pops_frame() {
        let ctx = context();
        {
            let _outer = ctx.enter(frame(1));
            {
                let _inner = ctx.enter(frame(2));
                assert_eq!(ctx.active().unwrap().operation, OperationId::new(2));
                assert_eq!(ctx.depth(), 2);
            }
            assert_eq!(ctx.active().unwrap().operation, OperationId::new(1));
        }
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.active().is_none());
    }

    #[test]
    fn guard_released_on_error_path() {
        fn fails(binding: &ScopeBinding) -> ClientResult<()> {
            let _guard = binding.enter(OperationId::new(7));
            Err(ClientError::deserialization("op-7", "boom"))
        }

        let ctx = context();
        let binding = ScopeBinding::new(Arc::clone(&ctx), "User", None);
        assert!(fails(&binding).is_err());
        assert_eq!(ctx.depth(), 0);
    }
}
