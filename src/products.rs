//! Products page state: listing, batch filter, per-field saves and export.
//!
//! Each browser session owns its own [`ProductsView`]. The views live behind a
//! `RwLock` that is only taken to read a snapshot or to apply a finished
//! upstream call, never across an await.

use crate::backend::OcrBackend;
use crate::error::{FrontError, Result};
use crate::export::products_csv;
use crate::model::{EditableField, ProductRow};
use crate::supabase::ProductSource;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Failed(String),
}

/// Last save attempt of one field, with the value the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    pub draft: String,
    pub status: SaveStatus,
}

/// Snapshot of what the products page shows.
#[derive(Debug, Clone, Default)]
pub struct ProductsView {
    pub rows: Vec<ProductRow>,
    pub filter: String,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub loaded: bool,
    edits: HashMap<(String, EditableField), FieldEdit>,
}

impl ProductsView {
    pub fn edit(&self, row_id: &str, field: EditableField) -> Option<&FieldEdit> {
        self.edits.get(&(row_id.to_string(), field))
    }

    /// Value shown in a field's input: the typed draft if any, else the stored value.
    pub fn shown_value(&self, row: &ProductRow, field: EditableField) -> String {
        match self.edit(&row.id, field) {
            Some(edit) => edit.draft.clone(),
            None => row.field(field).unwrap_or_default().to_string(),
        }
    }

    fn apply_listing(&mut self, filter: String, result: Result<Vec<ProductRow>>) {
        self.filter = filter;
        self.loaded = true;
        self.notice = None;
        self.edits.clear();
        match result {
            Ok(rows) => {
                self.rows = rows;
                self.error = None;
            }
            Err(e) => {
                error!("Loading products failed: {}", e);
                self.rows = Vec::new();
                self.error = Some(e.to_string());
            }
        }
    }

    fn apply_save(
        &mut self,
        row_id: &str,
        field: EditableField,
        value: String,
        result: Result<()>,
    ) -> SaveStatus {
        let status = match result {
            Ok(()) => {
                if let Some(row) = self.rows.iter_mut().find(|r| r.id == row_id) {
                    row.set_field(field, value.clone());
                }
                SaveStatus::Saved
            }
            Err(e) => {
                warn!("Saving {} of row {} failed: {}", field.column(), row_id, e);
                SaveStatus::Failed(e.to_string())
            }
        };

        self.edits.insert(
            (row_id.to_string(), field),
            FieldEdit {
                draft: value,
                status: status.clone(),
            },
        );
        status
    }
}

/// The products page and its collaborators, with one view per session.
#[derive(Clone)]
pub struct ProductsPage {
    views: Arc<RwLock<HashMap<String, ProductsView>>>,
    source: Arc<dyn ProductSource>,
    backend: Arc<dyn OcrBackend>,
}

impl ProductsPage {
    pub fn new(source: Arc<dyn ProductSource>, backend: Arc<dyn OcrBackend>) -> Self {
        Self {
            views: Arc::new(RwLock::new(HashMap::new())),
            source,
            backend,
        }
    }

    pub fn snapshot(&self, session: &str) -> ProductsView {
        self.read().get(session).cloned().unwrap_or_default()
    }

    /// Load the unfiltered listing the first time a session shows the page.
    pub async fn ensure_loaded(&self, session: &str) {
        let loaded = self.read().get(session).is_some_and(|view| view.loaded);
        if loaded {
            return;
        }
        self.reload(session, String::new()).await;
    }

    /// Fetch rows again, filtered by `filter` when it is not blank.
    pub async fn reload(&self, session: &str, filter: String) {
        let filter = filter.trim().to_string();
        let batch = (!filter.is_empty()).then_some(filter.as_str());
        let result = self.source.list_products(batch).await;

        if let Ok(rows) = &result {
            info!("Products page showing {} row(s) (filter={:?})", rows.len(), filter);
        }
        self.write()
            .entry(session.to_string())
            .or_default()
            .apply_listing(filter, result);
    }

    /// Drop the filter and reload everything.
    pub async fn clear(&self, session: &str) {
        self.reload(session, String::new()).await;
    }

    /// Save one field of one row. Other fields and rows are left untouched.
    pub async fn save_field(
        &self,
        session: &str,
        row_id: &str,
        column: &str,
        value: String,
    ) -> Result<SaveStatus> {
        let field = EditableField::from_column(column)
            .ok_or_else(|| FrontError::UnknownField(column.to_string()))?;

        let result = self.backend.patch_field(row_id, field, &value).await;
        Ok(self
            .write()
            .entry(session.to_string())
            .or_default()
            .apply_save(row_id, field, value, result))
    }

    /// CSV of the rows the session currently shows; sets a notice when there is
    /// nothing to export.
    pub fn export(&self, session: &str) -> Result<String> {
        let mut views = self.write();
        let view = views.entry(session.to_string()).or_default();
        match products_csv(&view.rows) {
            Ok(csv) => {
                view.notice = None;
                info!("Exporting {} row(s) to CSV", view.rows.len());
                Ok(csv)
            }
            Err(e) => {
                view.notice = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ProductsView>> {
        self.views.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ProductsView>> {
        self.views.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{row, MockBackend, MockSource};

    const S: &str = "session-a";

    fn page(
        source: MockSource,
        backend: MockBackend,
    ) -> (ProductsPage, Arc<MockSource>, Arc<MockBackend>) {
        let source = Arc::new(source);
        let backend = Arc::new(backend);
        let page = ProductsPage::new(source.clone(), backend.clone());
        (page, source, backend)
    }

    #[tokio::test]
    async fn test_first_display_loads_once() {
        let (page, source, _) = page(
            MockSource::default().with_rows(vec![row("1", "b-1"), row("2", "b-2")]),
            MockBackend::default(),
        );

        page.ensure_loaded(S).await;
        page.ensure_loaded(S).await;

        assert_eq!(page.snapshot(S).rows.len(), 2);
        assert_eq!(*source.filters.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_filter_and_clear() {
        let (page, source, _) = page(
            MockSource::default().with_rows(vec![row("1", "b-1"), row("2", "b-2")]),
            MockBackend::default(),
        );

        page.reload(S, " b-2 ".into()).await;
        let view = page.snapshot(S);
        assert_eq!(view.filter, "b-2");
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].id, "2");

        page.clear(S).await;
        let view = page.snapshot(S);
        assert_eq!(view.filter, "");
        assert_eq!(view.rows.len(), 2);

        page.reload(S, "   ".into()).await;
        assert_eq!(
            *source.filters.lock().unwrap(),
            vec![Some("b-2".to_string()), None, None]
        );
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_state() {
        let (page, _, _) = page(
            MockSource::default().with_rows(vec![row("1", "b-1"), row("2", "b-2")]),
            MockBackend::default().failing(EditableField::Dn),
        );

        page.reload("a", "b-1".into()).await;
        page.ensure_loaded("b").await;
        page.save_field("a", "1", "dn", "80".into()).await.unwrap();

        let other = page.snapshot("b");
        assert_eq!(other.filter, "");
        assert_eq!(other.rows.len(), 2);
        assert!(other.edit("1", EditableField::Dn).is_none());
        assert!(page.export("b").is_ok());
        assert!(page.snapshot("a").edit("1", EditableField::Dn).is_some());

        // unknown sessions start empty and unloaded
        assert!(!page.snapshot("c").loaded);
    }

    #[tokio::test]
    async fn test_listing_failure_shows_error_and_no_rows() {
        let (page, _, _) = page(
            MockSource::default().failing_with("permission denied"),
            MockBackend::default(),
        );

        page.ensure_loaded(S).await;
        let view = page.snapshot(S);
        assert!(view.rows.is_empty());
        assert_eq!(view.error.as_deref(), Some("permission denied"));
    }

    #[tokio::test]
    async fn test_save_updates_only_that_field() {
        let mut stored = row("1", "b-1");
        stored.model = Some("D71X".into());
        let (page, _, backend) = page(
            MockSource::default().with_rows(vec![stored]),
            MockBackend::default(),
        );
        page.ensure_loaded(S).await;

        let status = page
            .save_field(S, "1", "serial_number", "SN-002".into())
            .await
            .unwrap();
        assert_eq!(status, SaveStatus::Saved);

        let view = page.snapshot(S);
        assert_eq!(view.rows[0].serial_number.as_deref(), Some("SN-002"));
        assert_eq!(view.rows[0].model.as_deref(), Some("D71X"));
        assert!(view.edit("1", EditableField::Model).is_none());
        assert_eq!(
            *backend.patches.lock().unwrap(),
            vec![("1".to_string(), EditableField::SerialNumber, "SN-002".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failed_save_keeps_draft_and_spares_siblings() {
        let mut stored = row("1", "b-1");
        stored.dn = Some("50".into());
        stored.pn = Some("16".into());
        let (page, _, _) = page(
            MockSource::default().with_rows(vec![stored, row("2", "b-1")]),
            MockBackend::default().failing(EditableField::Dn),
        );
        page.ensure_loaded(S).await;

        page.save_field(S, "1", "pn", "25".into()).await.unwrap();
        let status = page.save_field(S, "1", "dn", "80".into()).await.unwrap();
        assert!(matches!(status, SaveStatus::Failed(_)));

        let view = page.snapshot(S);
        let first = &view.rows[0];
        // stored value untouched, typed value still shown
        assert_eq!(first.dn.as_deref(), Some("50"));
        assert_eq!(view.shown_value(first, EditableField::Dn), "80");
        let dn = view.edit("1", EditableField::Dn).unwrap();
        assert!(matches!(dn.status, SaveStatus::Failed(_)));

        // sibling field keeps its own successful save
        assert_eq!(first.pn.as_deref(), Some("25"));
        assert_eq!(view.edit("1", EditableField::Pn).unwrap().status, SaveStatus::Saved);
        assert!(view.edit("2", EditableField::Dn).is_none());
    }

    #[tokio::test]
    async fn test_unknown_field_makes_no_request() {
        let (page, _, backend) = page(
            MockSource::default().with_rows(vec![row("1", "b-1")]),
            MockBackend::default(),
        );

        let err = page
            .save_field(S, "1", "casting_summary", "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, FrontError::UnknownField(_)));
        assert!(backend.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_empty_sets_notice() {
        let (page, _, _) = page(MockSource::default(), MockBackend::default());
        page.ensure_loaded(S).await;

        assert!(matches!(page.export(S), Err(FrontError::EmptyExport)));
        assert_eq!(page.snapshot(S).notice.as_deref(), Some("No data to export"));
    }

    #[tokio::test]
    async fn test_export_uses_filtered_rows() {
        let (page, _, _) = page(
            MockSource::default().with_rows(vec![row("1", "b-1"), row("2", "b-2")]),
            MockBackend::default(),
        );
        page.reload(S, "b-1".into()).await;

        let csv = page.export(S).unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.lines().nth(1).unwrap().starts_with(r#""1","b-1""#));
    }
}
