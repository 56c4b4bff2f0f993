//! State of a configurable table: one page of rows shown through the subset
//! of schema columns the user picked.

use std::sync::Arc;

use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, trace};

use crate::api::Page;
use crate::columns::{CellRenderer, ColumnSpec};
use crate::domain::DieselError;

/// Sink for user facing error reports.
pub trait Notifier {
    fn error(&mut self, message: String);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 1,
        }
    }
}

/// Draft membership of every schema column while the editor is open.
#[derive(Debug, Clone)]
pub struct ColumnEditor {
    pub entries: Vec<(String, String, bool)>, // key, label, checked
    pub cursor: usize,
}

/// One rendered column, ready for the UI.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

pub struct ConfigurableTable {
    schema: Arc<Vec<ColumnSpec>>,
    rows: Arc<Vec<Value>>,
    visible: Vec<String>,
    editor: Option<ColumnEditor>,
    saving: bool,
    pagination: Pagination,
    loading: bool,
    empty_message: String,
}

impl ConfigurableTable {
    pub fn new(schema: Arc<Vec<ColumnSpec>>, visible: Vec<String>, empty_message: &str) -> Self {
        Self {
            schema,
            rows: Arc::new(Vec::new()),
            visible,
            editor: None,
            saving: false,
            pagination: Pagination::default(),
            loading: true,
            empty_message: empty_message.to_string(),
        }
    }

    pub fn schema(&self) -> &[ColumnSpec] {
        &self.schema
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn visible(&self) -> &[String] {
        &self.visible
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn empty_message(&self) -> &str {
        &self.empty_message
    }

    pub fn editor(&self) -> Option<&ColumnEditor> {
        self.editor.as_ref()
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_page(&mut self, page: Page) {
        self.rows = Arc::new(page.rows);
        self.pagination = Pagination {
            current_page: page.current_page.max(1),
            total_pages: page.total_pages.max(page.current_page).max(1),
        };
        self.loading = false;
    }

    /// Replaces the visible list, e.g. after the preset finished loading.
    /// Keys that are not part of the schema are ignored when displaying.
    pub fn set_visible(&mut self, visible: Vec<String>) {
        self.visible = visible;
    }

    /// Schema columns currently shown, always in schema order.
    pub fn displayed_columns(&self) -> Vec<&ColumnSpec> {
        self.schema
            .iter()
            .filter(|c| self.visible.contains(&c.key))
            .collect()
    }

    /// The page the host should fetch for a page change, if any.
    pub fn page_after(&self, step: i32) -> Option<u32> {
        let target = self.pagination.current_page as i64 + step as i64;
        if target < 1 || target > self.pagination.total_pages as i64 || step == 0 {
            None
        } else {
            Some(target as u32)
        }
    }

    /// Renders the visible columns of the current page. Columns are rendered
    /// in parallel, each cell is cut to `max_width` characters.
    pub fn render_columns(
        &self,
        renderer: &dyn CellRenderer,
        max_width: usize,
    ) -> Vec<ColumnView> {
        let rows = Arc::clone(&self.rows);
        self.displayed_columns()
            .par_iter()
            .map(|column| {
                let data: Vec<String> = rows
                    .iter()
                    .map(|row| truncate(renderer.render(row, column), max_width))
                    .collect();
                let width = data
                    .iter()
                    .map(|s| s.chars().count())
                    .chain([column.label.chars().count(), column.min_width()])
                    .max()
                    .unwrap_or(0);
                ColumnView {
                    name: column.label.clone(),
                    width,
                    data,
                }
            })
            .collect()
    }

    // -------------------- Column editor ---------------------- //

    pub fn open_editor(&mut self) {
        let entries = self
            .schema
            .iter()
            .map(|c| (c.key.clone(), c.label.clone(), self.visible.contains(&c.key)))
            .collect();
        self.editor = Some(ColumnEditor { entries, cursor: 0 });
    }

    pub fn cancel_editor(&mut self) {
        self.editor = None;
    }

    pub fn move_editor_cursor(&mut self, step: i32) {
        if let Some(editor) = self.editor.as_mut()
            && !editor.entries.is_empty()
        {
            let last = editor.entries.len() as i64 - 1;
            editor.cursor = (editor.cursor as i64 + step as i64).clamp(0, last) as usize;
        }
    }

    pub fn toggle_at_cursor(&mut self) {
        if let Some(editor) = self.editor.as_mut()
            && let Some(entry) = editor.entries.get_mut(editor.cursor)
        {
            entry.2 = !entry.2;
            trace!("Column {} checked: {}", entry.0, entry.2);
        }
    }

    /// Confirms the editor. Returns the complete new visible list that must
    /// be handed to exactly one save, or `None` when a save is already
    /// pending or the editor is closed.
    pub fn begin_save(&mut self) -> Result<Option<Vec<String>>, DieselError> {
        if self.saving {
            debug!("Ignoring column confirmation while a save is pending");
            return Ok(None);
        }
        let Some(editor) = self.editor.as_ref() else {
            return Ok(None);
        };
        let columns: Vec<String> = editor
            .entries
            .iter()
            .filter(|(_, _, checked)| *checked)
            .map(|(key, _, _)| key.clone())
            .collect();
        if columns.is_empty() {
            return Err(DieselError::EmptySelection);
        }
        self.saving = true;
        Ok(Some(columns))
    }

    /// Settles a save started with [`begin_save`](Self::begin_save). On error
    /// the previous visible list stays and the editor is left open.
    pub fn finish_save(
        &mut self,
        result: Result<Vec<String>, DieselError>,
        notifier: &mut dyn Notifier,
    ) {
        self.saving = false;
        match result {
            Ok(visible) => {
                self.visible = visible;
                self.editor = None;
            }
            Err(e) => notifier.error(format!("Could not save columns: {e}")),
        }
    }
}

fn truncate(text: String, max_width: usize) -> String {
    if text.chars().count() <= max_width {
        return text;
    }
    if max_width < 3 {
        return text.chars().take(max_width).collect();
    }
    let mut reduced: String = text.chars().take(max_width - 3).collect();
    reduced.push_str("...");
    reduced
}
