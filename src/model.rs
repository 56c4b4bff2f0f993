use std::sync::Arc;

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};

use crate::api::{EntityService, Page, PageQuery, Sort};
use crate::auth::CredentialProvider;
use crate::columns::{CellRenderer, ColumnSpec, ColumnType, DefaultRenderer};
use crate::config::TVConfig;
use crate::domain::{CMDMode, DieselError, HELP_TEXT, Message};
use crate::entities::{EntityDef, catalogue};
use crate::inputter::{InputResult, Inputter};
use crate::preset::{PresetManager, PresetService, PresetState};
use crate::table::{ColumnEditor, ColumnView, ConfigurableTable, Notifier};
use crate::ui::{CMDLINE_HEIGH, SCROLLBAR_WIDTH, TABLE_HEADER_HEIGHT};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    RECORD,
    COLUMNS,
    POPUP,
    CMDINPUT,
}

/// The collaborators the dashboard talks to.
pub struct Services {
    pub presets: Arc<dyn PresetService>,
    pub entities: Arc<dyn EntityService>,
    pub credentials: Arc<dyn CredentialProvider>,
}

struct StatusLine {
    message: String,
}

impl StatusLine {
    fn set(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }
}

impl Notifier for StatusLine {
    fn error(&mut self, message: String) {
        warn!("{message}");
        self.set(message);
    }
}

struct RecordView {
    row_idx: usize, // Index into the rows of the current page
    header_data: Vec<String>,
    row_data: Vec<String>,
    curser_row: usize,
    curser_offset: usize,
}

impl RecordView {
    fn empty() -> Self {
        RecordView {
            row_idx: 0,
            header_data: Vec::new(),
            row_data: Vec::new(),
            curser_row: 0,
            curser_offset: 0,
        }
    }
}

pub struct UIData {
    pub name: String,
    pub table: Vec<ColumnView>,
    pub nrows: usize,
    pub selected_row: usize,
    pub selected_column: usize,
    pub abs_selected_row: usize,
    pub show_popup: bool,
    pub popup_message: String,
    pub editor: Option<ColumnEditor>,
    pub page_info: String,
    pub preset: PresetState,
    pub loading: bool,
    pub saving: bool,
    pub empty_message: String,
    pub cmdinput: InputResult,
    pub active_cmdinput: bool,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            table: Vec::new(),
            nrows: 0,
            selected_row: 0,
            selected_column: 0,
            abs_selected_row: 0,
            show_popup: false,
            popup_message: String::new(),
            editor: None,
            page_info: String::new(),
            preset: PresetState::Unloaded,
            loading: false,
            saving: false,
            empty_message: String::new(),
            cmdinput: InputResult::default(),
            active_cmdinput: false,
            status_message: String::new(),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
    pub statusline_width: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width: ui_width.saturating_sub(SCROLLBAR_WIDTH),
            table_height: ui_height.saturating_sub(CMDLINE_HEIGH + TABLE_HEADER_HEIGHT),
            statusline_width: ui_width,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    config: TVConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    services: Services,
    tx: UnboundedSender<Message>,
    entities: Vec<EntityDef>,
    entity_idx: usize,
    generation: u64, // Bumped whenever the table is replaced
    table: ConfigurableTable,
    presets: Arc<PresetManager>,
    preset_state: PresetState,
    renderer: DefaultRenderer,
    search: Option<String>,
    sort: Option<Sort>,
    curser_row: usize,
    curser_column: usize,
    offset_row: usize,
    offset_column: usize,
    visible_columns: usize, // Number of columns that fit on screen
    record_view: RecordView,
    uilayout: UILayout,
    uidata: UIData,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_line: StatusLine,
}

impl Model {
    pub fn init(
        config: &TVConfig,
        services: Services,
        tx: UnboundedSender<Message>,
        entity: usize,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let presets = Arc::new(PresetManager::new(
            Arc::clone(&services.presets),
            Arc::clone(&services.credentials),
        ));
        let entities = catalogue();
        let entity = entity.min(entities.len().saturating_sub(1));
        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            services,
            tx,
            entities,
            entity_idx: entity,
            generation: 0,
            table: ConfigurableTable::new(Arc::new(Vec::new()), Vec::new(), ""),
            presets,
            preset_state: PresetState::Unloaded,
            renderer: DefaultRenderer,
            search: None,
            sort: None,
            curser_row: 0,
            curser_column: 0,
            offset_row: 0,
            offset_column: 0,
            visible_columns: 0,
            record_view: RecordView::empty(),
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData::empty(),
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_line: StatusLine {
                message: "Started diesel-tv!".to_string(),
            },
        };
        model.input.set_width(model.uilayout.statusline_width);
        model.open_entity(entity);
        model
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn entity(&self) -> &EntityDef {
        &self.entities[self.entity_idx]
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_line.set(message);
        self.uidata.status_message = self.status_line.message.clone();
    }

    // -------------------- Background work ---------------------- //

    fn send(tx: &UnboundedSender<Message>, message: Message) {
        if tx.send(message).is_err() {
            trace!("Event loop is gone, dropping result");
        }
    }

    /// Replaces the table with a fresh one for `idx`. Results still in
    /// flight for the previous table are dropped once they arrive.
    fn open_entity(&mut self, idx: usize) {
        let Some(entity) = self.entities.get(idx).cloned() else {
            return;
        };
        self.entity_idx = idx;
        self.generation += 1;
        self.search = None;
        self.sort = None;
        self.preset_state = PresetState::Loading;
        self.curser_row = 0;
        self.curser_column = 0;
        self.offset_row = 0;
        self.offset_column = 0;
        self.modus = Modus::TABLE;
        self.table = ConfigurableTable::new(
            Arc::clone(&entity.schema),
            entity.default_columns.clone(),
            entity.empty_message,
        );
        self.presets = Arc::new(PresetManager::new(
            Arc::clone(&self.services.presets),
            Arc::clone(&self.services.credentials),
        ));
        info!("Opening {} (generation {})", entity.name, self.generation);

        let presets = Arc::clone(&self.presets);
        let tx = self.tx.clone();
        let generation = self.generation;
        let defaults = entity.default_columns.clone();
        let available = entity.column_keys();
        tokio::spawn(async move {
            let columns = presets.load(entity.name, &defaults, &available).await;
            let state = presets.state().await;
            Self::send(
                &tx,
                Message::PresetLoaded {
                    generation,
                    columns,
                    state,
                },
            );
        });

        self.spawn_page_fetch(1);
    }

    fn spawn_page_fetch(&mut self, page: u32) {
        let Some(credential) = self.services.credentials.credential() else {
            self.table.set_page(Page::default());
            self.set_status_message("Not authenticated: no stored session found");
            self.update_table_data();
            return;
        };
        self.table.set_loading(true);
        self.set_status_message(format!("Loading {} ...", self.entity().title));

        let service = Arc::clone(&self.services.entities);
        let tx = self.tx.clone();
        let generation = self.generation;
        let resource = self.entity().name;
        let query = PageQuery {
            page,
            per_page: self.config.page_size,
            search: self.search.clone(),
            sort: self.sort.clone(),
        };
        tokio::spawn(async move {
            let result = service.list(resource, &query, &credential).await;
            Self::send(&tx, Message::PageLoaded { generation, result });
        });
        self.update_table_data();
    }

    fn is_current(&self, generation: u64, what: &str) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding {what} of generation {generation}, current is {}",
                self.generation
            );
            return false;
        }
        true
    }

    /// Column changes are only allowed once the preset of the current table
    /// is known, so a save never races the load.
    fn columns_ready(&self) -> bool {
        matches!(
            self.preset_state,
            PresetState::LoadedDefault | PresetState::LoadedWithPreset
        )
    }

    fn confirm_columns(&mut self) {
        match self.table.begin_save() {
            Ok(Some(columns)) => {
                let presets = Arc::clone(&self.presets);
                let tx = self.tx.clone();
                let generation = self.generation;
                tokio::spawn(async move {
                    let result = match presets.save(columns).await {
                        Ok(_) => Ok(presets.visible_columns().await),
                        Err(e) => Err(e),
                    };
                    Self::send(&tx, Message::ColumnsSaved { generation, result });
                });
                self.set_status_message("Saving columns ...");
            }
            Ok(None) => {}
            Err(e) => self.set_status_message(e.to_string()),
        }
        self.update_table_data();
    }

    fn reset_columns(&mut self) {
        let presets = Arc::clone(&self.presets);
        let tx = self.tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let columns = presets.reset_to_default().await;
            Self::send(&tx, Message::ColumnsReset { generation, columns });
        });
    }

    /// Orders the listing by the selected column and starts over at page 1.
    fn sort_by_selected(&mut self, ascending: bool) {
        let Some(column) = self
            .table
            .displayed_columns()
            .get(self.offset_column + self.curser_column)
            .map(|c| (c.key.clone(), c.label.clone(), c.sortable))
        else {
            return;
        };
        let (key, label, sortable) = column;
        if !sortable {
            self.set_status_message(format!("{label} is not sortable"));
            return;
        }
        debug!("Sorting {} by {key}, ascending: {ascending}", self.entity().name);
        self.sort = Some(Sort { key, ascending });
        self.spawn_page_fetch(1);
    }

    fn change_page(&mut self, step: i32) {
        if let Some(page) = self.table.page_after(step) {
            self.spawn_page_fetch(page);
        }
    }

    // -------------------- Update ---------------------- //

    pub fn update(&mut self, message: Option<Message>) -> Result<(), DieselError> {
        let Some(msg) = message else {
            return Ok(());
        };

        // Results of background work are handled whatever the current view is
        let msg = match msg {
            Message::PresetLoaded {
                generation,
                columns,
                state,
            } => {
                if self.is_current(generation, "preset") {
                    self.preset_state = state;
                    self.table.set_visible(columns);
                    self.refresh();
                }
                return Ok(());
            }
            Message::PageLoaded { generation, result } => {
                if self.is_current(generation, "page") {
                    self.page_loaded(result);
                }
                return Ok(());
            }
            Message::ColumnsSaved { generation, result } => {
                if self.is_current(generation, "column save") {
                    let saved = result.is_ok();
                    self.table.finish_save(result, &mut self.status_line);
                    if saved {
                        self.preset_state = PresetState::LoadedWithPreset;
                        self.status_line.set("Columns saved");
                    }
                    if self.table.editor().is_none() && self.modus == Modus::COLUMNS {
                        self.modus = Modus::TABLE;
                    }
                    self.refresh();
                }
                return Ok(());
            }
            Message::ColumnsReset {
                generation,
                columns,
            } => {
                if self.is_current(generation, "column reset") {
                    self.table.set_visible(columns);
                    self.status_line.set("Columns reset to defaults");
                    self.refresh();
                }
                return Ok(());
            }
            other => other,
        };

        match self.modus {
            Modus::TABLE => match msg {
                Message::Quit => self.quit(),
                Message::MoveDown => self.move_table_selection_down(1),
                Message::MoveUp => self.move_table_selection_up(1),
                Message::MoveLeft => self.move_table_selection_left(),
                Message::MoveRight => self.move_table_selection_right(),
                Message::MovePageUp => self.move_table_selection_up(self.uilayout.table_height),
                Message::MovePageDown => {
                    self.move_table_selection_down(self.uilayout.table_height)
                }
                Message::NextPage => self.change_page(1),
                Message::PrevPage => self.change_page(-1),
                Message::SortAscending => self.sort_by_selected(true),
                Message::SortDescending => self.sort_by_selected(false),
                Message::SwitchEntity(idx) if idx != self.entity_idx => self.open_entity(idx),
                Message::Enter => self.build_record_view(self.offset_row + self.curser_row),
                Message::Exit => self.exit(),
                Message::Help => self.show_help(),
                Message::CopyCell => self.copy_table_cell(),
                Message::CopyRow => self.copy_table_row(),
                Message::EditColumns | Message::ResetColumns if !self.columns_ready() => {
                    self.set_status_message(DieselError::NotLoaded.to_string());
                }
                Message::EditColumns => {
                    self.table.open_editor();
                    self.previous_modus = self.modus;
                    self.modus = Modus::COLUMNS;
                    self.update_table_data();
                }
                Message::ResetColumns => self.reset_columns(),
                Message::Search => self.enter_cmd_mode(CMDMode::Search),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
            Modus::RECORD => match msg {
                Message::Quit => self.quit(),
                Message::MoveDown => self.move_record_selection_down(1),
                Message::MoveUp => self.move_record_selection_up(1),
                Message::MovePageDown => self.move_record_selection_down(10),
                Message::MovePageUp => self.move_record_selection_up(10),
                Message::MoveLeft => self.previous_record(),
                Message::MoveRight => self.next_record(),
                Message::CopyCell => self.copy_record_cell(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Help => self.show_help(),
                Message::Enter | Message::Exit => self.exit(),
                _ => (),
            },
            Modus::COLUMNS => match msg {
                Message::Quit => self.quit(),
                Message::MoveDown => self.move_editor(1),
                Message::MoveUp => self.move_editor(-1),
                Message::ToggleColumn => {
                    self.table.toggle_at_cursor();
                    self.update_table_data();
                }
                Message::Enter => self.confirm_columns(),
                Message::Exit => self.exit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
            Modus::POPUP => match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Enter | Message::Exit => self.exit(),
                _ => (),
            },
            Modus::CMDINPUT => {
                if let Message::RawKey(key) = msg {
                    self.raw_input(key)
                }
            }
        }
        Ok(())
    }

    fn page_loaded(&mut self, result: Result<Page, DieselError>) {
        match result {
            Ok(page) => {
                let text = match page.total {
                    Some(total) => format!("{} records", total),
                    None => format!("{} rows", page.rows.len()),
                };
                self.table.set_page(page);
                self.curser_row = 0;
                self.offset_row = 0;
                self.set_status_message(text);
            }
            Err(e) => {
                self.table.set_loading(false);
                let title = self.entity().title;
                let message = if e.is_transport() {
                    format!("Could not load {title}: {e}")
                } else {
                    format!("{e}, {title} not loaded")
                };
                self.status_line.error(message);
            }
        }
        self.refresh();
    }

    /// Rebuilds whatever view is active.
    fn refresh(&mut self) {
        let view = match self.modus {
            Modus::POPUP => self.previous_modus,
            modus => modus,
        };
        match view {
            Modus::RECORD => self.update_record_data(),
            _ => self.update_table_data(),
        }
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.input.set_width(self.uilayout.statusline_width);
        self.refresh();
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {
                // Leaving a search result goes back to the unfiltered list
                if self.search.take().is_some() {
                    self.spawn_page_fetch(1);
                }
            }
            Modus::RECORD => {
                self.previous_modus = Modus::RECORD;
                self.modus = Modus::TABLE;
                self.update_table_data();
            }
            Modus::COLUMNS => {
                self.table.cancel_editor();
                self.previous_modus = Modus::COLUMNS;
                self.modus = Modus::TABLE;
                self.update_table_data();
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.uidata.show_popup = false;
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.uidata.show_popup = true;
    }

    // -------------------- Command input ---------------------- //

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
            self.uidata.cmdinput = self.last_input.clone();
            self.uidata.active_cmdinput = self.active_cmdinput;
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);

        self.active_cmdinput = true;
        self.input.clear();
        if let Some(term) = &self.search {
            self.input.set(term);
        }
        self.last_input = self.input.get();

        self.uidata.cmdinput = self.last_input.clone();
        self.uidata.active_cmdinput = self.active_cmdinput;
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);

        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        if !self.last_input.canceled {
            match self.cmd_mode {
                Some(CMDMode::Search) => {
                    let term = self.last_input.input.trim().to_string();
                    self.search = if term.is_empty() { None } else { Some(term) };
                    self.spawn_page_fetch(1);
                }
                None => info!("Cmd mode is none!"),
            }
        }
        self.cmd_mode = None;
    }

    // -------------------- Table view ---------------------- //

    fn update_table_data(&mut self) {
        let views = self
            .table
            .render_columns(&self.renderer, self.config.max_column_width);
        let nrows = self.table.rows().len();
        let table_width = self.uilayout.table_width;

        self.offset_column = self.offset_column.min(views.len().saturating_sub(1));
        self.offset_row = self.offset_row.min(nrows.saturating_sub(1));
        let rbegin = self.offset_row;
        let rend = std::cmp::min(rbegin + self.uilayout.table_height, nrows);

        // Collect the columns that fit, the last one may be cut
        let mut visible = Vec::new();
        let mut visible_width = 0;
        for mut column in views.into_iter().skip(self.offset_column) {
            if visible_width + column.width + 1 <= table_width {
                visible_width += column.width + 1;
            } else if visible_width < table_width {
                column.width = table_width - visible_width;
                visible_width = table_width;
            } else {
                break;
            }
            column.data = column.data.get(rbegin..rend).unwrap_or_default().to_vec();
            visible.push(column);
        }

        self.visible_columns = visible.len();
        self.curser_column = self
            .curser_column
            .min(self.visible_columns.saturating_sub(1));
        self.curser_row = self.curser_row.min((rend - rbegin).saturating_sub(1));
        trace!(
            "Table: Cr {}, Cc {}, Or {}, Oc {}, Rb {}, Re {}, visible {}",
            self.curser_row,
            self.curser_column,
            self.offset_row,
            self.offset_column,
            rbegin,
            rend,
            self.visible_columns
        );
        self.update_uidata_for_table(visible);
    }

    fn page_info(&self) -> String {
        let pagination = self.table.pagination();
        format!(
            "Page {}/{}",
            pagination.current_page, pagination.total_pages
        )
    }

    fn update_uidata_for_table(&mut self, table: Vec<ColumnView>) {
        let popup_message = std::mem::take(&mut self.uidata.popup_message);
        let entity = self.entity();
        let mut name = format!("{} · {}", entity.title, self.config.company_slug);
        if let Some(term) = &self.search {
            name = format!("F[{name}] \"{term}\"");
        }
        if let Some(sort) = &self.sort {
            let arrow = if sort.ascending { '↑' } else { '↓' };
            name = format!("{name} {arrow}{}", sort.key);
        }
        self.uidata = UIData {
            name,
            table,
            nrows: self.table.rows().len(),
            selected_row: self.curser_row,
            selected_column: self.curser_column,
            abs_selected_row: self.offset_row + self.curser_row,
            show_popup: self.modus == Modus::POPUP,
            popup_message,
            editor: self.table.editor().cloned(),
            page_info: self.page_info(),
            preset: self.preset_state,
            loading: self.table.is_loading(),
            saving: self.table.is_saving(),
            empty_message: self.table.empty_message().to_string(),
            cmdinput: self.last_input.clone(),
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_line.message.clone(),
        }
    }

    fn select_row(&mut self, row: usize) {
        let height = self.uilayout.table_height.max(1);
        if row < self.offset_row {
            self.offset_row = row;
            self.curser_row = 0;
        } else if row >= self.offset_row + height {
            self.offset_row = row + 1 - height;
            self.curser_row = height - 1;
        } else {
            self.curser_row = row - self.offset_row;
        }
        self.update_table_data();
    }

    fn move_table_selection_up(&mut self, size: usize) {
        let row = (self.offset_row + self.curser_row).saturating_sub(size.max(1));
        self.select_row(row);
    }

    fn move_table_selection_down(&mut self, size: usize) {
        let nrows = self.table.rows().len();
        if nrows == 0 {
            return;
        }
        let row = std::cmp::min(self.offset_row + self.curser_row + size.max(1), nrows - 1);
        self.select_row(row);
    }

    fn move_table_selection_left(&mut self) {
        if self.curser_column > 0 {
            self.curser_column -= 1;
        } else if self.offset_column > 0 {
            self.offset_column -= 1;
        }
        self.update_table_data();
    }

    fn move_table_selection_right(&mut self) {
        let ncolumns = self.table.displayed_columns().len();
        if self.offset_column + self.curser_column + 1 < ncolumns {
            if self.curser_column + 1 < self.visible_columns {
                self.curser_column += 1;
            } else {
                self.offset_column += 1;
            }
            self.update_table_data();
        }
    }

    fn move_editor(&mut self, step: i32) {
        self.table.move_editor_cursor(step);
        self.update_table_data();
    }

    // -------------------- Clipboard ---------------------- //

    fn selected_cell(&self) -> Option<(&serde_json::Value, &ColumnSpec)> {
        let row = self.table.rows().get(self.offset_row + self.curser_row)?;
        let column = *self
            .table
            .displayed_columns()
            .get(self.offset_column + self.curser_column)?;
        Some((row, column))
    }

    fn copy_to_clipboard(&mut self, text: String) {
        trace!("Clipboard content: {}", text);
        match Clipboard::new().and_then(|mut c| c.set_text(text)) {
            Ok(_) => self.set_status_message("Copied to clipboard"),
            Err(e) => {
                trace!("Error copying to clipboard: {:?}", e);
                self.set_status_message(format!("Clipboard unavailable: {e}"));
            }
        }
    }

    fn copy_table_cell(&mut self) {
        if let Some((row, column)) = self.selected_cell() {
            let cell = self.renderer.render(row, column);
            self.copy_to_clipboard(cell);
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c.chars().any(|c| c == ' ' || c == '\t' || c == ',');
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping || needs_escaping {
            out = format!("\"{out}\"");
        }
        out
    }

    fn copy_table_row(&mut self) {
        let Some(row) = self.table.rows().get(self.offset_row + self.curser_row) else {
            return;
        };
        let content = self
            .table
            .displayed_columns()
            .iter()
            .filter(|c| c.kind != ColumnType::Actions)
            .map(|c| Self::wrap_cell_content(&self.renderer.render(row, c)))
            .collect::<Vec<String>>()
            .join(",");
        self.copy_to_clipboard(content);
    }

    // -------------------- Record view ---------------------- //

    fn build_record_view(&mut self, row_idx: usize) {
        let Some(row) = self.table.rows().get(row_idx) else {
            return;
        };
        trace!("Building record view for row {row_idx} ...");
        let columns: Vec<&ColumnSpec> = self
            .table
            .schema()
            .iter()
            .filter(|c| c.kind != ColumnType::Actions)
            .collect();
        self.record_view = RecordView {
            row_idx,
            header_data: columns.iter().map(|c| c.label.clone()).collect(),
            row_data: columns
                .iter()
                .map(|c| self.renderer.render(row, c))
                .collect(),
            curser_row: 0,
            curser_offset: 0,
        };
        self.previous_modus = self.modus;
        self.modus = Modus::RECORD;
        self.update_record_data();
    }

    fn update_record_data(&mut self) {
        let popup_message = std::mem::take(&mut self.uidata.popup_message);
        let record = &self.record_view;
        let height = self.uilayout.table_height;
        let rbegin = record.curser_offset;
        let rend = std::cmp::min(rbegin + height, record.row_data.len());

        let header_width = record
            .header_data
            .iter()
            .map(|h| h.chars().count())
            .max()
            .unwrap_or(0);
        let header_view = ColumnView {
            name: "Field".to_string(),
            data: record.header_data.get(rbegin..rend).unwrap_or_default().to_vec(),
            width: header_width,
        };
        let row_view = ColumnView {
            name: "Value".to_string(),
            data: record.row_data.get(rbegin..rend).unwrap_or_default().to_vec(),
            width: self
                .uilayout
                .table_width
                .saturating_sub(header_width + 1),
        };

        let id = self
            .table
            .rows()
            .get(record.row_idx)
            .and_then(|r| r.get("id"))
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string());
        self.uidata = UIData {
            name: format!("R[{}] #{}", self.entity().title, id),
            table: vec![header_view, row_view],
            nrows: record.row_data.len(),
            selected_row: record.curser_row,
            selected_column: 1,
            abs_selected_row: record.curser_offset + record.curser_row,
            show_popup: self.modus == Modus::POPUP,
            popup_message,
            editor: None,
            page_info: self.page_info(),
            preset: self.preset_state,
            loading: self.table.is_loading(),
            saving: self.table.is_saving(),
            empty_message: String::new(),
            cmdinput: self.last_input.clone(),
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_line.message.clone(),
        };
    }

    fn copy_record_cell(&mut self) {
        let record = &self.record_view;
        if let Some(cell) = record
            .row_data
            .get(record.curser_offset + record.curser_row)
            .cloned()
        {
            self.copy_to_clipboard(cell);
        }
    }

    fn move_record_selection_up(&mut self, size: usize) {
        let record = &mut self.record_view;
        if record.curser_row > 0 {
            record.curser_row = record.curser_row.saturating_sub(size);
        } else if record.curser_offset > 0 {
            record.curser_offset = record.curser_offset.saturating_sub(size);
        }
        self.update_record_data();
    }

    fn move_record_selection_down(&mut self, size: usize) {
        let height = self.uilayout.table_height.max(1);
        let record = &mut self.record_view;
        let nlines = record.row_data.len();
        if record.curser_row + record.curser_offset + 1 < nlines {
            let target = std::cmp::min(record.curser_offset + record.curser_row + size, nlines - 1);
            if target < record.curser_offset + height {
                record.curser_row = target - record.curser_offset;
            } else {
                record.curser_offset = target + 1 - height;
                record.curser_row = height - 1;
            }
            self.update_record_data();
        }
    }

    fn previous_record(&mut self) {
        let row_idx = self.record_view.row_idx;
        if row_idx > 0 {
            self.build_record_view(row_idx - 1);
        }
    }

    fn next_record(&mut self) {
        let row_idx = self.record_view.row_idx;
        if row_idx + 1 < self.table.rows().len() {
            self.build_record_view(row_idx + 1);
        }
    }
}
