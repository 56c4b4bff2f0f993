use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, Cell, Clear, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState,
    },
};

use crate::model::{Model, UIData};
use crate::preset::PresetState;
use crate::table::ColumnEditor;

pub const CMDLINE_HEIGH: usize = 2;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const SCROLLBAR_WIDTH: usize = 1;

#[derive(Default)]
pub struct TableUI {
    table_state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let data = model.get_uidata();
        let [table_area, status_area] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(CMDLINE_HEIGH as u16),
        ])
        .areas(frame.area());

        self.draw_table(data, frame, table_area);
        Self::draw_statusline(data, frame, status_area);

        if let Some(editor) = &data.editor {
            Self::draw_editor(editor, data.saving, frame, table_area);
        }
        if data.show_popup {
            Self::draw_popup(&data.popup_message, frame, table_area);
        }
    }

    fn draw_table(&mut self, data: &UIData, frame: &mut Frame, area: Rect) {
        let [body, scrollbar] = Layout::horizontal([
            Constraint::Min(1),
            Constraint::Length(SCROLLBAR_WIDTH as u16),
        ])
        .areas(area);

        let nrows = data.table.first().map(|c| c.data.len()).unwrap_or(0);
        if nrows == 0 {
            let text = if data.loading {
                "Loading ..."
            } else {
                data.empty_message.as_str()
            };
            let [middle] = Layout::vertical([Constraint::Length(1)])
                .flex(Flex::Center)
                .areas(body);
            frame.render_widget(Paragraph::new(text).centered().italic(), middle);
            return;
        }

        let header = Row::new(data.table.iter().map(|c| Cell::from(c.name.clone())))
            .style(Style::new().bold().underlined());
        let rows = (0..nrows).map(|r| {
            Row::new(
                data.table
                    .iter()
                    .map(|c| Cell::from(c.data.get(r).cloned().unwrap_or_default())),
            )
        });
        let widths = data
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16));

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .row_highlight_style(Style::new().bg(Color::DarkGray))
            .cell_highlight_style(Style::new().reversed().bold());

        // Rows are already sliced to the visible window
        *self.table_state.offset_mut() = 0;
        self.table_state.select(Some(data.selected_row));
        self.table_state.select_column(Some(data.selected_column));
        frame.render_stateful_widget(table, body, &mut self.table_state);

        let mut scroll = ScrollbarState::new(data.nrows).position(data.abs_selected_row);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            scrollbar,
            &mut scroll,
        );
    }

    fn draw_statusline(data: &UIData, frame: &mut Frame, area: Rect) {
        let [info_area, message_area] =
            Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).areas(area);

        let mut info = vec![
            Span::from(format!(" {} ", data.name)).bold().reversed(),
            Span::from(format!(" {} ", data.page_info)),
        ];
        match data.preset {
            PresetState::LoadedWithPreset => info.push(Span::from(" saved columns ").green()),
            PresetState::LoadedDefault => info.push(Span::from(" default columns ").dark_gray()),
            PresetState::Unloaded | PresetState::Loading => {}
        }
        if data.loading {
            info.push(Span::from(" loading ... ").yellow());
        }
        if data.saving {
            info.push(Span::from(" saving ... ").yellow());
        }
        info.push(Span::from(" ? help ").dark_gray());
        frame.render_widget(Line::from(info), info_area);

        if data.active_cmdinput {
            let prompt = format!("/{}", data.cmdinput.input);
            frame.render_widget(Paragraph::new(prompt), message_area);
            frame.set_cursor_position((
                message_area.x + 1 + data.cmdinput.curser_pos as u16,
                message_area.y,
            ));
        } else {
            frame.render_widget(
                Paragraph::new(data.status_message.as_str()).dark_gray(),
                message_area,
            );
        }
    }

    fn draw_editor(editor: &ColumnEditor, saving: bool, frame: &mut Frame, area: Rect) {
        let lines: Vec<Line> = editor
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, label, checked))| {
                let mark = if *checked { "x" } else { " " };
                let line = Line::from(format!(" [{mark}] {label}"));
                if i == editor.cursor {
                    line.reversed()
                } else {
                    line
                }
            })
            .collect();

        let hint = if saving {
            " Saving ... "
        } else {
            " Space toggle · Enter save · Esc cancel "
        };
        let width = lines
            .iter()
            .map(|l| l.width())
            .chain(std::iter::once(hint.chars().count()))
            .max()
            .unwrap_or(0) as u16
            + 2;
        let popup = popup_area(area, width, lines.len() as u16 + 2);
        let block = Block::bordered()
            .title(Line::from(" Visible columns ").bold())
            .title_bottom(Line::from(hint).centered());

        frame.render_widget(Clear, popup);
        frame.render_widget(Paragraph::new(lines).block(block), popup);
    }

    fn draw_popup(message: &str, frame: &mut Frame, area: Rect) {
        let width = message.lines().map(|l| l.chars().count()).max().unwrap_or(0) as u16 + 4;
        let height = message.lines().count() as u16 + 2;
        let popup = popup_area(area, width, height);
        let block = Block::bordered()
            .title(Line::from(" Help ").bold())
            .title_bottom(Line::from(" Esc to close ").centered());

        frame.render_widget(Clear, popup);
        frame.render_widget(Paragraph::new(message).block(block), popup);
    }
}

fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let [area] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    area
}
