// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use lanegrid_app::{
    AppCommand, AppMode, AppState, ButtonKind, ColumnKind, ColumnSpec, ColumnWidth, Cursor,
    EditOutcome, EditorInput, GridBounds, LaneId, LaneValues, MIN_COLUMN_WIDTH, Orientation,
    RenderedCell, TableViewModel,
};
use lanegrid_device::{HostCallbacks, TableController};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info, warn};

const CONSOLE_CAPACITY: usize = 500;
const CONSOLE_HEIGHT: u16 = 8;
const POLL_INTERVAL: Duration = Duration::from_millis(120);
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConsoleLine {
    at: OffsetDateTime,
    text: String,
}

impl ConsoleLine {
    fn render(&self) -> String {
        let stamp = self
            .at
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        format!("{stamp} {}", self.text)
    }
}

/// Per-table log pane. Also receives the controller's host callbacks.
#[derive(Debug, Default)]
struct Console {
    lines: VecDeque<ConsoleLine>,
    loading: bool,
    notices: Vec<String>,
}

impl Console {
    fn push(&mut self, text: impl Into<String>) {
        if self.lines.len() == CONSOLE_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(ConsoleLine {
            at: OffsetDateTime::now_utc(),
            text: text.into(),
        });
    }

    fn clear(&mut self) {
        self.lines.clear();
    }

    fn tail(&self, count: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(skip).map(ConsoleLine::render).collect()
    }

    fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }
}

impl HostCallbacks for Console {
    fn on_row_updated(&mut self, lane: LaneId, values: &LaneValues) {
        debug!(%lane, columns = values.len(), "row updated");
    }

    fn on_log_line(&mut self, line: &str) {
        self.push(line);
    }

    fn on_operation_finished(&mut self) {
        self.notices.push("operation finished".to_owned());
    }

    fn on_loading_state_changed(&mut self, loading: bool) {
        self.loading = loading;
    }

    fn on_console_cleared(&mut self) {
        self.clear();
    }
}

struct TableTab {
    controller: TableController,
    console: Console,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TextEdit {
    lane: LaneId,
    column: String,
    buffer: String,
}

struct ViewData {
    tabs: Vec<TableTab>,
    edit: Option<TextEdit>,
    status_token: u64,
    frame: usize,
}

impl ViewData {
    fn new(tables: Vec<TableController>) -> Self {
        Self {
            tabs: tables
                .into_iter()
                .map(|controller| TableTab {
                    controller,
                    console: Console::default(),
                })
                .collect(),
            edit: None,
            status_token: 0,
            frame: 0,
        }
    }

    fn active(&self, state: &AppState) -> Option<&TableTab> {
        self.tabs.get(state.active_tab)
    }

    fn active_mut(&mut self, state: &AppState) -> Option<&mut TableTab> {
        self.tabs.get_mut(state.active_tab)
    }
}

/// Cell under the cursor, resolved against the table's orientation.
#[derive(Debug, Clone)]
struct CursorCell {
    lane: LaneId,
    column: ColumnSpec,
}

pub fn run_app(state: &mut AppState, tables: Vec<TableController>) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(tables);
    state.tab_count = view_data.tabs.len();
    let (internal_tx, internal_rx) = mpsc::channel();
    info!(tables = view_data.tabs.len(), "starting ui");
    open_tables(state, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_rx);
        pump_tables(state, &mut view_data, &internal_tx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }
        view_data.frame = view_data.frame.wrapping_add(1);

        match event::poll(POLL_INTERVAL).context("poll event") {
            Ok(true) => match event::read().context("read event") {
                Ok(Event::Key(key)) => {
                    if handle_key_event(state, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            },
            Ok(false) => {}
            Err(error) => {
                result = Err(error);
                break;
            }
        }
    }

    close_tables(&mut view_data);
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

/// Starts the initial full load of every table.
fn open_tables(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    let mut failures = Vec::new();
    for tab in &mut view_data.tabs {
        if let Err(error) = tab.controller.load_data(&mut tab.console) {
            warn!(table = %tab.controller.title(), %error, "initial load failed");
            failures.push(format!("{}: {error:#}", tab.controller.title()));
        }
    }
    if !failures.is_empty() {
        emit_status(state, view_data, internal_tx, failures.join("; "));
    }
}

fn close_tables(view_data: &mut ViewData) {
    for tab in &mut view_data.tabs {
        if let Err(error) = tab.controller.shutdown() {
            warn!(table = %tab.controller.title(), %error, "shutdown failed");
        }
    }
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

/// Drains worker messages for every table and keeps the cursor inside the
/// active grid as rows arrive.
fn pump_tables(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    let mut notices = Vec::new();
    for tab in &mut view_data.tabs {
        tab.controller.pump(&mut tab.console);
        for notice in tab.console.take_notices() {
            notices.push(format!("{}: {notice}", tab.controller.title()));
        }
    }
    if let Some(tab) = view_data.active(state) {
        let bounds = grid_bounds(tab.controller.view());
        if bounds.rows > 0 && bounds.columns > 0 {
            state.dispatch(AppCommand::ClampCursor(bounds));
        }
    }
    sync_selection(state, view_data);
    if let Some(notice) = notices.pop() {
        emit_status(state, view_data, internal_tx, notice);
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    view_data.status_token = view_data.status_token.wrapping_add(1);
    state.dispatch(AppCommand::SetStatus(message.into()));
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn grid_bounds(view: &TableViewModel) -> GridBounds {
    let columns = view.schema().grid_columns().count();
    match view.schema().orientation() {
        Orientation::RowsAreLanes => GridBounds {
            rows: view.row_count(),
            columns,
        },
        Orientation::ColumnsAreLanes => GridBounds {
            rows: columns,
            columns: view.row_count(),
        },
    }
}

/// Index of the lane row under the cursor.
fn cursor_lane_row(view: &TableViewModel, cursor: Cursor) -> usize {
    match view.schema().orientation() {
        Orientation::RowsAreLanes => cursor.row,
        Orientation::ColumnsAreLanes => cursor.column,
    }
}

fn cursor_cell(view: &TableViewModel, cursor: Cursor) -> Option<CursorCell> {
    let (row, column) = match view.schema().orientation() {
        Orientation::RowsAreLanes => (cursor.row, cursor.column),
        Orientation::ColumnsAreLanes => (cursor.column, cursor.row),
    };
    let lane = view.lane_at(row)?;
    let column = view.schema().grid_columns().nth(column)?.clone();
    Some(CursorCell { lane, column })
}

fn sync_selection(state: &AppState, view_data: &mut ViewData) {
    let cursor = state.cursor;
    if let Some(tab) = view_data.active_mut(state) {
        let view = tab.controller.view_mut();
        let row = cursor_lane_row(view, cursor);
        view.select_row(Some(row));
    }
}

fn handle_key_event(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('q') {
        return true;
    }

    if state.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            state.dispatch(AppCommand::ToggleHelp);
        }
        return false;
    }

    if state.mode == AppMode::Edit {
        handle_edit_key(state, view_data, internal_tx, key);
        return false;
    }

    match key.code {
        KeyCode::Char('?') => {
            state.dispatch(AppCommand::ToggleHelp);
        }
        KeyCode::Tab => {
            state.dispatch(AppCommand::NextTab);
            sync_selection(state, view_data);
        }
        KeyCode::BackTab => {
            state.dispatch(AppCommand::PrevTab);
            sync_selection(state, view_data);
        }
        KeyCode::Char('j') | KeyCode::Down => move_cursor(state, view_data, 1, 0),
        KeyCode::Char('k') | KeyCode::Up => move_cursor(state, view_data, -1, 0),
        KeyCode::Char('l') | KeyCode::Right => move_cursor(state, view_data, 0, 1),
        KeyCode::Char('h') | KeyCode::Left => move_cursor(state, view_data, 0, -1),
        KeyCode::Char(' ') | KeyCode::Enter => activate_cell(state, view_data, internal_tx),
        KeyCode::Char('e') => begin_text_edit(state, view_data, internal_tx),
        KeyCode::Char('g') => press_button(state, view_data, internal_tx, ButtonKind::Get),
        KeyCode::Char('s') => press_button(state, view_data, internal_tx, ButtonKind::Set),
        KeyCode::Char('r') => reload_active(state, view_data, internal_tx),
        KeyCode::Char('c') => {
            if let Some(tab) = view_data.active_mut(state) {
                tab.console.clear();
            }
        }
        _ => {}
    }
    false
}

fn handle_edit_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(edit) = view_data.edit.as_mut() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };
    match key.code {
        KeyCode::Esc => {
            view_data.edit = None;
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Backspace => {
            edit.buffer.pop();
        }
        KeyCode::Char(c) => edit.buffer.push(c),
        KeyCode::Enter => {
            let edit = edit.clone();
            let outcome = apply_edit(
                state,
                view_data,
                internal_tx,
                edit.lane,
                &edit.column,
                EditorInput::Text(edit.buffer.clone()),
            );
            if !matches!(outcome, Some(EditOutcome::Rejected(_))) {
                view_data.edit = None;
                state.dispatch(AppCommand::ExitToNav);
            }
        }
        _ => {}
    }
}

fn move_cursor(state: &mut AppState, view_data: &mut ViewData, rows: isize, columns: isize) {
    let Some(tab) = view_data.active(state) else {
        return;
    };
    let bounds = grid_bounds(tab.controller.view());
    state.dispatch(AppCommand::MoveCursor {
        rows,
        columns,
        bounds,
    });
    sync_selection(state, view_data);
}

fn active_cursor_cell(state: &AppState, view_data: &ViewData) -> Option<CursorCell> {
    view_data
        .active(state)
        .and_then(|tab| cursor_cell(tab.controller.view(), state.cursor))
}

fn activate_cell(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    let Some(cell) = active_cursor_cell(state, view_data) else {
        return;
    };
    match cell.column.kind {
        ColumnKind::Text | ColumnKind::Number => begin_text_edit(state, view_data, internal_tx),
        ColumnKind::Checkbox | ColumnKind::Boolean | ColumnKind::Enum => {
            apply_edit(
                state,
                view_data,
                internal_tx,
                cell.lane,
                &cell.column.key,
                EditorInput::Toggle,
            );
        }
        ColumnKind::ActionButtons => {
            if let Some(button) = cell.column.effective_buttons().first().copied() {
                press_button(state, view_data, internal_tx, button);
            }
        }
        ColumnKind::RowLabel => {}
    }
}

fn begin_text_edit(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    let Some(cell) = active_cursor_cell(state, view_data) else {
        return;
    };
    if !matches!(cell.column.kind, ColumnKind::Text | ColumnKind::Number) {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("{} is not a text cell", cell.column.key),
        );
        return;
    }
    let Some(tab) = view_data.active(state) else {
        return;
    };
    if tab.controller.is_loading() {
        let message = format!("{} is busy", tab.controller.title());
        emit_status(state, view_data, internal_tx, message);
        return;
    }
    let view = tab.controller.view();
    if !view.is_editable(cell.lane, &cell.column.key) {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("{} is read-only", cell.column.key),
        );
        return;
    }
    let buffer = view
        .value(cell.lane, &cell.column.key)
        .map(|value| value.display())
        .unwrap_or_default();
    view_data.edit = Some(TextEdit {
        lane: cell.lane,
        column: cell.column.key,
        buffer,
    });
    state.dispatch(AppCommand::EnterEditMode);
}

fn press_button(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    button: ButtonKind,
) {
    let Some(cell) = active_cursor_cell(state, view_data) else {
        return;
    };
    let Some(action) = view_data
        .active(state)
        .map(|tab| tab.controller.view().schema().action_column().key.clone())
    else {
        return;
    };
    apply_edit(
        state,
        view_data,
        internal_tx,
        cell.lane,
        &action,
        EditorInput::Press(button),
    );
}

fn reload_active(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    let Some(tab) = view_data.active_mut(state) else {
        return;
    };
    let message = match tab.controller.load_data(&mut tab.console) {
        Ok(task) => {
            debug!(table = %tab.controller.title(), %task, "reload started");
            format!("reloading {}", tab.controller.title())
        }
        Err(error) => format!("reload failed: {error:#}"),
    };
    emit_status(state, view_data, internal_tx, message);
}

/// Sends one input to the active table and reports the result on the
/// status line.
fn apply_edit(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    lane: LaneId,
    column: &str,
    input: EditorInput,
) -> Option<EditOutcome> {
    let tab = view_data.active_mut(state)?;
    let value_type = tab
        .controller
        .view()
        .schema()
        .column(column)
        .map(ColumnSpec::effective_value_type)
        .unwrap_or_default();
    let label = tab.controller.view().schema().lane_label(lane);
    let result = tab.controller.edit_cell(lane, column, input, &mut tab.console);

    let (message, outcome) = match result {
        Ok(outcome) => {
            let message = match &outcome {
                EditOutcome::Committed(value) => format!("{column} = {}", value.display()),
                EditOutcome::Rejected(_) => value_type.hint(),
                EditOutcome::Requested(button) => format!("{} {label}", button.label()),
                EditOutcome::Unchanged => format!("{column} unchanged"),
            };
            (message, Some(outcome))
        }
        Err(error) => (format!("{error:#}"), None),
    };
    emit_status(state, view_data, internal_tx, message);
    outcome
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(CONSOLE_HEIGHT),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let tab_titles = view_data
        .tabs
        .iter()
        .map(|tab| tab_title(tab, view_data.frame))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(tab_titles)
        .block(Block::default().title("lanegrid").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(state.active_tab);
    frame.render_widget(tabs, layout[0]);

    match view_data.active(state) {
        Some(tab) => {
            render_table(frame, layout[1], state, tab);
            let lines = tab
                .console
                .tail(usize::from(CONSOLE_HEIGHT.saturating_sub(2)));
            let console = Paragraph::new(lines.join("\n"))
                .block(Block::default().title("console").borders(Borders::ALL));
            frame.render_widget(console, layout[2]);
        }
        None => {
            let empty = Paragraph::new("no tables configured")
                .block(Block::default().borders(Borders::ALL));
            frame.render_widget(empty, layout[1]);
        }
    }

    let status_widget = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout[3]);

    if state.help_visible {
        let area = centered_rect(60, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text()).block(
            Block::default()
                .title("help")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(help, area);
    }
}

fn tab_title(tab: &TableTab, frame: usize) -> String {
    if tab.controller.is_loading() {
        format!("{} {}", SPINNER[frame % SPINNER.len()], tab.controller.title())
    } else {
        tab.controller.title()
    }
}

fn width_constraint(width: ColumnWidth) -> Constraint {
    match width {
        ColumnWidth::Fixed(width) => Constraint::Length(width),
        ColumnWidth::Stretch => Constraint::Fill(1),
    }
}

fn cell_style(cell: &RenderedCell, row_selected: bool, under_cursor: bool) -> Style {
    if under_cursor {
        return Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
    }
    let mut style = Style::default();
    if cell.read_only {
        style = style.fg(Color::Gray);
    }
    if cell.modified {
        style = style.fg(Color::Blue);
    }
    if cell.error.is_some() {
        style = style.fg(Color::Red);
    }
    if row_selected {
        style = style.bg(Color::DarkGray);
    }
    style
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, tab: &TableTab) {
    let view = tab.controller.view();
    let grid = view.grid();

    let label_width = grid
        .rows
        .iter()
        .map(|row| row.label.chars().count())
        .max()
        .unwrap_or_default()
        .max(usize::from(MIN_COLUMN_WIDTH));
    let mut widths = vec![Constraint::Length(
        u16::try_from(label_width).unwrap_or(u16::MAX),
    )];
    match view.schema().orientation() {
        Orientation::RowsAreLanes => widths.extend(
            view.schema()
                .column_widths()
                .into_iter()
                .map(width_constraint),
        ),
        Orientation::ColumnsAreLanes => {
            widths.extend(grid.headers.iter().map(|_| Constraint::Min(MIN_COLUMN_WIDTH)));
        }
    }

    let header_cells = std::iter::once(String::new())
        .chain(grid.headers.iter().cloned())
        .map(|label| {
            Cell::from(label).style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells);

    let rows = grid.rows.iter().enumerate().map(|(row_index, row)| {
        let label = Cell::from(row.label.clone()).style(Style::default().add_modifier(Modifier::BOLD));
        let cells = row.cells.iter().enumerate().map(|(column_index, cell)| {
            let under_cursor =
                row_index == state.cursor.row && column_index == state.cursor.column;
            let text = match &cell.error {
                Some(error) => format!("{} ({error})", cell.text),
                None => cell.text.clone(),
            };
            Cell::from(text).style(cell_style(cell, row.selected, under_cursor))
        });
        Row::new(std::iter::once(label).chain(cells))
    });

    let title = if tab.console.loading {
        format!("{} (loading)", tab.controller.title())
    } else {
        tab.controller.title()
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(table, area);
}

fn help_overlay_text() -> String {
    [
        "tab / shift+tab   switch table",
        "h j k l, arrows   move",
        "space / enter     toggle, cycle or press",
        "e                 edit text cell",
        "g / s             get or set the selected lane",
        "r                 reload table",
        "c                 clear console",
        "?                 toggle help",
        "ctrl+q            quit",
    ]
    .join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    let mode = state.mode.label();
    let default = match (&view_data.edit, state.mode) {
        (Some(edit), AppMode::Edit) => {
            format!("{}: {}_ | enter commit | esc cancel", edit.column, edit.buffer)
        }
        _ => "tab h/j/k/l | space toggle | e edit | g get | s set | r reload | c clear | ? help | ctrl+q"
            .to_owned(),
    };
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {default}"),
        None => format!("{mode} | {default}"),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        CONSOLE_CAPACITY, Console, Cursor, InternalEvent, ViewData, cursor_cell, grid_bounds,
        handle_key_event, open_tables, process_internal_events, pump_tables, render, status_text,
    };
    use anyhow::Result;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use lanegrid_app::{AppMode, AppState, CellValue, LaneId, Orientation};
    use lanegrid_device::{HostCallbacks, TableController};
    use lanegrid_testkit::{CallKind, ScriptedDevice, fixture_table, fixture_values};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use std::sync::{Arc, mpsc};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn chars(text: &str) -> Vec<KeyEvent> {
        text.chars().map(|c| key(KeyCode::Char(c))).collect()
    }

    fn scripted(lanes: u32) -> ScriptedDevice {
        (0..lanes).fold(ScriptedDevice::new(), |device, lane| {
            device.with_lane(lane, fixture_values(lane))
        })
    }

    struct Harness {
        state: AppState,
        view_data: ViewData,
        tx: mpsc::Sender<InternalEvent>,
        rx: mpsc::Receiver<InternalEvent>,
    }

    impl Harness {
        fn open(controllers: Vec<TableController>) -> Self {
            let mut view_data = ViewData::new(controllers);
            let mut state = AppState::new(view_data.tabs.len());
            let (tx, rx) = mpsc::channel();
            open_tables(&mut state, &mut view_data, &tx);
            Self {
                state,
                view_data,
                tx,
                rx,
            }
        }

        fn loaded(device: Arc<ScriptedDevice>, lanes: u32) -> Result<Self> {
            let controller = TableController::new(fixture_table(lanes), device)?;
            let mut harness = Self::open(vec![controller]);
            harness.settle()?;
            Ok(harness)
        }

        fn settle(&mut self) -> Result<()> {
            for tab in &mut self.view_data.tabs {
                tab.controller.run_until_idle(&mut tab.console, WAIT)?;
            }
            pump_tables(&mut self.state, &mut self.view_data, &self.tx);
            Ok(())
        }

        fn run_key_script(&mut self, keys: &[KeyEvent]) -> bool {
            let mut quit = false;
            for key in keys {
                quit |= handle_key_event(&mut self.state, &mut self.view_data, &self.tx, *key);
                process_internal_events(&mut self.state, &mut self.view_data, &self.rx);
            }
            quit
        }

        fn value(&self, lane: u32, column: &str) -> Option<CellValue> {
            self.view_data.tabs[self.state.active_tab]
                .controller
                .view()
                .value(LaneId::new(lane), column)
                .cloned()
        }

        fn status(&self) -> Option<&str> {
            self.state.status_line.as_deref()
        }
    }

    #[test]
    fn space_toggles_checkbox_under_cursor() -> Result<()> {
        let mut harness = Harness::loaded(Arc::new(scripted(4)), 4)?;
        harness.run_key_script(&[
            key(KeyCode::Char('l')),
            key(KeyCode::Char('l')),
            key(KeyCode::Char(' ')),
        ]);

        assert_eq!(harness.state.cursor, Cursor { row: 0, column: 2 });
        assert_eq!(harness.status(), Some("prop_1 = true"));
        assert_eq!(harness.value(0, "prop_1"), Some(CellValue::Bool(true)));
        Ok(())
    }

    #[test]
    fn dependency_gated_cell_opens_after_mode_change() -> Result<()> {
        let mut harness = Harness::loaded(Arc::new(scripted(2)), 2)?;

        harness.run_key_script(&[key(KeyCode::Char('l')), key(KeyCode::Char('e'))]);
        assert_eq!(harness.state.mode, AppMode::Nav);
        assert_eq!(harness.status(), Some("prop_4 is read-only"));

        harness.run_key_script(&[key(KeyCode::Char('h')), key(KeyCode::Enter)]);
        assert_eq!(harness.status(), Some("driver_mode = 2"));

        harness.run_key_script(&[key(KeyCode::Char('l')), key(KeyCode::Char('e'))]);
        assert_eq!(harness.state.mode, AppMode::Edit);
        let edit = harness.view_data.edit.clone().expect("edit session");
        assert_eq!(edit.buffer, "10");

        let mut keys = vec![key(KeyCode::Backspace), key(KeyCode::Backspace)];
        keys.extend(chars("42"));
        keys.push(key(KeyCode::Enter));
        harness.run_key_script(&keys);

        assert_eq!(harness.state.mode, AppMode::Nav);
        assert!(harness.view_data.edit.is_none());
        assert_eq!(harness.status(), Some("prop_4 = 42"));
        assert_eq!(harness.value(0, "prop_4"), Some(CellValue::Int(42)));
        Ok(())
    }

    #[test]
    fn invalid_text_keeps_edit_mode_with_hint() -> Result<()> {
        let mut harness = Harness::loaded(Arc::new(scripted(1)), 1)?;
        harness.run_key_script(&[
            key(KeyCode::Enter),
            key(KeyCode::Char('l')),
            key(KeyCode::Char('e')),
            key(KeyCode::Backspace),
            key(KeyCode::Backspace),
            key(KeyCode::Char('x')),
            key(KeyCode::Enter),
        ]);

        assert_eq!(harness.state.mode, AppMode::Edit);
        assert_eq!(harness.status(), Some("Please enter a valid integer"));
        assert_eq!(harness.value(0, "prop_4"), Some(CellValue::Int(10)));

        harness.run_key_script(&[key(KeyCode::Esc)]);
        assert_eq!(harness.state.mode, AppMode::Nav);
        assert!(harness.view_data.edit.is_none());
        Ok(())
    }

    #[test]
    fn set_key_writes_selected_lane() -> Result<()> {
        let device = Arc::new(scripted(3));
        let mut harness = Harness::loaded(Arc::clone(&device), 3)?;
        harness.run_key_script(&[key(KeyCode::Char('j')), key(KeyCode::Char('s'))]);
        assert_eq!(harness.status(), Some("Set lane1"));
        harness.settle()?;

        let calls = device.calls();
        let last = calls.last().expect("set call");
        assert_eq!(last.kind, CallKind::Set);
        assert_eq!(last.target.lane, LaneId::new(1));
        Ok(())
    }

    #[test]
    fn reload_clears_console_and_reads_every_lane() -> Result<()> {
        let device = Arc::new(scripted(4));
        let mut harness = Harness::loaded(Arc::clone(&device), 4)?;
        harness.run_key_script(&[key(KeyCode::Char('r'))]);
        harness.settle()?;

        let console = &harness.view_data.tabs[0].console;
        assert_eq!(console.lines.len(), 8);
        assert!(console.tail(1)[0].ends_with(" end:3"));
        assert_eq!(device.called_lanes().len(), 8);

        harness.run_key_script(&[key(KeyCode::Char('c'))]);
        assert!(harness.view_data.tabs[0].console.lines.is_empty());
        Ok(())
    }

    #[test]
    fn edits_are_refused_while_table_loads() -> Result<()> {
        let device = Arc::new(ScriptedDevice::gated().with_fallback(fixture_values(0)));
        let controller = TableController::new(fixture_table(2), device.clone())?;
        let mut harness = Harness::open(vec![controller]);
        device.wait_for_calls(1, WAIT)?;
        device.release(1);
        device.wait_for_calls(2, WAIT)?;
        pump_tables(&mut harness.state, &mut harness.view_data, &harness.tx);

        harness.run_key_script(&[key(KeyCode::Char(' '))]);
        let status = harness.status().unwrap_or_default().to_owned();
        assert!(status.contains("busy"), "status was {status:?}");
        assert_eq!(harness.value(0, "driver_mode"), Some(CellValue::Int(1)));

        device.open();
        harness.settle()?;
        assert!(!harness.view_data.tabs[0].controller.is_loading());
        Ok(())
    }

    #[test]
    fn tab_key_cycles_tables_and_resets_cursor() -> Result<()> {
        let device = Arc::new(scripted(2));
        let controllers = vec![
            TableController::new(fixture_table(2), device.clone())?,
            TableController::new(fixture_table(2), device)?,
        ];
        let mut harness = Harness::open(controllers);
        harness.settle()?;

        harness.run_key_script(&[key(KeyCode::Char('j')), key(KeyCode::Tab)]);
        assert_eq!(harness.state.active_tab, 1);
        assert_eq!(harness.state.cursor, Cursor::default());
        harness.run_key_script(&[KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT)]);
        assert_eq!(harness.state.active_tab, 0);
        Ok(())
    }

    #[test]
    fn help_overlay_swallows_keys_until_closed() -> Result<()> {
        let mut harness = Harness::loaded(Arc::new(scripted(2)), 2)?;
        harness.run_key_script(&[key(KeyCode::Char('?')), key(KeyCode::Char('j'))]);
        assert!(harness.state.help_visible);
        assert_eq!(harness.state.cursor, Cursor::default());

        harness.run_key_script(&[key(KeyCode::Esc)]);
        assert!(!harness.state.help_visible);
        Ok(())
    }

    #[test]
    fn ctrl_q_quits() -> Result<()> {
        let mut harness = Harness::loaded(Arc::new(scripted(1)), 1)?;
        assert!(harness.run_key_script(&[KeyEvent::new(
            KeyCode::Char('q'),
            KeyModifiers::CONTROL
        )]));
        Ok(())
    }

    #[test]
    fn columns_are_lanes_swaps_cursor_axes() -> Result<()> {
        let mut table = fixture_table(2);
        table.orientation = Orientation::ColumnsAreLanes;
        let controller = TableController::new(table, Arc::new(scripted(2)))?;
        let mut harness = Harness::open(vec![controller]);
        harness.settle()?;

        let view = harness.view_data.tabs[0].controller.view();
        let bounds = grid_bounds(view);
        assert_eq!((bounds.rows, bounds.columns), (5, 2));

        let cell = cursor_cell(view, Cursor { row: 2, column: 1 }).expect("cell");
        assert_eq!(cell.lane, LaneId::new(1));
        assert_eq!(cell.column.key, "prop_1");
        Ok(())
    }

    #[test]
    fn status_text_shows_edit_buffer() -> Result<()> {
        let mut harness = Harness::loaded(Arc::new(scripted(1)), 1)?;
        assert_eq!(
            status_text(&harness.state, &harness.view_data),
            "NAV | Line Side - Fixture: operation finished | tab h/j/k/l | space toggle | e edit | g get | s set | r reload | c clear | ? help | ctrl+q"
        );

        let mut keys = vec![key(KeyCode::Enter), key(KeyCode::Char('l')), key(KeyCode::Char('e'))];
        keys.extend(chars("7"));
        harness.run_key_script(&keys);
        let text = status_text(&harness.state, &harness.view_data);
        assert!(text.starts_with("EDIT | "), "status was {text:?}");
        assert!(text.contains("prop_4: 107_ | enter commit | esc cancel"));
        Ok(())
    }

    #[test]
    fn render_draws_tabs_grid_and_console() -> Result<()> {
        let harness = Harness::loaded(Arc::new(scripted(2)), 2)?;
        let mut terminal = Terminal::new(TestBackend::new(120, 30))?;
        terminal.draw(|frame| render(frame, &harness.state, &harness.view_data))?;

        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Line Side - Fixture"));
        assert!(screen.contains("driver_mode"));
        assert!(screen.contains("lane1"));
        assert!(screen.contains("begin:1"));
        Ok(())
    }

    #[test]
    fn console_keeps_bounded_history() {
        let mut console = Console::default();
        for index in 0..CONSOLE_CAPACITY + 5 {
            console.on_log_line(&format!("begin:{index}"));
        }
        assert_eq!(console.lines.len(), CONSOLE_CAPACITY);
        let last = console.tail(1);
        assert_eq!(last.len(), 1);
        assert!(last[0].ends_with(&format!(" begin:{}", CONSOLE_CAPACITY + 4)));
        assert_eq!(last[0].len(), "00:00:00 ".len() + "begin:504".len());

        console.on_console_cleared();
        assert!(console.tail(10).is_empty());
    }
}
