// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    #[default]
    Nav,
    Edit,
}

impl AppMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Nav => "NAV",
            Self::Edit => "EDIT",
        }
    }
}

/// Grid cursor, in grid coordinates (row label column excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub row: usize,
    pub column: usize,
}

/// Current grid extent, passed in so cursor moves stay in bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridBounds {
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub active_tab: usize,
    pub tab_count: usize,
    pub cursor: Cursor,
    pub help_visible: bool,
    pub status_line: Option<String>,
}

impl AppState {
    pub fn new(tab_count: usize) -> Self {
        Self {
            mode: AppMode::Nav,
            active_tab: 0,
            tab_count,
            cursor: Cursor::default(),
            help_visible: false,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    NextTab,
    PrevTab,
    MoveCursor {
        rows: isize,
        columns: isize,
        bounds: GridBounds,
    },
    ClampCursor(GridBounds),
    EnterEditMode,
    ExitToNav,
    ToggleHelp,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    TabChanged(usize),
    CursorMoved(Cursor),
    HelpToggled(bool),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextTab => self.rotate_tab(1),
            AppCommand::PrevTab => self.rotate_tab(-1),
            AppCommand::MoveCursor {
                rows,
                columns,
                bounds,
            } => {
                let next = Cursor {
                    row: step(self.cursor.row, rows, bounds.rows),
                    column: step(self.cursor.column, columns, bounds.columns),
                };
                self.move_cursor(next)
            }
            AppCommand::ClampCursor(bounds) => {
                let next = Cursor {
                    row: self.cursor.row.min(bounds.rows.saturating_sub(1)),
                    column: self.cursor.column.min(bounds.columns.saturating_sub(1)),
                };
                self.move_cursor(next)
            }
            AppCommand::EnterEditMode => {
                self.mode = AppMode::Edit;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ToggleHelp => {
                self.help_visible = !self.help_visible;
                vec![AppEvent::HelpToggled(self.help_visible)]
            }
            AppCommand::SetStatus(message) => vec![self.set_status(message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn rotate_tab(&mut self, delta: isize) -> Vec<AppEvent> {
        if self.tab_count == 0 {
            return Vec::new();
        }
        let len = self.tab_count as isize;
        self.active_tab = (self.active_tab as isize + delta).rem_euclid(len) as usize;
        self.mode = AppMode::Nav;
        self.cursor = Cursor::default();
        vec![
            AppEvent::TabChanged(self.active_tab),
            AppEvent::CursorMoved(self.cursor),
        ]
    }

    fn move_cursor(&mut self, next: Cursor) -> Vec<AppEvent> {
        if next == self.cursor {
            return Vec::new();
        }
        self.cursor = next;
        vec![AppEvent::CursorMoved(next)]
    }

    fn set_status(&mut self, message: String) -> AppEvent {
        self.status_line = Some(message.clone());
        AppEvent::StatusUpdated(message)
    }
}

fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    current.saturating_add_signed(delta).min(len - 1)
}
