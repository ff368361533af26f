// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{
    BoolFlags, ButtonKind, CellValue, CoercionError, ColumnKind, ColumnSpec, EnumOption,
    ValueType, parse_text,
};

const CHECKED_MARK: &str = "[x]";
const UNCHECKED_MARK: &str = "[ ]";
const SWITCH_KNOB: &str = "■";
const SELECT_ARROW: &str = "▾";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorInput {
    Text(String),
    Toggle,
    SetChecked(bool),
    Select(usize),
    Press(ButtonKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorResponse {
    /// Input did not apply to this editor or the editor is read-only.
    Ignored,
    /// Input failed type coercion; the last valid value is kept.
    Rejected(CoercionError),
    Commit(CellValue),
    Action(ButtonKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedCell {
    pub text: String,
    pub read_only: bool,
    pub selected: bool,
    pub modified: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Chrome {
    read_only: bool,
    selected: bool,
}

impl Chrome {
    fn locked() -> Self {
        Self {
            read_only: true,
            selected: false,
        }
    }

    fn render(self, text: String, modified: bool, error: Option<String>) -> RenderedCell {
        RenderedCell {
            text,
            read_only: self.read_only,
            selected: self.selected,
            modified: modified && !self.read_only,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextEditor {
    value_type: ValueType,
    buffer: String,
    committed: Option<CellValue>,
    error: Option<String>,
    modified: bool,
    chrome: Chrome,
}

impl TextEditor {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            buffer: String::new(),
            committed: None,
            error: None,
            modified: false,
            chrome: Chrome::locked(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn last_valid(&self) -> Option<&CellValue> {
        self.committed.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn bind(&mut self, value: &CellValue) {
        self.buffer = value.display();
        self.committed = Some(value.clone());
        self.error = None;
        self.modified = false;
    }

    fn handle(&mut self, input: EditorInput) -> EditorResponse {
        let EditorInput::Text(text) = input else {
            return EditorResponse::Ignored;
        };
        if self.chrome.read_only {
            return EditorResponse::Ignored;
        }

        self.buffer = text;
        match parse_text(&self.buffer, self.value_type) {
            Ok(value) => {
                self.committed = Some(value.clone());
                self.error = None;
                self.modified = true;
                EditorResponse::Commit(value)
            }
            Err(error) => {
                self.error = Some(self.value_type.hint());
                EditorResponse::Rejected(error)
            }
        }
    }

    fn render(&self) -> RenderedCell {
        self.chrome
            .render(self.buffer.clone(), self.modified, self.error.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckboxEditor {
    checked: bool,
    modified: bool,
    chrome: Chrome,
}

impl CheckboxEditor {
    pub fn new() -> Self {
        Self {
            checked: false,
            modified: false,
            chrome: Chrome::locked(),
        }
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    fn bind(&mut self, value: &CellValue) {
        self.checked = value.truthy();
        self.modified = false;
    }

    fn handle(&mut self, input: EditorInput) -> EditorResponse {
        if self.chrome.read_only {
            return EditorResponse::Ignored;
        }
        let next = match input {
            EditorInput::Toggle => !self.checked,
            EditorInput::SetChecked(checked) => checked,
            _ => return EditorResponse::Ignored,
        };
        self.checked = next;
        self.modified = true;
        EditorResponse::Commit(CellValue::Bool(next))
    }

    fn render(&self) -> RenderedCell {
        let mark = if self.checked {
            CHECKED_MARK
        } else {
            UNCHECKED_MARK
        };
        self.chrome.render(mark.to_owned(), self.modified, None)
    }
}

impl Default for CheckboxEditor {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal cells a switch occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchGeometry {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanSwitchEditor {
    checkbox: CheckboxEditor,
    flags: BoolFlags,
}

impl BooleanSwitchEditor {
    pub fn new(flags: BoolFlags) -> Self {
        Self {
            checkbox: CheckboxEditor::new(),
            flags,
        }
    }

    pub fn is_on(&self) -> bool {
        self.checkbox.checked
    }

    pub fn label(&self) -> &str {
        if self.is_on() {
            &self.flags.checked_label
        } else {
            &self.flags.unchecked_label
        }
    }

    /// Fits the switch to the row height and the wider of its two labels. The
    /// knob is square in pixels, so it spans two terminal columns per row.
    pub fn geometry(&self, row_height: u16) -> SwitchGeometry {
        let height = row_height.max(1);
        let label_width = self
            .flags
            .checked_label
            .chars()
            .count()
            .max(self.flags.unchecked_label.chars().count()) as u16;
        SwitchGeometry {
            width: label_width + height * 2 + 2,
            height,
        }
    }

    fn render(&self) -> RenderedCell {
        let label = self.label();
        let text = match (self.is_on(), label.is_empty()) {
            (true, true) => format!("[ {SWITCH_KNOB}]"),
            (false, true) => format!("[{SWITCH_KNOB} ]"),
            (true, false) => format!("[{label} {SWITCH_KNOB}]"),
            (false, false) => format!("[{SWITCH_KNOB} {label}]"),
        };
        self.checkbox
            .chrome
            .render(text, self.checkbox.modified, None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSelectEditor {
    options: Vec<EnumOption>,
    index: usize,
    modified: bool,
    chrome: Chrome,
}

impl EnumSelectEditor {
    pub fn new(options: Vec<EnumOption>) -> Self {
        Self {
            options,
            index: 0,
            modified: false,
            chrome: Chrome::locked(),
        }
    }

    pub fn current(&self) -> Option<&EnumOption> {
        self.options.get(self.index)
    }

    pub fn options(&self) -> &[EnumOption] {
        &self.options
    }

    fn bind(&mut self, value: &CellValue) {
        self.index = self
            .options
            .iter()
            .position(|option| {
                value
                    .coerce(ValueType::of(&option.value))
                    .is_ok_and(|coerced| coerced == option.value)
            })
            .unwrap_or(0);
        self.modified = false;
    }

    fn handle(&mut self, input: EditorInput) -> EditorResponse {
        if self.chrome.read_only || self.options.is_empty() {
            return EditorResponse::Ignored;
        }
        let next = match input {
            EditorInput::Select(index) if index < self.options.len() => index,
            EditorInput::Toggle => (self.index + 1) % self.options.len(),
            _ => return EditorResponse::Ignored,
        };
        self.index = next;
        self.modified = true;
        EditorResponse::Commit(self.options[next].value.clone())
    }

    fn render(&self) -> RenderedCell {
        let label = self
            .current()
            .map(|option| option.label.as_str())
            .unwrap_or_default();
        self.chrome
            .render(format!("{label} {SELECT_ARROW}"), self.modified, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButtonsEditor {
    buttons: Vec<ButtonKind>,
    selected: bool,
}

impl ActionButtonsEditor {
    pub fn new(buttons: Vec<ButtonKind>) -> Self {
        Self {
            buttons,
            selected: false,
        }
    }

    pub fn buttons(&self) -> &[ButtonKind] {
        &self.buttons
    }

    fn handle(&mut self, input: EditorInput) -> EditorResponse {
        match input {
            EditorInput::Press(kind) if self.buttons.contains(&kind) => {
                EditorResponse::Action(kind)
            }
            _ => EditorResponse::Ignored,
        }
    }

    fn render(&self) -> RenderedCell {
        let text = self
            .buttons
            .iter()
            .map(|button| format!("[{}]", button.label()))
            .collect::<Vec<_>>()
            .join(" ");
        RenderedCell {
            text,
            read_only: false,
            selected: self.selected,
            modified: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellEditor {
    Text(TextEditor),
    Checkbox(CheckboxEditor),
    Switch(BooleanSwitchEditor),
    Select(EnumSelectEditor),
    Actions(ActionButtonsEditor),
}

impl CellEditor {
    /// Editor for a column; row label columns have none. Data editors start
    /// read-only until the owning row has evaluated their editability.
    pub fn for_column(column: &ColumnSpec) -> Option<Self> {
        let editor = match column.kind {
            ColumnKind::Text | ColumnKind::Number => {
                Self::Text(TextEditor::new(column.effective_value_type()))
            }
            ColumnKind::Checkbox => Self::Checkbox(CheckboxEditor::new()),
            ColumnKind::Boolean => Self::Switch(BooleanSwitchEditor::new(
                column.bool_flags.clone().unwrap_or_default(),
            )),
            ColumnKind::Enum => Self::Select(EnumSelectEditor::new(column.enum_options.clone())),
            ColumnKind::ActionButtons => {
                Self::Actions(ActionButtonsEditor::new(column.effective_buttons()))
            }
            ColumnKind::RowLabel => return None,
        };
        Some(editor)
    }

    pub fn bind(&mut self, value: &CellValue) {
        match self {
            Self::Text(editor) => editor.bind(value),
            Self::Checkbox(editor) => editor.bind(value),
            Self::Switch(editor) => editor.checkbox.bind(value),
            Self::Select(editor) => editor.bind(value),
            Self::Actions(_) => {}
        }
    }

    pub fn handle(&mut self, input: EditorInput) -> EditorResponse {
        match self {
            Self::Text(editor) => editor.handle(input),
            Self::Checkbox(editor) => editor.handle(input),
            Self::Switch(editor) => editor.checkbox.handle(input),
            Self::Select(editor) => editor.handle(input),
            Self::Actions(editor) => editor.handle(input),
        }
    }

    /// Action buttons ignore this; they are always live.
    pub fn set_read_only(&mut self, read_only: bool) {
        if let Some(chrome) = self.chrome_mut() {
            chrome.read_only = read_only;
        }
    }

    pub fn is_read_only(&self) -> bool {
        match self {
            Self::Text(editor) => editor.chrome.read_only,
            Self::Checkbox(editor) => editor.chrome.read_only,
            Self::Switch(editor) => editor.checkbox.chrome.read_only,
            Self::Select(editor) => editor.chrome.read_only,
            Self::Actions(_) => false,
        }
    }

    pub fn set_selected(&mut self, selected: bool) {
        if let Self::Actions(editor) = self {
            editor.selected = selected;
        } else if let Some(chrome) = self.chrome_mut() {
            chrome.selected = selected;
        }
    }

    pub fn render(&self) -> RenderedCell {
        match self {
            Self::Text(editor) => editor.render(),
            Self::Checkbox(editor) => editor.render(),
            Self::Switch(editor) => editor.render(),
            Self::Select(editor) => editor.render(),
            Self::Actions(editor) => editor.render(),
        }
    }

    fn chrome_mut(&mut self) -> Option<&mut Chrome> {
        match self {
            Self::Text(editor) => Some(&mut editor.chrome),
            Self::Checkbox(editor) => Some(&mut editor.chrome),
            Self::Switch(editor) => Some(&mut editor.checkbox.chrome),
            Self::Select(editor) => Some(&mut editor.chrome),
            Self::Actions(_) => None,
        }
    }
}
