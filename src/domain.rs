use std::fmt;
use std::io::Error;

use ratatui::crossterm::event::KeyEvent;

use crate::api::Page;
use crate::preset::PresetState;

pub const HELP_TEXT: &str = "\
q        Quit
arrows   Move selection (or h j k l)
n / p    Next / previous page
1 - 5    Switch entity
s / S    Sort by the selected column, ascending / descending
Enter    Show record / confirm column selection
Esc      Leave the current view
c        Choose visible columns (Space toggles)
R        Reset columns to defaults
/        Search
y / Y    Copy cell / row
?        This help";

#[derive(Debug)]
pub enum DieselError {
    IoError(Error),
    /// No credential is available for an operation that needs one.
    Unauthenticated,
    /// Network level failure talking to the API.
    Transport(String),
    /// The API answered with a non success status.
    Http { status: u16, body: String },
    /// The API answered with a body we could not decode.
    Parse(String),
    /// The preset of the entity has not finished loading.
    NotLoaded,
    SaveInFlight,
    EmptySelection,
    Config(String),
}

impl DieselError {
    /// Failures of the remote data service, as opposed to local misuse.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DieselError::Transport(_) | DieselError::Http { .. } | DieselError::Parse(_)
        )
    }
}

impl DieselError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DieselError::Http { status: 404, .. })
    }
}

impl fmt::Display for DieselError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DieselError::IoError(e) => write!(f, "I/O error: {e}"),
            DieselError::Unauthenticated => write!(f, "Not authenticated"),
            DieselError::Transport(msg) => write!(f, "Network error: {msg}"),
            DieselError::Http { status, body } => write!(f, "API returned {status}: {body}"),
            DieselError::Parse(msg) => write!(f, "Invalid response: {msg}"),
            DieselError::NotLoaded => write!(f, "Columns are still loading"),
            DieselError::SaveInFlight => write!(f, "A save is already in progress"),
            DieselError::EmptySelection => write!(f, "Select at least one column"),
            DieselError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for DieselError {}

impl From<Error> for DieselError {
    fn from(err: Error) -> Self {
        DieselError::IoError(err)
    }
}

impl From<reqwest::Error> for DieselError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DieselError::Parse(err.to_string())
        } else {
            DieselError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DieselError {
    fn from(err: serde_json::Error) -> Self {
        DieselError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for DieselError {
    fn from(err: toml::de::Error) -> Self {
        DieselError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
}

/// Everything the model reacts to: key driven commands from the controller
/// and the results of background API calls.
#[derive(Debug)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    NextPage,
    PrevPage,
    SortAscending,
    SortDescending,
    SwitchEntity(usize),
    Enter,
    Exit,
    Help,
    CopyCell,
    CopyRow,
    EditColumns,
    ToggleColumn,
    ResetColumns,
    Search,
    Resize(usize, usize),
    RawKey(KeyEvent),
    PresetLoaded {
        generation: u64,
        columns: Vec<String>,
        state: PresetState,
    },
    PageLoaded {
        generation: u64,
        result: Result<Page, DieselError>,
    },
    ColumnsSaved {
        generation: u64,
        result: Result<Vec<String>, DieselError>,
    },
    ColumnsReset {
        generation: u64,
        columns: Vec<String>,
    },
}
