use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A named partition of records, mapped 1:1 to a remote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    AttendanceMarks,
    GradeEntries,
    StudentNotes,
}

impl Collection {
    /// Sweep order.
    pub const ALL: [Collection; 3] = [
        Collection::AttendanceMarks,
        Collection::GradeEntries,
        Collection::StudentNotes,
    ];

    /// Local table name.
    pub fn name(self) -> &'static str {
        match self {
            Collection::AttendanceMarks => "attendance_marks",
            Collection::GradeEntries => "grade_entries",
            Collection::StudentNotes => "student_notes",
        }
    }

    pub fn remote_table(self) -> &'static str {
        match self {
            Collection::AttendanceMarks => "attendance",
            Collection::GradeEntries => "grades",
            Collection::StudentNotes => "student_notes",
        }
    }
}

/// Maps a local collection name to its remote table; unknown names pass through.
pub fn remote_table_for(name: &str) -> &str {
    match name.parse::<Collection>() {
        Ok(collection) => collection.remote_table(),
        Err(_) => name,
    }
}

impl FromStr for Collection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| AppError::BadRequest(format!("unknown collection: {}", s)))
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
