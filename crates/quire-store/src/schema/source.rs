//! The `type_source` classification shared by every record kind.

use std::fmt;
use std::str::FromStr;

use quire_core::Error;
use serde::{Deserialize, Serialize};

/// Where an ingested document came from.
///
/// Serialized with the wire values used in stored payloads, so filters such
/// as `{"type_source": "pdf файл"}` match records constructed from raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// A web page.
    #[serde(rename = "сайт")]
    Site,
    /// A plain-text file.
    #[serde(rename = "текстовый файл")]
    TextFile,
    /// A PDF document.
    #[serde(rename = "pdf файл")]
    PdfFile,
    /// An Excel spreadsheet.
    #[serde(rename = "excel таблица")]
    ExcelFile,
    /// An export from the Kaskad catalogue system.
    #[serde(rename = "каскад")]
    Kaskad,
    /// A Word document.
    #[serde(rename = "Word файл")]
    WordFile,
}

impl SourceType {
    /// Every member, in declaration order.
    pub const ALL: [SourceType; 6] = [
        SourceType::Site,
        SourceType::TextFile,
        SourceType::PdfFile,
        SourceType::ExcelFile,
        SourceType::Kaskad,
        SourceType::WordFile,
    ];

    /// The value stored in payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Site => "сайт",
            SourceType::TextFile => "текстовый файл",
            SourceType::PdfFile => "pdf файл",
            SourceType::ExcelFile => "excel таблица",
            SourceType::Kaskad => "каскад",
            SourceType::WordFile => "Word файл",
        }
    }

    /// Decode a stored value. Matching is exact.
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s).ok_or_else(|| Error::UnknownSourceType(s.to_string()))
    }
}
