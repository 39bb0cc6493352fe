use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical source format, as stored on job rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    Pdf,
    Image,
    #[serde(rename = "TXT")]
    Text,
}

const HEIC_EXTENSIONS: &[&str] = &["heic", "heif", "heics", "heifs"];

/// Lowercases and strips a leading dot: `".JPG"` becomes `"jpg"`.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

pub fn is_heic_extension(ext: &str) -> bool {
    HEIC_EXTENSIONS.contains(&normalize_extension(ext).as_str())
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match normalize_extension(ext).as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" | "heic" | "heif"
            | "heics" | "heifs" => Some(Self::Image),
            "txt" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Image => "IMAGE",
            Self::Text => "TXT",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PDF" => Ok(Self::Pdf),
            "IMAGE" => Ok(Self::Image),
            "TXT" => Ok(Self::Text),
            other => Err(format!("unknown file format '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(FileFormat::from_extension("pdf"), Some(FileFormat::Pdf));
        assert_eq!(FileFormat::from_extension(".JPG"), Some(FileFormat::Image));
        assert_eq!(FileFormat::from_extension("HeIc"), Some(FileFormat::Image));
        assert_eq!(FileFormat::from_extension("txt"), Some(FileFormat::Text));
        assert_eq!(FileFormat::from_extension("docx"), None);
        assert_eq!(FileFormat::from_extension(""), None);
    }

    #[test]
    fn test_heic_detection() {
        assert!(is_heic_extension(".HEIC"));
        assert!(is_heic_extension("heifs"));
        assert!(!is_heic_extension("png"));
    }

    #[test]
    fn test_db_string_round_trip() {
        for format in [FileFormat::Pdf, FileFormat::Image, FileFormat::Text] {
            assert_eq!(format.as_str().parse::<FileFormat>(), Ok(format));
        }
        assert!("DOCX".parse::<FileFormat>().is_err());
    }
}
