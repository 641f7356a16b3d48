//! Record sources feeding items into a run.
//!
//! Text format, one item per line:
//!
//! ```text
//! # comment
//! <item id>\t<feature> <feature> ...
//! ```
//!
//! Integer tokens become `Feature::Id`, anything else `Feature::Token`.

use crate::error::{AppError, Result};
use crate::models::{Feature, Item, ItemId};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

/// Abstract, format-agnostic supplier of item records
pub trait RecordSource: Send + Sync {
    /// Read every item. Malformed records abort the read.
    fn read_items(&self) -> Result<Vec<Item>>;

    /// Stable identity of the input, used to key the seed log
    fn identity(&self) -> String;
}

/// Items held in memory
pub struct MemorySource {
    name: String,
    items: Vec<Item>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

impl RecordSource for MemorySource {
    fn read_items(&self) -> Result<Vec<Item>> {
        Ok(self.items.clone())
    }

    fn identity(&self) -> String {
        self.name.clone()
    }
}

/// Line-oriented text file
pub struct TextFileSource {
    path: PathBuf,
}

impl TextFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordSource for TextFileSource {
    fn read_items(&self) -> Result<Vec<Item>> {
        let file = File::open(&self.path).map_err(|e| {
            AppError::Io(format!("failed to open {}: {}", self.path.display(), e))
        })?;

        let mut items = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if let Some(item) = parse_record(idx + 1, &line)? {
                items.push(item);
            }
        }

        info!(
            path = %self.path.display(),
            records = items.len(),
            "Loaded item records"
        );
        Ok(items)
    }

    fn identity(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parse one line; `None` for blank lines and comments
pub fn parse_record(line_no: usize, line: &str) -> Result<Option<Item>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let (id_part, features_part) = match trimmed.split_once('\t') {
        Some((id, rest)) => (id, rest),
        None => (trimmed, ""),
    };

    let id: ItemId = id_part
        .trim()
        .parse()
        .map_err(|_| AppError::MalformedRecord {
            line: line_no,
            reason: format!("invalid item id '{}'", id_part.trim()),
        })?;

    let features = features_part
        .split_whitespace()
        .map(|token| match token.parse::<u64>() {
            Ok(value) => Feature::Id(value),
            Err(_) => Feature::Token(token.to_string()),
        })
        .collect();

    Ok(Some(Item { id, features }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_record_mixed_features() {
        let item = parse_record(1, "42\t7 red 7 blue").unwrap().unwrap();
        assert_eq!(item.id, 42);
        assert_eq!(item.features.len(), 3);
        assert!(item.features.contains(&Feature::Id(7)));
        assert!(item.features.contains(&Feature::Token("red".to_string())));
    }

    #[test]
    fn test_parse_record_without_features() {
        let item = parse_record(1, "9").unwrap().unwrap();
        assert_eq!(item.id, 9);
        assert!(item.features.is_empty());
    }

    #[test]
    fn test_parse_record_skips_comments_and_blanks() {
        assert!(parse_record(1, "   ").unwrap().is_none());
        assert!(parse_record(2, "# header").unwrap().is_none());
    }

    #[test]
    fn test_parse_record_rejects_bad_id() {
        let err = parse_record(5, "abc\t1 2").unwrap_err();
        assert!(matches!(err, AppError::MalformedRecord { line: 5, .. }));
    }

    #[test]
    fn test_text_file_source_reads_all_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# id\tfeatures").unwrap();
        writeln!(file, "0\ta b c").unwrap();
        writeln!(file, "1\ta b d").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "2\t100 200").unwrap();

        let source = TextFileSource::new(file.path());
        let items = source.read_items().unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[2].id, 2);
        assert_eq!(source.identity(), file.path().display().to_string());
    }

    #[test]
    fn test_text_file_source_missing_file() {
        let source = TextFileSource::new("/nonexistent/items.tsv");
        assert!(matches!(source.read_items(), Err(AppError::Io(_))));
    }
}
