use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use serde::Deserialize;
use thiserror::Error;

use super::types::LabelMap;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read label config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse label config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("label config {0} has no labels")]
    Empty(PathBuf),

    #[error("class index {class} is outside the label table of {len} colors")]
    UnknownClass { class: usize, len: usize },
}

#[derive(Debug, Deserialize)]
struct LabelConfig {
    labels: Vec<LabelEntry>,
}

/// One table entry: a bare `[r, g, b]` or a named color.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelEntry {
    Color([u8; 3]),
    Named {
        #[serde(default)]
        name: Option<String>,
        color: [u8; 3],
    },
}

/// Class index to display color, in RGB order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    colors: Vec<Rgb<u8>>,
    names: Vec<Option<String>>,
}

impl LabelTable {
    pub fn new(colors: Vec<[u8; 3]>) -> Self {
        let names = vec![None; colors.len()];
        Self {
            colors: colors.into_iter().map(Rgb).collect(),
            names,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|err| match err {
            ParseFailure::Json(source) => LabelError::Parse {
                path: path.to_path_buf(),
                source,
            },
            ParseFailure::Empty => LabelError::Empty(path.to_path_buf()),
        })
    }

    fn parse(text: &str) -> Result<Self, ParseFailure> {
        let config: LabelConfig = serde_json::from_str(text).map_err(ParseFailure::Json)?;
        if config.labels.is_empty() {
            return Err(ParseFailure::Empty);
        }

        let mut colors = Vec::with_capacity(config.labels.len());
        let mut names = Vec::with_capacity(config.labels.len());
        for entry in config.labels {
            match entry {
                LabelEntry::Color(color) => {
                    colors.push(Rgb(color));
                    names.push(None);
                }
                LabelEntry::Named { name, color } => {
                    colors.push(Rgb(color));
                    names.push(name);
                }
            }
        }
        Ok(Self { colors, names })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn color(&self, class: usize) -> Option<Rgb<u8>> {
        self.colors.get(class).copied()
    }

    pub fn name(&self, class: usize) -> Option<&str> {
        self.names.get(class).and_then(|n| n.as_deref())
    }

    /// Short form for logs, e.g. `3 colors (void, road, sky)`
    fn describe(&self) -> String {
        let count = match self.len() {
            1 => "1 color".to_string(),
            n => format!("{n} colors"),
        };
        let names: Vec<&str> = (0..self.len()).filter_map(|class| self.name(class)).collect();
        if names.is_empty() {
            count
        } else {
            format!("{count} ({})", names.join(", "))
        }
    }

    /// Paint every pixel with its class color. The mask keeps the table's RGB order.
    pub fn colorize(&self, map: &LabelMap) -> Result<RgbImage, LabelError> {
        let _span = tracing::debug_span!("colorize").entered();

        let (width, height) = map.dimensions();
        let mut raw = Vec::with_capacity(map.as_slice().len() * 3);
        for &class in map.as_slice() {
            let color = self.color(class).ok_or(LabelError::UnknownClass {
                class,
                len: self.len(),
            })?;
            raw.extend_from_slice(&color.0);
        }

        // lengths agree by construction of LabelMap
        Ok(RgbImage::from_raw(width, height, raw).unwrap_or_else(|| RgbImage::new(width, height)))
    }
}

#[derive(Debug)]
enum ParseFailure {
    Json(serde_json::Error),
    Empty,
}

/// Where the node gets its label table from on each frame
#[derive(Debug)]
pub enum LabelSource {
    /// Loaded once at startup
    Fixed(LabelTable),
    /// Re-read from disk on every frame, falling back to the last good table
    Reload { path: PathBuf, last: LabelTable },
}

impl LabelSource {
    /// Load the table once. Startup fails if it can't be read.
    pub fn open<P: AsRef<Path>>(path: P, reload: bool) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let table = LabelTable::load(path)?;
        tracing::info!("Loaded {} from {}", table.describe(), path.display());

        Ok(if reload {
            Self::Reload {
                path: path.to_path_buf(),
                last: table,
            }
        } else {
            Self::Fixed(table)
        })
    }

    pub fn current(&mut self) -> &LabelTable {
        match self {
            Self::Fixed(table) => table,
            Self::Reload { path, last } => {
                match LabelTable::load(&*path) {
                    Ok(table) => *last = table,
                    Err(err) => tracing::warn!("Keeping previous label table: {err}"),
                }
                last
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_plain_and_named_entries() {
        let table = LabelTable::parse(
            r#"{"labels": [[0, 0, 0], {"name": "road", "color": [128, 64, 128]}]}"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.color(1), Some(Rgb([128, 64, 128])));
        assert_eq!(table.name(1), Some("road"));
        assert_eq!(table.name(0), None);
        assert_eq!(table.color(2), None);
    }

    #[test]
    fn test_describe_lists_named_classes() {
        let table = LabelTable::parse(
            r#"{"labels": [{"name": "void", "color": [0, 0, 0]}, [1, 1, 1], {"name": "road", "color": [128, 64, 128]}]}"#,
        )
        .unwrap();
        assert_eq!(table.describe(), "3 colors (void, road)");
        assert_eq!(LabelTable::new(vec![[0, 0, 0]]).describe(), "1 color");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(LabelTable::load(&missing), Err(LabelError::Io { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{\"labels\": [[1, 2]]}").unwrap();
        assert!(matches!(LabelTable::load(&bad), Err(LabelError::Parse { .. })));

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "{\"labels\": []}").unwrap();
        assert!(matches!(LabelTable::load(&empty), Err(LabelError::Empty(_))));
    }

    #[test]
    fn test_colorize_uses_table_colors() {
        let table = LabelTable::new(vec![[10, 20, 30], [200, 100, 50]]);
        let map = LabelMap::new(3, 1, vec![1, 0, 1]).unwrap();
        let mask = table.colorize(&map).unwrap();
        assert_eq!(mask.get_pixel(0, 0), &Rgb([200, 100, 50]));
        assert_eq!(mask.get_pixel(1, 0), &Rgb([10, 20, 30]));
        assert_eq!(mask.get_pixel(2, 0), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_colorize_rejects_unknown_class() {
        let table = LabelTable::new(vec![[0, 0, 0]]);
        let map = LabelMap::new(1, 1, vec![3]).unwrap();
        assert!(matches!(
            table.colorize(&map),
            Err(LabelError::UnknownClass { class: 3, len: 1 })
        ));
    }

    #[test]
    fn test_reload_keeps_last_good_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"labels\": [[1, 1, 1]]}}").unwrap();
        file.flush().unwrap();

        let mut source = LabelSource::open(file.path(), true).unwrap();
        assert_eq!(source.current().color(0), Some(Rgb([1, 1, 1])));

        std::fs::write(file.path(), "{\"labels\": [[9, 9, 9], [8, 8, 8]]}").unwrap();
        assert_eq!(source.current().len(), 2);

        std::fs::write(file.path(), "not json").unwrap();
        assert_eq!(source.current().color(0), Some(Rgb([9, 9, 9])));
    }

    #[test]
    fn test_fixed_source_ignores_disk_changes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{\"labels\": [[1, 1, 1]]}").unwrap();

        let mut source = LabelSource::open(file.path(), false).unwrap();
        std::fs::write(file.path(), "{\"labels\": [[2, 2, 2]]}").unwrap();
        assert_eq!(source.current().color(0), Some(Rgb([1, 1, 1])));
    }
}
