//! Output bundle: an ordered map from relative path to file text, written
//! out as a zip archive or into a directory.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Root folder of every archive entry.
pub const ARCHIVE_ROOT: &str = "workflow";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    files: BTreeMap<String, String>,
}

impl Bundle {
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Moves every file of `other` under `prefix/`.
    pub fn merge_under(&mut self, prefix: &str, other: Bundle) {
        for (path, content) in other.files {
            self.files.insert(format!("{prefix}/{path}"), content);
        }
    }

    /// Deflated zip archive with every file under `workflow/`.
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        self.to_zip_under(Some(ARCHIVE_ROOT))
    }

    pub fn to_zip_under(&self, root: Option<&str>) -> Result<Vec<u8>> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in &self.files {
            let name = match root {
                Some(root) => format!("{root}/{path}"),
                None => path.clone(),
            };
            zip.start_file(name, options)?;
            zip.write_all(content.as_bytes())?;
        }
        let cursor = zip.finish()?;
        debug!("Zipped {} files", self.files.len());
        Ok(cursor.into_inner())
    }

    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        for (path, content) in &self.files {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_zip_layout() {
        let mut bundle = Bundle::default();
        bundle.insert("README.md", "# top\n");
        bundle.insert("Step_1-Order_genes/synths_plate.csv", "PLATE ID\n");
        let bytes = bundle.to_zip().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut text = String::new();
        archive
            .by_name("workflow/Step_1-Order_genes/synths_plate.csv")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "PLATE ID\n");
        assert_eq!(
            archive.by_name("workflow/README.md").unwrap().compression(),
            CompressionMethod::Deflated
        );
    }

    #[test]
    fn test_merge_and_write_to_dir() {
        let mut inner = Bundle::default();
        inner.insert("a.csv", "x\n");
        let mut bundle = Bundle::default();
        bundle.merge_under("Input", inner);
        assert!(bundle.contains("Input/a.csv"));
        let dir = tempfile::tempdir().unwrap();
        bundle.write_to_dir(dir.path()).unwrap();
        let text = fs::read_to_string(dir.path().join("Input").join("a.csv")).unwrap();
        assert_eq!(text, "x\n");
    }
}
