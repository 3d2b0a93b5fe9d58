//! Design bundles on disk: a directory, a zip archive or single files, any
//! of which may be gzip-compressed. CSV files are designs, GenBank files are
//! plasmid maps.

use crate::design::Design;
use crate::error::{CompileError, Result};
use crate::registry::PlasmidMap;
use flate2::read::GzDecoder;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

const GENBANK_EXTENSIONS: [&str; 3] = ["gb", "gbk", "genbank"];

/// One design table and the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignFile {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesignBundle {
    pub designs: Vec<DesignFile>,
    pub plasmid_maps: Vec<PlasmidMap>,
}

fn utf8(name: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| CompileError::InvalidInput(format!("{name} is not UTF-8: {e}")))
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = vec![];
    GzDecoder::new(bytes).read_to_end(&mut decoded)?;
    Ok(decoded)
}

impl DesignBundle {
    /// Reads `path` as a directory, a `.zip` archive or a single file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut bundle = Self::default();
        bundle.add_path(path)?;
        Ok(bundle)
    }

    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.is_dir() {
            return self.add_dir(path);
        }
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CompileError::InvalidInput(format!("bad file name {}", path.display())))?;
        if name.to_ascii_lowercase().ends_with(".zip") {
            self.add_zip(&bytes)
        } else {
            self.add_file(name, bytes)
        }
    }

    /// Every file below `dir`, in path order.
    pub fn add_dir(&mut self, dir: &Path) -> Result<()> {
        let mut entries = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        for path in entries {
            self.add_path(path)?;
        }
        Ok(())
    }

    pub fn add_zip(&mut self, bytes: &[u8]) -> Result<()> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut contents = vec![];
            file.read_to_end(&mut contents)?;
            self.add_file(&name, contents)?;
        }
        Ok(())
    }

    /// Classifies one file by extension, after stripping a `.gz` suffix.
    /// Hidden files and unknown extensions are skipped.
    pub fn add_file(&mut self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        if name.starts_with('.') || path.contains("__MACOSX") {
            return Ok(());
        }
        let (name, bytes) = match name.strip_suffix(".gz") {
            Some(inner) => (inner, gunzip(&bytes)?),
            None => (name, bytes),
        };
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if extension == "csv" {
            let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
            debug!("Design {stem} from {path}");
            self.designs.push(DesignFile {
                name: stem.to_string(),
                text: utf8(name, bytes)?,
            });
        } else if GENBANK_EXTENSIONS.contains(&extension.as_str()) {
            let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
            self.plasmid_maps.push(PlasmidMap {
                filename: format!("{stem}.gb"),
                contents: utf8(name, bytes)?,
            });
        } else {
            debug!("Skipping {path}");
        }
        Ok(())
    }

    pub fn parse_designs(&self) -> Result<Vec<Design>> {
        self.designs.iter().map(|d| Design::parse(&d.text)).collect()
    }

    pub fn design_names(&self) -> Vec<String> {
        self.designs.iter().map(|d| d.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::SAMPLE_DESIGN;
    use crate::registry::tests::SAMPLE_GENBANK;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(vec![], Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_add_file_classifies_by_extension() {
        let mut bundle = DesignBundle::default();
        bundle.add_file("designs/demo.csv.gz", gzip(SAMPLE_DESIGN)).unwrap();
        bundle
            .add_file("maps/construct_1.gbk", SAMPLE_GENBANK.as_bytes().to_vec())
            .unwrap();
        bundle.add_file("notes.txt", b"ignored".to_vec()).unwrap();
        bundle.add_file(".DS_Store", vec![0, 1]).unwrap();
        assert_eq!(bundle.design_names(), vec!["demo"]);
        assert_eq!(bundle.designs[0].text, SAMPLE_DESIGN);
        assert_eq!(bundle.plasmid_maps[0].filename, "construct_1.gb");
        assert_eq!(bundle.parse_designs().unwrap().len(), 1);
    }

    #[test]
    fn test_from_dir_and_zip() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), SAMPLE_DESIGN).unwrap();
        fs::write(dir.path().join("a.csv"), SAMPLE_DESIGN).unwrap();
        let bundle = DesignBundle::from_path(dir.path()).unwrap();
        assert_eq!(bundle.design_names(), vec!["a", "b"]);

        let mut source = crate::bundle::Bundle::default();
        source.insert("demo.csv", SAMPLE_DESIGN);
        source.insert("construct_1.gb", SAMPLE_GENBANK);
        let zipped = dir.path().join("designs.zip");
        fs::write(&zipped, source.to_zip_under(None).unwrap()).unwrap();
        let bundle = DesignBundle::from_path(&zipped).unwrap();
        assert_eq!(bundle.design_names(), vec!["demo"]);
        assert_eq!(bundle.plasmid_maps.len(), 1);
    }

    #[test]
    fn test_bad_gzip_is_an_error() {
        let mut bundle = DesignBundle::default();
        assert!(bundle.add_file("demo.csv.gz", b"not gzip".to_vec()).is_err());
    }
}
