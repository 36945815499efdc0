// src/utils/manifest.rs: Sample manifests rebuilt from a stage's output folder

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::config::defs::PipelineError;

/// Sample name to canonical file path.
pub type SampleManifest = BTreeMap<String, PathBuf>;

const SAMPLE_TAGS: &[&str] = &["_pass", "_filtered"];


/// Derives a sample name from a file name: everything before the first `.`, minus a trailing
/// `_pass` or `_filtered` tag. Cutting at the first dot already drops compression extensions.
///
/// # Arguments
///
/// * `file_name` - bare file name, e.g. `barcode01_pass.fastq.gz`
///
/// # Returns
/// sample name, e.g. `barcode01`
pub fn sample_name(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    SAMPLE_TAGS
        .iter()
        .find_map(|tag| stem.strip_suffix(tag))
        .unwrap_or(stem)
        .to_string()
}


/// Recursively scans `root` for files whose name ends with `suffix` and maps each derived sample
/// name to the file's canonical path (symbolic links resolved).
///
/// Entries are visited sorted by file name within each folder. When two files map to the same
/// sample, the one visited last wins without any warning beyond a debug line.
///
/// # Arguments
///
/// * `root` - folder to scan; a missing folder counts as empty
/// * `suffix` - file name suffix to keep, e.g. `pass.fastq.gz`
///
/// # Returns
/// SampleManifest, or `EmptyManifest` if nothing matched
pub fn build(root: &Path, suffix: &str) -> Result<SampleManifest, PipelineError> {
    let mut manifest = SampleManifest::new();

    if root.is_dir() {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| PipelineError::IOError(format!("Cannot scan {}: {}", root.display(), e)))?;
            let file_name = entry.file_name().to_string_lossy();
            if !file_name.ends_with(suffix) || !entry.path().is_file() {
                continue;
            }
            let path = fs::canonicalize(entry.path())
                .map_err(|e| PipelineError::io(format!("Cannot resolve {}", entry.path().display()), e))?;
            let sample = sample_name(&file_name);
            if let Some(previous) = manifest.insert(sample.clone(), path) {
                debug!("Sample {} now points past {}", sample, previous.display());
            }
        }
    }

    if manifest.is_empty() {
        return Err(PipelineError::EmptyManifest {
            dir: root.to_path_buf(),
            suffix: suffix.to_string(),
        });
    }
    Ok(manifest)
}
