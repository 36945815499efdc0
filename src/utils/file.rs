// src/utils/file.rs: Filesystem helpers shared by the pipeline stages

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::config::defs::{PipelineError, RAW_EXT};


/// Creates a folder and its parents; an existing folder is fine.
pub fn make_folder(folder: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(folder)
        .map_err(|e| PipelineError::io(format!("Cannot create folder {}", folder.display()), e))
}


/// Writes an empty stage completion flag.
///
/// The flag is created as a temp file beside its final location and renamed into place, so it
/// either exists completely or not at all.
pub fn flag_done(flag_file: &Path) -> Result<(), PipelineError> {
    let parent = flag_file.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(parent)
        .map_err(|e| PipelineError::io(format!("Cannot create temp flag in {}", parent.display()), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::io("Cannot sync temp flag", e))?;
    tmp.persist(flag_file)
        .map_err(|e| PipelineError::io(format!("Cannot write flag {}", flag_file.display()), e.error))?;
    debug!("Wrote flag {}", flag_file.display());
    Ok(())
}


/// Regular files directly inside `folder` whose name ends with `suffix`, sorted by file name.
pub fn list_files_in_folder(folder: &Path, suffix: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    let entries = fs::read_dir(folder)
        .map_err(|e| PipelineError::io(format!("Cannot list {}", folder.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(format!("Cannot list {}", folder.display()), e))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(suffix))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}


/// Sub-folders directly inside `folder`, sorted by name.
pub fn list_folders_in_folder(folder: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut folders = Vec::new();
    let entries = fs::read_dir(folder)
        .map_err(|e| PipelineError::io(format!("Cannot list {}", folder.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(format!("Cannot list {}", folder.display()), e))?;
        if entry.path().is_dir() {
            folders.push(entry.path());
        }
    }
    folders.sort();
    Ok(folders)
}


/// Concatenates `file_list` byte for byte, in order, into `merged_file`.
///
/// The merged file is assembled in a temp file in the destination folder and renamed at the end,
/// so an interrupted merge never leaves a truncated file under the final name.
pub fn merge_files(file_list: &[PathBuf], merged_file: &Path) -> Result<u64, PipelineError> {
    let parent = merged_file.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|e| PipelineError::io(format!("Cannot create temp file in {}", parent.display()), e))?;
    let mut total = 0u64;
    for f in file_list {
        let mut fd = File::open(f).map_err(|e| PipelineError::io(format!("Cannot open {}", f.display()), e))?;
        total += io::copy(&mut fd, &mut tmp)
            .map_err(|e| PipelineError::io(format!("Cannot copy {}", f.display()), e))?;
    }
    tmp.flush().map_err(|e| PipelineError::io("Cannot flush merged file", e))?;
    tmp.persist(merged_file)
        .map_err(|e| PipelineError::io(format!("Cannot write {}", merged_file.display()), e.error))?;
    Ok(total)
}


pub fn delete_files(file_list: &[PathBuf]) -> Result<(), PipelineError> {
    for f in file_list {
        fs::remove_file(f).map_err(|e| PipelineError::io(format!("Cannot delete {}", f.display()), e))?;
    }
    Ok(())
}


/// Removes a folder tree if it exists. Returns whether anything was removed.
pub fn remove_folder_if_exists(folder: &Path) -> Result<bool, PipelineError> {
    if !folder.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(folder)
        .map_err(|e| PipelineError::io(format!("Cannot remove {}", folder.display()), e))?;
    Ok(true)
}


pub fn check_input(input_folder: &Path) -> Result<(), PipelineError> {
    if !input_folder.exists() {
        return Err(PipelineError::InvalidInput(format!(
            "{} does not exist. Please select an existing folder as input.",
            input_folder.display()
        )));
    }
    if !input_folder.is_dir() {
        return Err(PipelineError::InvalidInput(format!(
            "{} is not a folder. Please select a folder as input.",
            input_folder.display()
        )));
    }
    Ok(())
}


/// Fails unless at least one raw signal file exists somewhere below `input_folder`.
pub fn check_raw_data(input_folder: &Path) -> Result<(), PipelineError> {
    let found = WalkDir::new(input_folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && e.file_name().to_string_lossy().ends_with(RAW_EXT));
    if found {
        Ok(())
    } else {
        Err(PipelineError::InvalidInput(format!(
            "No {} files detected in {}",
            RAW_EXT,
            input_folder.display()
        )))
    }
}
