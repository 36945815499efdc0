// src/utils/barcodes.rs: Merging, renaming and pruning of the basecaller's per-barcode output

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::defs::{PipelineError, CLASSIFICATION_GROUPS, FASTQ_GZ_EXT, UNCLASSIFIED};
use crate::utils::file::{delete_files, list_files_in_folder, list_folders_in_folder, merge_files};


/// Characters a sample name may not contain: a `.` would be cut off when the name is read back
/// from a file name, path separators would escape the group folder.
const SAMPLE_NAME_FORBIDDEN: &[char] = &['.', '/', '\\'];


/// Barcode name (`barcode01`) to user-chosen sample name.
///
/// Sample names end up as folder and file names, so they may not contain `.` or path separators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarcodeAssignment {
    samples: BTreeMap<String, String>,
}

impl BarcodeAssignment {
    /// Parses a two-column, tab-separated description without header. Blank lines are skipped;
    /// a repeated barcode or sample name is an error.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let mut samples = BTreeMap::new();
        let mut seen_samples = HashSet::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let (barcode, sample) = match fields.as_slice() {
                [barcode, sample] if !barcode.is_empty() && !sample.is_empty() => (*barcode, *sample),
                _ => {
                    return Err(PipelineError::InvalidConfig(format!(
                        "Line {} of the sample description file must have two tab-separated columns: \
                         the barcode (e.g. barcode01) and the sample name (e.g. my_sample)",
                        line_no + 1
                    )));
                }
            };
            if let Some(bad) = sample.chars().find(|c| SAMPLE_NAME_FORBIDDEN.contains(c)) {
                return Err(PipelineError::InvalidConfig(format!(
                    "Sample name '{}' on line {} contains '{}'; sample names become file names and \
                     may not contain any of {:?}",
                    sample,
                    line_no + 1,
                    bad,
                    SAMPLE_NAME_FORBIDDEN
                )));
            }
            if !seen_samples.insert(sample.to_string()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "Sample name '{}' is assigned to more than one barcode",
                    sample
                )));
            }
            if samples.insert(barcode.to_string(), sample.to_string()).is_some() {
                return Err(PipelineError::InvalidConfig(format!(
                    "Barcode '{}' appears more than once in the sample description file",
                    barcode
                )));
            }
        }
        Ok(BarcodeAssignment { samples })
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("Cannot read sample description {}", path.display()), e))?;
        Self::parse(&text)
    }

    pub fn get(&self, barcode: &str) -> Option<&str> {
        self.samples.get(barcode).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}


/// What reconciliation did to the basecalled tree.
#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub merged: Vec<PathBuf>,
    /// (group, barcode, sample)
    pub renamed: Vec<(String, String, String)>,
    pub deleted: Vec<PathBuf>,
}


/// Merges the fastq fragments of every classification group and, when an assignment is given,
/// renames barcode folders to sample names.
///
/// Barcode folders that are neither assigned nor `unclassified` are deleted with everything in
/// them. This discards any data whose barcode is missing from the description file; every deletion
/// is logged at warn level and listed in the report.
pub fn merge_and_rename(
    basecalled_folder: &Path,
    barcoding: bool,
    assignment: Option<&BarcodeAssignment>,
) -> Result<ReconciliationReport, PipelineError> {
    let mut report = ReconciliationReport::default();
    merge_fastq(basecalled_folder, barcoding, &mut report)?;
    if let Some(assignment) = assignment {
        rename_barcodes(assignment, basecalled_folder, &mut report)?;
    }
    Ok(report)
}


/// Concatenates fragments into one file per group (`pass.fastq.gz`) or, with barcoding, one file
/// per barcode folder (`barcode01_pass.fastq.gz`), then deletes the fragments.
pub fn merge_fastq(
    basecalled_folder: &Path,
    barcoding: bool,
    report: &mut ReconciliationReport,
) -> Result<(), PipelineError> {
    for group in CLASSIFICATION_GROUPS {
        let group_folder = basecalled_folder.join(group);
        if !group_folder.is_dir() {
            debug!("No {} folder in {}", group, basecalled_folder.display());
            continue;
        }

        if !barcoding {
            let merged = group_folder.join(format!("{}{}", group, FASTQ_GZ_EXT));
            if merge_folder(&group_folder, &merged)? {
                report.merged.push(merged);
            }
        } else {
            for barcode_folder in list_folders_in_folder(&group_folder)? {
                let barcode = folder_name(&barcode_folder);
                let merged = barcode_folder.join(format!("{}_{}{}", barcode, group, FASTQ_GZ_EXT));
                if merge_folder(&barcode_folder, &merged)? {
                    report.merged.push(merged);
                }
            }
        }
    }
    Ok(())
}

fn merge_folder(folder: &Path, merged: &Path) -> Result<bool, PipelineError> {
    let fragments: Vec<PathBuf> = list_files_in_folder(folder, FASTQ_GZ_EXT)?
        .into_iter()
        .filter(|f| f != merged)
        .collect();
    if fragments.is_empty() {
        debug!("Nothing to merge in {}", folder.display());
        return Ok(false);
    }
    let bytes = merge_files(&fragments, merged)?;
    delete_files(&fragments)?;
    debug!("Merged {} fragments ({} bytes) into {}", fragments.len(), bytes, merged.display());
    Ok(true)
}


/// Renames assigned barcode folders (and their merged file) to sample names, keeps `unclassified`
/// and deletes every other barcode folder. Groups are handled one after the other.
pub fn rename_barcodes(
    assignment: &BarcodeAssignment,
    basecalled_folder: &Path,
    report: &mut ReconciliationReport,
) -> Result<(), PipelineError> {
    for group in CLASSIFICATION_GROUPS {
        let group_folder = basecalled_folder.join(group);
        if !group_folder.is_dir() {
            continue;
        }

        for barcode_folder in list_folders_in_folder(&group_folder)? {
            let barcode = folder_name(&barcode_folder);

            if let Some(sample) = assignment.get(&barcode) {
                if sample != barcode {
                    rename_barcode(&group_folder, group, &barcode, sample)?;
                }
                report.renamed.push((group.to_string(), barcode, sample.to_string()));
            } else if barcode == UNCLASSIFIED {
                continue;
            } else {
                warn!(
                    "Deleting {}: barcode '{}' in '{}' is not in the sample description file",
                    barcode_folder.display(),
                    barcode,
                    group
                );
                fs::remove_dir_all(&barcode_folder)
                    .map_err(|e| PipelineError::io(format!("Cannot delete {}", barcode_folder.display()), e))?;
                report.deleted.push(barcode_folder);
            }
        }
    }
    Ok(())
}

fn rename_barcode(group_folder: &Path, group: &str, barcode: &str, sample: &str) -> Result<(), PipelineError> {
    let barcode_folder = group_folder.join(barcode);
    let sample_folder = group_folder.join(sample);
    if sample_folder.exists() {
        return Err(PipelineError::BarcodeCollision {
            group: group.to_string(),
            barcode: barcode.to_string(),
            sample: sample.to_string(),
            target: sample_folder,
        });
    }
    fs::rename(&barcode_folder, &sample_folder)
        .map_err(|e| PipelineError::io(format!("Cannot rename {}", barcode_folder.display()), e))?;

    let current = sample_folder.join(format!("{}_{}{}", barcode, group, FASTQ_GZ_EXT));
    if current.exists() {
        let renamed = sample_folder.join(format!("{}_{}{}", sample, group, FASTQ_GZ_EXT));
        fs::rename(&current, &renamed)
            .map_err(|e| PipelineError::io(format!("Cannot rename {}", current.display()), e))?;
    }
    info!("{}/{} -> {}/{}", group, barcode, group, sample);
    Ok(())
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
