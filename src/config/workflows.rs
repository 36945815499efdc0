// src/config/workflows.rs: Resolution of the basecaller configuration file

use std::fs;
use std::path::Path;

use log::debug;

use crate::cli::Sequencer;
use crate::config::defs::{PipelineError, GUPPY_CONFIG_EXT, PROMETHION_MARKER};
use crate::config::kits::{check_configuration, check_flowcell, check_library_kit};

/// Catalog bundled with the binary, in the `--print_workflows` layout of the basecaller.
pub const DEFAULT_WORKFLOWS: &str = include_str!("../../data/workflows.tsv");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEntry {
    pub flowcell: String,
    pub kit: String,
    pub config_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    pub entries: Vec<WorkflowEntry>,
}

impl WorkflowCatalog {
    /// Parses a tab-separated catalog. The header row names the columns; only `flowcell`, `kit`
    /// and `config_name` are read, in whatever position they appear.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let (_, header) = lines
            .next()
            .ok_or_else(|| PipelineError::InvalidConfig("Workflow catalog is empty".to_string()))?;

        let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
        let column = |name: &str| {
            columns.iter().position(|c| *c == name).ok_or_else(|| {
                PipelineError::InvalidConfig(format!("Workflow catalog has no '{}' column", name))
            })
        };
        let flowcell_idx = column("flowcell")?;
        let kit_idx = column("kit")?;
        let config_idx = column("config_name")?;

        let mut entries = Vec::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let field = |idx: usize| {
                fields.get(idx).map(|f| f.to_string()).ok_or_else(|| {
                    PipelineError::InvalidConfig(format!(
                        "Workflow catalog line {} has {} columns, expected at least {}",
                        line_no + 1,
                        fields.len(),
                        idx + 1
                    ))
                })
            };
            entries.push(WorkflowEntry {
                flowcell: field(flowcell_idx)?,
                kit: field(kit_idx)?,
                config_name: field(config_idx)?,
            });
        }
        Ok(WorkflowCatalog { entries })
    }

    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        match path {
            Some(path) => {
                debug!("Loading workflow catalog from {}", path.display());
                let text = fs::read_to_string(path)
                    .map_err(|e| PipelineError::io(format!("Cannot read workflow catalog {}", path.display()), e))?;
                Self::parse(&text)
            }
            None => Self::parse(DEFAULT_WORKFLOWS),
        }
    }
}


/// Picks the basecaller configuration file to use.
///
/// Either an explicit configuration or the full flowcell/kit/sequencer triple must be given, never
/// both. An explicit configuration is only checked against the supported list and returned as given.
/// Otherwise the catalog is narrowed to the rows matching flowcell and kit, then to the rows whose
/// config name does (PromethION) or does not (everything else) carry the `prom` marker. Exactly one
/// config name has to survive; the `.cfg` extension is appended to it.
pub fn resolve(
    catalog: &WorkflowCatalog,
    flowcell: Option<&str>,
    library_kit: Option<&str>,
    sequencer: Option<Sequencer>,
    explicit_config: Option<&str>,
) -> Result<String, PipelineError> {
    let any_triple = flowcell.is_some() || library_kit.is_some() || sequencer.is_some();

    if let Some(config) = explicit_config {
        if any_triple {
            return Err(PipelineError::InvalidConfig(
                "Use either a config file (-c) or a flowcell/library kit/sequencer combination (-f/-l/-s), not both"
                    .to_string(),
            ));
        }
        check_configuration(config)?;
        return Ok(config.to_string());
    }

    let (flowcell, kit, sequencer) = match (flowcell, library_kit, sequencer) {
        (Some(f), Some(k), Some(s)) => (f, k, s),
        _ => {
            return Err(PipelineError::InvalidConfig(
                "A config file (-c) or all of flowcell (-f), library kit (-l) and sequencer (-s) are required"
                    .to_string(),
            ));
        }
    };
    check_flowcell(flowcell)?;
    check_library_kit(kit)?;

    let promethion = sequencer == Sequencer::Promethion;
    let mut matches: Vec<&str> = catalog
        .entries
        .iter()
        .filter(|e| e.flowcell == flowcell && e.kit == kit)
        .filter(|e| e.config_name.contains(PROMETHION_MARKER) == promethion)
        .map(|e| e.config_name.as_str())
        .collect();
    matches.sort_unstable();
    matches.dedup();

    let query = format!("flowcell {}, library kit {}, sequencer {:?}", flowcell, kit, sequencer);
    match matches.as_slice() {
        [config] => {
            debug!("Resolved {} to {}", query, config);
            Ok(format!("{}{}", config, GUPPY_CONFIG_EXT))
        }
        [] => Err(PipelineError::ConfigResolution {
            query,
            reason: "no matching workflow".to_string(),
        }),
        many => Err(PipelineError::ConfigResolution {
            query,
            reason: format!("ambiguous, candidates are {}; use -c to pick one", many.join(", ")),
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(rows: &[(&str, &str, &str)]) -> WorkflowCatalog {
        WorkflowCatalog {
            entries: rows
                .iter()
                .map(|(f, k, c)| WorkflowEntry {
                    flowcell: f.to_string(),
                    kit: k.to_string(),
                    config_name: c.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_promethion_picks_marked_row() {
        let cat = catalog(&[("FLO-MIN106", "SQK-LSK109", "cfgA"), ("FLO-MIN106", "SQK-LSK109", "cfgA_prom")]);
        let cfg = resolve(&cat, Some("FLO-MIN106"), Some("SQK-LSK109"), Some(Sequencer::Promethion), None).unwrap();
        assert_eq!(cfg, "cfgA_prom.cfg");
        let cfg = resolve(&cat, Some("FLO-MIN106"), Some("SQK-LSK109"), Some(Sequencer::Minion), None).unwrap();
        assert_eq!(cfg, "cfgA.cfg");
    }

    #[test]
    fn test_minion_ambiguous() {
        let cat = catalog(&[
            ("FLO-MIN106", "SQK-LSK109", "cfgA"),
            ("FLO-MIN106", "SQK-LSK109", "cfgB"),
            ("FLO-MIN106", "SQK-LSK109", "cfgA_prom"),
        ]);
        let err = resolve(&cat, Some("FLO-MIN106"), Some("SQK-LSK109"), Some(Sequencer::Minion), None).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigResolution { .. }));
        assert!(err.to_string().contains("cfgA, cfgB"));
    }

    #[test]
    fn test_no_match() {
        let cat = catalog(&[("FLO-MIN106", "SQK-LSK109", "cfgA")]);
        let err = resolve(&cat, Some("FLO-MIN106"), Some("SQK-LSK110"), Some(Sequencer::Minion), None).unwrap_err();
        assert!(err.to_string().contains("SQK-LSK110"));
        let err = resolve(&cat, Some("FLO-MIN106"), Some("SQK-LSK109"), Some(Sequencer::Promethion), None).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigResolution { .. }));
    }

    #[test]
    fn test_explicit_and_incomplete_inputs() {
        let cat = WorkflowCatalog::default();
        assert_eq!(
            resolve(&cat, None, None, None, Some("dna_r9.4.1_450bps_hac.cfg")).unwrap(),
            "dna_r9.4.1_450bps_hac.cfg"
        );
        assert!(resolve(&cat, Some("FLO-MIN106"), None, None, Some("dna_r9.4.1_450bps_hac")).is_err());
        assert!(resolve(&cat, None, None, None, Some("made_up_config")).is_err());
        assert!(resolve(&cat, Some("FLO-MIN106"), Some("SQK-LSK109"), None, None).is_err());
        assert!(resolve(&cat, None, None, None, None).is_err());
    }

    #[test]
    fn test_unknown_flowcell_rejected_before_lookup() {
        let cat = catalog(&[("FLO-XYZ", "SQK-LSK109", "cfgA")]);
        let err = resolve(&cat, Some("FLO-XYZ"), Some("SQK-LSK109"), Some(Sequencer::Minion), None).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_parse_by_header_name() {
        let text = "config_name\tkit\tflowcell\nfoo\tSQK-LSK109\tFLO-MIN106\n\n";
        let cat = WorkflowCatalog::parse(text).unwrap();
        assert_eq!(
            cat.entries,
            vec![WorkflowEntry {
                flowcell: "FLO-MIN106".to_string(),
                kit: "SQK-LSK109".to_string(),
                config_name: "foo".to_string(),
            }]
        );
        assert!(WorkflowCatalog::parse("flowcell\tkit\n").is_err());
        assert!(WorkflowCatalog::parse("flowcell\tkit\tconfig_name\nFLO-MIN106\tSQK-LSK109\n").is_err());
    }

    #[test]
    fn test_bundled_catalog() {
        let cat = WorkflowCatalog::load(None).unwrap();
        let cfg = resolve(&cat, Some("FLO-MIN106"), Some("SQK-LSK109"), Some(Sequencer::Minion), None).unwrap();
        assert_eq!(cfg, "dna_r9.4.1_450bps_hac.cfg");
        let cfg = resolve(&cat, Some("FLO-PRO002"), Some("SQK-LSK109"), Some(Sequencer::Promethion), None).unwrap();
        assert_eq!(cfg, "dna_r9.4.1_450bps_hac_prom.cfg");
    }
}
