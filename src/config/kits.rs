// src/config/kits.rs: Static lookup tables for flowcells, kits and basecalling configurations

use crate::config::defs::{PipelineError, GUPPY_CONFIG_EXT, UNKNOWN_BARCODE_KIT};

pub const BARCODE_KITS: &[&str] = &[
    "EXP-NBD104", "EXP-NBA114", "SQK-RBK114.96", "SQK-RBK114.24", "SQK-NBD114.96",
    "SQK-NBD114.24", "SQK-PCB111.24", "SQK-RPB004", "SQK-PBK004", "SQK-RBK110.96",
    "SQK-RBK004", "SQK-16S024", "SQK-RAB204", "EXP-PBC096", "EXP-PBC001", "EXP-NBD114",
    "EXP-NBD196", UNKNOWN_BARCODE_KIT,
];

pub const LIBRARY_KITS: &[&str] = &[
    "SQK-16S024", "SQK-CS9109", "SQK-DCS108", "SQK-DCS109", "SQK-LRK001", "SQK-LSK108",
    "SQK-LSK109", "SQK-LSK109-XL", "SQK-LSK110", "SQK-LSK110-XL", "SQK-LSK111", "SQK-LSK111-XL",
    "SQK-LSK112", "SQK-LSK112-XL", "SQK-LSK114", "SQK-LSK114-XL", "SQK-LSK308", "SQK-LSK309",
    "SQK-LSK319", "SQK-LWB001", "SQK-LWP001", "SQK-MLK111-96-XL", "SQK-NBD111-24", "SQK-NBD111-96",
    "SQK-NBD112-24", "SQK-NBD112-96", "SQK-NBD114-24", "SQK-NBD114-96", "SQK-PBK004", "SQK-PCB109",
    "SQK-PCB110", "SQK-PCB111-24", "SQK-PCS108", "SQK-PCS109", "SQK-PCS111", "SQK-PSK004",
    "SQK-RAB201", "SQK-RAB204", "SQK-RAD002", "SQK-RAD003", "SQK-RAD004", "SQK-RAD112",
    "SQK-RAD114", "SQK-RAS201", "SQK-RBK001", "SQK-RBK004", "SQK-RBK110-96", "SQK-RBK111-24",
    "SQK-RBK111-96", "SQK-RBK112-24", "SQK-RBK112-96", "SQK-RBK114-24", "SQK-RBK114-96",
    "SQK-RLB001", "SQK-RLI001", "SQK-RNA001", "SQK-RNA002", "SQK-RPB004", "SQK-ULK001",
    "SQK-ULK114", "VSK-PTC001", "VSK-VBK001", "VSK-VMK001", "VSK-VMK004", "VSK-VPS001",
    "VSK-VSK001", "VSK-VSK003", "VSK-VSK004",
];

pub const FLOWCELLS: &[&str] = &[
    "FLO-FLG001", "FLO-FLG111", "FLO-FLG114", "FLO-MIN106", "FLO-MIN107", "FLO-MIN110", "FLO-MIN111",
    "FLO-MIN112", "FLO-MIN114", "FLO-MINSP6", "FLO-PRO001", "FLO-PRO002", "FLO-PRO002-ECO",
    "FLO-PRO002M", "FLO-PRO111", "FLO-PRO112", "FLO-PRO112M", "FLO-PRO114", "FLO-PRO114M",
];

pub const CONFIGURATIONS: &[&str] = &[
    "dna_r10.3_450bps_hac", "dna_r10.3_450bps_hac_prom", "dna_r10.4.1_e8.2_260bps_hac",
    "dna_r10.4.1_e8.2_260bps_hac_prom", "dna_r10.4.1_e8.2_400bps_hac",
    "dna_r10.4.1_e8.2_400bps_hac_prom", "dna_r10_450bps_hac", "dna_r10.4_e8.1_hac",
    "dna_r10.4_e8.1_hac_prom", "dna_r9.4.1_450bps_hac", "dna_r9.4.1_450bps_hac_prom",
    "dna_r9.4.1_e8.1_hac", "dna_r9.4.1_e8.1_hac_prom", "dna_r9.5_450bps",
    "rna_r9.4.1_70bps_hac", "rna_r9.4.1_70bps_hac_prom",
];


pub fn check_flowcell(flowcell: &str) -> Result<(), PipelineError> {
    if FLOWCELLS.contains(&flowcell) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "Unsupported flowcell '{}'. Supported flowcells: {}",
            flowcell,
            FLOWCELLS.join(", ")
        )))
    }
}

pub fn check_library_kit(kit: &str) -> Result<(), PipelineError> {
    if LIBRARY_KITS.contains(&kit) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "Unsupported library kit '{}'. Supported library kits: {}",
            kit,
            LIBRARY_KITS.join(", ")
        )))
    }
}

/// Accepts a configuration name with or without its `.cfg` extension.
pub fn check_configuration(config: &str) -> Result<(), PipelineError> {
    let name = config.strip_suffix(GUPPY_CONFIG_EXT).unwrap_or(config);
    if CONFIGURATIONS.contains(&name) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "Unsupported configuration '{}'. Supported configurations: {}",
            config,
            CONFIGURATIONS.join(", ")
        )))
    }
}

/// Validates the requested barcode kits and their pairing with a description file.
///
/// A description file only makes sense when barcodes are detected, so it requires at least one kit.
/// `unknown` can't be combined with named kits.
pub fn check_barcode_kits(kits: &[String], description_given: bool) -> Result<(), PipelineError> {
    if description_given && kits.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "A barcode description file (-d) requires a barcode kit (-b)".to_string(),
        ));
    }
    for kit in kits {
        if !BARCODE_KITS.contains(&kit.as_str()) {
            return Err(PipelineError::InvalidConfig(format!(
                "Unsupported barcode kit '{}'. Supported barcode kits: {}",
                kit,
                BARCODE_KITS.join(", ")
            )));
        }
    }
    if kits.len() > 1 && kits.iter().any(|k| k == UNKNOWN_BARCODE_KIT) {
        return Err(PipelineError::InvalidConfig(format!(
            "Barcode kit '{}' cannot be combined with named kits",
            UNKNOWN_BARCODE_KIT
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_with_and_without_extension() {
        assert!(check_configuration("dna_r9.4.1_450bps_hac").is_ok());
        assert!(check_configuration("dna_r9.4.1_450bps_hac.cfg").is_ok());
        assert!(check_configuration("dna_r9.4.1_450bps_sup.cfg").is_err());
    }

    #[test]
    fn test_barcode_kits() {
        assert!(check_barcode_kits(&[], false).is_ok());
        assert!(check_barcode_kits(&["EXP-NBD104".to_string(), "EXP-NBD114".to_string()], true).is_ok());
        assert!(check_barcode_kits(&["unknown".to_string()], true).is_ok());
        assert!(check_barcode_kits(&[], true).is_err());
        assert!(check_barcode_kits(&["EXP-XXX000".to_string()], false).is_err());
        assert!(check_barcode_kits(&["unknown".to_string(), "EXP-NBD104".to_string()], false).is_err());
    }

    #[test]
    fn test_flowcell_and_kit() {
        assert!(check_flowcell("FLO-MIN106").is_ok());
        assert!(check_flowcell("FLO-MIN999").is_err());
        assert!(check_library_kit("SQK-LSK109").is_ok());
        assert!(check_library_kit("SQK-LSK999").is_err());
    }
}
