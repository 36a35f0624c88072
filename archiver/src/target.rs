use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path};

use crate::error::ConfigError;

/// CW3E West-WRF ensemble image directory
pub const CW3E_BASE_URL: &str = "https://cw3e.ucsd.edu/images/wwrf/images/ensemble/";

const CW3E_SNOW_PANELS: [(&str, &str); 6] = [
    ("paradis", "West-WRF_3hrSnow_Meteogram_Panel_MRNP.png"),
    ("stevens", "West-WRF_3hrSnow_Meteogram_Panel_STP.png"),
    ("crystal", "West-WRF_3hrSnow_Meteogram_Panel_CMP.png"),
    ("snoqualmie", "West-WRF_3hrSnow_Meteogram_Panel_SNQ.png"),
    ("baker", "West-WRF_3hrSnow_Meteogram_Panel_MTB.png"),
    ("white", "West-WRF_3hrSnow_Meteogram_Panel_WHP.png"),
];

/// One named source-to-destination mapping processed by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchTarget {
    pub name: String,
    pub source_url: String,
    pub canonical_relative_path: String,
}

impl FetchTarget {
    pub fn new(name: &str, source_url: &str, canonical_relative_path: &str) -> Self {
        FetchTarget {
            name: name.to_string(),
            source_url: source_url.to_string(),
            canonical_relative_path: canonical_relative_path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteEntry {
    pub name: String,
    /// File name on the remote side, also used as the canonical file name
    pub file: String,
    /// Full URL overriding `base_url + file`
    #[serde(default)]
    pub url: Option<String>,
}

/// Immutable site table handed to the archiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetTable {
    pub base_url: String,
    pub sites: Vec<SiteEntry>,
}

impl Default for TargetTable {
    fn default() -> Self {
        TargetTable {
            base_url: CW3E_BASE_URL.to_string(),
            sites: CW3E_SNOW_PANELS
                .iter()
                .map(|(name, file)| SiteEntry {
                    name: name.to_string(),
                    file: file.to_string(),
                    url: None,
                })
                .collect(),
        }
    }
}

impl TargetTable {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadTable {
            path: path_str.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::ParseTable {
            path: path_str,
            source,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.sites.iter().map(|site| site.name.as_str()).collect()
    }

    /// All sites as targets, in table order.
    pub fn targets(&self) -> Vec<FetchTarget> {
        self.sites.iter().map(|site| self.to_target(site)).collect()
    }

    /// Targets for the requested names. Unknown names are logged and skipped;
    /// `None` selects every site.
    pub fn select(&self, requested: Option<&[String]>) -> Result<Vec<FetchTarget>, ConfigError> {
        let requested = match requested {
            None => return non_empty(self.targets()),
            Some(names) => names,
        };

        let mut selected = Vec::new();
        let mut invalid = Vec::new();
        for name in requested {
            let name = name.trim();
            match self.sites.iter().find(|site| site.name == name) {
                Some(site) => {
                    if !selected.iter().any(|t: &FetchTarget| t.name == name) {
                        selected.push(self.to_target(site));
                    }
                }
                None => invalid.push(name.to_string()),
            }
        }

        if !invalid.is_empty() {
            warn!("Invalid site names ignored: {:?}", invalid);
            info!("Valid sites are: {:?}", self.names());
        }

        non_empty(selected)
    }

    fn to_target(&self, site: &SiteEntry) -> FetchTarget {
        let source_url = site
            .url
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.base_url, site.file));
        FetchTarget {
            name: site.name.clone(),
            source_url,
            canonical_relative_path: site.file.clone(),
        }
    }
}

fn non_empty(targets: Vec<FetchTarget>) -> Result<Vec<FetchTarget>, ConfigError> {
    if targets.is_empty() {
        Err(ConfigError::NoTargets)
    } else {
        Ok(targets)
    }
}

/// Checks a target set before a run: non-empty, unique names, paths that stay under the root.
pub fn validate_targets(targets: &[FetchTarget]) -> Result<(), ConfigError> {
    if targets.is_empty() {
        return Err(ConfigError::NoTargets);
    }

    let mut seen = HashSet::new();
    for target in targets {
        if !is_single_component(&target.name) {
            return Err(ConfigError::InvalidTargetName(target.name.clone()));
        }
        if !seen.insert(target.name.as_str()) {
            return Err(ConfigError::DuplicateTarget(target.name.clone()));
        }
        if target.source_url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl(target.name.clone()));
        }
        if !is_safe_relative_file(&target.canonical_relative_path) {
            return Err(ConfigError::InvalidCanonicalPath {
                name: target.name.clone(),
                path: target.canonical_relative_path.clone(),
            });
        }
    }
    Ok(())
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_safe_relative_file(path: &str) -> bool {
    let path = Path::new(path);
    path.file_name().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
