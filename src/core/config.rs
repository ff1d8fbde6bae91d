//! Project configuration loaded from `.sigma/config.toml`.
//!
//! The sector navigation list and the station lists per sector are
//! configuration data, not core logic. The built-in defaults reproduce the
//! organization's reference constants verbatim: "CÁDIZ" is a navigable
//! sector with no station list, and "HUELVA" has a station list but is not
//! in the navigation list.

use crate::core::error::SigmaError;
use crate::core::identity::{Actor, Role};
use crate::core::store::PROJECT_DIR_NAME;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ENV_ACTOR: &str = "SIGMA_ACTOR";
pub const ENV_ROLE: &str = "SIGMA_ROLE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SigmaConfig {
    /// Sector navigation list, in display order.
    #[serde(default = "default_sectors")]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub actor: ActorConfig,
    /// Station lists keyed by sector name.
    #[serde(default = "default_stations")]
    pub stations: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActorConfig {
    pub matricula: String,
    pub role: String,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            matricula: "unknown".to_string(),
            role: Role::Agent.as_str().to_string(),
        }
    }
}

impl Default for SigmaConfig {
    fn default() -> Self {
        Self {
            sectors: default_sectors(),
            actor: ActorConfig::default(),
            stations: default_stations(),
        }
    }
}

fn default_sectors() -> Vec<String> {
    ["SEVILLA-SANTA JUSTA", "SEVILLA-SAN PABLO", "UTRERA", "JEREZ", "CÁDIZ"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_stations() -> BTreeMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        (
            "SEVILLA-SANTA JUSTA",
            &[
                "DOS HERMANAS",
                "LA SALUD",
                "SEVILLA SANTA JUSTA",
                "LA NEGRILLA",
                "TRIÁNGULO TAMARGUILLO",
                "MAJARABIQUE",
                "CARTUJA",
                "ALAMILLO",
                "VALENCINA-SANTIPONCE",
                "SALTERAS",
                "VVA ARISCAL Y OLIVARES",
                "BENACAZÓN",
            ],
        ),
        (
            "SEVILLA-SAN PABLO",
            &[
                "CTT",
                "BRENES",
                "LOS ROSALES",
                "LORA DEL RIO",
                "VVA DEL RIO Y MINAS",
                "PEDROSO",
                "CAZALLA-CONSTANTINA",
                "GUADALCANAL",
            ],
        ),
        (
            "HUELVA",
            &[
                "HUELVA MERCANCÍAS",
                "GIBRALEÓN",
                "CALAÑAS",
                "VALDELAMUSA",
                "JABUGO-GALAROZA",
                "S. JUAN DEEL PUERTO",
                "NIEBLA",
                "LA PALMA DEL CONDADO",
                "ESCACENA",
                "CARRIÓN DE LOS CÉSPEDES",
                "AZNALCAZAR-PILAS",
            ],
        ),
        (
            "UTRERA",
            &[
                "UTRERA",
                "BIF. UTRERA",
                "EL SORBITO",
                "ARAHAL",
                "MARCHENA",
                "OSUNA",
                "PEDRERA",
                "FUENTE DE PIEDRA",
                "LAS CABEZAS DE S. JUAN",
                "LEBRIJA",
            ],
        ),
        (
            "JEREZ",
            &[
                "AEROPUERTO DE JEREZ",
                "JEREZ MERCANCÍAS",
                "JEREZ DE LA FRONTERA",
                "PUERTO DE STA MARÍA",
                "LAS ALETAS",
                "UNIVERSIDAD DE CÁDIZ",
                "SAN FERNANDO-BAHÍA SUR",
                "RÍO ARILLO",
                "CORTADURA",
                "CÁDIZ",
            ],
        ),
    ];
    table
        .iter()
        .map(|(sector, stations)| {
            (
                sector.to_string(),
                stations.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

impl SigmaConfig {
    /// A sector is known if it is navigable or has a station list.
    pub fn is_known_sector(&self, sector: &str) -> bool {
        self.sectors.iter().any(|s| s == sector) || self.stations.contains_key(sector)
    }

    pub fn stations_of(&self, sector: &str) -> &[String] {
        self.stations.get(sector).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn require_sector(&self, sector: &str) -> Result<(), SigmaError> {
        if self.is_known_sector(sector) {
            Ok(())
        } else {
            Err(SigmaError::NotFound(format!("Sector '{}'", sector)))
        }
    }

    /// The claimed acting user: environment overrides win over the file.
    /// `users::authenticate` settles the role for registered users.
    pub fn resolve_actor(&self) -> Result<Actor, SigmaError> {
        let matricula = std::env::var(ENV_ACTOR).unwrap_or_else(|_| self.actor.matricula.clone());
        let role_raw = std::env::var(ENV_ROLE).unwrap_or_else(|_| self.actor.role.clone());
        Ok(Actor::new(&matricula, Role::parse(&role_raw)?))
    }

    pub fn to_toml(&self) -> Result<String, SigmaError> {
        toml::to_string_pretty(self).map_err(|e| SigmaError::ConfigError(e.to_string()))
    }
}

pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Load config from `<project>/.sigma/config.toml`. A missing file yields defaults.
pub fn load_config(project_root: &Path) -> Result<SigmaConfig, SigmaError> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(SigmaConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    toml::from_str(&content)
        .map_err(|e| SigmaError::ConfigError(format!("{}: {}", path.display(), e)))
}

/// Write a config file, refusing to clobber an existing one unless `force`.
pub fn write_config(
    project_root: &Path,
    config: &SigmaConfig,
    force: bool,
) -> Result<PathBuf, SigmaError> {
    let path = config_path(project_root);
    if path.exists() && !force {
        return Err(SigmaError::ValidationError(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, config.to_toml()?)?;
    Ok(path)
}
