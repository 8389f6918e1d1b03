use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::kpi::{MODEL_GROWTH_OVER_TIME, MODEL_PERCENTAGE_OF_FIELD};
use crate::ConfigError;

const FIELD_TYPES: &[&str] = &["text", "number", "date", "url"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSeed {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSeed {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub kpi: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSeed {
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub fields: Vec<FieldSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiModelSeed {
    pub name: String,
    pub description: Option<String>,
    pub model_type: String,
}

/// Reference data installed by `db seed`.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedCatalog {
    #[serde(default)]
    pub admins: Vec<AdminSeed>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub ceo_role: String,
    #[serde(default)]
    pub social_networks: Vec<NetworkSeed>,
    #[serde(default)]
    pub kpi_models: Vec<KpiModelSeed>,
}

/// Load and validate the seed catalog from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<SeedCatalog, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_catalog(&content)
}

/// Parse and validate catalog YAML.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_catalog(content: &str) -> Result<SeedCatalog, ConfigError> {
    let catalog: SeedCatalog = serde_yaml::from_str(content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn unique_names<'a>(
    kind: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{kind} name must be non-empty"
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate {kind} name: '{name}'"
            )));
        }
    }
    Ok(())
}

fn validate_catalog(catalog: &SeedCatalog) -> Result<(), ConfigError> {
    if catalog.ceo_role.trim().is_empty() {
        return Err(ConfigError::Validation(
            "ceo_role must be non-empty".to_string(),
        ));
    }
    unique_names("admin", catalog.admins.iter().map(|a| a.username.as_str()))?;
    unique_names("company", catalog.companies.iter().map(String::as_str))?;
    unique_names("category", catalog.categories.iter().map(String::as_str))?;
    unique_names(
        "social network",
        catalog.social_networks.iter().map(|n| n.name.as_str()),
    )?;
    unique_names(
        "KPI model",
        catalog.kpi_models.iter().map(|m| m.name.as_str()),
    )?;

    for network in &catalog.social_networks {
        unique_names(
            &format!("field of '{}'", network.name),
            network.fields.iter().map(|f| f.name.as_str()),
        )?;
        for field in &network.fields {
            if !FIELD_TYPES.contains(&field.field_type.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "field '{}' of '{}' has invalid type '{}'; must be one of {}",
                    field.name,
                    network.name,
                    field.field_type,
                    FIELD_TYPES.join(", ")
                )));
            }
            if field.kpi && field.field_type != "number" {
                return Err(ConfigError::Validation(format!(
                    "KPI field '{}' of '{}' must be a number",
                    field.name, network.name
                )));
            }
        }
    }

    for model in &catalog.kpi_models {
        if ![MODEL_GROWTH_OVER_TIME, MODEL_PERCENTAGE_OF_FIELD].contains(&model.model_type.as_str())
        {
            return Err(ConfigError::Validation(format!(
                "KPI model '{}' has unknown type '{}'",
                model.name, model.model_type
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r"
admins:
  - username: admin
companies: [Acme]
categories: [Sales, Support]
ceo_role: CEO
social_networks:
  - name: Instagram
    icon: fab fa-instagram
    fields:
      - { name: instagram_url, label: Instagram URL, type: text, required: true }
      - { name: followers, label: Followers, type: number, required: true, kpi: true }
kpi_models:
  - { name: Growth over time, model_type: growth_over_time }
  - { name: Percentage of field, model_type: percentage_of_field }
";

    #[test]
    fn parses_valid_catalog() {
        let catalog = parse_catalog(VALID).unwrap();
        assert_eq!(catalog.ceo_role, "CEO");
        assert_eq!(catalog.social_networks[0].fields.len(), 2);
        assert!(catalog.social_networks[0].fields[1].kpi);
        assert!(!catalog.social_networks[0].fields[0].kpi);
    }

    #[test]
    fn rejects_duplicate_category_case_insensitive() {
        let yaml = VALID.replace("[Sales, Support]", "[Sales, sales]");
        let err = parse_catalog(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate category name"), "{err}");
    }

    #[test]
    fn rejects_duplicate_field_names_within_network() {
        let yaml = VALID.replace("name: instagram_url", "name: followers");
        let err = parse_catalog(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate field"), "{err}");
    }

    #[test]
    fn rejects_unknown_field_type() {
        let yaml = VALID.replace("type: text", "type: blob");
        let err = parse_catalog(&yaml).unwrap_err();
        assert!(err.to_string().contains("invalid type 'blob'"), "{err}");
    }

    #[test]
    fn rejects_non_numeric_kpi_field() {
        let yaml = VALID.replace(
            "type: text, required: true }",
            "type: text, required: true, kpi: true }",
        );
        let err = parse_catalog(&yaml).unwrap_err();
        assert!(err.to_string().contains("must be a number"), "{err}");
    }

    #[test]
    fn rejects_unknown_kpi_model_type() {
        let yaml = VALID.replace("model_type: growth_over_time", "model_type: magic");
        assert!(parse_catalog(&yaml).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_catalog(Path::new("/nonexistent/seed.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::CatalogIo { .. }));
    }

    #[test]
    fn bundled_seed_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/seed.yaml");
        let catalog = load_catalog(&path).unwrap();
        let instagram = catalog
            .social_networks
            .iter()
            .find(|n| n.name == "Instagram")
            .expect("instagram seeded");
        let kpi_fields: Vec<&str> = instagram
            .fields
            .iter()
            .filter(|f| f.kpi)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            kpi_fields,
            vec!["followers", "engagement", "views", "leads", "customers"]
        );
        assert_eq!(catalog.kpi_models.len(), 2);
    }
}
