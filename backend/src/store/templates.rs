//! Mapping Template Registry - Store and reuse mapping sets
//!
//! Saves named mapping sets to disk and matches them to sheets by their
//! source columns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::mapping::{MappingRule, MappingSet};

/// Minimum share of a template's columns a sheet must contain to match
const COMPATIBILITY_THRESHOLD: f64 = 0.5;

/// A stored mapping set with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTemplate {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// The mapping rules, in order
    pub mappings: Vec<MappingRule>,
    /// Source columns the mappings read
    pub columns: Vec<String>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last time this template was used
    pub last_used: Option<String>,
    /// Number of times used
    pub use_count: u32,
}

impl StoredTemplate {
    /// Rebuild the mapping set
    pub fn to_mapping_set(&self) -> StoreResult<MappingSet> {
        MappingSet::from_rules(self.mappings.clone())
            .map_err(|e| StoreError::InvalidTemplate(format!("{}: {}", self.id, e)))
    }
}

/// Registry for managing mapping templates
pub struct MappingTemplateRegistry {
    /// Directory where templates are stored
    registry_dir: PathBuf,
    /// Loaded templates (id -> template)
    templates: HashMap<String, StoredTemplate>,
}

impl MappingTemplateRegistry {
    /// Create a registry over a directory, loading existing templates
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: PathBuf::from(dir.as_ref()),
            templates: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    /// Load all templates from the registry directory
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(template) = serde_json::from_str::<StoredTemplate>(&content) {
                        self.templates.insert(template.id.clone(), template);
                    }
                }
            }
        }
    }

    /// All templates, newest first
    pub fn list(&self) -> Vec<&StoredTemplate> {
        let mut all: Vec<_> = self.templates.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Get a template by ID
    pub fn get(&self, id: &str) -> Option<&StoredTemplate> {
        self.templates.get(id)
    }

    /// Find templates whose source columns the sheet mostly contains.
    /// Sorted by compatibility score, then by use count.
    pub fn find_compatible(&self, headers: &[String]) -> Vec<(&StoredTemplate, f64)> {
        let mut compatible: Vec<_> = self
            .templates
            .values()
            .filter_map(|t| {
                let score = calculate_compatibility(&t.columns, headers);
                (score > COMPATIBILITY_THRESHOLD).then_some((t, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.use_count.cmp(&a.0.use_count))
        });

        compatible
    }

    /// Save a mapping set as a new template
    pub fn save(&mut self, mappings: &MappingSet, name: &str) -> StoreResult<String> {
        fs::create_dir_all(&self.registry_dir)?;

        let id = self.generate_id(name);
        let stored = StoredTemplate {
            id: id.clone(),
            name: name.to_string(),
            mappings: mappings.list(),
            columns: mappings.source_columns(),
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            use_count: 0,
        };

        self.write(&stored)?;
        self.templates.insert(id.clone(), stored);
        Ok(id)
    }

    /// Import a template from a JSON file holding an array of rules
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> StoreResult<String> {
        let content = fs::read_to_string(path)?;
        let mappings = MappingSet::import_json(&content)
            .map_err(|e| StoreError::InvalidTemplate(e.to_string()))?;

        let template_name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });

        self.save(&mappings, template_name)
    }

    /// Record that a template was applied
    pub fn record_use(&mut self, id: &str) -> StoreResult<()> {
        let template = self
            .templates
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        template.last_used = Some(chrono::Utc::now().to_rfc3339());
        template.use_count += 1;

        let template = template.clone();
        self.write(&template)
    }

    /// Delete a template from the registry
    pub fn delete(&mut self, id: &str) -> StoreResult<()> {
        if self.templates.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let path = self.path_for(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn write(&self, template: &StoredTemplate) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(template)?;
        fs::write(self.path_for(&template.id), content)?;
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    /// Generate a unique ID from a name
    fn generate_id(&self, name: &str) -> String {
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        let slug = if slug.is_empty() { "template".to_string() } else { slug };

        let base = format!("{}-{}", slug, chrono::Utc::now().timestamp_millis());
        if !self.templates.contains_key(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{}-{}", base, n))
            .find(|id| !self.templates.contains_key(id))
            .unwrap_or(base)
    }
}

/// Share of stored columns present in the sheet headers (case-insensitive)
fn calculate_compatibility(stored: &[String], headers: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let headers_lower: Vec<String> = headers.iter().map(|c| c.to_lowercase()).collect();
    let match_count = stored
        .iter()
        .filter(|col| headers_lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / stored.len() as f64
}
