use std::collections::HashMap;
use std::sync::OnceLock;

use crate::utils::underscore_from_camelcase;

/// Metadata for one attributable record type. Built by the host application
/// (and its plugins) and handed to the registry during startup.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// CamelCase type name, e.g. "Assessment".
    pub type_name: String,
    /// snake_case name used as `definition_type` on definition rows.
    pub definition_type: String,
    /// Whether instances carry their own per-object definitions
    /// (replace-all definition processing applies only to these).
    pub per_object_definitions: bool,
    /// Whether instances support comments (drives eager loading).
    pub commentable: bool,
    /// Additional definition types whose definitions also apply, e.g.
    /// assessments inherit schemas from assessment templates.
    pub extra_definition_types: Vec<String>,
}

impl ModelInfo {
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let definition_type = underscore_from_camelcase(&type_name);
        Self {
            type_name,
            definition_type,
            per_object_definitions: false,
            commentable: false,
            extra_definition_types: Vec::new(),
        }
    }

    pub fn with_per_object_definitions(mut self) -> Self {
        self.per_object_definitions = true;
        self
    }

    pub fn with_comments(mut self) -> Self {
        self.commentable = true;
        self
    }

    pub fn with_extra_definition_source(mut self, definition_type: impl Into<String>) -> Self {
        self.extra_definition_types.push(definition_type.into());
        self
    }

    /// Every definition type whose definitions apply to this model.
    pub fn definition_sources(&self) -> Vec<&str> {
        let mut sources = vec![self.definition_type.as_str()];
        sources.extend(self.extra_definition_types.iter().map(String::as_str));
        sources
    }
}

/// Registry of attributable model types, keyed by type name. Populated by an
/// explicit `register`/`register_all` call during application startup; plugin
/// model sets are merged the same way rather than at import time.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelInfo>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: ModelInfo) {
        if self.models.contains_key(&info.type_name) {
            tracing::warn!("Replacing registered model type: {}", info.type_name);
        }
        tracing::debug!("Registered model type: {}", info.type_name);
        self.models.insert(info.type_name.clone(), info);
    }

    pub fn register_all(&mut self, infos: impl IntoIterator<Item = ModelInfo>) {
        for info in infos {
            self.register(info);
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&ModelInfo> {
        self.models.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.models.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Install the registry as the process-wide instance. Called once during
    /// startup after all model sets (core and plugin) have been merged.
    pub fn install(self) -> &'static ModelRegistry {
        let registry = GLOBAL.get_or_init(|| self);
        registry
    }

    /// The installed registry, if startup has run.
    pub fn global() -> Option<&'static ModelRegistry> {
        GLOBAL.get()
    }
}

static GLOBAL: OnceLock<ModelRegistry> = OnceLock::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_type_is_snake_cased() {
        let info = ModelInfo::new("AssessmentTemplate");
        assert_eq!(info.definition_type, "assessment_template");
    }

    #[test]
    fn definition_sources_include_extras() {
        let info = ModelInfo::new("Assessment")
            .with_extra_definition_source("assessment_template");
        assert_eq!(info.definition_sources(), vec!["assessment", "assessment_template"]);
    }

    #[test]
    fn plugin_models_merge_and_replace() {
        let mut registry = ModelRegistry::new();
        registry.register(ModelInfo::new("Control"));
        registry.register_all(vec![
            ModelInfo::new("RiskAssessment"),
            ModelInfo::new("Control").with_comments(),
        ]);

        assert!(registry.contains("RiskAssessment"));
        assert!(registry.get("Control").unwrap().commentable);
        assert_eq!(registry.type_names().count(), 2);
    }
}
