use std::path::Path;

use crate::config::schema::AztfexportConfig;

pub const EXPORT_TOOL: &str = "aztfexport";

/// How the export tool is scoped to a resource group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportMode {
    /// `aztfexport query <predicate>`
    Query { predicate: String },
    /// `aztfexport resource-group <name>`
    ResourceGroup,
}

impl ExportMode {
    pub fn subcommand(&self) -> &'static str {
        match self {
            ExportMode::Query { .. } => "query",
            ExportMode::ResourceGroup => "resource-group",
        }
    }
}

/// A fully built export tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportInvocation {
    pub program: String,
    pub mode: ExportMode,
    pub args: Vec<String>,
}

/// Builds export tool argument vectors from the `aztfexport` config section
pub struct ExportCommandBuilder<'a> {
    config: &'a AztfexportConfig,
    program: String,
}

impl<'a> ExportCommandBuilder<'a> {
    pub fn new(config: &'a AztfexportConfig) -> Self {
        Self {
            config,
            program: EXPORT_TOOL.to_string(),
        }
    }

    /// Query mode is wanted when resource types are excluded or a custom
    /// predicate is configured
    pub fn wants_query_mode(&self) -> bool {
        !self.config.exclude_resource_types.is_empty() || self.custom_query().is_some()
    }

    /// Type predicate without resource-group scope; a custom query wins
    pub fn base_predicate(&self) -> String {
        if let Some(query) = self.custom_query() {
            return query.to_string();
        }

        self.config
            .exclude_resource_types
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| format!("type != '{}'", escape(t)))
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Predicate scoped to one resource group
    pub fn predicate_for(&self, resource_group: &str) -> String {
        let base = self.base_predicate();
        let resource_group = resource_group.trim();

        match (base.is_empty(), resource_group.is_empty()) {
            (_, true) => base,
            (true, false) => format!("resourceGroup == '{}'", escape(resource_group)),
            (false, false) => format!("{} and resourceGroup == '{}'", base, escape(resource_group)),
        }
    }

    pub fn mode_for(&self, resource_group: &str) -> ExportMode {
        if self.wants_query_mode() {
            let predicate = self.predicate_for(resource_group);
            if !predicate.is_empty() {
                return ExportMode::Query { predicate };
            }
        }
        ExportMode::ResourceGroup
    }

    /// Full invocation; the predicate or resource group name is always last
    pub fn build(
        &self,
        subscription_id: &str,
        output_dir: &Path,
        resource_group: &str,
    ) -> ExportInvocation {
        let mode = self.mode_for(resource_group);

        let mut args = vec![
            mode.subcommand().to_string(),
            "--subscription-id".to_string(),
            subscription_id.to_string(),
            "--output-dir".to_string(),
            output_dir.display().to_string(),
            "--non-interactive".to_string(),
        ];

        if self.config.plain_ui {
            args.push("--plain-ui".to_string());
        }

        if mode == ExportMode::ResourceGroup {
            for resource_type in &self.config.resource_types {
                args.push("--resource-type".to_string());
                args.push(resource_type.clone());
            }
            for resource_id in &self.config.exclude_resources {
                args.push("--exclude".to_string());
                args.push(resource_id.clone());
            }
        }

        args.extend(self.config.additional_flags.iter().cloned());

        match &mode {
            ExportMode::Query { predicate } => args.push(predicate.clone()),
            ExportMode::ResourceGroup => args.push(resource_group.trim().to_string()),
        }

        ExportInvocation {
            program: self.program.clone(),
            mode,
            args,
        }
    }

    fn custom_query(&self) -> Option<&str> {
        self.config
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}
