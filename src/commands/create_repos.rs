use anyhow::Result;

use crate::config::Config;
use crate::config::pipeline::resolve_pipeline_variable;
use crate::context::Context;
use crate::devops::{CreationSummary, RepoCreator, repo_requests};
use crate::traits::HttpClient;

/// Handles 'create-repos' - one Azure DevOps repository per configured subscription
pub struct CreateReposCommand;

impl CreateReposCommand {
    pub fn execute(ctx: &Context, config: &Config, pat: Option<&str>) -> Result<i32> {
        let organization = config
            .azure_devops
            .organization
            .as_deref()
            .map(|o| resolve_pipeline_variable(o.trim()));
        let project = config
            .azure_devops
            .project
            .as_deref()
            .map(|p| resolve_pipeline_variable(p.trim()));

        let (Some(organization), Some(project)) = (
            organization.filter(|o| !o.is_empty()),
            project.filter(|p| !p.is_empty()),
        ) else {
            ctx.output
                .error("Azure DevOps organization and project must be configured");
            ctx.output.info(
                "Set azure_devops.organization and azure_devops.project in the configuration file",
            );
            return Ok(1);
        };

        let Some(pat) = pat else {
            ctx.output
                .error("AZURE_DEVOPS_PAT environment variable not set");
            ctx.output.info("Set it with: export AZURE_DEVOPS_PAT=your-token");
            return Ok(1);
        };

        let creator = RepoCreator::new(&organization, &project, pat);
        Ok(Self::run(ctx, config, &creator, &organization, &project))
    }

    fn run<H: HttpClient>(
        ctx: &Context,
        config: &Config,
        creator: &RepoCreator<H>,
        organization: &str,
        project: &str,
    ) -> i32 {
        let output = ctx.output.as_ref();

        output.section("Creating Azure DevOps Repositories");
        output.key_value("Organization", organization);
        output.key_value("Project", project);

        let requests = repo_requests(config, output);
        if requests.is_empty() {
            output.warning("No enabled subscriptions with a repository name in the configuration");
        }

        let summary = creator.create_all(&requests, output);
        Self::print_summary(ctx, &summary);

        if summary.failed > 0 { 1 } else { 0 }
    }

    fn print_summary(ctx: &Context, summary: &CreationSummary) {
        ctx.output.section("Summary");
        ctx.output.key_value("Created", &summary.created.to_string());
        ctx.output
            .key_value("Already existed", &summary.existing.to_string());
        ctx.output.key_value("Failed", &summary.failed.to_string());
    }
}
