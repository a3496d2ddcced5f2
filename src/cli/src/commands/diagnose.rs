//! `regtrust diagnose` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use regtrust_core::Environment;
use regtrust_fallback::logging::log_certificate_problem;
use regtrust_fallback::{
    format_recommendations, CertProblem, CertificateInfo, ProblemDetector, Recommendation,
    Recommender, ValidityValidator,
};

use super::{load_config, ReportedError};
use crate::output::bullets;

#[derive(Args)]
pub struct DiagnoseArgs {
    /// Validation error text reported by the registry client
    #[arg(long)]
    pub error: String,

    /// PEM file with the certificate the server presented
    #[arg(long)]
    pub cert: PathBuf,

    /// Registry URL used in suggested commands
    #[arg(long, default_value = "")]
    pub registry: String,

    /// Environment to recommend for (development, testing, staging, production)
    #[arg(long)]
    pub environment: Option<Environment>,

    /// Never recommend --insecure
    #[arg(long)]
    pub no_insecure: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: DiagnoseArgs,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    let cert = Arc::new(CertificateInfo::from_pem(&std::fs::read(&args.cert)?)?);

    let detector = ProblemDetector::new(Arc::new(ValidityValidator::new()));
    let err = ReportedError(args.error.clone());
    let Some(problem) = detector.detect_problem(Some(&err), Some(&cert))? else {
        println!("No certificate problem detected.");
        return Ok(());
    };
    log_certificate_problem(&problem);

    let recommender = Recommender::new(
        args.registry.as_str(),
        config.allow_insecure && !args.no_insecure,
    )
    .with_environment(args.environment.unwrap_or(config.environment));
    let recs = recommender.recommend(Some(&problem))?;

    if args.json {
        let report = serde_json::json!({
            "problem": problem,
            "summary": problem.summary(),
            "description": problem.detailed_description(),
            "recommendations": recs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&problem, &recs));
    }
    Ok(())
}

/// Human-readable diagnosis followed by the recommendations.
fn render_report(problem: &CertProblem, recs: &[Recommendation]) -> String {
    let mut out = format!("Problem: {}\n", problem.problem_type);
    out.push_str(&format!("Summary: {}\n", problem.summary()));
    out.push_str(&format!("Details: {}\n", problem.detailed_description()));

    if !problem.details.is_empty() {
        out.push('\n');
        for (key, value) in &problem.details {
            out.push_str(&format!("  {key}: {value}\n"));
        }
    }

    if !problem.suggestions.is_empty() {
        out.push_str("\nSuggestions:\n");
        out.push_str(&bullets(&problem.suggestions, 2));
    }

    out.push('\n');
    out.push_str(&format_recommendations(recs));
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
