//! dflow CLI: run the webhook server or list the loaded skills.

use anyhow::Result;
use clap::Parser;
use dflow_server::{load_config, load_skill_source, load_skills, run_server, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { listen, skill_path } => {
            let config = load_config(listen, skill_path)?;
            run_server(config).await
        }
        Commands::Skills { skill_path } => list_skills(skill_path),
    }
}

fn list_skills(skill_path: Option<std::path::PathBuf>) -> Result<()> {
    let source = load_skill_source(skill_path)?;
    let registry = load_skills(&source)?;

    println!(
        "{} skill(s) in {} (default: {})",
        registry.len(),
        source.path.display(),
        registry.default_skill()
    );
    for action in registry.actions() {
        let skill = registry.resolve(action)?;
        let parameters = skill.parameter_order();
        if parameters.is_empty() {
            println!("  {}", action);
        } else {
            println!("  {} ({})", action, parameters.join(", "));
        }
    }
    Ok(())
}
