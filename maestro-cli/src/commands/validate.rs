//! Validate command handler
//!
//! The manifest itself was validated while building the engine; this command
//! additionally resolves every workflow and job definition so broken files
//! surface before a run does.

use anyhow::Result;
use colored::Colorize as _;

use maestro_engine::Engine;

pub fn validate(engine: &Engine) -> Result<()> {
    let registry = engine.registry();

    println!("Manifest:           {}", "OK".green());
    println!(
        "  {} task(s), {} workflow(s), {} job(s), {} integration(s)",
        registry.list_tasks().count(),
        registry.list_workflows().count(),
        registry.list_jobs().count(),
        registry.list_integrations().count(),
    );

    let mut failures = 0usize;

    for (name, _) in registry.list_workflows() {
        match registry.workflow_def(name) {
            Ok(_) => println!("Workflow {:<18} {}", name, "OK".green()),
            Err(err) => {
                failures += 1;
                println!("Workflow {:<18} {}\n  {}", name, "FAILED".red(), err);
            }
        }
    }

    for (name, _) in registry.list_jobs() {
        match registry.job_def(name) {
            Ok(_) => println!("Job      {:<18} {}", name, "OK".green()),
            Err(err) => {
                failures += 1;
                println!("Job      {:<18} {}\n  {}", name, "FAILED".red(), err);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} definition(s) failed validation", failures);
    }
    Ok(())
}
