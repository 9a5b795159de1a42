//! Example of driving geombatch-core directly from Rust.
//!
//! Usage: cargo run -p geombatch-core --example run_batch -- geom_a.conf geom_b.conf

use geombatch_core::{BatchLauncher, IterationStatus, LaunchSettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configs: Vec<String> = std::env::args().skip(1).collect();

    // 1. Settings: the default tool is `python3 step_to_h5m.py`
    let settings = LaunchSettings::default().with_working_dir(".");

    // 2. Run every configuration in order
    let launcher = BatchLauncher::new(settings)?;
    let report = launcher.run(&configs).await?;

    // 3. Inspect the per-configuration results
    for it in &report.iterations {
        match it.status {
            IterationStatus::Archived => println!(
                "{} -> {}",
                it.config.display(),
                it.output_dir.as_deref().unwrap_or(it.config.as_path()).display()
            ),
            _ => println!(
                "{}: {} ({})",
                it.config.display(),
                it.status,
                it.error.as_deref().unwrap_or("-")
            ),
        }
    }
    Ok(())
}
