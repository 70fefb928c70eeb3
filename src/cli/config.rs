//! `chatwire config init`

use crate::cli::ConfigInitArgs;
use std::fs;
use std::io::Write;
use std::path::Path;

const EXAMPLE_CONFIG: &str = include_str!("../../chatwire.example.toml");

/// Write the annotated example configuration.
///
/// An output of `-` prints it to stdout; missing parent directories are
/// created. An existing file is kept unless `--force` is given.
pub fn handle_config_init(args: &ConfigInitArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.output == Path::new("-") {
        std::io::stdout().write_all(EXAMPLE_CONFIG.as_bytes())?;
        return Ok(());
    }

    if args.output.exists() && !args.force {
        return Err(format!(
            "File already exists: {}. Use --force to overwrite.",
            args.output.display()
        )
        .into());
    }

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.output, EXAMPLE_CONFIG)?;

    println!("✓ Configuration file created: {}", args.output.display());
    println!(
        "  Pick a completion source, then run `chatwire serve -c {}`.",
        args.output.display()
    );

    Ok(())
}
