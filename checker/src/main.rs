use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, clap::ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "btv",
    version,
    about = "BUFR Template Validator — checks replication nesting in WMO BUFR descriptor templates"
)]
struct Cli {
    /// Input template file (one F XX YYY descriptor per line)
    source: PathBuf,

    /// Report format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Print validator phases to stderr
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("btv: source = {}", cli.source.display());
    }

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("btv: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    // ── Check ──
    let result = btv::check::check_source(&source);

    if cli.verbose {
        if let Some(template) = &result.template {
            eprintln!("btv: parsed {} descriptors", template.descriptors.len());
        }
        eprintln!("btv: {} finding(s)", result.diagnostics.len());
    }

    // ── Report ──
    match cli.format {
        Format::Text => print!("{}", result.render_text()),
        Format::Json => match serde_json::to_string_pretty(&result.to_json()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("btv: error: failed to serialize report: {e}");
                std::process::exit(2);
            }
        },
    }

    if result.is_valid() {
        std::process::exit(0);
    }
    std::process::exit(1);
}
