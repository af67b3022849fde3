use anyhow::Context;
use clap::Parser;
use py2cfg::common::{FormatArgs, GlobalOpts};
use py2cfg::convert::{capture_arguments, convert, ConvertOptions};
use py2cfg_logger as logger;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "py2cfg")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Convert an existing setup.py file to a setup.cfg",
    long_about = "Executes setup.py against a stand-in setuptools and prints the \
                  declarative setup.cfg equivalent of its setup() call."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(flatten)]
    format: FormatArgs,

    /// Path to setup.py file
    #[arg(value_name = "path", default_value = "./setup.py")]
    setup_py: PathBuf,

    /// Ignore an existing setup.cfg next to setup.py
    #[arg(long)]
    no_merge: bool,

    /// Print the captured setup() arguments as JSON instead of converting them
    #[arg(long)]
    show_arguments: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init_with_verbosity(cli.global.verbosity_level(), cli.global.quiet) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }
    init_tracing();

    if let Err(e) = run(&cli) {
        logger::error(&format!("{:#}", e));
        if cli.global.verbosity_level() > 0 {
            logger::show_log_path();
        }
        std::process::exit(1);
    }
}

/// Library diagnostics go to stderr; `RUST_LOG` beats `-v`
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(logger::verbosity_to_filter())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.show_arguments {
        let args = capture_arguments(&cli.setup_py)?;
        println!("{}", serde_json::to_string_pretty(&args.to_json())?);
        return Ok(());
    }

    let options = ConvertOptions {
        format: cli.format.load_format_options()?,
        merge_existing: !cli.no_merge,
    };
    logger::debug(&format!(
        "Dangling list threshold {}, indent {}",
        options.format.dangling_list_threshold, options.format.dangling_list_indent
    ));

    logger::step(&format!("Converting {}", cli.setup_py.display()));
    let converted = convert(&cli.setup_py, &options)
        .with_context(|| format!("Failed to convert {}", cli.setup_py.display()))?;

    for err in &converted.field_errors {
        logger::warn(&format!("Skipped {}", err));
    }

    println!("{}", converted.text);
    logger::info(&format!(
        "Converted {} ({} field(s) skipped)",
        cli.setup_py.display(),
        converted.field_errors.len()
    ));
    Ok(())
}
