//! qscript CLI
//!
//! Usage:
//!   qscript [OPTIONS] [DIALECT]
//!
//! Options:
//!   -o, --output <FILE>      Write the script atomically (stdout otherwise)
//!   -s, --set <KEY=VALUE>    Binding, repeatable
//!   -b, --bindings <FILE>    TOML binding file
//!   -t, --template <FILE>    Render an ad-hoc template file instead of DIALECT
//!   -c, --config <FILE>      Settings file
//!   -l, --list               List dialects
//!   --show                   Print the dialect template and fields
//!   -h, --help               Print help

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use qscript::template::{DialectRegistry, RegistryBuilder};
use qscript::{
    render_template, Bindings, Error, RenderConfig, Settings, SyntaxPolicy, Template,
};

#[derive(Parser)]
#[command(name = "qscript")]
#[command(version, about = "Render batch scheduler job scripts from templates")]
struct Cli {
    /// Scheduler dialect (cobalt, slurm, pbs, lsf, or a site dialect)
    dialect: Option<String>,

    /// Write the script to this file atomically (stdout if not provided)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Bind a placeholder, e.g. --set nnodes=4
    #[arg(short, long = "set", value_name = "KEY=VALUE", value_parser = Bindings::parse_assignment)]
    set: Vec<(String, String)>,

    /// TOML file of bindings
    #[arg(short, long, value_name = "FILE")]
    bindings: Option<PathBuf>,

    /// Render this template file instead of a dialect template
    #[arg(short, long, value_name = "FILE", conflicts_with = "dialect")]
    template: Option<PathBuf>,

    /// Settings file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory of extra dialect definitions
    #[arg(long, value_name = "DIR")]
    dialects: Option<PathBuf>,

    /// Ignore bindings the template does not reference
    #[arg(long)]
    lenient: bool,

    /// Keep malformed placeholders in template files as literal text
    #[arg(long)]
    preserve_malformed: bool,

    /// Write <output>.meta.json alongside the script
    #[arg(long, requires = "output")]
    metadata: bool,

    /// Mark the output file executable
    #[arg(long, requires = "output")]
    executable: bool,

    /// List available dialects
    #[arg(short, long)]
    list: bool,

    /// Show the template and fields instead of rendering
    #[arg(long)]
    show: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let settings = match &cli.config {
        Some(path) => match Settings::from_file(path) {
            Ok(s) => s,
            Err(e) => fail(format!("Error loading settings '{}': {}", path.display(), e)),
        },
        None => Settings::default(),
    };

    let registry = match load_registry(&settings, cli.dialects.as_deref()) {
        Ok(r) => r,
        Err(e) => fail(format!("Error loading dialects: {}", e)),
    };

    if cli.list {
        print_dialects(&registry);
        return;
    }

    let mut config = settings.render;
    if cli.lenient {
        config = config.lenient();
    }
    if cli.preserve_malformed {
        config = config.with_unrecognized(SyntaxPolicy::Preserve);
    }

    let template = match (&cli.template, &cli.dialect) {
        (Some(path), _) => load_template(path, &config),
        (None, Some(name)) => match registry.get(name) {
            Ok(dialect) => {
                if cli.show {
                    print_dialect(dialect);
                    return;
                }
                dialect.template().clone()
            }
            Err(e) => fail(format!("Error: {}", e)),
        },
        (None, None) => {
            print_intro(&registry);
            return;
        }
    };

    if cli.show {
        print_fields(&template);
        return;
    }

    let bindings = collect_bindings(&cli, &settings, &template);

    let script = match render_template(&template, &bindings, &config) {
        Ok(script) => script,
        Err(Error::Validation(report)) => {
            fail(format!("Invalid bindings for {}:\n{}", template.id(), report))
        }
        Err(e) => fail(format!("Error: {}", e)),
    };

    let emitter = settings
        .emit
        .emitter()
        .with_metadata(settings.emit.metadata || cli.metadata)
        .with_executable(settings.emit.executable || cli.executable);

    match &cli.output {
        Some(path) => match emitter.emit_to_path(&script, path) {
            Ok(receipt) => println!("{}  {}", receipt.content_hash, receipt.destination),
            Err(e) => fail(format!("Error: {}", e)),
        },
        None => {
            let stdout = io::stdout();
            if let Err(e) = emitter.emit_to_writer(&script, &mut stdout.lock(), "<stdout>") {
                fail(format!("Error: {}", e));
            }
        }
    }
}

fn fail(message: String) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn load_registry(settings: &Settings, extra: Option<&Path>) -> Result<DialectRegistry, qscript::template::DialectError> {
    let mut builder = RegistryBuilder::new().with_builtins()?;
    for dir in settings.dialects.dir.as_deref().into_iter().chain(extra) {
        builder.load_dir(dir)?;
    }
    Ok(builder.build())
}

fn load_template(path: &Path, config: &RenderConfig) -> Template {
    let text = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail(format!("Error reading file '{}': {}", path.display(), e)),
    };
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "template".to_string());

    match Template::builder(name, text.as_str())
        .syntax(config.unrecognized)
        .build()
    {
        Ok(template) => template,
        Err(e) => {
            eprint!("{}", e.format(&text, &path.display().to_string()));
            process::exit(1);
        }
    }
}

/// Site defaults, then the binding file, then --set values
fn collect_bindings(cli: &Cli, settings: &Settings, template: &Template) -> Bindings {
    let mut bindings: Bindings = match template.dialect() {
        Some(dialect) => settings
            .site_bindings(dialect)
            .iter()
            .filter(|(name, _)| template.references(name))
            .collect(),
        None => Bindings::new(),
    };

    if let Some(path) = &cli.bindings {
        let source = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => fail(format!("Error reading file '{}': {}", path.display(), e)),
        };
        match Bindings::from_toml_str(&source) {
            Ok(file) => bindings.merge(file),
            Err(e) => fail(format!("Error parsing bindings '{}': {}", path.display(), e)),
        }
    }

    for (name, value) in &cli.set {
        bindings.insert(name.as_str(), value.as_str());
    }
    bindings
}

fn print_dialects(registry: &DialectRegistry) {
    for dialect in registry.iter() {
        println!(
            "{:<10} {}",
            dialect.name(),
            dialect.description().unwrap_or_default()
        );
    }
}

fn print_dialect(dialect: &qscript::Dialect) {
    println!("# dialect: {}", dialect.name());
    if let Some(description) = dialect.description() {
        println!("# {}", description);
    }
    if let Some(command) = dialect.submit_command() {
        println!("# submit with: {}", command);
    }
    println!("# version: {}", dialect.template().version());
    println!();
    print!("{}", dialect.template().text());
    println!();
    print_fields(dialect.template());
}

fn print_fields(template: &Template) {
    println!("FIELDS");
    for name in template.names() {
        let field = template.field(name);
        let mut line = format!("  {:<16} {}", name, field.kind);
        if !field.required {
            line.push_str(" (optional)");
        }
        if let Some(default) = &field.default {
            line.push_str(&format!(" [default: {}]", default));
        }
        if let Some(pattern) = field.pattern_source() {
            line.push_str(&format!(" /{}/", pattern));
        }
        if let Some(description) = &field.description {
            line.push_str(&format!("  {}", description));
        }
        println!("{}", line);
    }
}

fn print_intro(registry: &DialectRegistry) {
    let names: Vec<&str> = registry.names().collect();
    println!(
        r#"qscript - render batch scheduler job scripts from templates

USAGE:
    qscript [OPTIONS] <DIALECT>
    qscript [OPTIONS] --template <FILE>

DIALECTS:
    {}

QUICK START:
    qscript cobalt --set nnodes=4 --set launch_dir=$PWD \
        --set rocket_launch="rlaunch singleshot" -o job.sh

Run with --show to see a dialect's fields, or --help for every option."#,
        names.join(", ")
    );
}
