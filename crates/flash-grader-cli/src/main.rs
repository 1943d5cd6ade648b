//! flash-grader: CLI tool to convert stored lesson documents

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use config::{CONFIG_FILE_NAME, Config, OutputFormat};
use lesson_doc::{DEFAULT_MAX_DEPTH, Document, ParseOptions};
use lesson_markdown::{WriterOptions, doc_to_markdown, slide_to_markdown};
use lesson_render::{render_document, render_slide};

#[derive(Parser, Debug)]
#[command(name = "flash-grader")]
#[command(about = "Convert stored lesson documents to Markdown, HTML or slides")]
#[command(version)]
#[command(after_help = "Examples:
  flash-grader lesson.json                # Convert to lesson.md
  flash-grader lesson.json -f html        # Convert to lesson.html
  flash-grader lesson.json --slide 2      # Convert only the second slide
  flash-grader lessons/ -o docs/ -j4      # Convert a directory with 4 parallel jobs
  flash-grader --init-config              # Write a sample _flash-grader.toml")]
struct Cli {
    /// Input lesson JSON file or directory
    #[arg(required_unless_present_any = ["init_config", "print_schema"])]
    input: Option<PathBuf>,

    /// Output file or directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format [default: md]
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Convert only this slide (1-based)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    slide: Option<u32>,

    /// Drop slide marker lines from Markdown output
    #[arg(long)]
    strip_slide_markers: bool,

    /// Keep slide marker lines even if the config file strips them
    #[arg(long, conflicts_with = "strip_slide_markers")]
    keep_slide_markers: bool,

    /// Deepest node nesting accepted in a document [default: 50]
    #[arg(long)]
    max_depth: Option<usize>,

    /// Configuration file (defaults to _flash-grader.toml next to the input)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of parallel jobs (defaults to number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Process directories recursively
    #[arg(short, long)]
    recursive: bool,

    /// Write a sample configuration file and exit
    #[arg(long, conflicts_with = "print_schema")]
    init_config: bool,

    /// Print the configuration file JSON schema and exit
    #[arg(long)]
    print_schema: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only show errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Effective conversion settings after merging CLI flags over the config file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Settings {
    format: OutputFormat,
    /// 1-based slide to convert instead of the whole document
    slide: Option<usize>,
    writer: WriterOptions,
    parse: ParseOptions,
}

impl Settings {
    fn resolve(cli: &Cli, config: &Config) -> Self {
        let strip_slide_markers = if cli.strip_slide_markers {
            true
        } else if cli.keep_slide_markers {
            false
        } else {
            config.output.strip_slide_markers.unwrap_or(false)
        };

        Settings {
            format: cli.format.or(config.output.format).unwrap_or_default(),
            slide: cli.slide.map(|n| n as usize),
            writer: WriterOptions {
                strip_slide_markers,
            },
            parse: ParseOptions {
                max_depth: cli
                    .max_depth
                    .or(config.document.max_depth)
                    .unwrap_or(DEFAULT_MAX_DEPTH),
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else if cli.quiet {
            LevelFilter::Error
        } else {
            LevelFilter::Warn
        })
        .init();

    if cli.print_schema {
        println!("{}", Config::json_schema_string()?);
        return Ok(());
    }
    if cli.init_config {
        return init_config(cli.output.as_deref(), cli.quiet);
    }

    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("No input given");
    };

    let config = load_config(&cli, input)?;
    let settings = Settings::resolve(&cli, &config);
    log::debug!("Settings: {:?}", settings);

    if input.is_file() {
        convert_file(input, cli.output.as_deref(), &settings, cli.quiet)?;
    } else if input.is_dir() {
        convert_directory(
            input,
            cli.output.as_deref(),
            cli.recursive,
            &settings,
            cli.quiet,
            cli.jobs,
        )?;
    } else {
        anyhow::bail!("Input path does not exist: {}", input.display());
    }

    Ok(())
}

/// Write the sample configuration file
fn init_config(output: Option<&Path>, quiet: bool) -> Result<()> {
    let path = output.unwrap_or(Path::new(CONFIG_FILE_NAME));
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }

    let content = Config::sample().to_toml_with_schema()?;
    fs::write(path, content).with_context(|| format!("Failed to write: {}", path.display()))?;

    if !quiet {
        println!("{}", path.display());
    }
    Ok(())
}

/// Config from `--config`, else `_flash-grader.toml` next to the input
fn load_config(cli: &Cli, input: &Path) -> Result<Config> {
    if let Some(path) = &cli.config {
        return Config::load(path);
    }
    let dir = if input.is_dir() {
        input
    } else {
        input.parent().unwrap_or(Path::new(""))
    };
    Ok(Config::load_from_dir(dir)?.unwrap_or_default())
}

/// Convert a single lesson file
fn convert_file(
    input: &Path,
    output: Option<&Path>,
    settings: &Settings,
    quiet: bool,
) -> Result<()> {
    let output_path = match output {
        Some(p) => p.to_path_buf(),
        None => input.with_extension(settings.format.extension()),
    };

    log::info!(
        "Converting: {} -> {}",
        input.display(),
        output_path.display()
    );

    convert_file_inner(input, &output_path, settings)?;

    if !quiet {
        println!("{}", output_path.display());
    }

    Ok(())
}

/// Convert a directory of lesson files
fn convert_directory(
    input: &Path,
    output: Option<&Path>,
    recursive: bool,
    settings: &Settings,
    quiet: bool,
    jobs: Option<usize>,
) -> Result<()> {
    let output_dir = output.unwrap_or(input);

    let files = collect_json_files(input, recursive)?;

    if files.is_empty() {
        if !quiet {
            eprintln!("No .json files found in {}", input.display());
        }
        return Ok(());
    }

    log::info!("Found {} .json files", files.len());

    if let Some(n) = jobs {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
        {
            log::debug!("Keeping the existing thread pool: {}", e);
        }
    }

    let success = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let errors: Vec<_> = files
        .par_iter()
        .filter_map(|file| {
            let relative = file.strip_prefix(input).unwrap_or(file);
            let output_file = output_dir
                .join(relative)
                .with_extension(settings.format.extension());

            match convert_file_inner(file, &output_file, settings) {
                Ok(()) => {
                    success.fetch_add(1, Ordering::Relaxed);
                    if !quiet {
                        println!("{}", output_file.display());
                    }
                    None
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    Some((file.clone(), e))
                }
            }
        })
        .collect();

    for (file, e) in &errors {
        log::error!("Error converting {}: {:#}", file.display(), e);
    }

    let success_count = success.load(Ordering::Relaxed);
    let failed_count = failed.load(Ordering::Relaxed);

    if !quiet {
        eprintln!("Converted {} files, {} failed", success_count, failed_count);
    }

    if failed_count > 0 {
        anyhow::bail!("{} files failed to convert", failed_count);
    }

    Ok(())
}

/// Read, convert and write one file without reporting
fn convert_file_inner(input: &Path, output: &Path, settings: &Settings) -> Result<()> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read: {}", input.display()))?;

    let converted = convert_lesson(&content, settings)
        .with_context(|| format!("Failed to convert: {}", input.display()))?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(output, &converted)
        .with_context(|| format!("Failed to write: {}", output.display()))?;

    Ok(())
}

/// Collect lesson JSON files in a directory, skipping earlier slide outputs
fn collect_json_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            let is_slides = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(".slides.json"));
            if is_json && !is_slides {
                files.push(path);
            }
        } else if path.is_dir() && recursive {
            files.extend(collect_json_files(&path, recursive)?);
        }
    }

    files.sort();
    Ok(files)
}

/// Core conversion function
fn convert_lesson(json: &str, settings: &Settings) -> Result<String> {
    let doc = Document::from_json_with(json, &settings.parse).context("Invalid lesson document")?;

    let Some(n) = settings.slide else {
        return match settings.format {
            OutputFormat::Md => Ok(doc_to_markdown(&doc, &settings.writer)),
            OutputFormat::Html => Ok(with_newline(render_document(&doc).to_html())),
            OutputFormat::Slides => slides_json(&doc.slides()),
        };
    };

    let slides = doc.slides();
    let slide = n
        .checked_sub(1)
        .and_then(|i| slides.get(i))
        .with_context(|| {
            format!(
                "Slide {} is out of range: the document has {} slides",
                n,
                slides.len()
            )
        })?;

    match settings.format {
        OutputFormat::Md => Ok(slide_to_markdown(slide, &settings.writer)),
        OutputFormat::Html => Ok(with_newline(render_slide(slide).to_html())),
        OutputFormat::Slides => slides_json(std::slice::from_ref(slide)),
    }
}

fn slides_json<T: serde::Serialize + ?Sized>(slides: &T) -> Result<String> {
    let json = serde_json::to_string_pretty(slides).context("Failed to serialize slides")?;
    Ok(with_newline(json))
}

fn with_newline(mut s: String) -> String {
    if !s.is_empty() {
        s.push('\n');
    }
    s
}
