use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use scraper_forge::config::ConfigOverrides;
use scraper_forge::logging::{init_logging, LogContext, RunIdGenerator};
use scraper_forge::templates::GenerationParams;
use scraper_forge::{log_info, AppConfig, ScraperGenerator};

#[derive(Parser)]
#[command(name = "scraper-forge")]
#[command(about = "Compliance-gated generation and testing of news scrapers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one domain
    Generate {
        #[arg(help = "Domain to generate a scraper for")]
        domain: String,

        #[command(flatten)]
        params: ParamArgs,

        #[arg(short, long, help = "Write the generated source to this file")]
        output: Option<PathBuf>,
    },

    /// Analyze the structure of a compliant domain
    Analyze {
        #[arg(help = "Domain to analyze")]
        domain: String,
    },

    /// Run only the compliance gate
    Validate {
        #[arg(help = "Domain to validate")]
        domain: String,
    },

    /// Run the pipeline for several domains
    Batch {
        #[arg(help = "Domains to process")]
        domains: Vec<String>,

        #[arg(short, long, help = "File with one domain per line")]
        file: Option<PathBuf>,

        #[command(flatten)]
        params: ParamArgs,

        #[arg(short, long, help = "Directory to write ready scrapers into")]
        output: Option<PathBuf>,
    },

    /// List the template registry
    Templates,

    /// Show generation statistics for this process
    Stats,

    /// Check template assets, caches and the network client
    Health,

    /// Write the effective configuration to the user config directory
    InitConfig,
}

#[derive(clap::Args)]
struct ParamArgs {
    #[arg(long, help = "Maximum articles per run")]
    max_articles: Option<usize>,

    #[arg(long, help = "Requested crawl delay in seconds")]
    crawl_delay: Option<u64>,

    #[arg(long, help = "Content language tag")]
    language: Option<String>,

    #[arg(long, help = "Template to use instead of the detected CMS")]
    template: Option<String>,
}

impl ParamArgs {
    fn into_params(self, generator: &ScraperGenerator) -> GenerationParams {
        let mut params = generator.default_params();
        if let Some(max_articles) = self.max_articles {
            params.max_articles = max_articles;
        }
        if let Some(delay) = self.crawl_delay {
            params.crawl_delay_seconds = delay;
        }
        if let Some(language) = self.language {
            params.language = language;
        }
        params.template_override = self.template;
        params
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::load().await?,
    };
    ConfigOverrides::apply(&mut config);
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging)?;
    let context = LogContext::new("main", "startup")
        .with_run_id(RunIdGenerator::generate())
        .with_string_field("version", env!("CARGO_PKG_VERSION"));
    log_info!(context, "Scraper Forge starting up");

    if let Commands::InitConfig = cli.command {
        config.save().await?;
        info!("Configuration written");
        return Ok(());
    }

    let generator = ScraperGenerator::new(config).await?;

    match cli.command {
        Commands::Generate { domain, params, output } => {
            let params = params.into_params(&generator);
            let result = generator.generate_scraper(&domain, &params).await?;
            if let (Some(path), Some(generated)) = (output, &result.generated) {
                tokio::fs::write(&path, generated.source_text())
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("Generated source written to {}", path.display());
            }
            print_json(&result)?;
        }
        Commands::Analyze { domain } => print_json(&generator.analyze_domain(&domain).await)?,
        Commands::Validate { domain } => print_json(&generator.validate_compliance(&domain).await)?,
        Commands::Batch { mut domains, file, params, output } => {
            if let Some(file) = file {
                let listing = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                domains.extend(
                    listing
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty() && !line.starts_with('#'))
                        .map(str::to_string),
                );
            }
            let params = params.into_params(&generator);
            let results = generator.batch_generate(&domains, &params).await?;

            if let Some(dir) = output {
                tokio::fs::create_dir_all(&dir)
                    .await
                    .with_context(|| format!("creating {}", dir.display()))?;
                for result in results.iter().filter(|r| r.is_ready()) {
                    if let Some(generated) = &result.generated {
                        let file_name = format!("{}.rs", result.domain.replace(['.', ':', '-'], "_"));
                        tokio::fs::write(dir.join(&file_name), generated.source_text()).await?;
                    }
                }
            }
            print_json(&results)?;
        }
        Commands::Templates => print_json(&generator.list_templates())?,
        Commands::Stats => print_json(&generator.get_stats().await)?,
        Commands::Health => print_json(&generator.health_check().await)?,
        Commands::InitConfig => {}
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
