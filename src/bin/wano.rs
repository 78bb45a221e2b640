use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wano::cluster::{self, ClusterClient, LocalClusterClient, TransferRegistry};
use wano::compiler::loader;
use wano::config::{AppConfig, Settings};
use wano::runtime::render::RenderContext;
use wano::WanoModelRoot;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the plain data of a WaNo as YAML
    Show {
        /// Path to the WaNo XML file
        file: PathBuf,
    },

    /// Change values and save the WaNo in place
    Set {
        file: PathBuf,

        /// Edits (path=value), applied in order
        #[arg(long = "define", short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },

    /// Render into a submit directory and print the execution descriptor
    Render {
        file: PathBuf,

        #[arg(long)]
        submit_dir: Option<PathBuf>,

        #[arg(long = "define", short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },

    /// Render, upload to a directory-backed cluster and submit
    Stage {
        file: PathBuf,

        #[arg(long)]
        submit_dir: Option<PathBuf>,

        /// Job directory, relative to the cluster root
        #[arg(long)]
        remote: String,

        /// Directory acting as the cluster filesystem
        #[arg(long, default_value = "cluster")]
        cluster_root: PathBuf,

        #[arg(long = "define", short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid PATH=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let settings = Settings::load(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    Ok(settings.app_config()?)
}

fn open(file: &Path, config: &AppConfig, vars: &[(String, String)]) -> Result<WanoModelRoot> {
    let mut model = loader::load_model_with(file, config.default_resources.clone())?;
    loader::apply_edits(&mut model, vars)?;
    Ok(model)
}

fn render_context(config: &AppConfig, submit_dir: Option<PathBuf>) -> RenderContext {
    RenderContext::new(submit_dir.unwrap_or_else(|| config.submit_dir.clone()))
        .with_storage_prefix(&config.storage_prefix)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Show { file } => {
            let model = open(&file, &config, &[])?;
            print!("{}", serde_yaml::to_string(&model.plain_data())?);
        }
        Commands::Set { file, vars } => {
            let mut model = open(&file, &config, &vars)?;
            model
                .save(&file)
                .with_context(|| format!("Failed to save {}", file.display()))?;
            info!("Applied {} edit(s) to {}", vars.len(), file.display());
        }
        Commands::Render { file, submit_dir, vars } => {
            let model = open(&file, &config, &vars)?;
            let ctx = render_context(&config, submit_dir);
            let output = model
                .render(&ctx)
                .with_context(|| format!("Failed to render {}", file.display()))?;
            print!("{}", serde_yaml::to_string(&output.descriptor)?);
        }
        Commands::Stage {
            file,
            submit_dir,
            remote,
            cluster_root,
            vars,
        } => {
            let model = open(&file, &config, &vars)?;
            let ctx = render_context(&config, submit_dir);
            let output = model
                .render(&ctx)
                .with_context(|| format!("Failed to render {}", file.display()))?;

            let client = Arc::new(LocalClusterClient::new(cluster_root));
            client.connect().await?;
            let registry = Arc::new(TransferRegistry::new());
            let job_id = cluster::stage_submission(
                client,
                registry.clone(),
                &ctx.submit_dir,
                &remote,
                &output.descriptor,
            )
            .await?;
            info!("Uploaded {} file(s)", registry.snapshot().len());
            println!("{}", job_id);
        }
    }

    Ok(())
}
