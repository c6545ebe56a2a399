use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use webtier::app::{App, HandoffState};
use webtier::config::{Overrides, ParametersFile};
use webtier::params::{AppParams, ContextLookups, StackKind};
use webtier::stacks::compute::{ARTIFACT_BUCKET_PARAMETER, ARTIFACT_KEY_PARAMETER};
use webtier::synth::{synth, Manifest};

#[derive(Parser)]
#[command(name = "webtier", about = "Defines and deploys the stacks of a scalable web tier")]
struct Cli {
    /// Path to the parameters file
    #[arg(long, global = true, default_value = "parameters.toml")]
    config: PathBuf,
    /// Environment to deploy, overrides `env` of the [default] table
    #[arg(long, global = true)]
    env: Option<String>,
    /// Application to deploy, overrides `app` of the [default] table
    #[arg(long, global = true)]
    app: Option<String>,
    /// Used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the templates and manifest without deploying
    Synth {
        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,
        /// Skip every AWS lookup. Values missing from the config fail
        /// the synth, and the CDN stack is left out.
        #[arg(long)]
        offline: bool,
    },
    /// Synthesize, upload the sync function, and deploy every stack
    Deploy {
        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,
        /// The sync function's `bootstrap` binary, built for arm64
        #[arg(long, env = "WEBTIER_SYNC_BOOTSTRAP", default_value = "target/lambda/ssm_sync/bootstrap")]
        bootstrap: PathBuf,
    },
    /// Show whether the compute stack has published its hand-off parameters
    Handoff,
}

fn base_dir(config: &Path) -> PathBuf {
    match config.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn load_params(cli: &Cli, offline: bool) -> anyhow::Result<AppParams> {
    let file = ParametersFile::load(&cli.config)?;
    let overrides = Overrides { env: cli.env.clone(), app: cli.app.clone() };
    let mut config = file.environment(&overrides)?;
    config.apply_env_fallbacks(|key| std::env::var(key).ok());
    config.validate()?;
    tracing::info!(environment = %config.section_name(), region = %config.aws_region, "loaded parameters");

    let lookups = if offline {
        ContextLookups::default()
    } else {
        aws_context::lookup_context(&config).await
            .context("Failed to look up values missing from the parameters file")?
    };
    let params = AppParams::derive(config, lookups)?.with_base_dir(&base_dir(&cli.config));
    Ok(params)
}

async fn fetch_handoff(params: &AppParams) -> HandoffState {
    let client = aws_context::global_ssm_client().await;
    aws_context::fetch_handoff(&client, &params.alb_hostname_param, &params.cloudfront_secret_param).await
}

async fn upload_sync_function(params: &AppParams, bootstrap: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let artifact = aws_lambda::package(bootstrap)?;
    let bucket = aws_lambda::artifact_bucket_name(&params.config)?;
    let client = aws_lambda::s3_client(params.region()).await;
    aws_lambda::ensure_bucket(&client, &bucket, params.region()).await?;
    aws_lambda::upload(&client, &bucket, &artifact).await?;

    let mut values = BTreeMap::new();
    values.insert(ARTIFACT_BUCKET_PARAMETER.to_string(), bucket);
    values.insert(ARTIFACT_KEY_PARAMETER.to_string(), artifact.key);
    Ok(values)
}

async fn deploy(cli: &Cli, out: &Path, bootstrap: &Path) -> anyhow::Result<()> {
    let params = load_params(cli, false).await?;
    let handoff = fetch_handoff(&params).await;
    let app = App::define(params.clone(), &handoff)?;
    let manifest = synth(&app, out)?;

    for stack_name in app.stacks_to_delete() {
        let client = aws_cfn_stack::client_for_region(params.region()).await;
        if aws_cfn_stack::delete_stack(&client, &stack_name).await? {
            tracing::info!(stack = %stack_name, "deleted");
        }
    }

    let values = upload_sync_function(&params, bootstrap).await
        .context("Failed to upload the parameter sync function")?;
    aws_cfn_stack::deploy_all(&manifest.stacks, &values).await?;
    if app.cdn_defined() {
        return Ok(());
    }

    // the compute stack has just published its parameters, so the
    // CDN stack can be defined now
    let handoff = fetch_handoff(&params).await;
    if !handoff.is_published() {
        tracing::warn!(state = ?handoff, "The CDN stack was not deployed, the hand-off parameters are still missing");
        return Ok(());
    }
    let app = App::define(params.clone(), &handoff)?;
    let manifest = synth(&app, out)?;
    let cdn_name = params.stack_name(StackKind::Cdn);
    let cdn = manifest.stack(&cdn_name)
        .with_context(|| format!("{cdn_name} missing from the second synth"))?;
    aws_cfn_stack::deploy_all(std::slice::from_ref(cdn), &values).await?;
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Synth { out, offline } => {
            let params = load_params(&cli, *offline).await?;
            let handoff = if *offline {
                HandoffState::NotPublished
            } else {
                fetch_handoff(&params).await
            };
            let app = App::define(params, &handoff)?;
            let manifest = synth(&app, out)?;
            for stack in manifest.stacks.iter() {
                println!("{} ({})", stack.stack_name, stack.region);
            }
        }
        Commands::Deploy { out, bootstrap } => {
            deploy(&cli, out, bootstrap).await?;
            let manifest = Manifest::load(out)?;
            println!("deployed {} stacks", manifest.stacks.len());
        }
        Commands::Handoff => {
            let params = load_params(&cli, false).await?;
            match fetch_handoff(&params).await {
                HandoffState::Published { alb_hostname, cloudfront_secret } => {
                    println!("{}: {alb_hostname}", params.alb_hostname_param);
                    println!("{}: {}", params.cloudfront_secret_param, cloudfront_secret.as_deref().unwrap_or("<missing>"));
                }
                HandoffState::NotPublished => println!("{} not published yet", params.alb_hostname_param),
                HandoffState::LookupFailed(message) => anyhow::bail!("Failed to read {}\n{message}", params.alb_hostname_param),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();
    if let Err(e) = run(cli).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
