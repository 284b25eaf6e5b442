use std::path::Path;

use clap::{Arg, ArgAction, Command};

use callsheet_slack::{
    CollectNotifyProfiles, IntegrateSlackMessages, PublishManifest, PublishStage, SlackApiClient,
    SlackSettings,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("callsheet")
        .version(VERSION)
        .about("Slack notifications for publish pipelines")
        .subcommand(
            Command::new("check")
                .about("Validate the configured auth token against the workspace")
                .arg(
                    Arg::new("settings")
                        .short('s')
                        .long("settings")
                        .value_name("FILE")
                        .required(true)
                        .help("Settings JSON exported from the project settings store"),
                ),
        )
        .subcommand(
            Command::new("notify")
                .about("Run the publish notification stages over a manifest")
                .arg(
                    Arg::new("settings")
                        .short('s')
                        .long("settings")
                        .value_name("FILE")
                        .required(true)
                        .help("Settings JSON exported from the project settings store"),
                )
                .arg(
                    Arg::new("manifest")
                        .short('m')
                        .long("manifest")
                        .value_name("FILE")
                        .required(true)
                        .help("Publish manifest JSON (context + instances)"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Collect matching profiles only, do not dispatch"),
                ),
        )
        .get_matches();

    let code = match matches.subcommand() {
        Some(("check", sub)) => run_check(sub).await,
        Some(("notify", sub)) => run_notify(sub).await,
        _ => {
            println!("callsheet v{}", VERSION);
            println!("Use --help for available commands");
            0
        }
    };
    std::process::exit(code);
}

fn load_settings(args: &clap::ArgMatches) -> Result<SlackSettings, i32> {
    let path = args.get_one::<String>("settings").unwrap();
    SlackSettings::from_path(Path::new(path)).map_err(|e| {
        eprintln!("{}", e);
        1
    })
}

async fn run_check(args: &clap::ArgMatches) -> i32 {
    let settings = match load_settings(args) {
        Ok(settings) => settings,
        Err(code) => return code,
    };

    let client = match SlackApiClient::new(&settings.token) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    match client.auth_test().await {
        Ok(auth) => {
            println!(
                "token ok: workspace '{}' as '{}'",
                auth.team.as_deref().unwrap_or("unknown"),
                auth.user.as_deref().unwrap_or("unknown"),
            );
            0
        }
        Err(e) => {
            eprintln!("token check failed: {}", e);
            1
        }
    }
}

async fn run_notify(args: &clap::ArgMatches) -> i32 {
    let settings = match load_settings(args) {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    if !settings.enabled {
        println!("slack notifications are disabled in settings");
        return 0;
    }

    let manifest_path = args.get_one::<String>("manifest").unwrap();
    let raw = match std::fs::read_to_string(manifest_path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("read {}: {}", manifest_path, e);
            return 1;
        }
    };
    let manifest: PublishManifest = match serde_json::from_str(&raw) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("manifest parse: {}", e);
            return 1;
        }
    };

    let dry_run = args.get_flag("dry-run");
    let mut stages: Vec<Box<dyn PublishStage>> =
        vec![Box::new(CollectNotifyProfiles::new(settings))];
    if !dry_run {
        stages.push(Box::new(IntegrateSlackMessages::new()));
    }

    let mut ctx = manifest.context;
    let mut instances = manifest.instances;
    tracing::info!(instances = instances.len(), dry_run, "starting publish run");
    callsheet_slack::run_publish(stages, &mut ctx, &mut instances).await;

    for instance in &instances {
        match &instance.notification {
            Some(plan) => println!(
                "{}: {} channel message(s) matched",
                instance.product_name,
                plan.messages.len()
            ),
            None => println!("{}: no notification", instance.product_name),
        }
        for receipt in &instance.deliveries {
            if receipt.success {
                println!("  {} -> sent", receipt.channel);
            } else {
                println!(
                    "  {} -> failed: {}",
                    receipt.channel,
                    receipt.error.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
    0
}
