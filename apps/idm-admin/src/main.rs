mod config;
mod logging;
mod redirect;
mod report;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idm_client::{
    ApiClient, FieldSpec, IdmAdmin, IdmError, InventoryOptions, InventoryReport, NewHumanUser,
    SecretString,
};

use crate::config::{AppConfig, CliOverrides, ConfigError};

/// Exit status for configuration problems.
const EXIT_CONFIG: u8 = 2;
/// Exit status for failures reported by the identity platform.
const EXIT_API: u8 = 3;

/// Identity platform administration: client inventory, secret rotation,
/// redirect updates and user provisioning
#[derive(Parser)]
#[command(name = "idm-admin")]
#[command(version)]
struct Cli {
    /// Path to configuration file (default: ./idm-admin.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Platform base URL (overrides config)
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Default organization id (overrides config)
    #[arg(long, global = true)]
    org_id: Option<String>,

    /// Search page size (overrides config)
    #[arg(long, global = true)]
    page_size: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every application, optionally rotating the targeted client's secret
    Inventory {
        /// Rotate the application or service user with this client id
        #[arg(long)]
        target_client_id: Option<String>,
        /// Rotate this machine user's secret
        #[arg(long)]
        target_service_user_id: Option<String>,
        /// Add machine users to the report
        #[arg(long)]
        include_service_users: bool,
        #[arg(short, long, default_value = "idm_clients.csv")]
        output: PathBuf,
    },
    /// List machine users as CSV on stdout
    ServiceUsers,
    /// Regenerate one application's client secret
    RotateApp {
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        app_id: String,
    },
    /// Regenerate a machine user's client secret
    RotateServiceUser {
        user_id: String,
        /// Organization to look the user up in first (default: configured org)
        #[arg(long)]
        owner_hint: Option<String>,
    },
    /// Regenerate the secrets of every OIDC and API application
    RotateAll {
        #[arg(short, long, default_value = "idm_new_secrets.csv")]
        output: PathBuf,
    },
    /// Replace an OIDC application's redirect URIs
    UpdateRedirects {
        #[arg(long)]
        app_id: String,
        /// Last IPv4 octet for the redirect host (default: detected)
        #[arg(long)]
        last_octet: Option<u8>,
        /// Explicit redirect URI, repeatable; replaces the derived ones
        #[arg(long = "redirect-uri")]
        redirect_uris: Vec<String>,
        /// Explicit post-logout URI, repeatable
        #[arg(long = "post-logout-uri")]
        post_logout_uris: Vec<String>,
    },
    /// Create a human user and grant organization roles
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        given_name: String,
        #[arg(long)]
        family_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        email_verified: bool,
        /// Read the initial password from the first line of stdin
        #[arg(long)]
        password_stdin: bool,
        /// Do not force a password change on first login
        #[arg(long)]
        no_password_change: bool,
        /// Organization role, repeatable
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Show a project and its applications as JSON
    Project { project_id: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn exit_status(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    match err.downcast_ref::<IdmError>() {
        Some(IdmError::Config(_)) => EXIT_CONFIG,
        Some(_) => EXIT_API,
        None => 1,
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(&CliOverrides {
        domain: cli.domain.clone(),
        org_id: cli.org_id.clone(),
        page_size: cli.page_size,
    });
    Ok(config)
}

fn build_admin(config: &AppConfig) -> Result<IdmAdmin> {
    let api = ApiClient::new(config.client_config()?)?;
    Ok(IdmAdmin::new(api)
        .with_read_retry(config.read_retry())
        .with_mutation_pause(config.mutation_pause()?))
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let admin = build_admin(&config)?;
    tracing::info!(domain = %config.domain, org_id = %config.org_id, "idm-admin starting");

    match cli.command {
        Commands::Inventory {
            target_client_id,
            target_service_user_id,
            include_service_users,
            output,
        } => {
            let report = admin.inventory(&InventoryOptions {
                target_client_id: target_client_id.filter(|s| !s.is_empty()),
                target_service_user_id: target_service_user_id.filter(|s| !s.is_empty()),
                include_service_users,
            })?;
            save_report(&output, &report)
        }
        Commands::ServiceUsers => {
            let users = admin.list_machine_users()?;
            let _out = report::write_machine_users(io::stdout().lock(), &users)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::RotateApp { project_id, app_id } => rotate_app(&admin, &project_id, &app_id),
        Commands::RotateServiceUser {
            user_id,
            owner_hint,
        } => {
            let hint = owner_hint.unwrap_or_else(|| config.org_id.clone());
            let rotated = admin.rotate_machine_user_secret(&user_id, Some(&hint))?;
            println!("# user_id={} owner={} via {}", rotated.user_id, rotated.owner, rotated.variant);
            println!("{}", rotated.secret.expose());
            Ok(ExitCode::SUCCESS)
        }
        Commands::RotateAll { output } => save_report(&output, &admin.rotate_all_app_secrets()?),
        Commands::UpdateRedirects {
            app_id,
            last_octet,
            redirect_uris,
            post_logout_uris,
        } => {
            let (redirects, logout) = if redirect_uris.is_empty() {
                let octet = redirect::resolve_last_octet(last_octet.or(config.app_last_octet));
                redirect::redirect_uris(&config.redirect, octet)
            } else {
                (redirect_uris, post_logout_uris)
            };
            let updated = admin.update_redirect_uris(&app_id, &redirects, &logout)?;
            println!("# project_id={} app_id={}", updated.project_id, updated.app_id);
            println!("redirectUris: {}", updated.redirect_uris.join(" "));
            println!("postLogoutRedirectUris: {}", updated.post_logout_uris.join(" "));
            for warning in &updated.warnings {
                eprintln!("warning: {warning}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::CreateUser {
            username,
            given_name,
            family_name,
            email,
            email_verified,
            password_stdin,
            no_password_change,
            roles,
        } => {
            let password = if password_stdin {
                Some(read_password(io::stdin().lock())?)
            } else {
                None
            };
            let user = NewHumanUser {
                username,
                given_name,
                family_name,
                email,
                email_verified,
                password,
                password_change_required: !no_password_change,
            };
            create_user(&admin, &user, &roles)
        }
        Commands::Project { project_id } => describe_project(&admin, &project_id),
    }
}

fn save_report(output: &Path, report: &InventoryReport) -> Result<ExitCode> {
    report::save_inventory(output, report)?;
    report::print_summary(output, report);
    Ok(ExitCode::from(report_status(report)))
}

/// Failed rows, skipped projects and cut-short listings all count as failure.
fn report_status(report: &InventoryReport) -> u8 {
    if report.is_complete() { 0 } else { EXIT_API }
}

fn create_user(admin: &IdmAdmin, user: &NewHumanUser, roles: &[String]) -> Result<ExitCode> {
    let created = admin.provision_human_user(user, roles)?;
    println!("# user_id={} org_id={}", created.user_id, created.org_id);
    if let Some(err) = created.membership_error {
        eprintln!("warning: user created but roles were not granted: {err}");
        return Ok(ExitCode::from(EXIT_API));
    }
    if !created.roles_granted.is_empty() {
        println!("# roles: {}", created.roles_granted.join(","));
    }
    Ok(ExitCode::SUCCESS)
}

fn describe_project(admin: &IdmAdmin, project_id: &str) -> Result<ExitCode> {
    let described = admin.describe_project(project_id)?;
    let apps: Vec<_> = described
        .apps
        .iter()
        .map(|app| {
            serde_json::json!({
                "id": app.app_id,
                "name": app.name,
                "type": app.kind.to_string(),
                "clientId": app.client_id,
            })
        })
        .collect();
    let out = serde_json::json!({
        "project": described.project.as_map(),
        "apps": apps,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(ExitCode::SUCCESS)
}

fn rotate_app(admin: &IdmAdmin, project_id: &str, app_id: &str) -> Result<ExitCode> {
    let app = admin
        .list_apps(project_id)?
        .into_iter()
        .find(|app| app.text(&FieldSpec::RESOURCE_ID) == app_id)
        .ok_or_else(|| IdmError::NotFound {
            kind: "app",
            id: app_id.to_owned(),
        })?;
    let (secret, variant) = admin.rotate_app_secret(project_id, &app)?;
    println!(
        "# app_id={app_id} client_id={} via {variant}",
        app.text(&FieldSpec::CLIENT_ID)
    );
    println!("{}", secret.expose());
    Ok(ExitCode::SUCCESS)
}

fn read_password(mut input: impl BufRead) -> Result<SecretString> {
    let mut line = String::new();
    input.read_line(&mut line).context("cannot read password from stdin")?;
    let password = SecretString::new(line.trim_end_matches(['\r', '\n']));
    // zeroizes the raw line
    drop(SecretString::new(line));
    if password.is_blank() {
        return Err(ConfigError::Invalid("password from stdin is empty".to_owned()).into());
    }
    Ok(password)
}
