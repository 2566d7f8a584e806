use anyhow::Result;
use clap::Parser;
use gmail_organizer::cli::{self, Cli, Commands};
use gmail_organizer::config::Config;
use gmail_organizer::error::OrganizerError;
use gmail_organizer::pipeline::RunOptions;
use gmail_organizer::state::RunState;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // aws-lc-rs elsewhere, ring on Windows (no NASM/CMake toolchain needed)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_organizer=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_organizer=info,warn"))
    };

    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Gmail organizer v{} starting...", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            let hub =
                gmail_organizer::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, *force)
                    .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Scope must be explicit or the call triggers a second consent flow
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope("https://www.googleapis.com/auth/gmail.modify")
                .doit()
                .await?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );
            Ok(())
        }

        Commands::Run {
            execute,
            labels_only,
            migrate,
            cleanup,
            categorize,
            max_messages,
            resume,
        } => {
            let options = RunOptions {
                dry_run: !execute,
                labels_only: *labels_only,
                migrate: *migrate,
                cleanup: *cleanup,
                categorize: *categorize,
                max_messages: 0,
                resume: *resume,
            };

            let report = cli::run_pipeline(
                &cli,
                options,
                *execute,
                *max_messages,
                (*multi_progress).clone(),
            )
            .await?;

            cli::print_report(&report);
            if report.dry_run {
                println!("\nDry run complete. Run with --execute to apply changes.");
            }
            Ok(())
        }

        Commands::Plan => {
            let (plan, path) = cli::run_plan(&cli, (*multi_progress).clone()).await?;
            cli::print_plan(&plan);
            println!("\nPlan written to {:?}", path);
            Ok(())
        }

        Commands::Status => {
            let (config, _) = cli::load_runtime(&cli).await?;
            let state_path = config.output.state_path();
            if state_path.exists() {
                let state = RunState::load(&state_path).await?;
                cli::print_status(&state);
            } else {
                println!("No active or previous runs found.");
                println!("State file: {:?}", state_path);
            }
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(OrganizerError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - api.calls_per_second / api.burst_capacity: request throttling");
            println!("  - api.max_retries / api.base_delay_secs: retry policy");
            println!("  - execution.max_messages: categorization limit (0 = no limit)");
            println!("  - taxonomy.file: replace the built-in hierarchy and rules");
            Ok(())
        }
    }
}

fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(organizer_err) = error.downcast_ref::<OrganizerError>() {
        match organizer_err {
            OrganizerError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      Try running: gmail-organizer auth --force");
            }
            OrganizerError::RateLimitExceeded { .. } | OrganizerError::Exhausted { .. } => {
                eprintln!("\nHint: The Gmail API kept refusing requests.");
                eprintln!("      Lower api.calls_per_second or retry later with --resume.");
            }
            OrganizerError::ConfigError(_) | OrganizerError::RuleError(_) => {
                eprintln!("\nHint: Check your configuration and taxonomy files.");
                eprintln!("      Run: gmail-organizer init-config --force");
            }
            _ => {}
        }
    }
    eprintln!("\nFor help, run: gmail-organizer --help");
}
