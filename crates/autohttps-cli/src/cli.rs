use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use autohttps::{
    App,
    config::{Config, LogLevel},
    placeholder::Replacer,
    tls::acme::AcmeBackend,
};
use clap::{Parser, Subcommand};
use log::{debug, error, info};
use tokio::sync::Notify;

use crate::{error::CliError, format::FormatType};

const DEFAULT_CONFIG_FILE: &str = "autohttps.toml";

const STARTER_CONFIG: &str = r#"log_level = "info"

[servers.site]
listen = [":443"]

[[servers.site.routes]]
match = [[{ host = ["example.com", "www.example.com"] }]]
handle = [{ handler = "file_server", root = "./public" }]

[servers.site.automatic_https]
skip = []
disable_redirects = false
"#;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start serving with the provided configuration, managing certificates automatically
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Show the certificates and redirects automatic HTTPS would set up for a configuration
    Plan {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// The format to print the provisioned configuration in
        #[arg(short, long, value_enum, default_value_t)]
        format: FormatType,
    },

    /// Create a new configuration file in the target directory
    Init {
        /// The path to the target directory where the configuration file will be created
        #[arg(required = false)]
        target_dir: Option<PathBuf>,
    },

    /// Print the version of the CLI
    Version,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "info")]
    /// The log level for the application
    log_level: Option<LogLevel>,

    #[clap(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn new() -> Self {
        let cli = Cli::parse();

        // NOTE: this always overrides the log level set in the configuration file
        let level = cli
            .log_level
            .unwrap_or_default()
            .to_log_level_filter();
        env_logger::Builder::new().filter_level(level).init();

        cli
    }

    pub async fn execute(&self) -> Result<(), CliError> {
        match &self.command {
            Commands::Run { config } => self.run(config).await,
            Commands::Plan { config, format } => self.plan(config, format).await,
            Commands::Init { target_dir } => self.init(target_dir.clone()).await,
            Commands::Version => {
                println!("autohttps {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }

    async fn run(&self, path: &Path) -> Result<(), CliError> {
        debug!("Reading configuration from '{}'", path.display());
        let input = tokio::fs::read_to_string(path).await?;
        let config = FormatType::default().format(&input).parse()?;

        let backend = AcmeBackend::from_config(&config.tls);
        let resolver = backend.resolver();

        let mut app = App::new(config)?.with_backend(Box::new(backend));
        let listeners = app.start().await?;

        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {e}");
                return;
            }

            info!("Received shutdown signal, closing listeners");
            signal.notify_waiters();
        });

        app.serve(listeners, Some(resolver.tls_acceptor()), shutdown)
            .await?;

        Ok(())
    }

    async fn plan(&self, path: &Path, format_type: &FormatType) -> Result<(), CliError> {
        debug!("Reading configuration from '{}'", path.display());
        let input = tokio::fs::read_to_string(path).await?;

        let config = format_type.format(&input).parse()?;
        let mut app = App::new(config)?;

        let domains = app.run_phase1(&Replacer::new())?.to_vec();
        if domains.is_empty() {
            info!("No names qualify for automatic certificate management");
        } else {
            println!("# certificates will be managed for:");
            for domain in &domains {
                println!("#   {domain}");
            }
        }

        let provisioned = app.into_config();
        println!("{}", format_type.format("").to_format_string(&provisioned)?);

        Ok(())
    }

    async fn init(&self, target_dir: Option<PathBuf>) -> Result<(), CliError> {
        let dir = match target_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };

        let path = dir.join(DEFAULT_CONFIG_FILE);
        if tokio::fs::try_exists(&path).await? {
            return Err(CliError::Generic(format!(
                "A configuration file already exists at '{}'",
                path.display()
            )));
        }

        // round-trip the starter so what gets written is always a loadable config
        let format = FormatType::default();
        let config: Config = format.format(STARTER_CONFIG).parse()?;
        config.validate()?;

        tokio::fs::create_dir_all(&dir).await?;
        config.write_to_file(&path, format.format(""))?;

        info!("Created configuration file at '{}'", path.display());
        Ok(())
    }
}
