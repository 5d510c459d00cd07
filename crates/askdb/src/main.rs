#[cfg(feature = "cli")]
mod cli {
    use anyhow::{anyhow, bail, Context};
    use clap::{Parser, Subcommand};

    use askdb::config::Config;
    use askdb::database::{DatabaseConnection, QueryExecutor, QueryResult, SchemaIntrospector};
    use askdb::pipeline::Assistant;
    use askdb::render::render_table;
    use askdb::repl::{format_exchange, Repl};
    use askdb::session::AssistantSession;
    use askdb::{metrics, run_server, telemetry};

    #[derive(Parser)]
    #[command(name = "askdb", version, about = "Ask questions about a database in plain English")]
    struct Cli {
        /// Connection string or SQLite path; overrides DATABASE_URL / DB_PATH
        #[arg(long, short = 'd', global = true)]
        database: Option<String>,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Ask one question and print the SQL, the result and an answer
        Ask {
            question: String,
            /// Skip the natural-language answer
            #[arg(long)]
            no_narrate: bool,
        },
        /// Interactive session
        Chat {
            #[arg(long)]
            no_narrate: bool,
        },
        /// Run one SQL statement directly
        Exec { sql: String },
        /// Print the tables and columns of the database
        Schema,
        /// Serve the HTTP API
        Serve,
    }

    pub async fn run() -> anyhow::Result<()> {
        let cli = Cli::parse();
        let default_filter = if matches!(cli.command, Command::Serve) { "info" } else { "warn" };
        telemetry::init_tracing(default_filter);
        metrics::init_metrics();

        let mut cfg = Config::from_env()?;
        if let Some(database) = cli.database {
            cfg.database_url = Some(database);
        }

        match cli.command {
            Command::Ask { question, no_narrate } => {
                let assistant = Assistant::from_config(&cfg)?;
                let mut session = open_session(&cfg).await?;
                let narrate = cfg.narrate_results && !no_narrate;
                let exchange = assistant.ask(&mut session, &question, narrate).await?;
                println!("{}", format_exchange(&exchange, cfg.result_preview_rows));
                if let QueryResult::ExecutionFailure { message } = &exchange.result {
                    bail!("statement failed: {}", message);
                }
                Ok(())
            }
            Command::Chat { no_narrate } => {
                let assistant = Assistant::from_config(&cfg)?;
                let session = open_session(&cfg).await?;
                let narrate = cfg.narrate_results && !no_narrate;
                Repl::new(assistant, session, narrate, cfg.result_preview_rows).run().await
            }
            Command::Exec { sql } => {
                let connection = require_connection(&cfg).await?;
                match QueryExecutor::new(cfg.query_timeout()).execute(&connection, &sql).await {
                    QueryResult::Rows { columns, .. } if columns.is_empty() => println!("OK"),
                    QueryResult::Rows { columns, rows } => println!("{}", render_table(&columns, &rows, None)),
                    QueryResult::ExecutionFailure { message } => bail!("statement failed: {}", message),
                }
                Ok(())
            }
            Command::Schema => {
                let connection = require_connection(&cfg).await?;
                let schema = SchemaIntrospector::new(cfg.query_timeout())
                    .describe_schema(&connection)
                    .await?;
                if schema.is_empty() {
                    println!("(no tables)");
                } else {
                    println!("{}", schema);
                }
                Ok(())
            }
            Command::Serve => run_server(cfg).await,
        }
    }

    async fn open_session(cfg: &Config) -> anyhow::Result<AssistantSession> {
        let mut session = AssistantSession::new();
        if let Some(target) = cfg.database_target()? {
            session
                .connect(&target)
                .await
                .with_context(|| format!("failed to connect to {}", target))?;
        }
        Ok(session)
    }

    async fn require_connection(cfg: &Config) -> anyhow::Result<DatabaseConnection> {
        let target = cfg
            .database_target()?
            .ok_or_else(|| anyhow!("no database configured; pass --database or set DATABASE_URL"))?;
        DatabaseConnection::connect(&target)
            .await
            .with_context(|| format!("failed to connect to {}", target))
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
