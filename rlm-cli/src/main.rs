//! # RLM CLI
//!
//! Command-line interface for the recursive language model engine.
//!
//! Usage:
//!   rlm run <query> --context <file>
//!   rlm exec <script.rhai> [--context <file>] [--ast]
//!   rlm prompt [--context <file>]
//!
//! Examples:
//!   rlm run "How many ERROR lines are there?" --context server.log
//!   rlm run -v --max-depth 2 "Summarize each section" --context report.txt
//!   rlm exec count_levels.rhai --context records.json
//!   rlm prompt --context records.json

mod logging;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rlm_engine::prompt::system_prompt;
use rlm_engine::{
    CancellationToken, Completion, Context, Engine, EngineConfig, OpenAIClient, ProviderConfig,
};
use rlm_error::{Error, ErrorKind, Result};
use rlm_vm::{compile, DefaultRecursionHandler, Sandbox};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rlm")]
#[command(author, version, about = "RLM - answer questions about contexts too large for a prompt")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (execution trace and engine logs)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only show the final answer
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query about a context
    Run(RunArgs),
    /// Execute a script in the sandbox, without a model
    Exec {
        /// Path to the script
        script: PathBuf,

        #[command(flatten)]
        context: ContextArgs,

        /// Print the compiled AST before running
        #[arg(long)]
        ast: bool,
    },
    /// Print the system prompt a run would start with
    Prompt {
        #[command(flatten)]
        context: ContextArgs,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// The query
    #[arg(trailing_var_arg = true, required = true)]
    query: Vec<String>,

    #[command(flatten)]
    context: ContextArgs,

    #[command(flatten)]
    engine: EngineArgs,

    /// Model backend
    #[arg(long, value_enum, default_value_t = Provider::Openrouter)]
    provider: Provider,

    /// Override the provider's base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Print the whole completion as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ContextArgs {
    /// File holding the context
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// How to read the context file
    #[arg(long, value_enum, default_value_t = ContextFormat::Auto)]
    format: ContextFormat,
}

#[derive(Args, Default)]
struct EngineArgs {
    /// JSON config file, applied before the flags below
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    root_model: Option<String>,

    #[arg(long)]
    recursive_model: Option<String>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Maximum recursion depth (0 disables recursive_lm)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Per-fragment time limit in seconds
    #[arg(long)]
    timeout: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ContextFormat {
    /// JSON arrays and objects are structured, anything else is text
    Auto,
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Provider {
    Openrouter,
    Openai,
    Local,
}

const LOCAL_BASE_URL: &str = "http://localhost:11434/v1";

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max_chars).collect::<String>())
    }
}

fn one_line(s: &str) -> String {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" | ")
}

/// Read a context file. Without a file the context is empty text.
fn load_context(path: Option<&Path>, format: ContextFormat) -> Result<Context> {
    let Some(path) = path else {
        return Ok(Context::Text(String::new()));
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::from(e)
            .with_operation("cli::load_context")
            .with_context("path", path.display().to_string())
    })?;

    match format {
        ContextFormat::Text => Ok(Context::Text(text)),
        ContextFormat::Json => {
            let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                Error::new(ErrorKind::SerializationFailed, format!("context is not valid JSON: {}", e))
                    .with_operation("cli::load_context")
                    .with_context("path", path.display().to_string())
                    .set_source(e)
            })?;
            Ok(Context::from(value))
        }
        ContextFormat::Auto => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) => {
                Ok(Context::from(value))
            }
            _ => Ok(Context::Text(text)),
        },
    }
}

/// Defaults, then the config file, then flags
fn engine_config(args: &EngineArgs, verbose: bool) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(model) = &args.root_model {
        config.root_model = model.clone();
    }
    if let Some(model) = &args.recursive_model {
        config.recursive_model = model.clone();
    }
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    if let Some(depth) = args.max_depth {
        config.max_recursion_depth = depth;
    }
    if let Some(secs) = args.timeout {
        config.fragment_timeout = Duration::try_from_secs_f64(secs).map_err(|e| {
            Error::config_invalid("fragment_timeout", format!("invalid --timeout: {}", e))
        })?;
    }
    config.verbose = config.verbose || verbose;
    config.validate()?;
    Ok(config)
}

fn provider_config(provider: Provider, base_url: Option<&str>) -> Result<ProviderConfig> {
    let api_key = |var: &'static str| {
        std::env::var(var).map_err(|_| {
            Error::config_invalid("api_key", format!("{} is not set", var)).with_operation("cli::provider")
        })
    };
    let config = match provider {
        Provider::Openrouter => ProviderConfig::openrouter(api_key("OPENROUTER_API_KEY")?),
        Provider::Openai => ProviderConfig::openai(api_key("OPENAI_API_KEY")?),
        Provider::Local => ProviderConfig::local(LOCAL_BASE_URL),
    };
    Ok(match base_url {
        Some(url) => config.with_base_url(url),
        None => config,
    })
}

fn print_completion(completion: &Completion, verbose: bool, quiet: bool) {
    if !quiet {
        println!("\n--- FINAL ANSWER ---\n");
    }
    println!("{}", completion.answer);

    if verbose {
        println!("\n--- Execution Trace ({} fragments) ---", completion.trace.len());
        for record in &completion.trace {
            let err = if record.error.is_some() { " [error]" } else { "" };
            println!(
                "  {:3}. {} -> {}{}",
                record.iteration,
                truncate(&one_line(&record.code), 60),
                truncate(&one_line(&record.output), 80),
                err
            );
        }
        println!("\n--- Transcript ---\n");
        completion.pretty_print();
    }

    if !quiet {
        println!(
            "\n{} iterations, {} model calls ({} requests, {} tokens)",
            completion.iterations,
            completion.total_calls,
            completion.usage.requests,
            completion.usage.total_tokens()
        );
    }
}

async fn run(args: RunArgs, verbose: bool, quiet: bool) -> Result<()> {
    let config = engine_config(&args.engine, verbose)?;
    let context = load_context(args.context.context.as_deref(), args.context.format)?;
    let client = OpenAIClient::new(provider_config(args.provider, args.base_url.as_deref())?)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let engine = Engine::new(client, config)?.with_cancellation(cancel);
    let query = args.query.join(" ");
    if !quiet && !args.json {
        println!("RLM - {} over a {} context\n", engine.config().root_model, context.kind());
    }

    let completion = engine.complete(&query, context).await?;

    if args.json {
        let json = serde_json::to_string_pretty(&completion).map_err(|e| {
            Error::new(ErrorKind::SerializationFailed, "failed to serialize completion")
                .with_operation("cli::run")
                .set_source(e)
        })?;
        println!("{}", json);
    } else {
        print_completion(&completion, verbose, quiet);
    }
    Ok(())
}

async fn exec(script: &Path, context: &ContextArgs, show_ast: bool) -> Result<bool> {
    let source = std::fs::read_to_string(script).map_err(|e| {
        Error::from(e)
            .with_operation("cli::exec")
            .with_context("path", script.display().to_string())
    })?;
    let context = load_context(context.context.as_deref(), context.format)?;

    if show_ast {
        match compile(&source) {
            Ok(ast) => println!("{:#?}", ast),
            Err(e) => eprintln!("{}", rlm_vm::render_error(&e)),
        }
    }

    // No depth budget: recursive_lm raises RecursionDepthExceeded
    let mut sandbox = Sandbox::new(context.to_dynamic());
    let output = sandbox.run(&source, &mut DefaultRecursionHandler).await;
    println!("{}", output.render());
    Ok(output.is_success())
}

fn prompt(context: &ContextArgs, engine: &EngineArgs) -> Result<()> {
    let config = engine_config(engine, false)?;
    let context = load_context(context.context.as_deref(), context.format)?;
    println!(
        "{}",
        system_prompt(
            &context.metadata(config.preview_chars),
            config.max_iterations,
            config.max_recursion_depth
        )
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => run(args, cli.verbose, cli.quiet).await,
        Commands::Exec {
            script,
            context,
            ast,
        } => match exec(&script, &context, ast).await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(1),
            Err(e) => Err(e),
        },
        Commands::Prompt { context, engine } => prompt(&context, &engine),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "rlm", "run", "--context", "log.txt", "--max-depth", "2", "-v", "how", "many?",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.query, ["how", "many?"]);
        assert_eq!(args.engine.max_depth, Some(2));
        assert_eq!(args.provider, Provider::Openrouter);
    }

    #[test]
    fn test_load_context_auto() {
        let file = file_with(r#"["a", "b"]"#);
        let ctx = load_context(Some(file.path()), ContextFormat::Auto).unwrap();
        assert_eq!(ctx.kind(), "list");

        let file = file_with(r#"{"k": 1}"#);
        let ctx = load_context(Some(file.path()), ContextFormat::Auto).unwrap();
        assert_eq!(ctx.kind(), "dict");

        let file = file_with("42");
        let ctx = load_context(Some(file.path()), ContextFormat::Auto).unwrap();
        assert_eq!(ctx, Context::Text("42".into()));

        let file = file_with("ERROR disk full\nINFO ok\n");
        let ctx = load_context(Some(file.path()), ContextFormat::Auto).unwrap();
        assert_eq!(ctx.size(), 24);
    }

    #[test]
    fn test_load_context_forced_formats() {
        let file = file_with(r#"["a"]"#);
        let ctx = load_context(Some(file.path()), ContextFormat::Text).unwrap();
        assert_eq!(ctx.kind(), "str");

        let file = file_with("not json");
        let err = load_context(Some(file.path()), ContextFormat::Json).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SerializationFailed);

        let err = load_context(Some(Path::new("/nonexistent/ctx.txt")), ContextFormat::Auto).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);

        assert_eq!(load_context(None, ContextFormat::Auto).unwrap().size(), 0);
    }

    #[test]
    fn test_engine_config_layering() {
        let file = file_with(r#"{"root_model": "from/file", "max_iterations": 4}"#);
        let args = EngineArgs {
            config: Some(file.path().to_path_buf()),
            max_iterations: Some(6),
            timeout: Some(1.5),
            ..EngineArgs::default()
        };
        let config = engine_config(&args, true).unwrap();
        assert_eq!(config.root_model, "from/file");
        assert_eq!(config.max_iterations, 6);
        assert_eq!(config.fragment_timeout, Duration::from_millis(1500));
        assert!(config.verbose);

        let args = EngineArgs {
            max_iterations: Some(0),
            ..EngineArgs::default()
        };
        assert_eq!(engine_config(&args, false).unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let config = provider_config(Provider::Local, Some("http://127.0.0.1:8080/v1")).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:8080/v1");
        assert!(config.api_key.is_none());
    }

    #[tokio::test]
    async fn test_exec_runs_script_against_context() {
        let script = file_with("let errors = regex_filter(context, \"^ERROR\");\nprint(errors.len());");
        let log = file_with("ERROR disk full\nINFO ok\nERROR fan\n");
        let context = ContextArgs {
            context: Some(log.path().to_path_buf()),
            format: ContextFormat::Text,
        };
        assert!(exec(script.path(), &context, true).await.unwrap());

        let script = file_with("recursive_lm(\"deeper\")");
        assert!(!exec(script.path(), &context, false).await.unwrap());

        let cli = Cli::try_parse_from(["rlm", "exec", "scan.rhai", "--ast"]).unwrap();
        assert!(matches!(cli.command, Commands::Exec { ast: true, .. }));
    }

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("let a = 1;\n\n  print(a);\n"), "let a = 1; | print(a);");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
