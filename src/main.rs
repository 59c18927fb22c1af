use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use speech_relay::{
    ApiServerBuilder, AudioContainer, Config, Dispatcher, Operation, ProxyBody, ProxyResponse,
    ScriptSandbox, audio,
};

/// Speech relay - WAV encoding and STT/TTS proxy for browser speech clients
#[derive(Parser)]
#[command(name = "speech-relay", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(short, long, env = "SPEECH_RELAY_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP relay (default)
    Serve,
    /// Re-encode a WAV file as 16-bit PCM
    Encode {
        /// Input WAV file
        input: PathBuf,
        /// Output path
        output: PathBuf,
    },
    /// Send a WAV file to the upstream STT service
    Transcribe {
        /// WAV file to transcribe
        input: PathBuf,
    },
    /// Synthesize speech from text via the upstream TTS service
    Synthesize {
        /// Text to speak
        text: String,
        /// Write decoded audio here instead of printing JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Run a script in the sandbox
    Script {
        /// Source code; the value of the last expression is printed
        code: String,
        /// Global variable binding (`name=value`, value parsed as JSON when possible)
        #[arg(short, long = "bind", value_name = "NAME=VALUE")]
        bindings: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,speech_relay=info",
        1 => "info,speech_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.port).await,
        Command::Encode { input, output } => encode(&input, &output),
        Command::Transcribe { input } => transcribe(&input).await,
        Command::Synthesize { text, out } => synthesize(&text, out.as_deref()).await,
        Command::Script { code, bindings } => script(&code, &bindings).await,
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let port = port.unwrap_or(config.api_server.port);

    tracing::info!(
        upstream = %config.upstream.url,
        port,
        max_concurrent = config.dispatch.max_concurrent_requests,
        "starting speech relay"
    );

    let dispatcher = Dispatcher::from_config(config.upstream, config.dispatch)?;
    ApiServerBuilder::new(dispatcher, port)
        .api_key(config.api_server.api_key)
        .rate_limit(config.api_server.rate_limit_per_minute)
        .build()
        .run()
        .await?;

    Ok(())
}

fn encode(input: &Path, output: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let decoded = audio::decode(&bytes)?;
    let container = AudioContainer::encode(&decoded)?;
    std::fs::write(output, container.as_bytes())
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "{} -> {} ({} ch, {} Hz, {} frames)",
        input.display(),
        output.display(),
        decoded.channel_count(),
        decoded.sample_rate(),
        decoded.frames()
    );
    Ok(())
}

fn dispatcher() -> anyhow::Result<Dispatcher> {
    let config = Config::load().context("failed to load configuration")?;
    Ok(Dispatcher::from_config(config.upstream, config.dispatch)?)
}

async fn transcribe(input: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;

    // Send the same canonical container a browser client would
    let container = AudioContainer::encode(&audio::decode(&bytes)?)?;
    let response = relay(Operation::Transcribe, container.into_bytes()).await?;

    println!("{}", serde_json::to_string_pretty(&response.body)?);
    Ok(())
}

async fn synthesize(text: &str, out: Option<&Path>) -> anyhow::Result<()> {
    let body = serde_json::to_vec(&serde_json::json!({ "text": text }))?;
    let response = relay(Operation::Synthesize, body).await?;

    match (out, &response.body) {
        (Some(path), ProxyBody::Synthesis(audio)) => {
            let decoded = STANDARD
                .decode(audio.audio.trim())
                .context("upstream audio is not valid base64")?;
            std::fs::write(path, &decoded)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {} bytes to {}", decoded.len(), path.display());
        }
        _ => println!("{}", serde_json::to_string_pretty(&response.body)?),
    }
    Ok(())
}

async fn relay(operation: Operation, body: Vec<u8>) -> anyhow::Result<ProxyResponse> {
    let response = dispatcher()?
        .relay(Some(operation.path()), body.into())
        .await;

    if !response.is_success() {
        if let ProxyBody::Error(error) = &response.body {
            bail!("{operation} failed ({}): {}", response.status, error.message);
        }
        bail!("{operation} failed ({})", response.status);
    }
    Ok(response)
}

async fn script(code: &str, bindings: &[String]) -> anyhow::Result<()> {
    let bindings = parse_bindings(bindings)?;

    let sandbox = ScriptSandbox::install(Config::load_sandbox())?;
    sandbox.start()?;

    let value = sandbox.execute(code, bindings).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Parse `name=value` pairs; values that are not JSON become strings
fn parse_bindings(raw: &[String]) -> anyhow::Result<Map<String, Value>> {
    raw.iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .with_context(|| format!("binding {pair:?} is not NAME=VALUE"))?;
            if name.is_empty() {
                bail!("binding {pair:?} has an empty name");
            }
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((name.to_string(), value))
        })
        .collect()
}
