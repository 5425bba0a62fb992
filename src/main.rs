use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use docent_gateway::Config;
use docent_gateway::api::ApiServerBuilder;
use docent_gateway::assistant::{Assistant, session_voice_id};
use docent_gateway::client::GatewayClient;
use docent_gateway::content::DocumentSource;
use docent_gateway::query::{
    DocumentModel, KnowledgeBase, MatcherRules, QueryResolver, StructuredMatcher,
};
use docent_gateway::voice::{
    AudioSink, CommandAudioSink, CommandSpeechEngine, Enhancer, LocalSpeechEngine, ProxyConfig,
    RemoteSynthesizer, Sequencer, SequencerConfig, SequencerEvent, SpeechProxy, TextToSpeech,
    select_default_voice,
};

/// Docent - voice question answering over a document
#[derive(Parser)]
#[command(name = "docent", version, about)]
struct Cli {
    /// Port to listen on (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server (default)
    Serve,
    /// Answer a single question and print it
    Ask {
        /// Question to answer
        question: String,
    },
    /// Answer one transcript per stdin line, speaking each answer
    Chat,
    /// List local speech voices
    Voices,
    /// Test ElevenLabs TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Set up logging based on verbosity, RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,docent_gateway=info",
        1 => "info,docent_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Ask { question } => ask(&config, &question).await,
        Command::Chat => chat(&config).await,
        Command::Voices => voices(&config).await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

/// Run the gateway until interrupted
async fn serve(config: Config) -> anyhow::Result<()> {
    let source = DocumentSource::from_config(&config.document);

    // A malformed knowledge base is fatal, a missing one is not
    let knowledge = source.load_knowledge()?.map(Arc::new);
    let content = source.load_text().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "document unavailable, starting empty");
        String::new()
    });

    let resolver = QueryResolver::new(
        knowledge,
        matcher(&config),
        DocumentModel::new(source.title.clone(), content),
    );

    let tts = config
        .api_keys
        .elevenlabs
        .clone()
        .map(|key| {
            TextToSpeech::new(key, config.voice.tts_model.clone(), config.voice.settings)
                .map(Arc::new)
        })
        .transpose()?;

    let enhancer = config
        .api_keys
        .openai
        .clone()
        .map(|key| {
            Enhancer::new(key, config.llm.model.clone(), config.llm.persona.clone())
                .map(Arc::new)
        })
        .transpose()?;

    let tts_enabled = tts.is_some();
    let openai_enabled = enhancer.is_some();
    if !tts_enabled {
        tracing::warn!("no ElevenLabs API key, clients will speak locally");
    }

    let proxy = SpeechProxy::spawn(
        tts,
        enhancer,
        ProxyConfig {
            default_voice_id: Some(config.voice.voice_id.clone()),
            max_chars: config.voice.max_chars,
            queue_delay: config.voice.queue_delay,
        },
    );

    let server = ApiServerBuilder::new(config.server.port, source.id.clone(), resolver, proxy)
        .voice_id(config.voice.voice_id.clone())
        .voice_settings(config.voice.settings)
        .tts_enabled(tts_enabled)
        .openai_enabled(openai_enabled)
        .static_dir(config.server.static_dir.clone())
        .allowed_origins(config.server.allowed_origins.clone())
        .build();

    tracing::info!(document = %source.id, "docent gateway ready");

    let handle = server.spawn();
    tokio::select! {
        result = handle => result??,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}

/// Answer one question against the gateway's (or local) knowledge sources
async fn ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let client = GatewayClient::new(&config.gateway_url);
    let mut resolver = load_resolver(config, &client, true).await?;

    let resolution = resolver.resolve(question);
    println!("{}", resolution.answer);
    tracing::debug!(source = ?resolution.source, "answered");

    Ok(())
}

/// Interactive session: one transcript per line, answers spoken in order
async fn chat(config: &Config) -> anyhow::Result<()> {
    let client = GatewayClient::new(&config.gateway_url);

    let remote_config = client
        .fetch_config()
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "gateway config unavailable"))
        .ok();
    let gateway_up = remote_config.is_some();

    let resolver = load_resolver(config, &client, gateway_up).await?;

    let voice_id = session_voice_id(
        resolver.knowledge().map(Arc::as_ref),
        remote_config.as_ref().map(|c| c.elevenlabs_voice_id.as_str()),
        &config.voice.voice_id,
    );

    let remote: Option<Arc<dyn RemoteSynthesizer>> = match &remote_config {
        Some(c) if c.tts_enabled => Some(Arc::new(client.clone())),
        _ => None,
    };

    let local: Arc<dyn LocalSpeechEngine> =
        Arc::new(CommandSpeechEngine::new(&config.voice.speech_engine)?);
    let sink: Arc<dyn AudioSink> = Arc::new(CommandAudioSink::new(&config.voice.player)?);

    let mut sequencer_config = SequencerConfig::new(voice_id);
    sequencer_config.retry_delay = config.voice.retry_delay;

    let (handle, mut events) = Sequencer::spawn(sequencer_config, remote, local, sink);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut assistant = Assistant::new(resolver, handle);
    println!("Ask a question, or type `play` for held audio (Ctrl-D to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().eq_ignore_ascii_case("play") {
            assistant.speech().play_held()?;
            continue;
        }
        assistant.handle_transcript(&line)?;
    }

    assistant.finish().await?;
    printer.await?;
    Ok(())
}

fn print_event(event: &SequencerEvent) {
    match event {
        SequencerEvent::Answer { text } => println!("> {text}"),
        SequencerEvent::Degraded { reason, .. } => {
            println!("(using local voice: {reason})");
        }
        SequencerEvent::ManualPlayRequired { .. } => {
            println!("(audio could not start automatically, type `play` to hear it)");
        }
        SequencerEvent::PlaybackFailed { reason, .. } => {
            println!("(playback stopped: {reason})");
        }
        SequencerEvent::SpeechFailed { text, reason } => {
            println!("> {text}");
            println!("(speech unavailable: {reason})");
        }
    }
}

/// List local voices, marking the default
async fn voices(config: &Config) -> anyhow::Result<()> {
    let engine = CommandSpeechEngine::new(&config.voice.speech_engine)?;
    let voices = engine.list_voices().await?;

    let default = select_default_voice(&voices).map(|v| v.id.clone());
    for voice in &voices {
        let marker = if default.as_deref() == Some(voice.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<24} {:<10} {}", voice.id, voice.lang, voice.name);
    }

    println!("\n{} voices", voices.len());
    Ok(())
}

/// Test TTS output via ElevenLabs
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let key = config
        .api_keys
        .elevenlabs
        .clone()
        .ok_or_else(|| anyhow::anyhow!("ELEVEN_LABS_API_KEY is not set"))?;
    let tts = TextToSpeech::new(key, config.voice.tts_model.clone(), config.voice.settings)?;

    println!("Synthesizing speech...");
    let audio = tts
        .synthesize(text, &config.voice.voice_id, None, None)
        .await?;
    println!("Received {} bytes of audio", audio.len());

    println!("Playing...");
    let sink = CommandAudioSink::new(&config.voice.player)?;
    let mut playback = sink.start(&audio).await?;
    playback.finished().await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");
    Ok(())
}

fn matcher(config: &Config) -> StructuredMatcher {
    StructuredMatcher::new(MatcherRules {
        similarity_threshold: config.document.similarity_threshold,
        ..MatcherRules::default()
    })
}

/// Build a resolver from the gateway, falling back to local files
async fn load_resolver(
    config: &Config,
    client: &GatewayClient,
    use_gateway: bool,
) -> anyhow::Result<QueryResolver> {
    let source = DocumentSource::from_config(&config.document);

    let (knowledge, document) = if use_gateway {
        match client.fetch_document(&source.id).await {
            Ok(body) => {
                let knowledge = client
                    .fetch_knowledge_base(&source.id)
                    .await
                    .inspect_err(|e| tracing::info!(error = %e, "no structured answers"))
                    .ok();
                (knowledge, DocumentModel::new(body.title, body.content))
            }
            Err(e) => {
                tracing::warn!(error = %e, "gateway unavailable, reading local files");
                local_sources(&source)?
            }
        }
    } else {
        local_sources(&source)?
    };

    Ok(QueryResolver::new(
        knowledge.map(Arc::new),
        matcher(config),
        document,
    ))
}

fn local_sources(
    source: &DocumentSource,
) -> anyhow::Result<(Option<KnowledgeBase>, DocumentModel)> {
    let knowledge = source.load_knowledge()?;
    let content = source.load_text().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "document unavailable");
        String::new()
    });

    Ok((knowledge, DocumentModel::new(source.title.clone(), content)))
}
