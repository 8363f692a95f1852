mod cli;
mod scenario;
mod scripted;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use troupe_backend::activation::{ActivationRequest, ActivationResolver};
use troupe_backend::chat::{ChatLog, ChatMessage};
use troupe_backend::config::EngineConfig;
use troupe_backend::events::GroupEvent;
use troupe_backend::generation::TurnKind;
use troupe_backend::registry::CharacterRegistry;
use troupe_backend::runtime::EngineRuntime;
use troupe_backend::sequencer::RunOutcome;

use cli::{Args, Command, TurnArgs};
use scenario::Scenario;
use scripted::ScriptedGenerator;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,troupe=debug,troupe_backend=debug")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load(),
    };

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(async move {
        match args.command {
            Command::Activate(turn) => activate(turn, &config),
            Command::Simulate {
                turn,
                cycles,
                delay_ms,
                streaming,
                multigen,
                auto,
                auto_for_secs,
            } => {
                let mut config = config;
                config.streaming_enabled |= streaming;
                config.multigen_enabled |= multigen;
                let options = SimulateOptions {
                    cycles,
                    delay: Duration::from_millis(delay_ms),
                    auto_for: auto.then(|| Duration::from_secs(auto_for_secs)),
                };
                simulate(turn, config, options).await
            }
        }
    })
}

fn request_for(turn: &TurnArgs, scenario: &Scenario) -> ActivationRequest {
    let kind = TurnKind::from(turn.kind);
    let mut request = ActivationRequest::new(kind);
    if let Some(input) = turn.input.clone().or_else(|| scenario.input.clone()) {
        request = request.with_input(input);
    }
    if let Some(id) = &turn.force {
        request = request.with_forced_member(id.clone());
    }
    if kind == TurnKind::Quiet {
        request = request.with_quiet_prompt("What are you thinking right now?");
    }
    request
}

/// Dry run: print who would speak, in order, without generating.
fn activate(turn: TurnArgs, config: &EngineConfig) -> Result<()> {
    let scenario = Scenario::load(&turn.scenario)?;
    let request = request_for(&turn, &scenario);
    let mut rng = match turn.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let resolver = ActivationResolver::new(&scenario.book)
        .with_default_talkativeness(config.default_talkativeness);
    let result = resolver
        .resolve(&scenario.group, &request, scenario.chat.last(), &mut rng)
        .context("activation failed")?;

    if result.is_empty() {
        println!("Nobody in {} would reply.", scenario.group.name);
        return Ok(());
    }
    println!("Reply order for {} ({:?}):", scenario.group.name, request.kind);
    for (position, member) in result.members.iter().enumerate() {
        let name = scenario
            .book
            .display_name(&member.id)
            .unwrap_or_else(|| member.id.clone());
        println!("  {}. {} [{}]", position + 1, name, member.id);
    }
    Ok(())
}

struct SimulateOptions {
    cycles: u32,
    delay: Duration,
    auto_for: Option<Duration>,
}

async fn simulate(turn: TurnArgs, config: EngineConfig, options: SimulateOptions) -> Result<()> {
    let scenario = Scenario::load(&turn.scenario)?;
    let mut request = request_for(&turn, &scenario);
    let user_name = config.user_name.clone();

    let chat = Arc::new(ChatLog::new(scenario.chat.clone()));
    let book = Arc::new(scenario.book.clone());
    let generator = Arc::new(ScriptedGenerator::new(
        chat.clone(),
        book.clone(),
        scenario.lines.clone(),
        options.delay,
        config.delivery(),
    ));

    let (event_tx, event_rx) = flume::unbounded();
    let mut builder = EngineRuntime::builder(config)
        .with_registry(book)
        .with_generator(generator)
        .with_chat(chat.clone())
        .with_events(event_tx);
    if let Some(seed) = turn.seed {
        builder = builder.with_seed(seed);
    }
    let runtime = builder.build().context("failed to build engine runtime")?;
    runtime.groups.insert(scenario.group.clone()).await;

    let printer = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv_async().await {
            print_event(&event);
        }
    });

    // A front end posts the user's message before the group replies, unless
    // nobody could reply; the engine then forwards it itself.
    if let Some(input) = request.user_input().map(str::to_string) {
        if scenario.group.enabled_members().is_empty() {
            chat.set_input(input);
        } else {
            chat.push(ChatMessage::from_user(user_name, input));
        }
    }

    for cycle in 1..=options.cycles {
        println!("--- cycle {} ---", cycle);
        match runtime.sequencer.run(&scenario.group.id, request.clone()).await {
            Ok(RunOutcome::Completed(replies)) => {
                for reply in replies.iter().filter(|r| r.text.is_some()) {
                    println!(
                        "[{} returned] {}",
                        reply.character_id,
                        reply.text.as_deref().unwrap_or_default()
                    );
                }
            }
            Ok(outcome) => println!("cycle ended without replies: {:?}", outcome),
            Err(e) => println!("cycle failed: {}", e),
        }
        // Later cycles are follow-ups without fresh user input.
        request.input = None;
    }

    if let Some(duration) = options.auto_for {
        println!("--- auto mode for {:?} ---", duration);
        runtime.auto_mode.set_enabled(true);
        let auto_loop = runtime.spawn_auto_mode_loop();
        tokio::time::sleep(duration).await;
        runtime.shutdown().await;
        auto_loop.await.context("auto mode loop panicked")?;
    }

    drop(runtime);
    printer.await.context("event printer panicked")?;

    println!("--- transcript ---");
    for message in chat.snapshot().messages {
        println!("{}: {}", message.name, message.text);
    }
    let input = chat.input();
    if !input.is_empty() {
        println!("(input box) {}", input);
    }
    Ok(())
}

fn print_event(event: &GroupEvent) {
    match event {
        GroupEvent::TypingIndicator(Some(name)) => println!("* {} is typing...", name),
        GroupEvent::Warning(message) => println!("! {}", message),
        GroupEvent::UserMessageForwarded(text) => println!("> forwarded: {}", text),
        GroupEvent::AutoModeChanged(enabled) => {
            println!("* auto mode {}", if *enabled { "on" } else { "off" })
        }
        other => tracing::debug!("event: {:?}", other),
    }
}
