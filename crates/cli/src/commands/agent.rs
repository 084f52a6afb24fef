//! `codecrafter agent` — Interactive autonomous coding session.
//!
//! Wires the process-wide pieces together (provider handle, memory stores,
//! tool registry, session) and drives the console loop: print thinking and
//! tool results as the agent works, stop at the designated pause points,
//! and ask once before the very first action of each task.

use std::sync::Arc;

use codecrafter_agent::{AgentError, ContextRetriever, Session, SessionOptions, TurnOutcome};
use codecrafter_config::AppConfig;
use codecrafter_core::memory::{ConversationStore, PatternStore, ProjectStore};
use codecrafter_core::tool::DispatchOutcome;
use codecrafter_memory::{InMemoryStore, SqliteMemory};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub async fn run(model: Option<String>) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;
    if model.is_some() {
        config.default_model = model;
    }

    // --- Provider selection (fatal when nothing configures) ---
    let provider = match codecrafter_providers::select_provider(&config).await {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!();
            eprintln!("  ERROR: {e}");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    GEMINI_API_KEY, OPENAI_API_KEY, GROQ_API_KEY, OPENROUTER_API_KEY,");
            eprintln!("    DEEPSEEK_API_KEY, MISTRAL_API_KEY, XAI_API_KEY");
            eprintln!("  or run a local Ollama server.");
            eprintln!();
            eprintln!("  Keys can also go in: {}", AppConfig::config_dir().join("config.toml").display());
            eprintln!();
            anyhow::bail!("No usable model backend");
        }
    };

    // --- Memory (best-effort; failure degrades to a session-only buffer) ---
    let mut memory_enabled = config.memory.enabled;
    let (conversations, projects, patterns): (
        Arc<dyn ConversationStore>,
        Arc<dyn ProjectStore>,
        Arc<dyn PatternStore>,
    ) = if memory_enabled {
        let db_path = config.memory_database_path();
        match SqliteMemory::new(&db_path.to_string_lossy()).await {
            Ok(memory) => {
                let memory = Arc::new(memory);
                match memory.archive_older_than(config.memory.retention_days).await {
                    Ok(0) => {}
                    Ok(n) => println!("  Archived {n} stale conversation(s)"),
                    Err(e) => tracing::warn!("Retention pass failed: {e}"),
                }
                (memory.clone(), memory.clone(), memory)
            }
            Err(e) => {
                tracing::warn!("Persistent memory unavailable, using session memory: {e}");
                memory_enabled = false;
                let fallback = Arc::new(InMemoryStore::new());
                (fallback.clone(), fallback.clone(), fallback)
            }
        }
    } else {
        let fallback = Arc::new(InMemoryStore::new());
        (fallback.clone(), fallback.clone(), fallback)
    };

    // --- Workspace-confined tools ---
    let workspace_root = config.workspace_root();
    let project_name = workspace_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown_project".into());
    let registry = Arc::new(codecrafter_tools::default_registry(
        workspace_root.clone(),
        config.workspace.allowed_commands.clone(),
        config.workspace.command_timeout_secs,
    ));

    let retriever = ContextRetriever::new(
        conversations.clone(),
        projects,
        patterns,
        memory_enabled,
        project_name,
    );

    let mut session = Session::new(
        provider.clone(),
        registry.clone(),
        conversations,
        retriever,
        SessionOptions {
            model: None, // the provider already carries the configured model
            history_limit: config.memory.history_limit,
            memory_enabled,
            ..SessionOptions::default()
        },
    );

    // --- Banner ---
    println!();
    println!("  Welcome to codecrafter (autonomous edition)");
    println!();
    println!("  Provider:   {}", provider.name());
    println!("  Model:      {}", provider.default_model());
    println!("  Workspace:  {}", workspace_root.display());
    println!(
        "  Memory:     {}",
        if memory_enabled { "persistent" } else { "session-only" }
    );
    println!("  Tools:      {}", registry.names().join(", "));
    println!();
    println!("  Type your task and press Enter. 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print_prompt("You > ");
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Goodbye!");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            println!("\n  Goodbye!");
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            println!("  Goodbye!");
            break;
        }

        let first = session.submit(input).await;
        drive(&mut session, first, &mut lines).await;
    }

    Ok(())
}

/// Drive the autonomous loop until it reaches a pause point, rendering each
/// step along the way.
async fn drive(
    session: &mut Session,
    first: Result<TurnOutcome, AgentError>,
    lines: &mut Lines<BufReader<Stdin>>,
) {
    let mut next = first;
    loop {
        let outcome = match next {
            Ok(outcome) => outcome,
            Err(e) => {
                display_error(&e);
                return;
            }
        };

        match outcome {
            TurnOutcome::Pause { thinking } => {
                display_thinking(&thinking);
                println!("  Agent paused. What's the next step?");
                println!();
                return;
            }

            TurnOutcome::Question {
                thinking,
                question,
                options,
            } => {
                display_thinking(&thinking);
                println!("  Question: {question}");
                for (i, option) in options.iter().enumerate() {
                    println!("    {}. {option}", i + 1);
                }
                println!();
                return;
            }

            TurnOutcome::Completed { thinking, result } => {
                display_thinking(&thinking);
                println!("  Task complete: {result}");
                println!("  Ready for a new task.");
                println!();
                return;
            }

            TurnOutcome::ActionProposed {
                thinking,
                invocation,
            } => {
                display_thinking(&thinking);
                println!("  Proposed action: {}", invocation.name);
                for (key, value) in &invocation.parameters {
                    println!("    {key}: {}", preview(value));
                }
                print_prompt("  Run this action? [y/N] ");

                let approved = matches!(
                    lines.next_line().await,
                    Ok(Some(answer)) if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
                );

                if approved {
                    next = session.approve_pending().await;
                } else {
                    session.decline_pending();
                    println!("  Execution cancelled.");
                    println!();
                    return;
                }
            }

            TurnOutcome::Acted {
                thinking,
                invocation,
                outcome,
            } => {
                display_thinking(&thinking);
                match &outcome {
                    DispatchOutcome::Success(text) => {
                        println!("  [{}]", invocation.name);
                        for line in text.lines().take(20) {
                            println!("    {line}");
                        }
                        if text.lines().count() > 20 {
                            println!("    ...");
                        }
                    }
                    DispatchOutcome::Error(text) => {
                        println!("  [{} failed]", invocation.name);
                        for line in text.lines() {
                            println!("    {line}");
                        }
                    }
                }
                println!();
                next = session.step().await;
            }
        }
    }
}

fn display_thinking(thinking: &str) {
    if thinking.is_empty() {
        return;
    }
    for line in thinking.lines() {
        println!("  ~ {line}");
    }
}

fn display_error(error: &AgentError) {
    println!();
    println!("  [Error] {error}");
    println!("  This run has ended; you can start a new turn.");
    println!();
}

fn preview(value: &str) -> String {
    let flat = value.replace('\n', " ");
    if flat.chars().count() > 80 {
        let cut: String = flat.chars().take(80).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn print_prompt(prompt: &str) {
    use std::io::Write;
    print!("{prompt}");
    let _ = std::io::stdout().flush();
}
