//! `codecrafter onboard` — First-time setup.

use codecrafter_config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("codecrafter — First-Time Setup");
    println!("==============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("  1. Set a model backend credential, e.g.:");
        println!("       export GEMINI_API_KEY=...      (or OPENAI_API_KEY, GROQ_API_KEY, ...)");
        println!("     or run a local Ollama server.");
        println!("  2. Optionally pin a backend:");
        println!("       export CODECRAFTER_PROVIDER=gemini");
        println!("  3. Start a session:");
        println!("       codecrafter agent\n");
    }

    Ok(())
}
