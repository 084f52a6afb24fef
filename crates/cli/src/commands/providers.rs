//! `codecrafter providers` — Probe which model backends are configured.

use codecrafter_config::AppConfig;
use codecrafter_providers::{GeminiProvider, OllamaProvider, OpenAiCompatProvider, PRIORITY};

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    println!("Model backends (in selection priority order):");
    println!();

    for name in PRIORITY {
        let result = match name {
            "gemini" => GeminiProvider::configure(&config).map(|_| ()),
            "ollama" => OllamaProvider::configure(&config).await.map(|_| ()),
            family => OpenAiCompatProvider::configure(family, &config).map(|_| ()),
        };

        match result {
            Ok(()) => println!("  {name:<12} configured"),
            Err(e) => println!("  {name:<12} not configured ({e})"),
        }
    }

    println!();
    println!("Selection: preferred_provider from config (CODECRAFTER_PROVIDER overrides),");
    println!("otherwise the first configured backend above is used.");

    Ok(())
}
