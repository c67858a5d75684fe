
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, OllamaConfig};
use crate::embeddings::ollama::OllamaClient;
use crate::embeddings::provider::FallbackMode;

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Quizsmith Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Leave a model name empty to use the built-in fallback for that capability.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;
    configure_fallback(&mut config)?;

    if config.ollama.embedding_configured() || config.ollama.generation_configured() {
        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        match test_ollama_connection(&config.ollama) {
            Ok(()) => {
                eprintln!("{}", style("✓ Ollama connection successful!").green());
            }
            Err(e) => {
                eprintln!(
                    "{} {:#}",
                    style("⚠ Warning: Ollama check failed:").yellow(),
                    e
                );
                eprintln!(
                    "Fallback embeddings and heuristic questions will be used until it is reachable."
                );
            }
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(describe_model(config.ollama.embedding_model.as_deref())).cyan()
    );
    eprintln!(
        "  Generation Model: {}",
        style(describe_model(config.ollama.generation_model.as_deref())).cyan()
    );
    eprintln!("  Timeout: {}s", style(config.ollama.timeout_seconds).cyan());

    eprintln!();
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Pipeline Settings:").bold().yellow());
    eprintln!(
        "  Chunk Budget: {} characters",
        style(config.chunking.max_chars).cyan()
    );
    eprintln!(
        "  Fallback Embedding: {} ({} dimensions, seed {})",
        style(config.embedding.fallback).cyan(),
        config.embedding.dimension,
        config.embedding.seed
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn describe_model(model: Option<&str>) -> &str {
    model.unwrap_or("not configured (fallback)")
}

fn load_existing_config() -> Result<Config> {
    Config::load_default().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model (empty for fallback)")
        .default(ollama.embedding_model.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Generation model (empty for heuristic questions)")
        .default(ollama.generation_model.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    let timeout_seconds: u64 = Input::new()
        .with_prompt("Request timeout in seconds")
        .default(ollama.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 600 seconds")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(Some(embedding_model));
    ollama.set_generation_model(Some(generation_model));
    ollama.set_timeout_seconds(timeout_seconds)?;

    Ok(())
}

fn configure_fallback(config: &mut Config) -> Result<()> {
    let modes = [FallbackMode::FixedSeed, FallbackMode::ContentHash];
    let labels: Vec<String> = modes.iter().map(ToString::to_string).collect();
    let default_index = modes
        .iter()
        .position(|&m| m == config.embedding.fallback)
        .unwrap_or(0);

    let selected = Select::new()
        .with_prompt("Fallback embedding mode")
        .default(default_index)
        .items(&labels)
        .interact()?;

    config.embedding.fallback = modes[selected];
    Ok(())
}

/// Reach the server and confirm every configured model is installed
fn test_ollama_connection(ollama: &OllamaConfig) -> Result<()> {
    OllamaClient::new(ollama)?
        .with_timeout(CONNECTION_TEST_TIMEOUT)
        .health_check()
}
