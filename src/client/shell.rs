use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::Settings;

use super::display::{display_model_info, display_prediction};
use super::ApiClient;

fn print_help() {
    println!("\n{}", "phishscan shell".cyan().bold());
    println!("{}", "=".repeat(50).bright_cyan());
    println!("{}  - Classify the typed text", "<text>".green());
    println!("{}   - Show the loaded model", "model".green());
    println!("{}   - Clear the screen", "clear".green());
    println!("{}    - Show this help message", "help".green());
    println!("{} - Exit the shell", "exit, quit".green());
    println!();
}

/// Reads lines and classifies each one against the configured server.
pub async fn shell_loop(settings: &Settings) -> Result<()> {
    let server_url = settings.server.base_url();
    let client = ApiClient::new(server_url.clone());
    let mut rl = DefaultEditor::new()?;

    println!("Connected to {}", server_url.bright_cyan());
    print_help();

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                match input.to_lowercase().as_str() {
                    "exit" | "quit" | "bye" => {
                        println!("Goodbye!");
                        break;
                    }
                    "help" => print_help(),
                    "clear" => print!("\x1b[2J\x1b[H"),
                    "model" => match client.model_info().await {
                        Ok(info) => display_model_info(&info),
                        Err(e) => println!("{} {}", "Error requesting model info:".red(), e),
                    },
                    _ => match client.classify(input).await {
                        Ok(prediction) => display_prediction(&prediction),
                        Err(e) => println!("{} {}", "Error:".red(), e),
                    },
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
