//! UI utilities for the CLI

use colored::*;
use crossterm::{
    event::{self, Event, KeyCode},
    terminal::{disable_raw_mode, enable_raw_mode, size},
};
use std::io::{self, IsTerminal, Write};

use hrag_core::{Degradation, QueryError, QueryOutcome, Result};

use crate::session::CheckReport;

const PROMPT: &str = "hrag>";

/// Display startup banner
pub fn display_banner() {
    let terminal_width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let banner_width = std::cmp::min(60, terminal_width.saturating_sub(4)).max(40);

    let top_border = format!("┌{}┐", "─".repeat(banner_width - 2));
    let bottom_border = format!("└{}┘", "─".repeat(banner_width - 2));
    let empty_line = format!("│{}│", " ".repeat(banner_width - 2));

    println!();
    println!("{}", top_border.blue());
    println!("{}", empty_line.blue());

    let title = "hrag - hospital information assistant";
    println!(
        "{}{}{}{}",
        "│  ".blue(),
        title.blue().bold(),
        " ".repeat(banner_width.saturating_sub(title.chars().count() + 4)),
        "│".blue()
    );
    println!("{}", empty_line.blue());

    let feature_lines = [
        "Answers come only from indexed documents.",
        "Dense + lexical search, fused by rank.",
        "",
        "Arrow keys browse history, Esc clears.",
    ];

    for line in feature_lines {
        if line.is_empty() {
            println!("{}", empty_line.blue());
        } else {
            let padding = " ".repeat(banner_width.saturating_sub(line.chars().count() + 4));
            println!("{}", format!("│  {}{}│", line, padding).blue());
        }
    }

    println!("{}", empty_line.blue());
    println!("{}", bottom_border.blue());
    println!();
    println!("{}", "Tip: ask a question, or type 'help' for commands".dimmed());
    println!();
}

/// Rewrite the prompt line, blanking `erase` trailing columns.
fn redraw(input: &str, erase: usize) -> io::Result<()> {
    print!(
        "\r{} {}{}\r{} {}",
        PROMPT.green().bold(),
        input,
        " ".repeat(erase),
        PROMPT.green().bold(),
        input
    );
    io::stdout().flush()
}

/// Read one line, with ↑/↓ history navigation when attached to a terminal
pub async fn handle_input_with_history(history: &mut Vec<String>) -> Result<Option<String>> {
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let input = input.trim().to_string();
        if !input.is_empty() {
            history.push(input.clone());
        }
        return Ok(Some(input));
    }

    enable_raw_mode()?;
    let result = read_raw_line(history);
    disable_raw_mode()?;
    println!();
    result
}

fn read_raw_line(history: &mut Vec<String>) -> Result<Option<String>> {
    let mut input = String::new();
    let mut history_index: Option<usize> = None;

    print!("{} ", PROMPT.green().bold());
    io::stdout().flush()?;

    loop {
        if let Event::Key(key_event) = event::read()? {
            match key_event.code {
                KeyCode::Enter => {
                    let line = input.trim().to_string();
                    if !line.is_empty() {
                        history.push(line.clone());
                    }
                    return Ok(Some(line));
                }
                KeyCode::Char(c) => {
                    input.push(c);
                    redraw(&input, 0)?;
                }
                KeyCode::Backspace => {
                    if input.pop().is_some() {
                        redraw(&input, 1)?;
                    }
                }
                KeyCode::Up => {
                    if !history.is_empty() {
                        let new_index = match history_index {
                            None => history.len() - 1,
                            Some(idx) => idx.saturating_sub(1),
                        };
                        history_index = Some(new_index);
                        let previous = input.chars().count();
                        input = history[new_index].clone();
                        redraw(&input, previous)?;
                    }
                }
                KeyCode::Down => {
                    if let Some(idx) = history_index {
                        let previous = input.chars().count();
                        if idx + 1 < history.len() {
                            history_index = Some(idx + 1);
                            input = history[idx + 1].clone();
                        } else {
                            history_index = None;
                            input.clear();
                        }
                        redraw(&input, previous)?;
                    }
                }
                KeyCode::Esc => {
                    return Ok(Some(String::new()));
                }
                _ => {}
            }
        }
    }
}

/// Display help message
pub fn print_help() {
    println!("{}", "Available commands:".bold());
    println!("  {} - Ask about the hospital's services, timings or departments", "<question>".green());
    println!("  {} - Toggle printing of source chunks", "sources".green());
    println!("  {} - Show this help message", "help".green());
    println!("  {} - Exit the application", "exit/quit".green());
    println!();
    println!("{}", "Examples:".bold());
    println!("  What are the OPD timings?");
    println!("  Is the pharmacy open on Sundays?");
}

/// Print an answer, its sources and any degradations
pub fn render_outcome(outcome: &QueryOutcome, show_sources: bool) {
    println!("{} {}", "→".green(), outcome.response.answer.bold());

    if show_sources && !outcome.response.sources.is_empty() {
        println!();
        println!("{}", "Sources:".bold());
        for (i, source) in outcome.response.sources.iter().enumerate() {
            println!("  {} {}", format!("[{}]", i + 1).cyan(), format!("#{}", source.id).dimmed());
            for line in source.text.lines().filter(|l| !l.trim().is_empty()) {
                println!("      {}", line.trim());
            }
        }
    }

    for degradation in &outcome.degradations {
        println!("{} {}", "⚠️".yellow(), describe_degradation(degradation).yellow());
    }
}

/// Human-readable note for a degraded answer
pub fn describe_degradation(degradation: &Degradation) -> String {
    match degradation {
        Degradation::SparseUnavailable { reason } => {
            format!("keyword search unavailable, used semantic search only ({})", reason)
        }
        Degradation::NoContext => "no matching documents found".to_string(),
        Degradation::GenerationFailed { reason } => {
            format!("answer generation failed ({})", reason)
        }
    }
}

pub fn render_error(error: &QueryError) {
    match error {
        QueryError::InvalidInput(_) => println!("{} {}", "❓".yellow(), error),
        QueryError::Retrieval(_) => println!("{} {}", "❌".red(), error),
    }
}

/// Print the result of a connectivity and schema check
pub fn render_check(report: &CheckReport) {
    let mark = |ok: bool| if ok { "✅".green() } else { "❌".red() };

    println!("{} Qdrant reachable", mark(report.reachable));
    if let Some(info) = &report.collection {
        let points = info
            .points_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("{} Collection '{}' ({} points)", mark(true), info.name, points);
        println!("{} Dense vector declared", mark(info.has_dense_vector));
        println!("{} Sparse vector declared", mark(info.has_sparse_vector));
    }
    if let Some(error) = &report.error {
        println!("  {}", error.red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degradation_descriptions() {
        assert_eq!(
            describe_degradation(&Degradation::NoContext),
            "no matching documents found"
        );
        assert!(describe_degradation(&Degradation::SparseUnavailable {
            reason: "timeout".to_string()
        })
        .contains("timeout"));
    }
}
