//! Line-driven interactive session over a [`SearchQueryController`].
//!
//! ```text
//! /q <text>   commit a new query
//! n / p       next / previous page
//! page <N>    jump to page N
//! list / map  switch view mode (no refetch)
//! open <i>    show the full report for result i on this page
//! quit        leave
//! ```
//!
//! Any other non-empty line replaces the draft; `/q` with no text commits it.

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::backend::{BackendClient, Service};
use crate::config::Config;
use crate::models::ViewMode;
use crate::readiness::{wait_ready, ReadinessOrchestrator};
use crate::report;
use crate::search::{print_state, HttpSearchBackend, SearchQueryController};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query(Option<String>),
    Next,
    Previous,
    Page(u64),
    View(ViewMode),
    Open(usize),
    Draft(String),
    Quit,
    Help,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        let command = match head {
            "/q" => Command::Query((!rest.is_empty()).then(|| rest.to_string())),
            "n" | "next" => Command::Next,
            "p" | "prev" => Command::Previous,
            "page" => Command::Page(
                rest.parse()
                    .map_err(|_| format!("page expects a number, got '{}'", rest))?,
            ),
            "list" => Command::View(ViewMode::List),
            "map" => Command::View(ViewMode::Map),
            "open" => {
                let index: usize = rest
                    .parse()
                    .map_err(|_| format!("open expects a result number, got '{}'", rest))?;
                if index == 0 {
                    return Err("result numbers start at 1".to_string());
                }
                Command::Open(index)
            }
            "quit" | "exit" | "q" => Command::Quit,
            "help" | "?" => Command::Help,
            _ => Command::Draft(line.to_string()),
        };
        Ok(Some(command))
    }
}

const HELP: &str = "\
commands:
  /q <text>   search
  n, p        next / previous page
  page <N>    jump to page N
  list, map   switch view
  open <i>    full report for result i
  quit        leave";

/// CLI entry point for `corectl browse`.
pub async fn run_browse(config: &Config) -> Result<()> {
    let orchestrator = ReadinessOrchestrator::from_config(config)?;
    wait_ready(&orchestrator).await?;

    let controller = SearchQueryController::new(Arc::new(HttpSearchBackend::from_config(config)?));
    let reports = BackendClient::for_service(config, Service::Search)?;
    let interactive = atty::is(atty::Stream::Stdin);

    if interactive {
        println!("{}", HELP);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            print!("search> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let issued = match command {
            Command::Quit => break,
            Command::Help => {
                println!("{}", HELP);
                false
            }
            Command::Draft(text) => {
                controller.update_draft(text);
                false
            }
            Command::Query(text) => {
                if let Some(text) = text {
                    controller.update_draft(text);
                }
                match controller.commit() {
                    Ok(_) => true,
                    Err(e) => {
                        println!("{}", e);
                        false
                    }
                }
            }
            Command::Next => controller.next_page(),
            Command::Previous => controller.previous_page(),
            Command::Page(page) => {
                let issued = controller.set_page(page);
                if !issued {
                    let state = controller.snapshot();
                    println!(
                        "page {} unavailable (current {}, 1..={})",
                        page,
                        state.page,
                        state.total_pages()
                    );
                }
                issued
            }
            Command::View(mode) => {
                controller.set_view_mode(mode);
                print_state(&controller.snapshot());
                false
            }
            Command::Open(index) => {
                let state = controller.snapshot();
                let hash = state
                    .results
                    .as_ref()
                    .and_then(|r| r.records.get(index - 1))
                    .map(|r| r.hash.clone());
                match hash {
                    Some(hash) => match report::fetch_detail(&reports, &hash).await {
                        Ok(detail) => report::print_detail(&detail),
                        Err(e) => println!("An error occurred: {}", e),
                    },
                    None => println!("no result {} on this page", index),
                }
                false
            }
        };

        if issued {
            let state = controller.settled().await?;
            print_state(&state);
        }
    }

    controller.shutdown();
    Ok(())
}
