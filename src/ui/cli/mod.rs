//! CLI - reedline-based REPL interface
//!
//! Console over the trace workbench with history and a prompt that shows
//! the selected trace list and session state.

use crate::app::{parse_command, AppCommand, Workbench};
use crate::debug::types::BreakpointType;
use crate::trace::TraceEvent;
use anyhow::Result;
use colored::Colorize;
use reedline::{Prompt, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal};
use std::borrow::Cow;

/// Custom prompt for the echotrace CLI
pub struct TracePrompt {
    /// Selected trace list
    trace: Option<u64>,
    /// Whether echo breakpoints are armed
    is_tracing: bool,
}

impl TracePrompt {
    pub fn new() -> Self {
        Self {
            trace: None,
            is_tracing: false,
        }
    }

    pub fn update(&mut self, bench: &Workbench) {
        self.trace = bench.selected().map(|t| t.id());
        self.is_tracing = bench.is_debugging();
    }
}

impl Default for TracePrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TracePrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        let status = if self.is_tracing { "trc" } else { "---" };
        match self.trace {
            Some(id) => Cow::Owned(format!("[{}:#{}]", status, id)),
            None => Cow::Owned(format!("[{}:-]", status)),
        }
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "(failed) ",
        };
        Cow::Owned(format!("(search: {}{}) ", prefix, history_search.term))
    }
}

/// Print the help message
fn print_help() {
    println!("{}", "echotrace CLI Commands".bold().cyan());
    println!("{}", "═".repeat(50).cyan());

    println!("\n{}", "Trace lists:".bold().yellow());
    println!("  {}      Create and select a list", "tn <name>".green());
    println!("  {}             List trace lists", "tl".green());
    println!("  {}        Select a list", "ts <id>".green());
    println!("  {}        Delete a list", "td <id>".green());
    println!("  {}             Show events of the selected list", "te".green());
    println!("  {}      Rename the selected list", "tr <name>".green());
    println!("  {}      Describe the selected list", "tc <text>".green());
    println!("  {}             Save the selected list", "tw".green());

    println!("\n{}", "Tracing:".bold().yellow());
    println!("  {}  Start tracing module offsets", "dte <addr>...".green());
    println!("  {}           Stop tracing", "dte-".green());
    println!("  {}       Hits per echo breakpoint", "hits <n>".green());
    println!("  {}  Report a hit from the target", "hit <addr> [tid]".green());

    println!("\n{}", "Debugging:".bold().yellow());
    println!("  {}      Set breakpoint", "db <addr>".green());
    println!("  {}     Delete breakpoint", "db- <addr>".green());
    println!("  {}            List breakpoints", "dbl".green());
    println!("  {}             Attach to the target", "da".green());
    println!("  {}             Detach from the target", "dd".green());

    println!("\n{}", "Other:".bold().yellow());
    println!("  {}            Show this help", "?".green());
    println!("  {}            Quit echotrace", "q".green());
}

fn print_event(index: usize, event: &TraceEvent) {
    println!(
        "  {:>4} {} {} {}",
        index.to_string().dimmed(),
        event.address().to_string().green(),
        format!("tid={}", event.thread_id()).yellow(),
        event.kind()
    );
    for register in event.registers() {
        let memory = register.memory();
        if memory.is_empty() {
            println!("         {:>4} = {:#018x}", register.name(), register.value());
        } else {
            println!(
                "         {:>4} = {:#018x}  [{}]",
                register.name(),
                register.value(),
                hex::encode(&memory).dimmed()
            );
        }
    }
}

/// Execute a parsed command, returns false when the REPL should exit
fn execute_command(bench: &mut Workbench, cmd: AppCommand) -> Result<bool> {
    match cmd {
        AppCommand::NewTrace(name) => {
            let trace = bench.create_trace(&name)?;
            println!("[*] Created trace list #{} {}", trace.id(), trace.name().bold());
        }
        AppCommand::ListTraces => {
            let selected = bench.selected().map(|t| t.id());
            for trace in bench.provider().traces() {
                let marker = if Some(trace.id()) == selected { "*" } else { " " };
                println!(
                    " {} #{:<3} {:<24} {:>5} events  {}",
                    marker.green(),
                    trace.id(),
                    trace.name(),
                    trace.event_count(),
                    trace.description().dimmed()
                );
            }
        }
        AppCommand::SelectTrace(id) => {
            let trace = bench.select_trace(id)?;
            println!("[*] Selected trace list #{} {}", trace.id(), trace.name());
        }
        AppCommand::DeleteTrace(id) => {
            bench.delete_trace(id)?;
            println!("[*] Deleted trace list #{}", id);
        }
        AppCommand::ShowEvents => match bench.selected() {
            Some(trace) => {
                println!("[*] {} ({} events)", trace.name().bold(), trace.event_count());
                for (index, event) in trace.events().iter().enumerate() {
                    print_event(index, event);
                }
            }
            None => println!("{} No trace list selected", "[!]".red()),
        },
        AppCommand::RenameTrace(name) => {
            bench.rename(&name)?;
            println!("[*] Renamed trace list to {}", name);
        }
        AppCommand::DescribeTrace(text) => {
            bench.describe(&text)?;
            println!("[*] Description updated");
        }
        AppCommand::SaveTrace => {
            let count = bench.save()?;
            println!("[*] Saved {} events", count);
        }
        AppCommand::StartTrace(offsets) => {
            let armed = bench.start_trace(&offsets)?;
            if armed == 0 {
                println!(
                    "{} No echo breakpoints armed, all addresses are blocked or the target is gone",
                    "[!]".yellow()
                );
            } else {
                println!("[*] Armed {} echo breakpoints ({} hits each)", armed, bench.max_hits);
            }
        }
        AppCommand::StopTrace => {
            let removed = bench.stop_trace();
            println!("[*] Stopped, removed {} echo breakpoints", removed.len());
        }
        AppCommand::MaxHits(n) => {
            bench.max_hits = n;
            println!("[*] Echo breakpoints fire {} times", n);
        }
        AppCommand::Hit { address, thread } => {
            bench.simulate_hit(address, thread)?;
        }
        AppCommand::BreakpointSet(addr) => {
            if bench.set_breakpoint(addr) {
                println!("[*] Breakpoint set at {}", bench.address(addr));
            } else {
                println!("[*] Breakpoint already set at {}", bench.address(addr));
            }
        }
        AppCommand::BreakpointDelete(addr) => {
            bench.delete_breakpoint(addr);
            println!("[*] Breakpoint deleted at {}", bench.address(addr));
        }
        AppCommand::ListBreakpoints => {
            let store = bench.debugger().breakpoints();
            for kind in [BreakpointType::Regular, BreakpointType::Step, BreakpointType::Echo] {
                for address in store.addresses(kind) {
                    println!("  {:<8} {}", kind.to_string().cyan(), address);
                }
            }
        }
        AppCommand::Attach => {
            bench.attach()?;
            println!("[*] Attached to target");
        }
        AppCommand::Detach => {
            bench.detach()?;
            println!("[*] Detached from target");
        }
        AppCommand::Help => print_help(),
        AppCommand::Quit => {
            println!("[*] Shutting down...");
            return Ok(false);
        }
        AppCommand::Unknown(input) => {
            println!("{} Unknown command: '{}'", "[!]".red(), input);
            println!("    Type '?' for help");
        }
    }

    for id in bench.status().take_finished() {
        println!("[*] Trace session on list #{} finished", id);
    }
    Ok(true)
}

/// Run the CLI REPL
pub fn run_cli(mut bench: Workbench) -> Result<()> {
    let mut line_editor = Reedline::create();
    let mut prompt = TracePrompt::new();

    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║  echotrace CLI - Type '?' for help, 'q' to quit              ║".cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝".cyan()
    );
    println!(
        "[*] Module {} with {} trace lists",
        bench.module().bold(),
        bench.provider().trace_count()
    );

    loop {
        prompt.update(&bench);
        let sig = line_editor.read_line(&prompt)?;
        match sig {
            Signal::Success(buffer) => {
                let input = buffer.trim();
                if input.is_empty() {
                    continue;
                }

                match execute_command(&mut bench, parse_command(input)) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("{} {:#}", "[!]".red(), e),
                }
            }
            Signal::CtrlD | Signal::CtrlC => {
                println!("\n[*] Interrupted");
                break;
            }
        }
    }

    let removed = bench.stop_trace();
    if !removed.is_empty() {
        log::info!("Removed {} echo breakpoints on exit", removed.len());
    }
    Ok(())
}
