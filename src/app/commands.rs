//! Command processing
//!
//! Console commands of the trace workbench. Addresses are offsets into the
//! main module of the target.

/// Application commands that can be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Create and select a trace list: tn <name>
    NewTrace(String),
    /// List trace lists: tl
    ListTraces,
    /// Select a trace list: ts <id>
    SelectTrace(u64),
    /// Delete a trace list: td <id>
    DeleteTrace(u64),
    /// Show the events of the selected list: te
    ShowEvents,
    /// Rename the selected list: tr <name>
    RenameTrace(String),
    /// Describe the selected list: tc <text>
    DescribeTrace(String),
    /// Persist the selected list: tw
    SaveTrace,
    /// Start tracing offsets: dte <addr>...
    StartTrace(Vec<u64>),
    /// Stop tracing: dte-
    StopTrace,
    /// Hits per echo breakpoint: hits <n>
    MaxHits(u32),
    /// Report an echo breakpoint hit: hit <addr> [thread]
    Hit { address: u64, thread: u64 },
    /// Set breakpoint: db <addr>
    BreakpointSet(u64),
    /// Delete breakpoint: db- <addr>
    BreakpointDelete(u64),
    /// List breakpoints: dbl
    ListBreakpoints,
    /// Attach to the target: da
    Attach,
    /// Detach from the target: dd
    Detach,
    /// Show help
    Help,
    /// Quit application
    Quit,
    /// Unknown command
    Unknown(String),
}

/// Parse a command string into AppCommand
pub fn parse_command(input: &str) -> AppCommand {
    let input = input.trim();
    let mut parts = input.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let invalid = |reason: &str| AppCommand::Unknown(format!("{}: {}", input, reason));

    match cmd {
        "tn" => match arg {
            Some(name) => AppCommand::NewTrace(name.to_string()),
            None => invalid("missing trace name"),
        },
        "tl" => AppCommand::ListTraces,
        "ts" => match arg.and_then(|s| s.parse().ok()) {
            Some(id) => AppCommand::SelectTrace(id),
            None => invalid("expected a trace id"),
        },
        "td" => match arg.and_then(|s| s.parse().ok()) {
            Some(id) => AppCommand::DeleteTrace(id),
            None => invalid("expected a trace id"),
        },
        "te" => AppCommand::ShowEvents,
        "tr" => match arg {
            Some(name) => AppCommand::RenameTrace(name.to_string()),
            None => invalid("missing trace name"),
        },
        "tc" => AppCommand::DescribeTrace(arg.unwrap_or("").to_string()),
        "tw" => AppCommand::SaveTrace,
        "dte" => {
            let Some(arg) = arg else {
                return invalid("expected at least one address");
            };
            let addresses: Result<Vec<u64>, _> = arg.split_whitespace().map(parse_address).collect();
            match addresses {
                Ok(addresses) => AppCommand::StartTrace(addresses),
                Err(_) => invalid("invalid address"),
            }
        }
        "dte-" => AppCommand::StopTrace,
        "hits" => match arg.and_then(|s| s.parse().ok()).filter(|&n: &u32| n > 0) {
            Some(n) => AppCommand::MaxHits(n),
            None => invalid("expected a positive hit count"),
        },
        "hit" => {
            let mut words = arg.unwrap_or("").split_whitespace();
            let address = words.next().map(parse_address);
            let thread = words.next().map(str::parse::<u64>).unwrap_or(Ok(1));
            match (address, thread) {
                (Some(Ok(address)), Ok(thread)) => AppCommand::Hit { address, thread },
                _ => invalid("expected an address and an optional thread id"),
            }
        }
        "db" => match arg.map(parse_address) {
            Some(Ok(addr)) => AppCommand::BreakpointSet(addr),
            _ => invalid("invalid address"),
        },
        "db-" => match arg.map(parse_address) {
            Some(Ok(addr)) => AppCommand::BreakpointDelete(addr),
            _ => invalid("invalid address"),
        },
        "dbl" => AppCommand::ListBreakpoints,
        "da" | "attach" => AppCommand::Attach,
        "dd" | "detach" => AppCommand::Detach,
        "?" | "help" => AppCommand::Help,
        "q" | "quit" | "exit" => AppCommand::Quit,
        _ => AppCommand::Unknown(input.to_string()),
    }
}

/// Parse an address string (supports 0x prefix and decimal)
pub fn parse_address(s: &str) -> Result<u64, std::num::ParseIntError> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}
