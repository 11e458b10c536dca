//! Interactive shell: command parsing and dispatch over one `AgentEngine`.

use std::future::Future;
use std::io::Write;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::agent_engine::artifacts::stamp;
use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::page_data;
use crate::agent_engine::recorder::MacroRecorder;
use crate::errors::{WebPilotError, WebPilotResult};

const DEFAULT_MONITOR_SECS: u64 = 30;
const HISTORY_SHOWN: usize = 15;

const HELP: &str = "\
Commands:
  help               show this list
  info | status      current page and catalog summary
  screenshot         save a screenshot of the page
  history            last actions of this session
  report             write a session report
  stats              session statistics
  captcha            try to clear a verification challenge or popup
  extract            extract page data (links, tables, contacts)
  record <name>      start recording executed actions as a macro
  stop               stop recording and save the macro
  replay <name>      run a saved macro again
  monitor [secs]     sample page performance (default 30s)
  exit | quit        leave (Ctrl-C at the prompt too)
Anything else is run as an objective.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Info,
    Screenshot,
    History,
    Report,
    Stats,
    Captcha,
    Extract,
    Record(String),
    Stop,
    Replay(String),
    Monitor(u64),
    Exit,
    Objective(String),
}

impl Command {
    /// `Ok(None)` for blank input.
    pub fn parse(line: &str) -> WebPilotResult<Option<Command>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or_default().to_lowercase();
        let rest: Vec<&str> = words.collect();

        let command = match (head.as_str(), rest.as_slice()) {
            ("help", []) => Command::Help,
            ("info" | "status", []) => Command::Info,
            ("screenshot", []) => Command::Screenshot,
            ("history", []) => Command::History,
            ("report", []) => Command::Report,
            ("stats", []) => Command::Stats,
            ("captcha", []) => Command::Captcha,
            ("extract", []) => Command::Extract,
            ("stop", []) | ("record", ["stop"]) => Command::Stop,
            ("record", []) => {
                return Err(WebPilotError::Objective("usage: record <name>".into()));
            }
            ("record", ["start", name]) | ("record", [name]) => Command::Record(name.to_string()),
            ("replay", []) => {
                return Err(WebPilotError::Objective("usage: replay <name>".into()));
            }
            ("replay", [name]) => Command::Replay(name.to_string()),
            ("monitor", []) => Command::Monitor(DEFAULT_MONITOR_SECS),
            ("monitor", [secs]) => match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => Command::Monitor(secs),
                _ => return Err(WebPilotError::Objective(format!("monitor: invalid duration '{secs}'"))),
            },
            ("exit" | "quit", []) => Command::Exit,
            _ => Command::Objective(line.to_string()),
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Run one command. Only a lost browser session is returned as `Err`; every
/// other failure is reported to `out` and the shell carries on.
pub async fn dispatch(engine: &mut AgentEngine, command: Command, out: &mut dyn Write) -> WebPilotResult<Flow> {
    match execute(engine, command, out).await {
        Ok(flow) => Ok(flow),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            writeln!(out, "error: {e}")?;
            Ok(Flow::Continue)
        }
    }
}

async fn execute(engine: &mut AgentEngine, command: Command, out: &mut dyn Write) -> WebPilotResult<Flow> {
    match command {
        Command::Help => writeln!(out, "{HELP}")?,
        Command::Exit => return Ok(Flow::Exit),

        Command::Info => {
            let driver = engine.driver();
            let url = driver.current_url().await?;
            let title = driver.title().await?;
            let ready = driver.ready_state().await?;
            let catalog = engine.scan().await?;
            let visible = catalog.elements.iter().filter(|e| e.visible).count();
            let clickable = catalog.elements.iter().filter(|e| e.clickable).count();
            let fields = catalog.elements.iter().filter(|e| e.form_field).count();
            let avg_confidence = if catalog.is_empty() {
                0.0
            } else {
                catalog.elements.iter().map(|e| e.confidence).sum::<f64>() / catalog.len() as f64
            };
            writeln!(out, "URL:         {url}")?;
            writeln!(out, "Title:       {title}")?;
            writeln!(out, "Ready state: {ready}")?;
            writeln!(out, "Oracle:      {}", engine.oracle_name())?;
            writeln!(
                out,
                "Elements:    {} ({visible} visible, {clickable} clickable, {fields} form fields, avg confidence {avg_confidence:.2})",
                catalog.len()
            )?;
        }

        Command::Screenshot => {
            let png = engine.driver().screenshot().await?;
            let path = engine.artifacts().save_screenshot("manual", &png)?;
            writeln!(out, "screenshot saved: {}", path.display())?;
        }

        Command::History => {
            let entries = engine.history().entries();
            if entries.is_empty() {
                writeln!(out, "no actions yet")?;
            }
            let skip = entries.len().saturating_sub(HISTORY_SHOWN);
            for (i, entry) in entries.iter().enumerate().skip(skip) {
                let mark = if entry.success { "ok " } else { "ERR" };
                writeln!(
                    out,
                    "{:>3}. [{mark}] {} {} ({}ms){}",
                    i + 1,
                    entry.timestamp.format("%H:%M:%S"),
                    entry.action_type,
                    entry.duration_ms,
                    entry.error.as_deref().map(|e| format!(" - {e}")).unwrap_or_default()
                )?;
            }
        }

        Command::Report => {
            let path = engine.session_report().write(engine.artifacts())?;
            writeln!(out, "report written: {}", path.display())?;
        }

        Command::Stats => {
            let report = engine.session_report();
            let entries = engine.history().entries();
            let avg_ms = if entries.is_empty() {
                0.0
            } else {
                entries.iter().map(|e| e.duration_ms as f64).sum::<f64>() / entries.len() as f64
            };
            let screenshots = entries.iter().filter(|e| e.artifact.is_some()).count();
            writeln!(out, "Session:      {}", report.session_id)?;
            writeln!(out, "Duration:     {:.1}s", report.duration_secs)?;
            writeln!(
                out,
                "Actions:      {} ({} ok, {} failed)",
                report.total_actions, report.successful_actions, report.failed_actions
            )?;
            writeln!(out, "Success rate: {:.1}%", report.success_rate)?;
            writeln!(out, "Screenshots:  {screenshots}")?;
            writeln!(out, "Avg action:   {avg_ms:.0}ms")?;
        }

        Command::Captcha => {
            let cleared = engine.obstruction().clear(engine.driver()).await?;
            if cleared {
                writeln!(out, "obstruction handled")?;
            } else {
                writeln!(out, "no challenge or popup found")?;
            }
        }

        Command::Extract => {
            let data = page_data::extract(engine.driver()).await?;
            let path = engine
                .artifacts()
                .write_json("extracts", &format!("extract_{}", stamp()), &data)?;
            writeln!(out, "Title:    {}", data.title)?;
            writeln!(out, "Headings: {}", data.headings.len())?;
            writeln!(out, "Links:    {}", data.link_count)?;
            writeln!(out, "Tables:   {}", data.table_count)?;
            writeln!(out, "Forms:    {}", data.form_count)?;
            writeln!(out, "Emails:   {}", data.emails.len())?;
            writeln!(out, "Phones:   {}", data.phones.len())?;
            writeln!(out, "saved: {}", path.display())?;
        }

        Command::Record(name) => {
            engine.recorder().start(&name)?;
            writeln!(out, "recording macro '{name}'")?;
        }

        Command::Stop => {
            let artifacts = engine.artifacts().clone();
            let (recorded, path) = engine.recorder().stop(&artifacts)?;
            writeln!(
                out,
                "macro '{}' saved with {} steps: {}",
                recorded.name,
                recorded.steps.len(),
                path.display()
            )?;
        }

        Command::Replay(name) => {
            let recorded = MacroRecorder::load(engine.artifacts(), &name)?;
            engine.interrupt_flag().store(false, Ordering::SeqCst);
            let results = engine.replay(&recorded).await?;
            let succeeded = results.iter().filter(|r| r.success).count();
            writeln!(
                out,
                "macro '{}' replayed: {succeeded}/{} steps succeeded",
                recorded.name,
                recorded.steps.len()
            )?;
        }

        Command::Monitor(secs) => {
            writeln!(out, "monitoring for {secs}s...")?;
            out.flush()?;
            let flag = engine.interrupt_flag();
            flag.store(false, Ordering::SeqCst);
            let summary = page_data::monitor(
                engine.driver(),
                Duration::from_secs(secs),
                Duration::from_secs(1),
                &flag,
            )
            .await?;
            writeln!(out, "Samples:       {}", summary.samples)?;
            writeln!(out, "Avg load:      {}", ms(summary.avg_load_ms))?;
            writeln!(out, "Avg DOM ready: {}", ms(summary.avg_dom_ready_ms))?;
            match summary.avg_heap_mb {
                Some(mb) => writeln!(out, "Avg JS heap:   {mb:.1} MB")?,
                None => writeln!(out, "Avg JS heap:   n/a")?,
            }
            writeln!(out, "Max resources: {}", summary.max_resources)?;
        }

        Command::Objective(objective) => {
            engine.interrupt_flag().store(false, Ordering::SeqCst);
            let outcome = engine.run_objective(&objective).await?;
            writeln!(out, "{} after {} steps", outcome.termination, outcome.steps)?;
            if let Some(path) = &outcome.report_path {
                writeln!(out, "report: {}", path.display())?;
            }
        }
    }
    Ok(Flow::Continue)
}

fn ms(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.0}ms")).unwrap_or_else(|| "n/a".into())
}

/// Read commands from stdin until `exit`, end of input, Ctrl-C at the prompt,
/// or a lost session.
pub async fn run_repl(engine: &mut AgentEngine) -> WebPilotResult<()> {
    let mut stdout = std::io::stdout();
    run_shell(engine, BufReader::new(tokio::io::stdin()), &mut stdout, ctrl_c).await
}

/// Resolves on the next Ctrl-C; never, when the handler cannot be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// The shell loop over any line source. `interrupted` is raced against each
/// prompt only, so an interrupt during a command stops that command and not
/// the shell. Every way out writes the session report.
pub async fn run_shell<R, F, Fut>(
    engine: &mut AgentEngine,
    input: R,
    out: &mut dyn Write,
    mut interrupted: F,
) -> WebPilotResult<()>
where
    R: AsyncBufRead + Unpin,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut lines = input.lines();
    writeln!(out, "webpilot ready (oracle: {}). Type 'help' for commands.", engine.oracle_name())?;

    let result: WebPilotResult<()> = loop {
        write!(out, "webpilot> ")?;
        out.flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line,
            () = interrupted() => {
                writeln!(out)?;
                tracing::warn!("interrupted at the prompt");
                break Ok(());
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e.into()),
        };
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "{e}")?;
                continue;
            }
        };
        match dispatch(engine, command, out).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    match engine.session_report().write(engine.artifacts()) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "final session report written");
            writeln!(out, "session report: {}", path.display())?;
        }
        Err(e) => tracing::warn!(error = %e, "could not write final session report"),
    }
    tracing::info!(session = %engine.history().session_id, "shell closed");
    result
}
