//! Argument parsing and the non-interactive commands.
//!
//! Every command opens the workspace, performs its change in memory, and
//! flushes before returning, so the store file is current when the process
//! exits. Command output goes to stdout; diagnostics go to the tracing
//! subscriber on stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use agent_notes_core::document::Document;
use agent_notes_core::error::{StoreError, ValidationError};
use agent_notes_core::format::format_thread;
use agent_notes_core::paths;
use agent_notes_core::store;
use agent_notes_core::types::{Position, Range, Thread};
use agent_notes_core::workspace::Workspace;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::watch;

pub const USAGE: &str = "\
usage: agent-notes [--root <dir>] <command> [args]

commands:
  list [--file <path>] [--json]      list threads, optionally for one file
  show <thread-id>                   print a thread as an agent-readable block
  add <path> <line>[-<end>] <body>   annotate lines (1-based, inclusive)
  reply <thread-id> <body>           append a reply to a thread
  resolve <thread-id>                remove a thread
  reanchor [<path>]                  relocate threads against files on disk
  check                              validate the store file without recovery
  watch                              track edits and store changes until interrupted

options:
  --root <dir>       workspace root (default: current directory)
  --author <name>    author for add and reply (default: from config)";

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),

    #[error("no thread with id {0}")]
    UnknownThread(String),

    #[error("{} is outside the workspace root", .0.display())]
    OutsideWorkspace(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to register SIGTERM handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CommandError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CommandError::Usage(_) => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }

    fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> CommandError {
        let path = path.into();
        move |source| CommandError::Io { path, source }
    }
}

/// Inclusive 1-based line span as typed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List { file: Option<PathBuf>, json: bool },
    Show { id: String },
    Add { file: PathBuf, lines: LineSpan, body: String, author: Option<String> },
    Reply { id: String, body: String, author: Option<String> },
    Resolve { id: String },
    Reanchor { file: Option<PathBuf> },
    Check,
    Watch,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub root: Option<PathBuf>,
    pub command: Command,
}

/// Parses the arguments after the program name.
///
/// # Errors
///
/// Returns [`CommandError::Usage`] for unknown commands or flags and for
/// missing or malformed values.
pub fn parse(args: &[String]) -> Result<Invocation, CommandError> {
    let mut index = 0usize;
    let mut root = None;

    while let Some(token) = args.get(index) {
        match token.as_str() {
            "--root" => {
                root = Some(PathBuf::from(take_value(args, index, "--root")?));
                index += 2;
            }
            "-h" | "--help" => {
                return Ok(Invocation { root, command: Command::Help });
            }
            _ => break,
        }
    }

    let Some(name) = args.get(index) else {
        return Ok(Invocation { root, command: Command::Help });
    };
    let rest = &args[index + 1..];

    let command = match name.as_str() {
        "list" => parse_list(rest)?,
        "show" => Command::Show { id: single(rest, "show", "<thread-id>")? },
        "resolve" => Command::Resolve { id: single(rest, "resolve", "<thread-id>")? },
        "add" => parse_add(rest)?,
        "reply" => parse_reply(rest)?,
        "reanchor" => match rest {
            [] => Command::Reanchor { file: None },
            [file] => Command::Reanchor { file: Some(PathBuf::from(file)) },
            _ => return Err(usage("reanchor takes at most one <path>")),
        },
        "check" => no_args(rest, "check", Command::Check)?,
        "watch" => no_args(rest, "watch", Command::Watch)?,
        "help" => Command::Help,
        unknown => return Err(usage(format!("unknown command '{unknown}'"))),
    };
    Ok(Invocation { root, command })
}

fn usage(message: impl Into<String>) -> CommandError {
    CommandError::Usage(message.into())
}

fn take_value(args: &[String], index: usize, flag: &str) -> Result<String, CommandError> {
    args.get(index + 1)
        .cloned()
        .ok_or_else(|| usage(format!("missing value for {flag}")))
}

fn single(rest: &[String], command: &str, what: &str) -> Result<String, CommandError> {
    match rest {
        [value] => Ok(value.clone()),
        _ => Err(usage(format!("{command} takes exactly one {what}"))),
    }
}

fn no_args(rest: &[String], command: &str, parsed: Command) -> Result<Command, CommandError> {
    if rest.is_empty() {
        Ok(parsed)
    } else {
        Err(usage(format!("{command} takes no arguments")))
    }
}

fn parse_list(rest: &[String]) -> Result<Command, CommandError> {
    let mut file = None;
    let mut json = false;
    let mut index = 0usize;
    while let Some(token) = rest.get(index) {
        match token.as_str() {
            "--json" => {
                json = true;
                index += 1;
            }
            "--file" => {
                file = Some(PathBuf::from(take_value(rest, index, "--file")?));
                index += 2;
            }
            unknown => return Err(usage(format!("unknown argument for list: '{unknown}'"))),
        }
    }
    Ok(Command::List { file, json })
}

/// Splits `--author <name>` out of `rest`, returning it and the positional args.
fn split_author(rest: &[String]) -> Result<(Option<String>, Vec<String>), CommandError> {
    let mut author = None;
    let mut positional = Vec::new();
    let mut index = 0usize;
    while let Some(token) = rest.get(index) {
        if token == "--author" {
            author = Some(take_value(rest, index, "--author")?);
            index += 2;
        } else {
            positional.push(token.clone());
            index += 1;
        }
    }
    Ok((author, positional))
}

fn parse_add(rest: &[String]) -> Result<Command, CommandError> {
    let (author, positional) = split_author(rest)?;
    let [file, lines, body @ ..] = positional.as_slice() else {
        return Err(usage("add needs <path> <line>[-<end>] <body>"));
    };
    let body = body.join(" ");
    if body.trim().is_empty() {
        return Err(usage("add needs a non-empty <body>"));
    }
    Ok(Command::Add {
        file: PathBuf::from(file),
        lines: parse_line_span(lines)?,
        body,
        author,
    })
}

fn parse_reply(rest: &[String]) -> Result<Command, CommandError> {
    let (author, positional) = split_author(rest)?;
    let [id, body @ ..] = positional.as_slice() else {
        return Err(usage("reply needs <thread-id> <body>"));
    };
    let body = body.join(" ");
    if body.trim().is_empty() {
        return Err(usage("reply needs a non-empty <body>"));
    }
    Ok(Command::Reply { id: id.clone(), body, author })
}

fn parse_line_span(raw: &str) -> Result<LineSpan, CommandError> {
    let number = |s: &str| -> Result<u32, CommandError> {
        match s.trim().parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Err(usage(format!("invalid line number '{s}' (lines start at 1)"))),
        }
    };
    let (start, end) = match raw.split_once('-') {
        Some((start, end)) => (number(start)?, number(end)?),
        None => {
            let line = number(raw)?;
            (line, line)
        }
    };
    if end < start {
        return Err(usage(format!("line span {raw} ends before it starts")));
    }
    Ok(LineSpan { start, end })
}

/// Runs one parsed command against the workspace at `root`.
///
/// # Errors
///
/// Returns a [`CommandError`] for unknown thread ids, paths outside the
/// workspace, unreadable files, invalid input and failed store writes.
pub async fn run(root: &Path, command: Command, config: &Config) -> Result<ExitCode, CommandError> {
    match command {
        Command::Help => {
            println!("{USAGE}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => check(root).await,
        Command::Watch => {
            watch::run(root, config).await?;
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let mut ws = Workspace::open(root, config.workspace_options()).await;
            let result = dispatch(&mut ws, command, config).await;
            ws.flush().await?;
            result.map(|()| ExitCode::SUCCESS)
        }
    }
}

async fn dispatch(ws: &mut Workspace, command: Command, config: &Config) -> Result<(), CommandError> {
    match command {
        Command::List { file, json } => {
            let threads = match file {
                Some(file) => ws.threads_for(&uri_for(ws.root(), &file)?),
                None => ws.snapshot().threads,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&threads)?);
            } else {
                for thread in &threads {
                    println!("{}", summary_line(thread));
                }
            }
        }
        Command::Show { id } => {
            let thread = ws.thread(&id).ok_or(CommandError::UnknownThread(id))?;
            println!("{}", format_thread(&thread));
        }
        Command::Add { file, lines, body, author } => {
            let uri = uri_for(ws.root(), &file)?;
            let path = ws.root().join(&uri);
            let text = tokio::fs::read_to_string(&path).await.map_err(CommandError::io(&path))?;
            let document = Document::new(&text);
            let range = line_span_range(&document, lines)?;
            let author = author.unwrap_or_else(|| config.author.clone());
            let thread = ws.annotate(&uri, &document, range, &body, &author)?;

            match paths::ensure_gitignored(ws.root()) {
                Ok(true) => eprintln!("added {} to .gitignore", paths::STORE_REL_PATH),
                Ok(false) => {}
                Err(err) => warn!(error = %err, "could not update .gitignore"),
            }
            println!("{}", thread.id);
        }
        Command::Reply { id, body, author } => {
            let author = author.unwrap_or_else(|| config.author.clone());
            let comment = ws.reply(&id, &body, &author)?.ok_or(CommandError::UnknownThread(id))?;
            println!("{}", comment.id);
        }
        Command::Resolve { id } => {
            if !ws.delete_thread(&id) {
                return Err(CommandError::UnknownThread(id));
            }
            println!("resolved {id}");
        }
        Command::Reanchor { file } => {
            let uris = match file {
                Some(file) => vec![uri_for(ws.root(), &file)?],
                None => ws.uris(),
            };
            for uri in uris {
                let path = ws.root().join(&uri);
                let text = match tokio::fs::read_to_string(&path).await {
                    Ok(text) => text,
                    // a deleted file orphans everything anchored to it
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
                    Err(err) => return Err(CommandError::io(&path)(err)),
                };
                let report = ws.reanchor_document(&uri, &text);
                for id in &report.reanchored {
                    println!("reanchored {id} ({uri})");
                }
                for id in &report.orphaned {
                    println!("orphaned {id} ({uri})");
                }
            }
        }
        Command::Check | Command::Watch | Command::Help => {}
    }
    Ok(())
}

async fn check(root: &Path) -> Result<ExitCode, CommandError> {
    let path = paths::store_path(root);
    match store::check(root).await {
        Ok(None) => {
            println!("no store at {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Ok(Some(store)) => {
            let orphaned = store.threads.iter().filter(|t| t.is_orphaned()).count();
            println!(
                "ok: {} threads ({orphaned} orphaned), last backup {}",
                store.threads.len(),
                store.last_backup.to_rfc3339()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("invalid: {err}");
            if let StoreError::Validation(validation) = &err {
                println!("field: {}", validation.field());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// One-line listing: id, location (1-based lines), orphan marker, first comment.
fn summary_line(thread: &Thread) -> String {
    let marker = if thread.is_orphaned() { " [orphaned]" } else { "" };
    let first = thread
        .comments
        .first()
        .map(|c| format!("{}: {}", c.author, c.body.lines().next().unwrap_or("")))
        .unwrap_or_default();
    format!(
        "{}  {}:{}-{}{marker}  {first}",
        thread.id,
        thread.uri,
        thread.range.start_line + 1,
        thread.range.end_line + 1,
    )
}

/// Workspace uri for a path given on the command line (relative to the cwd).
fn uri_for(root: &Path, file: &Path) -> Result<String, CommandError> {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(CommandError::io("."))?;
        cwd.join(file)
    };
    let absolute = std::fs::canonicalize(&absolute).unwrap_or(absolute);
    paths::relative_uri(root, &absolute).ok_or_else(|| CommandError::OutsideWorkspace(file.to_path_buf()))
}

/// Whole-line range covering `lines`, ending at the end of the last line.
fn line_span_range(document: &Document, lines: LineSpan) -> Result<Range, CommandError> {
    let line_count = u32::try_from(document.line_count()).unwrap_or(u32::MAX);
    if lines.end > line_count {
        return Err(usage(format!(
            "line {} is past the end of the file ({line_count} lines)",
            lines.end
        )));
    }
    let last = lines.end - 1;
    let last_len = document.line_text(last as usize).chars().count();
    Ok(Range::new(
        Position::new(lines.start - 1, 0),
        Position::new(last, u32::try_from(last_len).unwrap_or(u32::MAX)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_owned).collect()
    }

    #[test]
    fn no_arguments_prints_help() {
        assert_eq!(parse(&[]).unwrap().command, Command::Help);
        assert_eq!(parse(&args("--root /tmp")).unwrap().root, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn add_joins_body_and_parses_span() {
        let parsed = parse(&args("--root ws add src/a.rs 3-7 please handle errors --author ana")).unwrap();
        assert_eq!(parsed.root, Some(PathBuf::from("ws")));
        assert_eq!(
            parsed.command,
            Command::Add {
                file: PathBuf::from("src/a.rs"),
                lines: LineSpan { start: 3, end: 7 },
                body: "please handle errors".to_owned(),
                author: Some("ana".to_owned()),
            }
        );

        let single = parse(&args("add a.rs 4 why")).unwrap();
        assert!(matches!(single.command, Command::Add { lines: LineSpan { start: 4, end: 4 }, .. }));
    }

    #[test]
    fn rejects_bad_input() {
        for bad in [
            "frobnicate",
            "add a.rs 0 body",
            "add a.rs 5-2 body",
            "add a.rs 3",
            "show",
            "show a b",
            "check extra",
            "list --bogus",
            "--root",
            "reply id",
        ] {
            let err = parse(&args(bad)).unwrap_err();
            assert!(matches!(err, CommandError::Usage(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn list_flags() {
        let parsed = parse(&args("list --json --file src/a.rs")).unwrap();
        assert_eq!(
            parsed.command,
            Command::List { file: Some(PathBuf::from("src/a.rs")), json: true }
        );
    }

    #[tokio::test]
    async fn thread_lifecycle_through_commands() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/a.rs"), "fn a() {}\nfn b() {}\n").unwrap();
        let config = Config::default();

        let add = Command::Add {
            file: root.join("src/a.rs"),
            lines: LineSpan { start: 2, end: 2 },
            body: "rename b".to_owned(),
            author: Some("ana".to_owned()),
        };
        run(&root, add, &config).await.unwrap();

        let stored = store::load(&root).await;
        assert_eq!(stored.threads.len(), 1);
        let thread = stored.threads[0].clone();
        assert_eq!(thread.uri, "src/a.rs");
        assert_eq!(thread.selected_text, "fn b() {}");
        assert_eq!(thread.comments[0].author, "ana");
        let gitignore = std::fs::read_to_string(root.join(".gitignore")).unwrap();
        assert!(gitignore.contains(paths::STORE_REL_PATH));

        let reply = Command::Reply {
            id: thread.id.clone(),
            body: "done".to_owned(),
            author: None,
        };
        run(&root, reply, &config).await.unwrap();
        assert_eq!(store::load(&root).await.threads[0].comments.len(), 2);

        std::fs::remove_file(root.join("src/a.rs")).unwrap();
        run(&root, Command::Reanchor { file: None }, &config).await.unwrap();
        assert!(store::load(&root).await.threads[0].is_orphaned());

        run(&root, Command::Resolve { id: thread.id.clone() }, &config).await.unwrap();
        assert!(store::load(&root).await.threads.is_empty());

        let err = run(&root, Command::Resolve { id: thread.id }, &config).await.unwrap_err();
        assert!(matches!(err, CommandError::UnknownThread(_)));
    }

    #[test]
    fn span_covers_whole_lines() {
        let doc = Document::new("one\ntwo\nthree\n");
        let range = line_span_range(&doc, LineSpan { start: 2, end: 3 }).unwrap();
        assert_eq!(range, Range::new(Position::new(1, 0), Position::new(2, 5)));
        assert_eq!(doc.slice(&range), "two\nthree");
        assert!(line_span_range(&doc, LineSpan { start: 1, end: 9 }).is_err());
    }
}
