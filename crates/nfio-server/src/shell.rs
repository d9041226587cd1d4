//! Line-oriented shell over the NFV filesystem.
//!
//! Each line is one filesystem call against an [`NfEngine`] backed by the
//! in-process [`MemoryOrchestrator`]:
//!
//! ```text
//! ls [path]                 list a directory
//! cat <path>                read a file
//! write <path> <text>       replace a file's contents
//! append <path> <text>      write at the end of a file
//! mkdir <path>              instantiate / connect
//! rmdir <path>              destroy / disconnect
//! stat <path>               file or directory attributes
//! set-status <type> <name> <status>
//!                           change an instance's status out of band
//! help | quit
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use nfio_kernel::{MemoryOrchestrator, NfEngine, VfsOps};
use nfio_types::InstanceStatus;

use crate::constants::{READ_CHUNK, SHELL_PROMPT};

const HELP: &str = "\
commands:
  ls [path]                        list a directory
  cat <path>                       read a file
  write <path> <text>              replace a file's contents
  append <path> <text>             write at the end of a file
  mkdir <path>                     create an instance or a channel
  rmdir <path>                     destroy an instance or a channel
  stat <path>                      show file attributes
  set-status <type> <name> <s>     change an instance's status out of band
  help                             show this text
  quit                             leave the shell
";

enum Flow {
    Continue,
    Quit,
}

pub struct Shell {
    engine: NfEngine,
    orchestrator: Arc<MemoryOrchestrator>,
    interactive: bool,
}

impl Shell {
    pub fn new(engine: NfEngine, orchestrator: Arc<MemoryOrchestrator>) -> Self {
        Self {
            engine,
            orchestrator,
            interactive: true,
        }
    }

    /// Suppress the prompt, for scripted input.
    pub fn quiet(mut self) -> Self {
        self.interactive = false;
        self
    }

    /// Run until `quit` or end of input. Command failures are reported on
    /// `out` and do not stop the loop; I/O failures do.
    pub async fn run<R, W>(&self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        loop {
            if self.interactive {
                out.write_all(SHELL_PROMPT.as_bytes()).await?;
                out.flush().await?;
            }
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match self.execute(line).await {
                Ok((text, Flow::Continue)) => out.write_all(text.as_bytes()).await?,
                Ok((_, Flow::Quit)) => break,
                Err(e) => {
                    out.write_all(format!("error: {e:#}\n").as_bytes())
                        .await?
                }
            }
            out.flush().await?;
        }
        Ok(())
    }

    async fn execute(&self, line: &str) -> Result<(String, Flow)> {
        let (command, rest) = split_word(line);
        debug!(command, "shell command");

        let text = match command {
            "ls" => self.ls(rest).await?,
            "cat" => self.cat(required(rest, "cat <path>")?).await?,
            "write" => {
                let (path, text) = split_word(rest);
                let path = Path::new(required(path, "write <path> <text>")?);
                self.engine.write_all(path, &payload(text)).await?;
                String::new()
            }
            "append" => {
                let (path, text) = split_word(rest);
                let path = Path::new(required(path, "append <path> <text>")?);
                let size = self.engine.getattr(path).await?.size;
                self.engine.write(path, size, &payload(text)).await?;
                String::new()
            }
            "mkdir" => {
                self.engine
                    .mkdir(Path::new(required(rest, "mkdir <path>")?), 0o755)
                    .await?;
                String::new()
            }
            "rmdir" => {
                self.engine
                    .rmdir(Path::new(required(rest, "rmdir <path>")?))
                    .await?;
                String::new()
            }
            "stat" => {
                let attr = self
                    .engine
                    .getattr(Path::new(required(rest, "stat <path>")?))
                    .await?;
                let kind = if attr.is_dir() { "directory" } else { "file" };
                format!("{kind} size={} perm={:o}\n", attr.size, attr.perm)
            }
            "set-status" => self.set_status(rest)?,
            "help" => HELP.to_string(),
            "quit" | "exit" => return Ok((String::new(), Flow::Quit)),
            other => bail!("unknown command {other:?}, try help"),
        };
        Ok((text, Flow::Continue))
    }

    async fn ls(&self, path: &str) -> Result<String> {
        let listing = self.engine.list_directory(Path::new(path)).await?;
        let mut text = String::new();
        for warning in &listing.warnings {
            text.push_str(&format!("warning: {warning}\n"));
        }
        for entry in &listing.entries {
            let suffix = if entry.kind.is_dir() { "/" } else { "" };
            text.push_str(&format!("{}{suffix}\n", entry.name));
        }
        Ok(text)
    }

    async fn cat(&self, path: &str) -> Result<String> {
        let path = Path::new(path);
        let mut data = Vec::new();
        loop {
            let chunk = self
                .engine
                .read(path, data.len() as u64, READ_CHUNK)
                .await?;
            let done = chunk.len() < READ_CHUNK as usize;
            data.extend_from_slice(&chunk);
            if done {
                break;
            }
        }
        let mut text = String::from_utf8_lossy(&data).into_owned();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }

    fn set_status(&self, rest: &str) -> Result<String> {
        let mut words = rest.split_whitespace();
        let (Some(nf_type), Some(name), Some(status)) = (words.next(), words.next(), words.next())
        else {
            bail!("usage: set-status <type> <name> <status>");
        };
        let status = InstanceStatus::from_str(status)
            .with_context(|| format!("unknown status {status:?}"))?;
        if !self.orchestrator.set_status(nf_type, name, status) {
            bail!("no instance {nf_type}/{name}");
        }
        Ok(String::new())
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn required<'a>(arg: &'a str, usage: &str) -> Result<&'a str> {
    if arg.is_empty() {
        bail!("usage: {usage}");
    }
    Ok(arg)
}

fn payload(text: &str) -> Vec<u8> {
    format!("{text}\n").into_bytes()
}
