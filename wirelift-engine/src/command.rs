//! Command channel used for every OS side effect
//!
//! Platforms and DNS providers never spawn processes themselves. They go
//! through a [`CommandChannel`], which lets the privileged variant add an
//! elevation prefix and lets tests substitute a scripted channel.

pub mod mock;

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// Executes OS commands, optionally elevated
pub trait CommandChannel: Send + Sync {
    /// Run a command and capture its stdout lines, failing on a non-zero exit
    fn output(&self, args: &[&str]) -> Result<Vec<String>>;

    /// Run a command and return its exit status
    fn result(&self, args: &[&str]) -> Result<i32>;

    /// Run a command, failing on a non-zero exit
    fn run(&self, args: &[&str]) -> Result<()> {
        match self.result(args)? {
            0 => Ok(()),
            status => Err(Error::Command {
                command: args.join(" "),
                status,
                message: "command failed".into(),
            }),
        }
    }

    /// Run a command with extra environment, feeding every output line
    /// (stdout then stderr) to `on_line`, and return its exit status
    fn consume(
        &self,
        args: &[&str],
        env: &[(String, String)],
        on_line: &mut dyn FnMut(&str),
    ) -> Result<i32>;

    /// The elevated variant of this channel
    fn privileged(&self) -> &dyn CommandChannel;

    /// Run a structured operation inside this channel's trust boundary
    fn task(&self, task: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        task()
    }
}

/// Whether the process already runs with full privileges
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Command channel backed by `std::process::Command`
pub struct SystemCommands {
    prefix: Vec<String>,
    elevated: Option<Box<SystemCommands>>,
}

impl SystemCommands {
    /// Create a channel whose privileged variant prefixes `elevate`
    ///
    /// When already root, or when `elevate` is empty, the privileged variant
    /// is the channel itself.
    pub fn new(elevate: Vec<String>) -> Self {
        let elevated = if is_root() || elevate.is_empty() {
            None
        } else {
            Some(Box::new(SystemCommands {
                prefix: elevate,
                elevated: None,
            }))
        };
        Self {
            prefix: Vec::new(),
            elevated,
        }
    }

    fn command(&self, args: &[&str], env: &[(String, String)]) -> Result<Command> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| Error::Config("empty command".into()))?;

        let mut full: Vec<String> = self.prefix.clone();
        if !self.prefix.is_empty() && !env.is_empty() {
            // Elevation programs usually scrub the environment
            full.push("env".to_string());
            full.extend(env.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        full.push(program.to_string());
        full.extend(rest.iter().map(|a| a.to_string()));

        let mut cmd = Command::new(&full[0]);
        cmd.args(&full[1..]).stdin(Stdio::null());
        if self.prefix.is_empty() {
            cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        log::debug!("Running: {}", full.join(" "));
        Ok(cmd)
    }
}

impl CommandChannel for SystemCommands {
    fn output(&self, args: &[&str]) -> Result<Vec<String>> {
        let output = self.command(args, &[])?.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Command {
                command: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                message: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn result(&self, args: &[&str]) -> Result<i32> {
        let output = self.command(args, &[])?.output()?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !stderr.trim().is_empty() {
            log::debug!("{}: {}", args.join(" "), stderr.trim());
        }
        Ok(output.status.code().unwrap_or(-1))
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        self.output(args).map(|_| ())
    }

    fn consume(
        &self,
        args: &[&str],
        env: &[(String, String)],
        on_line: &mut dyn FnMut(&str),
    ) -> Result<i32> {
        let mut child = self
            .command(args, env)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        // Drain stdout fully so the child can exit, even if reading fails
        let mut read_error = None;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).split(b'\n') {
                match line {
                    Ok(bytes) => on_line(trim_cr(&String::from_utf8_lossy(&bytes))),
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                }
            }
        }

        let stderr = stderr_reader.and_then(|handle| handle.join().ok());
        let status = child.wait()?;

        if let Some(buf) = stderr {
            for line in String::from_utf8_lossy(&buf).lines() {
                on_line(line);
            }
        }
        if let Some(e) = read_error {
            return Err(e.into());
        }
        Ok(status.code().unwrap_or(-1))
    }

    fn privileged(&self) -> &dyn CommandChannel {
        match &self.elevated {
            Some(elevated) => elevated.as_ref(),
            None => self,
        }
    }
}

fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_output_lines() {
        let commands = SystemCommands::new(Vec::new());
        let lines = commands.output(&["printf", "a\\nb\\n"]).unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_failure_status() {
        let commands = SystemCommands::new(Vec::new());
        assert_eq!(commands.result(&["sh", "-c", "exit 3"]).unwrap(), 3);
        let err = commands.run(&["sh", "-c", "echo oops >&2; exit 2"]).unwrap_err();
        match err {
            Error::Command { status, message, .. } => {
                assert_eq!(status, 2);
                assert_eq!(message, "oops");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_consume_sees_env_and_both_streams() {
        let commands = SystemCommands::new(Vec::new());
        let mut lines = Vec::new();
        let status = commands
            .consume(
                &["sh", "-c", "echo $WL_TEST; echo err >&2; exit 1"],
                &[("WL_TEST".to_string(), "hello".to_string())],
                &mut |l: &str| lines.push(l.to_string()),
            )
            .unwrap();
        assert_eq!(status, 1);
        assert_eq!(lines, vec!["hello", "err"]);
    }

    #[test]
    fn test_consume_tolerates_invalid_utf8() {
        let commands = SystemCommands::new(Vec::new());
        let mut lines = Vec::new();
        let status = commands
            .consume(
                &["sh", "-c", "printf 'ok\\n\\377\\376\\nafter\\n'; printf '\\377\\n' >&2; exit 0"],
                &[],
                &mut |l: &str| lines.push(l.to_string()),
            )
            .unwrap();
        assert_eq!(status, 0);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "ok");
        assert_eq!(lines[1], "\u{FFFD}\u{FFFD}");
        assert_eq!(lines[2], "after");
        assert_eq!(lines[3], "\u{FFFD}");
    }

    #[test]
    fn test_no_elevation_means_self() {
        let commands = SystemCommands::new(Vec::new());
        let privileged = commands.privileged();
        assert_eq!(privileged.output(&["echo", "x"]).unwrap(), vec!["x"]);
    }
}
