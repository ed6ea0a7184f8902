//! Scripted command channel for tests
//!
//! Responses are matched by command prefix; the longest matching prefix wins.
//! Unmatched commands succeed with no output. Every call is recorded.

use std::collections::HashMap;
use std::sync::Mutex;

use super::CommandChannel;
use crate::error::{Error, Result};

/// A canned response
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub status: i32,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn ok<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: 0,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fail<I, S>(status: i32, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Call {
    /// The command line joined with spaces
    pub fn line(&self) -> String {
        self.args.join(" ")
    }
}

/// Command channel that replays scripted replies
#[derive(Default)]
pub struct ScriptedCommands {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to any command starting with `prefix`
    pub fn reply(&self, prefix: &str, reply: Reply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert(prefix.to_string(), reply);
        }
    }

    /// Every call so far
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every call so far as joined command lines
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(Call::line).collect()
    }

    /// Whether any call started with `prefix`
    pub fn ran(&self, prefix: &str) -> bool {
        self.lines().iter().any(|l| l.starts_with(prefix))
    }

    fn record(&self, args: &[&str], env: &[(String, String)]) -> Reply {
        let line = args.join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                args: args.iter().map(|a| a.to_string()).collect(),
                env: env.to_vec(),
            });
        }
        self.replies
            .lock()
            .ok()
            .and_then(|replies| {
                replies
                    .iter()
                    .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
                    .max_by_key(|(prefix, _)| prefix.len())
                    .map(|(_, reply)| reply.clone())
            })
            .unwrap_or_default()
    }
}

impl CommandChannel for ScriptedCommands {
    fn output(&self, args: &[&str]) -> Result<Vec<String>> {
        let reply = self.record(args, &[]);
        if reply.status != 0 {
            return Err(Error::Command {
                command: args.join(" "),
                status: reply.status,
                message: reply.lines.join("\n"),
            });
        }
        Ok(reply.lines)
    }

    fn result(&self, args: &[&str]) -> Result<i32> {
        Ok(self.record(args, &[]).status)
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
        let reply = self.record(args, env);
        for line in &reply.lines {
            on_line(line);
        }
        Ok(reply.status)
    }

    fn privileged(&self) -> &dyn CommandChannel {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let commands = ScriptedCommands::new();
        commands.reply("wg show", Reply::ok(["all"]));
        commands.reply("wg show wg0", Reply::ok(["wg0 only"]));

        assert_eq!(commands.output(&["wg", "show", "wg0", "dump"]).unwrap(), vec!["wg0 only"]);
        assert_eq!(commands.output(&["wg", "show", "wg1"]).unwrap(), vec!["all"]);
        assert!(commands.output(&["ip", "link"]).unwrap().is_empty());
        assert_eq!(commands.calls().len(), 3);
    }

    #[test]
    fn test_failures() {
        let commands = ScriptedCommands::new();
        commands.reply("ip link add", Reply::fail(2, ["RTNETLINK answers: File exists"]));
        assert!(commands.run(&["ip", "link", "add", "wg0"]).is_err());
        assert_eq!(commands.result(&["ip", "link", "add", "wg0"]).unwrap(), 2);
        assert!(commands.ran("ip link add"));
    }
}
