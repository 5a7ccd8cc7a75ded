//! Mock plugins for tests: small POSIX sh scripts speaking the line protocol

use crate::config::PluginConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Pulls the numeric request id out of `$line`
const READ_ID: &str = r#"id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')"#;

/// Pulls the raw params JSON out of `$line`
const READ_PARAMS: &str = r#"params=$(printf '%s\n' "$line" | sed -n 's/.*"params":\(.*\)}$/\1/p')"#;

/// Behaviors the mock plugin script can take on
#[derive(Debug, Clone, Copy)]
pub enum MockPlugin {
    /// Replies to every call with its params as the result
    Echo,
    /// Reads requests and never answers
    Silent,
    /// Answers every call with a JSON-RPC error
    Error,
    /// Exits immediately
    Crash,
    /// Emits a notification, then behaves like `Echo`
    Notify,
    /// Writes a garbage line before each echo reply
    MalformedThenEcho,
    /// Writes one line larger than the protocol limit
    HugeLine,
    /// Replies with the value of `$TETORA_TEST_VAR`
    EnvEcho,
    /// Replies to `tool/execute` with `tool output: <params>`
    Tool,
    /// Stays alive without ever reading stdin
    Deaf,
    /// Closes its stdin and stays alive
    ClosedStdin,
}

impl MockPlugin {
    fn script(self) -> String {
        let echo_reply = r#"printf '{"jsonrpc":"2.0","id":%s,"result":%s}\n' "$id" "${params:-null}""#;
        let body = match self {
            MockPlugin::Echo => loop_replying(echo_reply),
            MockPlugin::Silent => "while IFS= read -r line; do :; done\n".to_string(),
            MockPlugin::Error => loop_replying(
                r#"printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32000,"message":"plugin error"}}\n' "$id""#,
            ),
            MockPlugin::Crash => "exit 1\n".to_string(),
            MockPlugin::Notify => format!(
                "{}\n{}",
                r#"echo '{"jsonrpc":"2.0","method":"channel/message","params":{"channel":"test","from":"U1","text":"hello"}}'"#,
                loop_replying(echo_reply)
            ),
            MockPlugin::MalformedThenEcho => {
                loop_replying(&format!("echo 'this is not json'\n    {}", echo_reply))
            }
            MockPlugin::HugeLine => format!(
                "head -c {} /dev/zero | tr '\\0' 'a'\necho\nwhile IFS= read -r line; do :; done\n",
                super::protocol::MAX_LINE_BYTES + 4096
            ),
            MockPlugin::EnvEcho => loop_replying(
                r#"printf '{"jsonrpc":"2.0","id":%s,"result":"%s"}\n' "$id" "$TETORA_TEST_VAR""#,
            ),
            MockPlugin::Tool => loop_replying(
                r#"method=$(printf '%s\n' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
    if [ "$method" = "tool/execute" ]; then
      escaped=$(printf '%s' "$params" | sed 's/\\/\\\\/g; s/"/\\"/g')
      printf '{"jsonrpc":"2.0","id":%s,"result":"tool output: %s"}\n' "$id" "$escaped"
    else
      printf '{"jsonrpc":"2.0","id":%s,"result":{"status":"ok"}}\n' "$id"
    fi"#,
            ),
            MockPlugin::Deaf => "exec sleep 30\n".to_string(),
            MockPlugin::ClosedStdin => "exec 0<&-\nexec sleep 5\n".to_string(),
        };
        format!("#!/bin/sh\n{}", body)
    }
}

/// A read loop that runs `reply` for every request carrying an id
fn loop_replying(reply: &str) -> String {
    format!(
        "while IFS= read -r line; do\n  {}\n  {}\n  if [ -n \"$id\" ]; then\n    {}\n  fi\ndone\n",
        READ_ID, READ_PARAMS, reply
    )
}

/// Write the mock script into `dir` and return its path
pub fn mock_plugin(dir: &TempDir, mock: MockPlugin) -> PathBuf {
    let path = dir.path().join(format!("mock-{:?}.sh", mock).to_lowercase());
    std::fs::write(&path, mock.script()).unwrap();
    path
}

/// Config running the mock through `/bin/sh`, which sidesteps ETXTBSY when
/// tests spawn processes in parallel
pub fn mock_config(dir: &TempDir, mock: MockPlugin, plugin_type: &str, tools: &[&str]) -> PluginConfig {
    let script = mock_plugin(dir, mock);
    PluginConfig {
        args: vec![script.to_string_lossy().to_string()],
        ..plugin_config(Path::new("/bin/sh"), plugin_type, tools)
    }
}

pub fn plugin_config(command: &Path, plugin_type: &str, tools: &[&str]) -> PluginConfig {
    PluginConfig {
        plugin_type: plugin_type.to_string(),
        command: command.to_string_lossy().to_string(),
        tools: tools.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

/// Poll `cond` for up to five seconds
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}
