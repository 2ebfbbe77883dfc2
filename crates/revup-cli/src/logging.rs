use regex::Regex;
use std::io::Write;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

static REDACTIONS: OnceLock<Mutex<Vec<(String, String)>>> = OnceLock::new();

fn redactions() -> &'static Mutex<Vec<(String, String)>> {
  REDACTIONS.get_or_init(|| Mutex::new(Vec::new()))
}

fn url_userinfo() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"://(.*?)@").unwrap())
}

/// Register a secret so it never reaches the terminal. Redaction isn't
/// retroactive, so secrets must be registered as soon as they are known.
pub fn redact(needle: &str, replacement: &str) {
  if needle.is_empty() {
    // Redacting the empty string would riddle every message with markers
    return;
  }
  redactions().lock().unwrap().push((needle.to_string(), replacement.to_string()));
}

/// Writer that substitutes registered secrets and URL userinfo before
/// forwarding log lines to stderr.
pub struct RedactingWriter;

impl Write for RedactingWriter {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    let mut text = String::from_utf8_lossy(buf).into_owned();
    text = url_userinfo().replace_all(&text, "://<USERNAME>:<PASSWORD>@").into_owned();
    for (needle, replacement) in redactions().lock().unwrap().iter() {
      text = text.replace(needle, replacement);
    }
    std::io::stderr().write_all(text.as_bytes())?;
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    std::io::stderr().flush()
  }
}

#[derive(Clone, Default)]
pub struct MakeRedactingWriter;

impl<'a> MakeWriter<'a> for MakeRedactingWriter {
  type Writer = RedactingWriter;

  fn make_writer(&'a self) -> Self::Writer {
    RedactingWriter
  }
}

/// Initialize the global subscriber. Called once at startup, before any
/// command logic runs.
pub fn init(verbose: bool) {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_env("REVUP_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(MakeRedactingWriter)
    .with_target(false)
    .without_time()
    .init();
}
