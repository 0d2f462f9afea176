use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};

/// Hand `url` to an external opener. The export is never fetched here.
pub fn open_external(opener: &str, url: &str) -> Result<()> {
    let mut parts = opener.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("no opener configured");
    };
    Command::new(program)
        .args(parts)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("{program} not available"))?;
    Ok(())
}
