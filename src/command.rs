use std::io::Write as _;
use std::process::{Command, Stdio};

use anyhow::Context as _;

/// Runs an external generator: the prompt goes to stdin, the text comes back
/// on stdout.
pub fn exec(
    program: &str,
    args: &[String],
    model: &str,
    prompt: &str,
    min_words: usize,
) -> anyhow::Result<String> {
    tracing::debug!(command = program, model = model, "command generate");

    let mut child = Command::new(program)
        .args(args)
        .env("PLOTFORGE_MODEL", model)
        .env("PLOTFORGE_MIN_WORDS", min_words.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("spawn generator command: {program}"))?;

    {
        let mut stdin = child.stdin.take().context("open generator stdin")?;
        match stdin.write_all(prompt.as_bytes()) {
            Ok(()) => {}
            // The generator may ignore its input entirely.
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
            Err(err) => return Err(err).context("write generator stdin"),
        }
    }

    let output = child.wait_with_output().context("wait generator process")?;
    if !output.status.success() {
        anyhow::bail!("generator command failed: {program} ({})", output.status);
    }

    String::from_utf8(output.stdout).context("generator stdout is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_pipes_prompt_through_command() -> anyhow::Result<()> {
        let args = vec!["-c".to_owned(), "tr a-z A-Z".to_owned()];
        let out = exec("sh", &args, "stub", "the city burned", 10)?;
        assert_eq!(out, "THE CITY BURNED");
        Ok(())
    }

    #[test]
    fn exec_exports_model_to_child() -> anyhow::Result<()> {
        let args = vec![
            "-c".to_owned(),
            "cat >/dev/null; printf '%s %s' \"$PLOTFORGE_MODEL\" \"$PLOTFORGE_MIN_WORDS\""
                .to_owned(),
        ];
        assert_eq!(exec("sh", &args, "stub-model", "x", 500)?, "stub-model 500");
        Ok(())
    }

    #[test]
    fn exec_fails_on_nonzero_exit() {
        let args = vec!["-c".to_owned(), "cat >/dev/null; exit 3".to_owned()];
        assert!(exec("sh", &args, "stub", "x", 1).is_err());
    }
}
