//! Configuration commands.

use std::io::Write;
use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the effective configuration as TOML.
pub fn dump(config: &ClientConfig, source: &Path, out: &mut impl Write) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    writeln!(out, "# config.toml ({})", source.display())?;
    write!(out, "{}", toml_str)?;
    Ok(())
}

/// Show the configuration file path.
pub fn path(source: &Path, out: &mut impl Write) -> ClientResult<()> {
    let note = if source.exists() { "" } else { " (not found, using defaults)" };
    writeln!(out, "config: {}{}", source.display(), note)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_writes_header_and_toml() {
        let mut out = Vec::new();
        dump(&ClientConfig::default(), Path::new("/etc/synthlink.toml"), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("# config.toml (/etc/synthlink.toml)\n"));
        assert!(text.contains("endpoint = \"127.0.0.1:6142\""));
        assert!(text.contains("[client]"));
        assert!(text.contains("request_timeout_ms = 5000"));
    }

    #[test]
    fn path_notes_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");

        let mut out = Vec::new();
        path(&missing, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("not found"));

        std::fs::write(&missing, "").unwrap();
        let mut out = Vec::new();
        path(&missing, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("config: {}\n", missing.display())
        );
    }
}
