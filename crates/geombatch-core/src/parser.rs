//! `key=value` configuration file parsing.
//!
//! Each non-blank line is split on its first `=`. Blank lines are skipped and a
//! trailing `\r` is dropped; nothing else is trimmed, escaped or interpreted.
//! A line without `=` is rejected rather than producing an empty value.

use std::fs;
use std::path::Path;

use crate::error::{LaunchError, Result};
use crate::models::{ConfigEntry, GeomConfig};

/// Read and parse a configuration file.
pub fn load_config(path: &Path) -> Result<GeomConfig> {
    let content = fs::read_to_string(path).map_err(|source| LaunchError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(path, &content)
}

/// Parse configuration text. `source` is only used for error reporting and
/// recorded on the returned config.
pub fn parse_config_str(source: &Path, text: &str) -> Result<GeomConfig> {
    let mut entries = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => entries.push(ConfigEntry::new(key, value)),
            None => {
                return Err(LaunchError::ConfigParse {
                    path: source.to_path_buf(),
                    line: idx + 1,
                    content: line.to_string(),
                })
            }
        }
    }

    if entries.is_empty() {
        return Err(LaunchError::EmptyConfig {
            path: source.to_path_buf(),
        });
    }

    Ok(GeomConfig {
        source: source.to_path_buf(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(text: &str) -> Result<GeomConfig> {
        parse_config_str(Path::new("geom.conf"), text)
    }

    #[test]
    fn test_parse_pairs_in_order() {
        let cfg = parse("name=demo\nparam=5\n").unwrap();
        assert_eq!(cfg.keys(), vec!["name", "param"]);
        assert_eq!(cfg.values(), vec!["demo", "5"]);
        assert_eq!(cfg.tokens(), vec!["name:demo", "param:5"]);
        assert_eq!(cfg.source, PathBuf::from("geom.conf"));
    }

    #[test]
    fn test_n_lines_give_n_entries() {
        let text: String = (0..25).map(|i| format!("k{i}=v{i}\n")).collect();
        let cfg = parse(&text).unwrap();
        assert_eq!(cfg.entries.len(), 25);
        assert_eq!(cfg.tokens().len(), 25);
        assert_eq!(cfg.tokens()[24], "k24:v24");
    }

    #[test]
    fn test_split_on_first_equals_only() {
        let cfg = parse("geom_shift=0,0,1\nexpr=a=b=c").unwrap();
        assert_eq!(cfg.entries[1], ConfigEntry::new("expr", "a=b=c"));
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let cfg = parse("sim_folder=run1\r\n\r\n   \nscale_dimension=10\r\n").unwrap();
        assert_eq!(cfg.values(), vec!["run1", "10"]);
    }

    #[test]
    fn test_no_trimming_inside_pairs() {
        let cfg = parse(" key = value ").unwrap();
        assert_eq!(cfg.entries[0], ConfigEntry::new(" key ", " value "));
    }

    #[test]
    fn test_empty_value_is_allowed_when_equals_present() {
        let cfg = parse("implicit_mat=").unwrap();
        assert_eq!(cfg.entries[0], ConfigEntry::new("implicit_mat", ""));
        assert_eq!(cfg.tokens(), vec!["implicit_mat:"]);
    }

    #[test]
    fn test_malformed_line_fails_fast() {
        let err = parse("name=demo\nbare_min_geom\nparam=5").unwrap_err();
        match err {
            LaunchError::ConfigParse { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "bare_min_geom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(matches!(parse("\n\n"), Err(LaunchError::EmptyConfig { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/geom.conf")).unwrap_err();
        assert!(matches!(err, LaunchError::ConfigRead { .. }));
    }
}
