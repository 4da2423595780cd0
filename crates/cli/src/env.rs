use crate::error::CliError;
use engine_core::context::env::EnvContext;
use std::{collections::HashMap, fs, path::Path};

/// Process environment, topped up with a `.env` file when one is given.
///
/// Variables already set in the process win over the file.
pub fn load_env(env_file: Option<&str>) -> Result<EnvContext, CliError> {
    let mut env = EnvContext::from_process();
    if let Some(path) = env_file {
        env.merge_missing(read_env_file(path)?);
    }
    Ok(env)
}

pub fn read_env_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>, CliError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        CliError::EnvFile(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_env_content(&content)
}

fn parse_env_content(content: &str) -> Result<HashMap<String, String>, CliError> {
    let mut vars = HashMap::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            return Err(CliError::EnvFile(format!(
                "malformed line {} (expected KEY=VALUE)",
                line_num + 1
            )));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::EnvFile(format!("empty key at line {}", line_num + 1)));
        }
        vars.insert(key.to_string(), unquote_value(value));
    }

    Ok(vars)
}

fn unquote_value(value: &str) -> String {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
