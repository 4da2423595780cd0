use std::{
    collections::{HashMap, HashSet},
    fmt,
};

pub const SAAS_VAR: &str = "BACKFILL_SAAS";
pub const FEATURES_VAR: &str = "BACKFILL_FEATURES";

/// Snapshot of environment variables used to resolve job settings.
#[derive(Debug, Clone, Default)]
pub struct EnvContext {
    vars: HashMap<String, String>,
}

impl EnvContext {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.vars
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Adds variables that are not already set; process values win over `.env` files.
    pub fn merge_missing(&mut self, vars: HashMap<String, String>) {
        for (key, value) in vars {
            self.vars.entry(key).or_insert(value);
        }
    }

    /// Replaces `${VAR}` references; unknown variables are reported, not left in place.
    pub fn expand(&self, input: &str) -> Result<String, String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(format!("unterminated variable reference in '{input}'"));
            };
            let name = &after[..end];
            match self.vars.get(name) {
                Some(value) => out.push_str(value),
                None => return Err(name.to_string()),
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Deployment facts and feature flags a mutation step may depend on.
///
/// Steps receive an implementation at construction instead of reading globals.
pub trait Environment: Send + Sync + fmt::Debug {
    fn is_saas(&self) -> bool;
    fn feature_enabled(&self, name: &str) -> bool;
}

/// Environment resolved from `BACKFILL_SAAS` and the comma separated `BACKFILL_FEATURES`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnvironment {
    saas: bool,
    features: HashSet<String>,
}

impl ProcessEnvironment {
    pub fn from_context(ctx: &EnvContext) -> Self {
        let saas = ctx
            .get(SAAS_VAR)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let features = ctx
            .get(FEATURES_VAR)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self { saas, features }
    }
}

impl Environment for ProcessEnvironment {
    fn is_saas(&self) -> bool {
        self.saas
    }

    fn feature_enabled(&self, name: &str) -> bool {
        self.features.contains(name)
    }
}

/// Fixed environment for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    saas: bool,
    features: HashSet<String>,
}

impl StaticEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saas(mut self, saas: bool) -> Self {
        self.saas = saas;
        self
    }

    pub fn with_feature(mut self, name: &str) -> Self {
        self.features.insert(name.to_string());
        self
    }
}

impl Environment for StaticEnvironment {
    fn is_saas(&self) -> bool {
        self.saas
    }

    fn feature_enabled(&self, name: &str) -> bool {
        self.features.contains(name)
    }
}
