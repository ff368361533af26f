// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use lanegrid_app::{BUILT_IN_TABLES, CatalogError, TableDefinition, built_in, built_in_tables};
use lanegrid_device::SimulatedConfig;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONFIG_VERSION: i64 = 1;
const APP_NAME: &str = "lanegrid";
const CONFIG_PATH_ENV: &str = "LANEGRID_CONFIG_PATH";
const DEFAULT_LATENCY: &str = "1s";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub log: Log,
    #[serde(default, rename = "table")]
    pub tables: Vec<TableDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            device: Device::default(),
            ui: Ui::default(),
            log: Log::default(),
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub latency: Option<String>,
    pub failure_rate: Option<f64>,
    pub seed: Option<u64>,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            latency: Some(DEFAULT_LATENCY.to_owned()),
            failure_rate: Some(0.0),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    /// Tables to open, in tab order. Unset opens the built-ins followed by
    /// every `[[table]]`.
    pub tables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub path: Option<String>,
    pub filter: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` at the top",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(latency) = &self.device.latency {
            parse_duration(latency)
                .with_context(|| format!("device.latency in {}", path.display()))?;
        }

        if let Some(rate) = self.device.failure_rate
            && !(0.0..=1.0).contains(&rate)
        {
            bail!(
                "device.failure_rate in {} must be between 0 and 1, got {}",
                path.display(),
                rate
            );
        }

        if let Some(filter) = &self.log.filter {
            EnvFilter::try_new(filter).with_context(|| {
                format!("log.filter in {} is not a valid filter: {filter:?}", path.display())
            })?;
        }

        let mut names = BTreeSet::new();
        for table in &self.tables {
            if !names.insert(table.name.as_str()) {
                bail!(
                    "table {:?} is defined twice in {}",
                    table.name,
                    path.display()
                );
            }
            table
                .validate()
                .with_context(|| format!("invalid [[table]] in {}", path.display()))?;
        }

        self.tables()
            .with_context(|| format!("invalid ui.tables in {}", path.display()))?;
        Ok(())
    }

    pub fn device_config(&self) -> Result<SimulatedConfig> {
        Ok(SimulatedConfig {
            latency: parse_duration(self.device.latency.as_deref().unwrap_or(DEFAULT_LATENCY))?,
            failure_rate: self.device.failure_rate.unwrap_or(0.0),
            seed: self.device.seed,
        })
    }

    /// Resolves the tables to open. `[[table]]` entries shadow built-ins of
    /// the same name.
    pub fn tables(&self) -> Result<Vec<TableDefinition>, CatalogError> {
        let lookup = |name: &str| {
            self.tables
                .iter()
                .find(|table| table.name == name)
                .cloned()
                .or_else(|| built_in(name))
                .ok_or_else(|| CatalogError::UnknownTable(name.to_owned()))
        };

        match &self.ui.tables {
            Some(names) => names.iter().map(|name| lookup(name)).collect(),
            None => {
                let mut tables: Vec<_> = built_in_tables()
                    .into_iter()
                    .map(|table| lookup(&table.name))
                    .collect::<Result<_, _>>()?;
                tables.extend(
                    self.tables
                        .iter()
                        .filter(|table| !BUILT_IN_TABLES.contains(&table.name.as_str()))
                        .cloned(),
                );
                Ok(tables)
            }
        }
    }

    pub fn log_filter(&self) -> &str {
        self.log.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log.path {
            return Ok(PathBuf::from(path));
        }
        let data_root = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("cannot resolve data directory; set [log].path"))?;
        Ok(data_root.join(APP_NAME).join(format!("{APP_NAME}.log")))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# lanegrid config\n# Place this file at: {}\n\nversion = 1\n\n[device]\n# Simulated round-trip per lane call: <N>ms, <N>s or <N>m\nlatency = \"{}\"\n# Probability (0..1) that a lane call reports failure\nfailure_rate = 0.0\n# Optional. Fixed seed for reproducible values\n# seed = 42\n\n[ui]\n# Optional. Defaults to every built-in table, then every [[table]]\n# tables = [{}]\n\n[log]\n# Optional. Default is the platform data dir (for example ~/.local/share/lanegrid/lanegrid.log)\n# path = \"/absolute/path/to/lanegrid.log\"\nfilter = \"{}\"\n\n# Extra tables use the same shape as the built-ins:\n#\n# [[table]]\n# name = \"Receiver\"\n# entity = \"afe\"\n# direction = \"rx\"\n# lane_count = 1\n# stretch = true\n#\n# [[table.columns]]\n# key = \"lane0\"\n# kind = \"checkbox\"\n# editable = true\n#\n# [[table.columns]]\n# key = \"Operation\"\n# kind = \"buttons\"\n",
            path.display(),
            DEFAULT_LATENCY,
            BUILT_IN_TABLES
                .iter()
                .map(|name| format!("\"{name}\""))
                .collect::<Vec<_>>()
                .join(", "),
            DEFAULT_LOG_FILTER,
        )
    }
}

pub fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 1s)")
}

#[cfg(test)]
mod tests {
    use super::{CONFIG_PATH_ENV, Config, parse_duration};
    use anyhow::Result;
    use lanegrid_app::{ColumnKind, Direction, Entity};
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn table_names(config: &Config) -> Result<Vec<String>> {
        Ok(config
            .tables()?
            .into_iter()
            .map(|table| table.name)
            .collect())
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.device_config()?.latency, Duration::from_secs(1));
        assert_eq!(table_names(&config)?, vec!["TableOne", "Driver", "TableThree"]);
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[device]\nlatency = \"1s\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        assert!(error.to_string().contains("version = 1"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn device_section_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[device]\nlatency = \"250ms\"\nfailure_rate = 0.25\nseed = 7\n",
        )?;
        let device = Config::load(&path)?.device_config()?;
        assert_eq!(device.latency, Duration::from_millis(250));
        assert_eq!(device.failure_rate, 0.25);
        assert_eq!(device.seed, Some(7));
        Ok(())
    }

    #[test]
    fn failure_rate_out_of_range_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[device]\nfailure_rate = 1.5\n")?;
        let error = Config::load(&path).expect_err("rate above one should fail");
        assert!(error.to_string().contains("between 0 and 1"));
        Ok(())
    }

    #[test]
    fn bad_latency_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[device]\nlatency = \"soon\"\n")?;
        let error = Config::load(&path).expect_err("bad latency should fail");
        assert!(format!("{error:#}").contains("invalid duration"));
        Ok(())
    }

    #[test]
    fn bad_log_filter_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[log]\nfilter = \"lanegrid=loud\"\n")?;
        let error = Config::load(&path).expect_err("bad filter should fail");
        assert!(error.to_string().contains("log.filter"));
        Ok(())
    }

    #[test]
    fn ui_tables_select_and_order_tabs() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[ui]\ntables = [\"TableThree\", \"TableOne\"]\n")?;
        let config = Config::load(&path)?;
        assert_eq!(table_names(&config)?, vec!["TableThree", "TableOne"]);
        Ok(())
    }

    #[test]
    fn unknown_ui_table_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[ui]\ntables = [\"Nope\"]\n")?;
        let error = Config::load(&path).expect_err("unknown table should fail");
        assert!(format!("{error:#}").contains("unknown table \"Nope\""));
        Ok(())
    }

    #[test]
    fn custom_table_is_appended_after_built_ins() -> Result<()> {
        let (_temp, path) = write_config(
            r#"version = 1

[[table]]
name = "Receiver"
entity = "afe"
direction = "rx"
lane_count = 1
stretch = true

[[table.columns]]
key = "lane0"
kind = "checkbox"
editable = true

[[table.columns]]
key = "Operation"
kind = "buttons"
"#,
        )?;
        let config = Config::load(&path)?;
        let tables = config.tables()?;
        assert_eq!(tables.len(), 4);
        let receiver = &tables[3];
        assert_eq!(receiver.name, "Receiver");
        assert_eq!(receiver.entity, Entity::Afe);
        assert_eq!(receiver.direction, Some(Direction::Rx));
        assert_eq!(receiver.columns[1].kind, ColumnKind::ActionButtons);
        Ok(())
    }

    #[test]
    fn custom_table_without_direction_is_rejected() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[[table]]\nname = \"Receiver\"\nentity = \"afe\"\nlane_count = 1\n[[table.columns]]\nkey = \"Operation\"\nkind = \"buttons\"\n",
        )?;
        let error = Config::load(&path).expect_err("afe table without direction should fail");
        assert!(format!("{error:#}").contains("needs a direction"));
        Ok(())
    }

    #[test]
    fn duplicate_custom_tables_are_rejected() -> Result<()> {
        let table = "[[table]]\nname = \"Extra\"\nentity = \"driver\"\nlane_count = 1\n[[table.columns]]\nkey = \"Operation\"\nkind = \"buttons\"\n";
        let (_temp, path) = write_config(&format!("version = 1\n{table}{table}"))?;
        let error = Config::load(&path).expect_err("duplicate table should fail");
        assert!(error.to_string().contains("defined twice"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn default_path_uses_config_toml_suffix_when_no_env_override() -> Result<()> {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        let path = Config::default_path()?;
        assert!(path.ends_with("lanegrid/config.toml"));
        Ok(())
    }

    #[test]
    fn log_path_prefers_config_value() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[log]\npath = \"/tmp/grid.log\"\n")?;
        let config = Config::load(&path)?;
        assert_eq!(config.log_path()?, PathBuf::from("/tmp/grid.log"));
        Ok(())
    }

    #[test]
    fn durations_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("0ms")?, Duration::ZERO);
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        assert!(parse_duration("oops").is_err());
        Ok(())
    }

    #[test]
    fn example_config_loads_cleanly() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        assert_eq!(table_names(&config)?.len(), 3);
        Ok(())
    }
}
