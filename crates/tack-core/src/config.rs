use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::datetime::{
  DEFAULT_TIMEZONE,
  parse_timezone
};
use crate::model::Status;

const CONFIG_FILE: &str = "tack.toml";
const CONFIG_DIR: &str = "tack";
const CONFIG_ENV_VAR: &str =
  "TACK_CONFIG";
const TIMEZONE_ENV_VAR: &str =
  "TACK_TIMEZONE";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
  timezone:      Option<String>,
  reopen_status: Option<String>,
  data_dir:      Option<String>
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Calendar used for weekdays, day buckets and wall-clock arithmetic.
  pub timezone:      Tz,
  /// Status a completed task returns to when reopened without one.
  pub reopen_status: Status,
  pub data_dir:      Option<PathBuf>,
  pub loaded_file:   Option<PathBuf>
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      timezone:      chrono_tz::UTC,
      reopen_status: Status::Todo,
      data_dir:      None,
      loaded_file:   None
    }
  }
}

impl EngineConfig {
  #[tracing::instrument(skip(
    override_path
  ))]
  pub fn load(
    override_path: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg =
      match resolve_config_path(
        override_path
      ) {
        | Some(path) => {
          info!(config = %path.display(), "loading engine config");
          let text =
            fs::read_to_string(&path)
              .with_context(|| {
                format!(
                  "failed to read {}",
                  path.display()
                )
              })?;
          let mut cfg =
            Self::from_toml_str(
              &text
            )
            .with_context(|| {
              format!(
                "invalid config {}",
                path.display()
              )
            })?;
          cfg.loaded_file = Some(path);
          cfg
        }
        | None => {
          warn!(
            "no config file found; \
             using defaults"
          );
          Self::default()
        }
      };

    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      debug!(timezone = %tz, "timezone overridden from environment");
      cfg.timezone = tz;
    }

    Ok(cfg)
  }

  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let raw: RawConfig =
      toml::from_str(text)
        .context("failed to parse toml")?;

    let timezone_raw = raw
      .timezone
      .as_deref()
      .unwrap_or(DEFAULT_TIMEZONE);
    let timezone = parse_timezone(
      timezone_raw,
      CONFIG_FILE
    )
    .ok_or_else(|| {
      anyhow!(
        "unknown timezone: \
         {timezone_raw}"
      )
    })?;

    let reopen_status = match raw
      .reopen_status
      .as_deref()
    {
      | None => Status::Todo,
      | Some(token) => {
        match Status::parse(token) {
          | Some(Status::Completed) => {
            return Err(anyhow!(
              "reopen_status cannot be \
               completed"
            ));
          }
          | Some(status) => status,
          | None => {
            return Err(anyhow!(
              "unknown reopen_status: \
               {token}"
            ));
          }
        }
      }
    };

    let data_dir = raw
      .data_dir
      .as_deref()
      .map(str::trim)
      .filter(|dir| !dir.is_empty())
      .map(|dir| {
        expand_tilde(Path::new(dir))
      });

    Ok(Self {
      timezone,
      reopen_status,
      data_dir,
      loaded_file: None
    })
  }

  /// Directory of the file-backed record store, created on demand.
  #[tracing::instrument(skip(self))]
  pub fn resolve_data_dir(
    &self
  ) -> anyhow::Result<PathBuf> {
    let dir = match self.data_dir.as_ref()
    {
      | Some(dir) => dir.clone(),
      | None => default_data_dir()?
    };

    if !dir.exists() {
      info!(dir = %dir.display(), "creating data directory");
      fs::create_dir_all(&dir)
        .with_context(|| {
          format!(
            "failed to create {}",
            dir.display()
          )
        })?;
    }

    Ok(dir)
  }
}

fn resolve_config_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(expand_tilde(path));
  }

  if let Ok(raw) =
    std::env::var(CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if trimmed.is_empty()
      || trimmed == "/dev/null"
    {
      return None;
    }
    return Some(expand_tilde(
      Path::new(trimmed)
    ));
  }

  let candidate = dirs::config_dir()?
    .join(CONFIG_DIR)
    .join(CONFIG_FILE);
  if candidate.exists() {
    Some(candidate)
  } else {
    None
  }
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join(CONFIG_DIR))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}
