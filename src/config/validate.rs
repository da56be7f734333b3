// src/config/validate.rs

use crate::config::model::{Config, RawConfig, TargetsConfig, WaitGrouping};
use crate::errors::{DagforgeError, Result};
use crate::manifest::{Manifest, Profiles};

impl TryFrom<RawConfig> for Config {
    type Error = DagforgeError;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let wait_grouping = match (raw.dependencies.per_domain, raw.dependencies.per_task) {
            (true, false) => WaitGrouping::PerDomain,
            (false, true) => WaitGrouping::PerTask,
            (true, true) => {
                return Err(DagforgeError::Config(
                    "[dependencies] per_domain and per_task are mutually exclusive".to_string(),
                ));
            }
            (false, false) => {
                return Err(DagforgeError::Config(
                    "[dependencies] one of per_domain or per_task must be set".to_string(),
                ));
            }
        };

        if raw.targets.default.is_empty() {
            return Err(DagforgeError::Config(
                "[targets] default must not be empty".to_string(),
            ));
        }

        Ok(Config {
            wait_grouping,
            targets: TargetsConfig::from(raw.targets),
            retries: raw.retries,
            compile: raw.compile,
            catalog: raw.catalog,
        })
    }
}

/// Check that every job's resolved target routes to a profile entry.
///
/// A job demanding a target with no resolvable connection parameters is a
/// configuration error, caught before any graph state is built.
pub fn validate_routing(manifest: &Manifest, profiles: &Profiles, config: &Config) -> Result<()> {
    for job in manifest.jobs.values() {
        let target = job.target_environment(&config.targets);
        if !profiles.has_target(&target) {
            return Err(DagforgeError::Config(format!(
                "job '{}' routes to target '{target}', which is not defined in profiles",
                job.id
            )));
        }
    }
    if !profiles.has_target(&config.targets.backfill) {
        return Err(DagforgeError::Config(format!(
            "backfill target '{}' is not defined in profiles",
            config.targets.backfill
        )));
    }
    if !profiles.has_target(&config.targets.maintenance) {
        return Err(DagforgeError::Config(format!(
            "maintenance target '{}' is not defined in profiles",
            config.targets.maintenance
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_config(per_domain: bool, per_task: bool) -> RawConfig {
        let toml_str = format!(
            r#"
            [dependencies]
            per_domain = {per_domain}
            per_task = {per_task}

            [targets]
            default = "prod"
            "#
        );
        toml::from_str(&toml_str).unwrap()
    }

    #[test]
    fn exactly_one_grouping_policy_must_hold() {
        assert!(matches!(
            Config::try_from(raw_config(true, false)).unwrap().wait_grouping,
            WaitGrouping::PerDomain
        ));
        assert!(matches!(
            Config::try_from(raw_config(false, true)).unwrap().wait_grouping,
            WaitGrouping::PerTask
        ));
        assert!(Config::try_from(raw_config(false, false)).is_err());
        assert!(Config::try_from(raw_config(true, true)).is_err());
    }

    #[test]
    fn optional_targets_fall_back_to_default() {
        let config = Config::try_from(raw_config(true, false)).unwrap();
        assert_eq!(config.targets.default, "prod");
        assert_eq!(config.targets.tests, "prod");
        assert_eq!(config.targets.backfill, "prod");
        assert_eq!(config.targets.maintenance, "prod");
    }
}
