//! Command-line flags and their merge with the optional config file.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use downscaler_core::config::FileConfig;
use downscaler_core::{ConfigError, ScheduleConfig, parse_interval};

const DEFAULT_START: i64 = 9;
const DEFAULT_END: i64 = 18;
const DEFAULT_INTERVAL: &str = "60s";
const DEFAULT_INITIAL_CAPACITY: u32 = 2;
const DEFAULT_CONFIGMAP_NAME: &str = "asg-downscaler-state";

#[derive(Parser, Debug)]
#[command(
    name = "downscalerd",
    about = "Scales an AWS autoscaling group to zero outside working hours",
    version
)]
pub struct Cli {
    /// Start of the working day. 24h format. [default: 9]
    #[arg(long, allow_negative_numbers = true)]
    pub start: Option<i64>,

    /// End of the working day. 24h format. [default: 18]
    #[arg(long, allow_negative_numbers = true)]
    pub end: Option<i64>,

    /// Keep the nodes available during weekend working hours.
    #[arg(long)]
    pub consultant_mode: bool,

    /// Name of the autoscaling group. Lets the downscaler handle a group
    /// other than the one it runs on.
    #[arg(long)]
    pub asg_name: Option<String>,

    /// Autodetect the group name: the group this instance belongs to.
    #[arg(long)]
    pub autodetect: bool,

    /// Interval by which the size is checked, e.g. 60s, 5m. [default: 60s]
    #[arg(long)]
    pub interval: Option<String>,

    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// AWS region. Read from instance metadata when omitted.
    #[arg(long)]
    pub region: Option<String>,

    /// Capacity restored on scale-up until a larger one is observed. [default: 2]
    #[arg(long)]
    pub initial_capacity: Option<u32>,

    /// Record the remembered capacity in a Kubernetes ConfigMap.
    #[arg(long)]
    pub configmap_state: bool,

    /// Name of the state ConfigMap. [default: asg-downscaler-state]
    #[arg(long)]
    pub configmap_state_name: Option<String>,

    /// Namespace of the state ConfigMap. Defaults to the client's namespace.
    #[arg(long)]
    pub configmap_namespace: Option<String>,

    /// Local redb file remembering the capacity across restarts.
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// TOML file with defaults for any of the flags above.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// How the managed group is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSource {
    Named(String),
    /// Look up the group owning the instance this process runs on.
    Autodetect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMapSettings {
    pub name: String,
    pub namespace: Option<String>,
}

/// Validated startup settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub schedule: ScheduleConfig,
    pub group: GroupSource,
    pub interval: Duration,
    pub region: Option<String>,
    pub initial_capacity: u32,
    pub configmap: Option<ConfigMapSettings>,
    pub state_file: Option<PathBuf>,
}

impl Cli {
    /// Debug logging requested by flag or by the config file.
    pub fn verbose_with(&self, file: &FileConfig) -> bool {
        self.verbose || file.verbose.unwrap_or(false)
    }
}

impl Settings {
    /// Merge flags over `file` and validate the result.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let schedule = ScheduleConfig::new(
            cli.start.or(file.start).unwrap_or(DEFAULT_START),
            cli.end.or(file.end).unwrap_or(DEFAULT_END),
            cli.consultant_mode || file.consultant_mode.unwrap_or(false),
        )?;

        let interval = cli
            .interval
            .or(file.interval)
            .unwrap_or_else(|| DEFAULT_INTERVAL.to_string());
        let interval = parse_interval(&interval)?;

        let group = if cli.autodetect || file.autodetect.unwrap_or(false) {
            GroupSource::Autodetect
        } else {
            match cli.asg_name.or(file.asg_name) {
                Some(name) if !name.trim().is_empty() => GroupSource::Named(name),
                _ => return Err(ConfigError::MissingGroupName),
            }
        };

        let initial_capacity = cli
            .initial_capacity
            .or(file.initial_capacity)
            .unwrap_or(DEFAULT_INITIAL_CAPACITY);
        if initial_capacity == 0 {
            return Err(ConfigError::ZeroInitialCapacity);
        }

        let configmap = (cli.configmap_state || file.configmap_state.unwrap_or(false)).then(|| {
            ConfigMapSettings {
                name: cli
                    .configmap_state_name
                    .or(file.configmap_state_name)
                    .unwrap_or_else(|| DEFAULT_CONFIGMAP_NAME.to_string()),
                namespace: cli.configmap_namespace.or(file.configmap_namespace),
            }
        });

        Ok(Self {
            schedule,
            group,
            interval,
            region: cli.region.or(file.region),
            initial_capacity,
            configmap,
            state_file: cli.state_file.or(file.state_file.map(PathBuf::from)),
        })
    }

    /// Whether startup must read the instance identity document: for the
    /// instance id when autodetecting, or for the region when none is given.
    pub fn needs_instance_identity(&self) -> bool {
        self.group == GroupSource::Autodetect || self.region.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["downscalerd"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_working_hours() {
        let settings =
            Settings::resolve(parse(&["--asg-name", "workers"]), FileConfig::default()).unwrap();

        assert_eq!(settings.schedule, ScheduleConfig::new(9, 18, false).unwrap());
        assert_eq!(settings.group, GroupSource::Named("workers".to_string()));
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.initial_capacity, 2);
        assert!(settings.configmap.is_none());
        assert!(settings.state_file.is_none());
    }

    #[test]
    fn verbose_from_flag_or_file() {
        let file = FileConfig::from_toml("verbose = true").unwrap();
        assert!(parse(&[]).verbose_with(&file));
        assert!(parse(&["-v"]).verbose_with(&FileConfig::default()));
        assert!(!parse(&[]).verbose_with(&FileConfig::default()));
    }

    #[test]
    fn zero_initial_capacity_is_rejected() {
        let err = Settings::resolve(
            parse(&["--asg-name", "w", "--initial-capacity", "0"]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::ZeroInitialCapacity);

        let file = FileConfig::from_toml("asg-name = \"w\"\ninitial-capacity = 0").unwrap();
        let err = Settings::resolve(parse(&[]), file).unwrap_err();
        assert_eq!(err, ConfigError::ZeroInitialCapacity);
    }

    #[test]
    fn overflowing_interval_is_rejected() {
        let err = Settings::resolve(
            parse(&["--asg-name", "w", "--interval", "6000000000000000h"]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidInterval("6000000000000000h".to_string())
        );
    }

    #[test]
    fn missing_group_name_is_rejected() {
        let err = Settings::resolve(parse(&[]), FileConfig::default()).unwrap_err();
        assert_eq!(err, ConfigError::MissingGroupName);

        let err = Settings::resolve(parse(&["--asg-name", " "]), FileConfig::default()).unwrap_err();
        assert_eq!(err, ConfigError::MissingGroupName);
    }

    #[test]
    fn autodetect_needs_no_name() {
        let settings = Settings::resolve(parse(&["--autodetect"]), FileConfig::default()).unwrap();
        assert_eq!(settings.group, GroupSource::Autodetect);
        assert!(settings.needs_instance_identity());
    }

    #[test]
    fn explicit_region_skips_metadata() {
        let settings = Settings::resolve(
            parse(&["--asg-name", "workers", "--region", "eu-west-1"]),
            FileConfig::default(),
        )
        .unwrap();
        assert!(!settings.needs_instance_identity());
    }

    #[test]
    fn invalid_hours_are_rejected() {
        for args in [
            &["--asg-name", "w", "--start", "0"][..],
            &["--asg-name", "w", "--start", "-1"][..],
            &["--asg-name", "w", "--end", "25"][..],
            &["--asg-name", "w", "--start", "18", "--end", "9"][..],
        ] {
            assert!(
                Settings::resolve(parse(args), FileConfig::default()).is_err(),
                "{args:?}"
            );
        }
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let err = Settings::resolve(
            parse(&["--asg-name", "w", "--interval", "soon"]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidInterval("soon".to_string()));
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig::from_toml(
            r#"
start = 7
end = 16
asg-name = "from-file"
interval = "5m"
configmap-state = true
configmap-namespace = "kube-system"
initial-capacity = 3
"#,
        )
        .unwrap();

        let settings = Settings::resolve(
            parse(&["--end", "20", "--asg-name", "from-flag", "--configmap-state-name", "cm"]),
            file,
        )
        .unwrap();

        assert_eq!(settings.schedule, ScheduleConfig::new(7, 20, false).unwrap());
        assert_eq!(settings.group, GroupSource::Named("from-flag".to_string()));
        assert_eq!(settings.interval, Duration::from_secs(300));
        assert_eq!(settings.initial_capacity, 3);
        assert_eq!(
            settings.configmap,
            Some(ConfigMapSettings {
                name: "cm".to_string(),
                namespace: Some("kube-system".to_string()),
            })
        );
    }

    #[test]
    fn configmap_state_uses_default_name() {
        let settings = Settings::resolve(
            parse(&["--asg-name", "w", "--configmap-state", "--consultant-mode"]),
            FileConfig::default(),
        )
        .unwrap();

        assert!(settings.schedule.consultant_mode());
        assert_eq!(settings.configmap.unwrap().name, "asg-downscaler-state");
    }
}
