use super::{ExclusionMatcher, Subscription};
use crate::config::Config;
use crate::error::{ExportError, ExportResult};

/// Which subscriptions a run should touch
#[derive(Debug, Clone, Default)]
pub struct SelectionOptions {
    /// Restrict to one subscription id
    pub only: Option<String>,
    /// Restrict to `schedules.<name>.subscriptions`
    pub schedule: Option<String>,
    /// Intersect with the subscriptions declared in config, when any are declared
    pub use_declared: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkSet {
    pub selected: Vec<Subscription>,
    /// Dropped by `exclude_subscriptions`, with the matching pattern
    pub excluded: Vec<(Subscription, String)>,
    /// Declared in config but not among the enabled discovered subscriptions
    pub unavailable: Vec<String>,
}

/// Narrow the discovered subscriptions down to the work set
pub fn select_subscriptions(
    discovered: &[Subscription],
    config: &Config,
    options: &SelectionOptions,
) -> ExportResult<WorkSet> {
    let mut work_set = WorkSet::default();

    let candidates: Vec<Subscription> = if let Some(id) = options.only.as_deref() {
        let found = find(discovered, id).ok_or_else(|| {
            ExportError::DiscoveryFailed(format!(
                "subscription {} is not among the enabled subscriptions of this identity",
                id
            ))
        })?;
        vec![with_declared_name(found, config)]
    } else if options.use_declared && !config.subscriptions.is_empty() {
        let mut declared = Vec::new();
        for entry in config.subscriptions.iter().filter(|e| e.export_enabled) {
            match find(discovered, &entry.id) {
                Some(found) => declared.push(with_declared_name(found, config)),
                None => work_set.unavailable.push(entry.id.clone()),
            }
        }
        declared
    } else {
        discovered.to_vec()
    };

    let candidates = match options.schedule.as_deref() {
        Some(name) => {
            let schedule = config
                .schedules
                .get(name)
                .ok_or_else(|| ExportError::UnknownSchedule(name.to_string()))?;
            candidates
                .into_iter()
                .filter(|s| {
                    schedule.subscriptions.iter().any(|member| {
                        member.eq_ignore_ascii_case(&s.id) || member == &s.name
                    })
                })
                .collect()
        }
        None => candidates,
    };

    let matcher = ExclusionMatcher::new(&config.exclude_subscriptions.patterns());
    for subscription in candidates {
        let pattern = matcher
            .matching_pattern(&subscription.id)
            .or_else(|| matcher.matching_pattern(&subscription.name))
            .map(str::to_string);

        match pattern {
            Some(pattern) => work_set.excluded.push((subscription, pattern)),
            None => work_set.selected.push(subscription),
        }
    }

    Ok(work_set)
}

fn find<'a>(discovered: &'a [Subscription], id: &str) -> Option<&'a Subscription> {
    discovered
        .iter()
        .find(|s| s.id.eq_ignore_ascii_case(id.trim()))
}

fn with_declared_name(found: &Subscription, config: &Config) -> Subscription {
    let mut subscription = found.clone();
    if let Some(name) = config
        .subscription_entry(&found.id)
        .and_then(|e| e.name.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        subscription.name = name.to_string();
    }
    subscription
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered() -> Vec<Subscription> {
        vec![
            Subscription::enabled("s1", "Sub One"),
            Subscription::enabled("s2", "Sub Two"),
            Subscription::enabled("s3", "Sandbox-Dev"),
        ]
    }

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn ids(subs: &[Subscription]) -> Vec<&str> {
        subs.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_all_discovered_when_nothing_declared() {
        let work_set = select_subscriptions(
            &discovered(),
            &Config::default(),
            &SelectionOptions {
                use_declared: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(ids(&work_set.selected), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_declared_subscriptions_with_exclusion() {
        let config = config(
            r#"
subscriptions:
  - {id: s1, name: "Sub One"}
  - {id: s2, name: "Sub Two"}
exclude_subscriptions: [s2]
"#,
        );
        let options = SelectionOptions {
            use_declared: true,
            ..Default::default()
        };

        let work_set = select_subscriptions(&discovered(), &config, &options).unwrap();
        assert_eq!(ids(&work_set.selected), vec!["s1"]);
        assert_eq!(work_set.excluded.len(), 1);
        assert_eq!(work_set.excluded[0].1, "s2");
    }

    #[test]
    fn test_disabled_and_unknown_declarations() {
        let config = config(
            r#"
subscriptions:
  - {id: s1, export_enabled: false}
  - {id: s9, name: Ghost}
  - {id: S3, name: Renamed}
"#,
        );
        let options = SelectionOptions {
            use_declared: true,
            ..Default::default()
        };

        let work_set = select_subscriptions(&discovered(), &config, &options).unwrap();
        assert_eq!(ids(&work_set.selected), vec!["s3"]);
        assert_eq!(work_set.selected[0].name, "Renamed");
        assert_eq!(work_set.unavailable, vec!["s9"]);
    }

    #[test]
    fn test_exclusion_by_name_glob_grouped_form() {
        let config = config(
            r#"
exclude_subscriptions:
  non-prod: ["sandbox-*"]
"#,
        );

        let work_set =
            select_subscriptions(&discovered(), &config, &SelectionOptions::default()).unwrap();
        assert_eq!(ids(&work_set.selected), vec!["s1", "s2"]);
        assert_eq!(work_set.excluded[0].1, "sandbox-*");
    }

    #[test]
    fn test_single_subscription_mode() {
        let options = SelectionOptions {
            only: Some("S2".to_string()),
            use_declared: true,
            ..Default::default()
        };
        let work_set = select_subscriptions(&discovered(), &Config::default(), &options).unwrap();
        assert_eq!(ids(&work_set.selected), vec!["s2"]);

        let options = SelectionOptions {
            only: Some("missing".to_string()),
            ..Default::default()
        };
        let err = select_subscriptions(&discovered(), &Config::default(), &options).unwrap_err();
        assert!(matches!(err, ExportError::DiscoveryFailed(_)));
    }

    #[test]
    fn test_schedule_filter() {
        let config = config(
            r#"
schedules:
  weekly:
    subscriptions: [s1, "Sandbox-Dev"]
"#,
        );
        let options = SelectionOptions {
            schedule: Some("weekly".to_string()),
            ..Default::default()
        };
        let work_set = select_subscriptions(&discovered(), &config, &options).unwrap();
        assert_eq!(ids(&work_set.selected), vec!["s1", "s3"]);

        let options = SelectionOptions {
            schedule: Some("daily".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            select_subscriptions(&discovered(), &config, &options),
            Err(ExportError::UnknownSchedule(_))
        ));
    }
}
