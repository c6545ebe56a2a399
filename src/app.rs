//! Assembles the stacks of one deployment.

use crate::config::DbConfig;
use crate::error::{Error, Result};
use crate::params::{AppParams, StackKind};
use crate::stacks::{cdn, compute, database, network};
use crate::template::Stack;

/// the state of the parameters the compute stack publishes in the
/// global region. The CDN stack can only be defined once they exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffState {
    Published {
        alb_hostname: String,
        cloudfront_secret: Option<String>,
    },
    NotPublished,
    LookupFailed(String),
}

impl HandoffState {
    pub fn is_published(&self) -> bool {
        matches!(self, HandoffState::Published { .. })
    }
}

#[derive(Debug, Clone)]
pub struct App {
    pub params: AppParams,
    stacks: Vec<(StackKind, Stack)>,
}

/// name of the secret the instances read, if any.
fn db_secret_name(params: &AppParams) -> String {
    if params.config.db_config.creates_database() {
        database::secret_name(params)
    } else {
        params.config.db_secret_name.clone()
    }
}

impl App {
    pub fn define(params: AppParams, handoff: &HandoffState) -> Result<Self> {
        let mut stacks = vec![(StackKind::Network, network::define(&params)?)];

        let database = database::define(&params)?;
        let secret_name = db_secret_name(&params);
        let mut compute = compute::define(&params, &secret_name)?;
        if let Some(database) = database {
            if !secret_name.is_empty() {
                compute.add_dependency(&database.name);
            }
            stacks.push((StackKind::Database, database));
        }
        stacks.push((StackKind::Compute, compute));

        match handoff {
            HandoffState::Published { alb_hostname, cloudfront_secret } => {
                let origin = cdn::PublishedOrigin {
                    alb_hostname,
                    cloudfront_secret: cloudfront_secret.as_deref(),
                };
                stacks.push((StackKind::Cdn, cdn::define(&params, origin)?));
            }
            HandoffState::NotPublished => {
                tracing::info!(
                    "Not defining the CDN stack as the parameter {} was not found in {}. It will get created once you have deployed the compute stack.",
                    params.alb_hostname_param,
                    params.global_region(),
                );
            }
            HandoffState::LookupFailed(message) => {
                tracing::error!(
                    parameter = %params.alb_hostname_param,
                    "Not defining the CDN stack, failed to look up its origin: {message}",
                );
            }
        }
        Ok(Self { params, stacks })
    }

    pub fn stack(&self, kind: StackKind) -> Option<&Stack> {
        self.stacks.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }

    pub fn cdn_defined(&self) -> bool {
        self.stack(StackKind::Cdn).is_some()
    }

    /// stacks that exist from a previous deployment but are no longer wanted.
    pub fn stacks_to_delete(&self) -> Vec<String> {
        match self.params.config.db_config {
            DbConfig::Delete => vec![self.params.stack_name(StackKind::Database)],
            _ => vec![],
        }
    }

    /// every defined stack, each one after the stacks it depends on.
    pub fn stacks(&self) -> Result<Vec<&Stack>> {
        let all: Vec<&Stack> = self.stacks.iter().map(|(_, s)| s).collect();
        let mut ordered: Vec<&Stack> = Vec::with_capacity(all.len());
        let mut remaining = all.clone();
        while !remaining.is_empty() {
            let ready = remaining.iter().position(|stack| {
                stack.dependencies.iter().all(|dep| {
                    ordered.iter().any(|s| &s.name == dep) || !all.iter().any(|s| &s.name == dep)
                })
            });
            match ready {
                Some(i) => ordered.push(remaining.remove(i)),
                None => {
                    let names: Vec<&str> = remaining.iter().map(|s| s.name.as_str()).collect();
                    return Err(Error::Validation(format!("Stacks {} depend on each other", names.join(", "))));
                }
            }
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, ParametersFile};
    use crate::params::tests::sample_params;
    use crate::params::ContextLookups;

    fn published() -> HandoffState {
        HandoffState::Published {
            alb_hostname: "webapp-alb-123.eu-west-1.elb.amazonaws.com".to_string(),
            cloudfront_secret: Some("webapp-dev-cloudfront-secret-AbCdEf".to_string()),
        }
    }

    fn names(app: &App) -> Vec<String> {
        app.stacks().unwrap().iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn defines_every_stack_once_published() {
        let app = App::define(sample_params(), &published()).unwrap();
        assert!(app.cdn_defined());
        assert_eq!(names(&app), vec![
            "webapp-dev-network-stack",
            "webapp-dev-database-stack",
            "webapp-dev-compute-stack",
            "webapp-dev-cdn-stack",
        ]);
        let compute = app.stack(StackKind::Compute).unwrap();
        assert!(compute.dependencies.contains(&"webapp-dev-database-stack".to_string()));
    }

    #[test]
    fn cdn_waits_for_the_handoff() {
        let app = App::define(sample_params(), &HandoffState::NotPublished).unwrap();
        assert!(!app.cdn_defined());
        assert_eq!(names(&app).len(), 3);

        let app = App::define(sample_params(), &HandoffState::LookupFailed("AccessDenied".into())).unwrap();
        assert!(!app.cdn_defined());
    }

    #[test]
    fn no_database_stack_when_disabled() {
        let mut params = sample_params();
        params.config.db_config = DbConfig::Disabled;
        let app = App::define(params, &published()).unwrap();
        assert!(app.stack(StackKind::Database).is_none());
        let compute = app.stack(StackKind::Compute).unwrap();
        assert_eq!(compute.dependencies, vec!["webapp-dev-network-stack".to_string()]);
        assert!(compute.get("SecretsPolicy").is_none());
        assert!(app.stacks_to_delete().is_empty());
    }

    #[test]
    fn existing_secret_is_used_without_a_database() {
        let mut params = sample_params();
        params.config.db_config = DbConfig::None;
        params.config.db_secret_name = "shared-db-secret".to_string();
        let app = App::define(params, &published()).unwrap();
        let compute = app.stack(StackKind::Compute).unwrap();
        assert!(compute.get("SecretsPolicy").is_some());
        assert!(compute.dependencies.contains(&"webapp-dev-database-stack".to_string()));
    }

    #[test]
    fn delete_marks_the_database_stack() {
        let mut params = sample_params();
        params.config.db_config = DbConfig::Delete;
        let app = App::define(params, &published()).unwrap();
        assert!(app.stack(StackKind::Database).is_none());
        assert_eq!(app.stacks_to_delete(), vec!["webapp-dev-database-stack".to_string()]);
    }

    #[test]
    fn every_stack_carries_the_tags() {
        let app = App::define(sample_params(), &published()).unwrap();
        for stack in app.stacks().unwrap() {
            assert_eq!(stack.tags.get("CreatedBy").map(String::as_str), Some("platform-team"));
        }
    }

    #[test]
    fn shipped_parameters_file_defines_every_stack() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
        let config = ParametersFile::load(dir.join("parameters.toml")).unwrap()
            .environment(&Overrides::default()).unwrap();
        let lookups = ContextLookups {
            hosted_zone_id: Some("Z0123456789ABC".into()),
            cloudfront_prefix_list: Some("pl-4fa04526".into()),
        };
        let params = AppParams::derive(config, lookups).unwrap().with_base_dir(dir);
        let app = App::define(params, &published()).unwrap();
        assert_eq!(app.stacks().unwrap().len(), 4);

        let compute = app.stack(StackKind::Compute).unwrap();
        let admin = &compute.get("WebappDevAdminLaunchTemplate").unwrap().properties;
        let user_data = serde_json::to_string(admin).unwrap();
        assert!(user_data.contains("serving www.example.com from /mnt/efs"));
    }
}
