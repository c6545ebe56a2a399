//! Writing the defined stacks to disk, where the deployer picks them up.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

/// one deployable stack, as written to the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedStack {
    pub stack_name: String,
    pub region: String,
    pub dependencies: Vec<String>,
    /// relative to the manifest's directory.
    pub template_file: String,
    pub tags: BTreeMap<String, String>,
    /// the template's parameters and their defaults. Values are given at deploy time.
    pub parameters: BTreeMap<String, Option<String>>,
    #[serde(skip)]
    pub template_body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// in deployment order.
    pub stacks: Vec<SynthesizedStack>,
}

impl Manifest {
    /// reads a manifest and the templates it points at.
    pub fn load(out_dir: &Path) -> Result<Self> {
        let path = out_dir.join(MANIFEST_FILE);
        let contents = read(&path)?;
        let mut manifest: Manifest = serde_json::from_str(&contents)?;
        for stack in manifest.stacks.iter_mut() {
            stack.template_body = read(&out_dir.join(&stack.template_file))?;
        }
        Ok(manifest)
    }

    pub fn stack(&self, stack_name: &str) -> Option<&SynthesizedStack> {
        self.stacks.iter().find(|s| s.stack_name == stack_name)
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })
}

fn write(path: PathBuf, contents: &str) -> Result<()> {
    std::fs::write(&path, contents).map_err(|source| Error::Io { path, source })
}

pub fn synth(app: &App, out_dir: &Path) -> Result<Manifest> {
    std::fs::create_dir_all(out_dir)
        .map_err(|source| Error::Io { path: out_dir.to_path_buf(), source })?;

    let mut manifest = Manifest::default();
    for stack in app.stacks()? {
        let template = stack.validated_template()?;
        let body = template.to_json()?;
        let template_file = format!("{}.template.json", stack.name);
        write(out_dir.join(&template_file), &body)?;
        tracing::info!(stack = %stack.name, region = %stack.region, resources = template.resources.len(), "synthesized");
        manifest.stacks.push(SynthesizedStack {
            stack_name: stack.name.clone(),
            region: stack.region.clone(),
            dependencies: stack.dependencies.clone(),
            template_file,
            tags: stack.tags.clone(),
            parameters: template.parameters.iter()
                .map(|(name, p)| (name.clone(), p.default.clone()))
                .collect(),
            template_body: body,
        });
    }
    let contents = serde_json::to_string_pretty(&manifest)?;
    write(out_dir.join(MANIFEST_FILE), &contents)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::HandoffState;
    use crate::params::tests::sample_params;

    #[test]
    fn writes_templates_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::define(sample_params(), &HandoffState::NotPublished).unwrap();
        let manifest = synth(&app, dir.path()).unwrap();
        assert_eq!(manifest.stacks.len(), 3);
        assert!(dir.path().join("webapp-dev-network-stack.template.json").exists());
        assert!(dir.path().join(MANIFEST_FILE).exists());

        let compute = manifest.stack("webapp-dev-compute-stack").unwrap();
        assert_eq!(compute.region, "eu-west-1");
        let names: Vec<&str> = compute.parameters.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["AmiId", "ArtifactBucket", "ArtifactKey"]);
        assert_eq!(compute.parameters["ArtifactKey"], None);

        let loaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(loaded, manifest);
        let body: serde_json::Value = serde_json::from_str(&loaded.stacks[0].template_body).unwrap();
        assert_eq!(body["AWSTemplateFormatVersion"], "2010-09-09");
    }

    #[test]
    fn missing_manifest_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
