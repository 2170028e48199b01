use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::hpa::HorizontalPodAutoscaler;
use crate::tuner::HpaTuner;

/// One document of a YAML manifest file, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    HpaTuner(HpaTuner),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
}

impl Manifest {
    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::HpaTuner(_) => "HpaTuner",
            Manifest::HorizontalPodAutoscaler(_) => "HorizontalPodAutoscaler",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Manifest::HpaTuner(t) => &t.name,
            Manifest::HorizontalPodAutoscaler(h) => &h.name,
        }
    }

    /// Fill in `namespace` when the document does not set one.
    pub fn default_namespace(&mut self, namespace: &str) {
        let ns = match self {
            Manifest::HpaTuner(t) => &mut t.namespace,
            Manifest::HorizontalPodAutoscaler(h) => &mut h.namespace,
        };
        if ns.is_empty() {
            *ns = namespace.to_string();
        }
    }
}

/// Parse a multi-document YAML string. Empty documents are skipped.
pub fn parse_manifests(content: &str) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for (idx, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("document {} is not valid YAML", idx))?;
        if value.is_null() {
            continue;
        }
        let manifest: Manifest = serde_yaml::from_value(value)
            .with_context(|| format!("document {} is not a known resource", idx))?;
        manifests.push(manifest);
    }
    Ok(manifests)
}
