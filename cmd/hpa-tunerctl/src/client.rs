use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;

use pkg_types::event::TunerEvent;
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::tuner::HpaTuner;

/// Resource collections served by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Tuners,
    Autoscalers,
}

impl Resource {
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Tuners => "hpatuners",
            Resource::Autoscalers => "horizontalpodautoscalers",
        }
    }
}

/// Thin typed wrapper over the daemon's REST API.
pub struct ApiClient {
    http: reqwest::Client,
    server: String,
}

impl ApiClient {
    pub fn new(server: &str) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    pub fn collection_url(&self, resource: Resource, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) => format!("{}/api/v1/namespaces/{}/{}", self.server, ns, resource.path()),
            None => format!("{}/api/v1/{}", self.server, resource.path()),
        }
    }

    pub fn item_url(&self, resource: Resource, namespace: &str, name: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/{}/{}",
            self.server,
            namespace,
            resource.path(),
            name
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("server returned {} for {}: {}", status, url, body);
        }
        Ok(resp.json().await?)
    }

    async fn put_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T> {
        let resp = self
            .http
            .put(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("PUT {}", url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("server returned {}: {}", status, body);
        }
        Ok(resp.json().await?)
    }

    pub async fn list_tuners(&self, namespace: Option<&str>) -> Result<Vec<HpaTuner>> {
        self.get_json(&self.collection_url(Resource::Tuners, namespace))
            .await
    }

    pub async fn list_autoscalers(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<HorizontalPodAutoscaler>> {
        self.get_json(&self.collection_url(Resource::Autoscalers, namespace))
            .await
    }

    pub async fn get_tuner(&self, namespace: &str, name: &str) -> Result<HpaTuner> {
        self.get_json(&self.item_url(Resource::Tuners, namespace, name))
            .await
    }

    pub async fn get_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler> {
        self.get_json(&self.item_url(Resource::Autoscalers, namespace, name))
            .await
    }

    pub async fn apply_tuner(&self, tuner: &HpaTuner) -> Result<HpaTuner> {
        let url = self.item_url(Resource::Tuners, &tuner.namespace, &tuner.name);
        self.put_json(&url, tuner).await
    }

    pub async fn apply_autoscaler(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler> {
        let url = self.item_url(Resource::Autoscalers, &hpa.namespace, &hpa.name);
        self.put_json(&url, hpa).await
    }

    /// Returns false when nothing was there to delete.
    pub async fn delete(&self, resource: Resource, namespace: &str, name: &str) -> Result<bool> {
        let url = self.item_url(resource, namespace, name);
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("DELETE {}", url))?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => bail!("server returned {} for {}", s, url),
        }
    }

    pub async fn list_events(&self, namespace: &str) -> Result<Vec<TunerEvent>> {
        self.get_json(&format!(
            "{}/api/v1/namespaces/{}/events",
            self.server, namespace
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_namespaced_and_cluster_urls() {
        let client = ApiClient::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(
            client.collection_url(Resource::Tuners, None),
            "http://127.0.0.1:8080/api/v1/hpatuners"
        );
        assert_eq!(
            client.collection_url(Resource::Autoscalers, Some("web")),
            "http://127.0.0.1:8080/api/v1/namespaces/web/horizontalpodautoscalers"
        );
        assert_eq!(
            client.item_url(Resource::Tuners, "web", "frontend-tuner"),
            "http://127.0.0.1:8080/api/v1/namespaces/web/hpatuners/frontend-tuner"
        );
    }
}
