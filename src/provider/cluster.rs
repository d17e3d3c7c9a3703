//! Live cluster provider.
//!
//! Lists objects through the Kubernetes API with a dynamic client, so any
//! resource type (including custom resources from
//! `additionalResourceTypes.yaml`) can be fetched without compiled-in types.
//!
//! # Prerequisites
//!
//! - In-cluster service account, or a kubeconfig (`KUBECONFIG` or `~/.kube/config`)
//! - RBAC permissions to list the configured resource types and to read the
//!   abort ConfigMap

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    Client, Config,
    api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams},
    core::GroupVersion,
    discovery,
};
use serde_json::Value;

use super::{Connect, FlagSource, ProviderError, ResourceProvider, ResourceType};
use crate::config::AbortFlagLocation;
use crate::resource::Resource;

/// Resource provider backed by a Kubernetes API client.
#[derive(Clone)]
pub struct ClusterProvider {
    client: Client,
}

impl ClusterProvider {
    /// Create a provider using the inferred configuration: kubeconfig first,
    /// then the in-cluster service account.
    pub async fn new() -> Result<Self, ProviderError> {
        install_crypto_provider();
        let config = Config::infer()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        let client =
            Client::try_from(config).map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create a provider with a specific kubeconfig context.
    pub async fn with_context(context: &str) -> Result<Self, ProviderError> {
        install_crypto_provider();
        let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| ProviderError::Connection(e.to_string()))?;
        let client =
            Client::try_from(config).map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Build the dynamic API descriptor for a resource type, asking the
    /// discovery endpoint when the kind is not known up front.
    async fn api_resource(&self, resource_type: &ResourceType) -> Result<ApiResource, ProviderError> {
        if let Some(kind) = &resource_type.kind {
            let gvk = GroupVersionKind::gvk(&resource_type.group, &resource_type.version, kind);
            return Ok(ApiResource::from_gvk_with_plural(&gvk, &resource_type.resource));
        }

        let gv = GroupVersion::gv(&resource_type.group, &resource_type.version);
        let group = discovery::oneshot::pinned_group(&self.client, &gv)
            .await
            .map_err(|e| classify(resource_type, e))?;

        group
            .versioned_resources(&resource_type.version)
            .into_iter()
            .map(|(api_resource, _caps)| api_resource)
            .find(|api_resource| api_resource.plural == resource_type.resource)
            .ok_or_else(|| ProviderError::List {
                resource_type: resource_type.to_string(),
                reason: "resource type not served by the cluster".to_string(),
            })
    }
}

impl Connect for ClusterProvider {
    async fn connect() -> Result<Self, ProviderError> {
        Self::new().await
    }
}

impl ResourceProvider for ClusterProvider {
    async fn list(&self, resource_type: &ResourceType) -> Result<Vec<Resource>, ProviderError> {
        let api_resource = self.api_resource(resource_type).await?;
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &api_resource);

        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| classify(resource_type, e))?;

        let mut resources = Vec::with_capacity(list.items.len());
        for item in list.items {
            match to_resource(item, &api_resource) {
                Ok(resource) => resources.push(resource),
                Err(reason) => {
                    log::warn!("Skipping undecodable {}: {}", resource_type, reason);
                }
            }
        }
        Ok(resources)
    }
}

impl FlagSource for ClusterProvider {
    async fn read_flag(&self, location: &AbortFlagLocation) -> Result<Option<String>, ProviderError> {
        let config_maps: Api<ConfigMap> =
            Api::namespaced(self.client.clone(), &location.config_map_namespace);

        let config_map = config_maps
            .get_opt(&location.config_map_name)
            .await
            .map_err(|e| ProviderError::FlagLookup {
                namespace: location.config_map_namespace.clone(),
                name: location.config_map_name.clone(),
                reason: e.to_string(),
            })?;

        Ok(config_map
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(&location.config_map_field)))
    }
}

/// The TLS stack needs a process-wide crypto provider; a second install is a no-op.
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// API errors (forbidden, not found, ...) only affect one type; anything
/// below the API layer means the cluster cannot be reached at all.
fn classify(resource_type: &ResourceType, error: kube::Error) -> ProviderError {
    match error {
        kube::Error::Api(_) | kube::Error::Discovery(_) => ProviderError::List {
            resource_type: resource_type.to_string(),
            reason: error.to_string(),
        },
        other => ProviderError::Unreachable(other.to_string()),
    }
}

/// List responses omit `apiVersion`/`kind` on items, so fill them from the
/// descriptor before decoding.
fn to_resource(object: DynamicObject, api_resource: &ApiResource) -> Result<Resource, String> {
    let mut value = serde_json::to_value(&object).map_err(|e| e.to_string())?;
    if let Value::Object(map) = &mut value {
        map.entry("apiVersion")
            .or_insert_with(|| Value::String(api_resource.api_version.clone()));
        map.entry("kind")
            .or_insert_with(|| Value::String(api_resource.kind.clone()));
    }
    Resource::from_json(value).map_err(|e| e.to_string())
}
