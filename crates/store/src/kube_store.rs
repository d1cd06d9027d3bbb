//! Kubernetes-backed store over `Api<DynamicObject>`.

use anyhow::Result;
use kube::{
    api::{Api, DeleteParams, PostParams},
    core::DynamicObject,
    discovery::{self, Scope},
    Client,
};
use operand_core::{ObjectRef, StoreError, Verb};
use tracing::debug;

use crate::{target_of, ObjectStore};

pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from the current kube context or in-cluster config.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Resolve the API resource for the target's GVK and scope the handle.
    async fn api_for(&self, verb: Verb, target: &ObjectRef) -> Result<Api<DynamicObject>, StoreError> {
        let gvk = target.gvk();
        let (ar, caps) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|e| StoreError::backend(verb, target, e))?;
        if matches!(caps.scope, Scope::Namespaced) {
            match target.namespace.as_deref() {
                Some(ns) => Ok(Api::namespaced_with(self.client.clone(), ns, &ar)),
                None => Err(StoreError::backend(verb, target, "namespace required for namespaced kind")),
            }
        } else {
            Ok(Api::all_with(self.client.clone(), &ar))
        }
    }
}

fn map_kube_err(verb: Verb, target: &ObjectRef, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(target.clone()),
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(target.clone())
        }
        kube::Error::Api(ae) if ae.code == 409 => {
            StoreError::Conflict { verb, target: target.clone(), message: ae.message }
        }
        other => StoreError::backend(verb, target, other),
    }
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, target: &ObjectRef) -> Result<DynamicObject, StoreError> {
        let api = self.api_for(Verb::Get, target).await?;
        api.get(&target.name).await.map_err(|e| map_kube_err(Verb::Get, target, e))
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let target = target_of(Verb::Create, obj)?;
        let api = self.api_for(Verb::Create, &target).await?;
        let created = api
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_err(Verb::Create, &target, e))?;
        debug!(%target, "kube: created");
        Ok(created)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let target = target_of(Verb::Update, obj)?;
        let api = self.api_for(Verb::Update, &target).await?;
        let updated = api
            .replace(&target.name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_err(Verb::Update, &target, e))?;
        debug!(%target, generation = ?updated.metadata.generation, "kube: replaced");
        Ok(updated)
    }

    async fn delete(&self, target: &ObjectRef) -> Result<(), StoreError> {
        let api = self.api_for(Verb::Delete, target).await?;
        // Background propagation so dependants (e.g. a Job's pods) go with it.
        api.delete(&target.name, &DeleteParams::background())
            .await
            .map_err(|e| map_kube_err(Verb::Delete, target, e))?;
        debug!(%target, "kube: delete issued");
        Ok(())
    }
}
