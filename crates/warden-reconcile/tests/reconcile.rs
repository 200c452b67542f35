//! Reconcile driver scenarios against an in-memory store
//!
//! The store imitates the API server behaviors the comparator must tolerate:
//! it assigns cluster IPs, fills in defaulted fields, bumps resourceVersion
//! on every write, and rejects updates carrying a stale resourceVersion.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::error::ErrorResponse;
use kube::runtime::controller::Action;
use serde_json::json;
use warden_common::crd::{upsert_condition, Condition, ConditionStatus, SchedulingSpec};
use warden_common::kube_utils::{annotation, object_meta, set_annotation, set_label};
use warden_common::{Error, ReconcileConfig};
use warden_reconcile::fingerprint::stamp_pod_template;
use warden_reconcile::{
    Fingerprint, ManagedResource, Outcome, Reconciler, ResourceId, ResourceStore, StatusReporter,
};

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
struct InMemoryStore {
    objects: Mutex<BTreeMap<ResourceId, ManagedResource>>,
    next_ip: Mutex<u8>,
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

impl InMemoryStore {
    fn snapshot(&self, id: &ResourceId) -> Option<ManagedResource> {
        self.objects.lock().unwrap().get(id).cloned()
    }

    /// Edit a stored object out of band, as a cluster operator would
    fn edit(&self, id: &ResourceId, f: impl FnOnce(&mut ManagedResource)) {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(id).expect("object exists");
        f(obj);
        bump_version(obj);
    }

    fn apply_defaults(&self, obj: &mut ManagedResource, previous: Option<&ManagedResource>) {
        match obj {
            ManagedResource::Service(svc) => {
                let spec = svc.spec.get_or_insert_with(Default::default);
                let assigned = match previous {
                    Some(ManagedResource::Service(prev)) => {
                        prev.spec.as_ref().and_then(|s| s.cluster_ip.clone())
                    }
                    _ => None,
                };
                let ip = spec.cluster_ip.clone().or(assigned).unwrap_or_else(|| {
                    let mut next = self.next_ip.lock().unwrap();
                    *next += 1;
                    format!("10.96.0.{next}")
                });
                spec.cluster_ips = Some(vec![ip.clone()]);
                spec.cluster_ip = Some(ip);
                spec.type_.get_or_insert_with(|| "ClusterIP".to_string());
                spec.session_affinity.get_or_insert_with(|| "None".to_string());
                for port in spec.ports.iter_mut().flatten() {
                    port.protocol.get_or_insert_with(|| "TCP".to_string());
                    if port.target_port.is_none() {
                        port.target_port = Some(IntOrString::Int(port.port));
                    }
                }
            }
            ManagedResource::DaemonSet(ds) => {
                if let Some(pod) = ds
                    .spec
                    .as_mut()
                    .and_then(|s| s.template.spec.as_mut())
                {
                    pod.dns_policy.get_or_insert_with(|| "ClusterFirst".to_string());
                    pod.restart_policy.get_or_insert_with(|| "Always".to_string());
                    for c in &mut pod.containers {
                        c.termination_message_path
                            .get_or_insert_with(|| "/dev/termination-log".to_string());
                    }
                }
            }
            _ => {}
        }
    }
}

fn bump_version(obj: &mut ManagedResource) {
    let meta = obj.meta_mut();
    let next = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    meta.resource_version = Some(next.to_string());
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<ManagedResource>, Error> {
        Ok(self.snapshot(id))
    }

    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, Error> {
        let id = resource.id();
        if self.snapshot(&id).is_some() {
            return Err(api_error(409, "AlreadyExists", format!("{id} already exists")));
        }
        let mut obj = resource.clone();
        self.apply_defaults(&mut obj, None);
        obj.meta_mut().resource_version = None;
        bump_version(&mut obj);
        self.objects.lock().unwrap().insert(id, obj.clone());
        Ok(obj)
    }

    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, Error> {
        let id = resource.id();
        let Some(current) = self.snapshot(&id) else {
            return Err(api_error(404, "NotFound", format!("{id} not found")));
        };
        if resource.meta().resource_version != current.meta().resource_version {
            return Err(api_error(
                409,
                "Conflict",
                format!("{id}: the object has been modified"),
            ));
        }
        let mut obj = resource.clone();
        self.apply_defaults(&mut obj, Some(&current));
        bump_version(&mut obj);
        self.objects.lock().unwrap().insert(id, obj.clone());
        Ok(obj)
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), Error> {
        match self.objects.lock().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(api_error(404, "NotFound", format!("{id} not found"))),
        }
    }
}

#[derive(Default)]
struct RecordingStatus {
    conditions: Mutex<Vec<Condition>>,
}

impl RecordingStatus {
    fn conditions(&self) -> Vec<Condition> {
        self.conditions.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingStatus {
    async fn add_condition(&self, condition: Condition) -> Result<(), Error> {
        upsert_condition(&mut self.conditions.lock().unwrap(), condition);
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn harness() -> (Arc<InMemoryStore>, Arc<RecordingStatus>, Reconciler) {
    let store = Arc::new(InMemoryStore::default());
    let status = Arc::new(RecordingStatus::default());
    let reconciler = Reconciler::new(store.clone(), status.clone(), &ReconcileConfig::default());
    (store, status, reconciler)
}

fn spire_server_service(port: i32) -> ManagedResource {
    let mut metadata = object_meta("spire-server", Some("zero-trust"));
    set_label(&mut metadata, "app.kubernetes.io/name", "spire-server");
    Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                "app.kubernetes.io/name".to_string(),
                "spire-server".to_string(),
            )])),
            ports: Some(vec![ServicePort {
                name: Some("grpc".to_string()),
                port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
    .into()
}

fn spire_agent(agent_config: &BTreeMap<String, String>) -> ManagedResource {
    let mut ds: DaemonSet = serde_json::from_value(json!({
        "metadata": { "name": "spire-agent", "namespace": "zero-trust" },
        "spec": {
            "selector": { "matchLabels": { "app": "spire-agent" } },
            "template": {
                "metadata": { "labels": { "app": "spire-agent" } },
                "spec": {
                    "serviceAccountName": "spire-agent",
                    "containers": [{
                        "name": "spire-agent",
                        "image": "ghcr.io/spiffe/spire-agent:1.9.6",
                        "args": ["-config", "/run/spire/config/agent.conf"]
                    }]
                }
            }
        }
    }))
    .unwrap();
    stamp_pod_template(
        &mut ds.spec.as_mut().unwrap().template,
        &ReconcileConfig::default(),
        &agent_config.fingerprint(),
    );
    ds.into()
}

fn service_id() -> ResourceId {
    ResourceId::new("Service", Some("zero-trust"), "spire-server")
}

fn stored_port(store: &InMemoryStore) -> i32 {
    match store.snapshot(&service_id()) {
        Some(ManagedResource::Service(svc)) => svc.spec.unwrap().ports.unwrap()[0].port,
        other => panic!("expected a stored Service, got {other:?}"),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

/// Story: the store assigns a cluster IP and other defaults on create; the
/// next passes see no drift until the desired port actually changes
#[tokio::test]
async fn story_store_defaults_do_not_cause_update_loops() {
    let (store, status, reconciler) = harness();
    let desired = spire_server_service(8081);

    assert_eq!(reconciler.reconcile(&desired, None).await.unwrap(), Outcome::Created);
    for _ in 0..3 {
        assert_eq!(reconciler.reconcile(&desired, None).await.unwrap(), Outcome::Unchanged);
    }

    let changed = spire_server_service(8443);
    assert_eq!(reconciler.reconcile(&changed, None).await.unwrap(), Outcome::Updated);
    assert_eq!(stored_port(&store), 8443);
    match store.snapshot(&service_id()) {
        Some(ManagedResource::Service(svc)) => {
            assert_eq!(svc.spec.unwrap().cluster_ip.as_deref(), Some("10.96.0.1"));
            assert_eq!(svc.metadata.resource_version.as_deref(), Some("2"));
        }
        other => panic!("expected a stored Service, got {other:?}"),
    }
    assert_eq!(reconciler.reconcile(&changed, None).await.unwrap(), Outcome::Unchanged);

    let conditions = status.conditions();
    assert!(conditions
        .iter()
        .all(|c| c.type_ == "ConfigurationValid" && c.status == ConditionStatus::True));
}

/// Story: an operator hand-edits the Service and marks it create-only; the
/// controller stops writing for the rest of its life, even after the
/// annotation is removed again
#[tokio::test]
async fn story_create_only_survives_annotation_removal() {
    let (store, _status, reconciler) = harness();
    let desired = spire_server_service(8081);
    reconciler.reconcile(&desired, None).await.unwrap();

    store.edit(&service_id(), |obj| {
        if let ManagedResource::Service(svc) = obj {
            svc.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].port = 9999;
        }
        set_annotation(obj.meta_mut(), "warden.spiffe.io/create-only", "true");
    });

    let outcome = reconciler.reconcile(&desired, None).await.unwrap();
    assert_eq!(outcome, Outcome::SkippedCreateOnly { drifted: true });
    assert!(reconciler.latch().is_tripped());

    store.edit(&service_id(), |obj| {
        if let Some(annotations) = obj.meta_mut().annotations.as_mut() {
            annotations.remove("warden.spiffe.io/create-only");
        }
    });

    let outcome = reconciler.reconcile(&desired, None).await.unwrap();
    assert_eq!(outcome, Outcome::SkippedCreateOnly { drifted: true });
    assert_eq!(stored_port(&store), 9999);

    reconciler.remove(&service_id()).await.unwrap();
    assert!(store.snapshot(&service_id()).is_some());
}

/// Story: the agent's configuration changes without any DaemonSet field
/// changing; the fingerprint annotation rolls the pods
#[tokio::test]
async fn story_config_fingerprint_rolls_daemonset() {
    let (store, _status, reconciler) = harness();
    let id = ResourceId::new("DaemonSet", Some("zero-trust"), "spire-agent");

    let v1 = BTreeMap::from([("agent.conf".to_string(), "log_level = \"INFO\"".to_string())]);
    let reformatted =
        BTreeMap::from([("agent.conf".to_string(), "  log_level = \"INFO\"\n".to_string())]);
    let v2 = BTreeMap::from([("agent.conf".to_string(), "log_level = \"DEBUG\"".to_string())]);

    assert_eq!(reconciler.reconcile(&spire_agent(&v1), None).await.unwrap(), Outcome::Created);
    assert_eq!(
        reconciler.reconcile(&spire_agent(&reformatted), None).await.unwrap(),
        Outcome::Unchanged
    );
    assert_eq!(reconciler.reconcile(&spire_agent(&v2), None).await.unwrap(), Outcome::Updated);

    let Some(ManagedResource::DaemonSet(ds)) = store.snapshot(&id) else {
        panic!("expected a stored DaemonSet");
    };
    let template_meta = ds.spec.unwrap().template.metadata.unwrap();
    assert_eq!(
        annotation(&template_meta, "warden.spiffe.io/config-hash"),
        Some(v2.fingerprint().as_str())
    );
}

/// Story: a user's scheduling config is wrong in two places; both show up on
/// status, nothing is written, and the controller waits for a spec change
#[tokio::test]
async fn story_invalid_scheduling_blocks_writes() {
    let (store, status, reconciler) = harness();
    let scheduling: SchedulingSpec = serde_json::from_value(json!({
        "tolerations": [{ "operator": "Exists", "effect": "NoSchedule", "tolerationSeconds": 60 }],
        "resources": { "requests": { "memory": "1Gi" }, "limits": { "memory": "512Mi" } }
    }))
    .unwrap();

    let err = reconciler
        .reconcile(&spire_server_service(8081), Some(&scheduling))
        .await
        .unwrap_err();
    assert!(err.is_irrecoverable());
    assert_eq!(reconciler.error_policy(&err), Action::await_change());
    assert!(store.snapshot(&service_id()).is_none());

    let reasons: Vec<_> = status.conditions().into_iter().map(|c| c.reason).collect();
    assert_eq!(reasons, vec!["InvalidTolerations", "InvalidResources"]);
}

/// Story: another writer updates the object between read and write; the
/// conflict is retried on the next pass and then succeeds
#[tokio::test]
async fn story_conflict_is_retried() {
    struct RacingStore {
        inner: InMemoryStore,
        raced: Mutex<bool>,
    }

    #[async_trait]
    impl ResourceStore for RacingStore {
        async fn get(&self, id: &ResourceId) -> Result<Option<ManagedResource>, Error> {
            let observed = self.inner.get(id).await?;
            let mut raced = self.raced.lock().unwrap();
            if observed.is_some() && !*raced {
                *raced = true;
                self.inner.edit(id, |_| {});
            }
            Ok(observed)
        }
        async fn create(&self, r: &ManagedResource) -> Result<ManagedResource, Error> {
            self.inner.create(r).await
        }
        async fn update(&self, r: &ManagedResource) -> Result<ManagedResource, Error> {
            self.inner.update(r).await
        }
        async fn delete(&self, id: &ResourceId) -> Result<(), Error> {
            self.inner.delete(id).await
        }
    }

    let store = Arc::new(RacingStore {
        inner: InMemoryStore::default(),
        raced: Mutex::new(false),
    });
    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(RecordingStatus::default()),
        &ReconcileConfig::default(),
    );

    reconciler.reconcile(&spire_server_service(8081), None).await.unwrap();

    let changed = spire_server_service(8443);
    let err = reconciler.reconcile(&changed, None).await.unwrap_err();
    assert!(err.is_retry_required(), "{err}");
    assert_eq!(
        reconciler.error_policy(&err),
        Action::requeue(Duration::from_secs(30))
    );

    assert_eq!(reconciler.reconcile(&changed, None).await.unwrap(), Outcome::Updated);
}

#[tokio::test]
async fn test_remove_deletes_and_tolerates_missing() {
    let (store, _status, reconciler) = harness();
    reconciler.reconcile(&spire_server_service(8081), None).await.unwrap();

    reconciler.remove(&service_id()).await.unwrap();
    assert!(store.snapshot(&service_id()).is_none());
    reconciler.remove(&service_id()).await.unwrap();
}
