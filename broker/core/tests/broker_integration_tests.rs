// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end broker lifecycle tests against the in-memory store.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use volbroker_core::application::broker::{BrokerError, ExistingVolumeBroker, ServiceBroker};
use volbroker_core::application::catalog::StaticServiceCatalog;
use volbroker_core::application::mount_resolution::ResolutionError;
use volbroker_core::domain::binding::{
    BindDetails, BrokerKind, DeprovisionDetails, ProvisionDetails, Service, ServiceInstance,
    ServicePlan, UnbindDetails, UpdateDetails,
};
use volbroker_core::domain::mode::{AccessMode, ModeError};
use volbroker_core::domain::option_policy::OptionPolicy;
use volbroker_core::domain::option_value::OptionValue;
use volbroker_core::domain::options_merger::MergeError;
use volbroker_core::domain::repository::{BrokerStore, RepositoryError};
use volbroker_core::infrastructure::repositories::InMemoryBrokerStore;

const INSTANCE_ID: &str = "some-instance-id";

/// In-memory store that counts saves and can be told to fail them.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryBrokerStore,
    saves: AtomicUsize,
    fail_save: AtomicBool,
}

impl RecordingStore {
    fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn fail_saves(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerStore for RecordingStore {
    async fn restore(&self) -> Result<(), RepositoryError> {
        self.inner.restore().await
    }

    async fn save(&self) -> Result<(), RepositoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(RepositoryError::Io("disk full".to_string()));
        }
        self.inner.save().await
    }

    async fn create_instance_details(
        &self,
        id: &str,
        details: ServiceInstance,
    ) -> Result<(), RepositoryError> {
        self.inner.create_instance_details(id, details).await
    }

    async fn retrieve_instance_details(
        &self,
        id: &str,
    ) -> Result<ServiceInstance, RepositoryError> {
        self.inner.retrieve_instance_details(id).await
    }

    async fn delete_instance_details(&self, id: &str) -> Result<(), RepositoryError> {
        self.inner.delete_instance_details(id).await
    }

    async fn create_binding_details(
        &self,
        id: &str,
        details: BindDetails,
    ) -> Result<(), RepositoryError> {
        self.inner.create_binding_details(id, details).await
    }

    async fn retrieve_binding_details(&self, id: &str) -> Result<BindDetails, RepositoryError> {
        self.inner.retrieve_binding_details(id).await
    }

    async fn delete_binding_details(&self, id: &str) -> Result<(), RepositoryError> {
        self.inner.delete_binding_details(id).await
    }

    async fn is_instance_conflict(&self, id: &str, details: &ServiceInstance) -> bool {
        self.inner.is_instance_conflict(id, details).await
    }

    async fn is_binding_conflict(&self, id: &str, details: &BindDetails) -> bool {
        self.inner.is_binding_conflict(id, details).await
    }
}

fn existing_plan() -> ServicePlan {
    ServicePlan {
        id: "Existing".to_string(),
        name: "Existing".to_string(),
        description: "A preexisting filesystem".to_string(),
    }
}

fn service(id: &str, name: &str, tags: &[&str]) -> Service {
    Service {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("Existing {name} volumes"),
        bindable: true,
        plan_updatable: false,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        requires: vec!["volume_mount".to_string()],
        plans: vec![existing_plan()],
    }
}

fn nfs_policy(alias_readonly: bool) -> OptionPolicy {
    let builder = OptionPolicy::builder()
        .allow([
            "allow_other", "allow_root", "default_permissions", "fusenfs_gid", "fusenfs_uid",
            "gid", "mount", "multithread", "password", "sloppy_mount", "source", "uid",
            "username", "version", "ro", "readonly",
        ])
        .default_option("sloppy_mount", "false")
        .alias("share", "source");
    if alias_readonly {
        builder.alias("readonly", "ro").build()
    } else {
        builder.build()
    }
}

fn smb_policy() -> OptionPolicy {
    OptionPolicy::builder()
        .allow([
            "dir_mode", "domain", "file_mode", "gid", "mount", "password", "ro", "sec", "source",
            "uid", "username",
        ])
        .alias("readonly", "ro")
        .alias("share", "source")
        .build()
}

async fn broker_with(
    kind: BrokerKind,
    policy: OptionPolicy,
) -> (ExistingVolumeBroker, Arc<RecordingStore>) {
    let catalog = match kind {
        BrokerKind::Nfs => StaticServiceCatalog::new(vec![
            service("nfs-service-id", "nfs", &["nfs"]),
            service("nfs-experimental-service-id", "nfs-experimental", &["nfs", "experimental"]),
        ]),
        BrokerKind::Smb => {
            StaticServiceCatalog::new(vec![service("smb-service-id", "smb", &["smb"])])
        }
    };
    let store = Arc::new(RecordingStore::default());
    let broker = ExistingVolumeBroker::new(kind, Arc::new(catalog), store.clone(), policy).await;
    (broker, store)
}

fn provision_details(service_id: &str, parameters: serde_json::Value) -> ProvisionDetails {
    ProvisionDetails {
        service_id: service_id.to_string(),
        plan_id: "Existing".to_string(),
        organization_guid: "org".to_string(),
        space_guid: "space".to_string(),
        raw_parameters: parameters.to_string(),
    }
}

fn bind_details(raw_parameters: &str) -> BindDetails {
    BindDetails {
        app_guid: "guid".to_string(),
        plan_id: "Existing".to_string(),
        service_id: "nfs-service-id".to_string(),
        raw_parameters: raw_parameters.to_string(),
    }
}

async fn provisioned_nfs(
    fingerprint: serde_json::Value,
) -> (ExistingVolumeBroker, Arc<RecordingStore>) {
    let (broker, store) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    broker
        .provision(INSTANCE_ID, provision_details("nfs-service-id", fingerprint), false)
        .await
        .unwrap();
    (broker, store)
}

async fn provisioned_smb(
    fingerprint: serde_json::Value,
) -> (ExistingVolumeBroker, Arc<RecordingStore>) {
    let (broker, store) = broker_with(BrokerKind::Smb, smb_policy()).await;
    broker
        .provision(INSTANCE_ID, provision_details("smb-service-id", fingerprint), false)
        .await
        .unwrap();
    (broker, store)
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn test_services_returns_catalog() {
    let (broker, _) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    let services = broker.services().await;

    assert_eq!(services.len(), 2);
    assert_eq!(services[0].id, "nfs-service-id");
    assert!(services[0].bindable);
    assert!(!services[0].plan_updatable);
    assert_eq!(services[0].plans[0].id, "Existing");
    assert!(services[1].has_tag("experimental"));
}

// ============================================================================
// Provision
// ============================================================================

#[tokio::test]
async fn test_provision_is_synchronous_and_saves() {
    let (broker, store) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    let spec = broker
        .provision(
            INSTANCE_ID,
            provision_details("nfs-service-id", json!({"share": "server/some-share"})),
            false,
        )
        .await
        .unwrap();

    assert!(!spec.is_async);
    assert!(store.save_count() > 0);
}

#[tokio::test]
async fn test_provision_keeps_raw_fingerprint_values() {
    let (_, store) =
        provisioned_nfs(json!({"share": "server/some-share", "uid": "1", "gid": 2})).await;
    let instance = store.retrieve_instance_details(INSTANCE_ID).await.unwrap();

    assert_eq!(instance.service_fingerprint["uid"], OptionValue::from("1"));
    assert_eq!(instance.service_fingerprint["gid"], OptionValue::Integer(2));
}

#[tokio::test]
async fn test_provision_rejects_invalid_json() {
    let (broker, _) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    let mut details = provision_details("nfs-service-id", json!({}));
    details.raw_parameters = "{ bogus".to_string();

    let err = broker.provision(INSTANCE_ID, details, false).await.unwrap_err();
    assert!(matches!(err, BrokerError::RawParamsInvalid));
}

#[tokio::test]
async fn test_provision_requires_share() {
    let (broker, _) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    let err = broker
        .provision(INSTANCE_ID, provision_details("nfs-service-id", json!({"uid": "1"})), false)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "config requires a \"share\" key");
}

#[tokio::test]
async fn test_nfs_provision_rejects_colon_after_server() {
    let (broker, _) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    let err = broker
        .provision(
            INSTANCE_ID,
            provision_details("nfs-service-id", json!({"share": "server:/some-share"})),
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "syntax error for share: no colon allowed after server");

    broker
        .provision(
            INSTANCE_ID,
            provision_details("nfs-service-id", json!({"share": "server/some:share"})),
            false,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_smb_provision_accepts_colon_share() {
    let (broker, _) = broker_with(BrokerKind::Smb, smb_policy()).await;
    broker
        .provision(
            INSTANCE_ID,
            provision_details("smb-service-id", json!({"share": "server:/some-share"})),
            false,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_provision_conflicts() {
    let (broker, _) = provisioned_nfs(json!({"share": "server/some-share"})).await;

    broker
        .provision(
            INSTANCE_ID,
            provision_details("nfs-service-id", json!({"share": "server/some-share"})),
            false,
        )
        .await
        .unwrap();

    let err = broker
        .provision(
            INSTANCE_ID,
            provision_details("nfs-service-id", json!({"share": "server/other"})),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InstanceAlreadyExists));
}

#[tokio::test]
async fn test_provision_save_failure_is_reported() {
    let (broker, store) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    store.fail_saves();

    let err = broker
        .provision(
            INSTANCE_ID,
            provision_details("nfs-service-id", json!({"share": "server/x"})),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Store(RepositoryError::Io(_))));
}

// ============================================================================
// Deprovision / LastOperation / Update
// ============================================================================

#[tokio::test]
async fn test_deprovision_missing_instance() {
    let (broker, _) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    let err = broker
        .deprovision(INSTANCE_ID, DeprovisionDetails::default(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InstanceDoesNotExist));
}

#[tokio::test]
async fn test_deprovision_existing_instance() {
    let (broker, store) = provisioned_nfs(json!({"share": "server/x"})).await;
    let before = store.save_count();

    let spec = broker
        .deprovision(INSTANCE_ID, DeprovisionDetails::default(), false)
        .await
        .unwrap();
    assert!(!spec.is_async);
    assert_eq!(spec.operation_data, "deprovision");
    assert_eq!(store.save_count(), before + 1);
    assert!(store.retrieve_instance_details(INSTANCE_ID).await.is_err());
}

#[tokio::test]
async fn test_last_operation_and_update_are_unsupported() {
    let (broker, _) = provisioned_nfs(json!({"share": "server/x"})).await;

    let err = broker.last_operation(INSTANCE_ID, "deprovision").await.unwrap_err();
    assert_eq!(err.to_string(), "unrecognized operationData");

    let err = broker
        .update(INSTANCE_ID, UpdateDetails::default(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::UpdateNotSupported));
}

// ============================================================================
// Bind (NFS)
// ============================================================================

#[tokio::test]
async fn test_nfs_bind_passes_share_and_options() {
    let (broker, store) = provisioned_nfs(json!({"share": "server/some-share"})).await;
    let before = store.save_count();
    let params = json!({
        "kerberosPrincipal": "principal name",
        "kerberosKeytab": "some keytab data",
        "uid": "1234",
        "gid": "5678",
    });

    let binding = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(&params.to_string()))
        .await
        .unwrap();
    let mount = &binding.volume_mounts[0];

    assert_eq!(mount.device.mount_config["source"], "nfs://server/some-share");
    assert_eq!(mount.device.mount_config["uid"], "1234");
    assert_eq!(mount.device.mount_config["gid"], "5678");
    assert!(!mount.device.mount_config.contains_key("kerberosPrincipal"));
    assert_eq!(mount.container_dir, "/var/vcap/data/some-instance-id");
    assert_eq!(mount.mode, AccessMode::ReadWrite);
    assert_eq!(mount.driver, "nfsv3driver");
    assert!(mount.device.volume_id.contains(INSTANCE_ID));
    assert_eq!(serde_json::to_value(&binding).unwrap()["credentials"], json!({}));
    assert_eq!(store.save_count(), before + 1);
}

#[tokio::test]
async fn test_nfs_bind_container_path_override() {
    let (broker, _) = provisioned_nfs(json!({"share": "server/some-share"})).await;
    let binding = broker
        .bind(
            INSTANCE_ID,
            "binding-id",
            bind_details(r#"{"mount":"/var/vcap/otherdir/something"}"#),
        )
        .await
        .unwrap();
    assert_eq!(binding.volume_mounts[0].container_dir, "/var/vcap/otherdir/something");
}

#[tokio::test]
async fn test_nfs_bind_rejects_empty_readonly() {
    let (broker, store) = provisioned_nfs(json!({"share": "server/some-share"})).await;
    let err = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(r#"{"readonly":""}"#))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), r#"Invalid ro parameter value: """#);
    assert!(matches!(
        err,
        BrokerError::Resolution(ResolutionError::Mode(ModeError::InvalidReadOnly(_)))
    ));
    assert!(store.retrieve_binding_details("binding-id").await.is_err());
}

#[tokio::test]
async fn test_nfs_bind_readonly_under_alias() {
    let (broker, _) = provisioned_nfs(json!({"share": "server/some-share"})).await;
    let binding = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(r#"{"readonly":true}"#))
        .await
        .unwrap();

    assert_eq!(binding.volume_mounts[0].mode, AccessMode::ReadOnly);
    assert_eq!(binding.volume_mounts[0].device.mount_config["ro"], "true");
}

#[tokio::test]
async fn test_nfs_bind_readonly_without_alias() {
    let (broker, _) = broker_with(BrokerKind::Nfs, nfs_policy(false)).await;
    broker
        .provision(
            INSTANCE_ID,
            provision_details("nfs-service-id", json!({"share": "server/x"})),
            false,
        )
        .await
        .unwrap();

    let binding = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(r#"{"readonly":true}"#))
        .await
        .unwrap();
    assert_eq!(binding.volume_mounts[0].mode, AccessMode::ReadOnly);
    assert_eq!(binding.volume_mounts[0].device.mount_config["readonly"], "true");
}

#[tokio::test]
async fn test_nfs_bind_values_override_instance_values() {
    let (broker, _) = provisioned_nfs(json!({"share": "server/x", "uid": "1", "gid": 2})).await;

    let binding = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(r#"{"uid":"1234","gid":"5678"}"#))
        .await
        .unwrap();
    assert_eq!(binding.volume_mounts[0].device.mount_config["uid"], "1234");
    assert_eq!(binding.volume_mounts[0].device.mount_config["gid"], "5678");

    let binding = broker
        .bind(INSTANCE_ID, "binding-id-2", bind_details(""))
        .await
        .unwrap();
    assert_eq!(binding.volume_mounts[0].device.mount_config["uid"], "1");
    assert_eq!(binding.volume_mounts[0].device.mount_config["gid"], "2");
}

#[tokio::test]
async fn test_experimental_service_marks_mount_config() {
    let (broker, _) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    broker
        .provision(
            INSTANCE_ID,
            provision_details(
                "nfs-experimental-service-id",
                json!({"share": "server/x", "version": "4.1"}),
            ),
            false,
        )
        .await
        .unwrap();

    let binding = broker.bind(INSTANCE_ID, "binding-id", bind_details("")).await.unwrap();
    let config = &binding.volume_mounts[0].device.mount_config;
    assert_eq!(config["experimental"], "true");
    assert_eq!(config["version"], "4.1");
}

#[tokio::test]
async fn test_bind_preconditions() {
    let (broker, _) = broker_with(BrokerKind::Nfs, nfs_policy(true)).await;
    let err = broker.bind(INSTANCE_ID, "binding-id", bind_details("")).await.unwrap_err();
    assert!(matches!(err, BrokerError::InstanceDoesNotExist));

    broker
        .provision(
            INSTANCE_ID,
            provision_details("nfs-service-id", json!({"share": "server/x"})),
            false,
        )
        .await
        .unwrap();

    let mut details = bind_details("");
    details.app_guid.clear();
    let err = broker.bind(INSTANCE_ID, "binding-id", details).await.unwrap_err();
    assert!(matches!(err, BrokerError::AppGuidNotProvided));

    let err = broker.bind(INSTANCE_ID, "binding-id", bind_details("{ nope")).await.unwrap_err();
    assert!(matches!(err, BrokerError::RawParamsInvalid));
}

#[tokio::test]
async fn test_bind_save_failure_is_reported() {
    let (broker, store) = provisioned_nfs(json!({"share": "server/x"})).await;
    store.fail_saves();

    let err = broker.bind(INSTANCE_ID, "binding-id", bind_details("")).await.unwrap_err();
    assert!(matches!(err, BrokerError::Store(_)));
}

// ============================================================================
// Bind (SMB)
// ============================================================================

#[tokio::test]
async fn test_smb_bind_passes_credentials_and_source() {
    let (broker, _) = provisioned_smb(json!({"share": "server:/some-share"})).await;
    let params = json!({
        "username": "some-username",
        "password": "some-password",
        "domain": "some-domain",
        "uid": "1234",
        "gid": "5678",
    });

    let binding = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(&params.to_string()))
        .await
        .unwrap();
    let config = &binding.volume_mounts[0].device.mount_config;

    assert_eq!(config["source"], "server:/some-share");
    assert_eq!(config["username"], "some-username");
    assert_eq!(config["password"], "some-password");
    assert_eq!(config["domain"], "some-domain");
    assert_eq!(config["uid"], "1234");
    assert_eq!(binding.volume_mounts[0].driver, "smbdriver");
}

#[tokio::test]
async fn test_smb_bind_over_instance_values() {
    let fingerprint = json!({
        "share": "server:/some-share",
        "domain": "some-instance-domain",
        "username": "some-instance-username",
        "password": "some-instance-password",
    });
    let (broker, _) = provisioned_smb(fingerprint).await;

    let binding = broker
        .bind(
            INSTANCE_ID,
            "binding-id",
            bind_details(
                &json!({
                    "domain": "some-bind-domain",
                    "username": "some-bind-username",
                    "password": "some-bind-password",
                })
                .to_string(),
            ),
        )
        .await
        .unwrap();
    let config = &binding.volume_mounts[0].device.mount_config;
    assert_eq!(config["domain"], "some-bind-domain");
    assert_eq!(config["username"], "some-bind-username");
    assert_eq!(config["password"], "some-bind-password");

    let binding = broker.bind(INSTANCE_ID, "binding-id-2", bind_details("")).await.unwrap();
    let config = &binding.volume_mounts[0].device.mount_config;
    assert_eq!(config["domain"], "some-instance-domain");
    assert_eq!(config["username"], "some-instance-username");
}

#[tokio::test]
async fn test_smb_bind_cannot_override_share() {
    let (broker, store) = provisioned_smb(json!({"share": "server:/some-share"})).await;
    let err = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(r#"{"share":"server:/some-other-share"}"#))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BrokerError::Resolution(ResolutionError::Merge(MergeError::ImmutableOption { .. }))
    ));
    assert!(store.retrieve_binding_details("binding-id").await.is_err());
}

#[tokio::test]
async fn test_smb_bind_stringifies_values() {
    let (broker, _) =
        provisioned_smb(json!({"share": "server:/some-share", "username": "u", "password": "p"}))
            .await;
    let binding = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(r#"{"username":123,"password":false}"#))
        .await
        .unwrap();
    let config = &binding.volume_mounts[0].device.mount_config;
    assert_eq!(config["username"], "123");
    assert_eq!(config["password"], "false");
}

#[tokio::test]
async fn test_smb_bind_empty_configuration_succeeds() {
    let (broker, _) = provisioned_smb(json!({"share": "server:/some-share"})).await;
    broker.bind(INSTANCE_ID, "binding-id", bind_details("{}")).await.unwrap();
}

#[tokio::test]
async fn test_smb_bind_null_configuration_succeeds() {
    let (broker, store) = provisioned_smb(json!({"share": "//h/s"})).await;
    let binding = broker
        .bind(INSTANCE_ID, "binding-id", bind_details("null"))
        .await
        .unwrap();

    assert_eq!(binding.volume_mounts[0].device.mount_config["source"], "//h/s");
    assert!(store.retrieve_binding_details("binding-id").await.is_ok());
}

#[tokio::test]
async fn test_binding_conflicts() {
    let (broker, _) = provisioned_smb(json!({"share": "server:/some-share"})).await;
    broker.bind(INSTANCE_ID, "binding-id", bind_details("")).await.unwrap();
    broker.bind(INSTANCE_ID, "binding-id", bind_details("")).await.unwrap();

    let mut other = bind_details("");
    other.app_guid = "other-guid".to_string();
    let err = broker.bind(INSTANCE_ID, "binding-id", other).await.unwrap_err();
    assert!(matches!(err, BrokerError::BindingAlreadyExists));
}

#[tokio::test]
async fn test_same_share_different_options_differ_in_volume_id() {
    let (broker, _) = provisioned_smb(json!({"share": "server:/some-share"})).await;
    let first = broker
        .bind(INSTANCE_ID, "binding-1", bind_details(r#"{"uid":"1000"}"#))
        .await
        .unwrap();
    let second = broker
        .bind(INSTANCE_ID, "binding-2", bind_details(r#"{"uid":"3000"}"#))
        .await
        .unwrap();

    assert_ne!(
        first.volume_mounts[0].device.volume_id,
        second.volume_mounts[0].device.volume_id
    );
}

#[tokio::test]
async fn test_disallowed_option_is_rejected() {
    let policy = OptionPolicy::builder().alias("readonly", "ro").alias("share", "source").build();
    let (broker, _) = broker_with(BrokerKind::Smb, policy).await;
    broker
        .provision(
            INSTANCE_ID,
            provision_details("smb-service-id", json!({"share": "server:/x"})),
            false,
        )
        .await
        .unwrap();

    let err = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(r#"{"allow_root":true}"#))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BrokerError::Resolution(ResolutionError::Merge(MergeError::NotAllowed(_)))
    ));
}

#[tokio::test]
async fn test_allowed_boolean_option_passes_through() {
    let policy = OptionPolicy::builder()
        .allow(["allow_root", "source"])
        .alias("readonly", "ro")
        .alias("share", "source")
        .build();
    let (broker, _) = broker_with(BrokerKind::Smb, policy).await;
    broker
        .provision(
            INSTANCE_ID,
            provision_details("smb-service-id", json!({"share": "server:/x"})),
            false,
        )
        .await
        .unwrap();

    let binding = broker
        .bind(INSTANCE_ID, "binding-id", bind_details(r#"{"allow_root":true}"#))
        .await
        .unwrap();
    assert_eq!(binding.volume_mounts[0].device.mount_config["allow_root"], "true");
}

// ============================================================================
// Unbind
// ============================================================================

#[tokio::test]
async fn test_unbind_lifecycle() {
    let (broker, store) = provisioned_smb(json!({"share": "server:/some-share"})).await;
    broker.bind(INSTANCE_ID, "binding-id", bind_details("")).await.unwrap();
    let before = store.save_count();

    broker
        .unbind(INSTANCE_ID, "binding-id", UnbindDetails::default())
        .await
        .unwrap();
    assert_eq!(store.save_count(), before + 1);

    let err = broker
        .unbind(INSTANCE_ID, "binding-id", UnbindDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::BindingDoesNotExist));

    let err = broker
        .unbind("unknown-instance", "binding-id", UnbindDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InstanceDoesNotExist));
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_state_survives_restart_via_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker-state.json");
    let catalog = Arc::new(StaticServiceCatalog::new(vec![service(
        "smb-service-id",
        "smb",
        &["smb"],
    )]));

    let store = Arc::new(InMemoryBrokerStore::with_snapshot(&path));
    let broker =
        ExistingVolumeBroker::new(BrokerKind::Smb, catalog.clone(), store, smb_policy()).await;
    broker
        .provision(
            INSTANCE_ID,
            provision_details("smb-service-id", json!({"share": "//server/x"})),
            false,
        )
        .await
        .unwrap();
    let first = broker.bind(INSTANCE_ID, "binding-id", bind_details("")).await.unwrap();

    let store = Arc::new(InMemoryBrokerStore::with_snapshot(&path));
    let restarted = ExistingVolumeBroker::new(BrokerKind::Smb, catalog, store, smb_policy()).await;
    let second = restarted.bind(INSTANCE_ID, "binding-id", bind_details("")).await.unwrap();

    assert_eq!(
        first.volume_mounts[0].device.volume_id,
        second.volume_mounts[0].device.volume_id
    );
}
