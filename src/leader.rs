//! Lease based leader election
//!
//! Only the replica holding the lease reconciles; the others keep their
//! watches warm and requeue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{info, warn};

pub const LEASE_NAME: &str = "clusterinfo-agent-leader";
pub const LEASE_DURATION_SECS: i32 = 15;
pub const RENEW_INTERVAL: Duration = Duration::from_secs(10);
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Identity of this replica: `HOSTNAME`, then the OS host name
pub fn holder_identity() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string())
    })
}

/// Whether the lease described by `spec` may be taken over at `now`
///
/// A lease that was never renewed counts as expired.
pub fn lease_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    spec.and_then(|s| s.renew_time.as_ref())
        .map(|renew| {
            let duration = spec
                .and_then(|s| s.lease_duration_seconds)
                .unwrap_or(LEASE_DURATION_SECS);
            now > renew.0 + chrono::Duration::seconds(duration as i64)
        })
        .unwrap_or(true)
}

/// Keep trying to acquire or renew the lease, publishing the result in
/// `is_leader`. Never returns.
pub async fn run_leader_election(
    client: Client,
    namespace: &str,
    identity: &str,
    is_leader: Arc<AtomicBool>,
) {
    let leases: Api<Lease> = Api::namespaced(client, namespace);

    loop {
        match try_acquire_or_renew(&leases, namespace, identity).await {
            Ok(true) => {
                if !is_leader.load(Ordering::Relaxed) {
                    info!("Acquired leadership for lease {}", LEASE_NAME);
                }
                is_leader.store(true, Ordering::Relaxed);
                tokio::time::sleep(RENEW_INTERVAL).await;
            }
            Ok(false) => {
                if is_leader.load(Ordering::Relaxed) {
                    warn!("Lost leadership for lease {}", LEASE_NAME);
                }
                is_leader.store(false, Ordering::Relaxed);
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                warn!("Leader election error: {:?}", e);
                is_leader.store(false, Ordering::Relaxed);
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

async fn try_acquire_or_renew(
    leases: &Api<Lease>,
    namespace: &str,
    identity: &str,
) -> Result<bool, kube::Error> {
    let now = Utc::now();

    let Some(existing) = leases.get_opt(LEASE_NAME).await? else {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(LEASE_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(identity.to_string()),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_duration_seconds: Some(LEASE_DURATION_SECS),
                ..Default::default()
            }),
        };
        // Another replica created it first
        return match leases.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!("Created lease {} with holder {}", LEASE_NAME, identity);
                Ok(true)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
            Err(e) => Err(e),
        };
    };

    let spec = existing.spec.as_ref();
    let current_holder = spec.and_then(|s| s.holder_identity.as_deref());

    let patch = if current_holder == Some(identity) {
        serde_json::json!({
            "spec": {
                "renewTime": MicroTime(now),
                "leaseDurationSeconds": LEASE_DURATION_SECS,
            }
        })
    } else if lease_expired(spec, now) {
        info!("Lease held by {:?} has expired, taking over", current_holder);
        takeover_patch(existing.metadata.resource_version.as_deref(), identity, now)
    } else {
        return Ok(false);
    };

    match leases
        .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(true),
        // Someone else renewed or took over since our read
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
        Err(e) => Err(e),
    }
}

/// Merge patch claiming an expired lease
///
/// Carries the resourceVersion that was read, so of two replicas racing
/// for the same expired lease only the first write is accepted.
fn takeover_patch(
    resource_version: Option<&str>,
    identity: &str,
    now: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "metadata": { "resourceVersion": resource_version },
        "spec": {
            "holderIdentity": identity,
            "acquireTime": MicroTime(now),
            "renewTime": MicroTime(now),
            "leaseDurationSeconds": LEASE_DURATION_SECS,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(renewed_secs_ago: i64, duration: Option<i32>) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some("other".to_string()),
            renew_time: Some(MicroTime(
                Utc::now() - chrono::Duration::seconds(renewed_secs_ago),
            )),
            lease_duration_seconds: duration,
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_lease_is_held() {
        assert!(!lease_expired(Some(&spec(1, Some(15))), Utc::now()));
    }

    #[test]
    fn test_stale_lease_expires() {
        assert!(lease_expired(Some(&spec(60, Some(15))), Utc::now()));
    }

    #[test]
    fn test_default_duration_applies() {
        assert!(!lease_expired(Some(&spec(5, None)), Utc::now()));
        assert!(lease_expired(Some(&spec(30, None)), Utc::now()));
    }

    #[test]
    fn test_never_renewed_lease_is_expired() {
        assert!(lease_expired(None, Utc::now()));
        assert!(lease_expired(Some(&LeaseSpec::default()), Utc::now()));
    }

    #[test]
    fn test_takeover_is_conditional_on_read_version() {
        let patch = takeover_patch(Some("4711"), "replica-b", Utc::now());

        assert_eq!(patch["metadata"]["resourceVersion"], "4711");
        assert_eq!(patch["spec"]["holderIdentity"], "replica-b");
        assert_eq!(patch["spec"]["leaseDurationSeconds"], LEASE_DURATION_SECS);
        assert_eq!(patch["spec"]["acquireTime"], patch["spec"]["renewTime"]);
    }
}
