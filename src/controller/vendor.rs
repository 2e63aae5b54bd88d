//! Vendor classification of the managed cluster

use k8s_openapi::api::core::v1::Node;

use crate::crd::{CloudVendor, DistributionType, KubeVendor};

/// Classify the Kubernetes vendor from the version string
///
/// `distribution` takes precedence when the enterprise platform was
/// detected. AKS leaves no trace in the version string, so it is
/// recognised from the cloud vendor instead.
pub fn kube_vendor(
    version: &str,
    distribution: Option<DistributionType>,
    cloud: Option<CloudVendor>,
) -> KubeVendor {
    if distribution == Some(DistributionType::EnterprisePlatform) {
        return KubeVendor::OpenShift;
    }
    if version.contains("-eks-") {
        KubeVendor::EKS
    } else if version.contains("-gke.") {
        KubeVendor::GKE
    } else if version.contains("+IKS") {
        KubeVendor::IKS
    } else if cloud == Some(CloudVendor::Azure) {
        KubeVendor::AKS
    } else {
        KubeVendor::Other
    }
}

/// Classify the infrastructure provider from the nodes' `spec.providerID`
pub fn cloud_vendor(nodes: &[Node]) -> CloudVendor {
    let provider_id = nodes
        .iter()
        .filter_map(|n| n.spec.as_ref().and_then(|s| s.provider_id.as_deref()))
        .find(|id| !id.is_empty());

    let Some(provider_id) = provider_id else {
        return CloudVendor::Other;
    };

    match provider_id.split_once("://").map(|(scheme, _)| scheme) {
        Some("aws") => CloudVendor::Amazon,
        Some("gce") => CloudVendor::Google,
        Some("azure") => CloudVendor::Azure,
        Some("ibm") => CloudVendor::IBM,
        Some("vsphere") => CloudVendor::VSphere,
        Some("openstack") => CloudVendor::OpenStack,
        Some("baremetalhost") | Some("metal3") => CloudVendor::BareMetal,
        _ => CloudVendor::Other,
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::NodeSpec;

    use super::*;

    fn node_with_provider(id: &str) -> Node {
        Node {
            spec: Some(NodeSpec {
                provider_id: Some(id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_kube_vendor_from_version() {
        assert_eq!(kube_vendor("v1.27.8-eks-8cb36c9", None, None), KubeVendor::EKS);
        assert_eq!(kube_vendor("v1.28.3-gke.1286000", None, None), KubeVendor::GKE);
        assert_eq!(kube_vendor("v1.18.10+IKS", None, None), KubeVendor::IKS);
        assert_eq!(
            kube_vendor("v1.28.3", None, Some(CloudVendor::Azure)),
            KubeVendor::AKS
        );
        assert_eq!(kube_vendor("v1.30.2", None, None), KubeVendor::Other);
        assert_eq!(
            kube_vendor(
                "v1.18.3+6c42de8",
                Some(DistributionType::EnterprisePlatform),
                Some(CloudVendor::Amazon)
            ),
            KubeVendor::OpenShift
        );
    }

    #[test]
    fn test_cloud_vendor_from_provider_id() {
        let cases = [
            ("aws:///us-east-1a/i-0abc", CloudVendor::Amazon),
            ("gce://project/us-central1-a/node", CloudVendor::Google),
            ("azure:///subscriptions/x/vm", CloudVendor::Azure),
            ("ibm://account///cluster/worker", CloudVendor::IBM),
            ("vsphere://4230-aaaa", CloudVendor::VSphere),
            ("openstack:///uuid", CloudVendor::OpenStack),
            ("kind://docker/kind/kind-control-plane", CloudVendor::Other),
        ];
        for (id, expected) in cases {
            assert_eq!(cloud_vendor(&[node_with_provider(id)]), expected, "{id}");
        }
        assert_eq!(cloud_vendor(&[]), CloudVendor::Other);
        assert_eq!(cloud_vendor(&[Node::default()]), CloudVendor::Other);
    }
}
