use clusterinfo_agent::crd::ManagedClusterInfo;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ManagedClusterInfo::crd())?);
    Ok(())
}
