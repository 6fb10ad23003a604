use clusterscan_operator::crd::ClusterScan;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    println!("---");
    println!("# ClusterScan CRD");
    println!("{}", serde_yaml::to_string(&ClusterScan::crd())?);
    Ok(())
}
