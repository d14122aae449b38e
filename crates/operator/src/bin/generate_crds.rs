use kube::CustomResourceExt;
use workflow_operator::crd::Workflow;

fn main() -> anyhow::Result<()> {
    println!("---");
    println!("# Workflow CRD");
    println!("{}", serde_yaml::to_string(&Workflow::crd())?);
    Ok(())
}
