//! Prints the CRD manifests for every Tinkerbell resource the onboarding manager uses.

use crds::{Hardware, Template, Workflow};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in [Workflow::crd(), Template::crd(), Hardware::crd()] {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
