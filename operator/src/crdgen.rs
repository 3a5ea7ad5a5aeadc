use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    println!("---");
    print!("{}", serde_yaml::to_string(&common::Jaeger::crd())?);
    Ok(())
}
