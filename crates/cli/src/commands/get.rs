use clap::Args;
use testbed_ops::Testbed;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Attribute to read (`id`).
    pub attribute: String,
    /// Node index.
    pub node: usize,
}

pub fn run(testbed: &Testbed, args: &GetArgs) -> anyhow::Result<()> {
    let value = testbed.get(&args.attribute, args.node)?;
    println!("{value}");
    Ok(())
}
