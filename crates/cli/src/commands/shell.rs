use anyhow::Context;
use clap::Args;
use testbed_ops::Testbed;

#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Node index.
    pub node: usize,

    /// Shell to launch.
    #[arg(long, env = "SHELL", hide_env_values = true)]
    pub shell: Option<String>,
}

pub fn run(testbed: &Testbed, args: ShellArgs) -> anyhow::Result<()> {
    let launch = testbed.shell(args.node, args.shell)?;
    let err = launch.exec();
    Err(err)
        .with_context(|| format!("failed to exec {}", launch.program.display()))
}
