use clap::Args;
use testbed_ops::{StartedNode, Testbed};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Wait for every node to come online and find a peer.
    #[arg(long)]
    pub wait: bool,
}

fn print_started(started: &[StartedNode]) {
    for s in started {
        println!("Started daemon {}, pid = {}", s.node, s.pid);
    }
}

pub async fn start(testbed: &Testbed, args: &StartArgs) -> anyhow::Result<()> {
    let started = testbed.start(args.wait).await?;
    print_started(&started);
    Ok(())
}

pub async fn restart(testbed: &Testbed, args: &StartArgs) -> anyhow::Result<()> {
    let started = testbed.restart(args.wait).await?;
    print_started(&started);
    Ok(())
}

pub async fn stop(testbed: &Testbed) -> anyhow::Result<()> {
    let report = testbed.stop().await;
    for (node, err) in report.failures() {
        eprintln!("node {node}: {err}");
    }
    let failed = report.hard_failures().count();
    if failed > 0 {
        anyhow::bail!("{failed} node(s) failed to stop");
    }
    Ok(())
}
