use std::io::{BufRead, Write};
use std::path::Path;

use clap::Args;
use testbed_core::{Bootstrap, ClusterConfig, DEFAULT_PORT_START};
use testbed_ops::{Testbed, TestbedError};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Number of nodes to create.
    #[arg(short = 'n', long)]
    pub count: usize,

    /// Overwrite existing nodes without asking.
    #[arg(short, long)]
    pub force: bool,

    /// Bootstrap strategy (`star` or `none`).
    #[arg(long, default_value = "star")]
    pub bootstrap: String,

    /// Enable multicast peer discovery.
    #[arg(long)]
    pub mdns: bool,

    /// First swarm port; API ports start 1000 higher.
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT_START)]
    pub port_start: u16,
}

impl InitArgs {
    pub fn cluster(&self) -> Result<ClusterConfig, TestbedError> {
        let bootstrap: Bootstrap = self.bootstrap.parse()?;
        Ok(ClusterConfig::builder()
            .count(self.count)
            .force(self.force)
            .bootstrap(bootstrap)
            .mdns(self.mdns)
            .port_start(self.port_start)
            .build())
    }
}

pub async fn run(testbed: &Testbed, args: &InitArgs) -> anyhow::Result<()> {
    let cluster = args.cluster()?;

    let report = match testbed.init(&cluster, confirm_overwrite).await {
        Ok(report) => report,
        Err(TestbedError::AlreadyExists(root)) => {
            eprintln!("Left existing nodes under {} untouched.", root.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for failed in report.failures() {
        if let Err(ref e) = failed.result {
            eprintln!("node {}: {e}", failed.node);
        }
    }
    println!(
        "Initialized {} nodes under {}",
        report.nodes.len(),
        testbed.store().root().display()
    );
    Ok(())
}

fn confirm_overwrite(_root: &Path) -> bool {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("testbed nodes already exist, overwrite? [y/n] ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
        match line.trim() {
            "y" | "Y" => return true,
            "n" | "N" => return false,
            _ => println!("please type 'y' or 'n'"),
        }
    }
}
