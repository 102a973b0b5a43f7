use anyhow::{bail, Result};
use aws_sdk_ec2::Client;
use clap::{Args, ValueEnum};

use ami_rs::aws::ec2;
use ami_rs::retention::{self, ImageRecord};

#[derive(Args)]
pub struct AmiArgs {
    /// Command to run
    #[arg(value_enum, default_value_t = Cmd::List)]
    cmd: Cmd,

    /// `Name` tag substring the images must match
    #[arg(long, short = 'f')]
    filter: String,

    /// Image generations to keep when pruning
    #[arg(long, short = 'g', default_value_t = 7)]
    generations: usize,

    /// AWS profile (default: from configuration)
    #[arg(long, short = 'p')]
    profile: Option<String>,

    /// AWS region
    #[arg(long, short = 'r')]
    region: Option<String>,
}

impl AmiArgs {
    pub async fn main(self) -> Result<()> {
        let client = super::ec2_client(self.profile, self.region).await?;
        let images = ec2::get_sorted_images(&client, &self.filter).await?;
        let records = ec2::resolve_image_records(&images)?;

        match self.cmd {
            Cmd::List => {
                for (i, record) in records.iter().enumerate() {
                    println!(
                        "{:03} {} {} {} {}",
                        i + 1,
                        record.creation_date,
                        record.name_tag,
                        record.id,
                        record.snapshot_id
                    );
                }
            }
            Cmd::Prune => prune(&client, records, self.generations).await?,
        }
        Ok(())
    }
}

async fn prune(client: &Client, records: Vec<ImageRecord>, generations: usize) -> Result<()> {
    let decision = retention::evaluate(records, generations)?;
    if decision.remove.is_empty() {
        println!("images are already pruned");
        return Ok(());
    }

    let mut failures = 0;
    for record in &decision.remove {
        match ec2::deregister_image(client, &record.id).await {
            Ok(()) => println!("deregistered {}", record.id),
            Err(err) => {
                failures += 1;
                eprintln!("{err:#}");
            }
        }
        match ec2::delete_snapshot(client, &record.snapshot_id).await {
            Ok(()) => println!("deleted {}", record.snapshot_id),
            Err(err) => {
                failures += 1;
                eprintln!("{err:#}");
            }
        }
    }

    println!(
        "kept {} generations, removed {} images",
        decision.keep.len(),
        decision.remove.len()
    );
    if failures > 0 {
        bail!("{failures} delete operations failed");
    }
    Ok(())
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Cmd {
    /// List matching images, newest first
    List,
    /// Deregister images past the retention count and delete their snapshots
    Prune,
}
