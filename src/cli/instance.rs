use anyhow::{Context, Result};
use aws_sdk_ec2::Client;
use clap::{Args, ValueEnum};

use ami_rs::aws::{ec2, elb};

#[derive(Args)]
pub struct InstanceArgs {
    /// Command to run
    #[arg(value_enum, default_value_t = Cmd::List)]
    cmd: Cmd,

    /// `Name` tag substring to filter `list` by
    #[arg(long, short = 'f')]
    filter: Option<String>,

    /// Exact launch template name (required for `create`)
    #[arg(long, short = 't')]
    template_name: Option<String>,

    /// Subnet to launch into (required for `create`)
    #[arg(long, short = 's')]
    subnet_id: Option<String>,

    /// Exact target group name (required for `healthy`)
    #[arg(long, short = 'g')]
    target_group: Option<String>,

    /// AWS profile (default: from configuration)
    #[arg(long, short = 'p')]
    profile: Option<String>,

    /// AWS region
    #[arg(long, short = 'r')]
    region: Option<String>,
}

impl InstanceArgs {
    pub async fn main(self) -> Result<()> {
        let client = super::ec2_client(self.profile.clone(), self.region.clone()).await?;

        match self.cmd {
            Cmd::List => {
                let instances = ec2::get_instances(&client, self.filter.as_deref()).await?;
                print_instances(&instances);
            }
            Cmd::Create => {
                let template_name = self
                    .template_name
                    .context("--template-name is required for create")?;
                let subnet_id = self.subnet_id.context("--subnet-id is required for create")?;
                create(&client, &template_name, &subnet_id).await?;
            }
            Cmd::Healthy => {
                let target_group = self
                    .target_group
                    .context("--target-group is required for healthy")?;
                let elb_client = super::elb_client(self.profile, self.region).await?;
                healthy(&client, &elb_client, &target_group).await?;
            }
        }
        Ok(())
    }
}

fn print_instances(instances: &[aws_sdk_ec2::types::Instance]) {
    for instance in instances {
        let name = ec2::name_tag(instance.tags()).unwrap_or("no-name");
        let state = instance
            .state()
            .and_then(|state| state.name())
            .map(|name| name.as_str())
            .unwrap_or("-");
        println!(
            "{id} {ip} {name} [{state}]",
            id = instance.instance_id().unwrap_or("-"),
            ip = instance.private_ip_address().unwrap_or("-"),
        );
    }
}

async fn create(client: &Client, template_name: &str, subnet_id: &str) -> Result<()> {
    let versions = ec2::get_template_versions(client, template_name).await?;
    let latest = &versions[0];
    let template_id = latest
        .launch_template_id()
        .context("launch template version has no template id")?;
    let version = latest
        .version_number()
        .context("launch template version has no version number")?;

    let instances =
        ec2::run_instance_from_template(client, template_id, version, subnet_id).await?;
    for instance in &instances {
        println!("created instance {}", instance.instance_id().unwrap_or("-"));
    }
    Ok(())
}

/// Name and private ip of every healthy instance behind the target group.
async fn healthy(
    client: &Client,
    elb_client: &aws_sdk_elasticloadbalancingv2::Client,
    target_group: &str,
) -> Result<()> {
    let ids = elb::healthy_target_ids(elb_client, target_group).await?;
    if ids.is_empty() {
        println!("no healthy targets in {target_group}");
        return Ok(());
    }

    let instances = ec2::get_instances_by_id(client, ids).await?;
    for instance in &instances {
        println!(
            "{name} {ip}",
            name = ec2::name_tag(instance.tags()).unwrap_or("no-name"),
            ip = instance.private_ip_address().unwrap_or("-"),
        );
    }
    Ok(())
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Cmd {
    /// List instances with id, private ip, name and state
    List,
    /// Launch one instance from a template's latest version
    Create,
    /// Resolve healthy target group members to name and private ip
    Healthy,
}
