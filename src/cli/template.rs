use std::collections::HashSet;
use std::time::SystemTime;

use anyhow::{Context, Result};
use aws_sdk_ec2::types::LaunchTemplateVersion;
use aws_sdk_ec2::Client;
use chrono::{DateTime, Local};
use clap::{Args, ValueEnum};

use ami_rs::aws::ec2;

#[derive(Args)]
pub struct TemplateArgs {
    /// Command to run
    #[arg(value_enum, default_value_t = Cmd::List)]
    cmd: Cmd,

    /// Exact launch template name
    #[arg(long, short = 't')]
    template_name: String,

    /// `Name` tag substring of the images backing the template
    /// (required for `update` and `prune`)
    #[arg(long, short = 'a')]
    ami_name: Option<String>,

    /// AWS profile (default: from configuration)
    #[arg(long, short = 'p')]
    profile: Option<String>,

    /// AWS region
    #[arg(long, short = 'r')]
    region: Option<String>,
}

impl TemplateArgs {
    pub async fn main(self) -> Result<()> {
        let client = super::ec2_client(self.profile, self.region).await?;

        match self.cmd {
            Cmd::List => list(&client, &self.template_name).await,
            Cmd::Update => {
                let ami_name = self.ami_name.context("--ami-name is required for update")?;
                update(&client, &self.template_name, &ami_name).await
            }
            Cmd::Prune => {
                let ami_name = self.ami_name.context("--ami-name is required for prune")?;
                prune(&client, &self.template_name, &ami_name).await
            }
        }
    }
}

async fn list(client: &Client, template_name: &str) -> Result<()> {
    let versions = ec2::get_template_versions(client, template_name).await?;
    for version in &versions {
        println!(
            "version: {:03} {} {} {}",
            version.version_number().unwrap_or_default(),
            create_time(version),
            version.launch_template_id().unwrap_or("-"),
            version
                .launch_template_data()
                .and_then(|data| data.image_id())
                .unwrap_or("-"),
        );
    }
    Ok(())
}

fn create_time(version: &LaunchTemplateVersion) -> String {
    version
        .create_time()
        .and_then(|t| SystemTime::try_from(t.clone()).ok())
        .map(|t| DateTime::<Local>::from(t).to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

/// Point the template's latest version at the newest image, then promote
/// the default version to the latest. Both steps are idempotent.
async fn update(client: &Client, template_name: &str, ami_name: &str) -> Result<()> {
    let versions = ec2::get_template_versions(client, template_name).await?;
    let latest_version = &versions[0];

    let images = ec2::get_sorted_images(client, ami_name).await?;
    let records = ec2::resolve_image_records(&images)?;
    let latest_image = records
        .first()
        .with_context(|| format!("no images match {ami_name}"))?;

    let current_image = latest_version
        .launch_template_data()
        .and_then(|data| data.image_id());
    if current_image == Some(latest_image.id.as_str()) {
        println!("launch template already references the latest image");
    } else {
        let template_id = latest_version
            .launch_template_id()
            .context("launch template version has no template id")?;
        let source_version = latest_version
            .version_number()
            .context("launch template version has no version number")?;
        let created =
            ec2::create_template_version(client, template_id, source_version, &latest_image.id)
                .await?;
        println!(
            "created version {:03} referencing {}",
            created.version_number().unwrap_or_default(),
            latest_image.id
        );
    }

    let template = ec2::get_template(client, template_name).await?;
    let latest = template.latest_version_number();
    if template.default_version_number() == latest {
        println!("launch template default version is already the latest");
    } else {
        let template_id = template
            .launch_template_id()
            .context("launch template has no id")?;
        let latest = latest.context("launch template has no latest version number")?;
        ec2::set_default_version(client, template_id, latest).await?;
        println!("default version set to {latest:03}");
    }
    Ok(())
}

/// Delete template versions whose image no longer exists. The default
/// version cannot be deleted and is skipped with a notice.
async fn prune(client: &Client, template_name: &str, ami_name: &str) -> Result<()> {
    let versions = ec2::get_template_versions(client, template_name).await?;
    let images = ec2::get_sorted_images(client, ami_name).await?;
    let records = ec2::resolve_image_records(&images)?;
    let live: HashSet<&str> = records.iter().map(|record| record.id.as_str()).collect();

    let default_version = ec2::get_template(client, template_name)
        .await?
        .default_version_number();

    let mut count = 0;
    for version in &versions {
        let image = version
            .launch_template_data()
            .and_then(|data| data.image_id());
        if image.map_or(false, |id| live.contains(id)) {
            continue;
        }

        let number = version
            .version_number()
            .context("launch template version has no version number")?;
        if Some(number) == default_version {
            println!("skipping default version {number:03}; its image {image} is stale", image = image.unwrap_or("-"));
            continue;
        }

        let template_id = version
            .launch_template_id()
            .context("launch template version has no template id")?;
        ec2::delete_template_version(client, template_id, number).await?;
        println!("deleted launch template version {number:03}");
        count += 1;
    }

    if count == 0 {
        println!("launch template versions are already pruned");
    }
    Ok(())
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Cmd {
    /// List template versions, latest first
    List,
    /// Reference the newest image and promote the default version
    Update,
    /// Delete versions whose image no longer exists
    Prune,
}
